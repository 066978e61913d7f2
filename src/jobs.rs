//! Job bookkeeping for pipeline runs.
//!
//! A job is created once per `run`, patched as stages finish, and can be read
//! back by id from another process through the file-backed store.

use crate::{report::Stage, scorer::ScoreEntry, util::now_rfc3339, util::sha256_hex};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// What a job runs. The id is derived from it, so the same config and input map
/// to the same job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub dataset: String,
    pub input: String,
    pub config_hash: String,
    pub input_hash: String,
}

impl JobSpec {
    pub fn job_id(&self) -> String {
        sha256_hex(format!("{}:{}", self.config_hash, self.input_hash).as_bytes())[..16].to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub status: StageState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub processed: usize,
    pub skipped_no_candidate: usize,
    pub skipped_no_reference: usize,
    pub avg_rouge: ScoreEntry,
    pub summaries_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub dataset: String,
    pub input: String,
    pub created: String,
    pub updated: String,
    pub stages: Vec<StageStatus>,
    pub completed: bool,
    pub error: Option<String>,
    pub results: Option<JobResults>,
}

/// A partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub stage: Option<StageStatus>,
    pub completed: Option<bool>,
    pub error: Option<String>,
    pub results: Option<JobResults>,
}

impl JobPatch {
    pub fn stage(stage: Stage, status: StageState) -> Self {
        Self {
            stage: Some(StageStatus { stage, status }),
            ..Default::default()
        }
    }

    pub fn finished(results: JobResults) -> Self {
        Self {
            completed: Some(true),
            results: Some(results),
            ..Default::default()
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            completed: Some(true),
            error: Some(error),
            ..Default::default()
        }
    }

    fn apply(self, rec: &mut JobRecord) {
        if let Some(st) = self.stage {
            // A stage appears once; later patches replace its state.
            match rec.stages.iter_mut().find(|s| s.stage == st.stage) {
                Some(existing) => existing.status = st.status,
                None => rec.stages.push(st),
            }
        }
        if let Some(c) = self.completed {
            rec.completed = c;
        }
        if self.error.is_some() {
            rec.error = self.error;
        }
        if self.results.is_some() {
            rec.results = self.results;
        }
        rec.updated = now_rfc3339();
    }
}

fn new_record(id: String, spec: &JobSpec) -> JobRecord {
    let now = now_rfc3339();
    JobRecord {
        id,
        dataset: spec.dataset.clone(),
        input: spec.input.clone(),
        created: now.clone(),
        updated: now,
        stages: Vec::new(),
        completed: false,
        error: None,
        results: None,
    }
}

pub trait JobStore: Send + Sync {
    /// Registers a job and returns its id. Re-creating an existing id resets it.
    fn create(&self, spec: &JobSpec) -> Result<String>;
    fn update(&self, id: &str, patch: JobPatch) -> Result<()>;
    fn get(&self, id: &str) -> Result<JobRecord>;
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, spec: &JobSpec) -> Result<String> {
        let id = spec.job_id();
        let mut jobs = self.jobs.lock().map_err(|_| anyhow!("job store poisoned"))?;
        jobs.insert(id.clone(), new_record(id.clone(), spec));
        Ok(id)
    }

    fn update(&self, id: &str, patch: JobPatch) -> Result<()> {
        let mut jobs = self.jobs.lock().map_err(|_| anyhow!("job store poisoned"))?;
        let rec = jobs.get_mut(id).ok_or_else(|| anyhow!("unknown job: {id}"))?;
        patch.apply(rec);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<JobRecord> {
        let jobs = self.jobs.lock().map_err(|_| anyhow!("job store poisoned"))?;
        jobs.get(id).cloned().ok_or_else(|| anyhow!("unknown job: {id}"))
    }
}

/// Keeps each job at `<root>/<id>/status.json`, next to the job's artifacts.
pub struct FileJobStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileJobStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn job_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn status_path(&self, id: &str) -> PathBuf {
        self.job_dir(id).join("status.json")
    }

    fn write(&self, rec: &JobRecord) -> Result<()> {
        crate::artifact::write_json(&self.status_path(&rec.id), rec)
    }
}

impl JobStore for FileJobStore {
    fn create(&self, spec: &JobSpec) -> Result<String> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("job store poisoned"))?;
        let id = spec.job_id();
        self.write(&new_record(id.clone(), spec))?;
        Ok(id)
    }

    fn update(&self, id: &str, patch: JobPatch) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("job store poisoned"))?;
        let mut rec: JobRecord = crate::artifact::read_json(&self.status_path(id))
            .with_context(|| format!("unknown job: {id}"))?;
        patch.apply(&mut rec);
        self.write(&rec)
    }

    fn get(&self, id: &str) -> Result<JobRecord> {
        crate::artifact::read_json(&self.status_path(id)).with_context(|| format!("unknown job: {id}"))
    }
}
