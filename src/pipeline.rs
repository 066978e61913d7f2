use crate::{
    artifact::{self, ChunkSet, Document, SummaryResult},
    chunker,
    clean,
    config::Config,
    engine::Generator,
    error::DocumentError,
    jobs::{JobPatch, JobResults, JobStore, StageState},
    report::{Stage, StageReport},
    scorer::{AggregateScore, EvalFilter, Scorer},
    summarizer::TwoStageSummarizer,
    tokenizer::TokenCounter,
};
use anyhow::Result;
use crossbeam_channel::bounded;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Pipeline<G: Generator> {
    cfg: Config,
    tokenizer: Arc<dyn TokenCounter>,
    summarizer: TwoStageSummarizer<G>,
}

pub struct JobOutput {
    pub reports: Vec<StageReport>,
    pub scores: AggregateScore,
}

impl JobOutput {
    pub fn results(&self) -> JobResults {
        JobResults {
            processed: self.scores.processed,
            skipped_no_candidate: self.scores.skipped_no_candidate,
            skipped_no_reference: self.scores.skipped_no_reference,
            avg_rouge: self.scores.scores,
            summaries_failed: self
                .reports
                .iter()
                .filter(|r| r.stage == Stage::Summarization)
                .map(|r| r.failed)
                .sum(),
        }
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    dataset: &'a str,
    stages: &'a [StageReport],
}

impl<G: Generator> Pipeline<G> {
    pub fn new(cfg: &Config, tokenizer: Arc<dyn TokenCounter>, generator: G) -> Self {
        Self {
            cfg: cfg.clone(),
            summarizer: TwoStageSummarizer::new(cfg, tokenizer.clone(), generator),
            tokenizer,
        }
    }

    pub fn summarizer(&self) -> &TwoStageSummarizer<G> {
        &self.summarizer
    }

    pub fn clean(&self, raw: &serde_json::Value) -> Result<(Vec<Document>, StageReport)> {
        let started = Instant::now();
        let outcome = clean::clean_records(&self.cfg, raw)?;
        let mut report = StageReport::new(Stage::Cleaning);
        for err in &outcome.skipped {
            warn!("cleaning: {err}");
            report.record(err);
        }
        report.processed = outcome.documents.len();
        report.elapsed_ms = started.elapsed().as_millis();
        info!(
            "cleaned {} documents, skipped {}",
            report.processed, report.skipped
        );
        Ok((outcome.documents, report))
    }

    pub fn chunk(&self, documents: &[Document]) -> (Vec<ChunkSet>, StageReport) {
        let started = Instant::now();
        let outcome = chunker::chunk_corpus(
            documents,
            self.cfg.chunking.max_tokens,
            self.tokenizer.as_ref(),
        );
        let mut report = StageReport::new(Stage::Chunking);
        for &id in &outcome.skipped {
            report.record(&DocumentError::EmptyDocument { id });
        }
        report.processed = outcome.chunk_sets.len();
        report.elapsed_ms = started.elapsed().as_millis();
        let total: usize = outcome.chunk_sets.iter().map(|c| c.chunks.len()).sum();
        info!(
            "chunked {} documents into {} chunks (max_tokens={})",
            report.processed, total, self.cfg.chunking.max_tokens
        );
        (outcome.chunk_sets, report)
    }

    /// Summarizes every document, in parallel when configured. The output keeps
    /// input order. Documents without a chunk set are summarized from their full text.
    pub fn summarize(
        &self,
        documents: &[Document],
        chunk_sets: &[ChunkSet],
    ) -> (Vec<SummaryResult>, StageReport) {
        let started = Instant::now();
        let limit = if self.cfg.global.limit > 0 {
            self.cfg.global.limit
        } else {
            documents.len()
        };
        let documents = &documents[..limit.min(documents.len())];
        let chunks_by_id: HashMap<u64, &[String]> = chunk_sets
            .iter()
            .map(|c| (c.id, c.chunks.as_slice()))
            .collect();

        let workers = self.cfg.global.max_parallel_documents.max(1);
        let total = documents.len();
        info!("summarizing {total} documents with {workers} worker(s)");

        let (task_tx, task_rx) = bounded::<(usize, &Document, &[String])>(workers * 2);
        let (result_tx, result_rx) =
            bounded::<(usize, Result<String, DocumentError>)>(workers * 2);
        let summarizer = &self.summarizer;
        let mut ordered = BTreeMap::new();

        std::thread::scope(|scope| {
            for worker_id in 0..workers {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                scope.spawn(move || {
                    for (index, doc, chunks) in rx.iter() {
                        let res = summarizer.summarize(doc.id, &doc.input_text, chunks);
                        if tx.send((index, res)).is_err() {
                            break;
                        }
                    }
                    debug!("summarization worker {worker_id} finished");
                });
            }
            drop(task_rx);
            drop(result_tx);

            let chunks_by_id = &chunks_by_id;
            scope.spawn(move || {
                for (index, doc) in documents.iter().enumerate() {
                    let chunks = chunks_by_id.get(&doc.id).copied().unwrap_or(&[]);
                    if task_tx.send((index, doc, chunks)).is_err() {
                        break;
                    }
                }
            });

            for (index, res) in result_rx.iter() {
                ordered.insert(index, res);
                if ordered.len() % 10 == 0 || ordered.len() == total {
                    info!("summarized {}/{}", ordered.len(), total);
                }
            }
        });

        let mut report = StageReport::new(Stage::Summarization);
        let mut results = Vec::with_capacity(total);
        for (index, res) in ordered {
            let id = documents[index].id;
            match res {
                Ok(summary) => {
                    results.push(SummaryResult::ok(id, summary));
                    report.processed += 1;
                }
                Err(err) if err.is_skip() => {
                    warn!("summarization skipped: {err}");
                    report.record(&err);
                }
                Err(err) => {
                    warn!("summarization failed: {err}");
                    results.push(SummaryResult::failed(id, err.to_string()));
                    report.record(&err);
                }
            }
        }
        report.elapsed_ms = started.elapsed().as_millis();
        (results, report)
    }

    pub fn evaluate(
        &self,
        documents: &[Document],
        summaries: &[SummaryResult],
        filter: &EvalFilter,
    ) -> (AggregateScore, StageReport) {
        let started = Instant::now();
        let scorer = Scorer::new(self.cfg.scoring.use_stemmer);
        let mut scores = scorer.evaluate(documents, summaries, filter);
        if !self.cfg.scoring.per_document {
            scores.per_document.clear();
        }

        let mut report = StageReport::new(Stage::Evaluation);
        report.processed = scores.processed;
        report.skipped = scores.skipped_no_candidate + scores.skipped_no_reference;
        report.elapsed_ms = started.elapsed().as_millis();
        info!(
            "rouge1={:.4} rouge2={:.4} rougeL={:.4} processed={} skipped_no_candidate={} skipped_no_reference={}",
            scores.scores.rouge1,
            scores.scores.rouge2,
            scores.scores.rouge_l,
            scores.processed,
            scores.skipped_no_candidate,
            scores.skipped_no_reference
        );
        (scores, report)
    }

    /// Runs every stage, writing artifacts into `job_dir` and stage progress into `store`.
    pub fn run_job(
        &self,
        raw: &serde_json::Value,
        job_dir: &Path,
        store: &dyn JobStore,
        job_id: &str,
    ) -> Result<JobOutput> {
        let result = self.run_stages(raw, job_dir, store, job_id);
        match &result {
            Ok(out) => store.update(job_id, JobPatch::finished(out.results()))?,
            Err(err) => store.update(job_id, JobPatch::failed(format!("{err:#}")))?,
        }
        result
    }

    fn run_stages(
        &self,
        raw: &serde_json::Value,
        job_dir: &Path,
        store: &dyn JobStore,
        job_id: &str,
    ) -> Result<JobOutput> {
        let out = &self.cfg.output;
        let mut reports = Vec::new();

        let (documents, report) = tracked(store, job_id, Stage::Cleaning, || {
            let (docs, report) = self.clean(raw)?;
            artifact::write_json(&job_dir.join(&out.cleaned_filename), &docs)?;
            Ok((docs, report))
        })?;
        reports.push(report);

        let chunk_sets = if self.cfg.chunking.enabled {
            let (chunk_sets, report) = tracked(store, job_id, Stage::Chunking, || {
                let (sets, report) = self.chunk(&documents);
                artifact::write_json(&job_dir.join(&out.chunks_filename), &sets)?;
                Ok((sets, report))
            })?;
            reports.push(report);
            chunk_sets
        } else {
            info!("chunking disabled; summarizing full texts");
            Vec::new()
        };

        let (summaries, report) = tracked(store, job_id, Stage::Summarization, || {
            let (summaries, report) = self.summarize(&documents, &chunk_sets);
            artifact::write_json(&job_dir.join(&out.summaries_filename), &summaries)?;
            Ok((summaries, report))
        })?;
        reports.push(report);

        let (scores, report) = tracked(store, job_id, Stage::Evaluation, || {
            let (scores, report) = self.evaluate(&documents, &summaries, &EvalFilter::All);
            artifact::write_json(&job_dir.join(&out.scores_filename), &scores)?;
            Ok((scores, report))
        })?;
        reports.push(report);

        artifact::write_json(
            &job_dir.join(&out.report_filename),
            &RunReport {
                dataset: &self.cfg.global.dataset,
                stages: &reports,
            },
        )?;

        Ok(JobOutput { reports, scores })
    }
}

fn tracked<T>(
    store: &dyn JobStore,
    job_id: &str,
    stage: Stage,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    store.update(job_id, JobPatch::stage(stage, StageState::Running))?;
    match f() {
        Ok(v) => {
            store.update(job_id, JobPatch::stage(stage, StageState::Completed))?;
            Ok(v)
        }
        Err(e) => {
            store.update(job_id, JobPatch::stage(stage, StageState::Failed))?;
            Err(e)
        }
    }
}
