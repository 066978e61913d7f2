//! On-disk artifacts exchanged between stages.
//!
//! Every artifact is a pretty-printed JSON document. Reading one that does not
//! parse is fatal for the stage that needs it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::Path;

/// A cleaned case: the join key `id`, the full text and its reference summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub input_text: String,
    pub summary_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSet {
    pub id: u64,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub id: u64,
    pub refined_summary_improved: String,
    /// Set when generation failed for this document; the summary is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummaryResult {
    pub fn ok(id: u64, summary: String) -> Self {
        Self {
            id,
            refined_summary_improved: summary,
            error: None,
        }
    }

    pub fn failed(id: u64, error: String) -> Self {
        Self {
            id,
            refined_summary_improved: String::new(),
            error: Some(error),
        }
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading artifact: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing artifact: {}", path.display()))
}

/// Serializes fully before touching the file so a failure leaves no partial output.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::util::ensure_dir(parent)?;
    }
    std::fs::write(path, raw).with_context(|| format!("writing artifact: {}", path.display()))
}

pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    read_json(path)
}

pub fn load_chunks(path: &Path) -> Result<Vec<ChunkSet>> {
    read_json(path)
}

pub fn load_summaries(path: &Path) -> Result<Vec<SummaryResult>> {
    read_json(path)
}
