use crate::error::{DocumentError, FailureKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cleaning,
    Chunking,
    Summarization,
    Evaluation,
}

/// Outcome of one stage over a corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub kind: FailureKind,
    pub message: String,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            skipped: 0,
            failed: 0,
            elapsed_ms: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, err: &DocumentError) {
        if err.is_skip() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
        self.failures.push(FailureRecord {
            id: err.id(),
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerateError;

    #[test]
    fn skips_and_failures_are_counted_apart() {
        let mut r = StageReport::new(Stage::Summarization);
        r.record(&DocumentError::EmptyDocument { id: 3 });
        r.record(&DocumentError::Generation {
            id: 4,
            source: GenerateError::Timeout { seconds: 5 },
        });
        assert_eq!((r.skipped, r.failed), (1, 1));
        assert_eq!(r.failures[1].id, Some(4));
        assert_eq!(r.failures[1].kind, FailureKind::GenerationFailure);
    }
}
