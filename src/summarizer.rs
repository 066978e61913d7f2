//! Two-stage chunked summarization.
//!
//! Chunks are re-binned into token-budgeted groups, each group is compressed
//! (stage 1), the compressed parts are summarized once more (stage 2), and any
//! keyword-bearing sentence the model dropped is put back in front.

use crate::{
    chunker::pack_greedy,
    config::{self, Config},
    engine::{Generator, LengthBounds},
    error::{DocumentError, GenerateError},
    keywords::KeywordExtractor,
    tokenizer::TokenCounter,
    util::collapse_whitespace,
};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Caps how many generation batches are in flight across all workers.
pub struct GenerationGate {
    release: Sender<()>,
    acquire: Receiver<()>,
}

pub struct GatePermit<'a> {
    gate: &'a GenerationGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.release.send(());
    }
}

impl GenerationGate {
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        let (release, acquire) = bounded(permits);
        for _ in 0..permits {
            let _ = release.send(());
        }
        Self { release, acquire }
    }

    pub fn acquire(&self) -> GatePermit<'_> {
        // The sender lives in `self`, so the channel can't disconnect here.
        let _ = self.acquire.recv();
        GatePermit { gate: self }
    }
}

pub struct TwoStageSummarizer<G: Generator> {
    params: config::Summarizer,
    max_tokens: usize,
    tokenizer: Arc<dyn TokenCounter>,
    generator: G,
    extractor: KeywordExtractor,
    gate: GenerationGate,
}

impl<G: Generator> TwoStageSummarizer<G> {
    pub fn new(cfg: &Config, tokenizer: Arc<dyn TokenCounter>, generator: G) -> Self {
        Self {
            params: cfg.summarizer.clone(),
            max_tokens: cfg.chunking.max_tokens,
            tokenizer,
            generator,
            extractor: KeywordExtractor::new(cfg.keywords.terms.as_slice(), cfg.keywords.order),
            gate: GenerationGate::new(cfg.summarizer.max_inflight_batches),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Summarizes one document. `chunks` may be empty, in which case the whole
    /// text is a single group. Whitespace in `full_text` is collapsed first.
    pub fn summarize(
        &self,
        id: u64,
        full_text: &str,
        chunks: &[String],
    ) -> Result<String, DocumentError> {
        let text = collapse_whitespace(full_text);
        if text.is_empty() {
            return Err(DocumentError::EmptyDocument { id });
        }
        let fail = |source| DocumentError::Generation { id, source };

        let groups = if chunks.is_empty() {
            vec![text.clone()]
        } else {
            self.group_chunks(chunks)
        };
        debug!("document {id}: {} chunks -> {} groups", chunks.len(), groups.len());

        let parts = self.compress_groups(&groups).map_err(fail)?;
        let combined = parts.join(" ");

        let final_bounds = LengthBounds::new(self.params.final_min_len, self.params.final_sum_max);
        let mut candidate = self
            .call(&[self.prompt(&combined)], final_bounds)
            .map_err(fail)?;
        let candidate = candidate.pop().unwrap_or_default();
        if candidate.trim().is_empty() {
            return Err(fail(GenerateError::Empty));
        }

        let restored = self.reinsert_keywords(&text, &candidate);
        Ok(collapse_whitespace(&restored))
    }

    /// Merges neighbouring chunks while their combined token length fits the budget.
    pub fn group_chunks(&self, chunks: &[String]) -> Vec<String> {
        pack_greedy(chunks.iter().map(String::as_str), self.max_tokens, |c| {
            self.tokenizer.token_length(c)
        })
    }

    /// Stage 1. Groups are sent in order, `batch_size` at a time. An out-of-memory
    /// batch is retried at half the size; the smaller size sticks for the rest of
    /// the document.
    pub fn compress_groups(&self, groups: &[String]) -> Result<Vec<String>, GenerateError> {
        let bounds = LengthBounds::new(self.params.chunk_min_len, self.params.chunk_sum_max);
        let mut batch_size = self.params.batch_size.max(1);
        let mut outputs = Vec::with_capacity(groups.len());
        let mut i = 0;

        while i < groups.len() {
            let end = (i + batch_size).min(groups.len());
            let prompts: Vec<String> = groups[i..end].iter().map(|g| self.prompt(g)).collect();
            match self.call(&prompts, bounds) {
                Ok(out) => {
                    outputs.extend(out);
                    i = end;
                }
                Err(GenerateError::ResourceExhausted { batch }) if batch_size > 1 => {
                    batch_size = (batch_size / 2).max(1);
                    warn!("out of memory for batch of {batch}; retrying with {batch_size}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outputs)
    }

    /// Prepends extracted keyword sentences that the candidate does not already contain.
    pub fn reinsert_keywords(&self, full_text: &str, candidate: &str) -> String {
        let missing: Vec<String> = self
            .extractor
            .extract(full_text, self.params.keyword_sent_limit)
            .into_iter()
            .filter(|s| !candidate.contains(s.as_str()))
            .collect();
        if missing.is_empty() {
            return candidate.to_string();
        }
        format!("{} {}", missing.join(" "), candidate)
    }

    fn prompt(&self, text: &str) -> String {
        format!("{}{}", self.params.instruction_prefix, text)
    }

    fn call(&self, prompts: &[String], bounds: LengthBounds) -> Result<Vec<String>, GenerateError> {
        let out = {
            let _permit = self.gate.acquire();
            self.generator.generate_batch(prompts, bounds)?
        };
        if out.len() != prompts.len() {
            return Err(GenerateError::CountMismatch {
                expected: prompts.len(),
                got: out.len(),
            });
        }
        if self.params.sleep_between_batches_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.params.sleep_between_batches_ms));
        }
        Ok(out)
    }
}
