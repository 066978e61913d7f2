pub mod lead;
pub mod python;
pub mod types;

use crate::{config::Config, error::GenerateError};
use anyhow::Result;
use std::sync::Arc;

pub use types::{DocDiag, GenerateIn, GenerateOut};

/// Requested output length, in model tokens, for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    pub min_len: usize,
    pub max_len: usize,
}

impl LengthBounds {
    pub fn new(min_len: usize, max_len: usize) -> Self {
        Self {
            min_len: min_len.min(max_len),
            max_len,
        }
    }
}

/// A sequence-to-sequence summarization capability.
///
/// Implementations must return exactly one output per prompt, in prompt order.
pub trait Generator: Send + Sync {
    fn generate_batch(
        &self,
        prompts: &[String],
        bounds: LengthBounds,
    ) -> std::result::Result<Vec<String>, GenerateError>;

    fn generate(
        &self,
        prompt: &str,
        min_len: usize,
        max_len: usize,
    ) -> std::result::Result<String, GenerateError> {
        let mut out =
            self.generate_batch(&[prompt.to_string()], LengthBounds::new(min_len, max_len))?;
        if out.len() != 1 {
            return Err(GenerateError::CountMismatch {
                expected: 1,
                got: out.len(),
            });
        }
        Ok(out.remove(0))
    }

    fn doctor(&self) -> Result<DocDiag>;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn generate_batch(
        &self,
        prompts: &[String],
        bounds: LengthBounds,
    ) -> std::result::Result<Vec<String>, GenerateError> {
        (**self).generate_batch(prompts, bounds)
    }

    fn doctor(&self) -> Result<DocDiag> {
        (**self).doctor()
    }
}

pub fn from_config(cfg: &Config) -> Result<Arc<dyn Generator>> {
    match cfg.generation.backend.as_str() {
        "python" => Ok(Arc::new(python::PythonGenerator::new(cfg)?)),
        "lead" => Ok(Arc::new(lead::LeadGenerator::new(
            &cfg.summarizer.instruction_prefix,
        ))),
        other => anyhow::bail!("unknown generation.backend: {other}"),
    }
}
