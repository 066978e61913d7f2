use super::{DocDiag, Generator, LengthBounds};
use crate::error::GenerateError;
use anyhow::Result;

/// Lead-N baseline: the first `max_len` words of the prompt body.
///
/// Deterministic and model-free. Useful offline and as a reference point for
/// ROUGE numbers.
pub struct LeadGenerator {
    prefix: String,
}

impl LeadGenerator {
    pub fn new(instruction_prefix: &str) -> Self {
        Self {
            prefix: instruction_prefix.to_string(),
        }
    }

    fn lead(&self, prompt: &str, max_len: usize) -> String {
        let body = prompt.strip_prefix(self.prefix.as_str()).unwrap_or(prompt);
        body.split_whitespace()
            .take(max_len)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Generator for LeadGenerator {
    fn generate_batch(
        &self,
        prompts: &[String],
        bounds: LengthBounds,
    ) -> std::result::Result<Vec<String>, GenerateError> {
        Ok(prompts.iter().map(|p| self.lead(p, bounds.max_len)).collect())
    }

    fn doctor(&self) -> Result<DocDiag> {
        Ok(DocDiag {
            backend: "lead".into(),
            python_exe: None,
            python_version: None,
            torch_version: None,
            transformers_version: None,
            device: None,
            ok: true,
            error: None,
        })
    }
}
