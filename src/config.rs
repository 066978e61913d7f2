use crate::keywords::KeywordOrder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub chunking: Chunking,
    #[serde(default)]
    pub summarizer: Summarizer,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub tokenizer: Tokenizer,
    #[serde(default)]
    pub cleaning: Cleaning,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    /// Dataset label, e.g. "ILC" or "IN-ABS". Only used for naming and reports.
    pub dataset: String,
    pub resume: bool,
    pub max_parallel_documents: usize,
    /// Process only the first N documents (0 = all).
    pub limit: usize,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            dataset: "ILC".into(),
            resume: true,
            max_parallel_documents: 1,
            limit: 0,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
    pub scripts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            scripts_dir: "scripts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Chunking {
    pub enabled: bool,
    pub max_tokens: usize,
}
impl Default for Chunking {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Summarizer {
    pub instruction_prefix: String,
    pub chunk_min_len: usize,
    pub chunk_sum_max: usize,
    pub final_min_len: usize,
    pub final_sum_max: usize,
    pub batch_size: usize,
    pub keyword_sent_limit: usize,
    pub max_inflight_batches: usize,
    pub sleep_between_batches_ms: u64,
}
impl Default for Summarizer {
    fn default() -> Self {
        Self {
            instruction_prefix: "summarize: ".into(),
            chunk_min_len: 20,
            chunk_sum_max: 100,
            final_min_len: 90,
            final_sum_max: 300,
            batch_size: 4,
            keyword_sent_limit: 5,
            max_inflight_batches: 1,
            sleep_between_batches_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Keywords {
    pub order: KeywordOrder,
    pub terms: Vec<String>,
}
impl Default for Keywords {
    fn default() -> Self {
        Self {
            order: KeywordOrder::KeywordPriority,
            terms: crate::keywords::DEFAULT_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Generation {
    /// "python" (T5 worker process) or "lead" (first-N-words baseline).
    pub backend: String,
    pub python_exe: String,
    pub model_name: String,
    pub device: String,
    pub max_input_tokens: usize,
    pub num_beams: u32,
    pub length_penalty: f32,
    pub no_repeat_ngram_size: u32,
    pub use_fp16: bool,
    pub timeout_seconds: u64,
    pub startup_timeout_seconds: u64,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Generation {
    fn default() -> Self {
        Self {
            backend: "python".into(),
            python_exe: "python3".into(),
            model_name: "t5-base".into(),
            device: "AUTO".into(),
            max_input_tokens: 512,
            num_beams: 8,
            length_penalty: 1.0,
            no_repeat_ngram_size: 3,
            use_fp16: true,
            timeout_seconds: 600,
            startup_timeout_seconds: 300,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tokenizer {
    /// "huggingface" (tokenizer.json) or "whitespace".
    pub kind: String,
    pub file: String,
}
impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            kind: "huggingface".into(),
            file: "models/t5-base/tokenizer.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Cleaning {
    pub text_fields: Vec<String>,
    pub summary_fields: Vec<String>,
    pub normalize_unicode: bool,
    pub strip_html: bool,
    pub normalize_punctuation: bool,
    pub remove_legal_headers: bool,
    #[serde(default)]
    pub remove_patterns: Vec<String>,
}
impl Default for Cleaning {
    fn default() -> Self {
        Self {
            text_fields: vec!["input_text".into(), "Case".into(), "text".into()],
            summary_fields: vec!["summary_text".into(), "Summary".into(), "summary".into()],
            normalize_unicode: true,
            strip_html: true,
            normalize_punctuation: true,
            remove_legal_headers: false,
            remove_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scoring {
    pub use_stemmer: bool,
    pub per_document: bool,
}
impl Default for Scoring {
    fn default() -> Self {
        Self {
            use_stemmer: true,
            per_document: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub cleaned_filename: String,
    pub chunks_filename: String,
    pub summaries_filename: String,
    pub scores_filename: String,
    pub report_filename: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            cleaned_filename: "cleaned.json".into(),
            chunks_filename: "chunks.json".into(),
            summaries_filename: "summaries.json".into(),
            scores_filename: "scores.json".into(),
            report_filename: "report.json".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub keep_python_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_python_stderr: true,
            dump_effective_config: true,
        }
    }
}
