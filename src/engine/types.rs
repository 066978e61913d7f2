use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocDiag {
    pub backend: String,
    pub python_exe: Option<String>,
    pub python_version: Option<String>,
    pub torch_version: Option<String>,
    pub transformers_version: Option<String>,
    pub device: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// One request line sent to the generation worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateIn {
    pub cmd: String,
    pub prompts: Vec<String>,
    pub min_len: usize,
    pub max_len: usize,
    pub num_beams: u32,
    pub length_penalty: f32,
    pub no_repeat_ngram_size: u32,
    pub max_input_tokens: usize,
}

/// One response line from the generation worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOut {
    pub ok: bool,
    #[serde(default)]
    pub summaries: Vec<String>,
    /// Set when the worker caught an out-of-memory error for this batch.
    #[serde(default)]
    pub oom: bool,
    #[serde(default)]
    pub error: Option<String>,
}
