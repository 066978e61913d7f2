pub mod artifact;
pub mod chunker;
pub mod clean;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod keywords;
pub mod pipeline;
pub mod report;
pub mod scorer;
pub mod summarizer;
pub mod tokenizer;
pub mod util;
