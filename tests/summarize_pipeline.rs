use lexsum::{
    artifact::{self, ChunkSet, Document, SummaryResult},
    config::Config,
    engine::{DocDiag, Generator, LengthBounds, lead::LeadGenerator},
    error::GenerateError,
    jobs::{JobSpec, JobStore, MemoryJobStore, StageState},
    pipeline::Pipeline,
    report::Stage,
    tokenizer::WhitespaceTokenizer,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.chunking.max_tokens = 8;
    cfg.summarizer.chunk_min_len = 2;
    cfg.summarizer.chunk_sum_max = 4;
    cfg.summarizer.final_min_len = 3;
    cfg.summarizer.final_sum_max = 6;
    cfg.summarizer.keyword_sent_limit = 2;
    cfg.keywords.terms = vec!["tribunal".into()];
    cfg
}

fn doc(id: u64, text: &str) -> Document {
    Document {
        id,
        input_text: text.into(),
        summary_text: "reference summary".into(),
    }
}

fn diag() -> anyhow::Result<DocDiag> {
    anyhow::bail!("test backend")
}

/// Fails any batch that mentions "poison".
struct Poisoned;

impl Generator for Poisoned {
    fn generate_batch(
        &self,
        prompts: &[String],
        bounds: LengthBounds,
    ) -> Result<Vec<String>, GenerateError> {
        if prompts.iter().any(|p| p.contains("poison")) {
            return Err(GenerateError::failed("model crashed"));
        }
        Ok(prompts
            .iter()
            .map(|_| vec!["word"; bounds.max_len].join(" "))
            .collect())
    }

    fn doctor(&self) -> anyhow::Result<DocDiag> {
        diag()
    }
}

/// Runs out of memory for any batch larger than one prompt.
#[derive(Default)]
struct SmallMemory {
    sizes: Mutex<Vec<usize>>,
}

impl Generator for SmallMemory {
    fn generate_batch(
        &self,
        prompts: &[String],
        _bounds: LengthBounds,
    ) -> Result<Vec<String>, GenerateError> {
        self.sizes.lock().unwrap().push(prompts.len());
        if prompts.len() > 1 {
            return Err(GenerateError::ResourceExhausted {
                batch: prompts.len(),
            });
        }
        Ok(vec!["compressed".to_string()])
    }

    fn doctor(&self) -> anyhow::Result<DocDiag> {
        diag()
    }
}

/// Returns nothing at all.
struct Silent;

impl Generator for Silent {
    fn generate_batch(
        &self,
        _prompts: &[String],
        _bounds: LengthBounds,
    ) -> Result<Vec<String>, GenerateError> {
        Ok(Vec::new())
    }

    fn doctor(&self) -> anyhow::Result<DocDiag> {
        diag()
    }
}

#[test]
fn summary_respects_final_bound_plus_keywords() {
    let cfg = config();
    let pipeline = Pipeline::new(&cfg, Arc::new(WhitespaceTokenizer::new()), Poisoned);
    let text = "The parties argued for a long time about the lease. \
                The tribunal ruled for the tenant. Costs were not awarded to anyone.";
    let summary = pipeline.summarizer().summarize(1, text, &[]).unwrap();

    let keyword = "The tribunal ruled for the tenant.";
    assert!(summary.starts_with(keyword));
    let body = summary.trim_start_matches(keyword);
    assert!(body.split_whitespace().count() <= cfg.summarizer.final_sum_max);
}

#[test]
fn lead_baseline_summarizes_chunked_text() {
    let cfg = config();
    let tok = Arc::new(WhitespaceTokenizer::new());
    let pipeline = Pipeline::new(&cfg, tok, LeadGenerator::new(&cfg.summarizer.instruction_prefix));
    let documents = vec![doc(
        4,
        "one two three four five six seven eight nine ten eleven twelve thirteen",
    )];
    let (chunk_sets, _) = pipeline.chunk(&documents);
    assert_eq!(chunk_sets[0].chunks.len(), 2);

    let (summaries, report) = pipeline.summarize(&documents, &chunk_sets);
    assert_eq!(report.processed, 1);
    // stage 1 keeps four words per group, stage 2 six words overall
    assert_eq!(summaries[0].refined_summary_improved, "one two three four nine ten");
}

#[test]
fn one_failing_document_does_not_stop_the_rest() {
    let mut cfg = config();
    cfg.global.max_parallel_documents = 3;
    let pipeline = Pipeline::new(&cfg, Arc::new(WhitespaceTokenizer::new()), Poisoned);
    let documents: Vec<Document> = vec![
        doc(1, "first case text"),
        doc(2, "a poison pill"),
        doc(3, "   "),
        doc(4, "fourth case text"),
        doc(5, "fifth case text"),
    ];

    let (summaries, report) = pipeline.summarize(&documents, &[]);
    let ids: Vec<u64> = summaries.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 4, 5]);
    assert!(summaries[1].error.is_some());
    assert!(summaries[1].refined_summary_improved.is_empty());
    assert!(summaries.iter().filter(|s| s.id != 2).all(|s| s.error.is_none()));

    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn out_of_memory_halves_the_batch() {
    let mut cfg = config();
    cfg.summarizer.batch_size = 4;
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(WhitespaceTokenizer::new()),
        SmallMemory::default(),
    );
    let chunks: Vec<String> = (0..3).map(|i| format!("w{i} x x x x x x")).collect();
    let summary = pipeline
        .summarizer()
        .summarize(1, &chunks.join(" "), &chunks)
        .unwrap();
    assert_eq!(summary, "compressed");

    let sizes = pipeline.summarizer().generator().sizes.lock().unwrap().clone();
    // 3 -> OOM, 2 -> OOM, then three single batches and the final call
    assert_eq!(sizes, vec![3, 2, 1, 1, 1, 1]);
}

#[test]
fn count_mismatch_is_a_generation_failure() {
    let pipeline = Pipeline::new(&config(), Arc::new(WhitespaceTokenizer::new()), Silent);
    let (summaries, report) = pipeline.summarize(&[doc(1, "some text")], &[]);
    assert_eq!(report.failed, 1);
    assert!(summaries[0].error.as_deref().unwrap().contains("0 outputs for 1 prompts"));
}

#[test]
fn run_job_writes_artifacts_and_tracks_stages() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(WhitespaceTokenizer::new()),
        LeadGenerator::new(&cfg.summarizer.instruction_prefix),
    );
    let raw = json!([
        {"id": 1, "input_text": "the appeal is allowed with costs", "summary_text": "appeal allowed"},
        {"id": 2, "input_text": "the tribunal ruled. the petition fails", "summary_text": "petition fails"},
        {"id": 3, "summary_text": "no text"},
    ]);

    let store = MemoryJobStore::new();
    let id = store
        .create(&JobSpec {
            dataset: "ILC".into(),
            input: "raw.json".into(),
            config_hash: "cfg".into(),
            input_hash: "in".into(),
        })
        .unwrap();

    let out = pipeline.run_job(&raw, dir.path(), &store, &id).unwrap();
    assert_eq!(out.scores.processed, 2);

    let summaries: Vec<SummaryResult> =
        artifact::read_json(&dir.path().join(&cfg.output.summaries_filename)).unwrap();
    assert_eq!(summaries.len(), 2);
    let chunks: Vec<ChunkSet> =
        artifact::read_json(&dir.path().join(&cfg.output.chunks_filename)).unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(dir.path().join(&cfg.output.report_filename).exists());
    assert!(dir.path().join(&cfg.output.scores_filename).exists());

    let rec = store.get(&id).unwrap();
    assert!(rec.completed);
    assert!(rec.error.is_none());
    let stages: Vec<Stage> = rec.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::Cleaning, Stage::Chunking, Stage::Summarization, Stage::Evaluation]
    );
    assert!(rec.stages.iter().all(|s| s.status == StageState::Completed));
    assert_eq!(rec.results.unwrap().processed, 2);
}

#[test]
fn run_job_without_chunking_skips_that_stage() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.chunking.enabled = false;
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(WhitespaceTokenizer::new()),
        LeadGenerator::new(&cfg.summarizer.instruction_prefix),
    );
    let raw = json!([{"input_text": "held that the suit fails", "summary_text": "suit fails"}]);
    let store = MemoryJobStore::new();
    let id = store
        .create(&JobSpec {
            dataset: "IN-ABS".into(),
            input: "raw.json".into(),
            config_hash: "cfg".into(),
            input_hash: "in".into(),
        })
        .unwrap();

    pipeline.run_job(&raw, dir.path(), &store, &id).unwrap();
    let rec = store.get(&id).unwrap();
    assert_eq!(rec.stages.len(), 3);
    assert!(!dir.path().join(&cfg.output.chunks_filename).exists());
}

#[test]
fn fatal_input_marks_the_job_failed() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(WhitespaceTokenizer::new()),
        LeadGenerator::new(&cfg.summarizer.instruction_prefix),
    );
    let store = MemoryJobStore::new();
    let id = store
        .create(&JobSpec {
            dataset: "ILC".into(),
            input: "raw.json".into(),
            config_hash: "cfg".into(),
            input_hash: "bad".into(),
        })
        .unwrap();

    assert!(pipeline.run_job(&json!({"not": "an array"}), dir.path(), &store, &id).is_err());
    let rec = store.get(&id).unwrap();
    assert!(rec.completed);
    assert!(rec.error.is_some());
    assert_eq!(rec.stages[0].status, StageState::Failed);
}

#[test]
fn keyword_sentence_split_by_newline_appears_once() {
    let cfg = Config::default();
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(WhitespaceTokenizer::new()),
        LeadGenerator::new(&cfg.summarizer.instruction_prefix),
    );
    let documents = vec![doc(1, "The tribunal\nruled for him. Costs.")];
    let (summaries, _) = pipeline.summarize(&documents, &[]);
    assert_eq!(
        summaries[0].refined_summary_improved,
        "The tribunal ruled for him. Costs."
    );
}
