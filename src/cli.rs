use crate::{
    artifact::{self, load_chunks, load_documents, load_summaries},
    config::Config,
    engine,
    jobs::{FileJobStore, JobSpec, JobStore},
    pipeline::Pipeline,
    scorer::EvalFilter,
    tokenizer,
    util::{ensure_dir, hash_file, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lexsum")]
#[command(about = "Legal case summarization pipeline (chunking + two-stage T5 + ROUGE)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./lexsum.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the tokenizer loads and the generation backend starts.
    Doctor {},
    /// Raw dataset records -> cleaned documents.
    Clean {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Cleaned documents -> token-bounded chunk sets.
    Chunk {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Cleaned documents (+ optional chunk sets) -> summaries.
    Summarize {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        chunks: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Summaries scored against the cleaned documents' reference summaries.
    Evaluate {
        #[arg(long)]
        references: PathBuf,
        #[arg(long)]
        candidates: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Only the first N candidates and references.
        #[arg(long, conflicts_with = "ids")]
        n: Option<usize>,
        /// Only these document ids.
        #[arg(long, num_args = 1..)]
        ids: Vec<u64>,
    },
    /// All stages end to end, tracked as a job.
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print a job's recorded progress.
    Status {
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::Clean { input, output } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            clean(&cfg, input, output)
        }
        Command::Chunk { input, output } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            chunk(&cfg, input, output)
        }
        Command::Summarize {
            input,
            chunks,
            output,
        } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            summarize(&cfg, input, chunks.as_deref(), output)
        }
        Command::Evaluate {
            references,
            candidates,
            output,
            n,
            ids,
        } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            let filter = if !ids.is_empty() {
                EvalFilter::Ids(ids.iter().copied().collect())
            } else if let Some(n) = n {
                EvalFilter::First(*n)
            } else {
                EvalFilter::All
            };
            evaluate(&cfg, references, candidates, output.as_deref(), &filter)
        }
        Command::Status { job_id, out_dir } => status(&cfg, job_id, out_dir.as_deref()),
        Command::Run { input, out_dir } => run(&args, &cfg, input, out_dir.as_deref()),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["lexsum.toml", "lexsum.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn build_pipeline(cfg: &Config) -> Result<Pipeline<Arc<dyn engine::Generator>>> {
    let tok = tokenizer::from_config(cfg)?;
    let generator = engine::from_config(cfg)?;
    Ok(Pipeline::new(cfg, tok, generator))
}

fn doctor(cfg: &Config) -> Result<()> {
    let tok = tokenizer::from_config(cfg)?;
    let probe = "The appeal is dismissed.";
    let generator = engine::from_config(cfg)?;
    let diag = generator.doctor()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "tokenizer": {
                "kind": cfg.tokenizer.kind,
                "probe": probe,
                "probe_tokens": tok.token_length(probe),
            },
            "generation": diag,
        }))?
    );
    Ok(())
}

fn read_raw(input: &Path) -> Result<serde_json::Value> {
    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }
    artifact::read_json(input)
}

fn clean(cfg: &Config, input: &Path, output: &Path) -> Result<()> {
    let raw = read_raw(input)?;
    let outcome = crate::clean::clean_records(cfg, &raw)?;
    for err in &outcome.skipped {
        warn!("cleaning: {err}");
    }
    artifact::write_json(output, &outcome.documents)?;
    info!(
        "cleaned {} documents ({} skipped) -> {}",
        outcome.documents.len(),
        outcome.skipped.len(),
        output.display()
    );
    Ok(())
}

fn chunk(cfg: &Config, input: &Path, output: &Path) -> Result<()> {
    let documents = load_documents(input)?;
    let tok = tokenizer::from_config(cfg)?;
    let outcome = crate::chunker::chunk_corpus(&documents, cfg.chunking.max_tokens, tok.as_ref());
    artifact::write_json(output, &outcome.chunk_sets)?;
    info!(
        "chunked {} documents ({} empty) -> {}",
        outcome.chunk_sets.len(),
        outcome.skipped.len(),
        output.display()
    );
    Ok(())
}

fn summarize(cfg: &Config, input: &Path, chunks: Option<&Path>, output: &Path) -> Result<()> {
    let documents = load_documents(input)?;
    let chunk_sets = match chunks {
        Some(p) => load_chunks(p)?,
        None => Vec::new(),
    };
    let pipeline = build_pipeline(cfg)?;
    let (summaries, report) = pipeline.summarize(&documents, &chunk_sets);
    artifact::write_json(output, &summaries)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn evaluate(
    cfg: &Config,
    references: &Path,
    candidates: &Path,
    output: Option<&Path>,
    filter: &EvalFilter,
) -> Result<()> {
    let documents = load_documents(references)?;
    let summaries = load_summaries(candidates)?;
    let scorer = crate::scorer::Scorer::new(cfg.scoring.use_stemmer);
    let mut scores = scorer.evaluate(&documents, &summaries, filter);
    if !cfg.scoring.per_document {
        scores.per_document.clear();
    }
    if let Some(out) = output {
        artifact::write_json(out, &scores)?;
    }
    println!("{}", serde_json::to_string_pretty(&scores)?);
    Ok(())
}

fn status(cfg: &Config, job_id: &str, out_override: Option<&Path>) -> Result<()> {
    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let store = FileJobStore::new(&out_root);
    let record = store.get(job_id)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn run(args: &Args, cfg: &Config, input: &Path, out_override: Option<&Path>) -> Result<()> {
    let raw = read_raw(input)?;

    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let input_hash =
        hash_file(input).with_context(|| format!("hashing input: {}", input.display()))?;
    let spec = JobSpec {
        dataset: cfg.global.dataset.clone(),
        input: input.display().to_string(),
        config_hash: cfg_hash,
        input_hash,
    };

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let store = FileJobStore::new(&out_root);
    let job_dir = store.job_dir(&spec.job_id());

    if job_dir.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "job_dir already exists and resume=false: {}",
            job_dir.display()
        ));
    }

    ensure_dir(&job_dir)?;
    ensure_dir(&job_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&job_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    let job_id = store.create(&spec)?;
    info!(
        "job_id={job_id} dataset={} out={}",
        cfg.global.dataset,
        job_dir.display()
    );

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    let started = now_rfc3339();
    let pipeline = match build_pipeline(cfg) {
        Ok(p) => p,
        Err(err) => {
            store.update(&job_id, crate::jobs::JobPatch::failed(format!("{err:#}")))?;
            return Err(err);
        }
    };
    let result = pipeline.run_job(&raw, &job_dir, &store, &job_id)?;

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "job_id": job_id,
            "dataset": cfg.global.dataset,
            "started": started,
            "finished": now_rfc3339(),
            "cleaned": cfg.output.cleaned_filename,
            "chunks": cfg.chunking.enabled.then_some(&cfg.output.chunks_filename),
            "summaries": cfg.output.summaries_filename,
            "scores": cfg.output.scores_filename,
            "report": cfg.output.report_filename,
        });
        std::fs::write(job_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "job_dir": job_dir,
                "status": "ok",
                "results": result.results(),
            }))?
        );
    }

    Ok(())
}

fn resolve_log_path(cfg: &Config, job_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(job_dir) = job_dir {
        return Some(job_dir.join("logs").join("lexsum.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("lexsum.log"))
}
