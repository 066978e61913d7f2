use super::{DocDiag, GenerateIn, GenerateOut, Generator, LengthBounds};
use crate::{config::Config, error::GenerateError};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCRIPT: &str = "t5_generate.py";

/// T5 generation served by a long-lived python worker.
///
/// The worker loads the model once and then answers one JSON request per line on
/// stdin with one JSON response per line on stdout. Calls are serialized through a
/// mutex. A call that exceeds `generation.timeout_seconds` kills the worker; the
/// next call starts a fresh one.
pub struct PythonGenerator {
    cfg: Config,
    script: PathBuf,
    python_exe: PathBuf,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    diag: DocDiag,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl PythonGenerator {
    pub fn new(cfg: &Config) -> Result<Self> {
        let script = PathBuf::from(&cfg.paths.scripts_dir).join(SCRIPT);
        if !script.exists() {
            return Err(anyhow!("missing script: {}", script.display()));
        }
        let python_exe = resolve_python_exe(&cfg.generation.python_exe)?;
        Ok(Self {
            cfg: cfg.clone(),
            script,
            python_exe,
            worker: Mutex::new(None),
        })
    }

    fn spawn_worker(&self) -> Result<Worker> {
        info!(
            "starting generation worker {} model={} device={}",
            self.script.display(),
            self.cfg.generation.model_name,
            self.cfg.generation.device
        );
        let mut cmd = Command::new(&self.python_exe);
        cmd.arg(&self.script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env("LEXSUM_MODEL", &self.cfg.generation.model_name);
        cmd.env("LEXSUM_DEVICE", &self.cfg.generation.device);
        cmd.env(
            "LEXSUM_FP16",
            if self.cfg.generation.use_fp16 { "1" } else { "0" },
        );
        for (k, v) in &self.cfg.generation.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning python: {}", self.script.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr"))?;

        // Drain both pipes; a full stderr buffer would stall the worker.
        let (tx, lines) = unbounded();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let keep_stderr = self.cfg.debug.keep_python_stderr;
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                if keep_stderr {
                    debug!("python stderr: {}", line.trim_end());
                }
            }
        });

        let ready = recv_line(
            &lines,
            Duration::from_secs(self.cfg.generation.startup_timeout_seconds.max(1)),
        )
        .map_err(|e| anyhow!("generation worker did not start: {e}"))?;
        let diag: DocDiag = serde_json::from_str(&ready)
            .with_context(|| "parsing generation worker ready line")?;
        if !diag.ok {
            return Err(anyhow!(
                "generation worker failed to load model: {}",
                diag.error.clone().unwrap_or_default()
            ));
        }
        info!(
            "generation worker ready device={}",
            diag.device.as_deref().unwrap_or("?")
        );

        Ok(Worker {
            child,
            stdin,
            lines,
            diag,
        })
    }

    fn request(&self, req: &GenerateIn) -> std::result::Result<GenerateOut, GenerateError> {
        let mut slot = self
            .worker
            .lock()
            .map_err(|_| GenerateError::failed("generation worker lock poisoned"))?;

        if slot.is_none() {
            let worker = self
                .spawn_worker()
                .map_err(|e| GenerateError::failed(format!("{e:#}")))?;
            *slot = Some(worker);
        }
        let Some(worker) = slot.as_mut() else {
            return Err(GenerateError::failed("generation worker unavailable"));
        };

        let line = serde_json::to_string(req).map_err(|e| GenerateError::failed(e.to_string()))?;
        let written = writeln!(worker.stdin, "{line}").and_then(|_| worker.stdin.flush());
        if let Err(e) = written {
            *slot = None;
            return Err(GenerateError::failed(format!("writing to worker: {e}")));
        }

        let timeout_seconds = self.cfg.generation.timeout_seconds;
        let timeout = if timeout_seconds > 0 {
            Duration::from_secs(timeout_seconds)
        } else {
            Duration::MAX
        };

        match recv_line(&worker.lines, timeout) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| GenerateError::failed(format!("parsing worker output: {e}"))),
            Err(LineError::Timeout) => {
                warn!("generation worker timed out after {timeout_seconds}s; restarting");
                *slot = None;
                Err(GenerateError::Timeout {
                    seconds: timeout_seconds,
                })
            }
            Err(e) => {
                *slot = None;
                Err(GenerateError::failed(e.to_string()))
            }
        }
    }
}

impl Generator for PythonGenerator {
    fn generate_batch(
        &self,
        prompts: &[String],
        bounds: LengthBounds,
    ) -> std::result::Result<Vec<String>, GenerateError> {
        let g = &self.cfg.generation;
        let req = GenerateIn {
            cmd: "generate".into(),
            prompts: prompts.to_vec(),
            min_len: bounds.min_len,
            max_len: bounds.max_len,
            num_beams: g.num_beams,
            length_penalty: g.length_penalty,
            no_repeat_ngram_size: g.no_repeat_ngram_size,
            max_input_tokens: g.max_input_tokens,
        };
        debug!(
            "generate batch={} min_len={} max_len={}",
            prompts.len(),
            bounds.min_len,
            bounds.max_len
        );

        let out = self.request(&req)?;
        if out.oom {
            return Err(GenerateError::ResourceExhausted {
                batch: prompts.len(),
            });
        }
        if !out.ok {
            return Err(GenerateError::Failed(
                out.error.unwrap_or_else(|| "worker returned ok=false".into()),
            ));
        }
        if out.summaries.len() != prompts.len() {
            return Err(GenerateError::CountMismatch {
                expected: prompts.len(),
                got: out.summaries.len(),
            });
        }
        Ok(out.summaries)
    }

    fn doctor(&self) -> Result<DocDiag> {
        let mut slot = self
            .worker
            .lock()
            .map_err(|_| anyhow!("generation worker lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.spawn_worker()?);
        }
        let mut diag = slot
            .as_ref()
            .map(|w| w.diag.clone())
            .ok_or_else(|| anyhow!("generation worker unavailable"))?;
        diag.python_exe = Some(self.python_exe.display().to_string());
        Ok(diag)
    }
}

#[derive(Debug, thiserror::Error)]
enum LineError {
    #[error("timed out waiting for worker")]
    Timeout,
    #[error("worker exited")]
    Closed,
    #[error("reading worker stdout: {0}")]
    Io(#[from] std::io::Error),
}

fn recv_line(
    lines: &Receiver<std::io::Result<String>>,
    timeout: Duration,
) -> std::result::Result<String, LineError> {
    loop {
        let line = match lines.recv_timeout(timeout) {
            Ok(line) => line?,
            Err(RecvTimeoutError::Timeout) => return Err(LineError::Timeout),
            Err(RecvTimeoutError::Disconnected) => return Err(LineError::Closed),
        };
        // Libraries sometimes print to stdout; only JSON objects are protocol lines.
        if line.trim_start().starts_with('{') {
            return Ok(line);
        }
        debug!("python stdout (ignored): {}", line.trim_end());
    }
}

fn resolve_python_exe(raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("LEXSUM_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return Ok(p);
            }
        }
        let venv = Path::new(".venv/bin/python");
        if venv.exists() {
            return Ok(venv.to_path_buf());
        }
        return Ok(PathBuf::from("python3"));
    }
    Ok(expand_tilde(raw))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_line_skips_non_protocol_output() {
        let (tx, rx) = unbounded();
        tx.send(Ok("Loading checkpoint shards".to_string())).unwrap();
        tx.send(Ok("{\"ok\":true}".to_string())).unwrap();
        let line = recv_line(&rx, Duration::from_millis(100)).unwrap();
        assert_eq!(line, "{\"ok\":true}");
    }

    #[test]
    fn recv_line_reports_timeout_and_close() {
        let (tx, rx) = unbounded::<std::io::Result<String>>();
        assert!(matches!(
            recv_line(&rx, Duration::from_millis(10)),
            Err(LineError::Timeout)
        ));
        drop(tx);
        assert!(matches!(
            recv_line(&rx, Duration::from_millis(10)),
            Err(LineError::Closed)
        ));
    }

    #[test]
    fn missing_script_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.paths.scripts_dir = dir.path().display().to_string();
        assert!(PythonGenerator::new(&cfg).is_err());
    }
}
