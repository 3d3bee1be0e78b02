//! Reasoning-engine abstraction.
//!
//! The [`ReasoningEngine`] trait decouples the pipeline from the actual model
//! backend (by default `codex exec`, fed the prompt on stdin). Tests use
//! scripted engines that return predetermined responses without spawning
//! processes.

use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::EngineConfig;
use crate::io::offline::OfflineEngine;
use crate::io::process::run_with_timeout;

/// Why an engine call produced no usable text.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine could not be started: {0}")]
    Spawn(String),
    #[error("engine timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("engine exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("engine returned an empty response")]
    EmptyResponse,
    #[error("engine output exceeded the capture limit by {bytes} bytes")]
    OutputTruncated { bytes: usize },
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }
}

/// Synchronous text-in, text-out model call.
pub trait ReasoningEngine {
    fn invoke(&self, prompt: &str) -> Result<String, EngineError>;
}

impl<T: ReasoningEngine + ?Sized> ReasoningEngine for &T {
    fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        (**self).invoke(prompt)
    }
}

/// Engine that spawns a configured command per call.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandEngine {
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut parts = config.command.iter().cloned();
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl ReasoningEngine for CommandEngine {
    #[instrument(skip_all, fields(program = %self.program, prompt_bytes = prompt.len()))]
    fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        info!("invoking reasoning engine");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = run_with_timeout(
            cmd,
            Some(prompt.as_bytes().to_vec()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| EngineError::Spawn(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "engine timed out");
            return Err(EngineError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "engine failed");
            return Err(EngineError::Failed {
                code: output.status.code(),
                stderr: output.stderr_lossy().trim().to_string(),
            });
        }

        if output.truncated_bytes > 0 {
            warn!(truncated_bytes = output.truncated_bytes, "engine output truncated");
            return Err(EngineError::OutputTruncated {
                bytes: output.truncated_bytes,
            });
        }

        let text = output.stdout_lossy().trim().to_string();
        if text.is_empty() {
            return Err(EngineError::EmptyResponse);
        }
        debug!(response_bytes = text.len(), "engine responded");
        Ok(text)
    }
}

/// The engine selected by `[engine]` configuration.
#[derive(Debug, Clone)]
pub enum EngineBackend {
    Command(CommandEngine),
    Offline(OfflineEngine),
}

impl EngineBackend {
    pub fn from_config(config: &EngineConfig) -> Self {
        if config.offline {
            info!("using offline engine");
            EngineBackend::Offline(OfflineEngine::new())
        } else {
            EngineBackend::Command(CommandEngine::from_config(config))
        }
    }
}

impl ReasoningEngine for EngineBackend {
    fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        match self {
            EngineBackend::Command(engine) => engine.invoke(prompt),
            EngineBackend::Offline(engine) => engine.invoke(prompt),
        }
    }
}
