//! Pipeline configuration stored in `forge.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "forge.toml";

/// Top-level configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Where synthesized files are written.
    pub output_dir: PathBuf,

    /// Where the knowledge-store index lives.
    pub memory_dir: PathBuf,

    /// Write synthesized files to `output_dir`.
    pub persist: bool,

    /// Number of memory records retrieved per objective.
    pub retrieval_k: usize,

    pub validator: ValidatorConfig,
    pub engine: EngineConfig,
    pub planner: PlannerConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Texts longer than this many characters are flagged.
    pub max_length: usize,
    /// Ask the reasoning engine to rate instruction fidelity and safety.
    pub external_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Program and arguments; the prompt is written to its stdin.
    pub command: Vec<String>,
    /// Per-call wall-clock limit in seconds.
    pub timeout_secs: u64,
    /// Captured stdout/stderr is truncated beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Answer every prompt with placeholders instead of running `command`.
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimensions: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated_code"),
            memory_dir: PathBuf::from("rag_memory"),
            persist: true,
            retrieval_k: 3,
            validator: ValidatorConfig::default(),
            engine: EngineConfig::default(),
            planner: PlannerConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_length: 2500,
            external_check: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 10 * 60,
            output_limit_bytes: 200_000,
            offline: false,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retrieval_k == 0 {
            return Err(anyhow!("retrieval_k must be > 0"));
        }
        if self.validator.max_length == 0 {
            return Err(anyhow!("validator.max_length must be > 0"));
        }
        let command_missing =
            self.engine.command.is_empty() || self.engine.command[0].trim().is_empty();
        if command_missing && !self.engine.offline {
            return Err(anyhow!("engine.command must be a non-empty array"));
        }
        if self.engine.timeout_secs == 0 {
            return Err(anyhow!("engine.timeout_secs must be > 0"));
        }
        if self.engine.output_limit_bytes == 0 {
            return Err(anyhow!("engine.output_limit_bytes must be > 0"));
        }
        if self.planner.max_attempts == 0 {
            return Err(anyhow!("planner.max_attempts must be > 0"));
        }
        if self.embedding.dimensions == 0 {
            return Err(anyhow!("embedding.dimensions must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

/// Write `contents` next to `path` and rename over it.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| anyhow!("path has no file name {}", path.display()))?;
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
