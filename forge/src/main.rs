//! `forge` command-line entry point.
//!
//! `forge run` drives the full pipeline; `remember`, `recall` and `forget`
//! manage the corrective-insight memory; `init` writes a default `forge.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use forge::core::insight::InsightPackage;
use forge::exit_codes;
use forge::io::config::{DEFAULT_CONFIG_FILE, ForgeConfig, load_config, write_config};
use forge::io::embedder::HashingEmbedder;
use forge::io::engine::EngineBackend;
use forge::io::knowledge::{KnowledgeStore, StoreStatus};
use forge::logging;
use forge::pipeline::{PipelineConfig, PipelineDeps, run_pipeline};
use forge::planner::{EnginePlanner, PlannerSettings};

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Turn a software request into generated source files"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline for QUERY and print the result as JSON.
    Run {
        query: String,
        /// Where generated files are written.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Where the knowledge-store index lives.
        #[arg(long)]
        memory_dir: Option<PathBuf>,
    },
    /// Store an insight package (JSON file) in memory.
    Remember {
        file: PathBuf,
        #[arg(long)]
        memory_dir: Option<PathBuf>,
    },
    /// Print the insights most similar to QUERY.
    Recall {
        query: String,
        /// Number of records (defaults to `retrieval_k`).
        #[arg(short)]
        k: Option<usize>,
        #[arg(long)]
        memory_dir: Option<PathBuf>,
    },
    /// Remove every stored insight.
    Forget {
        /// Confirm the clear.
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        memory_dir: Option<PathBuf>,
    },
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            query,
            output_dir,
            memory_dir,
        } => cmd_run(&cli.config, &query, output_dir, memory_dir),
        Command::Remember { file, memory_dir } => cmd_remember(&cli.config, &file, memory_dir),
        Command::Recall {
            query,
            k,
            memory_dir,
        } => cmd_recall(&cli.config, &query, k, memory_dir),
        Command::Forget { yes, memory_dir } => cmd_forget(&cli.config, yes, memory_dir),
        Command::Init { force } => cmd_init(&cli.config, force),
    }
}

fn cmd_run(
    config_path: &Path,
    query: &str,
    output_dir: Option<PathBuf>,
    memory_dir: Option<PathBuf>,
) -> Result<i32> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let mut cfg = load_config(config_path)?;
    if let Some(dir) = output_dir {
        cfg.output_dir = dir;
    }
    if let Some(dir) = memory_dir {
        cfg.memory_dir = dir;
    }

    let engine = EngineBackend::from_config(&cfg.engine);
    let store = open_store(&cfg);
    let planner = EnginePlanner::new(
        &engine,
        PlannerSettings {
            max_attempts: cfg.planner.max_attempts,
            max_length: cfg.validator.max_length,
            external_check: cfg.validator.external_check,
        },
    );
    let deps = PipelineDeps {
        engine: &engine,
        planner: &planner,
        store: &store,
    };

    let result = run_pipeline(query, &deps, &PipelineConfig::from_forge(&cfg));
    print_json(&result)?;
    Ok(if result.success {
        exit_codes::OK
    } else {
        exit_codes::HALTED
    })
}

fn cmd_remember(config_path: &Path, file: &Path, memory_dir: Option<PathBuf>) -> Result<i32> {
    let cfg = config_with_memory_dir(config_path, memory_dir)?;
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let insight: InsightPackage = serde_json::from_str(&raw)
        .with_context(|| format!("parse insight package {}", file.display()))?;

    let outcome = open_store(&cfg).store(&insight);
    print_json(&outcome)?;
    Ok(match outcome.status {
        StoreStatus::Stored => exit_codes::OK,
        StoreStatus::Failed => exit_codes::INVALID,
    })
}

fn cmd_recall(
    config_path: &Path,
    query: &str,
    k: Option<usize>,
    memory_dir: Option<PathBuf>,
) -> Result<i32> {
    let cfg = config_with_memory_dir(config_path, memory_dir)?;
    let records = open_store(&cfg).retrieve(query, k.unwrap_or(cfg.retrieval_k));
    print_json(&records)?;
    Ok(exit_codes::OK)
}

fn cmd_forget(config_path: &Path, yes: bool, memory_dir: Option<PathBuf>) -> Result<i32> {
    if !yes {
        bail!("refusing to clear memory without --yes");
    }
    let cfg = config_with_memory_dir(config_path, memory_dir)?;
    let store = open_store(&cfg);
    let cleared = store.clear(true)?;
    print_json(&serde_json::json!({
        "cleared": cleared,
        "memory_dir": store.dir().display().to_string(),
    }))?;
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &ForgeConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    Ok(exit_codes::OK)
}

fn config_with_memory_dir(config_path: &Path, memory_dir: Option<PathBuf>) -> Result<ForgeConfig> {
    let mut cfg = load_config(config_path)?;
    if let Some(dir) = memory_dir {
        cfg.memory_dir = dir;
    }
    Ok(cfg)
}

fn open_store(cfg: &ForgeConfig) -> KnowledgeStore<HashingEmbedder> {
    KnowledgeStore::new(
        cfg.memory_dir.clone(),
        HashingEmbedder::new(cfg.embedding.dimensions),
    )
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "forge",
            "run",
            "build a todo app",
            "--output-dir",
            "out",
            "--memory-dir",
            "mem",
        ]);
        match cli.command {
            Command::Run {
                query,
                output_dir,
                memory_dir,
            } => {
                assert_eq!(query, "build a todo app");
                assert_eq!(output_dir, Some(PathBuf::from("out")));
                assert_eq!(memory_dir, Some(PathBuf::from("mem")));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_recall_k() {
        let cli = Cli::parse_from(["forge", "recall", "weather", "-k", "5"]);
        assert!(matches!(cli.command, Command::Recall { k: Some(5), .. }));
    }

    #[test]
    fn parse_forget_defaults_to_unconfirmed() {
        let cli = Cli::parse_from(["forge", "forget"]);
        assert!(matches!(cli.command, Command::Forget { yes: false, .. }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["forge", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }
}
