pub mod config;
pub mod init;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ol_domain::config::Config;

/// openlive — live-room event client for the open broadcast platform.
#[derive(Debug, Parser)]
#[command(name = "openlive", version, about)]
pub struct Cli {
    /// Path to the JSON config file (overrides `OPENLIVE_CONFIG`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines instead of plain text.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the session and log every event until Ctrl-C (default).
    Run,
    /// Write a config template if none exists yet.
    Init,
    /// Validate the config file and report any issues.
    Check,
}

pub const CONFIG_ENV: &str = "OPENLIVE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

// ── Config loading helper ─────────────────────────────────────────────

/// `--config`, else `OPENLIVE_CONFIG`, else `config.json`.
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    resolve_with_env(flag, std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn resolve_with_env(flag: Option<&Path>, env: Option<PathBuf>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or(env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Result of [`load_config`].
#[derive(Debug)]
pub enum Loaded {
    Config(Config),
    /// The file did not exist; a template was written in its place.
    TemplateWritten,
}

/// Load the config at `path`, writing the template there when it is absent.
pub fn load_config(path: &Path) -> anyhow::Result<Loaded> {
    if !path.exists() {
        write_template(path)?;
        return Ok(Loaded::TemplateWritten);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Loaded::Config(config))
}

pub fn write_template(path: &Path) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(&Config::template())?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

pub fn print_fill_in_hint(path: &Path) {
    let shown = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    println!(
        "Please fill in code, app_id, accessKeyId and accessKeySecret in {}",
        shown.display()
    );
}
