mod cli;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, Loaded};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli::resolve_config_path(cli.config.as_deref());

    match cli.command {
        // Default to run when no subcommand is given.
        None | Some(Command::Run) => {
            init_tracing(cli.log_json);
            match cli::load_config(&config_path)? {
                Loaded::Config(config) => cli::run::run(config).await,
                Loaded::TemplateWritten => {
                    cli::print_fill_in_hint(&config_path);
                    Ok(())
                }
            }
        }
        Some(Command::Init) => cli::init::init(&config_path),
        Some(Command::Check) => match cli::load_config(&config_path)? {
            Loaded::Config(config) => {
                if !cli::config::check(&config, &config_path) {
                    std::process::exit(1);
                }
                Ok(())
            }
            Loaded::TemplateWritten => {
                cli::print_fill_in_hint(&config_path);
                std::process::exit(1);
            }
        },
    }
}

/// Initialize tracing: compact text by default, one JSON object per line
/// with `--log-json`.
fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ol_client=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}
