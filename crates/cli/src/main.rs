//! Crisis CLI
//!
//! Main entry point for the crisis command-line tool.
//! Keeps the crisis response agent's retrieval corpus in sync with its
//! source documents.

mod commands;

use clap::{Parser, Subcommand};
use commands::CorpusCommand;
use crisis_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppResult,
};
use std::path::PathBuf;
use tracing::Instrument;

/// Crisis CLI - corpus tooling for the crisis response agent
#[derive(Parser, Debug)]
#[command(name = "crisis")]
#[command(about = "Corpus tooling for the crisis response agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CRISIS_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Retrieval corpus management
    Corpus(CorpusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load(cli.workspace)?.with_overrides(
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
        cli.log_json,
    )?;

    let format = if config.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("Crisis CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Storage: {:?}, index: {:?}",
        config.corpus.storage.kind,
        config.corpus.index.kind
    );

    config.ensure_crisis_dir()?;

    let command_name = match &cli.command {
        Commands::Corpus(_) => "corpus",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = match &cli.command {
        Commands::Corpus(cmd) => cmd.execute(&config).instrument(span).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use commands::corpus::CorpusAction;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync() {
        let cli = Cli::try_parse_from([
            "crisis",
            "--verbose",
            "corpus",
            "sync",
            "--url",
            "https://example.org/a.pdf",
            "--url",
            "https://example.org/b.pdf",
            "--timeout",
            "30",
            "--json",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Corpus(cmd) = cli.command;
        match cmd.action {
            CorpusAction::Sync(sync) => {
                assert_eq!(sync.url.len(), 2);
                assert_eq!(sync.timeout, Some(30));
                assert!(sync.json);
                assert!(sync.manifest.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_parse_inspection_commands() {
        for action in ["files", "list", "status", "forget"] {
            assert!(Cli::try_parse_from(["crisis", "corpus", action]).is_ok());
        }
        assert!(Cli::try_parse_from(["crisis", "corpus", "forget", "--json"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["crisis", "corpus", "status", "--log-json", "--no-color"])
            .unwrap();
        assert!(cli.log_json);
        assert!(cli.no_color);
    }
}
