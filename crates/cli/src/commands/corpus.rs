//! Corpus command handler.
//!
//! Synchronizes the crisis document set with the retrieval corpus and
//! inspects the stored corpus.

use clap::{Args, Subcommand};
use crisis_core::{config::AppConfig, AppError, AppResult};
use crisis_corpus::{
    CancelFlag, DocumentStatus, ProgressEvent, ProgressReporter, RunOptions, SyncReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Retrieval corpus management
#[derive(Args, Debug)]
pub struct CorpusCommand {
    #[command(subcommand)]
    pub action: CorpusAction,
}

#[derive(Subcommand, Debug)]
pub enum CorpusAction {
    /// Mirror documents and register them with the corpus
    Sync(CorpusSyncCommand),
    /// List documents in the stored corpus
    Files(CorpusFilesCommand),
    /// List corpora visible to the index
    List(CorpusListCommand),
    /// Show the stored corpus id and whether it resolves
    Status(CorpusStatusCommand),
    /// Remove the stored corpus id from the workspace
    Forget(CorpusForgetCommand),
}

/// Mirror documents and register them with the corpus
#[derive(Args, Debug)]
pub struct CorpusSyncCommand {
    /// YAML manifest listing the documents (default: built-in crisis documents)
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Additional document URLs
    #[arg(long)]
    pub url: Vec<String>,

    /// Stop starting new documents after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusSyncCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus sync command");

        let documents =
            crisis_corpus::load_documents(config, self.manifest.as_deref(), &self.url)?;
        if documents.is_empty() {
            return Err(AppError::Config("No documents to sync".to_string()));
        }

        let cancel = CancelFlag::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; stopping after the current document");
                    cancel.cancel();
                }
            })
        };

        let progress = if self.json {
            ProgressReporter::noop()
        } else {
            ProgressReporter::new(Arc::new(|event: ProgressEvent| eprintln!("{}", event)))
        };

        let options = RunOptions {
            timeout: self.timeout.map(Duration::from_secs),
            cancel,
            progress,
        };

        let result = crisis_corpus::run_sync(config, &documents, options).await;
        watcher.abort();
        let report = result?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report, &config.corpus.state_key);
        }

        match &report.halted {
            Some(reason) => Err(AppError::Corpus(format!("Sync halted: {}", reason))),
            None => Ok(()),
        }
    }
}

fn print_report(report: &SyncReport, state_key: &str) {
    let verb = if report.corpus_created { "Created" } else { "Using" };
    println!("{} corpus {}", verb, report.corpus_id);

    for outcome in &report.outcomes {
        let label = match &outcome.status {
            DocumentStatus::Ingested => "ingested".to_string(),
            DocumentStatus::AlreadyPresent => "present".to_string(),
            DocumentStatus::Duplicate => "duplicate".to_string(),
            DocumentStatus::Failed { message, .. } => format!("failed: {}", message),
            DocumentStatus::NotAttempted => "not attempted".to_string(),
        };
        println!("  {} ({})", outcome.uri, label);
    }

    println!(
        "{} ingested, {} already present, {} failed, {} not attempted in {:.2}s",
        report.ingested_count(),
        report.already_present_count(),
        report.failed_count(),
        report.not_attempted_count(),
        report.duration_secs
    );

    if report.cancelled {
        println!("Run stopped early; re-run to finish the remaining documents");
    }
    println!("Corpus id stored under {}", state_key);
}

/// List documents in the stored corpus
#[derive(Args, Debug)]
pub struct CorpusFilesCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusFilesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus files command");

        let files = crisis_corpus::list_files(config).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&files)?);
        } else if files.is_empty() {
            println!("Corpus has no files");
        } else {
            println!("Files in corpus:");
            for file in &files {
                match &file.source_uri {
                    Some(uri) => println!("- {} ({})", file.display_name, uri),
                    None => println!("- {}", file.display_name),
                }
            }
        }

        Ok(())
    }
}

/// List corpora visible to the index
#[derive(Args, Debug)]
pub struct CorpusListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusListCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus list command");

        let corpora = crisis_corpus::list_corpora(config).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&corpora)?);
        } else if corpora.is_empty() {
            println!("No corpora found");
        } else {
            for corpus in &corpora {
                println!("- {} ({})", corpus.display_name, corpus.id);
            }
        }

        Ok(())
    }
}

/// Show the stored corpus id and whether it resolves
#[derive(Args, Debug)]
pub struct CorpusStatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusStatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus status command");

        let status = crisis_corpus::status(config).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        println!("State file: {}", status.env_file.display());
        println!("Index backend: {}", status.backend);
        match (&status.stored_id, &status.corpus) {
            (None, _) => println!("{}: not set", status.state_key),
            (Some(id), Some(corpus)) => {
                println!("{}: {}", status.state_key, id);
                println!("  Display name: {}", corpus.display_name);
            }
            (Some(id), None) => {
                println!("{}: {} (not found; next sync creates a new corpus)", status.state_key, id);
            }
        }

        Ok(())
    }
}

/// Remove the stored corpus id from the workspace
#[derive(Args, Debug)]
pub struct CorpusForgetCommand {}

impl CorpusForgetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus forget command");

        match crisis_corpus::forget(config)? {
            Some(id) => println!("Forgot corpus {}", id),
            None => println!("No corpus id stored under {}", config.corpus.state_key),
        }

        Ok(())
    }
}

impl CorpusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            CorpusAction::Sync(cmd) => cmd.execute(config).await,
            CorpusAction::Files(cmd) => cmd.execute(config).await,
            CorpusAction::List(cmd) => cmd.execute(config).await,
            CorpusAction::Status(cmd) => cmd.execute(config).await,
            CorpusAction::Forget(cmd) => cmd.execute(config).await,
        }
    }
}
