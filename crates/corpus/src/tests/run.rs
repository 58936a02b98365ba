//! Persisted runs: the corpus id round-trips through the workspace `.env`.

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use super::{docs, Harness, RecordingIndex, ScriptedSource};
use crate::{
    forget_with, list_files_with, load_documents, run_sync_with, status_with, RunOptions,
};
use crisis_core::{AppConfig, AppError, EnvFile, KeyValueStore};

const GUIDE: &str = "https://example.org/guides/shelter.pdf";
const CHECKLIST: &str = "https://example.org/guides/checklist.pdf";

fn workspace() -> (TempDir, AppConfig, EnvFile) {
    let temp = TempDir::new().unwrap();
    let config = AppConfig {
        workspace: temp.path().to_path_buf(),
        ..AppConfig::default()
    };
    let store = EnvFile::new(config.env_file_path());
    (temp, config, store)
}

fn source() -> ScriptedSource {
    ScriptedSource::default()
        .with(GUIDE, b"%PDF-1.4 shelter")
        .with(CHECKLIST, b"%PDF-1.4 checklist")
}

#[tokio::test]
async fn run_persists_new_corpus_id() {
    let (_temp, config, store) = workspace();
    fs::write(store.path(), "GOOGLE_CLOUD_PROJECT=demo\n# agent settings\nMODEL=gemini\n").unwrap();
    let harness = Harness::new(source());

    let report = run_sync_with(
        &config,
        &docs(&[GUIDE, CHECKLIST]),
        RunOptions::default(),
        harness.backends(),
        &store,
    )
    .await
    .unwrap();

    assert_eq!(
        store.get("RAG_CORPUS").unwrap().as_deref(),
        Some(report.corpus_id.as_str())
    );
    let content = fs::read_to_string(store.path()).unwrap();
    assert!(content.contains("GOOGLE_CLOUD_PROJECT=demo"));
    assert!(content.contains("# agent settings"));
    assert!(content.contains("MODEL=gemini"));
}

#[tokio::test]
async fn second_run_reuses_stored_id() {
    let (_temp, config, store) = workspace();
    let harness = Harness::new(source());
    let documents = docs(&[GUIDE, CHECKLIST]);

    let first = run_sync_with(
        &config,
        &documents,
        RunOptions::default(),
        harness.backends(),
        &store,
    )
    .await
    .unwrap();
    let second = run_sync_with(
        &config,
        &documents,
        RunOptions::default(),
        harness.backends(),
        &store,
    )
    .await
    .unwrap();

    assert_eq!(first.corpus_id, second.corpus_id);
    assert_eq!(second.ingested_count(), 0);
    assert_eq!(harness.index.create_count(), 1);
}

#[tokio::test]
async fn halted_run_still_persists_id() {
    let (_temp, config, store) = workspace();
    let harness = Harness::with_index(source(), RecordingIndex::failing_after(0));

    let report = run_sync_with(
        &config,
        &docs(&[GUIDE, CHECKLIST]),
        RunOptions::default(),
        harness.backends(),
        &store,
    )
    .await
    .unwrap();

    assert!(report.halted.is_some());
    assert_eq!(report.not_attempted_count(), 1);
    assert_eq!(
        store.get("RAG_CORPUS").unwrap().as_deref(),
        Some(report.corpus_id.as_str())
    );
}

#[tokio::test]
async fn zero_timeout_attempts_nothing() {
    let (_temp, config, store) = workspace();
    let harness = Harness::new(source());
    let options = RunOptions {
        timeout: Some(Duration::ZERO),
        ..RunOptions::default()
    };

    let report = run_sync_with(&config, &docs(&[GUIDE]), options, harness.backends(), &store)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.not_attempted_count(), 1);
    assert!(store.get("RAG_CORPUS").unwrap().is_some());
}

#[tokio::test]
async fn malformed_stored_id_fails_without_touching_state() {
    let (_temp, config, store) = workspace();
    store.set("RAG_CORPUS", "not-a-corpus").unwrap();
    let harness = Harness::new(source());

    let err = run_sync_with(
        &config,
        &docs(&[GUIDE]),
        RunOptions::default(),
        harness.backends(),
        &store,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Corpus(msg) if msg.contains("invalid corpus id")));
    assert_eq!(
        store.get("RAG_CORPUS").unwrap().as_deref(),
        Some("not-a-corpus")
    );
}

#[tokio::test]
async fn status_files_and_forget() {
    let (_temp, config, store) = workspace();
    let harness = Harness::new(source());

    let before = status_with(&config, harness.index.as_ref(), &store)
        .await
        .unwrap();
    assert!(before.stored_id.is_none());
    assert!(before.corpus.is_none());

    let report = run_sync_with(
        &config,
        &docs(&[GUIDE, CHECKLIST]),
        RunOptions::default(),
        harness.backends(),
        &store,
    )
    .await
    .unwrap();

    let after = status_with(&config, harness.index.as_ref(), &store)
        .await
        .unwrap();
    assert_eq!(after.corpus.map(|c| c.id), Some(report.corpus_id.clone()));
    assert_eq!(after.backend, "recording");

    let files = list_files_with(&config, harness.index.as_ref(), &store)
        .await
        .unwrap();
    assert_eq!(files.len(), 2);

    let removed = forget_with(&config, &store).unwrap();
    assert_eq!(removed.as_deref(), Some(report.corpus_id.as_str()));
    assert!(store.get("RAG_CORPUS").unwrap().is_none());

    let err = list_files_with(&config, harness.index.as_ref(), &store)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
}

#[test]
fn builtin_documents_without_manifest() {
    let (_temp, config, _store) = workspace();

    let documents = load_documents(&config, None, &[]).unwrap();
    assert_eq!(documents.len(), 2);
    assert!(documents
        .iter()
        .all(|d| d.display_name.is_some() && d.description.is_some()));
}

#[test]
fn manifest_and_extra_urls() {
    let (temp, config, _store) = workspace();
    let manifest = temp.path().join("documents.yaml");
    fs::write(
        &manifest,
        "documents:\n  - url: https://example.org/a.pdf\n    filename: a.pdf\n",
    )
    .unwrap();

    let documents =
        load_documents(&config, Some(&manifest), &["https://example.org/b.pdf".to_string()])
            .unwrap();

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].display_name.as_deref(), Some("a.pdf"));
    assert_eq!(documents[1].uri, "https://example.org/b.pdf");

    let only_urls = load_documents(&config, None, &["https://example.org/c.pdf".to_string()])
        .unwrap();
    assert_eq!(only_urls.len(), 1);
}
