use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("alpha.md"),
        "# Alpha\n\nHow the release pipeline publishes artifacts.",
    )
    .unwrap();
    fs::write(docs.join("notes.txt"), "Deployment notes.").unwrap();
    fs::write(docs.join("logo.svg"), "<svg/>").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("rag.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/rag.sqlite"

[workspace]
root = "{root}"

[embedding]
provider = "disabled"
"#,
            root = root.display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_rag"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run rag binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_rag(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/rag.sqlite").exists());

    let (_, stderr, ok) = run_rag(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_files_on_empty_index() {
    let (_tmp, config) = setup_test_env();
    run_rag(&config, &["init"]);

    let (stdout, _, ok) = run_rag(&config, &["files"]);
    assert!(ok);
    assert!(stdout.contains("No files indexed."));

    let (stdout, _, ok) = run_rag(&config, &["--json", "files"]);
    assert!(ok);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["total"], 0);
    assert!(json["files"].as_array().unwrap().is_empty());
}

#[test]
fn test_ingest_without_embeddings_skips_every_file() {
    let (_tmp, config) = setup_test_env();
    run_rag(&config, &["init"]);

    let (stdout, stderr, ok) = run_rag(&config, &["--json", "ingest", "docs"]);
    assert!(ok, "ingest failed: {}", stderr);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_files"], 2);
    assert_eq!(stats["skipped_files"], 2);
    assert_eq!(stats["new_files"], 0);

    let (stdout, _, _) = run_rag(&config, &["files"]);
    assert!(stdout.contains("No files indexed."));
}

#[test]
fn test_ingest_missing_directory_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_rag(&config, &["ingest", "nowhere"]);
    assert!(!ok);
    assert!(stderr.contains("nowhere"));
}

#[test]
fn test_search_rejects_blank_query() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_rag(&config, &["search", "   "]);
    assert!(!ok);
    assert!(stderr.contains("query must not be empty"));

    let (_, stderr, ok) = run_rag(&config, &["search", "release", "--top-k", "50"]);
    assert!(!ok);
    assert!(stderr.contains("top_k"));
}

#[test]
fn test_search_without_embeddings_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, _, ok) = run_rag(&config, &["search", "release pipeline"]);
    assert!(!ok);
}

#[test]
fn test_unknown_provider_is_rejected() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_rag(&config, &["raw", "hello", "--provider", "claude"]);
    assert!(!ok);
    assert!(stderr.contains("claude"));
}

#[test]
fn test_remove_unknown_path_fails() {
    let (_tmp, config) = setup_test_env();
    run_rag(&config, &["init"]);
    let (_, stderr, ok) = run_rag(&config, &["remove", "docs/alpha.md"]);
    assert!(!ok);
    assert!(stderr.contains("not indexed"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_rag(&tmp.path().join("absent.toml"), &["files"]);
    assert!(!ok);
    assert!(stderr.contains("failed to load config"));
}
