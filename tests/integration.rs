use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

/// Minimal one-page PDF whose only text is `phrase`.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("ml.txt"),
        "Machine learning models learn patterns from data.\x0cGradient descent minimizes the training loss.",
    )
    .unwrap();
    fs::write(
        files_dir.join("cooking.md"),
        "# Soup\n\nA recipe for tomato soup with fresh basil.",
    )
    .unwrap();
    fs::write(
        files_dir.join("transformers.pdf"),
        minimal_pdf_with_phrase("attention heads phrase"),
    )
    .unwrap();

    let other_dir = root.join("other");
    fs::create_dir_all(&other_dir).unwrap();
    fs::write(
        other_dir.join("notes.txt"),
        "Unrelated notes about machine maintenance schedules.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/rag.sqlite"

[chunking]
chunk_size = 200
chunk_overlap = 20

[retrieval]
top_k = 5

[embedding]
provider = "disabled"

[llm]
provider = "disabled"
"#,
        root.display()
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

fn other_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("other")
}

/// `init` then ingest the `files/` directory as `session`.
fn ingest_files(config_path: &Path, session: &str) {
    let (_, stderr, ok) = run_rag(config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let dir = files_dir(config_path);
    let (stdout, stderr, ok) = run_rag(
        config_path,
        &["ingest", dir.to_str().unwrap(), "--session-id", session],
    );
    assert!(ok, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rag(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_rag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["init"]);

    let dir = files_dir(&config_path);
    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files processed: 3"), "stdout: {}", stdout);
    assert!(stdout.contains("chunks written: 4"), "stdout: {}", stdout);
    assert!(stdout.contains("skipped: 0"));
    assert!(stdout.contains("session: "));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_search_finds_text_page() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, stderr, success) = run_rag(&config_path, &["search", "gradient descent"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("ml.txt / page 2"), "stdout: {}", stdout);
    assert!(!stdout.contains("cooking.md"));
}

#[test]
fn test_search_finds_pdf_text() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, success) = run_rag(&config_path, &["search", "attention heads"]);
    assert!(success);
    assert!(stdout.contains("transformers.pdf / page 1"), "stdout: {}", stdout);
}

#[test]
fn test_search_no_match() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, success) = run_rag(&config_path, &["search", "xyzzy"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_empty_corpus() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["init"]);

    let (stdout, _, success) = run_rag(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (first, _, _) = run_rag(&config_path, &["search", "machine", "--json"]);
    let (second, _, _) = run_rag(&config_path, &["search", "machine", "--json"]);
    assert_eq!(first, second);
}

#[test]
fn test_session_scope_isolates_uploads() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");
    let other = other_dir(&config_path);
    let (_, stderr, ok) = run_rag(
        &config_path,
        &["ingest", other.to_str().unwrap(), "--session-id", "s2"],
    );
    assert!(ok, "second ingest failed: {}", stderr);

    let (stdout, _, _) = run_rag(&config_path, &["search", "machine", "--session-id", "s2"]);
    assert!(stdout.contains("notes.txt"));
    assert!(!stdout.contains("ml.txt"));

    let (stdout, _, _) = run_rag(&config_path, &["search", "machine", "--session-id", "s1"]);
    assert!(stdout.contains("ml.txt"));
    assert!(!stdout.contains("notes.txt"));

    let (stdout, _, _) = run_rag(&config_path, &["search", "machine", "--scope", "all"]);
    assert!(stdout.contains("ml.txt"));
    assert!(stdout.contains("notes.txt"));
}

#[test]
fn test_session_scope_without_id_returns_nothing() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, success) = run_rag(&config_path, &["search", "machine", "--scope", "session"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_selected_scope() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, _) = run_rag(&config_path, &["search", "soup", "--source", "cooking.md"]);
    assert!(stdout.contains("cooking.md"));

    // The only matching file is outside the selection.
    let (stdout, _, _) = run_rag(&config_path, &["search", "soup", "--source", "ml.txt"]);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_ask_requires_llm() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (_, stderr, success) = run_rag(&config_path, &["ask", "What is gradient descent?"]);
    assert!(!success);
    assert!(stderr.contains("[llm]"), "stderr: {}", stderr);
}

#[test]
fn test_documents_lists_session() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, success) = run_rag(&config_path, &["documents", "--session-id", "s1"]);
    assert!(success);
    assert!(stdout.contains("ml.txt"));
    assert!(stdout.contains("cooking.md"));
    assert!(stdout.contains("3 document(s)"));

    let (stdout, _, _) = run_rag(&config_path, &["documents", "--session-id", "nope"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_stats_json() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, success) = run_rag(&config_path, &["stats", "--json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["documents"], 3);
    assert_eq!(stats["chunks"], 4);
    assert_eq!(stats["lexical_chunks"], 4);
    assert!(stats["vector_chunks"].is_null());
}

#[test]
fn test_page_lookup_and_correct() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (stdout, _, _) = run_rag(&config_path, &["search", "basil", "--json"]);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let chunk_id = results[0]["chunk"]["chunk_id"].as_u64().unwrap().to_string();

    let (_, stderr, success) = run_rag(
        &config_path,
        &["correct", &chunk_id, "--source-file", "soup.md", "--page", "7"],
    );
    assert!(success, "correct failed: {}", stderr);

    let (stdout, _, _) = run_rag(&config_path, &["page", "soup.md", "7"]);
    assert!(stdout.contains("tomato soup"));

    let (stdout, _, _) = run_rag(&config_path, &["search", "basil", "--source", "soup.md"]);
    assert!(stdout.contains("soup.md / page 7"));
}

#[test]
fn test_correct_unknown_chunk_fails() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (_, _, success) = run_rag(&config_path, &["correct", "9999", "--page", "2"]);
    assert!(!success);
}

#[test]
fn test_clear_then_search_empty() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (_, _, success) = run_rag(&config_path, &["clear"]);
    assert!(success);

    let (stdout, _, _) = run_rag(&config_path, &["search", "machine", "--scope", "all"]);
    assert!(stdout.contains("No results."));
    let (stdout, _, _) = run_rag(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_reindex_preserves_results() {
    let (_tmp, config_path) = setup_test_env();
    ingest_files(&config_path, "s1");

    let (before, _, _) = run_rag(&config_path, &["search", "machine", "--json"]);
    let (stdout, _, success) = run_rag(&config_path, &["reindex"]);
    assert!(success);
    assert!(stdout.contains("chunks indexed: 4"));
    let (after, _, _) = run_rag(&config_path, &["search", "machine", "--json"]);
    assert_eq!(before, after);
}

#[test]
fn test_bad_pdf_skipped() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["init"]);
    let bad = files_dir(&config_path).join("broken.pdf");
    fs::write(&bad, b"not a pdf").unwrap();

    let dir = files_dir(&config_path);
    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("files processed: 3"));
    assert!(stdout.contains("skipped: 1"));
    assert!(stdout.contains("broken.pdf"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_rag(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
