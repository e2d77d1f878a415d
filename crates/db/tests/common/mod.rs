// Shared fixtures for the session-scope-db integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use filetime::FileTime;
use session_scope_core::{DecodeError, IndexerConfig, JsonRowDecoder, LineClass, Row, RowDecoder};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub root: PathBuf,
    pub cache: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("sessions");
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&root).unwrap();
        Self { dir, root, cache }
    }

    pub fn config(&self) -> IndexerConfig {
        let mut config = IndexerConfig::new(&self.root, &self.cache);
        config.workers = Some(2);
        config
    }

    pub fn index_file(&self) -> PathBuf {
        self.cache.join("summary-index.json")
    }

    /// Write `lines` to `root/rel` and pin its mtime to `mtime_secs`.
    pub fn write_session(&self, rel: &str, lines: &[String], mtime_secs: i64) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(&path, body).unwrap();
        set_mtime(&path, mtime_secs);
        path
    }
}

pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

pub fn append(path: &Path, line: &str, mtime_secs: i64) {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    writeln!(f, "{line}").unwrap();
    drop(f);
    set_mtime(path, mtime_secs);
}

pub fn meta(ts: &str, id: &str, cwd: &str) -> String {
    format!(
        r#"{{"timestamp":"{ts}","type":"session_meta","payload":{{"id":"{id}","timestamp":"{ts}","cwd":"{cwd}","originator":"codex_cli_rs","cli_version":"0.40.0"}}}}"#
    )
}

pub fn user(ts: &str, text: &str) -> String {
    format!(
        r#"{{"timestamp":"{ts}","type":"response_item","payload":{{"type":"message","role":"user","content":[{{"type":"input_text","text":"{text}"}}]}}}}"#
    )
}

pub fn assistant(ts: &str) -> String {
    format!(
        r#"{{"timestamp":"{ts}","type":"response_item","payload":{{"type":"message","role":"assistant","content":[{{"type":"output_text","text":"ok"}}]}}}}"#
    )
}

pub fn tool(ts: &str) -> String {
    format!(
        r#"{{"timestamp":"{ts}","type":"response_item","payload":{{"type":"function_call","name":"shell","arguments":"{{}}","call_id":"c1"}}}}"#
    )
}

/// Three-line session: start, one user message, one reply.
pub fn simple_session(id: &str, cwd: &str, day: &str) -> Vec<String> {
    vec![
        meta(&format!("{day}T09:00:00Z"), id, cwd),
        user(&format!("{day}T09:00:05Z"), "hello"),
        assistant(&format!("{day}T09:00:09Z")),
    ]
}

/// Decoder that counts full decodes, to observe cache hits.
#[derive(Clone, Default)]
pub struct CountingDecoder {
    inner: Arc<JsonRowDecoder>,
    pub decodes: Arc<AtomicUsize>,
}

impl CountingDecoder {
    pub fn count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl RowDecoder for CountingDecoder {
    fn decode(&self, line: &[u8]) -> Result<Row, DecodeError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(line)
    }

    fn tally(&self, line: &[u8]) -> LineClass {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.tally(line)
    }
}
