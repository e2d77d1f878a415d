// Active-duration enrichment on top of the summary cache.

mod common;

use std::time::Duration;

use chrono::NaiveDate;
use common::*;
use pretty_assertions::assert_eq;
use session_scope_db::SessionIndex;
use session_scope_types::ScanScope;
use tokio_util::sync::CancellationToken;

/// Three turns: injected context (29s), a tool-using turn (20s), a reply (15s).
fn busy_session() -> Vec<String> {
    vec![
        meta("2025-01-15T10:00:00Z", "busy", "/work"),
        user("2025-01-15T10:00:01Z", "<environment_context>cwd</environment_context>"),
        assistant("2025-01-15T10:00:30Z"),
        user("2025-01-15T10:01:00Z", "fix the bug"),
        tool("2025-01-15T10:01:10Z"),
        assistant("2025-01-15T10:01:20Z"),
        user("2025-01-15T10:02:00Z", "again"),
        assistant("2025-01-15T10:02:15Z"),
    ]
}

fn jan15() -> ScanScope {
    ScanScope::Day(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
}

#[tokio::test]
async fn enrich_sums_turns_and_skips_injected_context() {
    let fx = Fixture::new();
    let path = fx.write_session("2025/01/15/busy.jsonl", &busy_session(), 1_700_000_000);
    let index = SessionIndex::open(fx.config()).unwrap();

    let summary = index
        .enrich(&path, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.active_duration, Some(Duration::from_secs(35)));
    assert_eq!(summary.title.as_deref(), Some("fix the bug"));
    assert_eq!(summary.tool_invocation_count, 1);

    let reopened = SessionIndex::open(fx.config()).unwrap();
    let listed = reopened.refresh(jan15()).await.unwrap();
    assert_eq!(listed[0].active_duration, Some(Duration::from_secs(35)));
}

#[tokio::test]
async fn enrich_keeps_existing_summary_fields() {
    let fx = Fixture::new();
    let path = fx.write_session("2025/01/15/busy.jsonl", &busy_session(), 1_700_000_000);
    let index = SessionIndex::open(fx.config()).unwrap();

    index.annotate(&path, Some("keep me".into())).await.unwrap();
    let enriched = index
        .enrich(&path, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enriched.comment.as_deref(), Some("keep me"));
    assert_eq!(enriched.active_duration, Some(Duration::from_secs(35)));
}

#[tokio::test]
async fn cancelled_enrich_is_not_stored() {
    let fx = Fixture::new();
    let path = fx.write_session("2025/01/15/busy.jsonl", &busy_session(), 1_700_000_000);
    let index = SessionIndex::open(fx.config()).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let partial = index.enrich(&path, &token).await.unwrap().unwrap();
    assert_eq!(partial.active_duration, Some(Duration::ZERO));
    assert_eq!(index.memory_entries(), 0);
    assert_eq!(index.disk_entries(), 0);

    let listed = index.refresh(jan15()).await.unwrap();
    assert_eq!(listed[0].active_duration, None);
}

#[tokio::test]
async fn enrich_missing_file_is_none() {
    let fx = Fixture::new();
    let index = SessionIndex::open(fx.config()).unwrap();
    let missing = fx.root.join("2025/01/15/nope.jsonl");
    assert!(index
        .enrich(&missing, &CancellationToken::new())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn enrich_many_counts_stored_files() {
    let fx = Fixture::new();
    let a = fx.write_session("2025/01/15/a.jsonl", &busy_session(), 1_700_000_000);
    let b = fx.write_session("2025/01/15/b.jsonl", &simple_session("b", "/p", "2025-01-15"), 1_700_000_000);
    let bad = fx.write_session("2025/01/15/bad.jsonl", &["not json".to_string()], 1_700_000_000);
    let gone = fx.root.join("2025/01/15/gone.jsonl");

    let index = SessionIndex::open(fx.config()).unwrap();
    let stored = index
        .enrich_many(vec![a, b.clone(), bad, gone], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stored, 2);
    assert_eq!(index.disk_entries(), 2);

    let listed = index.refresh_files(vec![b]).await.unwrap();
    assert_eq!(listed[0].active_duration, Some(Duration::from_secs(4)));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let none = index
        .enrich_many(vec![fx.root.join("2025/01/15/a.jsonl")], &cancelled)
        .await
        .unwrap();
    assert_eq!(none, 0);
}
