use cachegate::kv::{KvBackend, KvStore};
use cachegate::ManualClock;
use cachegate_jsonl::JsonlKvBackend;
use std::time::Duration;

#[tokio::test]
async fn replays_puts_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.jsonl");

    let kv = JsonlKvBackend::open(&path).await.unwrap();
    kv.put("listing:1", "\"first\"".into(), None).await.unwrap();
    kv.put("listing:2", "\"second\"".into(), None).await.unwrap();
    kv.put("listing:1", "\"updated\"".into(), None).await.unwrap();
    assert!(kv.delete("listing:2").await.unwrap());
    assert!(!kv.delete("listing:2").await.unwrap());
    drop(kv);

    let reopened = JsonlKvBackend::open(&path).await.unwrap();
    assert_eq!(reopened.get("listing:1").await.unwrap().as_deref(), Some("\"updated\""));
    assert_eq!(reopened.get("listing:2").await.unwrap(), None);
    assert_eq!(reopened.list(None).await.unwrap(), vec!["listing:1".to_string()]);

    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 4);
}

#[tokio::test]
async fn expiry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.jsonl");
    let clock = ManualClock::new(1_000);

    let kv = JsonlKvBackend::open(&path).await.unwrap().with_clock(clock.clone());
    kv.put("quote", "42".into(), Some(Duration::from_secs(10))).await.unwrap();
    kv.put("config", "true".into(), None).await.unwrap();

    clock.set(11_001);
    let reopened = JsonlKvBackend::open(&path).await.unwrap().with_clock(clock.clone());
    assert_eq!(reopened.get("quote").await.unwrap(), None);
    assert_eq!(reopened.list(None).await.unwrap(), vec!["config".to_string()]);
}

#[tokio::test]
async fn compact_keeps_only_live_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.jsonl");
    let clock = ManualClock::new(0);

    let kv = JsonlKvBackend::open(&path).await.unwrap().with_clock(clock.clone());
    for i in 0..5 {
        kv.put("counter", i.to_string(), None).await.unwrap();
    }
    kv.put("short", "1".into(), Some(Duration::from_secs(1))).await.unwrap();
    kv.put("gone", "1".into(), None).await.unwrap();
    kv.delete("gone").await.unwrap();

    clock.advance(2_000);
    assert_eq!(kv.compact().await.unwrap(), 1);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    let reopened = JsonlKvBackend::open(&path).await.unwrap();
    assert_eq!(reopened.get("counter").await.unwrap().as_deref(), Some("4"));
}

#[tokio::test]
async fn skips_corrupt_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.jsonl");
    std::fs::write(
        &path,
        "{\"op\":\"put\",\"key\":\"a\",\"value\":\"1\"}\n{garbage\n{\"op\":\"put\",\"key\":\"b\",\"value\":\"2\"}\n",
    )
    .unwrap();

    let kv = JsonlKvBackend::open(&path).await.unwrap();
    assert_eq!(kv.list(None).await.unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn works_behind_typed_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.jsonl");

    let store = KvStore::new(JsonlKvBackend::open(&path).await.unwrap());
    assert!(store.set("prices", &vec![101u32, 99, 104], Some(1_800)).await);
    drop(store);

    let store = KvStore::new(JsonlKvBackend::open(&path).await.unwrap());
    assert_eq!(store.get::<Vec<u32>>("prices").await, Some(vec![101, 99, 104]));
}
