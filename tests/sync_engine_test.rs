//! End-to-end tests: real files, real watcher, short timings.

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;

use confsync::{Loader, OptionsOverride, SyncEvent, Tracked, configure, load};

const FLUSH_MS: u64 = 100;
const GRACE_MS: u64 = 30;
const WAIT: Duration = Duration::from_secs(5);

fn fast_loader() -> Loader {
    configure(Some(
        OptionsOverride::default()
            .flush_milliseconds(FLUSH_MS)
            .double_fire_grace_period(GRACE_MS),
    ))
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Wait for an event matching `pred`, skipping others.
async fn wait_for(
    rx: &mut broadcast::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for sync event")
}

/// Collect every event delivered within `window`.
async fn collect_for(rx: &mut broadcast::Receiver<SyncEvent>, window: Duration) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(event);
    }
    events
}

fn setup(name: &str, content: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (temp_dir, path)
}

async fn flushed(tracked: &Tracked, rx: &mut broadcast::Receiver<SyncEvent>) {
    let event = wait_for(rx, |e| {
        matches!(e, SyncEvent::Flushed | SyncEvent::WriteFailed { .. })
    })
    .await;
    assert_eq!(event, SyncEvent::Flushed, "write failed for {:?}", tracked.path());
}

#[tokio::test]
async fn test_local_change_written_after_flush_window() {
    let (_dir, path) = setup("settings.json", r#"{"a":1}"#);
    let loader = fast_loader();
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    let started = Instant::now();
    tracked.set("/a", json!(2));
    // Still the old content inside the debounce window
    assert_eq!(read_json(&path), json!({"a": 1}));

    flushed(&tracked, &mut rx).await;
    assert!(started.elapsed() >= Duration::from_millis(FLUSH_MS));
    assert_eq!(read_json(&path), json!({"a": 2}));
}

#[tokio::test]
async fn test_burst_of_changes_produces_one_write() {
    let (_dir, path) = setup("settings.json", r#"{"counter":0}"#);
    let loader = configure(Some(
        OptionsOverride::default()
            .flush_milliseconds(200)
            .double_fire_grace_period(GRACE_MS),
    ));
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    for i in 1..=5 {
        tracked.update(|v| v["counter"] = json!(i));
    }

    flushed(&tracked, &mut rx).await;
    // The value at the end of the window, not the first mutation
    assert_eq!(read_json(&path), json!({"counter": 5}));

    let later = collect_for(&mut rx, Duration::from_millis(600)).await;
    assert!(
        !later.contains(&SyncEvent::Flushed),
        "unexpected extra write: {later:?}"
    );
}

#[tokio::test]
async fn test_own_write_does_not_trigger_reload() {
    let (_dir, path) = setup("settings.json", r#"{"a":1,"b":[1,2]}"#);
    let loader = fast_loader();
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    tracked.update(|v| v["b"] = json!([3]));
    flushed(&tracked, &mut rx).await;

    let later = collect_for(&mut rx, Duration::from_millis(500)).await;
    assert!(
        !later.contains(&SyncEvent::Reloaded),
        "write echoed back as reload: {later:?}"
    );
    assert_eq!(tracked.snapshot(), json!({"a": 1, "b": [3]}));
}

#[tokio::test]
async fn test_external_edit_reloads_in_place() {
    let (_dir, path) = setup("settings.json", r#"{"a":1}"#);
    let loader = fast_loader();
    let tracked = loader.load(&path, None).unwrap();
    let held_elsewhere = tracked.clone();
    let mut rx = tracked.subscribe();

    tracked.set("/a", json!(2));
    flushed(&tracked, &mut rx).await;
    assert_eq!(held_elsewhere.get("/a"), Some(json!(2)));

    std::fs::write(&path, r#"{"a":3}"#).unwrap();
    wait_for(&mut rx, |e| *e == SyncEvent::Reloaded).await;

    assert_eq!(held_elsewhere.get("/a"), Some(json!(3)));
    assert!(held_elsewhere.ptr_eq(&tracked));

    // Applying the reload must not schedule a write
    let later = collect_for(&mut rx, Duration::from_millis(FLUSH_MS * 4)).await;
    assert!(
        !later.contains(&SyncEvent::Flushed),
        "reload echoed back as write: {later:?}"
    );
    assert_eq!(read_json(&path), json!({"a": 3}));
}

#[tokio::test]
async fn test_rapid_external_writes_reload_once() {
    let (_dir, path) = setup("settings.json", r#"{"v":0}"#);
    let loader = configure(Some(
        OptionsOverride::default()
            .flush_milliseconds(FLUSH_MS)
            .double_fire_grace_period(250),
    ));
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    std::fs::write(&path, r#"{"v":1}"#).unwrap();
    std::fs::write(&path, r#"{"v":2}"#).unwrap();

    let events = collect_for(&mut rx, Duration::from_millis(1000)).await;
    let reloads = events
        .iter()
        .filter(|e| **e == SyncEvent::Reloaded)
        .count();
    assert_eq!(reloads, 1, "events: {events:?}");
    assert_eq!(tracked.get("/v"), Some(json!(2)));
}

#[tokio::test]
async fn test_invalid_external_edit_keeps_last_good_value() {
    let (_dir, path) = setup("settings.json", r#"{"keep":true}"#);
    let loader = fast_loader();
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    std::fs::write(&path, r#"{"keep": fal"#).unwrap();
    let event = wait_for(&mut rx, |e| {
        matches!(e, SyncEvent::ReloadFailed { .. } | SyncEvent::Reloaded)
    })
    .await;

    assert!(matches!(event, SyncEvent::ReloadFailed { .. }));
    assert_eq!(tracked.snapshot(), json!({"keep": true}));
}

fn pending_flush_loader() -> Loader {
    configure(Some(
        OptionsOverride::default()
            .flush_milliseconds(300)
            .double_fire_grace_period(GRACE_MS),
    ))
}

#[tokio::test]
async fn test_identical_rewrite_during_pending_flush_keeps_local_edit() {
    let original = r#"{"a":1}"#;
    let (_dir, path) = setup("settings.json", original);
    let tracked = pending_flush_loader().load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    tracked.set("/a", json!(2));
    tokio::time::sleep(Duration::from_millis(20)).await;
    // Same bytes as already on disk, e.g. an editor saving without changes
    std::fs::write(&path, original).unwrap();

    wait_for(&mut rx, |e| *e == SyncEvent::Unchanged).await;
    flushed(&tracked, &mut rx).await;

    assert_eq!(tracked.snapshot(), json!({"a": 2}));
    assert_eq!(read_json(&path), json!({"a": 2}));
}

#[tokio::test]
async fn test_invalid_write_during_pending_flush_keeps_local_edit() {
    let (_dir, path) = setup("settings.json", r#"{"a":1}"#);
    let tracked = pending_flush_loader().load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    tracked.set("/a", json!(2));
    tokio::time::sleep(Duration::from_millis(20)).await;
    std::fs::write(&path, r#"{"a": "#).unwrap();

    let event = wait_for(&mut rx, |e| {
        matches!(e, SyncEvent::ReloadFailed { .. } | SyncEvent::Reloaded)
    })
    .await;
    assert!(matches!(event, SyncEvent::ReloadFailed { .. }));
    flushed(&tracked, &mut rx).await;

    // The edit is written over the broken file
    assert_eq!(tracked.snapshot(), json!({"a": 2}));
    assert_eq!(read_json(&path), json!({"a": 2}));
}

#[tokio::test]
async fn test_valid_write_during_pending_flush_wins() {
    let (_dir, path) = setup("settings.json", r#"{"a":1}"#);
    let tracked = pending_flush_loader().load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    tracked.set("/a", json!(2));
    tokio::time::sleep(Duration::from_millis(20)).await;
    std::fs::write(&path, r#"{"a":3}"#).unwrap();

    wait_for(&mut rx, |e| *e == SyncEvent::Reloaded).await;
    let later = collect_for(&mut rx, Duration::from_millis(600)).await;
    assert!(
        !later.contains(&SyncEvent::Flushed),
        "remote change overwritten: {later:?}"
    );

    assert_eq!(tracked.snapshot(), json!({"a": 3}));
    assert_eq!(read_json(&path), json!({"a": 3}));
}

#[tokio::test]
async fn test_unsupported_extension_returns_none() {
    let (_dir, path) = setup("config.ini", "[section]\nkey = value\n");
    assert!(load(&path).is_none());
    assert!(fast_loader().load(&path, None).is_none());
}

#[tokio::test]
async fn test_malformed_file_returns_none() {
    let (_dir, json_path) = setup("broken.json", "{\"a\": ");
    assert!(fast_loader().load(&json_path, None).is_none());

    let (_dir, yaml_path) = setup("broken.yaml", "a: [1, 2\nb: 3\n");
    assert!(fast_loader().load(&yaml_path, None).is_none());

    assert!(fast_loader().load("/no/such/dir/missing.json", None).is_none());
}

#[tokio::test]
async fn test_yaml_file_written_with_options() {
    let (_dir, path) = setup("app.yml", "server:\n  host: localhost\n  port: 80\n");
    let loader = configure(Some(
        OptionsOverride::default()
            .flush_milliseconds(FLUSH_MS)
            .double_fire_grace_period(GRACE_MS)
            .indentation_spaces(2)
            .inline_level(2),
    ));
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    tracked.set("/server/port", json!(8080));
    tracked.set("/server/tls/enabled", json!(false));
    flushed(&tracked, &mut rx).await;

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "server:\n  host: localhost\n  port: 8080\n  tls: { enabled: false }\n"
    );
}

#[tokio::test]
async fn test_flush_now_skips_window() {
    let (_dir, path) = setup("settings.json", r#"{"a":1}"#);
    let loader = configure(Some(
        OptionsOverride::default().flush_milliseconds(60_000),
    ));
    let tracked = loader.load(&path, None).unwrap();
    let mut rx = tracked.subscribe();

    tracked.set("/a", json!("now"));
    tracked.flush_now();
    flushed(&tracked, &mut rx).await;

    assert_eq!(read_json(&path), json!({"a": "now"}));
}

#[tokio::test]
async fn test_dropping_last_handle_flushes_pending_changes() {
    let (_dir, path) = setup("settings.json", r#"{"a":1}"#);
    let loader = configure(Some(
        OptionsOverride::default().flush_milliseconds(60_000),
    ));
    let tracked = loader.load(&path, None).unwrap();
    tracked.set("/a", json!(42));
    drop(tracked);

    let deadline = Instant::now() + WAIT;
    // The file may be observed half-written; only a full decode counts
    let written = || {
        serde_json::from_slice::<Value>(&std::fs::read(&path).unwrap_or_default()).ok()
    };
    while written() != Some(json!({"a": 42})) {
        assert!(Instant::now() < deadline, "pending change was not written");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(loader.live_count(), 0);
}

#[tokio::test]
async fn test_files_are_independent() {
    let temp_dir = TempDir::new().unwrap();
    let first_path = temp_dir.path().join("first.json");
    let second_path = temp_dir.path().join("second.json");
    std::fs::write(&first_path, r#"{"name":"first"}"#).unwrap();
    std::fs::write(&second_path, r#"{"name":"second"}"#).unwrap();

    let loader = fast_loader();
    let first = loader.load(&first_path, None).unwrap();
    let second = loader.load(&second_path, None).unwrap();
    assert!(!first.ptr_eq(&second));
    assert_eq!(loader.live_count(), 2);

    let mut first_rx = first.subscribe();
    let mut second_rx = second.subscribe();

    first.set("/name", json!("changed"));
    flushed(&first, &mut first_rx).await;

    assert_eq!(read_json(&first_path), json!({"name": "changed"}));
    assert_eq!(read_json(&second_path), json!({"name": "second"}));

    let second_events = collect_for(&mut second_rx, Duration::from_millis(300)).await;
    assert!(
        !second_events
            .iter()
            .any(|e| matches!(e, SyncEvent::Flushed | SyncEvent::Reloaded)),
        "second file affected: {second_events:?}"
    );
    assert_eq!(second.get("/name"), Some(json!("second")));
}
