//! End-to-end tracking scenarios against the in-memory backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use garden_backend::schema::{functions, tables};
use garden_backend::{Backend, Filter, MemoryBackend};
use garden_config::schema::TrackingConfig;
use garden_tracking::{PresenceUpdater, TrackedView, UnreadCounter};

async fn session_signals(memory: &MemoryBackend) -> Vec<(String, String)> {
    memory
        .function_calls(functions::SESSION_TRACKER)
        .await
        .into_iter()
        .map(|call| {
            (
                call.payload["action"].as_str().unwrap_or_default().to_string(),
                call.payload["session_id"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn dashboard_visit_of_ninety_seconds() {
    let memory = MemoryBackend::new();
    let backend: Arc<dyn Backend> = Arc::new(memory.clone());
    let mut view = TrackedView::new(backend, &TrackingConfig::default());

    let session_id = view.mount("/dashboard", None, Some("user-1"));
    tokio::time::sleep(Duration::from_secs(90) + Duration::from_millis(500)).await;
    view.unmount();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let signals = session_signals(&memory).await;
    let count = |action: &str| signals.iter().filter(|(a, _)| a == action).count();
    assert_eq!(count("start"), 1);
    assert_eq!(count("heartbeat"), 3);
    assert_eq!(count("end"), 1);
    assert_eq!(signals.first().map(|(a, _)| a.as_str()), Some("start"));
    assert_eq!(signals.last().map(|(a, _)| a.as_str()), Some("end"));
    assert!(signals.iter().all(|(_, id)| id == session_id.as_str()));

    let views = memory.rows(tables::PAGE_VIEWS).await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["page_path"], "/dashboard");
    assert_eq!(views[0]["tracking_session_id"], session_id.as_str());

    // Nothing further once unmounted.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(session_signals(&memory).await.len(), signals.len());
}

#[tokio::test(start_paused = true)]
async fn login_switch_moves_presence_and_unread() {
    let memory = MemoryBackend::new();
    for id in ["alice", "bob"] {
        memory
            .seed(tables::PROFILES, json!({"id": id, "last_seen": null}))
            .await;
    }
    memory
        .seed(
            tables::MESSAGES,
            json!({"id": 1, "recipient_id": "bob", "read": false}),
        )
        .await;

    let backend: Arc<dyn Backend> = Arc::new(memory.clone());
    let config = TrackingConfig::default();
    let presence = PresenceUpdater::new(Arc::clone(&backend), &config);
    let unread = UnreadCounter::new(Arc::clone(&backend), &config);

    let attributed = Arc::new(Mutex::new(Vec::<(String, u64)>::new()));
    let follow = |id: &'static str| {
        let sink = Arc::clone(&attributed);
        presence.begin_presence_loop(id);
        unread.subscribe(
            id,
            Some(Arc::new(move |count: u64| {
                sink.lock().unwrap().push((id.to_string(), count))
            })),
        );
    };

    follow("alice");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(unread.count(), 0);

    follow("bob");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(unread.count(), 1);
    assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 1);

    memory
        .insert(
            tables::MESSAGES,
            json!({"id": 2, "recipient_id": "alice", "read": false}),
        )
        .await
        .unwrap();
    memory
        .insert(
            tables::MESSAGES,
            json!({"id": 3, "recipient_id": "bob", "read": false}),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(unread.count(), 2);
    assert_eq!(
        *attributed.lock().unwrap(),
        vec![
            ("alice".to_string(), 0),
            ("bob".to_string(), 1),
            ("bob".to_string(), 2)
        ]
    );

    // Logout.
    presence.end_presence_loop();
    unread.clear();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(unread.count(), 0);
    assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 0);

    let bob_seen = memory
        .rows(tables::PROFILES)
        .await
        .into_iter()
        .find(|r| r["id"] == "bob")
        .map(|r| r["last_seen"].clone());
    assert!(bob_seen.is_some_and(|v| v.is_string()));

    memory
        .update(
            tables::MESSAGES,
            &Filter::new().eq("recipient_id", "bob"),
            json!({"read": true}),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(attributed.lock().unwrap().len(), 3);
}
