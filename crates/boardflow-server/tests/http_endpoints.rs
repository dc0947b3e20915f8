//! HTTP surface tests: the app bound on an ephemeral port, driven with reqwest.

use std::sync::Arc;

use assert_json_diff::assert_json_include;
use boardflow_db_memory::InMemoryStorage;
use boardflow_server::{AppConfig, AppState, StorageBackend, build_app};
use boardflow_storage::{AutomationRecord, ChangeEvent, Column};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.storage.backend = StorageBackend::Memory;
    cfg.automation.email_relay_url = Some("https://relay.example.com/send".into());
    cfg
}

async fn start_server(
    store: Arc<InMemoryStorage>,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let cfg = test_config();
    let state = AppState::with_store(&cfg, store).expect("wire engine");
    let app = build_app(&cfg, state);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

fn status_rule(id: &str) -> AutomationRecord {
    AutomationRecord {
        id: id.into(),
        board_id: "b1".into(),
        name: "Done to archive".into(),
        is_active: true,
        trigger_type: "STATUS_CHANGED".into(),
        trigger_config: json!({"column_id": "old-col", "target_status": "Done"}),
        action_type: Some("NOTIFY".into()),
        action_config: json!({}),
    }
}

#[tokio::test]
async fn health_endpoints_and_request_id() {
    let (base, shutdown, _handle) = start_server(Arc::new(InMemoryStorage::new())).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"status": "ok"}));

    let res = client
        .get(format!("{base}/readyz"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "req-123");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn process_endpoint_runs_cycles() {
    let store = Arc::new(InMemoryStorage::new());
    store
        .insert_event(ChangeEvent::pending("e1", "b1", "i1", "c1", Some(json!("Done"))))
        .await;
    store
        .insert_event(ChangeEvent::pending("e2", "b2", "i2", "c1", Some(json!("Done"))))
        .await;
    let (base, shutdown, _handle) = start_server(store.clone()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{base}/api/automation/process"))
        .json(&json!({"board_id": "b1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"processed": 1}));

    // No body means every board
    let res = client
        .post(format!("{base}/api/automation/process"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"processed": 1}));

    let res = client
        .post(format!("{base}/api/automation/process"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"processed": 0}));

    let res = client
        .put(format!("{base}/api/automation/process"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn process_status_reports_presence_only() {
    let (base, shutdown, _handle) = start_server(Arc::new(InMemoryStorage::new())).await;

    let body: Value = reqwest::get(format!("{base}/api/automation/process"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_json_include!(
        actual: body.clone(),
        expected: json!({
            "status": "ok",
            "storageBackend": "memory",
            "claimStrategy": "atomic",
            "config": {
                "emailRelayUrl": true,
                "aiApiKey": false,
                "aiModel": true,
                "storageBaseUrl": false,
                "storageServiceKey": false
            }
        })
    );
    assert!(!body.to_string().contains("relay.example.com"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn logs_and_debug_snapshot() {
    let store = Arc::new(InMemoryStorage::new());
    store.insert_automation(status_rule("a1")).await;
    store
        .insert_column(Column {
            id: "c1".into(),
            board_id: "b1".into(),
            name: "Status".into(),
            column_type: "status".into(),
            config: json!({}),
            position: 0,
        })
        .await;
    store
        .insert_event(ChangeEvent::pending("e1", "b1", "i1", "old-col", Some(json!("Done"))))
        .await;
    let (base, shutdown, _handle) = start_server(store.clone()).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/automation/process"))
        .send()
        .await
        .unwrap();

    let logs: Value = client
        .get(format!("{base}/api/automation/logs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_json_include!(
        actual: logs,
        expected: json!({
            "logs": [{
                "automation_id": "a1",
                "status": "success",
                "message": "Processed event e1 with 1 action(s)",
                "automations": {"name": "Done to archive", "board_id": "b1"}
            }]
        })
    );

    let snapshot: Value = client
        .get(format!("{base}/api/automation/debug"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["columns"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["automations"][0]["id"], "a1");
    assert_eq!(snapshot["events"][0]["id"], "e1");
    assert_eq!(snapshot["logs"].as_array().unwrap().len(), 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn debug_actions() {
    let store = Arc::new(InMemoryStorage::new());
    store.insert_automation(status_rule("a1")).await;
    let (base, shutdown, _handle) = start_server(store.clone()).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/api/automation/debug");

    let res = client
        .post(&url)
        .json(&json!({"action": "fix_automation", "automationId": "a1", "columnId": "c1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"success": true}));

    let snapshot: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        snapshot["automations"][0]["trigger_config"],
        json!({"column_id": "c1", "target_status": "Done"})
    );

    let res = client
        .post(&url)
        .json(&json!({"action": "fix_automation", "automationId": "nope", "columnId": "c1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({"error": "Automation not found"})
    );

    store
        .insert_event(ChangeEvent::pending("e1", "b1", "i1", "c1", Some(json!("Done"))))
        .await;
    let res = client
        .post(&url)
        .json(&json!({"action": "test_trigger", "boardId": "b1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({"status": 200, "data": {"processed": 1}})
    );

    let res = client
        .post(&url)
        .json(&json!({"action": "drop_tables"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({"error": "Invalid action"})
    );

    let _ = shutdown.send(());
}
