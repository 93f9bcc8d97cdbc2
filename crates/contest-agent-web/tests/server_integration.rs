//! Integration tests for the agent manager server.
//!
//! These tests start a real axum server on a random port, backed by an
//! in-memory contest and a scripted provider, and exercise the REST and SSE
//! endpoints.

use std::sync::Arc;
use std::time::Duration;

use contest_agent::supervisor::{Supervisor, SupervisorConfig};
use contest_agent::test_support::{
    FixedProviderFactory, InMemoryConnector, InMemoryContest, ScriptedProvider, problem,
};
use contest_agent::workflow::WorkflowConfig;
use contest_agent_web::{WebConfig, spawn_web};
use futures::StreamExt;
use serde_json::{Value, json};

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(provider: ScriptedProvider) -> (Supervisor, String) {
    let contest = Arc::new(InMemoryContest::running("c1", vec![problem("p1", "A + B")]));
    let config = SupervisorConfig {
        workflow: WorkflowConfig::immediate(),
        ..SupervisorConfig::default()
    };
    let supervisor = Supervisor::new(
        config,
        Arc::new(InMemoryConnector::new(contest)),
        Arc::new(FixedProviderFactory::new(Arc::new(provider))),
    );

    let web = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
    };
    let addr = spawn_web(supervisor.clone(), web).await.unwrap();
    (supervisor, format!("http://{addr}"))
}

fn slow() -> ScriptedProvider {
    ScriptedProvider::new("m").with_delay(Duration::from_secs(30))
}

async fn create(base: &str, participant: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/api/agents"))
        .json(&json!({
            "contest_id": "c1",
            "participant_id": participant,
            "model_name": "m",
        }))
        .send()
        .await
        .unwrap()
}

/// Poll GET /api/agents/{id} until `status` matches.
async fn wait_for_status(base: &str, id: &str, status: &str) -> Value {
    for _ in 0..200 {
        let json: Value = reqwest::get(format!("{base}/api/agents/{id}"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if json["status"] == status {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("agent {id} never reached {status}");
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_run_to_completion() {
    let (_supervisor, base) = spawn_test_server(ScriptedProvider::new("m")).await;

    let resp = create(&base, "p1").await;
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["status"], "INITIALIZING");
    let id = created["agent_id"].as_str().unwrap().to_string();

    let task = wait_for_status(&base, &id, "COMPLETED").await;
    assert_eq!(task["contest_id"], "c1");
    assert_eq!(task["participant_id"], "p1");
    assert_eq!(task["model_name"], "m");
    assert_eq!(task["problems_solved"], 1);
}

#[tokio::test]
async fn duplicate_create_returns_existing_agent() {
    let (supervisor, base) = spawn_test_server(slow()).await;

    let first: Value = create(&base, "p1").await.json().await.unwrap();
    let resp = create(&base, "p1").await;
    assert_eq!(resp.status(), 200);
    let second: Value = resp.json().await.unwrap();
    assert_eq!(first["agent_id"], second["agent_id"]);
    assert_eq!(second["created"], false);

    supervisor.shutdown("test over");
}

#[tokio::test]
async fn create_with_blank_participant_is_bad_request() {
    let (_supervisor, base) = spawn_test_server(slow()).await;

    let resp = create(&base, " ").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let (_supervisor, base) = spawn_test_server(slow()).await;

    let resp = reqwest::get(format!("{base}/api/agents/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/agents/nope/stop"))
        .json(&json!({"reason": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn list_filters_by_contest_and_status() {
    let (supervisor, base) = spawn_test_server(slow()).await;
    create(&base, "p1").await;
    create(&base, "p2").await;

    let all: Value = reqwest::get(format!("{base}/api/agents?contest_id=c1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["agents"].as_array().unwrap().len(), 2);

    let other: Value = reqwest::get(format!("{base}/api/agents?contest_id=c2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(other["agents"].as_array().unwrap().is_empty());

    let stopped: Value = reqwest::get(format!("{base}/api/agents?status=stopped"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stopped["agents"].as_array().unwrap().is_empty());

    let resp = reqwest::get(format!("{base}/api/agents?status=sleeping"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    supervisor.shutdown("test over");
}

#[tokio::test]
async fn stop_then_purge() {
    let (_supervisor, base) = spawn_test_server(slow()).await;
    let created: Value = create(&base, "p1").await.json().await.unwrap();
    let id = created["agent_id"].as_str().unwrap().to_string();
    let client = reqwest::Client::new();

    // Live agents cannot be purged.
    let resp = client
        .delete(format!("{base}/api/agents/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "FAILED_PRECONDITION");

    let resp = client
        .post(format!("{base}/api/agents/{id}/stop"))
        .json(&json!({"reason": "operator"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let stopped: Value = resp.json().await.unwrap();
    assert_eq!(stopped["success"], true);

    let task: Value = reqwest::get(format!("{base}/api/agents/{id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(task["status"], "STOPPED");

    let resp = client
        .delete(format!("{base}/api/agents/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = reqwest::get(format!("{base}/api/agents/{id}")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stop_without_body_uses_default_reason() {
    let (_supervisor, base) = spawn_test_server(slow()).await;
    let created: Value = create(&base, "p1").await.json().await.unwrap();
    let id = created["agent_id"].as_str().unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/agents/{id}/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn health_counts_agents() {
    let (supervisor, base) = spawn_test_server(slow()).await;
    create(&base, "p1").await;

    let health: Value = reqwest::get(format!("{base}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["agents"], 1);
    assert_eq!(health["live"], 1);

    supervisor.shutdown("test over");
}

// ── SSE Tests ────────────────────────────────────────────────────────

/// Read the SSE body until a `status` event whose data satisfies `pred`.
async fn next_status<B: AsRef<[u8]>>(
    body: &mut (impl futures::Stream<Item = reqwest::Result<B>> + Unpin),
    buffer: &mut String,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    loop {
        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            let is_status = frame.lines().any(|l| l == "event: status");
            let data = frame.lines().find_map(|l| l.strip_prefix("data: "));
            if let (true, Some(data)) = (is_status, data) {
                let value: Value = serde_json::from_str(data).unwrap();
                if pred(&value) {
                    return value;
                }
            }
        }
        let chunk = body.next().await.expect("stream ended").unwrap();
        buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
    }
}

#[tokio::test]
async fn stream_replays_current_status_then_follows_changes() {
    let (_supervisor, base) = spawn_test_server(slow()).await;
    let created: Value = create(&base, "p1").await.json().await.unwrap();
    let id = created["agent_id"].as_str().unwrap().to_string();
    wait_for_status(&base, &id, "SELECTING_PROBLEM").await;

    let resp = reqwest::get(format!("{base}/api/agents/stream?contest_id=c1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let mut body = resp.bytes_stream();
    let mut buffer = String::new();

    let replayed = tokio::time::timeout(
        Duration::from_secs(5),
        next_status(&mut body, &mut buffer, |_| true),
    )
    .await
    .unwrap();
    assert_eq!(replayed["agent_id"], id.as_str());
    assert_eq!(replayed["status"], "SELECTING_PROBLEM");

    reqwest::Client::new()
        .post(format!("{base}/api/agents/{id}/stop"))
        .send()
        .await
        .unwrap();

    let stopped = tokio::time::timeout(
        Duration::from_secs(5),
        next_status(&mut body, &mut buffer, |v| v["status"] == "STOPPED"),
    )
    .await
    .unwrap();
    assert_eq!(stopped["agent_id"], id.as_str());
}
