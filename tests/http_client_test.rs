//! HTTP 客户端集成测试：本地 axum 服务模拟 Assistants 端点

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hive::assistant::{
    AssistantClient, HttpAssistantClient, HttpClientOptions, MessageRole, NewMessage, RunStatus,
};
use hive::core::{AssistantError, ConversationOrchestrator, LoadingState, OrchestratorOptions};
use hive::memory::{InMemoryMessageLog, MessageLog};
use serde_json::{json, Value};

#[derive(Default)]
struct Recorded {
    auth: Vec<String>,
    beta: Vec<String>,
    bodies: Vec<Value>,
}

#[derive(Default)]
struct FakeApi {
    recorded: Mutex<Recorded>,
    status_checks: AtomicUsize,
}

impl FakeApi {
    fn record(&self, headers: &HeaderMap, body: Option<Value>) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let mut recorded = self.recorded.lock().unwrap();
        recorded.auth.push(header("authorization"));
        recorded.beta.push(header("openai-beta"));
        if let Some(body) = body {
            recorded.bodies.push(body);
        }
    }
}

async fn create_thread(State(api): State<Arc<FakeApi>>, headers: HeaderMap) -> Json<Value> {
    api.record(&headers, None);
    Json(json!({
        "id": "thread_abc",
        "object": "thread",
        "created_at": 1_700_000_000,
        "metadata": {}
    }))
}

async fn post_message(
    State(api): State<Arc<FakeApi>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    api.record(&headers, Some(body));
    Json(json!({
        "id": "msg_user_remote",
        "object": "thread.message",
        "thread_id": thread_id,
        "role": "user",
        "created_at": 1_700_000_001,
        "content": []
    }))
}

async fn start_run(
    State(api): State<Arc<FakeApi>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    api.record(&headers, Some(body));
    Json(json!({
        "id": "run_1",
        "object": "thread.run",
        "thread_id": thread_id,
        "assistant_id": "asst_1",
        "status": "queued",
        "created_at": 1_700_000_002
    }))
}

async fn run_status(
    State(api): State<Arc<FakeApi>>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> Json<Value> {
    let n = api.status_checks.fetch_add(1, Ordering::SeqCst);
    let status = if n == 0 { "in_progress" } else { "completed" };
    Json(json!({
        "id": run_id,
        "thread_id": thread_id,
        "status": status,
        "created_at": 1_700_000_002
    }))
}

async fn list_messages(Path(thread_id): Path<String>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [
            {
                "id": "msg_asst_1",
                "object": "thread.message",
                "thread_id": thread_id,
                "role": "assistant",
                "created_at": 1_700_000_010,
                "content": [
                    {"type": "text", "text": {"value": "Hi from the API", "annotations": []}}
                ],
                "run_id": "run_1",
                "assistant_id": "asst_1"
            },
            {
                "id": "msg_user_remote",
                "object": "thread.message",
                "thread_id": thread_id,
                "role": "user",
                "created_at": 1_700_000_001,
                "content": [{"type": "text", "text": {"value": "hello", "annotations": []}}]
            }
        ],
        "first_id": "msg_asst_1",
        "last_id": "msg_user_remote",
        "has_more": false
    }))
}

fn fake_api(api: Arc<FakeApi>) -> Router {
    Router::new()
        .route("/v1/threads", post(create_thread))
        .route("/v1/threads/:thread_id/messages", post(post_message).get(list_messages))
        .route("/v1/threads/:thread_id/runs", post(start_run))
        .route("/v1/threads/:thread_id/runs/:run_id", get(run_status))
        .with_state(api)
}

/// 在随机端口启动服务，返回 base_url
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn client_for(base_url: &str) -> HttpAssistantClient {
    HttpAssistantClient::new(
        HttpClientOptions::new("sk-test")
            .with_base_url(base_url)
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_endpoints_and_default_headers() {
    let api = Arc::new(FakeApi::default());
    let base = serve(fake_api(api.clone())).await;
    let client = client_for(&base);

    let thread = client.create_thread().await.unwrap();
    assert_eq!(thread.id, "thread_abc");

    client
        .post_message(&thread.id, &NewMessage::user_text("hello"))
        .await
        .unwrap();
    let run = client.start_run(&thread.id, "asst_1").await.unwrap();
    assert_eq!(run.id, "run_1");
    assert_eq!(run.status, RunStatus::Queued);

    let status = client.get_run_status(&thread.id, &run.id).await.unwrap();
    assert_eq!(status.status, RunStatus::InProgress);

    let messages = client.list_messages(&thread.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::Assistant);
    assert_eq!(messages[0].text(), "Hi from the API");

    let recorded = api.recorded.lock().unwrap();
    assert!(recorded.auth.iter().all(|a| a == "Bearer sk-test"));
    assert!(recorded.beta.iter().all(|b| b == "assistants=v2"));
    assert_eq!(
        recorded.bodies[0],
        json!({"role": "user", "content": [{"type": "text", "text": "hello"}]})
    );
    assert_eq!(recorded.bodies[1], json!({"assistant_id": "asst_1"}));
}

#[tokio::test]
async fn test_orchestrator_over_http() {
    let api = Arc::new(FakeApi::default());
    let base = serve(fake_api(api.clone())).await;
    let client = Arc::new(client_for(&base));
    let log = Arc::new(InMemoryMessageLog::new());

    let options = OrchestratorOptions::new("asst_1").with_poll_interval(Duration::from_millis(10));
    let mut orchestrator = ConversationOrchestrator::start(client, log.clone(), options).await;
    assert!(orchestrator.is_thread_ready());

    orchestrator.send_message("hello").await.unwrap();

    let stored = log.query("thread_abc").await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[1].id, "msg_asst_1");
    assert_eq!(orchestrator.loading(), LoadingState::Idle);
    assert_eq!(api.status_checks.load(Ordering::SeqCst), 2);
}

async fn error_response(kind: &'static str) -> axum::response::Response {
    match kind {
        "rate" => (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")], "slow down").into_response(),
        "rate_no_header" => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        "server" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "remote" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"message": "No thread found with id 'x'", "type": "invalid_request_error"}})),
        )
            .into_response(),
        "gateway" => (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").into_response(),
        _ => (StatusCode::OK, "not json").into_response(),
    }
}

async fn failing(kind: &'static str) -> HttpAssistantClient {
    let router = Router::new().route("/v1/threads", post(move || error_response(kind)));
    client_for(&serve(router).await)
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    assert_eq!(
        failing("rate").await.create_thread().await.unwrap_err(),
        AssistantError::RateLimited(7)
    );
    assert_eq!(
        failing("rate_no_header").await.create_thread().await.unwrap_err(),
        AssistantError::RateLimited(1)
    );
    assert_eq!(
        failing("server").await.create_thread().await.unwrap_err(),
        AssistantError::ServerError
    );
    assert_eq!(
        failing("remote").await.create_thread().await.unwrap_err(),
        AssistantError::RemoteError("No thread found with id 'x'".into())
    );
    assert_eq!(
        failing("gateway").await.create_thread().await.unwrap_err(),
        AssistantError::InvalidResponse(502)
    );
    assert_eq!(
        failing("garbage").await.create_thread().await.unwrap_err(),
        AssistantError::Decode
    );
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{addr}/v1"));
    assert_eq!(client.create_thread().await.unwrap_err(), AssistantError::Network);
}

#[tokio::test]
async fn test_empty_ids_rejected_before_sending() {
    let client = client_for("http://127.0.0.1:9/v1");
    assert_eq!(
        client.start_run("thread_1", "").await.unwrap_err(),
        AssistantError::InvalidRequest
    );
    assert_eq!(
        client.get_run_status("", "run_1").await.unwrap_err(),
        AssistantError::InvalidRequest
    );
}
