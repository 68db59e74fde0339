//! End-to-end session tests over a real WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use amphibian_broker::agent_core::{
    AgentExecutor, BrainBinding, Category, ConversationMemory, LogSink, TaskExecutor, TaskRouter,
};
use amphibian_broker::inference::{BridgeCallback, InferenceBridge, StreamingAdapter};
use amphibian_broker::session::{build_router, AppState, SessionManager};
use amphibian_broker::tool_host::types::JsonRpcResponse;
use amphibian_broker::tool_host::{ProviderTransport, ToolHost, ToolHostError};

const TOKEN: &str = "test-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct CannedBridge;

impl InferenceBridge for CannedBridge {
    fn inference(&self, _prompt: String, mut callback: BridgeCallback) {
        callback(None, Some("I can ".into()), false);
        callback(None, Some("help with ".into()), false);
        callback(None, Some("that!".into()), true);
    }
}

/// Coding provider whose tool echoes the prompt.
struct CodingProvider;

#[async_trait]
impl ProviderTransport for CodingProvider {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, ToolHostError> {
        let result = match method {
            "tools/list" => serde_json::json!({"tools": [{"name": "create_coding_session"}]}),
            "tools/call" => {
                let prompt = params.unwrap_or_default()["arguments"]["prompt"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                serde_json::json!({"content": [{"type": "text", "text": format!("Session created for: {prompt}")}]})
            }
            _ => serde_json::json!({"serverInfo": {"name": "jules"}}),
        };
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: Some(result),
            error: None,
        })
    }

    async fn notify(&self, _method: &str, _params: Option<serde_json::Value>) -> Result<(), ToolHostError> {
        Ok(())
    }
}

/// Panics on "panic", blocks on "block" until released, echoes otherwise.
struct ScriptedExecutor {
    release: Arc<Notify>,
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: &str, _on_log: LogSink) -> String {
        match task {
            "panic" => panic!("executor blew up"),
            "block" => {
                self.release.notified().await;
                "unblocked".to_string()
            }
            other => format!("echo: {other}"),
        }
    }
}

async fn agent_stack() -> (Arc<dyn TaskExecutor>, Arc<RwLock<ToolHost>>) {
    let mut host = ToolHost::default();
    host.attach_provider("jules", Arc::new(CodingProvider)).await.unwrap();

    let mut router = TaskRouter::new();
    router.register(
        Category::Coding,
        "jules",
        BrainBinding::Tool {
            provider_id: "jules".into(),
            tool_name: "create_coding_session".into(),
        },
    );

    let tools = Arc::new(RwLock::new(host));
    let bridge: Arc<dyn InferenceBridge> = Arc::new(CannedBridge);
    let executor: Arc<dyn TaskExecutor> = Arc::new(AgentExecutor::new(
        ConversationMemory::default(),
        router,
        tools.clone(),
        StreamingAdapter::new(Some(bridge)),
    ));
    (executor, tools)
}

async fn serve(executor: Arc<dyn TaskExecutor>, tools: Arc<RwLock<ToolHost>>) -> SocketAddr {
    let manager = Arc::new(SessionManager::new(TOKEN, executor));
    let app = build_router(AppState { manager, tools });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, token: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap();
    ws
}

/// Next non-control frame, parsed as JSON. `None` on close.
async fn next_event(ws: &mut Client) -> Option<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")?
            .ok()?;
        match msg {
            Message::Text(text) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Collect events up to and including the next IDLE status.
async fn until_idle(ws: &mut Client) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Some(event) = next_event(ws).await {
        let idle = event["type"] == "STATUS_UPDATE" && event["payload"]["status"] == "IDLE";
        events.push(event);
        if idle {
            break;
        }
    }
    events
}

async fn send(ws: &mut Client, frame: serde_json::Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

fn execute(task: &str) -> serde_json::Value {
    serde_json::json!({"type": "EXECUTE_TASK", "payload": {"task": task}})
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_connection_is_closed_with_policy_code() {
    let (executor, tools) = agent_stack().await;
    let addr = serve(executor, tools).await;

    let mut ws = connect(addr, "wrong").await;
    // The server may already have closed; a failed send is fine.
    let _ = ws
        .send(Message::Text(execute("fix this code bug").to_string().into()))
        .await;

    let mut frames = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(frame))) => frames.push(frame),
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => panic!("rejected socket was never closed"),
        }
    }

    assert_eq!(frames.len(), 1, "only a close frame is expected: {frames:?}");
    match &frames[0] {
        Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1008),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_coding_task_routes_to_provider() {
    let (executor, tools) = agent_stack().await;
    let addr = serve(executor, tools).await;
    let mut ws = connect(addr, TOKEN).await;

    let ready = next_event(&mut ws).await.unwrap();
    assert_eq!(ready["type"], "STATUS_UPDATE");
    assert_eq!(ready["payload"]["status"], "READY");

    send(&mut ws, execute("fix this code bug")).await;
    let events = until_idle(&mut ws).await;

    assert_eq!(events[0]["payload"]["status"], "WORKING");
    assert_eq!(events[0]["payload"]["task"], "fix this code bug");

    let logs: Vec<&str> = events
        .iter()
        .filter(|e| e["type"] == "LOG")
        .filter_map(|e| e["payload"]["text"].as_str())
        .collect();
    assert_eq!(logs.first(), Some(&"Analyzing request..."));
    assert!(logs.contains(&"Calling jules.create_coding_session..."));

    let result = events.iter().find(|e| e["type"] == "RESULT").unwrap();
    assert_eq!(result["payload"]["result"], "Session created for: fix this code bug");
    assert_eq!(events.last().unwrap()["payload"]["status"], "IDLE");
}

#[tokio::test]
async fn test_general_task_uses_local_brain_with_subprotocol_token() {
    let (executor, tools) = agent_stack().await;
    let addr = serve(executor, tools).await;

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", TOKEN.parse().unwrap());
    let (mut ws, response) = connect_async(request).await.unwrap();
    assert_eq!(response.headers()["sec-websocket-protocol"], TOKEN);

    assert_eq!(next_event(&mut ws).await.unwrap()["payload"]["status"], "READY");
    send(&mut ws, execute("hello there")).await;
    let events = until_idle(&mut ws).await;

    let result = events.iter().find(|e| e["type"] == "RESULT").unwrap();
    assert_eq!(result["payload"]["result"], "I can help with that!");
}

#[tokio::test]
async fn test_busy_session_rejects_second_task() {
    let release = Arc::new(Notify::new());
    let executor = Arc::new(ScriptedExecutor {
        release: release.clone(),
    });
    let addr = serve(executor, Arc::new(RwLock::new(ToolHost::default()))).await;
    let mut ws = connect(addr, TOKEN).await;
    next_event(&mut ws).await.unwrap();

    send(&mut ws, execute("block")).await;
    assert_eq!(next_event(&mut ws).await.unwrap()["payload"]["status"], "WORKING");

    send(&mut ws, execute("something else")).await;
    let busy = next_event(&mut ws).await.unwrap();
    assert_eq!(busy, serde_json::json!({"type": "ERROR", "payload": {"message": "Agent is busy."}}));

    release.notify_one();
    let events = until_idle(&mut ws).await;
    assert_eq!(events[0]["payload"]["result"], "unblocked");
    assert_eq!(events.last().unwrap()["payload"]["status"], "IDLE");

    // Ready again after the first task completes.
    send(&mut ws, execute("again")).await;
    let events = until_idle(&mut ws).await;
    assert!(events.iter().any(|e| e["payload"]["result"] == "echo: again"));
}

#[tokio::test]
async fn test_panicking_task_still_returns_to_idle() {
    let executor = Arc::new(ScriptedExecutor {
        release: Arc::new(Notify::new()),
    });
    let addr = serve(executor, Arc::new(RwLock::new(ToolHost::default()))).await;
    let mut ws = connect(addr, TOKEN).await;
    next_event(&mut ws).await.unwrap();

    send(&mut ws, execute("panic")).await;
    let events = until_idle(&mut ws).await;
    let types: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert_eq!(types, vec!["STATUS_UPDATE", "ERROR", "STATUS_UPDATE"]);
    assert_eq!(events.last().unwrap()["payload"]["status"], "IDLE");

    send(&mut ws, execute("still alive")).await;
    let events = until_idle(&mut ws).await;
    assert!(events.iter().any(|e| e["payload"]["result"] == "echo: still alive"));
}

#[tokio::test]
async fn test_stop_task_and_malformed_frames() {
    let executor = Arc::new(ScriptedExecutor {
        release: Arc::new(Notify::new()),
    });
    let addr = serve(executor, Arc::new(RwLock::new(ToolHost::default()))).await;
    let mut ws = connect(addr, TOKEN).await;
    next_event(&mut ws).await.unwrap();

    ws.send(Message::Text("not json".to_string().into())).await.unwrap();
    send(&mut ws, serde_json::json!({"type": "LAUNCH", "payload": {}})).await;

    send(&mut ws, execute("block")).await;
    assert_eq!(next_event(&mut ws).await.unwrap()["payload"]["status"], "WORKING");

    send(&mut ws, serde_json::json!({"type": "STOP_TASK", "payload": {}})).await;
    let stopped = next_event(&mut ws).await.unwrap();
    assert_eq!(stopped["payload"]["text"], "Task stopped.");
    assert_eq!(next_event(&mut ws).await.unwrap()["payload"]["status"], "IDLE");
}

#[tokio::test]
async fn test_new_connection_supersedes_previous() {
    let executor = Arc::new(ScriptedExecutor {
        release: Arc::new(Notify::new()),
    });
    let addr = serve(executor, Arc::new(RwLock::new(ToolHost::default()))).await;

    let mut first = connect(addr, TOKEN).await;
    next_event(&mut first).await.unwrap();

    let mut second = connect(addr, TOKEN).await;
    assert_eq!(next_event(&mut second).await.unwrap()["payload"]["status"], "READY");
    assert!(next_event(&mut first).await.is_none(), "first session should be closed");

    send(&mut second, execute("ping")).await;
    let events = until_idle(&mut second).await;
    assert!(events.iter().any(|e| e["payload"]["result"] == "echo: ping"));
}

#[tokio::test]
async fn test_health_reports_providers() {
    let (executor, tools) = agent_stack().await;
    let addr = serve(executor, tools).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"], serde_json::json!(["jules"]));
    assert_eq!(body["tools"], 1);
}
