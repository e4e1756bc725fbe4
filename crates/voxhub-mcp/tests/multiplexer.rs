//! End-to-end tests of the MCP channel against a scripted device.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use voxhub_core::ToolExecutor;
use voxhub_mcp::{DeviceTools, McpClient, McpError, Multiplexer, MultiplexerConfig, Outbound};

struct Wire(mpsc::UnboundedSender<Value>);

#[async_trait]
impl Outbound for Wire {
    async fn send(&self, payload: Value) -> Result<(), McpError> {
        self.0.send(payload).map_err(|e| McpError::Send(e.to_string()))
    }
}

fn channel() -> (Multiplexer, mpsc::UnboundedReceiver<Value>, TaskTracker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let tracker = TaskTracker::new();
    let (mux, _notes) = Multiplexer::spawn(
        Arc::new(Wire(tx)),
        MultiplexerConfig::default(),
        &tracker,
        &CancellationToken::new(),
    );
    (mux, rx, tracker)
}

/// Answers like a xiaozhi device with one volume tool.
async fn fake_device(mux: Multiplexer, mut wire: mpsc::UnboundedReceiver<Value>) {
    while let Some(msg) = wire.recv().await {
        let Some(id) = msg.get("id").cloned() else {
            continue;
        };
        let result = match msg["method"].as_str() {
            Some("initialize") => json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "xiaozhi-esp32", "version": "1.6.0"},
                "capabilities": {"tools": {}}
            }),
            Some("tools/list") => json!({
                "tools": [{
                    "name": "self.audio_speaker.set_volume",
                    "description": "Set the speaker volume",
                    "inputSchema": {"type": "object", "properties": {"volume": {"type": "integer"}}}
                }]
            }),
            Some("tools/call") => json!({
                "content": [{"type": "text", "text": format!("volume={}", msg["params"]["arguments"]["volume"])}],
                "isError": false
            }),
            _ => json!({}),
        };
        let _ = mux.receive(json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_route_to_their_own_waiters() {
    let (mux, mut wire, _tracker) = channel();
    const M: usize = 20;

    let mut waiters = Vec::new();
    for i in 0..M {
        let caller = mux.clone();
        waiters.push(tokio::spawn(async move {
            let result = caller
                .send_request("echo", Some(json!({ "n": i })), None)
                .await
                .unwrap();
            (i, result)
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..M {
        requests.push(wire.recv().await.unwrap());
    }
    // Answer in reverse order, echoing each request's parameter.
    for request in requests.iter().rev() {
        mux.receive(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {"n": request["params"]["n"]}
        }))
        .unwrap();
    }

    for waiter in waiters {
        let (i, result) = waiter.await.unwrap();
        assert_eq!(result["n"], json!(i));
    }
    assert_eq!(mux.pending_requests(), 0);
}

#[tokio::test]
async fn unknown_and_duplicate_responses_are_ignored() {
    let (mux, mut wire, _tracker) = channel();

    let caller = mux.clone();
    let waiter = tokio::spawn(async move { caller.send_request("ping", None, None).await });
    let request = wire.recv().await.unwrap();

    mux.receive(json!({"jsonrpc": "2.0", "id": 999, "result": {}}))
        .unwrap();
    assert_eq!(mux.pending_requests(), 1);

    let answer = json!({"jsonrpc": "2.0", "id": request["id"], "result": {"ok": true}});
    mux.receive(answer.clone()).unwrap();
    mux.receive(answer).unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn device_tools_discover_and_call() {
    let (mux, wire, _tracker) = channel();
    tokio::spawn(fake_device(mux.clone(), wire));

    let tools = DeviceTools::new(McpClient::new(mux));
    assert!(tools.specs().is_empty());

    assert_eq!(tools.discover().await.unwrap(), 1);
    assert!(tools.handles("self.audio_speaker.set_volume"));

    let output = tools
        .call("self.audio_speaker.set_volume", json!({"volume": 40}))
        .await
        .unwrap();
    assert!(!output.is_error);
    assert_eq!(output.content, "volume=40");

    assert!(tools.call("self.reboot", json!({})).await.is_err());
}

#[tokio::test]
async fn inbound_queue_rejects_when_full() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();
    let (mux, _notes) = Multiplexer::spawn(
        Arc::new(Wire(tx)),
        MultiplexerConfig {
            inbound_capacity: 2,
            ..MultiplexerConfig::default()
        },
        &tracker,
        &cancel,
    );

    // The dispatch worker has not run yet on this single-threaded runtime.
    let results: Vec<_> = (0..3)
        .map(|n| mux.receive(json!({"jsonrpc": "2.0", "method": "noise", "params": {"n": n}})))
        .collect();
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(results[2], Err(McpError::InboundFull)));
}
