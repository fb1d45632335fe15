use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sluice_core::ContentFragment;
use sluice_gateway::{Gateway, Keepalive, SessionRegistry, SessionTasks, StreamBridge, WireFrame};
use sluice_llm::{FragmentStream, LlmError, ProviderRegistry, StreamProvider};
use tokio_util::sync::CancellationToken;

/// Backend double: yields a fixed script, then optionally fails or hangs
/// until cancelled. Remembers every scope it was handed.
#[derive(Default)]
struct ScriptedProvider {
    calls: AtomicUsize,
    scopes: Mutex<Vec<CancellationToken>>,
    fragments: Vec<ContentFragment>,
    /// Extra fragments `"<input>#<n>"` emitted after `fragments`
    numbered: usize,
    fail: bool,
    hang: bool,
}

#[async_trait]
impl StreamProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, scope: CancellationToken, input: &str) -> Result<FragmentStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().push(scope.clone());

        let mut fragments = self.fragments.clone();
        fragments.extend((0..self.numbered).map(|n| ContentFragment::text(format!("{}#{}", input, n))));
        fragments.push(ContentFragment::text(format!("echo:{}", input)));
        let (fail, hang) = (self.fail, self.hang);

        let stream = async_stream::stream! {
            for fragment in fragments {
                yield Ok(fragment);
            }
            if fail {
                yield Err(LlmError::Stream("backend exploded".into()));
                return;
            }
            if hang {
                scope.cancelled().await;
            }
        };
        Ok(Box::pin(stream))
    }
}

struct Harness {
    inbound: UnboundedSender<Result<WireFrame, String>>,
    outbound: UnboundedReceiver<WireFrame>,
    tasks: SessionTasks,
    registry: SessionRegistry,
    provider: Arc<ScriptedProvider>,
}

impl Harness {
    async fn start(provider: ScriptedProvider) -> Self {
        let provider = Arc::new(provider);
        let backend = ProviderRegistry::new().with_provider(provider.clone());
        let (registry, _task) = SessionRegistry::spawn();
        let gateway = Gateway::new(registry.clone(), StreamBridge::new(Arc::new(backend), "scripted"))
            .with_keepalive(Keepalive::default());

        let (inbound, inbound_rx) = unbounded();
        let (outbound_tx, outbound) = unbounded();
        let tasks = gateway
            .accept(Some("user-1".into()), inbound_rx, outbound_tx)
            .await
            .unwrap();

        Self {
            inbound,
            outbound,
            tasks,
            registry,
            provider,
        }
    }

    fn send_text(&self, text: impl Into<String>) {
        self.inbound
            .unbounded_send(Ok(WireFrame::Text(text.into())))
            .unwrap();
    }

    fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    /// Next application message, skipping transport pings
    async fn next_message(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.outbound.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("outbound closed");
            match frame {
                WireFrame::Text(text) => return serde_json::from_str(&text).unwrap(),
                WireFrame::Ping(_) => continue,
                other => panic!("unexpected frame {:?}", other),
            }
        }
    }

    /// Collect `chat` contents until `expected` has been assembled
    async fn read_chat_until(&mut self, expected: &str) -> Vec<Value> {
        let mut seen = Vec::new();
        let mut text = String::new();
        while !text.ends_with(expected) {
            let message = self.next_message().await;
            assert_eq!(message["type"], "chat", "got {}", message);
            text.push_str(message["payload"]["content"].as_str().unwrap());
            seen.push(message);
        }
        seen
    }
}

#[tokio::test]
async fn malformed_frame_reports_400_and_session_survives() {
    let mut h = Harness::start(ScriptedProvider::default()).await;

    h.send_text("{not json");
    let error = h.next_message().await;
    assert_eq!(error, json!({"type": "error", "payload": {"code": 400, "message": "Invalid JSON format"}}));

    h.send_json(json!({"type": "chat", "payload": {"content": 42}}));
    let error = h.next_message().await;
    assert_eq!(error["payload"]["code"], 400);
    assert_eq!(error["payload"]["message"], "Invalid chat payload");

    h.send_json(json!({"type": "ping"}));
    assert_eq!(h.next_message().await, json!({"type": "pong"}));
    assert_eq!(h.registry.len(), 1);
}

#[tokio::test]
async fn ping_gets_exactly_one_pong() {
    let mut h = Harness::start(ScriptedProvider::default()).await;

    h.send_json(json!({"type": "ping"}));
    h.send_json(json!({"type": "chat", "payload": {"content": "after"}}));

    assert_eq!(h.next_message().await, json!({"type": "pong"}));
    // The next message is the chat reply, not a second pong
    let chat = h.read_chat_until("echo:after").await;
    assert_eq!(chat.len(), 1);
}

#[tokio::test]
async fn unknown_and_client_only_types_get_404() {
    let mut h = Harness::start(ScriptedProvider::default()).await;

    h.send_json(json!({"type": "subscribe", "payload": {}}));
    let error = h.next_message().await;
    assert_eq!(error["payload"], json!({"code": 404, "message": "Unknown message type"}));

    h.send_json(json!({"type": "error", "payload": {"code": 1, "message": "x"}}));
    assert_eq!(h.next_message().await["payload"]["code"], 404);

    h.send_json(json!({"type": "system", "payload": {"motd": "hi"}}));
    assert_eq!(h.next_message().await["payload"]["code"], 404);

    h.send_json(json!({"type": "error"}));
    assert_eq!(
        h.next_message().await["payload"],
        json!({"code": 404, "message": "Unknown message type"})
    );

    h.send_json(json!({"type": "error", "payload": "boom"}));
    assert_eq!(h.next_message().await["payload"]["code"], 404);

    h.send_json(json!({"type": "ping"}));
    assert_eq!(h.next_message().await["type"], "pong");
}

#[tokio::test]
async fn chat_relays_fragments_in_order_with_model_echo() {
    let provider = ScriptedProvider {
        fragments: vec![
            ContentFragment::reasoning("think"),
            ContentFragment::text("a"),
            ContentFragment::text("b"),
        ],
        ..ScriptedProvider::default()
    };
    let mut h = Harness::start(provider).await;

    h.send_json(json!({"type": "chat", "payload": {"content": "hi", "model": "scripted"}}));
    let messages = h.read_chat_until("echo:hi").await;

    let contents: Vec<_> = messages
        .iter()
        .map(|m| m["payload"]["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, vec!["think", "a", "b", "echo:hi"]);
    assert_eq!(messages[0]["payload"]["type"], "reasoning");
    assert_eq!(messages[1]["payload"]["type"], "text");
    assert!(messages.iter().all(|m| m["payload"]["model"] == "scripted"));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_model_is_rejected_without_backend_call() {
    let mut h = Harness::start(ScriptedProvider::default()).await;

    h.send_json(json!({"type": "chat", "payload": {"content": "hi", "model": "gpt-unknown"}}));
    let error = h.next_message().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["code"], 500);
    assert_eq!(error["payload"]["message"], "provider not found: gpt-unknown");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);

    // The session is unaffected
    h.send_json(json!({"type": "ping"}));
    assert_eq!(h.next_message().await, json!({"type": "pong"}));
}

#[tokio::test]
async fn backend_error_aborts_relay_only() {
    let provider = ScriptedProvider {
        fragments: vec![ContentFragment::text("partial")],
        fail: true,
        ..ScriptedProvider::default()
    };
    let mut h = Harness::start(provider).await;

    h.send_json(json!({"type": "chat", "payload": {"content": "x"}}));
    h.read_chat_until("echo:x").await;
    let error = h.next_message().await;
    assert_eq!(error["payload"], json!({"code": 500, "message": "Stream interrupted"}));
    let scope = h.provider.scopes.lock()[0].clone();
    tokio::time::timeout(Duration::from_secs(5), scope.cancelled())
        .await
        .expect("failed relay must cancel its backend call");

    h.send_json(json!({"type": "ping"}));
    assert_eq!(h.next_message().await, json!({"type": "pong"}));
}

#[tokio::test]
async fn disconnect_cancels_in_flight_relay_and_unregisters_once() {
    let provider = ScriptedProvider {
        hang: true,
        ..ScriptedProvider::default()
    };
    let mut h = Harness::start(provider).await;
    let id = h.tasks.id.clone();

    h.send_json(json!({"type": "chat", "payload": {"content": "long"}}));
    h.read_chat_until("echo:long").await;
    let scope = h.provider.scopes.lock()[0].clone();
    assert!(!scope.is_cancelled());

    // Peer goes away
    h.inbound.close_channel();
    tokio::time::timeout(Duration::from_secs(5), scope.cancelled())
        .await
        .expect("backend call was not cancelled");

    let Harness { tasks, registry, .. } = h;
    tasks.read.await.unwrap();
    tasks.write.await.unwrap();
    assert!(registry.is_empty());
    assert!(registry.get(&id).is_none());
    assert!(!registry.unregister(&id).await, "session was already removed");
}

#[tokio::test]
async fn concurrent_chats_keep_their_own_order() {
    let provider = ScriptedProvider {
        numbered: 50,
        ..ScriptedProvider::default()
    };
    let mut h = Harness::start(provider).await;

    h.send_json(json!({"type": "chat", "payload": {"content": "A"}}));
    h.send_json(json!({"type": "chat", "payload": {"content": "B"}}));

    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut finished = 0;
    while finished < 2 {
        let message = h.next_message().await;
        let content = message["payload"]["content"].as_str().unwrap().to_string();
        if content.starts_with("echo:") {
            finished += 1;
        } else if let Some(n) = content.strip_prefix("A#") {
            a.push(n.parse::<usize>().unwrap());
        } else if let Some(n) = content.strip_prefix("B#") {
            b.push(n.parse::<usize>().unwrap());
        }
    }

    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 2);
    assert_eq!(a, (0..50).collect::<Vec<_>>());
    assert_eq!(b, (0..50).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn idle_peer_without_pongs_is_dropped() {
    let h = Harness::start(ScriptedProvider::default()).await;
    let Harness {
        tasks,
        registry,
        inbound: _inbound,
        outbound: _outbound,
        ..
    } = h;

    let exit = tasks.read.await.unwrap();
    assert_eq!(exit, sluice_gateway::PumpExit::ReadDeadline);
    tasks.write.await.unwrap();
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pongs_keep_the_session_alive_and_pings_are_sent() {
    let mut h = Harness::start(ScriptedProvider::default()).await;

    for _ in 0..3 {
        // First provider arrives on the ping period
        let frame = h.outbound.next().await.unwrap();
        assert_eq!(frame, WireFrame::Ping(Vec::new()));
        h.inbound
            .unbounded_send(Ok(WireFrame::Pong(Vec::new())))
            .unwrap();
    }
    // 3 x 54s > 60s, still registered
    assert_eq!(h.registry.len(), 1);

    // An envelope-level pong counts as liveness too
    tokio::time::sleep(Duration::from_secs(50)).await;
    h.send_json(json!({"type": "pong"}));
    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(h.registry.len(), 1);
}

#[tokio::test]
async fn oversized_frame_closes_the_connection() {
    let h = Harness::start(ScriptedProvider::default()).await;
    h.send_text("x".repeat(512 * 1024 + 1));

    let exit = h.tasks.read.await.unwrap();
    assert_eq!(exit, sluice_gateway::PumpExit::FrameTooLarge);
    assert!(h.registry.is_empty());
}
