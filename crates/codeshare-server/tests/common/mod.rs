#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use codeshare_core::ids::SessionId;
use codeshare_llm::{CompletionGateway, GatewayConfig, MockProvider, MockResponse};
use codeshare_sandbox::{SandboxConfig, SandboxExecutor};
use codeshare_server::{start, ServerConfig, ServerHandle};
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestServer {
    pub handle: ServerHandle,
    pub mock: Arc<MockProvider>,
}

impl TestServer {
    /// Boot a server on a random port with a mock completion provider and a short
    /// execution timeout.
    pub async fn boot(responses: Vec<MockResponse>) -> Self {
        let mock = Arc::new(MockProvider::new(responses));
        let gateway = CompletionGateway::new(mock.clone(), GatewayConfig::default());
        let executor = SandboxExecutor::new(SandboxConfig {
            timeout: Duration::from_secs(1),
            ..Default::default()
        });
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        };
        let handle = start(config, executor, gateway).await.unwrap();
        Self { handle, mock }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.handle.port)
    }

    pub fn ws_url(&self, session: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/{session}", self.handle.port)
    }

    pub fn member_count(&self, session: &str) -> usize {
        self.handle
            .registry()
            .member_count(&SessionId::from_raw(session))
    }

    /// Connect to `session` and wait until the server has registered the connection.
    pub async fn connect(&self, session: &str) -> WsStream {
        let before = self.member_count(session);
        let (ws, _) = connect_async(self.ws_url(session)).await.unwrap();
        self.wait_for_members(session, before + 1).await;
        ws
    }

    pub async fn wait_for_members(&self, session: &str, expected: usize) {
        timeout(TIMEOUT, async {
            while self.member_count(session) != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "session {session} never reached {expected} members (has {})",
                self.member_count(session)
            )
        });
    }
}

pub async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::text(text)).await.unwrap();
}

/// Next text frame, skipping control frames.
pub async fn recv_text(ws: &mut WsStream) -> String {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for text frame")
}

/// Assert nothing arrives within a short window.
pub async fn assert_silent(ws: &mut WsStream) {
    match timeout(Duration::from_millis(200), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Ping(_)))) => {}
        Ok(other) => panic!("expected no frame, got {other:?}"),
    }
}
