// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! - [`SessionFsmHarness`]: a running session FSM wired to mock collaborators
//! - [`LoopbackServer`]: a minimal UASC server on a loopback port, speaking raw
//!   TCP or WebSocket

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode as HttpStatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::codec::Framed;

use trap_ua_session::channel::HelloMessage;
use trap_ua_session::pipeline::MessageType;
use trap_ua_session::{
    ChannelOpener, CompletionExecutor, EndpointDescription, SessionConfig, SessionFsm,
    SessionListener, SessionServices, UascFrame, UascFrameCodec,
};

use super::builders::{HelloReply, LoopbackServerBuilder, ServerSend, UpgradeReply};
use super::fixtures::{ConfigFixtures, EndpointFixtures};
use super::mocks::{MockChannelOpener, MockSessionServices, RecordingListener};

const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

// =============================================================================
// Session FSM Harness
// =============================================================================

/// A session FSM with mock opener, services and a recording listener.
pub struct SessionFsmHarness {
    /// The FSM under test.
    pub fsm: SessionFsm,

    /// Channel opener.
    pub opener: Arc<MockChannelOpener>,

    /// Session services.
    pub services: Arc<MockSessionServices>,

    /// Listener registered on the FSM.
    pub listener: Arc<RecordingListener>,
}

impl SessionFsmHarness {
    /// Start a harness with default settings.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(MockChannelOpener::new()),
            Arc::new(MockSessionServices::new()),
            None,
        )
    }

    /// Start a harness with the given collaborators.
    pub fn with_parts(
        opener: Arc<MockChannelOpener>,
        services: Arc<MockSessionServices>,
        executor: Option<Arc<dyn CompletionExecutor>>,
    ) -> Self {
        Self::build(
            EndpointFixtures::tcp(),
            ConfigFixtures::fast_session(),
            opener,
            services,
            executor,
        )
    }

    /// Start a harness with a custom session configuration.
    pub fn with_session_config(config: SessionConfig) -> Self {
        Self::build(
            EndpointFixtures::tcp(),
            config,
            Arc::new(MockChannelOpener::new()),
            Arc::new(MockSessionServices::new()),
            None,
        )
    }

    fn build(
        endpoint: EndpointDescription,
        session_config: SessionConfig,
        opener: Arc<MockChannelOpener>,
        services: Arc<MockSessionServices>,
        executor: Option<Arc<dyn CompletionExecutor>>,
    ) -> Self {
        crate::common::init_test_logging();
        let listener = Arc::new(RecordingListener::new());
        let mut builder = SessionFsm::builder(
            endpoint,
            Arc::clone(&opener) as Arc<dyn ChannelOpener>,
            Arc::clone(&services) as Arc<dyn SessionServices>,
        )
        .channel_config(ConfigFixtures::fast_channel())
        .session_config(session_config)
        .listener(Arc::clone(&listener) as Arc<dyn SessionListener>);
        if let Some(executor) = executor {
            builder = builder.executor(executor);
        }
        let fsm = builder.build().expect("Failed to start session FSM");

        Self {
            fsm,
            opener,
            services,
            listener,
        }
    }
}

impl Default for SessionFsmHarness {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Loopback Server
// =============================================================================

/// What the loopback server saw from its clients.
#[derive(Debug, Default)]
struct Recorded {
    hellos: Mutex<Vec<HelloMessage>>,
    subprotocols: Mutex<Vec<String>>,
}

/// Minimal UASC server answering each connection's Hello per a
/// [`LoopbackServerBuilder`], over raw TCP or behind a WebSocket upgrade.
pub struct LoopbackServer {
    addr: SocketAddr,
    websocket: bool,
    recorded: Arc<Recorded>,
    connections: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl LoopbackServer {
    /// Bind to an ephemeral loopback port and start serving.
    pub async fn start(behaviour: LoopbackServerBuilder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind loopback listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let websocket = behaviour.upgrade.is_some();
        let recorded = Arc::new(Recorded::default());
        let connections = Arc::new(AtomicU64::new(0));

        let task = {
            let recorded = Arc::clone(&recorded);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let recorded = Arc::clone(&recorded);
                    if behaviour.upgrade.is_some() {
                        tokio::spawn(serve_websocket(stream, behaviour.clone(), recorded));
                    } else {
                        tokio::spawn(serve_tcp(stream, behaviour.clone(), recorded));
                    }
                }
            })
        };

        Self {
            addr,
            websocket,
            recorded,
            connections,
            task,
        }
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Endpoint pointing at this server, `opc.ws` when serving WebSocket.
    pub fn endpoint(&self) -> EndpointDescription {
        if self.websocket {
            EndpointFixtures::websocket_loopback(self.port())
        } else {
            EndpointFixtures::loopback(self.port())
        }
    }

    /// Hello messages received so far.
    pub fn hellos(&self) -> Vec<HelloMessage> {
        self.recorded.hellos.lock().clone()
    }

    /// `Sec-WebSocket-Protocol` values requested so far.
    pub fn subprotocols(&self) -> Vec<String> {
        self.recorded.subprotocols.lock().clone()
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn record_hello(recorded: &Recorded, frame: UascFrame) {
    if frame.message_type == MessageType::Hello {
        if let Ok(hello) = HelloMessage::decode(frame.body) {
            recorded.hellos.lock().push(hello);
        }
    }
}

async fn serve_tcp(stream: TcpStream, behaviour: LoopbackServerBuilder, recorded: Arc<Recorded>) {
    let mut framed = Framed::new(stream, UascFrameCodec::new(behaviour.max_chunk_size));

    match framed.next().await {
        Some(Ok(frame)) => record_hello(&recorded, frame),
        _ => return,
    }

    let sent = match behaviour.reply {
        HelloReply::Acknowledge(ack) => framed.send(ack.encode()).await.is_ok(),
        HelloReply::Error(error) => {
            let _ = framed.send(error.encode()).await;
            return;
        }
        HelloReply::Silent => true,
        HelloReply::Close => return,
        HelloReply::Raw(bytes) => framed.get_mut().write_all(&bytes).await.is_ok(),
    };
    if !sent {
        return;
    }

    for item in &behaviour.after_reply {
        let bytes = match item {
            ServerSend::Chunk(bytes) => bytes.as_ref(),
            ServerSend::Text(text) => text.as_bytes(),
        };
        if framed.get_mut().write_all(bytes).await.is_err() {
            return;
        }
    }
    if behaviour.hang_up {
        return;
    }

    // hold the connection until the client goes away
    while let Some(Ok(_)) = framed.next().await {}
}

async fn serve_websocket(
    stream: TcpStream,
    behaviour: LoopbackServerBuilder,
    recorded: Arc<Recorded>,
) {
    let upgrade = behaviour.upgrade;
    let seen = Arc::clone(&recorded);
    let callback = move |request: &Request, mut response: Response| {
        let protocol = request.headers().get(SUBPROTOCOL_HEADER).cloned();
        if let Some(value) = &protocol {
            seen.subprotocols
                .lock()
                .push(value.to_str().unwrap_or_default().to_string());
        }
        if let Some(UpgradeReply::Reject(status)) = upgrade {
            let mut rejection = ErrorResponse::new(Some("upgrade refused".to_string()));
            *rejection.status_mut() =
                HttpStatusCode::from_u16(status).unwrap_or(HttpStatusCode::FORBIDDEN);
            return Err(rejection);
        }
        if let Some(value) = protocol {
            response.headers_mut().insert(SUBPROTOCOL_HEADER, value);
        }
        Ok(response)
    };

    let mut ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    let data = loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => break data,
            Some(Ok(_)) => continue,
            _ => return,
        }
    };
    if let Ok(frame) = UascFrame::decode_single(&data, behaviour.max_chunk_size) {
        record_hello(&recorded, frame);
    }

    let reply = match behaviour.reply {
        HelloReply::Acknowledge(ack) => Some(ack.encode().to_bytes()),
        HelloReply::Error(error) => {
            let _ = ws.send(Message::Binary(error.encode().to_bytes().to_vec())).await;
            let _ = ws.close(None).await;
            return;
        }
        HelloReply::Silent => None,
        HelloReply::Close => return,
        HelloReply::Raw(bytes) => Some(bytes),
    };
    if let Some(bytes) = reply {
        if ws.send(Message::Binary(bytes.to_vec())).await.is_err() {
            return;
        }
    }

    for item in &behaviour.after_reply {
        let message = match item {
            ServerSend::Chunk(bytes) => Message::Binary(bytes.to_vec()),
            ServerSend::Text(text) => Message::Text(text.clone()),
        };
        if ws.send(message).await.is_err() {
            return;
        }
    }
    if behaviour.hang_up {
        let _ = ws.close(None).await;
        return;
    }

    while let Some(Ok(_)) = ws.next().await {}
}
