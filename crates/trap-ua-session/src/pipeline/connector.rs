// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Wires a [`TransportPipeline`] to a live connection.
//!
//! Raw TCP pipelines run the UASC codec directly over the socket halves.
//! WebSocket pipelines perform the HTTP upgrade through `tokio-tungstenite`
//! (TLS through `rustls` when the pipeline carries a TLS stage) and carry one
//! UASC chunk per binary WebSocket message.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};

use super::codec::{UascFrame, UascFrameCodec};
use super::{TransportPipeline, WebSocketHandshake};
use crate::error::{
    ConfigurationError, ConnectionError, TimeoutError, TransportError, UaError, UaResult,
};
use crate::types::EndpointUrl;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// FrameReader / FrameWriter
// =============================================================================

/// Receiving half of a connected pipeline.
pub enum FrameReader {
    /// UASC over raw TCP.
    Tcp(FramedRead<OwnedReadHalf, UascFrameCodec>),
    /// UASC over WebSocket binary messages.
    WebSocket {
        /// Message stream.
        stream: SplitStream<WsStream>,
        /// Largest accepted chunk.
        max_chunk_size: usize,
    },
}

impl FrameReader {
    /// Reads the next chunk. Returns `None` once the peer closed the transport.
    pub async fn next_frame(&mut self) -> UaResult<Option<UascFrame>> {
        match self {
            Self::Tcp(framed) => framed.next().await.transpose(),
            Self::WebSocket {
                stream,
                max_chunk_size,
            } => loop {
                let message = match stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(map_ws_error(e)),
                    None => return Ok(None),
                };
                match message {
                    Message::Binary(data) => {
                        return UascFrame::decode_single(&data, *max_chunk_size).map(Some)
                    }
                    Message::Close(frame) => {
                        debug!(frame = ?frame, "WebSocket closed by peer");
                        return Ok(None);
                    }
                    Message::Text(_) => {
                        return Err(TransportError::invalid_frame(
                            "text message on a binary subprotocol",
                        )
                        .into())
                    }
                    other => trace!(message = ?other, "Ignoring WebSocket control message"),
                }
            },
        }
    }

    /// Sets the largest accepted chunk.
    pub fn set_max_chunk_size(&mut self, max: usize) {
        match self {
            Self::Tcp(framed) => {
                let send = framed.decoder().max_send_chunk();
                framed.decoder_mut().set_limits(max, send);
            }
            Self::WebSocket { max_chunk_size, .. } => *max_chunk_size = max,
        }
    }
}

/// Sending half of a connected pipeline.
pub enum FrameWriter {
    /// UASC over raw TCP.
    Tcp(FramedWrite<OwnedWriteHalf, UascFrameCodec>),
    /// UASC over WebSocket binary messages.
    WebSocket {
        /// Message sink.
        sink: SplitSink<WsStream, Message>,
        /// Largest chunk that may be sent.
        max_chunk_size: usize,
    },
}

impl FrameWriter {
    /// Sends one chunk.
    pub async fn send_frame(&mut self, frame: UascFrame) -> UaResult<()> {
        match self {
            Self::Tcp(framed) => framed.send(frame).await,
            Self::WebSocket {
                sink,
                max_chunk_size,
            } => {
                let size = frame.encoded_len();
                if size > *max_chunk_size {
                    return Err(TransportError::frame_too_large(size, *max_chunk_size).into());
                }
                sink.send(Message::Binary(frame.to_bytes().to_vec().into()))
                    .await
                    .map_err(map_ws_error)
            }
        }
    }

    /// Sets the largest chunk that may be sent.
    pub fn set_max_chunk_size(&mut self, max: usize) {
        match self {
            Self::Tcp(framed) => {
                let receive = framed.encoder().max_receive_chunk();
                framed.encoder_mut().set_limits(receive, max);
            }
            Self::WebSocket { max_chunk_size, .. } => *max_chunk_size = max,
        }
    }

    /// Closes the transport. Errors from an already closed peer are ignored.
    pub async fn close(&mut self) {
        let result = match self {
            Self::Tcp(framed) => framed.get_mut().shutdown().await.map_err(UaError::from),
            Self::WebSocket { sink, .. } => match sink.close().await {
                Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
                Err(e) => Err(map_ws_error(e)),
            },
        };
        if let Err(e) = result {
            trace!(error = %e, "Transport close failed");
        }
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(framed) => f
                .debug_struct("FrameReader::Tcp")
                .field("max_chunk_size", &framed.decoder().max_receive_chunk())
                .finish(),
            Self::WebSocket { max_chunk_size, .. } => f
                .debug_struct("FrameReader::WebSocket")
                .field("max_chunk_size", max_chunk_size)
                .finish(),
        }
    }
}

impl fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(framed) => f
                .debug_struct("FrameWriter::Tcp")
                .field("max_chunk_size", &framed.encoder().max_send_chunk())
                .finish(),
            Self::WebSocket { max_chunk_size, .. } => f
                .debug_struct("FrameWriter::WebSocket")
                .field("max_chunk_size", max_chunk_size)
                .finish(),
        }
    }
}

// =============================================================================
// connect
// =============================================================================

/// Opens the socket and runs every stage up to the frame codec.
///
/// The Hello/Acknowledge exchange is not part of this call.
pub async fn connect(
    pipeline: &TransportPipeline,
    connect_timeout: Duration,
) -> UaResult<(FrameReader, FrameWriter)> {
    let endpoint = pipeline.endpoint();

    let tcp = match tokio::time::timeout(connect_timeout, open_tcp(endpoint)).await {
        Ok(result) => result?,
        Err(_) => return Err(TimeoutError::connect(connect_timeout).into()),
    };
    if let Err(e) = tcp.set_nodelay(true) {
        warn!(error = %e, "Failed to set TCP_NODELAY");
    }
    debug!(endpoint = %endpoint, profile = %pipeline.profile(), "TCP connected");

    let limits = pipeline.frame_limits();

    match pipeline.websocket_handshake() {
        None => {
            let (read, write) = tcp.into_split();
            Ok((
                FrameReader::Tcp(FramedRead::new(
                    read,
                    UascFrameCodec::new(limits.max_chunk_size),
                )),
                FrameWriter::Tcp(FramedWrite::new(
                    write,
                    UascFrameCodec::new(limits.max_chunk_size),
                )),
            ))
        }
        Some(handshake) => {
            let request = upgrade_request(handshake)?;

            let mut ws_config = WebSocketConfig::default();
            ws_config.max_frame_size = Some(handshake.max_frame_size);
            ws_config.max_message_size = pipeline.websocket_message_limit();

            let connector = match pipeline.tls() {
                Some((_, config)) => Connector::Rustls(config),
                None => Connector::Plain,
            };

            let (stream, response) = tokio_tungstenite::client_async_tls_with_config(
                request,
                tcp,
                Some(ws_config),
                Some(connector),
            )
            .await
            .map_err(map_ws_error)?;

            debug!(
                uri = %handshake.uri,
                status = response.status().as_u16(),
                subprotocol = handshake.subprotocol,
                "WebSocket upgrade complete"
            );

            let (sink, stream) = stream.split();
            Ok((
                FrameReader::WebSocket {
                    stream,
                    max_chunk_size: limits.max_chunk_size,
                },
                FrameWriter::WebSocket {
                    sink,
                    max_chunk_size: limits.max_chunk_size,
                },
            ))
        }
    }
}

/// Resolves the endpoint host and connects to the first address that accepts.
async fn open_tcp(endpoint: &EndpointUrl) -> UaResult<TcpStream> {
    let authority = endpoint.authority();
    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host(authority.as_str()).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!(host = endpoint.host(), error = %e, "Host lookup failed");
            return Err(ConnectionError::unresolved_host(endpoint.host()).into());
        }
    };
    if addrs.is_empty() {
        return Err(ConnectionError::unresolved_host(endpoint.host()).into());
    }
    trace!(host = endpoint.host(), addresses = addrs.len(), "Host resolved");

    match TcpStream::connect(addrs.as_slice()).await {
        Ok(stream) => Ok(stream),
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            Err(ConnectionError::refused_with(endpoint.as_str(), e).into())
        }
        Err(e) => Err(ConnectionError::io(format!("connect to {} failed", authority), e).into()),
    }
}

fn upgrade_request(
    handshake: &WebSocketHandshake,
) -> UaResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = handshake
        .uri
        .as_str()
        .into_client_request()
        .map_err(|e| UaError::invalid_endpoint(handshake.uri.clone(), e.to_string()))?;

    let headers = request.headers_mut();
    headers.insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(handshake.subprotocol),
    );
    for (name, value) in &handshake.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigurationError::invalid_value(name.clone(), e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConfigurationError::invalid_value(name.to_string(), e.to_string()))?;
        headers.insert(name, value);
    }
    Ok(request)
}

fn map_ws_error(error: WsError) -> UaError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            ConnectionError::closed(Some("WebSocket closed".to_string())).into()
        }
        WsError::Io(e) => ConnectionError::io("WebSocket I/O failed", e).into(),
        WsError::Tls(e) => TransportError::tls(e.to_string()).into(),
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::message_too_large(size, max_size).into()
        }
        WsError::Http(response) => {
            let status = response.status();
            TransportError::upgrade_rejected(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("upgrade rejected"),
            )
            .into()
        }
        other => TransportError::websocket(other.to_string()).into(),
    }
}
