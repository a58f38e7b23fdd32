//! WebSocket transport
//!
//! Accepts TCP connections, upgrades them to WebSocket and binds each one
//! to a gateway session:
//! - the first frame must be an `auth` message carrying a valid token,
//!   otherwise the connection is answered with an `error` event and dropped
//! - every following text frame goes to [`RealtimeGateway::handle_text`]
//! - events for the session are written back through a [`WsSink`]
//! - the session is closed as soon as the socket ends, whichever side ends it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::auth::TokenAuthority;
use super::gateway::RealtimeGateway;
use super::message::{Claims, ClientMessage};
use crate::broker::Event;
use crate::registry::TransportSink;
use crate::utils::{DispatchError, Result};

/// How long a fresh connection has to present its token.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

type WsWriter = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsReader = SplitStream<WebSocketStream<TcpStream>>;

/// Write half of a WebSocket connection as a [`TransportSink`].
pub struct WsSink {
    writer: Mutex<WsWriter>,
}

impl WsSink {
    fn new(writer: WsWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl TransportSink for WsSink {
    async fn push(&self, session_id: &str, payload: &str) -> Result<()> {
        self.writer
            .lock()
            .await
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| DispatchError::Transport(format!("{session_id}: {e}")))
    }
}

/// Bind `addr` and serve WebSocket connections until the listener fails.
pub async fn start_websocket_server(
    addr: &str,
    gateway: RealtimeGateway,
    authority: TokenAuthority,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DispatchError::Transport(format!("cannot bind {addr}: {e}")))?;
    serve(listener, gateway, authority).await
}

/// Serve WebSocket connections on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    gateway: RealtimeGateway,
    authority: TokenAuthority,
) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("WebSocket server listening on ws://{local}");
    }
    let authority = Arc::new(authority);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| DispatchError::Transport(format!("accept failed: {e}")))?;
        let gateway = gateway.clone();
        let authority = authority.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, gateway, &authority).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    gateway: RealtimeGateway,
    authority: &TokenAuthority,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut writer, mut reader) = ws_stream.split();

    let claims = match authenticate(&mut reader, authority).await {
        Ok(claims) => claims,
        Err(e) => {
            warn!(%peer, "connection refused: {e}");
            if let Ok(text) = serde_json::to_string(&Event::error(e.to_string())) {
                let _ = writer.send(WsMessage::Text(text.into())).await;
            }
            let _ = writer.close().await;
            return;
        }
    };

    let session_id = gateway.open(claims.sub.clone(), claims.role, Arc::new(WsSink::new(writer)));
    info!(%peer, %session_id, participant_id = %claims.sub, role = %claims.role, "participant connected");

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => gateway.handle_text(&session_id, text.as_str()).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%session_id, "read error: {e}");
                break;
            }
        }
        // the registry may have dropped the session after a sink failure
        if gateway.registry().session(&session_id).is_err() {
            break;
        }
    }

    gateway.close(&session_id);
    info!(%peer, %session_id, "participant disconnected");
}

/// Wait for the first text frame and verify it is a valid `auth` message.
async fn authenticate(reader: &mut WsReader, authority: &TokenAuthority) -> Result<Claims> {
    let first = tokio::time::timeout(AUTH_TIMEOUT, async {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => return Ok(text),
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(DispatchError::Transport(e.to_string())),
            }
        }
        Err(DispatchError::Transport("closed before authenticating".into()))
    })
    .await
    .map_err(|_| DispatchError::invalid_input("authentication timed out"))??;

    match serde_json::from_str::<ClientMessage>(first.as_str()) {
        Ok(ClientMessage::Auth { token }) => authority.verify(&token),
        Ok(_) => Err(DispatchError::invalid_input("must authenticate first")),
        Err(e) => Err(DispatchError::invalid_input(format!("malformed message: {e}"))),
    }
}
