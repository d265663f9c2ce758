use crate::{
    config::Config,
    handler,
    model::{
        client_message::ClientMessage,
        server_message::{ErrorKind, ServerMessage},
        session::LiveSession,
    },
    store::Store,
};
use futures_util::{SinkExt, StreamExt};
use log::*;
use rand::Rng;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, mpsc},
};
use tokio_tungstenite::{
    WebSocketStream, accept_async,
    tungstenite::{Error, Message, Result},
};

pub type Tx = mpsc::UnboundedSender<Message>;
pub type Rx = mpsc::UnboundedReceiver<Message>;

/// Shared server state: the live session map plus the REST-facing store.
pub struct AppState {
    pub sessions: Mutex<HashMap<String, LiveSession>>,
    pub store: Store,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store: Store::new(),
            config,
        }
    }
}

/// Six-character alphanumeric join code, ambiguous glyphs excluded.
pub fn generate_join_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();
    (0..6)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

// === Connection liveness ===
// Server-initiated ping every PING_INTERVAL; a connection that hasn't
// ponged within the timeout is dropped.

pub const PING_INTERVAL: Duration = Duration::from_secs(5);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Heartbeat {
    last_pong: Instant,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            last_pong: Instant::now(),
        }
    }

    pub fn record_pong(&mut self) {
        self.last_pong = Instant::now();
    }

    pub fn is_alive(&self) -> bool {
        self.last_pong.elapsed() < PONG_TIMEOUT
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_connection(peer: SocketAddr, stream: TcpStream, app_state: Arc<AppState>) {
    if let Err(e) = handle_connection(peer, stream, app_state).await {
        match e {
            Error::ConnectionClosed | Error::Protocol(_) | Error::Utf8(_) => (),
            err => error!("Error processing connection: {err}"),
        }
    }
}

async fn send_error(
    ws_stream: &mut WebSocketStream<TcpStream>,
    kind: ErrorKind,
    message: impl Into<String>,
) -> Result<()> {
    let error_message = ServerMessage::error(kind, message);
    let msg = serde_json::to_string(&error_message).unwrap_or_default();
    ws_stream.send(Message::text(msg)).await
}

/// First-message dispatch: every connection must open with joinSession.
/// A userId equal to the session's host attaches the host channel, anything
/// else joins (or rejoins) as a participant.
async fn handle_connection(
    peer: SocketAddr,
    stream: TcpStream,
    app_state: Arc<AppState>,
) -> Result<()> {
    let mut ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection: {peer}");

    if let Some(msg) = ws_stream.next().await {
        let msg = msg?;
        if let Ok(text) = msg.to_text() {
            match serde_json::from_str::<ClientMessage>(text) {
                Ok(ClientMessage::JoinSession {
                    session_id,
                    user_id,
                    name,
                    avatar,
                }) => {
                    let is_host = {
                        let sessions = app_state.sessions.lock().await;
                        match sessions.get(&session_id) {
                            Some(session) => session.host_id == user_id,
                            None => {
                                drop(sessions);
                                info!(
                                    "{user_id} tried to join session {session_id}, but it doesn't exist"
                                );
                                send_error(
                                    &mut ws_stream,
                                    ErrorKind::SessionNotFound,
                                    format!("Session {session_id} not found"),
                                )
                                .await?;
                                return Ok(());
                            }
                        }
                    };
                    if is_host {
                        handler::host::attach_host(app_state, ws_stream, session_id, user_id)
                            .await;
                    } else {
                        handler::participant::join_session(
                            app_state, ws_stream, session_id, user_id, name, avatar,
                        )
                        .await;
                    }
                }
                Ok(other) => {
                    warn!("Expected joinSession as first message, instead got: {other:?}");
                    send_error(
                        &mut ws_stream,
                        ErrorKind::InvalidCommand,
                        "First message must be joinSession",
                    )
                    .await?;
                }
                Err(e) => {
                    warn!("Failed to parse first message: {e}");
                    send_error(&mut ws_stream, ErrorKind::Parse, format!("Invalid JSON: {e}"))
                        .await?;
                }
            }
        }
    }

    Ok(())
}

pub async fn start_ws_server(listener: TcpListener, app_state: Arc<AppState>) {
    let addr = listener.local_addr().expect("Failed to get local address");
    info!("Realtime gateway listening on: {addr}");

    while let Ok((stream, _)) = listener.accept().await {
        let peer = stream
            .peer_addr()
            .expect("connected streams should have a peer address");
        debug!("Peer address: {peer}");

        tokio::spawn(accept_connection(peer, stream, app_state.clone()));
    }
}
