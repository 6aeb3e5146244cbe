//! The client side of the protocol: owns local content, runs the change
//! detector on local edits, applies remote operations through the algebra,
//! and reconnects with backoff when the relay connection drops.
//!
//! This is the "baseline" driver spec.md §4.5 describes: it does not queue
//! unacknowledged local operations or transform them against late-arriving
//! remote ones (see the open question recorded in `DESIGN.md`). It trusts
//! the relay's linearisation and simply reflects whatever comes back.
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{info, warn};

use crate::change_detector;
use crate::codec::ServerCodec;
use crate::ot;
use crate::protocol::{ClientMessage, ConnectionId, DocumentId, ServerMessage, User};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub addr: SocketAddr,
    pub document_id: DocumentId,
    pub user_name: Option<String>,
}

/// What the UI layer (out of scope here) would subscribe to in order to
/// repaint itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    DocumentState { content: String, version: u64, users: Vec<User> },
    RemoteOperationApplied { content: String, version: u64 },
    UserJoined { users: Vec<User> },
    UserLeft { users: Vec<User> },
    CursorUpdate { user_id: ConnectionId, position: usize },
    Disconnected,
    Reconnected,
}

enum ClientCommand {
    LocalEdit { new_content: String, caret_after_edit: usize },
    SetCursor { position: usize },
    Shutdown,
}

/// Handle the rest of the editor talks to; the actual connection and
/// reconnect loop runs in a spawned task, mirroring the actor shape used
/// server-side in `session.rs`.
pub struct ClientSession {
    commands: mpsc::Sender<ClientCommand>,
}

impl ClientSession {
    #[must_use]
    pub fn connect(config: ClientConfig, user_id: String) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(32);

        tokio::spawn(run(config, user_id, commands_rx, events_tx));

        (Self { commands: commands_tx }, events_rx)
    }

    /// Feeds one local edit through the change detector; sends the
    /// resulting operation (if any) to the relay.
    pub async fn apply_local_edit(&self, new_content: String, caret_after_edit: usize) {
        let _ = self.commands.send(ClientCommand::LocalEdit { new_content, caret_after_edit }).await;
    }

    pub async fn set_cursor(&self, position: usize) {
        let _ = self.commands.send(ClientCommand::SetCursor { position }).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(ClientCommand::Shutdown).await;
    }
}

struct ClientState {
    content: String,
    prev_content: String,
    user_id: String,
    observed: Vec<ot::Operation>,
}

async fn run(
    config: ClientConfig,
    user_id: String,
    mut commands: mpsc::Receiver<ClientCommand>,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut backoff = INITIAL_BACKOFF;
    let mut state = ClientState { content: String::new(), prev_content: String::new(), user_id, observed: Vec::new() };
    let mut first_attempt = true;

    loop {
        let stream = match TcpStream::connect(config.addr).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, addr = %config.addr, "connect failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };
        backoff = INITIAL_BACKOFF;
        if !first_attempt {
            let _ = events.send(ClientEvent::Reconnected).await;
        }
        first_attempt = false;

        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, ServerCodec::new());
        let mut writer = FramedWrite::new(write_half, ServerCodec::new());

        let join = ClientMessage::JoinDocument { document_id: config.document_id.clone(), user_name: config.user_name.clone() };
        if writer.send(join).await.is_err() {
            continue;
        }

        let disconnected = session_loop(&mut reader, &mut writer, &mut commands, &events, &mut state).await;
        let _ = events.send(ClientEvent::Disconnected).await;
        if disconnected.shutdown_requested {
            info!("client session shut down by request");
            return;
        }
    }
}

struct LoopOutcome {
    shutdown_requested: bool,
}

async fn session_loop(
    reader: &mut FramedRead<tokio::io::ReadHalf<TcpStream>, ServerCodec>,
    writer: &mut FramedWrite<tokio::io::WriteHalf<TcpStream>, ServerCodec>,
    commands: &mut mpsc::Receiver<ClientCommand>,
    events: &mpsc::Sender<ClientEvent>,
    state: &mut ClientState,
) -> LoopOutcome {
    loop {
        tokio::select! {
            incoming = reader.next() => {
                match incoming {
                    Some(Ok(message)) => handle_server_message(message, state, events).await,
                    Some(Err(err)) => {
                        warn!(%err, "malformed message from relay");
                        continue;
                    }
                    None => return LoopOutcome { shutdown_requested: false },
                }
            }
            command = commands.recv() => {
                match command {
                    Some(ClientCommand::LocalEdit { new_content, caret_after_edit }) => {
                        handle_local_edit(new_content, caret_after_edit, state, writer).await;
                    }
                    Some(ClientCommand::SetCursor { position }) => {
                        let _ = writer.send(ClientMessage::CursorPosition { position }).await;
                    }
                    Some(ClientCommand::Shutdown) | None => {
                        // Disconnection is transport-level: closing the socket
                        // (the caller drops the stream once we return) is the
                        // whole signal, there is no wire message for it.
                        return LoopOutcome { shutdown_requested: true };
                    }
                }
            }
        }
    }
}

async fn handle_server_message(message: ServerMessage, state: &mut ClientState, events: &mpsc::Sender<ClientEvent>) {
    match message {
        ServerMessage::DocumentState { content, version, users } => {
            state.content = content.clone();
            state.prev_content = content.clone();
            state.observed.clear();
            let _ = events.send(ClientEvent::DocumentState { content, version, users }).await;
        }
        ServerMessage::Operation { operation, version } => {
            match ot::apply(&state.content, &operation) {
                Ok(new_content) => {
                    state.content = new_content.clone();
                    state.prev_content = new_content.clone();
                    state.observed.push(operation);
                    let _ = events.send(ClientEvent::RemoteOperationApplied { content: new_content, version }).await;
                }
                Err(err) => warn!(%err, "remote operation did not apply to local content, awaiting resync"),
            }
        }
        ServerMessage::UserJoined { users, .. } => {
            let _ = events.send(ClientEvent::UserJoined { users }).await;
        }
        ServerMessage::UserLeft { users, .. } => {
            let _ = events.send(ClientEvent::UserLeft { users }).await;
        }
        ServerMessage::CursorUpdate { user_id, position } => {
            let _ = events.send(ClientEvent::CursorUpdate { user_id, position }).await;
        }
    }
}

async fn handle_local_edit(
    new_content: String,
    caret_after_edit: usize,
    state: &mut ClientState,
    writer: &mut FramedWrite<tokio::io::WriteHalf<TcpStream>, ServerCodec>,
) {
    let timestamp = now_millis();
    let Some(operation) = change_detector::detect(&state.prev_content, &new_content, caret_after_edit, &state.user_id, timestamp) else {
        state.content = new_content.clone();
        state.prev_content = new_content;
        return;
    };

    state.content = new_content.clone();
    state.prev_content = new_content;
    state.observed.push(operation.clone());
    let _ = writer.send(ClientMessage::Operation { operation }).await;
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}
