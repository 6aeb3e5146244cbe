//! The connection dispatcher: one task per TCP connection, spawned the way
//! the teacher spawns one task per editor connection in `editor.rs`. Each
//! connection is bound to at most one document at a time; `JoinDocument`
//! switches (or establishes) that binding, everything else requires it.
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{info, warn};

use crate::codec::ClientCodec;
use crate::error::RelayError;
use crate::protocol::{ClientMessage, ConnectionId, ServerMessage};
use crate::registry::Registry;
use crate::session::SessionHandle;

struct Joined {
    session: SessionHandle,
    feed: broadcast::Receiver<(ConnectionId, ServerMessage)>,
}

/// Drives one connection end to end: accepts client messages, mutates the
/// bound document through its [`SessionHandle`], and relays broadcast
/// traffic from every other connection on the same document back out.
pub async fn handle_connection(stream: TcpStream, registry: std::sync::Arc<Registry>) {
    let peer = stream.peer_addr().ok();
    let conn_id = ConnectionId::generate();
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, ClientCodec::new());
    let mut writer = FramedWrite::new(write_half, ClientCodec::new());

    let mut joined: Option<Joined> = None;

    loop {
        let outcome = match &mut joined {
            Some(state) => {
                tokio::select! {
                    biased;
                    incoming = reader.next() => Outcome::Client(incoming),
                    broadcast = state.feed.recv() => Outcome::Broadcast(broadcast),
                }
            }
            None => Outcome::Client(reader.next().await),
        };

        match outcome {
            Outcome::Client(Some(Ok(message))) => {
                if let Err(err) = handle_client_message(&conn_id, message, &registry, &mut joined, &mut writer).await {
                    warn!(%conn_id, %err, "rejecting message");
                }
            }
            Outcome::Client(Some(Err(err))) => {
                warn!(%conn_id, %err, "connection read error");
                break;
            }
            Outcome::Client(None) => break,
            Outcome::Broadcast(Ok((sender, message))) => {
                if sender != conn_id && writer.send(message).await.is_err() {
                    break;
                }
            }
            Outcome::Broadcast(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(%conn_id, skipped, "dropped broadcast messages, client is too slow");
            }
            Outcome::Broadcast(Err(broadcast::error::RecvError::Closed)) => break,
        }
    }

    if let Some(state) = joined.take() {
        state.session.leave(conn_id.clone()).await;
        let users = state.session.snapshot().await.users;
        state.session.publish(conn_id.clone(), ServerMessage::UserLeft { user_id: conn_id.clone(), users });
    }
    info!(%conn_id, ?peer, "connection closed");
}

enum Outcome {
    Client(Option<Result<ClientMessage, RelayError>>),
    Broadcast(Result<(ConnectionId, ServerMessage), broadcast::error::RecvError>),
}

async fn handle_client_message(
    conn_id: &ConnectionId,
    message: ClientMessage,
    registry: &Registry,
    joined: &mut Option<Joined>,
    writer: &mut FramedWrite<tokio::io::WriteHalf<TcpStream>, ClientCodec>,
) -> Result<(), RelayError> {
    match message {
        ClientMessage::JoinDocument { document_id, user_name } => {
            if let Some(previous) = joined.take() {
                previous.session.leave(conn_id.clone()).await;
            }

            let session = registry.get_or_create(&document_id).await;
            let color = registry.next_color();
            let feed = session.subscribe();
            let (user, snapshot) = session.join(conn_id.clone(), user_name, color).await;

            writer
                .send(ServerMessage::DocumentState { content: snapshot.content, version: snapshot.version, users: snapshot.users.clone() })
                .await?;
            session.publish(conn_id.clone(), ServerMessage::UserJoined { user, users: snapshot.users });

            *joined = Some(Joined { session, feed });
            Ok(())
        }
        ClientMessage::Operation { operation } => {
            let state = joined.as_ref().ok_or(RelayError::NotJoined)?;
            if let Some((applied, version)) = state.session.submit(conn_id.clone(), operation).await? {
                state.session.publish(conn_id.clone(), ServerMessage::Operation { operation: applied, version });
            }
            Ok(())
        }
        ClientMessage::CursorPosition { position } => {
            let state = joined.as_ref().ok_or(RelayError::NotJoined)?;
            state.session.set_cursor(conn_id.clone(), position).await?;
            state.session.publish(conn_id.clone(), ServerMessage::CursorUpdate { user_id: conn_id.clone(), position });
            Ok(())
        }
    }
}
