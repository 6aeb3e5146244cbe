//! Wraps one [`Document`] in a single task (a "session actor"), reachable
//! only through a bounded `mpsc` channel — the same shape as the teacher's
//! `DaemonActor`/`Daemon` split in `daemon.rs`. This is what makes "all
//! four mutating operations are serialised" (spec.md §4.3) true under a
//! real multi-threaded runtime: the actor processes one command at a time
//! off its channel, so there is never a second task mutating `Document`
//! concurrently.
//!
//! Per-document fan-out rides a `broadcast` channel owned by the handle,
//! not the actor — publishing never needs the actor's cooperation, so a
//! slow subscriber can never stall a submit.
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::document::{Document, Snapshot};
use crate::error::RelayError;
use crate::ot::Operation;
use crate::protocol::{ConnectionId, DocumentId, ServerMessage, User};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const BROADCAST_CHANNEL_CAPACITY: usize = 256;

enum SessionCommand {
    Join {
        conn_id: ConnectionId,
        desired_name: Option<String>,
        color: String,
        response_tx: oneshot::Sender<(User, Snapshot)>,
    },
    Leave {
        conn_id: ConnectionId,
        response_tx: oneshot::Sender<()>,
    },
    Submit {
        conn_id: ConnectionId,
        operation: Operation,
        response_tx: oneshot::Sender<Result<Option<(Operation, u64)>, RelayError>>,
    },
    SetCursor {
        conn_id: ConnectionId,
        position: usize,
        response_tx: oneshot::Sender<Result<(), RelayError>>,
    },
    Snapshot {
        response_tx: oneshot::Sender<Snapshot>,
    },
    UserCount {
        response_tx: oneshot::Sender<usize>,
    },
}

struct SessionActor {
    document: Document,
    rx: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }
        debug!(document_id = %self.document.id, "session actor shutting down, no more handles");
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join { conn_id, desired_name, color, response_tx } => {
                let result = self.document.join(conn_id, desired_name, color);
                let _ = response_tx.send(result);
            }
            SessionCommand::Leave { conn_id, response_tx } => {
                self.document.leave(&conn_id);
                let _ = response_tx.send(());
            }
            SessionCommand::Submit { conn_id, operation, response_tx } => {
                let result = self.document.submit(&conn_id, operation);
                let _ = response_tx.send(result);
            }
            SessionCommand::SetCursor { conn_id, position, response_tx } => {
                let result = self.document.set_cursor(&conn_id, position);
                let _ = response_tx.send(result);
            }
            SessionCommand::Snapshot { response_tx } => {
                let _ = response_tx.send(self.document.snapshot());
            }
            SessionCommand::UserCount { response_tx } => {
                let _ = response_tx.send(self.document.user_count());
            }
        }
    }
}

/// The handle the rest of the process talks to. Cheap to clone: cloning
/// shares the same underlying actor task and broadcast bus.
#[derive(Clone)]
pub struct SessionHandle {
    pub document_id: DocumentId,
    tx: mpsc::Sender<SessionCommand>,
    broadcast_tx: broadcast::Sender<(ConnectionId, ServerMessage)>,
}

impl SessionHandle {
    #[must_use]
    pub fn spawn(document_id: DocumentId) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);

        let actor = SessionActor {
            document: Document::new(document_id.clone()),
            rx,
        };
        tokio::spawn(actor.run());

        Self { document_id, tx, broadcast_tx }
    }

    pub async fn join(&self, conn_id: ConnectionId, desired_name: Option<String>, color: String) -> (User, Snapshot) {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Join { conn_id, desired_name, color, response_tx }).await;
        response_rx.await.expect("session actor dropped the response channel")
    }

    pub async fn leave(&self, conn_id: ConnectionId) {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Leave { conn_id, response_tx }).await;
        let _ = response_rx.await;
    }

    pub async fn submit(&self, conn_id: ConnectionId, operation: Operation) -> Result<Option<(Operation, u64)>, RelayError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Submit { conn_id, operation, response_tx }).await;
        response_rx.await.expect("session actor dropped the response channel")
    }

    pub async fn set_cursor(&self, conn_id: ConnectionId, position: usize) -> Result<(), RelayError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::SetCursor { conn_id, position, response_tx }).await;
        response_rx.await.expect("session actor dropped the response channel")
    }

    pub async fn snapshot(&self) -> Snapshot {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { response_tx }).await;
        response_rx.await.expect("session actor dropped the response channel")
    }

    pub async fn user_count(&self) -> usize {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::UserCount { response_tx }).await;
        response_rx.await.expect("session actor dropped the response channel")
    }

    /// Publishes a message to every subscriber (every other connection's
    /// task), tagged with the connection id that caused it so subscribers
    /// can filter themselves out. Never blocks on a slow subscriber: a
    /// `broadcast` channel drops old messages for lagging receivers rather
    /// than exerting backpressure on the sender.
    pub fn publish(&self, sender: ConnectionId, message: ServerMessage) {
        if self.broadcast_tx.send((sender, message)).is_err() {
            debug!(document_id = %self.document_id, "publish with no subscribers");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(ConnectionId, ServerMessage)> {
        self.broadcast_tx.subscribe()
    }

    async fn send(&self, command: SessionCommand) {
        if self.tx.send(command).await.is_err() {
            warn!(document_id = %self.document_id, "session actor task is gone");
        }
    }
}
