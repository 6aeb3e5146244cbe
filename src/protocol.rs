//! Wire message types and the small identifier newtypes shared by the
//! relay, the session store and the client driver.
//!
//! The wire format is flat JSON tagged unions, one object per line (see
//! `codec.rs`), matching spec.md §6 literally: no JSON-RPC envelope, no
//! request/response ids — every message is either a client notification or
//! a server broadcast.
use derive_more::{AsRef, Deref, Display};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ot::Operation;

#[derive(Debug, Clone, PartialEq, Eq, Hash, AsRef, Deref, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// A connection's id doubles as its `User::id` once joined; it is also the
/// OT tie-break key, so it must stay stable and totally orderable for the
/// life of the connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, AsRef, Deref, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(random_id("conn"))
    }

    /// Short, human-friendly suffix used for default guest display names.
    #[must_use]
    pub fn as_str_suffix(&self) -> String {
        self.0.chars().rev().take(4).collect::<String>().chars().rev().collect()
    }
}

/// Fixed 8-entry colour palette, assigned round-robin by the registry.
pub const COLOR_PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#bfef45",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: ConnectionId,
    pub name: String,
    pub color: String,
    pub cursor: usize,
}

/// Client -> relay messages. Disconnection is a transport-level event, not
/// a message: a client that wants to leave just closes its connection, and
/// the relay observes EOF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinDocument {
        document_id: DocumentId,
        #[serde(default)]
        user_name: Option<String>,
    },
    Operation {
        operation: Operation,
    },
    CursorPosition {
        position: usize,
    },
}

/// Relay -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServerMessage {
    DocumentState {
        content: String,
        version: u64,
        users: Vec<User>,
    },
    Operation {
        operation: Operation,
        version: u64,
    },
    UserJoined {
        user: User,
        users: Vec<User>,
    },
    UserLeft {
        user_id: ConnectionId,
        users: Vec<User>,
    },
    CursorUpdate {
        user_id: ConnectionId,
        position: usize,
    },
}

/// Generates an opaque id string of the form `"{prefix}-{16 hex chars}"`.
/// Ids are never parsed, only compared and logged (spec.md §9: "Identifiers
/// as strings").
#[must_use]
pub fn random_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let bits: u64 = rng.gen();
    format!("{prefix}-{bits:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_join_document_round_trips() {
        let msg = ClientMessage::JoinDocument {
            document_id: DocumentId::new("doc1"),
            user_name: Some("ada".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"join-document","document_id":"doc1","user_name":"ada"}"#
        );
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn client_message_operation_round_trips() {
        let op = Operation::Insert {
            id: "id1".into(),
            user_id: "u1".into(),
            timestamp: 42,
            position: 3,
            text: "hi".into(),
        };
        let msg = ClientMessage::Operation { operation: op.clone() };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn server_message_tags_are_kebab_case() {
        let msg = ServerMessage::UserLeft {
            user_id: ConnectionId::generate(),
            users: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""kind":"user-left""#));
    }
}
