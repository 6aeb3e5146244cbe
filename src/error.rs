//! Typed error kinds for the relay-facing parts of the system.
//!
//! Internal plumbing (I/O, serialization, actor wiring) still propagates
//! with `anyhow::Result` the way the rest of this crate does; this enum
//! exists so that the four error kinds in the protocol are a concrete,
//! matchable type instead of prose.
use crate::protocol::DocumentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// A connection sent `operation` or `cursor-position` before `join-document`.
    #[error("connection sent a message before joining a document")]
    NotJoined,

    /// An operation's indices were inconsistent with the current content.
    /// The caller clamps where possible; this variant is for cases that
    /// can't be clamped into something meaningful.
    #[error("operation out of range: {detail}")]
    OutOfRange { detail: String },

    /// HTTP surface only: a document id with no known session.
    #[error("no such document: {0}")]
    UnknownDocument(DocumentId),

    #[error("transport error")]
    Transport(#[from] std::io::Error),
}
