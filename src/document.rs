//! The pure, synchronous per-document state: content, version, operation
//! log and user roster, plus the five entry points spec.md §4.3 names
//! (`join`, `leave`, `submit`, `set_cursor`, `snapshot`) and `user_count`.
//!
//! Nothing here is async or touches a channel — that's `session.rs`'s job.
//! Keeping this plain means it can be unit-tested directly, the way the
//! teacher keeps CRDT-adjacent logic (`Document` in its `document.rs`) free
//! of actor plumbing.
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::RelayError;
use crate::ot::{self, Operation};
use crate::protocol::{ConnectionId, DocumentId, User};

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedOperation {
    pub operation: Operation,
    pub server_version: u64,
    pub server_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub content: String,
    pub version: u64,
    pub users: Vec<User>,
}

#[derive(Debug)]
pub struct Document {
    pub id: DocumentId,
    content: String,
    version: u64,
    operations: Vec<LoggedOperation>,
    users: HashMap<ConnectionId, User>,
}

impl Document {
    #[must_use]
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            content: String::new(),
            version: 0,
            operations: Vec::new(),
            users: HashMap::new(),
        }
    }

    /// Creates a `User` (assigning it the colour the caller picked from the
    /// process-wide round-robin palette — see `registry.rs`), inserts it
    /// into the roster, and returns both the new user and a snapshot.
    /// Re-joining an already-present connection id simply replaces its
    /// entry, which is how "destroyed on disconnect or re-join" (spec.md
    /// §3) is realized.
    pub fn join(&mut self, conn_id: ConnectionId, desired_name: Option<String>, color: String) -> (User, Snapshot) {
        let name = desired_name.unwrap_or_else(|| format!("Guest {}", &conn_id.as_str_suffix()));
        let user = User {
            id: conn_id.clone(),
            name,
            color,
            cursor: 0,
        };
        self.users.insert(conn_id, user.clone());
        (user, self.snapshot())
    }

    /// Idempotent: leaving twice, or leaving a connection that never
    /// joined, is not an error.
    pub fn leave(&mut self, conn_id: &ConnectionId) {
        self.users.remove(conn_id);
    }

    /// Validates membership, clamps out-of-range indices into the current
    /// content, applies the operation, and advances the version.
    ///
    /// Returns `Ok(None)` when clamping collapsed the operation into a
    /// no-op (a zero-length delete) — in that case `version` is *not*
    /// advanced, per spec.md §4.3.
    ///
    /// # Errors
    /// Returns [`RelayError::NotJoined`] if `conn_id` is not a current
    /// member of this document.
    pub fn submit(&mut self, conn_id: &ConnectionId, op: Operation) -> Result<Option<(Operation, u64)>, RelayError> {
        if !self.users.contains_key(conn_id) {
            return Err(RelayError::NotJoined);
        }

        let len = self.content.chars().count();
        let Some(clamped) = clamp(op, len) else {
            warn!(document_id = %self.id, "dropped degenerate operation, clamping collapsed it to a no-op");
            return Ok(None);
        };

        let new_content = ot::apply(&self.content, &clamped)
            .expect("operation was clamped to the current content's length");
        self.content = new_content;
        self.version += 1;
        self.operations.push(LoggedOperation {
            operation: clamped.clone(),
            server_version: self.version,
            server_timestamp: now_millis(),
        });

        Ok(Some((clamped, self.version)))
    }

    /// Out-of-range cursor values are accepted without error; cursors are
    /// display-only (spec.md §4.3).
    ///
    /// # Errors
    /// Returns [`RelayError::NotJoined`] if `conn_id` is not a member.
    pub fn set_cursor(&mut self, conn_id: &ConnectionId, position: usize) -> Result<(), RelayError> {
        let user = self.users.get_mut(conn_id).ok_or(RelayError::NotJoined)?;
        user.cursor = position;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            content: self.content.clone(),
            version: self.version,
            users: self.roster(),
        }
    }

    /// Roster order is insertion-order of the underlying map, which is
    /// unspecified and, per spec.md §3, irrelevant.
    #[must_use]
    pub fn roster(&self) -> Vec<User> {
        self.users.values().cloned().collect()
    }

    #[must_use]
    pub fn roster_excluding(&self, conn_id: &ConnectionId) -> Vec<User> {
        self.users.values().filter(|u| &u.id != conn_id).cloned().collect()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn is_member(&self, conn_id: &ConnectionId) -> bool {
        self.users.contains_key(conn_id)
    }
}

/// Clamps an operation's indices into `[0, len]` (inserts) or
/// `[0, len - length]` (deletes); returns `None` if clamping a delete
/// collapses it to zero length.
fn clamp(op: Operation, len: usize) -> Option<Operation> {
    match op {
        Operation::Insert { id, user_id, timestamp, position, text } => Some(Operation::Insert {
            id,
            user_id,
            timestamp,
            position: position.min(len),
            text,
        }),
        Operation::Delete { id, user_id, timestamp, position, length } => {
            let length = length.min(len);
            if length == 0 {
                return None;
            }
            let position = position.min(len - length);
            Some(Operation::Delete { id, user_id, timestamp, position, length })
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    #[test]
    fn join_creates_user_and_snapshot() {
        let mut doc = Document::new(DocumentId::new("d1"));
        let (user, snapshot) = doc.join(conn("c1"), Some("ada".into()), "#fff".into());
        assert_eq!(user.name, "ada");
        assert_eq!(snapshot.content, "");
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.users.len(), 1);
    }

    #[test]
    fn submit_rejects_non_member() {
        let mut doc = Document::new(DocumentId::new("d1"));
        let op = crate::ot::factories::insert(0, "hi");
        let err = doc.submit(&conn("ghost"), op).unwrap_err();
        assert!(matches!(err, RelayError::NotJoined));
    }

    #[test]
    fn submit_applies_and_advances_version() {
        let mut doc = Document::new(DocumentId::new("d1"));
        doc.join(conn("c1"), None, "#fff".into());
        let op = crate::ot::factories::insert(0, "hello");
        let (applied, version) = doc.submit(&conn("c1"), op).unwrap().unwrap();
        assert_eq!(doc.content(), "hello");
        assert_eq!(version, 1);
        assert_eq!(applied.position(), 0);
    }

    #[test]
    fn submit_clamps_out_of_range_insert() {
        let mut doc = Document::new(DocumentId::new("d1"));
        doc.join(conn("c1"), None, "#fff".into());
        doc.submit(&conn("c1"), crate::ot::factories::insert(0, "ab")).unwrap();
        let far_insert = crate::ot::factories::insert(999, "!");
        let (applied, _) = doc.submit(&conn("c1"), far_insert).unwrap().unwrap();
        assert_eq!(applied.position(), 2);
        assert_eq!(doc.content(), "ab!");
    }

    #[test]
    fn submit_degenerate_delete_is_dropped_without_advancing_version() {
        let mut doc = Document::new(DocumentId::new("d1"));
        doc.join(conn("c1"), None, "#fff".into());
        doc.submit(&conn("c1"), crate::ot::factories::insert(0, "ab")).unwrap();
        let version_before = doc.version();
        let far_delete = crate::ot::factories::delete(50, 10);
        let result = doc.submit(&conn("c1"), far_delete).unwrap();
        assert_eq!(result, None);
        assert_eq!(doc.version(), version_before);
        assert_eq!(doc.content(), "ab");
    }

    #[tracing_test::traced_test]
    #[test]
    fn submit_degenerate_delete_logs_a_warning() {
        let mut doc = Document::new(DocumentId::new("d1"));
        doc.join(conn("c1"), None, "#fff".into());
        doc.submit(&conn("c1"), crate::ot::factories::insert(0, "ab")).unwrap();
        doc.submit(&conn("c1"), crate::ot::factories::delete(50, 10)).unwrap();
        assert!(logs_contain("dropped degenerate operation"));
    }

    #[test]
    fn leave_is_idempotent() {
        let mut doc = Document::new(DocumentId::new("d1"));
        doc.join(conn("c1"), None, "#fff".into());
        doc.leave(&conn("c1"));
        doc.leave(&conn("c1"));
        assert_eq!(doc.user_count(), 0);
    }

    #[test]
    fn set_cursor_accepts_out_of_range() {
        let mut doc = Document::new(DocumentId::new("d1"));
        doc.join(conn("c1"), None, "#fff".into());
        doc.set_cursor(&conn("c1"), 99999).unwrap();
        assert_eq!(doc.roster()[0].cursor, 99999);
    }
}
