//! Process-wide map from [`DocumentId`] to its [`SessionHandle`], created
//! lazily on first join — there is no upfront document list (spec.md §3:
//! "documents are created implicitly by the first join").
//!
//! The colour palette is assigned round-robin across *all* documents from
//! one shared counter, not per-document, matching spec.md §4.4 exactly:
//! two users joining two different empty documents still get two different
//! colours.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::protocol::{DocumentId, COLOR_PALETTE};
use crate::session::SessionHandle;

#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<DocumentId, SessionHandle>>,
    next_color: AtomicUsize,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing session for `document_id`, spawning a fresh one
    /// if this is the first time it's been asked for.
    ///
    /// Takes the read lock first so the common case (document already
    /// exists) never contends with other readers; only the first-ever
    /// lookup for a document pays for the write lock.
    pub async fn get_or_create(&self, document_id: &DocumentId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(document_id) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(document_id.clone())
            .or_insert_with(|| SessionHandle::spawn(document_id.clone()))
            .clone()
    }

    /// Hands out the next colour in the shared round-robin palette.
    #[must_use]
    pub fn next_color(&self) -> String {
        let index = self.next_color.fetch_add(1, Ordering::Relaxed) % COLOR_PALETTE.len();
        COLOR_PALETTE[index].to_string()
    }

    #[must_use]
    pub async fn document_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Checks whether `document_id` already has a session, without
    /// creating one as a side effect — used by `health.rs` so that probing
    /// a document's status doesn't conjure it into existence.
    #[must_use]
    pub async fn contains(&self, document_id: &DocumentId) -> bool {
        self.sessions.read().await.contains_key(document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_the_same_session_for_repeated_calls() {
        let registry = Registry::new();
        let id = DocumentId::new("doc1");
        let first = registry.get_or_create(&id).await;
        let second = registry.get_or_create(&id).await;
        assert_eq!(first.document_id, second.document_id);
        assert_eq!(registry.document_count().await, 1);
    }

    #[tokio::test]
    async fn distinct_documents_get_distinct_sessions() {
        let registry = Registry::new();
        registry.get_or_create(&DocumentId::new("a")).await;
        registry.get_or_create(&DocumentId::new("b")).await;
        assert_eq!(registry.document_count().await, 2);
    }

    #[test]
    fn colors_round_robin_across_the_whole_palette() {
        let registry = Registry::new();
        let colors: Vec<String> = (0..COLOR_PALETTE.len() + 2).map(|_| registry.next_color()).collect();
        assert_eq!(colors[0], COLOR_PALETTE[0]);
        assert_eq!(colors[COLOR_PALETTE.len()], COLOR_PALETTE[0]);
        assert_eq!(colors[COLOR_PALETTE.len() + 1], COLOR_PALETTE[1]);
    }
}
