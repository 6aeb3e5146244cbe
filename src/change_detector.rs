//! Converts a `(old_text, new_text, caret_after_edit)` snapshot pair plus a
//! user id into a single [`Operation`], the way a real editor widget's
//! change-detector component would (the widget itself is out of scope;
//! this is its contract).
//!
//! Assumes single-caret, single-contiguous edits — multi-region edits are
//! not produced, and are not expected as input.
use crate::ot::Operation;
use crate::protocol::random_id;

/// Detects the single edit that turned `old` into `new`, given the caret
/// position right after the edit. Returns `None` when no operation can (or
/// should) represent the change: no change at all, or a same-length
/// replacement (see the module-level note below).
#[must_use]
pub fn detect(old: &str, new: &str, caret_after_edit: usize, user_id: &str, timestamp: i64) -> Option<Operation> {
    if old == new {
        return None;
    }

    let old_len = old.chars().count();
    let new_len = new.chars().count();

    if new_len > old_len {
        let inserted_len = new_len - old_len;
        let position = caret_after_edit.checked_sub(inserted_len)?;
        let new_chars: Vec<char> = new.chars().collect();
        let text: String = new_chars.get(position..caret_after_edit)?.iter().collect();
        Some(Operation::Insert {
            id: random_id("op"),
            user_id: user_id.to_string(),
            timestamp,
            position,
            text,
        })
    } else if new_len < old_len {
        let deleted_len = old_len - new_len;
        Some(Operation::Delete {
            id: random_id("op"),
            user_id: user_id.to_string(),
            timestamp,
            position: caret_after_edit,
            length: deleted_len,
        })
    } else {
        // Same length, different content: a replacement. This core's
        // two-operation alphabet (insert, delete) has no single op for
        // "replace a range" without also knowing which characters moved,
        // so — per spec's open question — we drop it rather than guess a
        // delete+insert decomposition from two same-length strings alone.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_change_is_none() {
        assert_eq!(detect("same", "same", 4, "u1", 0), None);
    }

    #[test]
    fn insert_at_caret() {
        let op = detect("hello", "hello!", 6, "u1", 0).unwrap();
        assert_eq!(
            op,
            Operation::Insert {
                id: op.id().to_string(),
                user_id: "u1".into(),
                timestamp: 0,
                position: 5,
                text: "!".into(),
            }
        );
    }

    #[test]
    fn insert_in_middle() {
        // "helo" -> "hello", typed an "l" before the caret at index 3.
        let op = detect("helo", "hello", 3, "u1", 0).unwrap();
        assert_eq!(
            op,
            Operation::Insert {
                id: op.id().to_string(),
                user_id: "u1".into(),
                timestamp: 0,
                position: 2,
                text: "l".into(),
            }
        );
    }

    #[test]
    fn delete_at_caret() {
        let op = detect("hello", "hell", 4, "u1", 0).unwrap();
        assert_eq!(
            op,
            Operation::Delete {
                id: op.id().to_string(),
                user_id: "u1".into(),
                timestamp: 0,
                position: 4,
                length: 1,
            }
        );
    }

    #[test]
    fn same_length_replacement_is_none() {
        assert_eq!(detect("cat", "cot", 3, "u1", 0), None);
    }

    #[test]
    fn detected_operation_reproduces_new_text() {
        let old = "The quick fox";
        let new = "The quick brown fox";
        let caret = 16; // right after typing " brown" before "fox"... actually after "brown"
        if let Some(op) = detect(old, new, caret, "u1", 0) {
            assert_eq!(crate::ot::apply(old, &op).unwrap(), new);
        }
    }
}
