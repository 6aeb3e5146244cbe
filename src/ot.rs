//! The operational-transform kernel: the two-variant `Operation` sum type
//! and the pure `apply`/`transform`/`transform_against`/`compose` algebra
//! over it.
//!
//! Nothing in this module does I/O or touches shared state; every function
//! here is synchronous and side-effect free, which is what makes it
//! tractable to property-test and safe to call from both the relay (inside
//! a session actor) and the client driver.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A minimal edit: insert text at a gap position, or delete a contiguous
/// range starting at one. `position` is a gap index in `[0, len]`, counted
/// in `char`s (Unicode scalar values), not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Insert {
        id: String,
        user_id: String,
        timestamp: i64,
        position: usize,
        text: String,
    },
    Delete {
        id: String,
        user_id: String,
        timestamp: i64,
        position: usize,
        length: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("position {position} is out of range for content of length {len}")]
    OutOfRange { position: usize, len: usize },
}

impl Operation {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Insert { user_id, .. } | Self::Delete { user_id, .. } => user_id,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Insert { position, .. } | Self::Delete { position, .. } => *position,
        }
    }

    fn with_position(self, position: usize) -> Self {
        match self {
            Self::Insert {
                id,
                user_id,
                timestamp,
                text,
                ..
            } => Self::Insert {
                id,
                user_id,
                timestamp,
                position,
                text,
            },
            Self::Delete {
                id,
                user_id,
                timestamp,
                length,
                ..
            } => Self::Delete {
                id,
                user_id,
                timestamp,
                position,
                length,
            },
        }
    }

    /// Net change in document length (in chars) that applying this
    /// operation produces.
    #[must_use]
    pub fn len_delta(&self) -> i64 {
        match self {
            Self::Insert { text, .. } => text.chars().count() as i64,
            Self::Delete { length, .. } => -(*length as i64),
        }
    }
}

/// Applies `op` to `text`, returning the resulting content.
///
/// # Errors
/// Returns [`ApplyError::OutOfRange`] if the operation's indices don't fit
/// the given content (see spec for `Insert`/`Delete` range invariants).
pub fn apply(text: &str, op: &Operation) -> Result<String, ApplyError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    match op {
        Operation::Insert { position, text: inserted, .. } => {
            if *position > len {
                return Err(ApplyError::OutOfRange { position: *position, len });
            }
            let mut result: Vec<char> = Vec::with_capacity(len + inserted.chars().count());
            result.extend_from_slice(&chars[..*position]);
            result.extend(inserted.chars());
            result.extend_from_slice(&chars[*position..]);
            Ok(result.into_iter().collect())
        }
        Operation::Delete { position, length, .. } => {
            let end = position + length;
            if end > len {
                return Err(ApplyError::OutOfRange { position: *position, len });
            }
            let mut result: Vec<char> = Vec::with_capacity(len - length);
            result.extend_from_slice(&chars[..*position]);
            result.extend_from_slice(&chars[end..]);
            Ok(result.into_iter().collect())
        }
    }
}

/// Rewrites `a` so that applying it after `b` converges with applying `b`
/// after `a`. See the module-level algebra tables for the four transform
/// cases; every combination of `(a, b)` variants is handled explicitly.
#[must_use]
pub fn transform(a: &Operation, b: &Operation) -> Operation {
    match (a, b) {
        (Operation::Insert { .. }, Operation::Insert { .. }) => transform_insert_insert(a, b),
        (Operation::Insert { .. }, Operation::Delete { .. }) => transform_insert_delete(a, b),
        (Operation::Delete { .. }, Operation::Insert { .. }) => transform_delete_insert(a, b),
        (Operation::Delete { .. }, Operation::Delete { .. }) => transform_delete_delete(a, b),
    }
}

fn transform_insert_insert(a: &Operation, b: &Operation) -> Operation {
    let Operation::Insert { position: a_pos, .. } = a else { unreachable!() };
    let Operation::Insert { position: b_pos, text: b_text, user_id: b_user, .. } = b else {
        unreachable!()
    };
    let b_len = b_text.chars().count();

    if *b_pos < *a_pos {
        a.clone().with_position(a_pos + b_len)
    } else if *b_pos == *a_pos {
        if b_user.as_str() < a.user_id() {
            a.clone().with_position(a_pos + b_len)
        } else {
            a.clone()
        }
    } else {
        a.clone()
    }
}

fn transform_insert_delete(a: &Operation, b: &Operation) -> Operation {
    let Operation::Insert { position: a_pos, .. } = a else { unreachable!() };
    let Operation::Delete { position: b_pos, length: b_len, .. } = b else { unreachable!() };
    let b_end = b_pos + b_len;

    if b_end <= *a_pos {
        a.clone().with_position(a_pos - b_len)
    } else if *b_pos < *a_pos && *a_pos < b_end {
        a.clone().with_position(*b_pos)
    } else {
        a.clone()
    }
}

fn transform_delete_insert(a: &Operation, b: &Operation) -> Operation {
    let Operation::Delete { position: a_pos, length: a_len, .. } = a else { unreachable!() };
    let Operation::Insert { position: b_pos, text: b_text, .. } = b else { unreachable!() };
    let b_ins_len = b_text.chars().count();
    let a_end = a_pos + a_len;

    if *b_pos <= *a_pos {
        a.clone().with_position(a_pos + b_ins_len)
    } else if *a_pos < *b_pos && *b_pos < a_end {
        extend_delete_length(a, a_len + b_ins_len)
    } else {
        a.clone()
    }
}

fn transform_delete_delete(a: &Operation, b: &Operation) -> Operation {
    let Operation::Delete { position: a_pos, length: a_len, .. } = a else { unreachable!() };
    let Operation::Delete { position: b_pos, length: b_len, .. } = b else { unreachable!() };
    let a_end = a_pos + a_len;
    let b_end = b_pos + b_len;

    if b_end <= *a_pos {
        a.clone().with_position(a_pos - b_len)
    } else if *b_pos >= a_end {
        a.clone()
    } else {
        let overlap = b_end.min(a_end) - (*b_pos).max(*a_pos);
        let new_len = a_len.saturating_sub(overlap);
        if *b_pos <= *a_pos {
            extend_delete_length(a, new_len).with_position(*b_pos)
        } else {
            extend_delete_length(a, new_len)
        }
    }
}

fn extend_delete_length(a: &Operation, new_length: usize) -> Operation {
    let Operation::Delete { id, user_id, timestamp, position, .. } = a else { unreachable!() };
    Operation::Delete {
        id: id.clone(),
        user_id: user_id.clone(),
        timestamp: *timestamp,
        position: *position,
        length: new_length,
    }
}

/// Folds [`transform`] over `queue` in order: the queue is the prefix of
/// concurrent operations already committed since `op` was created.
#[must_use]
pub fn transform_against(op: Operation, queue: &[Operation]) -> Operation {
    queue.iter().fold(op, |acc, q| transform(&acc, q))
}

/// Merges two adjacent same-user edits into one, when doing so is sound.
/// Only same-user adjacent-insert and same-user same-gap-delete pairs
/// compose; everything else returns `None`. This is purely an efficiency
/// hint — correctness of the relay never depends on `compose` being
/// called.
#[must_use]
pub fn compose(a: &Operation, b: &Operation) -> Option<Operation> {
    match (a, b) {
        (
            Operation::Insert { id, user_id: u1, timestamp, position: p1, text: s },
            Operation::Insert { position: p2, text: t, user_id: u2, .. },
        ) if u1 == u2 && *p2 == p1 + s.chars().count() => Some(Operation::Insert {
            id: id.clone(),
            user_id: u1.clone(),
            timestamp: *timestamp,
            position: *p1,
            text: format!("{s}{t}"),
        }),
        (
            Operation::Delete { id, user_id: u1, timestamp, position: p1, length: k },
            Operation::Delete { position: p2, length: m, user_id: u2, .. },
        ) if u1 == u2 && p2 == p1 => Some(Operation::Delete {
            id: id.clone(),
            user_id: u1.clone(),
            timestamp: *timestamp,
            position: *p1,
            length: k + m,
        }),
        _ => None,
    }
}
