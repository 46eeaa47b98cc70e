//! Store path layout.
//!
//! ```text
//! generations/{sessionId}             session record
//! messages/{sessionId}/{writeKey}     message log entry
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::error::{Result, StichError};

pub const GENERATIONS_ROOT: &str = "generations";
pub const MESSAGES_ROOT: &str = "messages";

const SEQ_PER_MILLI: u64 = 1_000_000;

/// Last issued key as `millis * SEQ_PER_MILLI + seq`.
static LAST_MESSAGE_KEY: AtomicU64 = AtomicU64::new(0);

/// Rejects ids that would escape their path segment.
pub fn validate_segment(segment: &str) -> Result<&str> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StichError::store(format!(
            "invalid path segment '{}'",
            segment
        )));
    }
    Ok(segment)
}

pub fn generation_path(session_id: &str) -> String {
    format!("{}/{}", GENERATIONS_ROOT, session_id)
}

pub fn messages_path(session_id: &str) -> String {
    format!("{}/{}", MESSAGES_ROOT, session_id)
}

pub fn message_entry_path(session_id: &str, key: &str) -> String {
    format!("{}/{}/{}", MESSAGES_ROOT, session_id, key)
}

/// Next message-log key: zero-padded unix millis plus a per-millisecond
/// sequence number.
///
/// Keys are strictly increasing within the process, even if the clock steps
/// backwards or one millisecond sees more than a million keys; the millis
/// part then runs ahead of the clock.
pub fn next_message_key() -> String {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0) * SEQ_PER_MILLI;
    let previous = LAST_MESSAGE_KEY
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(advance_key(last, now))
        })
        .unwrap_or_else(|last| last);
    let issued = advance_key(previous, now);
    format!(
        "{:013}-{:06}",
        issued / SEQ_PER_MILLI,
        issued % SEQ_PER_MILLI
    )
}

fn advance_key(last: u64, now: u64) -> u64 {
    now.max(last + 1)
}

/// Whether `path` equals `ancestor` or lies underneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}
