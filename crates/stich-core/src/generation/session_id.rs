//! Session id generation.

use chrono::Utc;
use rand::Rng;

const ID_PREFIX: &str = "gen";
const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a fresh session id: `gen_{unix millis}_{9 base-36 chars}`.
///
/// Unique enough for one user starting generations by hand; not a
/// cryptographic guarantee.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}_{}_{}", ID_PREFIX, Utc::now().timestamp_millis(), suffix)
}
