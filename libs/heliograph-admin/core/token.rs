//! Correlation token generation
//!
//! Tokens must be unique for the process lifetime because every outstanding
//! request is keyed by one. The millisecond prefix alone is not enough for
//! commands issued in the same tick, so a 40 character alphanumeric suffix
//! is appended, drawn uniformly from the 62 character alphabet.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric string of the given length
pub fn random_string(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

/// Fresh correlation token: `<millisecond timestamp>_<40 random chars>`
pub fn generate_response_token() -> String {
    format!(
        "{}_{}",
        chrono::Utc::now().timestamp_millis(),
        random_string(40)
    )
}
