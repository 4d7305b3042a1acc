//! Public operations (C15, §4.15): thin wrappers that check state
//! preconditions, normalize paths, translate option structs into AST
//! attributes, and enqueue through the scheduler.
//!
//! Each function builds a [`crate::scheduler::PendingRequest`] and returns
//! the receiver half of its completion channel; the caller (the
//! `Connection`'s owning task) is responsible for driving the event loop
//! that actually writes bytes and feeds responses back through
//! [`crate::dispatch::dispatch`]. Keeping that loop outside this module is
//! what lets each operation be described/tested as "build this request"
//! without a live socket.

pub mod download;
pub mod fetch;
pub mod idle;
pub mod lock;
pub mod mailbox;
pub mod message;
pub mod quota;
pub mod session;

use imap_types::error::{Error, Result};
use imap_types::state::ConnectionState;

/// Validates that `conn` is in one of `allowed` states, per the
/// preconditions table in §4.15.
pub(crate) fn require_state(state: ConnectionState, allowed: &[ConnectionState]) -> Result<()> {
    if allowed.contains(&state) {
        Ok(())
    } else {
        Err(Error::ProtocolViolation(format!(
            "operation requires one of {allowed:?}, connection is {state:?}"
        )))
    }
}

/// Exponential backoff schedule for throttled retries (§4.15: FETCH
/// retries up to 4 times, 1s/2s/4s/8s, capped at 30s unless the server's
/// hint is longer).
pub fn retry_backoff(attempt: u32, server_hint: Option<std::time::Duration>) -> std::time::Duration {
    let base = std::time::Duration::from_secs(1 << attempt.min(3));
    let capped = base.min(std::time::Duration::from_secs(30));
    match server_hint {
        Some(hint) if hint > capped => hint,
        _ => capped,
    }
}

pub const MAX_FETCH_RETRIES: u32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(retry_backoff(0, None), std::time::Duration::from_secs(1));
        assert_eq!(retry_backoff(1, None), std::time::Duration::from_secs(2));
        assert_eq!(retry_backoff(2, None), std::time::Duration::from_secs(4));
        assert_eq!(retry_backoff(3, None), std::time::Duration::from_secs(8));
        assert_eq!(retry_backoff(10, None), std::time::Duration::from_secs(8));
    }

    #[test]
    fn server_hint_longer_than_cap_wins() {
        let hint = std::time::Duration::from_secs(45);
        assert_eq!(retry_backoff(3, Some(hint)), hint);
    }

    #[test]
    fn require_state_rejects_unlisted_states() {
        let err = require_state(ConnectionState::NotAuthenticated, &[ConnectionState::Selected]);
        assert!(err.is_err());
    }
}
