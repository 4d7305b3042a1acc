//! Public entry point onto the mailbox selection lock (C12, §4.12).
//!
//! Acquiring a lock only ever enqueues into [`crate::lock::LockQueue`] and
//! pumps it once; whether the grant also needs a fresh `SELECT`/`EXAMINE`
//! is left to the caller, who issues it via
//! [`super::mailbox::select_or_examine`] before handing the lock to its own
//! caller.

use imap_types::error::Result;
use tokio::sync::oneshot;

use crate::lock::{LockHandle, LockRequest};
use crate::session::Connection;

/// Enqueues a request for the mailbox selection lock and returns a
/// receiver that resolves once it is this caller's turn. `needs_select`
/// in the resolved pair tells the caller whether the mailbox is already
/// selected on the wire from a prior hand-off.
pub fn acquire(
    conn: &mut Connection,
    path: &str,
    read_only: bool,
) -> oneshot::Receiver<Result<(bool, LockHandle)>> {
    let (tx, rx) = oneshot::channel();
    conn.lock_queue.enqueue(
        LockRequest {
            path: path.to_string(),
            read_only,
            description: None,
        },
        tx,
    );
    conn.lock_queue.pump();
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectOptions;

    #[test]
    fn first_acquire_resolves_immediately_and_needs_select() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        let rx = acquire(&mut conn, "INBOX", false);
        let (needs_select, _handle) = rx.try_recv().unwrap().unwrap();
        assert!(needs_select);
    }

    #[test]
    fn second_acquire_for_a_different_path_waits_for_release() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        let rx1 = acquire(&mut conn, "INBOX", false);
        let (_needs_select, handle1) = rx1.try_recv().unwrap().unwrap();

        let rx2 = acquire(&mut conn, "Archive", false);
        assert!(rx2.try_recv().is_err());

        handle1.release();
        conn.lock_queue.pump();
        let (needs_select, _handle2) = rx2.try_recv().unwrap().unwrap();
        assert!(needs_select);
    }
}
