//! FIFO mailbox-selection lock: at most one SELECTED mailbox at a time
//! (C12, §4.12).

use std::collections::VecDeque;

use imap_types::error::{Error, Result};
use tokio::sync::oneshot;

/// What the caller asked to have selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub path: String,
    pub read_only: bool,
    pub description: Option<String>,
}

type Grant = (bool, LockHandle);

/// Returned to the granted waiter; call [`LockHandle::release`] (or drop
/// it) to free the slot for the next queued acquisition.
#[derive(Debug)]
pub struct LockHandle {
    id: u64,
    release_tx: Option<std::sync::mpsc::Sender<u64>>,
}

impl LockHandle {
    pub fn release(mut self) {
        if let Some(tx) = self.release_tx.take() {
            let _ = tx.send(self.id);
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            let _ = tx.send(self.id);
        }
    }
}

struct Waiter {
    request: LockRequest,
    responder: oneshot::Sender<Result<Grant>>,
}

/// Serializes `acquire` calls against the single SELECTED mailbox slot.
///
/// Two independent facts are tracked: whether a slot is currently *held*
/// (gates FIFO serialization — only the front waiter may proceed) and
/// which `(path, read_only)` is currently *selected on the wire* (gates
/// whether a grant needs a fresh SELECT/EXAMINE — per §4.12, reacquiring
/// the mailbox already selected, even across a hand-off between waiters,
/// needs no SELECT).
#[derive(Debug, Default)]
pub struct LockQueue {
    held: bool,
    selected: Option<(String, bool)>,
    waiters: VecDeque<Waiter>,
    next_id: u64,
    release_tx: Option<std::sync::mpsc::Sender<u64>>,
    release_rx: Option<std::sync::mpsc::Receiver<u64>>,
}

impl LockQueue {
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        LockQueue {
            held: false,
            selected: None,
            waiters: VecDeque::new(),
            next_id: 0,
            release_tx: Some(tx),
            release_rx: Some(rx),
        }
    }

    pub fn enqueue(&mut self, request: LockRequest, responder: oneshot::Sender<Result<Grant>>) {
        self.waiters.push_back(Waiter { request, responder });
    }

    /// Drains any release notifications that arrived since the last call,
    /// then grants the front waiter if the slot is free.
    pub fn pump(&mut self) {
        if let Some(rx) = &self.release_rx {
            while rx.try_recv().is_ok() {
                self.held = false;
            }
        }
        if self.held {
            return;
        }
        let Some(waiter) = self.waiters.pop_front() else {
            return;
        };
        let key = (waiter.request.path.clone(), waiter.request.read_only);
        let needs_select = self.selected.as_ref() != Some(&key);
        self.selected = Some(key);
        self.held = true;

        self.next_id += 1;
        let handle = LockHandle {
            id: self.next_id,
            release_tx: self.release_tx.clone(),
        };
        let _ = waiter.responder.send(Ok((needs_select, handle)));
    }

    /// Rejects every queued waiter with `NoConnection` (connection
    /// teardown, §4.12).
    pub fn reject_all(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.responder.send(Err(Error::NoConnection));
        }
        self.held = false;
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(path: &str, read_only: bool) -> LockRequest {
        LockRequest {
            path: path.to_string(),
            read_only,
            description: None,
        }
    }

    #[test]
    fn first_acquisition_of_a_path_requires_select() {
        let mut queue = LockQueue::new();
        let (tx, rx) = oneshot::channel();
        queue.enqueue(req("INBOX", false), tx);
        queue.pump();
        let (needs_select, _handle) = rx.try_recv().unwrap().unwrap();
        assert!(needs_select);
    }

    #[test]
    fn second_waiter_does_not_resolve_until_first_releases() {
        let mut queue = LockQueue::new();
        let (tx1, rx1) = oneshot::channel();
        queue.enqueue(req("INBOX", false), tx1);
        queue.pump();
        let (_needs_select, handle1) = rx1.try_recv().unwrap().unwrap();

        let (tx2, rx2) = oneshot::channel();
        queue.enqueue(req("INBOX", false), tx2);
        queue.pump();
        assert!(rx2.try_recv().is_err(), "second waiter must wait for release");

        handle1.release();
        queue.pump();
        let (needs_select, _handle2) = rx2.try_recv().unwrap().unwrap();
        assert!(!needs_select, "same mailbox/readOnly stays selected across hand-off");
    }

    #[test]
    fn switching_mailboxes_requires_a_new_select() {
        let mut queue = LockQueue::new();
        let (tx1, rx1) = oneshot::channel();
        queue.enqueue(req("INBOX", false), tx1);
        queue.pump();
        let (_needs_select, handle1) = rx1.try_recv().unwrap().unwrap();
        handle1.release();

        let (tx2, rx2) = oneshot::channel();
        queue.enqueue(req("Archive", false), tx2);
        queue.pump();
        let (needs_select, _handle2) = rx2.try_recv().unwrap().unwrap();
        assert!(needs_select);
    }

    #[test]
    fn teardown_rejects_all_queued_waiters() {
        let mut queue = LockQueue::new();
        let (tx, rx) = oneshot::channel();
        queue.enqueue(req("INBOX", false), tx);
        queue.reject_all();
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::NoConnection)));
    }
}
