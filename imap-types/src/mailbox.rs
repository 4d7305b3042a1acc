//! Per-mailbox state tracked while a mailbox is selected (§3 "Mailbox").

use std::collections::HashSet;

use crate::flag::Flag;

/// State of the currently selected mailbox.
///
/// `Connection` replaces this wholesale on every successful `SELECT`; it is
/// never mutated in place across a mailbox switch; see
/// `imap-client::session`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mailbox {
    pub path: String,
    pub delimiter: Option<char>,
    pub flags: HashSet<Flag>,
    pub permanent_flags: HashSet<Flag>,
    pub permanent_flags_allow_new: bool,
    pub special_use: Option<String>,
    pub mailbox_id: Option<String>,
    pub uid_validity: u64,
    pub uid_next: u32,
    pub exists: u32,
    pub highest_modseq: Option<u64>,
    pub no_modseq: bool,
    pub read_only: bool,
    pub listed: bool,
    pub subscribed: bool,
}

impl Mailbox {
    pub fn new(path: impl Into<String>) -> Self {
        Mailbox {
            path: path.into(),
            delimiter: None,
            flags: HashSet::new(),
            permanent_flags: HashSet::new(),
            permanent_flags_allow_new: false,
            special_use: None,
            mailbox_id: None,
            uid_validity: 0,
            uid_next: 1,
            exists: 0,
            highest_modseq: None,
            no_modseq: false,
            read_only: false,
            listed: false,
            subscribed: false,
        }
    }

    /// Bumps `uid_next` so it stays monotonic for the current UIDVALIDITY
    /// epoch, as required by §3's invariant and exercised by the FETCH row
    /// assembler (C7).
    pub fn observe_uid(&mut self, uid: u32) {
        if uid >= self.uid_next {
            self.uid_next = uid + 1;
        }
    }

    /// Bumps `highest_modseq` if `modseq` is newer, and is a no-op while
    /// CONDSTORE tracking is disabled (`no_modseq`).
    pub fn observe_modseq(&mut self, modseq: u64) {
        if self.no_modseq {
            return;
        }
        let is_newer = match self.highest_modseq {
            Some(current) => modseq > current,
            None => true,
        };
        if is_newer {
            self.highest_modseq = Some(modseq);
        }
    }

    pub fn on_expunge(&mut self) {
        self.exists = self.exists.saturating_sub(1);
    }
}
