//! The parsed shape of one server response line (§3 "Response").

use crate::core::{Node, ResponseTag};

/// One fully parsed command unit from the server.
///
/// `command` is the uppercased status/command token (`OK`, `FETCH`, `12`
/// for `* 12 EXISTS`, ...). For numeric untagged responses the dispatcher
/// re-reads the first attribute as the effective command name; see
/// `imap-client::dispatch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub tag: ResponseTag,
    pub command: String,
    pub attributes: Vec<Node>,
}

impl Response {
    pub fn is_untagged(&self) -> bool {
        matches!(self.tag, ResponseTag::Untagged)
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self.tag, ResponseTag::Continuation)
    }

    /// Joins every text-bearing attribute with a single space, matching the
    /// `text` IMAP rejects/errors are reported with.
    pub fn text(&self) -> String {
        self.attributes
            .iter()
            .filter_map(Node::as_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
