//! Builds and retries `FETCH`/`UID FETCH` requests (§4.7, §4.15).
//!
//! Retries are scoped to `ETHROTTLE` tagged failures only: anything else
//! propagates straight to the caller. The backoff schedule lives in
//! [`super::retry_backoff`].

use imap_types::core::Node;
use imap_types::error::{Error, Result};
use imap_types::response::Response;
use imap_types::state::ConnectionState;

use crate::range::ResolvedRange;
use crate::scheduler::{PendingRequest, RequestOptions};
use crate::session::Connection;

use super::{require_state, MAX_FETCH_RETRIES};

/// Which data items to request, translated to wire attributes by
/// [`FetchItems::to_nodes`] (§4.7).
#[derive(Debug, Clone, Default)]
pub struct FetchItems {
    pub uid: bool,
    pub flags: bool,
    pub envelope: bool,
    pub bodystructure: bool,
    pub internal_date: bool,
    pub rfc822_size: bool,
    pub modseq: bool,
    /// Raw `BODY[...]`/`BODY.PEEK[...]` section specs, e.g. `"HEADER"`,
    /// `"TEXT"`, `""` (whole message), already including any
    /// `<start.length>` partial-range suffix the caller wants.
    pub sections: Vec<String>,
    pub peek: bool,
}

impl FetchItems {
    pub fn to_nodes(&self) -> Vec<Node> {
        let mut out = Vec::new();
        if self.uid {
            out.push(Node::atom("UID"));
        }
        if self.flags {
            out.push(Node::atom("FLAGS"));
        }
        if self.envelope {
            out.push(Node::atom("ENVELOPE"));
        }
        if self.bodystructure {
            out.push(Node::atom("BODYSTRUCTURE"));
        }
        if self.internal_date {
            out.push(Node::atom("INTERNALDATE"));
        }
        if self.rfc822_size {
            out.push(Node::atom("RFC822.SIZE"));
        }
        if self.modseq {
            out.push(Node::atom("MODSEQ"));
        }
        let prefix = if self.peek { "BODY.PEEK" } else { "BODY" };
        for section in &self.sections {
            out.push(Node::atom(format!("{prefix}[{section}]")));
        }
        out
    }
}

/// `CHANGEDSINCE <modseq>` narrowing, appended after the item list when set
/// (§4.11 CONDSTORE).
fn build_request(range: &ResolvedRange, items: &FetchItems, changed_since: Option<u64>) -> (String, Vec<Node>) {
    let command = if range.uid { "UID FETCH" } else { "FETCH" };
    let mut attrs = vec![Node::atom(range.range.clone()), Node::List(items.to_nodes())];
    if let Some(modseq) = changed_since {
        attrs.push(Node::List(vec![
            Node::atom("CHANGEDSINCE"),
            Node::Number(modseq),
        ]));
    }
    (command.to_string(), attrs)
}

/// Enqueues one `FETCH`/`UID FETCH`. Returns the completion receiver; the
/// caller awaits it and, on `Error::Throttled`, re-enqueues via
/// [`retry_after_throttle`] up to [`MAX_FETCH_RETRIES`] times.
pub fn fetch(
    conn: &mut Connection,
    range: &ResolvedRange,
    items: &FetchItems,
    changed_since: Option<u64>,
) -> Result<tokio::sync::oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    let (command, attrs) = build_request(range, items, changed_since);
    let tag = conn.next_tag();
    let (request, rx) = PendingRequest::new(tag, command, attrs, RequestOptions::default());
    conn.enqueue(request);
    Ok(rx)
}

/// Decides whether a failed fetch attempt should be retried, per §4.15's
/// `ETHROTTLE` policy. Returns `Some(backoff)` when attempt `attempt`
/// (0-indexed) should be retried after sleeping `backoff`.
pub fn retry_decision(error: &Error, attempt: u32) -> Option<std::time::Duration> {
    let is_throttle = matches!(error.server_response_code(), Some(code) if code.eq_ignore_ascii_case("ETHROTTLE"))
        || error.throttle_reset().is_some();
    if !is_throttle || attempt >= MAX_FETCH_RETRIES {
        return None;
    }
    Some(super::retry_backoff(attempt, error.throttle_reset()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::resolve_from_search;
    use crate::session::ConnectOptions;
    use imap_types::error::CommandStatus;

    fn selected_conn() -> Connection {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Selected;
        conn
    }

    #[test]
    fn fetch_items_translate_to_attribute_atoms() {
        let items = FetchItems {
            uid: true,
            flags: true,
            sections: vec!["HEADER".to_string()],
            peek: true,
            ..Default::default()
        };
        let nodes = items.to_nodes();
        assert_eq!(
            nodes,
            vec![Node::atom("UID"), Node::atom("FLAGS"), Node::atom("BODY.PEEK[HEADER]")]
        );
    }

    #[test]
    fn uid_range_uses_uid_fetch_command() {
        let mut conn = selected_conn();
        let range = resolve_from_search([1, 2, 3].into_iter().collect());
        let rx = fetch(&mut conn, &range, &FetchItems::default(), None).unwrap();
        drop(rx);
        assert!(conn.scheduler.try_send(conn.literal_support).is_some());
    }

    #[test]
    fn throttled_failure_is_retried_with_backoff() {
        let err = Error::CommandFailed {
            status: CommandStatus::No,
            code: Some("ETHROTTLE".to_string()),
            text: "slow down".to_string(),
            executed_command: "FETCH".to_string(),
        };
        assert!(retry_decision(&err, 0).is_some());
        assert!(retry_decision(&err, MAX_FETCH_RETRIES).is_none());
    }

    #[test]
    fn non_throttle_failures_are_not_retried() {
        let err = Error::CommandFailed {
            status: CommandStatus::No,
            code: Some("NONEXISTENT".to_string()),
            text: "no such mailbox".to_string(),
            executed_command: "FETCH".to_string(),
        };
        assert!(retry_decision(&err, 0).is_none());
    }
}
