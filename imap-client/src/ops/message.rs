//! Per-message operations (§4.15): `STORE`, `EXPUNGE`, `COPY`/`MOVE`,
//! `SEARCH`, and `APPEND`. All require a selected mailbox except `APPEND`,
//! which only needs to be authenticated.

use imap_types::core::Node;
use imap_types::error::{Error, Result};
use imap_types::flag::{Flag, FlagColor};
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::sync::oneshot;

use crate::range::ResolvedRange;
use crate::scheduler::{PendingRequest, RequestOptions};
use crate::search::SearchCriteria;
use crate::session::Connection;

use super::require_state;

fn enqueue(
    conn: &mut Connection,
    command: impl Into<String>,
    attributes: Vec<Node>,
) -> oneshot::Receiver<Result<Response>> {
    let tag = conn.next_tag();
    let (request, rx) = PendingRequest::new(tag, command, attributes, RequestOptions::default());
    conn.enqueue(request);
    rx
}

/// How a `STORE` should combine the caller's flags with the existing set
/// (§4.15: set/add/remove).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Remove,
}

impl StoreMode {
    fn item_name(self, silent: bool) -> &'static str {
        match (self, silent) {
            (StoreMode::Set, false) => "FLAGS",
            (StoreMode::Set, true) => "FLAGS.SILENT",
            (StoreMode::Add, false) => "+FLAGS",
            (StoreMode::Add, true) => "+FLAGS.SILENT",
            (StoreMode::Remove, false) => "-FLAGS",
            (StoreMode::Remove, true) => "-FLAGS.SILENT",
        }
    }
}

/// `STORE`/`UID STORE <range> <mode>FLAGS(.SILENT) (<flags>)`.
pub fn store(
    conn: &mut Connection,
    range: &ResolvedRange,
    mode: StoreMode,
    flags: &[Flag],
    silent: bool,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    let command = if range.uid { "UID STORE" } else { "STORE" };
    let flag_nodes = flags.iter().map(|f| Node::atom(f.as_wire())).collect();
    Ok(enqueue(
        conn,
        command,
        vec![
            Node::atom(range.range.clone()),
            Node::atom(mode.item_name(silent)),
            Node::List(flag_nodes),
        ],
    ))
}

/// `EXPUNGE`, or `UID EXPUNGE <range>` when the server supports `UIDPLUS`
/// and the caller narrowed to a range.
pub fn expunge(
    conn: &mut Connection,
    range: Option<&ResolvedRange>,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    match range {
        Some(r) if conn.capabilities.has("UIDPLUS") => {
            Ok(enqueue(conn, "UID EXPUNGE", vec![Node::atom(r.range.clone())]))
        }
        _ => Ok(enqueue(conn, "EXPUNGE", vec![])),
    }
}

/// `COPY`/`UID COPY <range> <mailbox>`.
pub fn copy(
    conn: &mut Connection,
    range: &ResolvedRange,
    destination: &str,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    let command = if range.uid { "UID COPY" } else { "COPY" };
    let dest = Node::quoted(crate::path::encode(destination, conn.utf8_accept_enabled()));
    Ok(enqueue(conn, command, vec![Node::atom(range.range.clone()), dest]))
}

/// `MOVE`/`UID MOVE <range> <mailbox>`; requires the `MOVE` capability
/// (§4.15 precondition table).
pub fn message_move(
    conn: &mut Connection,
    range: &ResolvedRange,
    destination: &str,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    if !conn.capabilities.has("MOVE") {
        return Err(Error::ProtocolViolation("server does not advertise MOVE".to_string()));
    }
    let command = if range.uid { "UID MOVE" } else { "MOVE" };
    let dest = Node::quoted(crate::path::encode(destination, conn.utf8_accept_enabled()));
    Ok(enqueue(conn, command, vec![Node::atom(range.range.clone()), dest]))
}

/// `SEARCH`/`UID SEARCH <criteria>`.
pub fn search(
    conn: &mut Connection,
    criteria: &SearchCriteria,
    by_uid: bool,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    let command = if by_uid { "UID SEARCH" } else { "SEARCH" };
    let attrs = crate::search::encode(criteria, conn.utf8_accept_enabled());
    Ok(enqueue(conn, command, attrs))
}

/// `APPEND <mailbox> (<flags>) [<date>] <message literal>`. Only needs
/// Authenticated (the mailbox need not be selected).
pub fn append(
    conn: &mut Connection,
    mailbox: &str,
    flags: &[Flag],
    message: Vec<u8>,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(
        conn.state,
        &[ConnectionState::Authenticated, ConnectionState::Selected],
    )?;
    let dest = Node::quoted(crate::path::encode(mailbox, conn.utf8_accept_enabled()));
    let flag_nodes = flags.iter().map(|f| Node::atom(f.as_wire())).collect();
    Ok(enqueue(
        conn,
        "APPEND",
        vec![dest, Node::List(flag_nodes), Node::Literal(message)],
    ))
}

/// Paints `range` with `color` by adding `\Flagged` and its
/// `$MailFlagBit*` keywords. The complementary bits are left alone; a
/// message already carrying a different color ends up with both sets of
/// keywords until a client that reads `FlagColor::from_flags` sorts it
/// out from the bits that are actually present (see Open Questions around
/// bit value 7).
pub fn set_flag_color(
    conn: &mut Connection,
    range: &ResolvedRange,
    color: FlagColor,
) -> Result<oneshot::Receiver<Result<Response>>> {
    let mut flags = color.to_keyword_flags();
    flags.push(Flag::Flagged);
    store(conn, range, StoreMode::Add, &flags, true)
}

/// Marks `range` `\Deleted`, optionally following up with an immediate
/// `EXPUNGE`/`UID EXPUNGE` (§4.15).
pub fn message_delete(
    conn: &mut Connection,
    range: &ResolvedRange,
    expunge_immediately: bool,
) -> Result<oneshot::Receiver<Result<Response>>> {
    let rx = store(conn, range, StoreMode::Add, &[Flag::Deleted], true)?;
    if expunge_immediately {
        expunge(conn, Some(range))?;
    }
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::resolve_from_search;
    use crate::session::ConnectOptions;

    fn selected_conn() -> Connection {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Selected;
        conn
    }

    #[test]
    fn store_uses_uid_variant_for_uid_ranges() {
        let mut conn = selected_conn();
        let range = resolve_from_search([1, 2].into_iter().collect());
        let rx = store(&mut conn, &range, StoreMode::Add, &[Flag::Seen], true).unwrap();
        drop(rx);
        assert!(conn.scheduler.try_send(conn.literal_support).is_some());
    }

    #[test]
    fn move_is_rejected_without_the_move_capability() {
        let mut conn = selected_conn();
        let range = resolve_from_search([1].into_iter().collect());
        assert!(message_move(&mut conn, &range, "Archive").is_err());
    }

    #[test]
    fn move_succeeds_once_capability_is_present() {
        let mut conn = selected_conn();
        conn.capabilities.fold("MOVE");
        let range = resolve_from_search([1].into_iter().collect());
        assert!(message_move(&mut conn, &range, "Archive").is_ok());
    }

    #[test]
    fn append_is_allowed_without_a_selected_mailbox() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Authenticated;
        assert!(append(&mut conn, "INBOX", &[], b"Subject: hi\r\n\r\nbody".to_vec()).is_ok());
    }

    #[test]
    fn set_flag_color_adds_flagged_and_bit_keywords() {
        let mut conn = selected_conn();
        let range = resolve_from_search([1].into_iter().collect());
        let rx = set_flag_color(&mut conn, &range, FlagColor::Green).unwrap();
        drop(rx);
        let fragment = conn.scheduler.try_send(conn.literal_support).unwrap();
        let crate::compiler::Fragment::Line(bytes) = fragment else {
            panic!("expected a single line fragment");
        };
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\\Flagged"));
        assert!(text.contains("$MailFlagBit0"));
        assert!(text.contains("$MailFlagBit1"));
    }

    #[test]
    fn message_delete_without_expunge_only_enqueues_store() {
        let mut conn = selected_conn();
        let range = resolve_from_search([1].into_iter().collect());
        let rx = message_delete(&mut conn, &range, false).unwrap();
        drop(rx);
        assert!(conn.scheduler.try_send(conn.literal_support).is_some());
    }

    #[test]
    fn message_delete_with_expunge_enqueues_both_commands() {
        let mut conn = selected_conn();
        let range = resolve_from_search([1].into_iter().collect());
        let rx = message_delete(&mut conn, &range, true).unwrap();
        drop(rx);
        let fragment = conn.scheduler.try_send(conn.literal_support).unwrap();
        let crate::compiler::Fragment::Line(bytes) = fragment else {
            panic!("expected a single line fragment");
        };
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("STORE"));
    }
}
