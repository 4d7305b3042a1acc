//! Mailbox CRUD and selection operations (§4.15): `CREATE`, `DELETE`,
//! `RENAME`, `LIST`, `SUBSCRIBE`/`UNSUBSCRIBE`, `STATUS`, and the
//! `SELECT`/`EXAMINE` pair that feeds the mailbox lock queue.

use imap_types::core::Node;
use imap_types::error::Result;
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::sync::oneshot;

use crate::scheduler::{PendingRequest, RequestOptions};
use crate::session::Connection;

use super::require_state;

const MAILBOX_ONLY_STATES: &[ConnectionState] = &[ConnectionState::Authenticated, ConnectionState::Selected];

fn mailbox_node(conn: &Connection, path: &str) -> Node {
    let encoded = crate::path::encode(path, conn.utf8_accept_enabled());
    Node::quoted(encoded)
}

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

/// `CREATE <mailbox>`.
pub fn create(conn: &mut Connection, path: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    Ok(enqueue(conn, "CREATE", vec![mailbox_node(conn, path)]))
}

/// `DELETE <mailbox>`.
pub fn delete(conn: &mut Connection, path: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    Ok(enqueue(conn, "DELETE", vec![mailbox_node(conn, path)]))
}

/// `RENAME <from> <to>`.
pub fn rename(conn: &mut Connection, from: &str, to: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    Ok(enqueue(conn, "RENAME", vec![mailbox_node(conn, from), mailbox_node(conn, to)]))
}

/// `SUBSCRIBE <mailbox>`.
pub fn subscribe(conn: &mut Connection, path: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    Ok(enqueue(conn, "SUBSCRIBE", vec![mailbox_node(conn, path)]))
}

/// `UNSUBSCRIBE <mailbox>`.
pub fn unsubscribe(conn: &mut Connection, path: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    Ok(enqueue(conn, "UNSUBSCRIBE", vec![mailbox_node(conn, path)]))
}

/// `LIST <reference> <pattern>`, or `LSUB` when `subscribed_only` is set
/// (`list_tree` below calls this with `pattern = "*"` to walk the whole
/// hierarchy in one round trip).
pub fn list(
    conn: &mut Connection,
    reference: &str,
    pattern: &str,
    subscribed_only: bool,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    let command = if subscribed_only { "LSUB" } else { "LIST" };
    Ok(enqueue(
        conn,
        command,
        vec![Node::quoted(reference), Node::quoted(pattern)],
    ))
}

/// Walks the whole mailbox hierarchy under `reference` in one round trip
/// (`LIST reference "*"`, or `LSUB` when `subscribed_only` is set).
pub fn list_tree(
    conn: &mut Connection,
    reference: &str,
    subscribed_only: bool,
) -> Result<oneshot::Receiver<Result<Response>>> {
    list(conn, reference, "*", subscribed_only)
}

/// Which `STATUS` data items to request (§4.15).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusItems {
    pub messages: bool,
    pub recent: bool,
    pub uidnext: bool,
    pub uidvalidity: bool,
    pub unseen: bool,
    pub highestmodseq: bool,
}

impl StatusItems {
    pub fn to_nodes(self) -> Vec<Node> {
        let mut out = Vec::new();
        if self.messages {
            out.push(Node::atom("MESSAGES"));
        }
        if self.recent {
            out.push(Node::atom("RECENT"));
        }
        if self.uidnext {
            out.push(Node::atom("UIDNEXT"));
        }
        if self.uidvalidity {
            out.push(Node::atom("UIDVALIDITY"));
        }
        if self.unseen {
            out.push(Node::atom("UNSEEN"));
        }
        if self.highestmodseq {
            out.push(Node::atom("HIGHESTMODSEQ"));
        }
        out
    }
}

/// `STATUS <mailbox> (<items>)`.
pub fn status(
    conn: &mut Connection,
    path: &str,
    items: StatusItems,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    Ok(enqueue(
        conn,
        "STATUS",
        vec![mailbox_node(conn, path), Node::List(items.to_nodes())],
    ))
}

/// `SELECT`/`EXAMINE <mailbox>`, with the `CONDSTORE`/`QRESYNC` attributes
/// the connection opted into, when the server advertises them (§4.11).
pub fn select_or_examine(
    conn: &mut Connection,
    path: &str,
    read_only: bool,
) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, MAILBOX_ONLY_STATES)?;
    let command = if read_only { "EXAMINE" } else { "SELECT" };
    let mut attrs = vec![mailbox_node(conn, path)];
    let enable = conn.enable_attributes();
    if enable.iter().any(|n| n.as_atom() == Some("CONDSTORE")) {
        attrs.push(Node::List(vec![Node::atom("CONDSTORE")]));
    }
    Ok(enqueue(conn, command, attrs))
}

/// `CLOSE`, used to leave the selected mailbox before selecting another.
pub fn close(conn: &mut Connection) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    Ok(enqueue(conn, "CLOSE", vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectOptions;

    fn authenticated_conn() -> Connection {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Authenticated;
        conn
    }

    #[test]
    fn create_is_rejected_before_authentication() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        assert!(create(&mut conn, "Archive").is_err());
    }

    #[test]
    fn select_encodes_the_mailbox_path() {
        let mut conn = authenticated_conn();
        let rx = select_or_examine(&mut conn, "Entwürfe", false).unwrap();
        drop(rx);
        assert!(conn.scheduler.try_send(conn.literal_support).is_some());
    }

    #[test]
    fn status_builds_requested_items_only() {
        let items = StatusItems {
            messages: true,
            unseen: true,
            ..Default::default()
        };
        let nodes = items.to_nodes();
        assert_eq!(nodes, vec![Node::atom("MESSAGES"), Node::atom("UNSEEN")]);
    }

    #[test]
    fn close_requires_a_selected_mailbox() {
        let mut conn = authenticated_conn();
        assert!(close(&mut conn).is_err());
    }

    #[test]
    fn list_tree_uses_the_wildcard_pattern() {
        let mut conn = authenticated_conn();
        let rx = list_tree(&mut conn, "", false).unwrap();
        drop(rx);
        assert!(conn.scheduler.try_send(conn.literal_support).is_some());
    }
}
