//! `GETQUOTA`/`GETQUOTAROOT` (RFC 2087), gated on the `QUOTA` capability
//! (§4.15 `getQuota`).

use imap_types::core::Node;
use imap_types::error::{Error, Result};
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::sync::oneshot;

use crate::scheduler::{PendingRequest, RequestOptions};
use crate::session::Connection;

use super::require_state;

/// One resource line from a `QUOTA` response (`STORAGE 512 1048576` etc).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    pub name: String,
    pub usage: u64,
    pub limit: u64,
}

/// Parses the attribute list of an untagged `* QUOTA <root> (<resources>)`
/// response.
pub fn parse_quota_response(attributes: &[Node]) -> Vec<QuotaResource> {
    let Some(resources) = attributes.get(1).and_then(Node::as_list) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut it = resources.iter();
    while let (Some(name), Some(usage), Some(limit)) = (it.next(), it.next(), it.next()) {
        if let (Some(name), Some(usage), Some(limit)) = (name.as_atom(), usage.as_number(), limit.as_number()) {
            out.push(QuotaResource {
                name: name.to_string(),
                usage,
                limit,
            });
        }
    }
    out
}

/// `GETQUOTA <root>`.
pub fn get_quota(conn: &mut Connection, root: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_quota_capability(conn)?;
    require_state(
        conn.state,
        &[ConnectionState::Authenticated, ConnectionState::Selected],
    )?;
    Ok(enqueue(conn, "GETQUOTA", vec![Node::quoted(root)]))
}

/// `GETQUOTAROOT <mailbox>`, the more commonly supported form: it returns
/// both the owning quota root(s) and their usage in one round trip.
pub fn get_quota_root(conn: &mut Connection, mailbox: &str) -> Result<oneshot::Receiver<Result<Response>>> {
    require_quota_capability(conn)?;
    require_state(
        conn.state,
        &[ConnectionState::Authenticated, ConnectionState::Selected],
    )?;
    let path = crate::path::encode(mailbox, conn.utf8_accept_enabled());
    Ok(enqueue(conn, "GETQUOTAROOT", vec![Node::quoted(path)]))
}

fn require_quota_capability(conn: &Connection) -> Result<()> {
    if conn.capabilities.has("QUOTA") {
        Ok(())
    } else {
        Err(Error::ProtocolViolation("server does not advertise QUOTA".to_string()))
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectOptions;

    #[test]
    fn get_quota_is_rejected_without_the_capability() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Authenticated;
        assert!(get_quota(&mut conn, "").is_err());
    }

    #[test]
    fn get_quota_root_succeeds_once_capability_is_present() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Authenticated;
        conn.capabilities.fold("QUOTA");
        assert!(get_quota_root(&mut conn, "INBOX").is_ok());
    }

    #[test]
    fn parses_resource_triples() {
        let attrs = vec![
            Node::quoted(""),
            Node::List(vec![
                Node::atom("STORAGE"),
                Node::Number(512),
                Node::Number(1_048_576),
            ]),
        ];
        let resources = parse_quota_response(&attrs);
        assert_eq!(
            resources,
            vec![QuotaResource {
                name: "STORAGE".to_string(),
                usage: 512,
                limit: 1_048_576,
            }]
        );
    }
}
