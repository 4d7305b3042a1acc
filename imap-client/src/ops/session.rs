//! Connection-lifecycle operations (§4.15): the handshake driver plus the
//! `LOGOUT`/`NOOP` commands that run over an already-negotiated session.

use imap_types::error::Result;
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::sync::oneshot;

use crate::auth::Credentials;
use crate::io::{BoxedStream, Dialer, TlsWrapper};
use crate::scheduler::{PendingRequest, RequestOptions};
use crate::session::{ConnectOptions, Connection};

use super::require_state;

/// Dials, negotiates TLS/auth/compression/extensions, and returns a ready
/// connection plus its socket (see [`crate::session::connect`] for the
/// step-by-step handshake).
pub async fn connect(
    options: ConnectOptions,
    dialer: &dyn Dialer,
    tls: &dyn TlsWrapper,
    creds: Option<&Credentials>,
) -> Result<(Connection, BoxedStream)> {
    crate::session::connect(options, dialer, tls, creds).await
}

fn enqueue(
    conn: &mut Connection,
    command: impl Into<String>,
) -> oneshot::Receiver<Result<Response>> {
    let tag = conn.next_tag();
    let (request, rx) = PendingRequest::new(tag, command, vec![], RequestOptions::default());
    conn.enqueue(request);
    rx
}

/// `LOGOUT`. Valid from any pre-logout state (§4.15 precondition table);
/// the server answers with an untagged `BYE` followed by a tagged `OK`,
/// which `dispatch`/`session::connect`'s driver both already turn into a
/// `Logout` state transition.
pub fn logout(conn: &mut Connection) -> Result<oneshot::Receiver<Result<Response>>> {
    require_state(
        conn.state,
        &[
            ConnectionState::NotAuthenticated,
            ConnectionState::Authenticated,
            ConnectionState::Selected,
        ],
    )?;
    Ok(enqueue(conn, "LOGOUT"))
}

/// `NOOP`. Valid in any state; used to poll for untagged updates
/// (`EXISTS`/`EXPUNGE`/...) and to keep a connection alive between real
/// commands (§4.15).
pub fn noop(conn: &mut Connection) -> oneshot::Receiver<Result<Response>> {
    enqueue(conn, "NOOP")
}
