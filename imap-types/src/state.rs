//! Connection state machine states (C11, §4.11).
//!
//! ```text
//!   Dial --success--> Greeting --OK--> NotAuthenticated --auth--> Authenticated
//!                        \--PREAUTH--> Authenticated
//!   Authenticated --SELECT/EXAMINE--> Selected --CLOSE/SELECT--> Authenticated
//!   any --BYE/err--> Logout
//! ```

use std::fmt;

/// Where the connection currently sits in the RFC 3501 state diagram.
///
/// `Selected` carries no mailbox payload itself; the selected mailbox lives
/// in `Connection::mailbox` so that switching mailboxes is a plain
/// replace-not-mutate operation (see `imap-types::mailbox::Mailbox`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

impl ConnectionState {
    pub fn is_authenticated_or_selected(self) -> bool {
        matches!(self, ConnectionState::Authenticated | ConnectionState::Selected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::NotAuthenticated => "not-authenticated",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Selected => "selected",
            ConnectionState::Logout => "logout",
        };
        write!(f, "{s}")
    }
}
