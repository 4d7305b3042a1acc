//! The client-facing error taxonomy (C16, §4.16, §7).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The status an IMAP server attached to a failed tagged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    No,
    Bad,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::No => write!(f, "NO"),
            CommandStatus::Bad => write!(f, "BAD"),
        }
    }
}

/// Every way a client operation can fail.
///
/// Connection-level errors (`NoConnection` and everything up to
/// `ProtocolViolation`) are terminal: the session that raised one has
/// already moved to `Logout`. Command-level errors (`CommandFailed`,
/// `Throttled`, `InvalidResponse`) leave the session usable for the next
/// queued request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no connection")]
    NoConnection,

    #[error("timed out connecting to server")]
    ConnectTimeout,

    #[error("timed out waiting for server greeting")]
    GreetingTimeout,

    #[error("timed out waiting for STARTTLS/TLS upgrade")]
    UpgradeTimeout,

    #[error("socket idle for too long")]
    SocketTimeout,

    #[error("authentication failed: {reason}")]
    AuthenticationFailure { reason: String },

    #[error("command `{executed_command}` failed with {status}{}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    CommandFailed {
        status: CommandStatus,
        code: Option<String>,
        text: String,
        executed_command: String,
    },

    #[error("server is throttling requests, retry after {reset_ms}ms")]
    Throttled { reset_ms: u64 },

    #[error("invalid/unexpected response: {0}")]
    InvalidResponse(String),

    #[error("failed to parse server response: {0}")]
    ParseError(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("proxy dial failed: {0}")]
    ProxyError(String),

    #[error("TLS failure: {0}")]
    TlsFailure(String),

    #[error("mailbox does not exist: {path}")]
    MailboxMissing { path: String },
}

impl Error {
    /// The bracketed response code from a `CommandFailed`, if any
    /// (`ALREADYEXISTS`, `AUTHENTICATIONFAILED`, `NONEXISTENT`, ...).
    pub fn server_response_code(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Error::CommandFailed { .. } | Error::Throttled { .. } | Error::InvalidResponse(_)
        )
    }

    pub fn throttle_reset(&self) -> Option<Duration> {
        match self {
            Error::Throttled { reset_ms } => Some(Duration::from_millis(*reset_ms)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
