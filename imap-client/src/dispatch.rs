//! Routes a parsed [`Response`] to the scheduler, session handlers, or the
//! in-flight command's own overrides (C10, §4.10).

use imap_types::core::ResponseTag;
use imap_types::error::{CommandStatus, Error};
use imap_types::response::Response;

use crate::classify;
use crate::scheduler::{ContinuationAction, Scheduler};
use crate::session::Connection;

/// What the caller of [`dispatch`] should do as a result of routing one
/// response.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing for the I/O loop to do; an untagged handler (if any) already
    /// ran.
    Handled,
    /// Write this raw data to the socket (a continuation handshake either
    /// wrote the next literal fragment or an `on_plus_tag` payload).
    Write(crate::compiler::Fragment),
    WriteRaw(Vec<u8>),
    /// The in-flight command completed; `tag` identifies which one, should
    /// the caller want to log it.
    Completed { tag: String },
}

/// Dispatches one parsed response against `conn`'s scheduler and handler
/// tables. Mirrors §4.10 exactly: untagged rows look up a per-command or
/// session-wide handler; `+` resumes the scheduler; the tagged terminator
/// resolves or rejects the in-flight awaiter.
pub fn dispatch(conn: &mut Connection, response: Response) -> Outcome {
    match &response.tag {
        ResponseTag::Untagged => {
            dispatch_untagged(conn, &response);
            Outcome::Handled
        }
        ResponseTag::Continuation => match conn.scheduler.on_continuation(&response) {
            ContinuationAction::WriteFragment(frag) => Outcome::Write(frag),
            ContinuationAction::WriteRaw(bytes) => Outcome::WriteRaw(bytes),
            ContinuationAction::Ignore => Outcome::Handled,
        },
        ResponseTag::Tagged(tag) => {
            if conn.scheduler.in_flight_tag() != Some(tag.as_ref()) {
                // A tagged response that doesn't match the in-flight
                // request's tag cannot be routed; drop it (§4.2 "a failing
                // unit is dropped").
                return Outcome::Handled;
            }
            let tag_str = tag.as_ref().to_string();
            let is_bye = response.command.eq_ignore_ascii_case("BYE");
            let outcome = classify_tagged(&response, &tag_str);
            if is_bye {
                // §4.10: BYE resolves like OK for the awaiter but always
                // ends the session.
                conn.state = imap_types::state::ConnectionState::Logout;
            } else if let Err(Error::CommandFailed { .. }) = &outcome {
                // command errors do not tear down the session (§7)
            } else if outcome.is_err() {
                conn.state = imap_types::state::ConnectionState::Logout;
            }
            let next = conn.scheduler.complete(outcome, conn.literal_support);
            match next {
                Some(frag) => Outcome::Write(frag),
                None => Outcome::Completed { tag: tag_str },
            }
        }
    }
}

fn dispatch_untagged(conn: &mut Connection, response: &Response) {
    let key = effective_command_key(response);

    if let Some(handler) = conn.scheduler.in_flight_override(&key) {
        handler(response);
        return;
    }
    if let Some(handler) = conn.session_handler(&key).cloned() {
        handler(response);
    }
}

/// For numeric untagged responses (`* 12 EXISTS`, `* 5 FETCH (...)`) the
/// parser captures `"12"`/`"5"` as `command` and the real command name as
/// `attributes[0]`; the dispatcher must look there instead (§4.10).
fn effective_command_key(response: &Response) -> String {
    if response.command.chars().all(|c| c.is_ascii_digit()) {
        if let Some(name) = response.attributes.first().and_then(|n| n.as_atom()) {
            return name.to_ascii_uppercase();
        }
    }
    response.command.to_ascii_uppercase()
}

pub(crate) fn classify_tagged(response: &Response, executed_command: &str) -> imap_types::error::Result<Response> {
    match response.command.to_ascii_uppercase().as_str() {
        "OK" | "BYE" => Ok(response.clone()),
        "NO" => classify::command_failed(response, CommandStatus::No, executed_command),
        "BAD" => classify::command_failed(response, CommandStatus::Bad, executed_command),
        other => Err(Error::InvalidResponse(format!(
            "unexpected tagged status {other:?}"
        ))),
    }
}

/// Used by [`crate::scheduler::Scheduler::try_send`] callers to know
/// whether a completed tagged command also means we should drain the
/// scheduler again (kept here, not in `scheduler`, because it reasons
/// about dispatcher-level concerns like untagged handler tables).
pub fn should_drain(scheduler: &Scheduler) -> bool {
    scheduler.has_in_flight() && !scheduler.is_idle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use imap_types::core::{Node, Tag};
    use imap_types::response::Response;

    fn untagged(command: &str, attrs: Vec<Node>) -> Response {
        Response {
            tag: ResponseTag::Untagged,
            command: command.to_string(),
            attributes: attrs,
        }
    }

    #[test]
    fn numeric_untagged_uses_first_attribute_as_key() {
        let resp = untagged("12", vec![Node::atom("EXISTS")]);
        assert_eq!(effective_command_key(&resp), "EXISTS");
    }

    #[test]
    fn non_numeric_untagged_uses_command_itself() {
        let resp = untagged("CAPABILITY", vec![Node::atom("IMAP4rev1")]);
        assert_eq!(effective_command_key(&resp), "CAPABILITY");
    }

    #[test]
    fn dropped_tagged_response_with_mismatched_tag_does_not_panic() {
        use crate::session::{ConnectOptions, Connection};
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        let resp = Response {
            tag: ResponseTag::Tagged(Tag("A99".to_string())),
            command: "OK".to_string(),
            attributes: vec![],
        };
        let outcome = dispatch(&mut conn, resp);
        assert!(matches!(outcome, Outcome::Handled));
    }
}
