//! Maps `NO`/`BAD` tagged responses into typed errors and extracts
//! throttling hints (C16, §4.16).

use imap_types::error::{CommandStatus, Error, Result};
use imap_types::response::Response;

use std::time::Duration;

/// Throttling delay is capped at 5 minutes (§7).
const THROTTLE_CAP: Duration = Duration::from_secs(5 * 60);

/// Builds a `CommandFailed` (or reclassifies it) from a rejected tagged
/// response.
///
/// `ALREADYEXISTS` on a `CREATE` is special-cased by callers in
/// `crate::ops` (they receive this error and turn it into
/// `created = false` rather than surfacing a failure); this function only
/// performs the generic classification.
pub fn command_failed(
    response: &Response,
    status: CommandStatus,
    executed_command: &str,
) -> Result<Response> {
    let text = response.text();
    let code = extract_response_code(&response.attributes, &text);

    if let Some(reset) = throttle_hint(&text) {
        if reset > THROTTLE_CAP {
            log::warn!("server throttle hint {reset:?} exceeds the 5 minute cap, clamping");
        }
        return Err(Error::Throttled {
            reset_ms: reset.min(THROTTLE_CAP).as_millis() as u64,
        });
    }

    Err(Error::CommandFailed {
        status,
        code,
        text,
        executed_command: executed_command.to_string(),
    })
}

/// Extracts the bracketed response code that starts a NO/BAD text, e.g.
/// `[ALREADYEXISTS] Mailbox already exists` → `Some("ALREADYEXISTS")`.
fn extract_response_code(_attrs: &[imap_types::core::Node], text: &str) -> Option<String> {
    let text = text.trim_start();
    if !text.starts_with('[') {
        return None;
    }
    let end = text.find(']')?;
    Some(text[1..end].split_whitespace().next()?.to_string())
}

/// Parses "Request is throttled. Suggested Backoff Time: 2000 milliseconds"
/// (and close variants) into a delay.
fn throttle_hint(text: &str) -> Option<Duration> {
    let lower = text.to_ascii_lowercase();
    if !lower.contains("throttl") {
        return None;
    }
    let digits: String = lower
        .split(|c: char| !c.is_ascii_digit())
        .find(|tok| !tok.is_empty())
        .map(str::to_string)?;
    let ms: u64 = digits.parse().ok()?;
    Some(Duration::from_millis(ms))
}

/// Reclassifies a `CREATE` failure whose code is `ALREADYEXISTS` as a
/// non-error, per §4.16.
pub fn create_already_exists(err: &Error) -> bool {
    matches!(
        err,
        Error::CommandFailed { code: Some(code), .. } if code == "ALREADYEXISTS"
    )
}
