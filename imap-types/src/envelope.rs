//! The parsed `ENVELOPE` FETCH data item (C6).

/// One address from an envelope address list.
///
/// Mirrors the `(name adl mailbox host)` quadruple of RFC 3501. A `mailbox`
/// of `None` with a group-name in `name` marks the end of an RFC 2822
/// address group; that detail is left to callers that care about group
/// syntax rather than encoded into this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub adl: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
}

impl Address {
    /// Renders `name <mailbox@host>` the way a mail client would display
    /// it, falling back gracefully when fields are absent.
    pub fn display(&self) -> String {
        let addr = match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => format!("{mailbox}@{host}"),
            (Some(mailbox), None) => mailbox.clone(),
            _ => String::new(),
        };
        match &self.name {
            Some(name) if !name.is_empty() => format!("{name} <{addr}>"),
            _ => addr,
        }
    }
}

/// The 10-field `ENVELOPE` structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    /// Trimmed of surrounding angle brackets.
    pub in_reply_to: Option<String>,
    /// Trimmed of surrounding angle brackets.
    pub message_id: Option<String>,
}
