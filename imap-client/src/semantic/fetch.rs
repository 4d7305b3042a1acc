//! Folds an untagged `FETCH` attribute list into a [`FetchMessage`] (C7,
//! §4.7).

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use imap_types::core::Node;
use imap_types::fetch::{derive_id, FetchMessage};
use imap_types::flag::{Flag, FlagColor};
use imap_types::mailbox::Mailbox;

use super::body::parse_bodystructure;
use super::envelope::{parse_envelope, WordDecoder};

/// Assembles one `* <seq> FETCH (...)` response into a [`FetchMessage`],
/// applying the mailbox-tracking side effects of §4.7 (`uidNext`,
/// `highestModseq`) along the way.
///
/// `path` is the mailbox path in effect, used only for `id` derivation
/// when the server provides no `EMAILID`.
pub fn assemble(
    seq: u32,
    data_items: &[Node],
    mailbox: &mut Mailbox,
    decode_words: WordDecoder,
) -> FetchMessage {
    let mut message = FetchMessage {
        seq,
        ..Default::default()
    };

    let mut it = data_items.iter();
    while let (Some(key_node), Some(value)) = (it.next(), it.next()) {
        let Some(raw_key) = key_node.as_atom() else {
            continue;
        };
        let raw_key_upper = raw_key.to_ascii_uppercase();
        let key = core_key(raw_key);

        match key.as_str() {
            "UID" => {
                if let Some(uid) = value.as_number() {
                    message.uid = Some(uid as u32);
                    mailbox.observe_uid(uid as u32);
                }
            }
            "MODSEQ" => {
                if let Some(modseq) = value.as_list().and_then(|l| l.first()).and_then(Node::as_number) {
                    message.modseq = Some(modseq);
                    mailbox.observe_modseq(modseq);
                }
            }
            "FLAGS" => {
                let flags: HashSet<Flag> = value
                    .as_list()
                    .into_iter()
                    .flatten()
                    .filter_map(Node::as_atom)
                    .map(Flag::parse)
                    .collect();
                message.flag_color = FlagColor::from_flags(&flags);
                message.flags = Some(flags);
            }
            "RFC822.SIZE" => message.size = value.as_number(),
            "ENVELOPE" => message.envelope = parse_envelope(value, decode_words),
            _ if raw_key_upper.starts_with("BODY[") || raw_key_upper.starts_with("BINARY[") => {
                if let Some(bytes) = value.as_bytes() {
                    message.body_parts.insert(section_key(&raw_key_upper), bytes.to_vec());
                }
            }
            "BODYSTRUCTURE" | "BODY" => {
                message.body_structure = parse_bodystructure(value, decode_words);
            }
            "INTERNALDATE" => {
                message.internal_date = value.as_text().and_then(parse_internal_date);
            }
            "RFC822.HEADER" => message.headers = value.as_bytes().map(|b| b.to_vec()),
            "RFC822" => message.source = value.as_bytes().map(|b| b.to_vec()),
            "EMAILID" | "X-GM-MSGID" => message.email_id = value.as_text().map(str::to_string),
            "THREADID" | "X-GM-THRID" => message.thread_id = value.as_text().map(str::to_string),
            "X-GM-LABELS" => {
                message.labels = value
                    .as_list()
                    .into_iter()
                    .flatten()
                    .filter_map(Node::as_text)
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }

    message.id = message
        .email_id
        .clone()
        .unwrap_or_else(|| derive_id(&mailbox.path, mailbox.uid_validity, message.uid.unwrap_or(seq)));

    message
}

fn core_key(raw: &str) -> String {
    raw.split('[').next().unwrap_or(raw).to_ascii_uppercase()
}

/// Strips the `<start.length>` partial suffix from a `BODY[...]`/
/// `BINARY[...]` key, keeping the bracketed section itself (§4.7: "the
/// suffix is discarded at this level").
fn section_key(key: &str) -> String {
    match key.find('<') {
        Some(idx) => key[..idx].to_string(),
        None => key.to_string(),
    }
}

fn parse_internal_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%d-%b-%Y %H:%M:%S %z").ok()
}

#[cfg(test)]
mod tests {
    use super::super::envelope::identity_decoder;
    use super::*;

    #[test]
    fn fetch_with_modseq_updates_mailbox_tracking() {
        let mut mailbox = Mailbox::new("INBOX");
        let items = vec![
            Node::atom("UID"),
            Node::Number(42),
            Node::atom("MODSEQ"),
            Node::List(vec![Node::Number(100)]),
            Node::atom("FLAGS"),
            Node::List(vec![Node::atom("\\Seen")]),
        ];
        let message = assemble(5, &items, &mut mailbox, &identity_decoder);

        assert_eq!(message.seq, 5);
        assert_eq!(message.uid, Some(42));
        assert_eq!(message.modseq, Some(100));
        assert!(message.flags.unwrap().contains(&Flag::Seen));
        assert!(mailbox.uid_next >= 43);
        assert_eq!(mailbox.highest_modseq, Some(100));
    }

    #[test]
    fn flags_only_fetch_does_not_touch_uid_tracking() {
        let mut mailbox = Mailbox::new("INBOX");
        let before = mailbox.uid_next;
        let items = vec![Node::atom("FLAGS"), Node::List(vec![Node::atom("\\Seen")])];
        let message = assemble(5, &items, &mut mailbox, &identity_decoder);
        assert!(message.uid.is_none());
        assert_eq!(mailbox.uid_next, before);
    }

    #[test]
    fn body_section_key_drops_partial_range_suffix() {
        let mut mailbox = Mailbox::new("INBOX");
        let items = vec![
            Node::atom("BODY[HEADER]<0.1024>"),
            Node::Literal(b"From: a@b.com\r\n".to_vec()),
        ];
        let message = assemble(1, &items, &mut mailbox, &identity_decoder);
        assert!(message.body_parts.contains_key("BODY[HEADER]"));
    }

    #[test]
    fn derives_id_when_server_provides_no_email_id() {
        let mut mailbox = Mailbox::new("INBOX");
        let items = vec![Node::atom("UID"), Node::Number(42)];
        let message = assemble(1, &items, &mut mailbox, &identity_decoder);
        assert_eq!(message.id, derive_id("INBOX", 0, 42));
    }
}
