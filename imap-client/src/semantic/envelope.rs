//! Positional parse of the 10-field `ENVELOPE` list (C6, §4.6).

use imap_types::core::Node;
use imap_types::envelope::{Address, Envelope};

/// MIME-word decoding of envelope names is an external collaborator's job
/// (§6 "MIME header parser"); callers that care pass a real decoder, tests
/// and callers that don't pass `identity_decoder`.
pub type WordDecoder<'a> = &'a dyn Fn(&str) -> String;

pub fn identity_decoder(s: &str) -> String {
    s.to_string()
}

/// Parses an `ENVELOPE` list into a typed [`Envelope`].
///
/// Trims surrounding angle brackets from `message-id`/`in-reply-to`, per
/// §4.6. Returns `None` if `node` is not a 10-element list (a malformed
/// server response; the caller logs and drops the unit per §7).
pub fn parse_envelope(node: &Node, decode_words: WordDecoder) -> Option<Envelope> {
    let fields = node.as_list()?;
    if fields.len() != 10 {
        return None;
    }

    Some(Envelope {
        date: text(&fields[0]),
        subject: text(&fields[1]).map(|s| decode_words(&s)),
        from: parse_address_list(&fields[2], decode_words),
        sender: parse_address_list(&fields[3], decode_words),
        reply_to: parse_address_list(&fields[4], decode_words),
        to: parse_address_list(&fields[5], decode_words),
        cc: parse_address_list(&fields[6], decode_words),
        bcc: parse_address_list(&fields[7], decode_words),
        in_reply_to: text(&fields[8]).map(|s| trim_angle_brackets(&s)),
        message_id: text(&fields[9]).map(|s| trim_angle_brackets(&s)),
    })
}

fn parse_address_list(node: &Node, decode_words: WordDecoder) -> Vec<Address> {
    let Some(items) = node.as_list() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| parse_address(item, decode_words))
        .collect()
}

fn parse_address(node: &Node, decode_words: WordDecoder) -> Option<Address> {
    let fields = node.as_list()?;
    if fields.len() != 4 {
        return None;
    }
    Some(Address {
        name: text(&fields[0]).map(|s| decode_words(&s)),
        adl: text(&fields[1]),
        mailbox: text(&fields[2]),
        host: text(&fields[3]),
    })
}

fn text(node: &Node) -> Option<String> {
    if node.is_nil() {
        None
    } else {
        node.as_text().map(str::to_string)
    }
}

fn trim_angle_brackets(s: &str) -> String {
    s.trim().trim_start_matches('<').trim_end_matches('>').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(mailbox: &str, host: &str) -> Node {
        Node::List(vec![
            Node::Nil,
            Node::Nil,
            Node::quoted(mailbox),
            Node::quoted(host),
        ])
    }

    #[test]
    fn parses_a_minimal_envelope() {
        let node = Node::List(vec![
            Node::quoted("Mon, 1 Jan 2024 00:00:00 +0000"),
            Node::quoted("hello"),
            Node::List(vec![addr("alice", "example.com")]),
            Node::List(vec![addr("alice", "example.com")]),
            Node::Nil,
            Node::List(vec![addr("bob", "example.com")]),
            Node::Nil,
            Node::Nil,
            Node::Nil,
            Node::quoted("<id@example.com>"),
        ]);

        let envelope = parse_envelope(&node, &identity_decoder).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("hello"));
        assert_eq!(envelope.from[0].mailbox.as_deref(), Some("alice"));
        assert_eq!(envelope.to[0].host.as_deref(), Some("example.com"));
        assert_eq!(envelope.message_id.as_deref(), Some("id@example.com"));
    }

    #[test]
    fn non_list_node_yields_none() {
        assert!(parse_envelope(&Node::Nil, &identity_decoder).is_none());
    }
}
