//! Recursive descent over `BODYSTRUCTURE` lists (C6, §4.6).

use imap_types::body::BodyPart;
use imap_types::core::Node;

use super::envelope::{parse_envelope, WordDecoder};

/// Parses a `BODYSTRUCTURE` node into a [`BodyPart`] tree, assigning
/// dotted part numbers depth-first starting at 1 (the root carries none).
pub fn parse_bodystructure(node: &Node, decode_words: WordDecoder) -> Option<BodyPart> {
    parse_node(node, None, decode_words)
}

fn parse_node(node: &Node, path: Option<String>, decode_words: WordDecoder) -> Option<BodyPart> {
    let fields = node.as_list()?;
    if is_multipart(fields) {
        parse_multipart(fields, path, decode_words)
    } else {
        parse_single(fields, path, decode_words)
    }
}

/// A multipart body's first element is itself a list (a child part); a
/// single-part body's first element is the type atom/string.
fn is_multipart(fields: &[Node]) -> bool {
    matches!(fields.first(), Some(Node::List(_)))
}

fn parse_multipart(fields: &[Node], path: Option<String>, decode_words: WordDecoder) -> Option<BodyPart> {
    let mut children = Vec::new();
    let mut i = 0;
    while let Some(Node::List(_)) = fields.get(i) {
        let child_path = match &path {
            Some(p) => format!("{p}.{}", children.len() + 1),
            None => (children.len() + 1).to_string(),
        };
        children.push(parse_node(&fields[i], Some(child_path), decode_words)?);
        i += 1;
    }
    let subtype = text(fields.get(i)?).unwrap_or_default();
    i += 1;

    let mut part = BodyPart {
        part: path,
        kind: "multipart".to_string(),
        subtype,
        child_nodes: children,
        ..Default::default()
    };
    parse_multipart_extensions(fields, i, &mut part);
    Some(part)
}

fn parse_multipart_extensions(fields: &[Node], mut i: usize, part: &mut BodyPart) {
    if let Some(node) = fields.get(i) {
        part.parameters = parse_param_list(node);
        i += 1;
    }
    if let Some(node) = fields.get(i) {
        let (disposition, params) = parse_disposition(node);
        part.disposition = disposition;
        part.disposition_parameters = params;
        i += 1;
    }
    if let Some(node) = fields.get(i) {
        part.language = parse_language(node);
        i += 1;
    }
    if let Some(node) = fields.get(i) {
        part.location = text(node);
    }
}

fn parse_single(fields: &[Node], path: Option<String>, decode_words: WordDecoder) -> Option<BodyPart> {
    if fields.len() < 7 {
        return None;
    }
    let kind = text(&fields[0])?;
    let subtype = text(&fields[1])?;
    let parameters = parse_param_list(&fields[2]);
    let id = text(&fields[3]);
    let description = text(&fields[4]);
    let encoding = text(&fields[5]);
    let size = fields[6].as_number();

    let mut idx = 7;
    let mut line_count = None;
    let mut envelope = None;

    if kind.eq_ignore_ascii_case("message") && subtype.eq_ignore_ascii_case("rfc822") {
        envelope = fields.get(idx).and_then(|n| parse_envelope(n, decode_words));
        idx += 1;
        // `message/rfc822` recurses reusing the current part path (§4.6),
        // not descending a level.
        let _inner = fields.get(idx).and_then(|n| parse_node(n, path.clone(), decode_words));
        idx += 1;
        line_count = fields.get(idx).and_then(Node::as_number);
        idx += 1;
    } else if kind.eq_ignore_ascii_case("text") {
        // Tolerate servers omitting the line-count field (§4.6): only
        // consume it if the next element looks like a bare number.
        if matches!(fields.get(idx), Some(Node::Number(_)) | Some(Node::BigNumber(_))) {
            line_count = fields.get(idx).and_then(Node::as_number);
            idx += 1;
        }
    }

    let mut part = BodyPart {
        part: path,
        kind,
        subtype,
        parameters,
        id,
        description,
        encoding,
        size,
        envelope,
        line_count,
        ..Default::default()
    };

    if let Some(node) = fields.get(idx) {
        part.md5 = text(node);
        idx += 1;
    }
    if let Some(node) = fields.get(idx) {
        let (disposition, params) = parse_disposition(node);
        part.disposition = disposition;
        part.disposition_parameters = params;
        idx += 1;
    }
    if let Some(node) = fields.get(idx) {
        part.language = parse_language(node);
        idx += 1;
    }
    if let Some(node) = fields.get(idx) {
        part.location = text(node);
    }

    Some(part)
}

/// Parses a parenthesized `(name value name value ...)` list, folding RFC
/// 2231 continuations (`name*0`, `name*0*`, `name*1`, ...) and
/// percent-encoded charset prefixes into one decoded string per key.
fn parse_param_list(node: &Node) -> std::collections::HashMap<String, String> {
    let mut raw: Vec<(String, String)> = Vec::new();
    if let Some(items) = node.as_list() {
        let mut it = items.iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            if let (Some(k), Some(v)) = (text(k), text(v)) {
                raw.push((k, v));
            }
        }
    }
    fold_rfc2231(raw)
}

fn fold_rfc2231(raw: Vec<(String, String)>) -> std::collections::HashMap<String, String> {
    let mut continuations: std::collections::BTreeMap<(String, u32), (String, bool)> =
        std::collections::BTreeMap::new();
    let mut plain = std::collections::HashMap::new();

    for (key, value) in raw {
        if let Some((base, rest)) = key.split_once("*") {
            let (index_str, extended) = match rest.strip_suffix('*') {
                Some(idx) => (idx, true),
                None => (rest, false),
            };
            if let Ok(index) = index_str.parse::<u32>() {
                continuations.insert((base.to_string(), index), (value, extended));
                continue;
            }
        }
        plain.insert(key.to_ascii_lowercase(), value);
    }

    let mut grouped: std::collections::HashMap<String, Vec<(u32, String, bool)>> =
        std::collections::HashMap::new();
    for ((base, index), (value, extended)) in continuations {
        grouped
            .entry(base.to_ascii_lowercase())
            .or_default()
            .push((index, value, extended));
    }

    for (base, mut parts) in grouped {
        parts.sort_by_key(|(index, ..)| *index);
        let mut joined = String::new();
        for (i, (_, value, extended)) in parts.iter().enumerate() {
            let decoded = if *extended {
                percent_decode_with_charset_prefix(value, i == 0)
            } else {
                value.clone()
            };
            joined.push_str(&decoded);
        }
        plain.insert(base, joined);
    }

    plain
}

/// RFC 2231 extended values look like `UTF-8''hello%20world` on the first
/// segment and plain percent-encoding on continuations.
fn percent_decode_with_charset_prefix(value: &str, strip_charset: bool) -> String {
    let body = if strip_charset {
        value.splitn(3, '\'').last().unwrap_or(value)
    } else {
        value
    };
    percent_decode(body)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_disposition(node: &Node) -> (Option<String>, std::collections::HashMap<String, String>) {
    if node.is_nil() {
        return (None, std::collections::HashMap::new());
    }
    let Some(fields) = node.as_list() else {
        return (None, std::collections::HashMap::new());
    };
    let disposition = fields.first().and_then(text);
    let params = fields.get(1).map(parse_param_list).unwrap_or_default();
    (disposition, params)
}

fn parse_language(node: &Node) -> Vec<String> {
    match node {
        Node::List(items) => items.iter().filter_map(text).collect(),
        _ if node.is_nil() => Vec::new(),
        other => text(other).into_iter().collect(),
    }
}

fn text(node: &Node) -> Option<String> {
    if node.is_nil() {
        None
    } else {
        node.as_text().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::super::envelope::identity_decoder;
    use super::*;

    fn single_part(kind: &str, subtype: &str) -> Node {
        Node::List(vec![
            Node::quoted(kind),
            Node::quoted(subtype),
            Node::Nil,
            Node::Nil,
            Node::Nil,
            Node::quoted("7BIT"),
            Node::Number(1024),
        ])
    }

    #[test]
    fn parses_a_single_text_part() {
        let node = single_part("TEXT", "PLAIN");
        let part = parse_bodystructure(&node, &identity_decoder).unwrap();
        assert_eq!(part.content_type(), "text/plain");
        assert!(!part.is_multipart());
        assert_eq!(part.size, Some(1024));
    }

    #[test]
    fn assigns_depth_first_part_numbers_in_a_multipart() {
        let node = Node::List(vec![
            single_part("TEXT", "PLAIN"),
            single_part("IMAGE", "PNG"),
            Node::quoted("MIXED"),
        ]);
        let root = parse_bodystructure(&node, &identity_decoder).unwrap();
        assert!(root.is_multipart());
        assert_eq!(root.part, None);
        assert_eq!(root.child_nodes[0].part.as_deref(), Some("1"));
        assert_eq!(root.child_nodes[1].part.as_deref(), Some("2"));
    }

    #[test]
    fn folds_rfc2231_parameter_continuations() {
        let node = Node::List(vec![
            Node::quoted("APPLICATION"),
            Node::quoted("OCTET-STREAM"),
            Node::List(vec![
                Node::quoted("name*0"),
                Node::quoted("report"),
                Node::quoted("name*1"),
                Node::quoted(".pdf"),
            ]),
            Node::Nil,
            Node::Nil,
            Node::quoted("BASE64"),
            Node::Number(2048),
        ]);
        let part = parse_bodystructure(&node, &identity_decoder).unwrap();
        assert_eq!(part.parameters.get("name"), Some(&"report.pdf".to_string()));
    }

    #[test]
    fn tolerates_text_parts_missing_line_count() {
        let node = Node::List(vec![
            Node::quoted("TEXT"),
            Node::quoted("PLAIN"),
            Node::Nil,
            Node::Nil,
            Node::Nil,
            Node::quoted("7BIT"),
            Node::Number(10),
            // no line-count field, goes straight to extension data
            Node::quoted("deadbeef"),
        ]);
        let part = parse_bodystructure(&node, &identity_decoder).unwrap();
        assert_eq!(part.line_count, None);
        assert_eq!(part.md5.as_deref(), Some("deadbeef"));
    }
}
