//! Encodes structured search criteria and packs integer sets into IMAP
//! range strings (C8, §4.8).

use chrono::NaiveDate;
use std::collections::BTreeSet;

use imap_types::core::Node;

/// A structured search request. Only the fields present are emitted;
/// `or`/`not` compose recursively.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub seen: Option<bool>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub since: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub header: Vec<(String, Option<String>)>,
    pub or: Vec<SearchCriteria>,
    pub not: Option<Box<SearchCriteria>>,
}

/// Renders a [`SearchCriteria`] into the attribute list for a `SEARCH`
/// command (§4.8). `utf8_accept` controls whether non-ASCII tokens must be
/// sent as literals (UTF-8 not negotiated) or as plain strings.
pub fn encode(criteria: &SearchCriteria, utf8_accept: bool) -> Vec<Node> {
    let mut out = Vec::new();

    if let Some(seen) = criteria.seen {
        out.push(Node::atom(if seen { "SEEN" } else { "UNSEEN" }));
    }
    if let Some(from) = &criteria.from {
        out.push(Node::atom("FROM"));
        out.push(search_string(from, utf8_accept));
    }
    if let Some(to) = &criteria.to {
        out.push(Node::atom("TO"));
        out.push(search_string(to, utf8_accept));
    }
    if let Some(subject) = &criteria.subject {
        out.push(Node::atom("SUBJECT"));
        out.push(search_string(subject, utf8_accept));
    }
    if let Some(since) = criteria.since {
        out.push(Node::atom("SINCE"));
        out.push(Node::atom(format_date(since)));
    }
    if let Some(before) = criteria.before {
        out.push(Node::atom("BEFORE"));
        out.push(Node::atom(format_date(before)));
    }
    for (key, value) in &criteria.header {
        out.push(Node::atom("HEADER"));
        out.push(Node::atom(key.clone()));
        match value {
            Some(v) => out.push(search_string(v, utf8_accept)),
            None => out.push(Node::quoted("")),
        }
    }
    if !criteria.or.is_empty() {
        out.extend(encode_or(&criteria.or, utf8_accept));
    }
    if let Some(not) = &criteria.not {
        out.push(Node::atom("NOT"));
        let inner = encode(not, utf8_accept);
        if inner.len() == 1 {
            out.push(inner.into_iter().next().unwrap());
        } else {
            out.push(Node::List(inner));
        }
    }

    out
}

/// IMAP `OR` is binary; `or:[a,b,c]` expands to nested pairs:
/// `OR a (OR b c)`.
fn encode_or(terms: &[SearchCriteria], utf8_accept: bool) -> Vec<Node> {
    match terms {
        [] => Vec::new(),
        [only] => encode(only, utf8_accept),
        [first, rest @ ..] => {
            let mut out = vec![Node::atom("OR")];
            out.extend(wrap_if_multi(encode(first, utf8_accept)));
            out.push(Node::List(encode_or(rest, utf8_accept)));
            out
        }
    }
}

fn wrap_if_multi(nodes: Vec<Node>) -> Vec<Node> {
    if nodes.len() > 1 {
        vec![Node::List(nodes)]
    } else {
        nodes
    }
}

fn search_string(value: &str, utf8_accept: bool) -> Node {
    if !utf8_accept && !value.is_ascii() {
        Node::Literal(value.as_bytes().to_vec())
    } else {
        Node::quoted(value)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Compresses a sorted integer set into `"a:b,c"` form, runs of
/// consecutive values collapsed into `a:b`, singletons left bare (§4.8).
/// `includes_largest` appends the `*` sentinel for "and everything after
/// the last known message".
pub fn pack(numbers: &BTreeSet<u32>, includes_largest: bool) -> String {
    let mut parts = Vec::new();
    let mut iter = numbers.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end = iter.next().unwrap();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}:{end}"));
        }
    }

    if includes_largest {
        parts.push("*".to_string());
    }
    if parts.is_empty() {
        return String::new();
    }
    parts.join(",")
}

/// Parses a canonical range string back into the set it represents. `*`
/// resolves via `resolve_largest` (typically the mailbox's `exists`
/// count); an empty mailbox (`exists = 0`) short-circuits to an empty
/// result (§8 boundary behavior).
pub fn expand(range: &str, resolve_largest: impl Fn() -> Option<u32>) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    for token in range.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = token.split_once(':') {
            let lo = resolve_bound(lo, &resolve_largest);
            let hi = resolve_bound(hi, &resolve_largest);
            if let (Some(lo), Some(hi)) = (lo, hi) {
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                out.extend(lo..=hi);
            }
        } else if let Some(n) = resolve_bound(token, &resolve_largest) {
            out.insert(n);
        }
    }
    out
}

fn resolve_bound(token: &str, resolve_largest: &impl Fn() -> Option<u32>) -> Option<u32> {
    if token == "*" {
        resolve_largest()
    } else {
        token.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_unseen_encode_to_bare_atoms() {
        let mut criteria = SearchCriteria::default();
        criteria.seen = Some(true);
        assert_eq!(encode(&criteria, true), vec![Node::atom("SEEN")]);
    }

    #[test]
    fn or_of_three_terms_nests_as_binary_pairs() {
        let mut criteria = SearchCriteria::default();
        criteria.or = vec![
            SearchCriteria {
                seen: Some(true),
                ..Default::default()
            },
            SearchCriteria {
                seen: Some(false),
                ..Default::default()
            },
            SearchCriteria {
                subject: Some("hi".to_string()),
                ..Default::default()
            },
        ];
        let nodes = encode(&criteria, true);
        assert_eq!(nodes[0], Node::atom("OR"));
        assert_eq!(nodes[1], Node::atom("SEEN"));
        assert!(matches!(&nodes[2], Node::List(_)));
    }

    #[test]
    fn non_ascii_tokens_become_literals_without_utf8_accept() {
        let mut criteria = SearchCriteria::default();
        criteria.subject = Some("héllo".to_string());
        let nodes = encode(&criteria, false);
        assert!(matches!(nodes[1], Node::Literal(_)));
    }

    #[test]
    fn packs_runs_and_singletons() {
        let set: BTreeSet<u32> = [1, 2, 3, 5, 7, 8].into_iter().collect();
        assert_eq!(pack(&set, false), "1:3,5,7:8");
    }

    #[test]
    fn pack_then_expand_round_trips() {
        let set: BTreeSet<u32> = [1, 2, 3, 5, 7, 8].into_iter().collect();
        let packed = pack(&set, false);
        let expanded = expand(&packed, || None);
        assert_eq!(expanded, set);
    }

    #[test]
    fn star_resolves_against_supplied_largest() {
        let expanded = expand("5:*", || Some(10));
        assert_eq!(expanded, (5..=10).collect());
    }

    #[test]
    fn star_with_no_messages_short_circuits_to_empty() {
        let expanded = expand("*", || None);
        assert!(expanded.is_empty());
    }
}
