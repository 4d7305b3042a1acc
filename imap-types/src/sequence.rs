//! The integer-set model behind sequence numbers and UIDs (C8/C17).

use std::collections::BTreeSet;
use std::fmt;

/// One element of a range: a concrete message/UID number, or the `*`
/// sentinel meaning "the highest currently known value".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeqItem {
    Number(u32),
    Largest,
}

impl fmt::Display for SeqItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqItem::Number(n) => write!(f, "{n}"),
            SeqItem::Largest => write!(f, "*"),
        }
    }
}

/// A resolved, materialized set of sequence numbers or UIDs.
///
/// This is the type `imap-client::range` produces after resolving whatever
/// shape the caller handed in (a single number, an array, a search object,
/// `"*"`, ...) down to something that can be packed into wire syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeqSet {
    numbers: BTreeSet<u32>,
    includes_largest: bool,
}

impl SeqSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_numbers(numbers: impl IntoIterator<Item = u32>) -> Self {
        SeqSet {
            numbers: numbers.into_iter().collect(),
            includes_largest: false,
        }
    }

    pub fn with_largest(mut self) -> Self {
        self.includes_largest = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && !self.includes_largest
    }

    pub fn len(&self) -> usize {
        self.numbers.len() + usize::from(self.includes_largest)
    }

    pub fn contains(&self, n: u32) -> bool {
        self.numbers.contains(&n)
    }

    /// Packs the set into canonical IMAP range syntax: runs of consecutive
    /// integers collapse to `a:b`, singletons stay bare, everything is
    /// joined with `,`. The `*` sentinel is always emitted last.
    pub fn pack(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut parts = Vec::new();
        let mut iter = self.numbers.iter().copied().peekable();
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
        if self.includes_largest {
            parts.push("*".to_string());
        }
        parts.join(",")
    }

    /// Parses canonical (or near-canonical) range syntax like `"1:5,7,9:*"`
    /// back into a concrete integer set. `*` expands to `resolve_largest`.
    pub fn expand(raw: &str, resolve_largest: impl Fn() -> Option<u32>) -> Option<SeqSet> {
        let mut numbers = BTreeSet::new();
        let mut includes_largest = false;

        for piece in raw.split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            if let Some((a, b)) = piece.split_once(':') {
                let start = parse_seq_item(a, &resolve_largest)?;
                let end = parse_seq_item(b, &resolve_largest)?;
                match (start, end) {
                    (SeqItem::Largest, SeqItem::Largest) => includes_largest = true,
                    (SeqItem::Number(s), SeqItem::Number(e)) => {
                        let (lo, hi) = if s <= e { (s, e) } else { (e, s) };
                        numbers.extend(lo..=hi);
                    }
                    (SeqItem::Number(s), SeqItem::Largest) => {
                        numbers.insert(s);
                        includes_largest = true;
                    }
                    (SeqItem::Largest, SeqItem::Number(e)) => {
                        numbers.insert(e);
                        includes_largest = true;
                    }
                }
            } else {
                match parse_seq_item(piece, &resolve_largest)? {
                    SeqItem::Number(n) => {
                        numbers.insert(n);
                    }
                    SeqItem::Largest => includes_largest = true,
                }
            }
        }

        Some(SeqSet {
            numbers,
            includes_largest,
        })
    }
}

fn parse_seq_item(raw: &str, resolve_largest: &impl Fn() -> Option<u32>) -> Option<SeqItem> {
    if raw == "*" {
        resolve_largest().map(SeqItem::Number).or(Some(SeqItem::Largest))
    } else {
        raw.parse().ok().map(SeqItem::Number)
    }
}
