//! The generic wire AST produced by the parser and consumed by the compiler.
//!
//! IMAP's grammar is awkward to model as one big enum-per-command type when
//! the thing doing the modelling also has to survive servers that violate
//! the grammar in small, well-known ways. Instead of a strongly-typed tree
//! per command/response (as RFC 3501's ABNF would suggest), the wire layer
//! works over one generic [`Node`] tree, and the semantic layer (see
//! `imap-client::semantic`) interprets that tree per response kind. This is
//! what lets the parser stay dumb and the compiler stay total.

use std::fmt;

/// One node of a parsed command or response.
///
/// Every value a server can send inside a tagged or untagged line — a bare
/// word, a quoted string, a literal, a number too big for `u64`, a
/// parenthesized list, a bracketed `FETCH` section — is a `Node`.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A bare, unquoted word (`OK`, `\Seen`, `INBOX`, ...).
    Atom(String),
    /// A double-quoted string. `sensitive` is set by the compiler for values
    /// (passwords, SASL blobs) that must never appear verbatim in logs.
    QuotedString { value: String, sensitive: bool },
    /// A `{N}`/`{N+}` literal. Bytes are never interpreted as text here;
    /// that is the semantic layer's job.
    Literal(Vec<u8>),
    /// A decimal number that fits in a `u64`.
    Number(u64),
    /// A decimal number at or beyond 2^53, preserved losslessly as text.
    ///
    /// Floating point round-tripping is not the concern here: the concern is
    /// that `UIDVALIDITY` and friends are defined as unsigned 32-bit values
    /// in RFC 3501 but some servers emit 64-bit `MODSEQ`/`UID` values beyond
    /// what a `f64`-backed number type could represent exactly.
    BigNumber(String),
    /// A parenthesized list of nodes.
    List(Vec<Node>),
    /// A bracketed FETCH section (`BODY[HEADER.FIELDS (To)]`), optionally
    /// followed by a `<start.length>` partial range.
    Section {
        children: Vec<Node>,
        partial: Option<Partial>,
    },
    /// `NIL`.
    Nil,
}

/// A `<start.length>` byte range attached to a literal or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    pub start: u64,
    pub max_length: Option<u64>,
}

impl Node {
    pub fn atom(s: impl Into<String>) -> Self {
        Node::Atom(s.into())
    }

    pub fn quoted(s: impl Into<String>) -> Self {
        Node::QuotedString {
            value: s.into(),
            sensitive: false,
        }
    }

    pub fn sensitive(s: impl Into<String>) -> Self {
        Node::QuotedString {
            value: s.into(),
            sensitive: true,
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Node::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Text content regardless of whether the server chose to quote it,
    /// literal-encode it, or send it as a bare atom. `NIL` and structured
    /// nodes return `None`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Atom(s) => Some(s),
            Node::QuotedString { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Node::Literal(b) => Some(b),
            Node::Atom(s) | Node::QuotedString { value: s, .. } => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            Node::Number(n) => Some(*n),
            Node::BigNumber(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Node::Nil)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Atom(s) => write!(f, "{s}"),
            Node::QuotedString { sensitive: true, .. } => write!(f, "(value hidden)"),
            Node::QuotedString { value, .. } => write!(f, "{value:?}"),
            Node::Literal(b) => write!(f, "{{{}}}", b.len()),
            Node::Number(n) => write!(f, "{n}"),
            Node::BigNumber(s) => write!(f, "{s}"),
            Node::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Node::Section { children, partial } => {
                write!(f, "[")?;
                for (i, item) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")?;
                if let Some(Partial { start, max_length }) = partial {
                    match max_length {
                        Some(len) => write!(f, "<{start}.{len}>")?,
                        None => write!(f, "<{start}>")?,
                    }
                }
                Ok(())
            }
            Node::Nil => write!(f, "NIL"),
        }
    }
}

/// A client-assigned request tag (`A1`, `A2`, ...).
///
/// Tags are rendered as uppercase hex so they are visually distinct from
/// IMAP atoms and never collide with `*` or `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub String);

impl Tag {
    pub fn new(counter: u64) -> Self {
        Tag(format!("A{counter:X}"))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The tag slot of a parsed response: `*` (untagged), `+` (continuation), or
/// a client tag echoed back by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseTag {
    Untagged,
    Continuation,
    Tagged(Tag),
}

impl fmt::Display for ResponseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseTag::Untagged => write!(f, "*"),
            ResponseTag::Continuation => write!(f, "+"),
            ResponseTag::Tagged(tag) => write!(f, "{tag}"),
        }
    }
}
