//! Renders a [`Request`] AST back to wire bytes (C3, §4.3).
//!
//! Serialization is driven by [`Fragment`]s rather than one flat `Vec<u8>`
//! because literals change the message flow: a synchronizing literal
//! (`{N}`) must pause for the server's `+` before the next fragment is
//! safe to send, while a non-synchronizing one (`{N+}`, `LITERAL+`) can be
//! written straight through. The scheduler (`crate::scheduler`) drives
//! that pause; this module only decides, once, how a value should be
//! framed.

use std::collections::VecDeque;

use imap_types::core::Node;

use crate::session::LiteralSupport;

/// One piece of a compiled request, in the order it must hit the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Bytes ready to send as-is.
    Line(Vec<u8>),
    /// A literal's payload. `sync` tells the scheduler whether it must
    /// wait for a `+` continuation before sending this fragment.
    Literal { data: Vec<u8>, sync: bool },
}

/// A not-yet-serialized client command.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub tag: String,
    pub command: String,
    pub attributes: Vec<Node>,
}

/// The non-synchronizing literal byte cap imposed by `LITERAL-`: servers
/// advertising only `LITERAL-` (not `LITERAL+`) permit non-synchronizing
/// literals up to this many bytes; anything larger falls back to a
/// synchronizing literal.
pub const LITERAL_MINUS_CAP: usize = 4096;

/// Serializes `request` into an ordered sequence of [`Fragment`]s.
pub fn compile(request: &Request, literal_support: LiteralSupport) -> VecDeque<Fragment> {
    let mut out = VecDeque::new();
    let mut line = Vec::new();
    line.extend_from_slice(request.tag.as_bytes());
    line.push(b' ');
    line.extend_from_slice(request.command.as_bytes());

    render_attributes(&request.attributes, literal_support, &mut line, &mut out);

    line.extend_from_slice(b"\r\n");
    out.push_back(Fragment::Line(line));
    out
}

/// Same as [`compile`] but attributes flagged `sensitive` are rendered as
/// `(value hidden)` instead of their real bytes, for use in logs (the
/// `executedCommand` field of `Error::CommandFailed`, for instance).
pub fn compile_for_logging(request: &Request, literal_support: LiteralSupport) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(request.tag.as_bytes());
    out.push(b' ');
    out.extend_from_slice(request.command.as_bytes());
    for attr in &request.attributes {
        out.push(b' ');
        render_node_for_logging(attr, literal_support, &mut out);
    }
    out
}

fn render_attributes(
    attributes: &[Node],
    literal_support: LiteralSupport,
    line: &mut Vec<u8>,
    out: &mut VecDeque<Fragment>,
) {
    for attr in attributes {
        line.push(b' ');
        render_node(attr, literal_support, line, out);
    }
}

fn render_node(
    node: &Node,
    literal_support: LiteralSupport,
    line: &mut Vec<u8>,
    out: &mut VecDeque<Fragment>,
) {
    match node {
        Node::Atom(s) => line.extend_from_slice(s.as_bytes()),
        Node::Nil => line.extend_from_slice(b"NIL"),
        Node::Number(n) => line.extend_from_slice(n.to_string().as_bytes()),
        Node::BigNumber(s) => line.extend_from_slice(s.as_bytes()),
        Node::QuotedString { value, sensitive } => {
            render_string(value.as_bytes(), *sensitive, literal_support, line, out)
        }
        Node::Literal(bytes) => emit_literal(bytes, false, literal_support, line, out),
        Node::List(items) => {
            line.push(b'(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    line.push(b' ');
                }
                render_node(item, literal_support, line, out);
            }
            line.push(b')');
        }
        Node::Section { children, partial } => {
            line.push(b'[');
            for (i, item) in children.iter().enumerate() {
                if i > 0 {
                    line.push(b' ');
                }
                render_node(item, literal_support, line, out);
            }
            line.push(b']');
            if let Some(p) = partial {
                match p.max_length {
                    Some(len) => line.extend_from_slice(format!("<{}.{}>", p.start, len).as_bytes()),
                    None => line.extend_from_slice(format!("<{}>", p.start).as_bytes()),
                }
            }
        }
    }
}

/// Picks ATOM vs QUOTED vs LITERAL for a string value per §4.3's quoting
/// policy, then emits it.
fn render_string(
    bytes: &[u8],
    sensitive: bool,
    literal_support: LiteralSupport,
    line: &mut Vec<u8>,
    out: &mut VecDeque<Fragment>,
) {
    match classify(bytes) {
        Quoting::Atom => line.extend_from_slice(bytes),
        Quoting::Quoted => {
            line.push(b'"');
            for &b in bytes {
                if b == b'"' || b == b'\\' {
                    line.push(b'\\');
                }
                line.push(b);
            }
            line.push(b'"');
        }
        Quoting::Literal => emit_literal(bytes, sensitive, literal_support, line, out),
    }
}

enum Quoting {
    Atom,
    Quoted,
    Literal,
}

fn classify(bytes: &[u8]) -> Quoting {
    if bytes.is_empty() {
        return Quoting::Quoted;
    }
    if bytes.len() <= 1024
        && bytes
            .iter()
            .all(|&b| is_atom_char(b) && !matches!(b, b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*'))
    {
        return Quoting::Atom;
    }
    let has_unsafe_byte = bytes
        .iter()
        .any(|&b| b == b'\r' || b == b'\n' || b == 0 || b >= 0x80);
    if !has_unsafe_byte && bytes.len() <= 1024 {
        Quoting::Quoted
    } else {
        Quoting::Literal
    }
}

fn is_atom_char(b: u8) -> bool {
    b > 0x20 && b < 0x7F
}

fn emit_literal(
    bytes: &[u8],
    sensitive: bool,
    literal_support: LiteralSupport,
    line: &mut Vec<u8>,
    out: &mut VecDeque<Fragment>,
) {
    let _ = sensitive; // redaction only applies to the logging renderer
    let nonsync = match literal_support {
        LiteralSupport::LiteralPlus => true,
        LiteralSupport::LiteralMinus => bytes.len() <= LITERAL_MINUS_CAP,
        LiteralSupport::None => false,
    };
    if nonsync {
        line.extend_from_slice(format!("{{{}+}}", bytes.len()).as_bytes());
    } else {
        line.extend_from_slice(format!("{{{}}}", bytes.len()).as_bytes());
    }
    // Flush the line so far as its own fragment; the literal payload is a
    // separate fragment because the scheduler may need to wait for `+`
    // before it is safe to write.
    line.extend_from_slice(b"\r\n");
    out.push_back(Fragment::Line(std::mem::take(line)));
    out.push_back(Fragment::Literal {
        data: bytes.to_vec(),
        sync: !nonsync,
    });
}

fn render_node_for_logging(node: &Node, literal_support: LiteralSupport, out: &mut Vec<u8>) {
    match node {
        Node::QuotedString { sensitive: true, .. } => {
            out.extend_from_slice(b"(value hidden)");
        }
        Node::List(items) => {
            out.push(b'(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                render_node_for_logging(item, literal_support, out);
            }
            out.push(b')');
        }
        other => {
            let mut line = Vec::new();
            let mut frags = VecDeque::new();
            render_node(other, literal_support, &mut line, &mut frags);
            out.extend_from_slice(&line);
            for frag in frags {
                match frag {
                    Fragment::Line(data) => out.extend_from_slice(&data),
                    Fragment::Literal { .. } => {}
                }
            }
        }
    }
}
