//! Tokenizes one framed [`CommandUnit`](crate::framer::CommandUnit) into a
//! [`Response`] AST (C2, §4.2).
//!
//! Parsing here is deliberately generic: rather than a strongly-typed tree
//! per IMAP command (which RFC 3501's ABNF would suggest, and which
//! `imap-types` would grow a module for every extension to support), every
//! response boils down to a tag, a command/status token, and a flat list
//! of [`Node`] attributes. The semantic layer (`crate::semantic`) is where
//! `FETCH`, `ENVELOPE`, `BODYSTRUCTURE`, etc. get their typed shape.

use std::collections::VecDeque;

use nom::{
    character::complete::{char, digit1},
    combinator::recognize,
    sequence::tuple,
    IResult,
};
use thiserror::Error;

use imap_types::core::{Node, Partial, ResponseTag, Tag};
use imap_types::response::Response;

use crate::framer::CommandUnit;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input while parsing {0}")]
    UnexpectedEof(&'static str),
    #[error("malformed input near byte offset {offset}: {message}")]
    Malformed { offset: usize, message: String },
}

/// Parses one framed command unit into a [`Response`].
///
/// Per §4.2 this is meant to be called from a loop that drops and logs a
/// unit that fails to parse rather than aborting the whole connection;
/// see [`parse_or_log`].
pub fn parse_response(unit: &CommandUnit) -> Result<Response, ParseError> {
    let mut cursor = Cursor {
        input: &unit.payload,
        pos: 0,
        literals: unit.literals.iter().cloned().collect(),
    };

    cursor.skip_spaces();
    let tag = cursor.take_token("tag")?;
    cursor.skip_spaces();

    let response_tag = match tag.as_str() {
        "*" => ResponseTag::Untagged,
        "+" => ResponseTag::Continuation,
        other => ResponseTag::Tagged(Tag(other.to_string())),
    };

    if response_tag == ResponseTag::Continuation {
        let rest = cursor.take_rest_as_text();
        return Ok(Response {
            tag: response_tag,
            command: String::new(),
            attributes: if rest.is_empty() {
                Vec::new()
            } else {
                vec![Node::Atom(rest)]
            },
        });
    }

    let command = cursor.take_token("command")?.to_ascii_uppercase();
    let mut attributes = Vec::new();
    loop {
        cursor.skip_spaces();
        if cursor.at_end() {
            break;
        }
        attributes.push(cursor.parse_node()?);
    }

    Ok(Response {
        tag: response_tag,
        command,
        attributes,
    })
}

/// [`parse_response`], but drops and logs a unit that fails to parse
/// instead of propagating the error, per §4.2's "failing unit is dropped"
/// policy.
pub fn parse_or_log(unit: &CommandUnit) -> Option<Response> {
    match parse_response(unit) {
        Ok(response) => Some(response),
        Err(err) => {
            log::error!("dropping unparseable response unit: {err}");
            None
        }
    }
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
    literals: VecDeque<Vec<u8>>,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn take_rest_as_text(&mut self) -> String {
        let s = String::from_utf8_lossy(&self.input[self.pos..]).into_owned();
        self.pos = self.input.len();
        s.trim().to_string()
    }

    /// A bare space-delimited token, used only for the tag and
    /// command/status words that precede the attribute list.
    fn take_token(&mut self, what: &'static str) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b' ' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseError::UnexpectedEof(what));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::Malformed {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn parse_node(&mut self) -> Result<Node, ParseError> {
        match self.peek() {
            None => Err(ParseError::UnexpectedEof("attribute")),
            Some(b'(') => self.parse_list(),
            Some(b'[') => self.parse_section(),
            Some(b'"') => self.parse_quoted(),
            Some(b'{') => self.parse_literal_marker(),
            Some(b) if b.is_ascii_digit() => self.parse_number(),
            _ => self.parse_atom_like(),
        }
    }

    fn parse_list(&mut self) -> Result<Node, ParseError> {
        self.pos += 1; // '('
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof("list")),
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => items.push(self.parse_node()?),
            }
        }
        Ok(Node::List(items))
    }

    fn parse_section(&mut self) -> Result<Node, ParseError> {
        self.pos += 1; // '['
        let mut children = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof("section")),
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => children.push(self.parse_node()?),
            }
        }
        let partial = self.maybe_parse_partial()?;
        Ok(Node::Section { children, partial })
    }

    fn maybe_parse_partial(&mut self) -> Result<Option<Partial>, ParseError> {
        if self.peek() != Some(b'<') {
            return Ok(None);
        }
        let start_pos = self.pos;
        self.pos += 1;
        let remaining_before = self.input[self.pos..].len();
        let (rest, (start, max_length)) = parse_partial_body(&self.input[self.pos..])
            .map_err(|_| self.err("malformed <start.length> partial"))?;
        self.pos += remaining_before - rest.len();
        if self.peek() != Some(b'>') {
            self.pos = start_pos;
            return Ok(None);
        }
        self.pos += 1;
        Ok(Some(Partial { start, max_length }))
    }

    fn parse_quoted(&mut self) -> Result<Node, ParseError> {
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnexpectedEof("quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b @ (b'\\' | b'"')) => {
                            value.push(b as char);
                            self.pos += 1;
                        }
                        _ => return Err(self.err("dangling backslash escape in quoted string")),
                    }
                }
                Some(_) => {
                    let start = self.pos;
                    while !matches!(self.peek(), None | Some(b'"') | Some(b'\\')) {
                        self.pos += 1;
                    }
                    value.push_str(&String::from_utf8_lossy(&self.input[start..self.pos]));
                }
            }
        }
        Ok(Node::quoted(value))
    }

    /// Consumes a `{N}` or `{N+}` literal marker (plus the CRLF the framer
    /// re-inserted after it, see `crate::framer`) and substitutes the next
    /// queued literal. Malformed markers cannot reach here: the framer
    /// already rejected anything inside `{...}` that wasn't `1*DIGIT ["+"]`.
    fn parse_literal_marker(&mut self) -> Result<Node, ParseError> {
        let rest = &self.input[self.pos..];
        let close = rest
            .iter()
            .position(|&b| b == b'}')
            .ok_or_else(|| self.err("unterminated literal marker"))?;
        self.pos += close + 1;
        if self.input[self.pos..].starts_with(b"\r\n") {
            self.pos += 2;
        }
        self.literals
            .pop_front()
            .map(Node::Literal)
            .ok_or_else(|| self.err("literal marker with no paired literal from the framer"))
    }

    fn parse_number(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        // 2^53, the IEEE-754-double-safe-integer boundary this format preserves
        // losslessly; see `imap_types::core::Node::BigNumber`.
        const BIG_NUMBER_THRESHOLD: u128 = 1u128 << 53;
        match text.parse::<u128>() {
            Ok(n) if n < BIG_NUMBER_THRESHOLD => Ok(Node::Number(n as u64)),
            _ => Ok(Node::BigNumber(text.to_string())),
        }
    }

    fn parse_atom_like(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_atom_stop(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected an attribute"));
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if text.eq_ignore_ascii_case("nil") {
            Ok(Node::Nil)
        } else {
            Ok(Node::Atom(text))
        }
    }
}

fn is_atom_stop(b: u8) -> bool {
    matches!(b, b' ' | b'(' | b')' | b'[' | b']' | b'{' | b'"' | b'<' | b'>')
}

/// `<start["." length]>`, parsed without the surrounding angle brackets.
fn parse_partial_body(input: &[u8]) -> IResult<&[u8], (u64, Option<u64>)> {
    let (rest, start) = recognize(digit1)(input)?;
    let start_n: u64 = std::str::from_utf8(start).unwrap().parse().unwrap();
    match tuple((char::<&[u8], nom::error::Error<&[u8]>>('.'), digit1))(rest) {
        Ok((rest, (_, len))) => {
            let len_n: u64 = std::str::from_utf8(len).unwrap().parse().unwrap();
            Ok((rest, (start_n, Some(len_n))))
        }
        Err(_) => Ok((rest, (start_n, None))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::CommandUnit;

    fn unit(payload: &[u8], literals: &[&[u8]]) -> CommandUnit {
        CommandUnit {
            payload: payload.to_vec(),
            literals: literals.iter().map(|l| l.to_vec()).collect(),
            null_bytes_removed: 0,
        }
    }

    #[test]
    fn parses_a_simple_tagged_ok() {
        let resp = parse_response(&unit(b"A1 OK done", &[])).unwrap();
        assert_eq!(resp.tag, ResponseTag::Tagged(Tag("A1".into())));
        assert_eq!(resp.command, "OK");
        assert_eq!(resp.attributes, vec![Node::Atom("done".into())]);
    }

    #[test]
    fn parses_continuation_as_bare_text() {
        let resp = parse_response(&unit(b"+ send literal", &[])).unwrap();
        assert_eq!(resp.tag, ResponseTag::Continuation);
        assert_eq!(resp.command, "");
        assert_eq!(resp.attributes, vec![Node::Atom("send literal".into())]);
    }

    #[test]
    fn parses_untagged_fetch_with_list_and_literal() {
        let resp = parse_response(&unit(
            b"* 5 FETCH (UID 42 BODY[TEXT] {5}\r\n)",
            &[b"hello"],
        ))
        .unwrap();
        assert_eq!(resp.tag, ResponseTag::Untagged);
        // The command token is the bare sequence number; the dispatcher
        // re-reads the first attribute ("FETCH") as the effective command
        // for numeric untagged responses (see `crate::dispatch`).
        assert_eq!(resp.command, "5");
        assert_eq!(resp.attributes[0], Node::Atom("FETCH".into()));
        let Node::List(items) = &resp.attributes[1] else {
            panic!("expected a list")
        };
        assert!(items.contains(&Node::Literal(b"hello".to_vec())));
    }

    #[test]
    fn parses_quoted_string_with_escapes() {
        let resp = parse_response(&unit(br#"A2 OK "a \"quoted\" value""#, &[])).unwrap();
        assert_eq!(
            resp.attributes,
            vec![Node::quoted(r#"a "quoted" value"#)]
        );
    }

    #[test]
    fn parses_section_with_partial_range() {
        let resp = parse_response(&unit(b"* 1 FETCH (BODY[TEXT]<0.65536> NIL)", &[])).unwrap();
        let Node::List(items) = &resp.attributes[1] else {
            panic!("expected list")
        };
        let Node::Section { children, partial } = &items[0] else {
            panic!("expected section")
        };
        assert_eq!(children, &vec![Node::Atom("TEXT".into())]);
        assert_eq!(
            *partial,
            Some(Partial {
                start: 0,
                max_length: Some(65536)
            })
        );
        assert_eq!(items[1], Node::Nil);
    }

    #[test]
    fn big_numbers_beyond_2_pow_53_are_preserved_as_text() {
        let resp = parse_response(&unit(b"* OK (MODSEQ 9007199254740993)", &[])).unwrap();
        let Node::List(items) = &resp.attributes[0] else {
            panic!("expected list")
        };
        assert_eq!(items[1], Node::BigNumber("9007199254740993".to_string()));
    }

    #[test]
    fn malformed_unit_is_a_local_error() {
        let err = parse_response(&unit(b"A1 OK \"unterminated", &[])).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof(_)));
    }
}
