//! The parsed `BODYSTRUCTURE` FETCH data item (C6).

use std::collections::HashMap;

use crate::envelope::Envelope;

/// One node of a recursively-parsed MIME body structure tree.
///
/// `part` is the dotted MIME part number (`"1"`, `"1.2"`, ...) assigned
/// depth-first within each container, starting at 1; the root multipart
/// itself carries no `part`. `message/rfc822` parts recurse into their
/// embedded body reusing the *current* part path rather than descending a
/// level, matching RFC 3501 §7.4.2's numbering rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPart {
    pub part: Option<String>,
    pub kind: String,
    pub subtype: String,
    pub parameters: HashMap<String, String>,
    pub id: Option<String>,
    pub description: Option<String>,
    pub encoding: Option<String>,
    pub size: Option<u64>,
    /// Present for `message/rfc822` parts.
    pub envelope: Option<Envelope>,
    pub disposition: Option<String>,
    pub disposition_parameters: HashMap<String, String>,
    pub child_nodes: Vec<BodyPart>,
    pub line_count: Option<u64>,
    pub md5: Option<String>,
    pub language: Vec<String>,
    pub location: Option<String>,
}

impl BodyPart {
    pub fn is_multipart(&self) -> bool {
        self.kind.eq_ignore_ascii_case("multipart")
    }

    pub fn content_type(&self) -> String {
        format!("{}/{}", self.kind.to_ascii_lowercase(), self.subtype.to_ascii_lowercase())
    }

    /// Depth-first search for the part with the given dotted number.
    pub fn find_part<'a>(&'a self, part: &str) -> Option<&'a BodyPart> {
        if self.part.as_deref() == Some(part) {
            return Some(self);
        }
        for child in &self.child_nodes {
            if let Some(found) = child.find_part(part) {
                return Some(found);
            }
        }
        None
    }

    /// `true` when this is a non-multipart body whose content is the whole
    /// message (a single-part text message), the condition the download
    /// pipeline (C14) uses to rewrite part `"1"` into `"TEXT"`.
    pub fn is_single_text_root(&self) -> bool {
        !self.is_multipart() && self.kind.eq_ignore_ascii_case("text")
    }
}
