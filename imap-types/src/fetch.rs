//! The assembled per-message FETCH record (C7).

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};

use crate::body::BodyPart;
use crate::envelope::Envelope;
use crate::flag::{Flag, FlagColor};

/// One message row assembled from an untagged `FETCH` response.
///
/// Fields are optional because a `FETCH` only reports what was asked for;
/// a `FETCH 5 (FLAGS)` response populates only `flags`, leaving envelope,
/// body, etc. `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchMessage {
    pub seq: u32,
    pub uid: Option<u32>,
    pub modseq: Option<u64>,
    pub flags: Option<HashSet<Flag>>,
    pub flag_color: Option<FlagColor>,
    pub size: Option<u64>,
    pub envelope: Option<Envelope>,
    pub body_structure: Option<BodyPart>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub body_parts: HashMap<String, Vec<u8>>,
    pub headers: Option<Vec<u8>>,
    pub source: Option<Vec<u8>>,
    pub email_id: Option<String>,
    pub thread_id: Option<String>,
    pub labels: HashSet<String>,
    pub id: String,
}

/// Computes the stable `id` a `FetchMessage` is addressed by when the
/// server doesn't provide `EMAILID`/`X-GM-MSGID`: an md5 digest of
/// `path:uidValidity:uid`.
pub fn derive_id(path: &str, uid_validity: u64, uid: u32) -> String {
    use md5::{Digest, Md5};

    let input = format!("{path}:{uid_validity}:{uid}");
    let digest = Md5::digest(input.as_bytes());
    format!("{digest:x}")
}
