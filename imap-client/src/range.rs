//! Coerces caller-supplied ranges into a canonical range string (C17,
//! §4.17).

use crate::search::pack;
use std::collections::BTreeSet;

/// The shapes a caller may pass for a message range.
#[derive(Debug, Clone)]
pub enum RangeInput {
    Number(u32),
    Largest,
    Numbers(Vec<u32>),
    /// Already-formatted range syntax (`"1:*"`, `"1,3,5:7"`).
    Raw(String),
}

/// Resolved range ready to hand to the scheduler: the canonical string
/// plus whether the resolution went through a UID-producing SEARCH (in
/// which case the caller must also set `UID` on the FETCH/STORE/etc.).
#[derive(Debug, Clone)]
pub struct ResolvedRange {
    pub range: String,
    pub uid: bool,
}

/// Resolves `input` into canonical form. A `SearchCriteria` (run via
/// `run_search`) always resolves with `uid = true`, since UID is the only
/// identifier stable across a SEARCH racing with mailbox changes (§4.17).
pub fn resolve(input: RangeInput) -> ResolvedRange {
    let range = match input {
        RangeInput::Number(n) => n.to_string(),
        RangeInput::Largest => "*".to_string(),
        RangeInput::Numbers(ns) => {
            let set: BTreeSet<u32> = ns.into_iter().collect();
            pack(&set, false)
        }
        RangeInput::Raw(s) => s,
    };
    ResolvedRange { range, uid: false }
}

/// Resolves a range by first running `search_results` (the caller already
/// executed SEARCH) and packing the resulting UID set.
pub fn resolve_from_search(uids: BTreeSet<u32>) -> ResolvedRange {
    ResolvedRange {
        range: pack(&uids, false),
        uid: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_resolves_to_its_own_string() {
        assert_eq!(resolve(RangeInput::Number(7)).range, "7");
    }

    #[test]
    fn largest_resolves_to_star() {
        assert_eq!(resolve(RangeInput::Largest).range, "*");
    }

    #[test]
    fn numbers_are_packed() {
        let resolved = resolve(RangeInput::Numbers(vec![1, 2, 3, 5]));
        assert_eq!(resolved.range, "1:3,5");
        assert!(!resolved.uid);
    }

    #[test]
    fn search_resolution_sets_uid_flag() {
        let resolved = resolve_from_search([1, 2, 3].into_iter().collect());
        assert!(resolved.uid);
        assert_eq!(resolved.range, "1:3");
    }
}
