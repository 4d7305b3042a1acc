//! The capability set negotiated with the server (C4).

use std::collections::HashMap;

/// A capability's value: present-but-bare (`IDLE`), or a parsed numeric
/// parameter (`APPENDLIMIT=35651584` becomes key `APPENDLIMIT`, value
/// `35651584`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityValue {
    Present,
    Number(u64),
}

/// The set of capabilities advertised by the server, folded from either
/// `* CAPABILITY ...` or the `[CAPABILITY ...]` response code of a greeting
/// or tagged `OK`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: HashMap<String, CapabilityValue>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one raw capability token (`"IMAP4REV1"`, `"APPENDLIMIT=35651584"`,
    /// `"AUTH=PLAIN"`, ...) into the set.
    ///
    /// Case is normalized for the key except for the `AUTH=*` family, whose
    /// mechanism name is kept verbatim because SASL mechanism names are
    /// conventionally upper-case but servers are not required to agree on
    /// casing beyond that.
    pub fn fold(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }

        if let Some((key, value)) = raw.split_once('=') {
            let key_upper = key.to_ascii_uppercase();
            if key_upper == "AUTH" {
                self.entries
                    .insert(format!("AUTH={value}"), CapabilityValue::Present);
                return;
            }
            if let Ok(n) = value.parse::<u64>() {
                self.entries.insert(key_upper, CapabilityValue::Number(n));
                return;
            }
            // Unknown `KEY=value` shape; keep the bare key as present so
            // membership checks still work.
            self.entries.insert(key_upper, CapabilityValue::Present);
            return;
        }

        let normalized = normalize_name(raw);
        self.entries
            .entry(normalized)
            .or_insert(CapabilityValue::Present);
    }

    pub fn fold_all<'a>(&mut self, raw: impl IntoIterator<Item = &'a str>) {
        for token in raw {
            self.fold(token);
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_name(name))
    }

    pub fn numeric(&self, name: &str) -> Option<u64> {
        match self.entries.get(&normalize_name(name)) {
            Some(CapabilityValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// SASL mechanisms advertised via `AUTH=*`, e.g. `["PLAIN", "LOGIN"]`.
    pub fn auth_mechanisms(&self) -> Vec<&str> {
        self.entries
            .keys()
            .filter_map(|k| k.strip_prefix("AUTH="))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn normalize_name(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    if upper == "IMAP4REV1" {
        "IMAP4REV1".to_string()
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_bare_and_parameterized_capabilities() {
        let mut caps = CapabilitySet::new();
        caps.fold_all([
            "IMAP4rev1",
            "IDLE",
            "APPENDLIMIT=35651584",
            "AUTH=PLAIN",
            "AUTH=OAUTHBEARER",
        ]);

        assert!(caps.has("IMAP4REV1"));
        assert!(caps.has("idle"));
        assert_eq!(caps.numeric("AppendLimit"), Some(35_651_584));
        let mut mechs = caps.auth_mechanisms();
        mechs.sort_unstable();
        assert_eq!(mechs, vec!["OAUTHBEARER", "PLAIN"]);
    }

    #[test]
    fn folding_is_order_and_case_independent() {
        let mut a = CapabilitySet::new();
        a.fold_all(["CONDSTORE", "APPENDLIMIT=100"]);
        let mut b = CapabilitySet::new();
        b.fold_all(["appendlimit=100", "condstore"]);
        assert_eq!(a, b);
    }
}
