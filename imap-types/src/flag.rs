//! Message flags and the derived Apple-Mail-style flag color (C7).

use std::collections::HashSet;
use std::fmt;

/// A message or mailbox flag.
///
/// System flags are the five defined by RFC 3501; anything else (including
/// other backslash-prefixed extension flags) is a keyword as far as this
/// client is concerned, matching how permanent-flags negotiation treats
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Keyword(String),
}

impl Flag {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "\\Answered" => Flag::Answered,
            "\\Deleted" => Flag::Deleted,
            "\\Draft" => Flag::Draft,
            "\\Flagged" => Flag::Flagged,
            "\\Seen" => Flag::Seen,
            other => Flag::Keyword(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> String {
        match self {
            Flag::Answered => "\\Answered".to_string(),
            Flag::Deleted => "\\Deleted".to_string(),
            Flag::Draft => "\\Draft".to_string(),
            Flag::Flagged => "\\Flagged".to_string(),
            Flag::Seen => "\\Seen".to_string(),
            Flag::Keyword(k) => k.clone(),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// The Apple Mail-derived color an IMAP client paints a flagged message
/// with, based on the 3-bit value encoded by the `$MailFlagBit0..2`
/// keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Grey,
}

impl FlagColor {
    /// Derives the color from a flag set, or `None` if `\Flagged` is absent.
    ///
    /// Bit value 7 (all three `$MailFlagBit*` keywords set) is not a
    /// documented Apple Mail state; this implementation falls back to
    /// `Red`, matching the reference behavior (see Open Questions).
    pub fn from_flags(flags: &HashSet<Flag>) -> Option<FlagColor> {
        if !flags.contains(&Flag::Flagged) {
            return None;
        }

        let mut bits = 0u8;
        if flags.contains(&Flag::Keyword("$MailFlagBit0".to_string())) {
            bits |= 0b001;
        }
        if flags.contains(&Flag::Keyword("$MailFlagBit1".to_string())) {
            bits |= 0b010;
        }
        if flags.contains(&Flag::Keyword("$MailFlagBit2".to_string())) {
            bits |= 0b100;
        }

        Some(match bits {
            0 => FlagColor::Red,
            1 => FlagColor::Orange,
            2 => FlagColor::Yellow,
            3 => FlagColor::Green,
            4 => FlagColor::Blue,
            5 => FlagColor::Purple,
            6 => FlagColor::Grey,
            7 => FlagColor::Red,
            _ => unreachable!("3-bit value"),
        })
    }

    /// The `$MailFlagBit*` keyword deltas required to mark a message with
    /// this color. The caller still has to add `\Flagged` itself.
    pub fn to_keyword_flags(self) -> Vec<Flag> {
        let bits: u8 = match self {
            FlagColor::Red => 0,
            FlagColor::Orange => 1,
            FlagColor::Yellow => 2,
            FlagColor::Green => 3,
            FlagColor::Blue => 4,
            FlagColor::Purple => 5,
            FlagColor::Grey => 6,
        };
        let mut out = Vec::new();
        if bits & 0b001 != 0 {
            out.push(Flag::Keyword("$MailFlagBit0".to_string()));
        }
        if bits & 0b010 != 0 {
            out.push(Flag::Keyword("$MailFlagBit1".to_string()));
        }
        if bits & 0b100 != 0 {
            out.push(Flag::Keyword("$MailFlagBit2".to_string()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flagged_with(bits: &[&str]) -> HashSet<Flag> {
        let mut set = HashSet::new();
        set.insert(Flag::Flagged);
        for b in bits {
            set.insert(Flag::Keyword((*b).to_string()));
        }
        set
    }

    #[test]
    fn no_flagged_means_no_color() {
        let set: HashSet<Flag> = [Flag::Seen].into_iter().collect();
        assert_eq!(FlagColor::from_flags(&set), None);
    }

    #[test]
    fn round_trips_every_documented_color() {
        for color in [
            FlagColor::Red,
            FlagColor::Orange,
            FlagColor::Yellow,
            FlagColor::Green,
            FlagColor::Blue,
            FlagColor::Purple,
            FlagColor::Grey,
        ] {
            let mut flags: HashSet<Flag> = color.to_keyword_flags().into_iter().collect();
            flags.insert(Flag::Flagged);
            assert_eq!(FlagColor::from_flags(&flags), Some(color));
        }
    }

    #[test]
    fn bit_value_seven_falls_back_to_red() {
        let set = flagged_with(&["$MailFlagBit0", "$MailFlagBit1", "$MailFlagBit2"]);
        assert_eq!(FlagColor::from_flags(&set), Some(FlagColor::Red));
    }
}
