//! Variable identifiers: a one-character sigil plus a name.
//!
//! Sigil and [`VarKind`] are bijective for every kind that actually
//! appears on the wire. `VarKind::Channel` is deliberately unreachable
//! from [`Identifier::parse`] — it has no sigil, matching the source
//! this sigil table is grounded on (`examples/original_source/variables.go`).

use compact_str::CompactString;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::HubError;

/// What an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Reserved; writes are not supported (spec §9 open question).
    Channel,
    User,
    Magic,
    System,
    Broadcast,
    Wire,
    /// A bare literal; its value is its name.
    Literal,
}

impl VarKind {
    fn sigil(self) -> Option<char> {
        match self {
            VarKind::User => Some('%'),
            VarKind::Magic => Some('&'),
            VarKind::System => Some('$'),
            VarKind::Broadcast => Some('#'),
            VarKind::Wire => Some('='),
            VarKind::Literal => Some('\''),
            VarKind::Channel => None,
        }
    }

    fn from_sigil(c: char) -> Option<VarKind> {
        match c {
            '%' => Some(VarKind::User),
            '&' => Some(VarKind::Magic),
            '$' => Some(VarKind::System),
            '#' => Some(VarKind::Broadcast),
            '=' => Some(VarKind::Wire),
            '\'' => Some(VarKind::Literal),
            _ => None,
        }
    }
}

/// A `(sigil, name, kind)` triple — the canonical in-band representation
/// of a variable (spec §3, §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub sigil: char,
    pub name: CompactString,
    pub kind: VarKind,
}

impl Identifier {
    /// System identifier `$listeners`, the only system var spec.md knows about.
    pub fn listeners() -> Identifier {
        Identifier { sigil: '$', name: CompactString::new("listeners"), kind: VarKind::System }
    }

    /// The reserved `$input` pseudo-identifier used only inside wire rewrites.
    pub fn is_input_placeholder(&self) -> bool {
        self.kind == VarKind::System && self.name == "input"
    }

    /// For a `LiteralString` identifier, the literal value (its name).
    pub fn literal_value(&self) -> &str {
        &self.name
    }

    /// Build an identifier from a bare name and its intended kind, using
    /// that kind's canonical sigil. Used when a template constructs
    /// identifiers for its declared vars/magic/broadcasts/wires.
    pub fn with_kind(name: impl Into<CompactString>, kind: VarKind) -> Result<Identifier, HubError> {
        let sigil = kind
            .sigil()
            .ok_or_else(|| HubError::protocol(format!("{kind:?} has no sigil")))?;
        Ok(Identifier { sigil, name: name.into(), kind })
    }

    /// `false` if the sigil and kind disagree — the "mismatched sigil"
    /// error kind of spec §7. A well-formed `Identifier` always satisfies
    /// this; it exists to validate identifiers rebuilt from untrusted parts
    /// (e.g. a rewrite target assembled from separate sigil/name fields).
    pub fn sigil_matches_kind(&self) -> bool {
        VarKind::from_sigil(self.sigil) == Some(self.kind)
    }

    pub fn parse(text: &str) -> Result<Identifier, HubError> {
        let mut chars = text.chars();
        let sigil = chars.next().ok_or_else(|| HubError::protocol("invalid var: empty"))?;
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(HubError::protocol(format!("invalid var: too short: {text}")));
        }
        let kind = VarKind::from_sigil(sigil)
            .ok_or_else(|| HubError::protocol(format!("invalid var: {text}")))?;
        Ok(Identifier { sigil, name: CompactString::new(rest), kind })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sigil, self.name)
    }
}

impl FromStr for Identifier {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = CompactString::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(de::Error::custom)
    }
}
