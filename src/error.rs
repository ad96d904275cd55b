//! The error kinds of spec §7, reported to callers as `!` frames or
//! `{code:-1,msg}` admin responses — never propagated as process faults.
//!
//! Grounded on `graphix-rt::CouldNotResolve` (examples/smf-steve-graphix
//! /graphix-rt/src/lib.rs): the teacher hand-writes `Display` for its one
//! concrete error type rather than pulling in `thiserror`, so this crate
//! does the same for its (larger) set of error kinds.

use std::fmt;

use crate::ident::Identifier;
use crate::proto::Frame;

#[derive(Debug, Clone)]
pub enum HubError {
    /// `get`/`set` named an identifier absent from the channel's index.
    UnknownVariable { var: String },
    /// An identifier's sigil disagrees with its looked-up kind.
    MismatchedSigil { var: String },
    /// `set` value failed a type check.
    WrongType { var: String },
    /// Client `set` on a read-only variable, or on another client's slot.
    NotWritable { var: String },
    /// Admin `set` referenced a client id that isn't joined.
    UnknownTargetUser { user: String },
    /// Registry miss with no template matching the channel's prefix.
    NoSuchChannel { name: String },
    /// Malformed frame or unknown command.
    Protocol { detail: String },
    /// A magic spell could not be evaluated (e.g. min/max on no listeners).
    MagicEvaluation { detail: String },
    /// `ChannelVar` writes, or anything else spec.md stubs as unimplemented.
    NotSupported { detail: String },
    /// Admin request carried no key, or the wrong one, while the surface
    /// has a configured shared secret (spec §6, §1's carved-in admin auth).
    Unauthorized,
}

impl HubError {
    pub fn protocol(detail: impl Into<String>) -> HubError {
        HubError::Protocol { detail: detail.into() }
    }

    pub fn unknown_variable(var: &Identifier) -> HubError {
        HubError::UnknownVariable { var: var.to_string() }
    }

    pub fn not_writable(var: &Identifier) -> HubError {
        HubError::NotWritable { var: var.to_string() }
    }

    pub fn wrong_type(var: &Identifier) -> HubError {
        HubError::WrongType { var: var.to_string() }
    }

    /// The reply-to command code (`w`) an error frame carries back, per the
    /// §6 wire table: the attempted command, with the multi-variants (`G`,
    /// `S`) collapsed to their singular form, or `?` for a protocol error
    /// with no recoverable command.
    pub fn reply_to(&self, attempted: &str) -> &'static str {
        match self {
            HubError::Protocol { .. } => "?",
            _ => match attempted {
                "g" | "G" => "g",
                "s" | "S" => "s",
                "j" => "j",
                "p" => "p",
                other => {
                    debug_assert!(false, "unexpected command {other}");
                    "?"
                }
            },
        }
    }

    /// Render as the `!` wire frame spec §6/§7 describe. `attempted` is the
    /// command the caller was trying (`g`/`G`/`s`/`S`/`j`/`p`); `reply_to`
    /// collapses the multi-variants to their singular form for the `w` field.
    pub fn to_frame(&self, attempted: &str, channel: Option<&str>, var: Option<&Identifier>) -> Frame {
        Frame::Error {
            w: self.reply_to(attempted).to_string(),
            c: channel.map(str::to_string),
            n: var.cloned(),
            m: self.to_string(),
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::UnknownVariable { var } => write!(f, "no such var: {var}"),
            HubError::MismatchedSigil { var } => write!(f, "mismatched sigil: {var}"),
            HubError::WrongType { var } => write!(f, "wrong type: {var}"),
            HubError::NotWritable { var } => write!(f, "not writable: {var}"),
            HubError::UnknownTargetUser { user } => write!(f, "unknown target user: {user}"),
            HubError::NoSuchChannel { name } => write!(f, "no such channel: {name}"),
            HubError::Protocol { detail } => write!(f, "protocol error: {detail}"),
            HubError::MagicEvaluation { detail } => write!(f, "magic evaluation failed: {detail}"),
            HubError::NotSupported { detail } => write!(f, "not supported: {detail}"),
            HubError::Unauthorized => write!(f, "bad key"),
        }
    }
}

impl std::error::Error for HubError {}
