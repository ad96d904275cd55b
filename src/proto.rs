//! The client wire protocol (spec §6): one JSON object per frame, tagged
//! by its `x` command. Grounded on the later generation of
//! `examples/original_source/protocol.go` (typed `Identifier` fields,
//! superseding the plain-string `proto.go` generation — see SPEC_FULL.md).
//!
//! The transport that carries these bytes (WebSocket) is out of scope;
//! this module only owns the shape of a frame.

use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

use crate::ident::Identifier;
use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "x")]
pub enum Frame {
    #[serde(rename = "j")]
    Join { c: String },
    #[serde(rename = "p")]
    Part { c: String },
    #[serde(rename = "g")]
    Get { c: String, n: Identifier },
    #[serde(rename = "G")]
    MultiGet { c: String, n: Vec<Identifier> },
    #[serde(rename = "s")]
    Set { c: String, n: Identifier, v: Value },
    #[serde(rename = "S")]
    MultiSet { c: String, v: HashMap<Identifier, Value> },
    #[serde(rename = "!")]
    Error {
        w: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        c: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        n: Option<Identifier>,
        m: String,
    },
}

impl Frame {
    /// The `set`-shaped notify/reply frame `notify(v, value)` and `get`'s
    /// reply both produce (spec §4.3).
    pub fn set(channel: impl Into<String>, var: Identifier, value: Value) -> Frame {
        Frame::Set { c: channel.into(), n: var, v: value }
    }

    pub fn join_ack(channel: impl Into<String>) -> Frame {
        Frame::Join { c: channel.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_roundtrips() {
        let f = Frame::Join { c: "#x".into() };
        let s = serde_json::to_string(&f).unwrap();
        assert_eq!(s, r#"{"x":"j","c":"#x"}"#);
        let back: Frame = serde_json::from_str(&s).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn set_frame_shape() {
        let f = Frame::set("#x", Identifier::parse("&all").unwrap(), json!(true));
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["x"], "s");
        assert_eq!(v["c"], "#x");
        assert_eq!(v["n"], "&all");
        assert_eq!(v["v"], true);
    }

    #[test]
    fn error_frame_omits_absent_fields() {
        let f = Frame::Error { w: "g".into(), c: None, n: None, m: "no such var".into() };
        let v = serde_json::to_value(&f).unwrap();
        assert!(v.get("c").is_none());
        assert!(v.get("n").is_none());
    }

    #[test]
    fn multiset_keys_are_identifier_text() {
        let mut values = HashMap::new();
        values.insert(Identifier::parse("%vote").unwrap(), json!(true));
        let f = Frame::MultiSet { c: "#x".into(), v: values };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["v"]["%vote"], true);
    }
}
