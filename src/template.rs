//! Channel templates (spec §3 "Channel template", §6 "Configuration shape").
//!
//! Parsing the TOML file itself is out of scope (spec §1); these types are
//! "the shape the core consumes" — `serde::Deserialize` so a caller can
//! `toml::from_str::<ChannelTemplate>(..)` directly, following
//! `examples/original_source/template.go` + `config.go`.

use std::collections::HashMap;

use serde_derive::Deserialize;

use crate::ident::{Identifier, VarKind};
use crate::magic;
use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, Deserialize)]
pub struct VarDef {
    #[serde(rename = "type", default)]
    pub ty: ValueKind,
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
    /// Part of the declared shape (spec §3) but, like `restrict`, inert:
    /// §4.3's `join` is explicit that a fresh client cell starts at
    /// `types[v].zero()`, not this value.
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastDef {
    #[serde(rename = "type", default)]
    pub ty: ValueKind,
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MagicDef {
    /// Name of the source user variable (without its `%` sigil).
    pub src: String,
    pub func: String,
    /// Shortcut for `params = { value = ... }` (`config.go`'s `Param`).
    #[serde(default)]
    pub param: Option<Value>,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

impl MagicDef {
    pub fn value_param(&self) -> Option<&Value> {
        self.params.get("value").or(self.param.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireInputDef {
    #[serde(rename = "type", default)]
    pub ty: ValueKind,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireOutputDef {
    #[serde(rename = "type", default)]
    pub ty: ValueKind,
    /// field name -> identifier. `rescue()`'d to `object` at validation time
    /// when non-empty, matching `config.go`'s handling of `hasRewrite()`.
    #[serde(default)]
    pub rewrite: HashMap<String, Identifier>,
}

impl WireOutputDef {
    pub fn has_rewrite(&self) -> bool {
        !self.rewrite.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireDef {
    pub input: WireInputDef,
    pub output: Option<WireOutputDef>,
    /// Whether clients may `set` this wire (spec §3's declared wire shape);
    /// admin writes are never subject to it.
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelTemplate {
    /// Exactly one code point by construction: `char` can't be anything else.
    pub prefix: char,
    /// Special `$vars` to expose (spec only knows `$listeners`).
    #[serde(default)]
    pub expose: Vec<Identifier>,
    /// Opaque passthrough carried on the channel; spec.md does not define
    /// further semantics for it (`examples/original_source/channel.go`'s
    /// `restrict` field is likewise stored and never read).
    #[serde(default)]
    pub restrict: Vec<String>,
    #[serde(rename = "var", default)]
    pub vars: HashMap<String, VarDef>,
    #[serde(default)]
    pub magic: HashMap<String, MagicDef>,
    #[serde(default)]
    pub broadcast: HashMap<String, BroadcastDef>,
    #[serde(default)]
    pub wire: HashMap<String, WireDef>,
}

impl ChannelTemplate {
    /// Whether `v` is defined by this template (`template.go`'s `defines`).
    pub fn defines(&self, v: &Identifier) -> bool {
        match v.kind {
            VarKind::User => self.vars.contains_key(v.name.as_str()),
            VarKind::Magic => self.magic.contains_key(v.name.as_str()),
            VarKind::Broadcast => self.broadcast.contains_key(v.name.as_str()),
            VarKind::Wire => self.wire.contains_key(v.name.as_str()),
            // Only `$listeners` is known; see §6(e).
            VarKind::System => v.name == "listeners",
            VarKind::Channel | VarKind::Literal => false,
        }
    }

    /// Per-template structural validation — spec §6 (b)-(e). Prefix
    /// uniqueness across templates (§6 (a)) is a registry-level concern,
    /// see [`crate::registry::TemplateRegistry::build`].
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for id in &self.expose {
            if id.kind != VarKind::System || id != &Identifier::listeners() {
                errors.push(format!("[expose] not a known system variable: {id}"));
            }
        }

        for (name, m) in &self.magic {
            let Some(src_def) = self.vars.get(&m.src) else {
                errors.push(format!(
                    "[magic.{name}] source variable %{} is not defined, did you forget [var.{}]?",
                    m.src, m.src
                ));
                continue;
            };
            if !magic::has_magic(src_def.ty, &m.func) {
                errors.push(format!(
                    "[magic.{name}] no such magic spell: ({}, {})",
                    src_def.ty, m.func
                ));
            }
        }

        for (name, w) in &self.wire {
            if let Some(output) = &w.output {
                if output.has_rewrite() {
                    for (field, target) in &output.rewrite {
                        let definable = target.kind == VarKind::Literal
                            || target.is_input_placeholder()
                            || self.defines(target);
                        if !definable {
                            errors.push(format!(
                                "[wire.{name}.output.rewrite] {field} = {target}, no such var: {target}"
                            ));
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toml_template() -> ChannelTemplate {
        let src = r#"
            prefix = "#"
            expose = ["$listeners"]

            [var.vote]
            type = "bool"

            [magic.all]
            src = "vote"
            func = "all"

            [broadcast.chat]
            type = "object"

            [wire.chat]
            [wire.chat.input]
            type = "object"
        "#;
        toml::from_str(src).unwrap()
    }

    #[test]
    fn validates_clean_template() {
        let tmpl = toml_template();
        assert!(tmpl.validate().is_ok());
    }

    #[test]
    fn catches_undefined_magic_source() {
        let mut tmpl = toml_template();
        tmpl.magic.get_mut("all").unwrap().src = "nonexistent".into();
        assert!(tmpl.validate().is_err());
    }

    #[test]
    fn catches_unknown_spell() {
        let mut tmpl = toml_template();
        tmpl.magic.get_mut("all").unwrap().func = "bogus".into();
        assert!(tmpl.validate().is_err());
    }

    #[test]
    fn defines_checks_each_kind() {
        let tmpl = toml_template();
        assert!(tmpl.defines(&Identifier::parse("%vote").unwrap()));
        assert!(tmpl.defines(&Identifier::parse("&all").unwrap()));
        assert!(tmpl.defines(&Identifier::parse("#chat").unwrap()));
        assert!(tmpl.defines(&Identifier::parse("=chat").unwrap()));
        assert!(tmpl.defines(&Identifier::listeners()));
        assert!(!tmpl.defines(&Identifier::parse("%ghost").unwrap()));
    }
}
