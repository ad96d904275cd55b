//! The channel registry (spec §6 configuration shape, §4.5 frame routing).
//!
//! `TemplateRegistry` is the loaded configuration: one [`ChannelTemplate`]
//! per prefix, each individually valid and collectively prefix-unique
//! (spec §6(a)). `ChannelRegistry` is the live set of spawned channels,
//! created lazily on first `join` and torn down once empty — grounded on
//! `graphix-rt/src/lib.rs`'s `GXConfig::start()`, which likewise pairs a
//! handle with a background task and lets the task's own exit condition
//! drive cleanup.
//!
//! This is also where the frame-routing contract deferred from
//! `client.rs` lives: `client.rs` is a leaf module with no reason to know
//! about the registry, while the registry already depends on both
//! `channel.rs` and `client.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::channel::{self, ChannelHandle};
use crate::client::ClientHandle;
use crate::error::HubError;
use crate::proto::Frame;
use crate::template::ChannelTemplate;

/// The validated, prefix-keyed set of channel templates a deployment is
/// configured with.
pub struct TemplateRegistry {
    by_prefix: HashMap<char, ChannelTemplate>,
}

impl TemplateRegistry {
    /// Validate every template individually, then check prefix uniqueness
    /// across the whole set (spec §6(a) — the one cross-template rule;
    /// everything else in `ChannelTemplate::validate` is per-template).
    pub fn build(templates: Vec<ChannelTemplate>) -> Result<TemplateRegistry, Vec<String>> {
        let mut errors = Vec::new();
        for t in &templates {
            if let Err(mut e) = t.validate() {
                errors.append(&mut e);
            }
        }

        let mut by_prefix = HashMap::new();
        for t in templates {
            if by_prefix.contains_key(&t.prefix) {
                errors.push(format!("duplicate channel prefix: {}", t.prefix));
                continue;
            }
            by_prefix.insert(t.prefix, t);
        }

        if errors.is_empty() {
            Ok(TemplateRegistry { by_prefix })
        } else {
            Err(errors)
        }
    }

    pub fn by_prefix(&self, prefix: char) -> Option<&ChannelTemplate> {
        self.by_prefix.get(&prefix)
    }
}

/// The live set of spawned channels, keyed by full channel name (e.g. `"#general"`).
pub struct ChannelRegistry {
    templates: TemplateRegistry,
    channels: RwLock<HashMap<String, ChannelHandle>>,
}

impl ChannelRegistry {
    pub fn new(templates: TemplateRegistry) -> ChannelRegistry {
        ChannelRegistry { templates, channels: RwLock::new(HashMap::new()) }
    }

    /// Look up a channel that must already exist (spec §4.3: `get`/`set`/
    /// `part` reference a channel the client has presumably joined).
    pub fn channel(&self, name: &str) -> Option<ChannelHandle> {
        self.channels.read().get(name).cloned()
    }
}

/// Spawn a channel on first reference, matched by its name's prefix
/// character against the configured templates (spec §6: "a channel's
/// name's first character selects its template"). A free function (not a
/// `self: &Arc<Self>` method — that receiver form needs the unstable
/// `arbitrary_self_types` feature) taking the registry by `&Arc` so the
/// teardown task below can clone its own owned handle onto it.
pub fn get_or_create(registry: &Arc<ChannelRegistry>, name: &str) -> Result<ChannelHandle, HubError> {
    if let Some(handle) = registry.channels.read().get(name) {
        return Ok(handle.clone());
    }

    let mut guard = registry.channels.write();
    if let Some(handle) = guard.get(name) {
        return Ok(handle.clone());
    }

    let prefix = name.chars().next().ok_or_else(|| HubError::NoSuchChannel { name: name.to_string() })?;
    let tmpl = registry
        .templates
        .by_prefix(prefix)
        .ok_or_else(|| HubError::NoSuchChannel { name: name.to_string() })?;

    let (handle, joined) = channel::spawn(name.to_string(), tmpl)?;
    guard.insert(name.to_string(), handle.clone());
    drop(guard);

    let registry = Arc::clone(registry);
    let name = name.to_string();
    tokio::spawn(async move {
        let _ = joined.await;
        registry.channels.write().remove(&name);
    });

    Ok(handle)
}

/// Route one inbound [`Frame`] from `client` (spec §4.5). Errors are
/// turned into `!` reply frames and sent directly back to `client` rather
/// than returned — there is no caller left to hand them to once the frame
/// has been dispatched to (possibly several) channels, as with `MultiGet`/
/// `MultiSet`.
pub fn dispatch(registry: &Arc<ChannelRegistry>, client: &ClientHandle, frame: Frame) {
    match frame {
        Frame::Join { c } => match get_or_create(registry, &c) {
            Ok(ch) => ch.join(client.clone()),
            Err(err) => client.send(err.to_frame("j", Some(&c), None)),
        },
        Frame::Part { c } => {
            if let Some(ch) = registry.channel(&c) {
                ch.part(client.id);
            } else {
                let err = HubError::NoSuchChannel { name: c.clone() };
                client.send(err.to_frame("p", Some(&c), None));
            }
        }
        Frame::Get { c, n } => match registry.channel(&c) {
            Some(ch) => ch.get(n, client.id),
            None => {
                let err = HubError::NoSuchChannel { name: c.clone() };
                client.send(err.to_frame("g", Some(&c), Some(&n)));
            }
        },
        Frame::MultiGet { c, n } => match registry.channel(&c) {
            Some(ch) => {
                for var in n {
                    ch.get(var, client.id);
                }
            }
            None => client.send(HubError::NoSuchChannel { name: c.clone() }.to_frame("G", Some(&c), None)),
        },
        Frame::Set { c, n, v } => match registry.channel(&c) {
            Some(ch) => ch.set(n, Some(client.id), Some(client.id), v, None),
            None => client.send(HubError::NoSuchChannel { name: c.clone() }.to_frame("s", Some(&c), Some(&n))),
        },
        Frame::MultiSet { c, v } => match registry.channel(&c) {
            Some(ch) => {
                for (var, value) in v {
                    ch.set(var, Some(client.id), Some(client.id), value, None);
                }
            }
            None => client.send(HubError::NoSuchChannel { name: c.clone() }.to_frame("S", Some(&c), None)),
        },
        Frame::Error { .. } => {
            client.send(HubError::protocol("clients may not send error frames").to_frame("?", None, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::test_client;
    use serde_json::json;

    fn registry() -> Arc<ChannelRegistry> {
        let tmpl: ChannelTemplate = toml::from_str(
            r#"
            prefix = "#"
            expose = ["$listeners"]

            [var.vote]
            type = "bool"
            "#,
        )
        .unwrap();
        Arc::new(ChannelRegistry::new(TemplateRegistry::build(vec![tmpl]).unwrap()))
    }

    #[test]
    fn duplicate_prefixes_are_rejected() {
        let tmpl: ChannelTemplate = toml::from_str(r#"prefix = "#""#).unwrap();
        let err = TemplateRegistry::build(vec![tmpl.clone(), tmpl]).unwrap_err();
        assert!(err.iter().any(|e| e.contains("duplicate channel prefix")));
    }

    #[tokio::test]
    async fn join_spawns_and_part_tears_down() {
        let reg = registry();
        let (client, _rx) = test_client();
        dispatch(&reg, &client, Frame::Join { c: "#x".into() });
        assert!(reg.channel("#x").is_some());

        dispatch(&reg, &client, Frame::Part { c: "#x".into() });
        // Teardown happens on the spawned channel task, asynchronously.
        for _ in 0..50 {
            if reg.channel("#x").is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(reg.channel("#x").is_none());
    }

    #[tokio::test]
    async fn get_on_unjoined_channel_replies_no_such_channel() {
        let reg = registry();
        let (client, mut rx) = test_client();
        dispatch(&reg, &client, Frame::Get { c: "#nope".into(), n: crate::ident::Identifier::parse("%vote").unwrap() });
        let frame = rx.try_recv().unwrap();
        match frame {
            Frame::Error { w, .. } => assert_eq!(w, "g"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_after_join_notifies_listener() {
        let reg = registry();
        let (client, mut rx) = test_client();
        dispatch(&reg, &client, Frame::Join { c: "#x".into() });
        dispatch(
            &reg,
            &client,
            Frame::Set { c: "#x".into(), n: crate::ident::Identifier::parse("%vote").unwrap(), v: json!(true) },
        );
        // Drain frames until we see our own set echoed back.
        let mut saw_set = false;
        for _ in 0..10 {
            match rx.try_recv() {
                Ok(Frame::Set { n, v, .. }) if n.to_string() == "%vote" => {
                    saw_set = true;
                    assert_eq!(v, json!(true));
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_set);
    }
}
