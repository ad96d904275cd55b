//! The per-channel event loop (spec §3, §4.3) — the hard core of the hub.
//!
//! Grounded on `examples/smf-steve-graphix/graphix-rt/src/rt.rs`'s `GXRt`:
//! one task owns all mutable state for its unit and drains a single
//! `mpsc` inbox serially, so nothing here needs a lock. `ChannelHandle` is
//! the client-facing half of that split, mirroring `graphix-rt`'s
//! `GXHandle`/`GXConfig::start()` — a cheap `Clone`-able sender wrapper
//! plus a spawned task owning the receiver.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::warn;
use serde_json::{Map, Value as Json};
use tokio::sync::{mpsc, oneshot};

use crate::client::{ClientHandle, ClientId};
use crate::error::HubError;
use crate::ident::{Identifier, VarKind};
use crate::magic::{self, Spell, SpellParams};
use crate::proto::Frame;
use crate::template::ChannelTemplate;
use crate::value::{Value, ValueKind};

struct MagicEntry {
    spell: Spell,
    source: Identifier,
    params: SpellParams,
    output: ValueKind,
}

struct WireEntry {
    input: ValueKind,
    rewrite: Option<HashMap<String, Identifier>>,
}

/// One channel's state: the index, the stores behind it, and the listener
/// set. Lives entirely inside the task `run` spawns; nothing outside this
/// module ever touches it directly.
pub struct ChannelState {
    pub prefix: char,
    pub name: String,
    pub restrict: Vec<String>,
    listeners: HashMap<ClientId, ClientHandle>,
    /// Whether a client (as opposed to only the admin surface) may write
    /// this identifier (spec §4.3's read-only precondition).
    index: HashMap<Identifier, bool>,
    types: HashMap<Identifier, ValueKind>,
    vars: HashMap<Identifier, Value>,
    /// Per-client slots for a user variable, in join order — an
    /// `IndexMap` rather than a `HashMap` so the admin-facing "whole map"
    /// view ([`ChannelState::resolve`]) has deterministic key order
    /// instead of reshuffling on every call.
    uservars: HashMap<Identifier, IndexMap<ClientId, Value>>,
    magic: HashMap<Identifier, MagicEntry>,
    cache: HashMap<Identifier, Value>,
    deps: HashMap<Identifier, Vec<Identifier>>,
    wires: HashMap<Identifier, WireEntry>,
    listeners_exposed: bool,
}

impl ChannelState {
    /// Build a channel's initial state from its template (`template.go`'s
    /// `apply`). Assumes `tmpl.validate()` already passed — this is not
    /// re-checked here.
    pub fn from_template(name: String, tmpl: &ChannelTemplate) -> Result<ChannelState, HubError> {
        let mut ch = ChannelState {
            prefix: tmpl.prefix,
            name,
            restrict: tmpl.restrict.clone(),
            listeners: HashMap::new(),
            index: HashMap::new(),
            types: HashMap::new(),
            vars: HashMap::new(),
            uservars: HashMap::new(),
            magic: HashMap::new(),
            cache: HashMap::new(),
            deps: HashMap::new(),
            wires: HashMap::new(),
            listeners_exposed: false,
        };

        for id in &tmpl.expose {
            if id == &Identifier::listeners() {
                ch.listeners_exposed = true;
                ch.vars.insert(id.clone(), Value::from(0i64));
                ch.index.insert(id.clone(), false);
            }
        }

        for (name, def) in &tmpl.vars {
            let id = Identifier::with_kind(name.clone(), VarKind::User)?;
            ch.types.insert(id.clone(), def.ty);
            ch.index.insert(id.clone(), !def.read_only);
            ch.uservars.insert(id, IndexMap::new());
        }

        for (name, def) in &tmpl.broadcast {
            let id = Identifier::with_kind(name.clone(), VarKind::Broadcast)?;
            ch.types.insert(id.clone(), def.ty);
            // Broadcasts are never client-writable regardless of `readOnly`
            // (spec §4.3: "only accepted when from is the admin surface").
            ch.index.insert(id, false);
        }

        for (name, def) in &tmpl.magic {
            let id = Identifier::with_kind(name.clone(), VarKind::Magic)?;
            let src = Identifier::with_kind(def.src.clone(), VarKind::User)?;
            let src_ty = *ch
                .types
                .get(&src)
                .ok_or_else(|| HubError::protocol(format!("magic.{name}: unknown source {src}")))?;
            let (spell, output) = magic::resolve(src_ty, &def.func)
                .ok_or_else(|| HubError::protocol(format!("magic.{name}: no such spell")))?;
            let params = SpellParams { value: def.value_param().cloned() };
            ch.cache.insert(id.clone(), output.zero());
            ch.types.insert(id.clone(), output);
            ch.index.insert(id.clone(), false);
            ch.deps.entry(src.clone()).or_default().push(id.clone());
            ch.magic.insert(id, MagicEntry { spell, source: src, params, output });
        }

        for (name, def) in &tmpl.wire {
            let id = Identifier::with_kind(name.clone(), VarKind::Wire)?;
            let rewrite = def.output.as_ref().filter(|o| o.has_rewrite()).map(|o| o.rewrite.clone());
            let output_ty = match &def.output {
                Some(o) if o.has_rewrite() => ValueKind::Object,
                Some(o) => o.ty,
                None => def.input.ty,
            };
            ch.types.insert(id.clone(), output_ty);
            ch.index.insert(id.clone(), !def.read_only);
            ch.wires.insert(id, WireEntry { input: def.input.ty, rewrite });
        }

        Ok(ch)
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify(&self, var: &Identifier, value: &Value) {
        let frame = Frame::set(self.name.clone(), var.clone(), value.clone());
        for listener in self.listeners.values() {
            listener.send(frame.clone());
        }
    }

    fn reply_to(&self, client: ClientId, frame: Frame) {
        if let Some(handle) = self.listeners.get(&client) {
            handle.send(frame);
        }
    }

    fn update_listener_count(&mut self) {
        if !self.listeners_exposed {
            return;
        }
        let id = Identifier::listeners();
        let count = Value::from(self.listener_count() as i64);
        self.vars.insert(id.clone(), count.clone());
        self.notify(&id, &count);
    }

    /// join(client) (spec §4.3): register the listener, acknowledge the
    /// join, give it a fresh cell in every user variable, recompute
    /// everything downstream.
    pub fn join(&mut self, client: ClientHandle) {
        let id = client.id;
        self.listeners.insert(id, client);
        self.reply_to(id, Frame::join_ack(self.name.clone()));
        let user_vars: Vec<Identifier> = self.uservars.keys().cloned().collect();
        for v in &user_vars {
            let zero = self.types.get(v).copied().unwrap_or_default().zero();
            self.uservars.get_mut(v).unwrap().insert(id, zero);
            self.invalidate(v);
        }
        self.update_listener_count();
    }

    /// part(client) (spec §4.3): drop its cell from every user variable,
    /// recompute downstream, then drop the listener itself. Caller checks
    /// `is_empty()` afterward to decide whether the channel should exit.
    pub fn part(&mut self, client: ClientId) {
        let user_vars: Vec<Identifier> = self.uservars.keys().cloned().collect();
        for v in &user_vars {
            if let Some(slot) = self.uservars.get_mut(v) {
                slot.shift_remove(&client);
            }
            self.invalidate(v);
        }
        self.listeners.remove(&client);
        self.update_listener_count();
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Recompute every magic variable downstream of `changed` and notify on
    /// change. A spell that fails to evaluate (e.g. `max` right as the last
    /// listener parts) is logged and left at its last cached value rather
    /// than propagated — there is no waiting caller for a cascade.
    fn invalidate(&mut self, changed: &Identifier) {
        let Some(dependents) = self.deps.get(changed).cloned() else {
            return;
        };
        for m in dependents {
            let Some(entry) = self.magic.get(&m) else { continue };
            let values: Vec<Value> = self
                .uservars
                .get(&entry.source)
                .map(|slots| slots.values().cloned().collect())
                .unwrap_or_default();
            let source_zero = self.types.get(&entry.source).copied().unwrap_or_default().zero();
            match magic::evaluate(entry.spell, &values, self.listener_count(), &source_zero, &entry.params) {
                Ok(new_value) => {
                    let changed = self.cache.get(&m) != Some(&new_value);
                    self.cache.insert(m.clone(), new_value.clone());
                    if changed {
                        self.notify(&m, &new_value);
                    }
                }
                Err(err) => warn!("channel {}: magic {m} failed to evaluate: {err}", self.name),
            }
        }
    }

    /// Resolve a variable's current value for `get` and for wire-rewrite
    /// field resolution. `from` is the requesting client, if any; `None`
    /// (the admin surface) resolving a user variable gets the whole
    /// per-client map, keyed by client id (spec §9 Open Question (c)).
    fn resolve(&self, var: &Identifier, from: Option<ClientId>) -> Result<Value, HubError> {
        match var.kind {
            VarKind::User => {
                let slots = self.uservars.get(var).ok_or_else(|| HubError::unknown_variable(var))?;
                match from {
                    Some(client) => Ok(slots.get(&client).cloned().unwrap_or_else(|| {
                        self.types.get(var).copied().unwrap_or_default().zero()
                    })),
                    None => {
                        let mut map = Map::new();
                        for (client, value) in slots {
                            map.insert(client.to_string(), value.clone());
                        }
                        Ok(Json::Object(map))
                    }
                }
            }
            VarKind::Magic => self.cache.get(var).cloned().ok_or_else(|| HubError::unknown_variable(var)),
            VarKind::System => self.vars.get(var).cloned().ok_or_else(|| HubError::unknown_variable(var)),
            VarKind::Literal => Ok(Value::from(var.literal_value())),
            VarKind::Broadcast | VarKind::Wire | VarKind::Channel => {
                Err(HubError::NotSupported { detail: format!("get: {var}") })
            }
        }
    }

    /// get(var, from) (spec §4.3).
    pub fn get(&self, var: &Identifier, from: ClientId) -> Result<Value, HubError> {
        if var.kind != VarKind::Literal && !self.index.contains_key(var) {
            return Err(HubError::unknown_variable(var));
        }
        self.resolve(var, Some(from))
    }

    fn transform(&self, rewrite: &HashMap<String, Identifier>, from: Option<ClientId>, input: &Value) -> Result<Value, HubError> {
        let mut out = Map::new();
        for (field, target) in rewrite {
            let resolved = if target.kind == VarKind::Literal {
                Value::from(target.literal_value())
            } else if target.is_input_placeholder() {
                input.clone()
            } else {
                self.resolve(target, from)?
            };
            out.insert(field.clone(), resolved);
        }
        Ok(Json::Object(out))
    }

    /// set(var, from, to, value, overwrite) (spec §4.3). `from == None`
    /// means the admin surface; client adapters must set `to == from` for
    /// anything other than a targeted `UserVar` write.
    pub fn set(
        &mut self,
        var: &Identifier,
        from: Option<ClientId>,
        to: Option<ClientId>,
        value: Value,
        overwrite: Option<Map<String, Value>>,
    ) -> Result<(), HubError> {
        let Some(&writable) = self.index.get(var) else {
            return Err(HubError::unknown_variable(var));
        };
        if from.is_some() {
            if !writable {
                return Err(HubError::not_writable(var));
            }
            if to != from {
                return Err(HubError::not_writable(var));
            }
        }

        match var.kind {
            VarKind::User => {
                let ty = self.types.get(var).copied().unwrap_or_default();
                if !ty.is(&value) {
                    return Err(HubError::wrong_type(var));
                }
                let target = match to.or(from) {
                    Some(id) => id,
                    None => return Err(HubError::UnknownTargetUser { user: "<none>".into() }),
                };
                if !self.listeners.contains_key(&target) {
                    return Err(HubError::UnknownTargetUser { user: target.to_string() });
                }
                self.uservars.entry(var.clone()).or_default().insert(target, value.clone());
                self.notify(var, &value);
                self.invalidate(var);
                if Some(target) != from {
                    self.reply_to(target, Frame::set(self.name.clone(), var.clone(), value));
                }
                Ok(())
            }
            VarKind::Broadcast => {
                if from.is_some() {
                    return Err(HubError::not_writable(var));
                }
                let ty = self.types.get(var).copied().unwrap_or_default();
                if !ty.is(&value) {
                    return Err(HubError::wrong_type(var));
                }
                self.notify(var, &value);
                Ok(())
            }
            VarKind::Wire => {
                let entry = self.wires.get(var).ok_or_else(|| HubError::unknown_variable(var))?;
                if !entry.input.is(&value) {
                    return Err(HubError::wrong_type(var));
                }
                let rewrite = entry.rewrite.clone();
                let transformed = match &rewrite {
                    Some(fields) => self.transform(fields, from, &value)?,
                    None => value,
                };
                let transformed = match (&transformed, overwrite) {
                    (Json::Object(base), Some(extra)) => {
                        let mut merged = base.clone();
                        merged.extend(extra);
                        Json::Object(merged)
                    }
                    (_, _) => transformed,
                };
                self.notify(var, &transformed);
                Ok(())
            }
            VarKind::Magic | VarKind::System | VarKind::Channel | VarKind::Literal => {
                Err(HubError::NotSupported { detail: format!("set: {var}") })
            }
        }
    }
}

/// An admin order's reply, delivered over a [`oneshot`] channel (spec
/// §4.3's synchronous `order(get|set, replyChannel)` event).
#[derive(Debug)]
pub struct OrderReply {
    pub value: Option<Value>,
    pub error: Option<HubError>,
}

pub enum ChannelEvent {
    Join(ClientHandle),
    Part(ClientId),
    Get {
        var: Identifier,
        from: ClientId,
    },
    Set {
        var: Identifier,
        from: Option<ClientId>,
        to: Option<ClientId>,
        value: Value,
        overwrite: Option<Map<String, Value>>,
    },
    OrderGet {
        var: Identifier,
        /// The admin surface's `for` field (spec §6) — resolves a
        /// `UserVar` for one specific client's slot instead of the whole map.
        for_client: Option<ClientId>,
        reply: oneshot::Sender<OrderReply>,
    },
    OrderSet {
        var: Identifier,
        value: Value,
        overwrite: Option<Map<String, Value>>,
        /// The admin surface's `for` field (spec §6), threaded through as
        /// `set`'s `to` — which client's `UserVar` slot to write.
        for_client: Option<ClientId>,
        reply: oneshot::Sender<OrderReply>,
    },
}

/// The client-facing half of a channel: a cheap, `Clone`-able sender onto
/// its event inbox. Mirrors `graphix-rt`'s `GXHandle`.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelHandle {
    pub fn join(&self, client: ClientHandle) {
        let _ = self.tx.send(ChannelEvent::Join(client));
    }

    pub fn part(&self, client: ClientId) {
        let _ = self.tx.send(ChannelEvent::Part(client));
    }

    pub fn get(&self, var: Identifier, from: ClientId) {
        let _ = self.tx.send(ChannelEvent::Get { var, from });
    }

    pub fn set(
        &self,
        var: Identifier,
        from: Option<ClientId>,
        to: Option<ClientId>,
        value: Value,
        overwrite: Option<Map<String, Value>>,
    ) {
        let _ = self.tx.send(ChannelEvent::Set { var, from, to, value, overwrite });
    }

    pub async fn order_get(&self, var: Identifier, for_client: Option<ClientId>) -> OrderReply {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ChannelEvent::OrderGet { var, for_client, reply }).is_err() {
            return OrderReply { value: None, error: Some(HubError::protocol("channel gone")) };
        }
        rx.await.unwrap_or(OrderReply { value: None, error: Some(HubError::protocol("channel gone")) })
    }

    pub async fn order_set(
        &self,
        var: Identifier,
        value: Value,
        overwrite: Option<Map<String, Value>>,
        for_client: Option<ClientId>,
    ) -> OrderReply {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ChannelEvent::OrderSet { var, value, overwrite, for_client, reply }).is_err() {
            return OrderReply { value: None, error: Some(HubError::protocol("channel gone")) };
        }
        rx.await.unwrap_or(OrderReply { value: None, error: Some(HubError::protocol("channel gone")) })
    }
}

/// Spawn a channel's task and return its handle plus a [`tokio::task::JoinHandle`]
/// that resolves once the channel has emptied out. The task exits as soon
/// as `ChannelState::is_empty()` holds after a `Part`; the caller (the
/// registry) awaits the join handle to know when to drop its own map entry.
pub fn spawn(
    name: String,
    tmpl: &ChannelTemplate,
) -> Result<(ChannelHandle, tokio::task::JoinHandle<()>), HubError> {
    let mut state = ChannelState::from_template(name, tmpl)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let join = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ChannelEvent::Join(client) => state.join(client),
                ChannelEvent::Part(id) => {
                    state.part(id);
                    if state.is_empty() {
                        break;
                    }
                }
                ChannelEvent::Get { var, from } => match state.get(&var, from) {
                    Ok(value) => state.reply_to(from, Frame::set(state.name.clone(), var, value)),
                    Err(err) => state.reply_to(from, err.to_frame("g", Some(&state.name), Some(&var))),
                },
                ChannelEvent::Set { var, from, to, value, overwrite } => {
                    if let Err(err) = state.set(&var, from, to, value, overwrite) {
                        if let Some(client) = from {
                            state.reply_to(client, err.to_frame("s", Some(&state.name), Some(&var)));
                        } else {
                            warn!("channel {}: admin set {var} failed: {err}", state.name);
                        }
                    }
                }
                ChannelEvent::OrderGet { var, for_client, reply } => {
                    let result = state.resolve(&var, for_client);
                    let _ = reply.send(match result {
                        Ok(value) => OrderReply { value: Some(value), error: None },
                        Err(err) => OrderReply { value: None, error: Some(err) },
                    });
                }
                ChannelEvent::OrderSet { var, value, overwrite, for_client, reply } => {
                    let result = state.set(&var, None, for_client, value, overwrite);
                    let _ = reply.send(match result {
                        Ok(()) => OrderReply { value: None, error: None },
                        Err(err) => OrderReply { value: None, error: Some(err) },
                    });
                }
            }
        }
    });
    Ok((ChannelHandle { tx }, join))
}
