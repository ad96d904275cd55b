//! A real-time variable-synchronization hub (spec §1 OVERVIEW): clients
//! join named channels over a persistent transport and observe/mutate a
//! set of shared, typed, named variables, with derived ("magic") values
//! recomputed automatically as their inputs change.
//!
//! The transport itself — WebSocket framing, HTTP admin routes, TLS — is
//! out of scope (spec §1 Non-goals); this crate owns the channel model,
//! the wire protocol's shape, and the admin contract above it. Grounded
//! throughout on `graphix-rt`'s actor-per-unit split: one task owns a
//! channel's mutable state and drains a serial event inbox, callers only
//! ever hold a cheap, cloneable handle onto that inbox.

pub mod admin;
pub mod channel;
pub mod client;
pub mod error;
pub mod ident;
pub mod magic;
pub mod proto;
pub mod registry;
pub mod template;
pub mod value;

pub use channel::{ChannelHandle, ChannelState};
pub use client::{ClientHandle, ClientId, ClientSink};
pub use error::HubError;
pub use ident::{Identifier, VarKind};
pub use proto::Frame;
pub use registry::{ChannelRegistry, TemplateRegistry};
pub use template::ChannelTemplate;
pub use value::{Value, ValueKind};
