//! The admin surface contract (spec §4.3's `order` event, spec §6's admin
//! wire shapes). Grounded on `examples/original_source/api.go`: fetch is
//! synchronous (`ch.deliver <- fetch` plus a reply mailbox, matching our
//! `ChannelHandle::order_get`), while set is fire-and-forget (`ch.set <-
//! msg`, matching `ChannelHandle::set` with `from: None`). This module
//! owns only the request/response shapes an HTTP (or other) admin
//! transport would marshal; the transport itself is out of scope (spec §1).

use serde_derive::{Deserialize, Serialize};
use serde_json::Map;

use crate::channel::ChannelHandle;
use crate::client::ClientId;
use crate::error::HubError;
use crate::ident::Identifier;
use crate::value::Value;

/// `api.go`'s `checkKey`: an empty configured key means the surface has no
/// authentication; a non-empty one must match the request's `key` exactly
/// (spec §6: "the request must carry it either in the query string or in
/// the body" — the query-string half belongs to the out-of-scope HTTP
/// transport, this only checks the body field it owns).
fn check_key(configured: Option<&str>, supplied: Option<&str>) -> bool {
    match configured {
        None => true,
        Some(key) if key.is_empty() => true,
        Some(key) => supplied == Some(key),
    }
}

/// `{code, value, error}` — the one reply shape every admin operation
/// produces (spec §6: `code ∈ {1=OK, 0=NothingHappened, -1=Error}`).
/// `NothingHappened` is spec'd for "routes on channels that do not exist"
/// — a case this module can't itself produce, since it's only ever handed
/// a [`ChannelHandle`] that already resolved; the out-of-scope HTTP layer
/// that owns channel-name routing (spec §1) is the one expected to return
/// it directly, without calling into this module at all, on a registry miss.
#[derive(Debug, Clone, Serialize)]
pub struct AdminResponse {
    pub code: ResponseCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    NothingHappened,
    Error,
}

impl serde::Serialize for ResponseCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(match self {
            ResponseCode::Ok => 1,
            ResponseCode::NothingHappened => 0,
            ResponseCode::Error => -1,
        })
    }
}

impl AdminResponse {
    fn ok(value: Value) -> AdminResponse {
        AdminResponse { code: ResponseCode::Ok, value: Some(value), msg: None }
    }

    /// A fire-and-forget write this module successfully queued. There is
    /// no "nothing happened" outcome reachable from inside a resolved
    /// channel — submission onto its event inbox cannot itself fail.
    fn accepted() -> AdminResponse {
        AdminResponse { code: ResponseCode::Ok, value: None, msg: None }
    }

    fn error(err: HubError) -> AdminResponse {
        AdminResponse { code: ResponseCode::Error, value: None, msg: Some(err.to_string()) }
    }
}

/// `GET /:channel/:var`-shaped admin fetch: synchronous, via `order_get`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminFetchRequest {
    pub var: Identifier,
    /// Spec §6's `for`: resolve one specific client's `UserVar` slot
    /// instead of the whole per-client map.
    #[serde(rename = "for", default)]
    pub for_client: Option<ClientId>,
    /// Spec §6's `key`: checked against the surface's configured shared
    /// secret, if any (spec §1's carved-in admin authentication).
    #[serde(default)]
    pub key: Option<String>,
}

/// `POST /:channel/:var`-shaped admin write: fire-and-forget, via the
/// plain `set` event with `from: None`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSetRequest {
    pub var: Identifier,
    pub value: Value,
    /// Spec §6's `for`: which client's `UserVar` slot to write, threaded
    /// through as `set`'s `to`.
    #[serde(rename = "for", default)]
    pub for_client: Option<ClientId>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub overwrite: Option<Map<String, Value>>,
}

/// Resolve one admin fetch (spec §4.3's `order(get, replyChannel)`).
/// `admin_key` is the surface's configured shared secret, if any; `None`
/// or `Some("")` disables the check entirely.
pub async fn fetch(channel: &ChannelHandle, req: AdminFetchRequest, admin_key: Option<&str>) -> AdminResponse {
    if !check_key(admin_key, req.key.as_deref()) {
        return AdminResponse::error(HubError::Unauthorized);
    }
    let reply = channel.order_get(req.var, req.for_client).await;
    match reply.error {
        Some(err) => AdminResponse::error(err),
        None => AdminResponse::ok(reply.value.unwrap_or(Value::Null)),
    }
}

/// Submit one admin write. Matches `api.go`'s fire-and-forget `ch.set <-`:
/// the event is queued and this returns immediately with `{code:0}`,
/// without waiting to learn whether the channel accepted it. Use
/// [`set_and_confirm`] when the caller needs a synchronous round trip
/// instead (spec §4.3 also allows `order(set, replyChannel)`).
pub fn set(channel: &ChannelHandle, req: AdminSetRequest, admin_key: Option<&str>) -> AdminResponse {
    if !check_key(admin_key, req.key.as_deref()) {
        return AdminResponse::error(HubError::Unauthorized);
    }
    channel.set(req.var, None, req.for_client, req.value, req.overwrite);
    AdminResponse::accepted()
}

/// The synchronous variant of [`set`], for admin surfaces that want to
/// know whether the write was accepted before replying to their own caller.
pub async fn set_and_confirm(channel: &ChannelHandle, req: AdminSetRequest, admin_key: Option<&str>) -> AdminResponse {
    if !check_key(admin_key, req.key.as_deref()) {
        return AdminResponse::error(HubError::Unauthorized);
    }
    let reply = channel.order_set(req.var, req.value, req.overwrite, req.for_client).await;
    match reply.error {
        Some(err) => AdminResponse::error(err),
        None => AdminResponse::accepted(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ChannelTemplate;
    use serde_json::json;

    fn chat_channel() -> ChannelHandle {
        let tmpl: ChannelTemplate = toml::from_str(
            r#"
            prefix = "#"

            [broadcast.chat]
            type = "object"
            "#,
        )
        .unwrap();
        crate::channel::spawn("#x".into(), &tmpl).unwrap().0
    }

    #[test]
    fn response_codes_serialize_to_spec_integers() {
        assert_eq!(serde_json::to_value(ResponseCode::Ok).unwrap(), json!(1));
        assert_eq!(serde_json::to_value(ResponseCode::NothingHappened).unwrap(), json!(0));
        assert_eq!(serde_json::to_value(ResponseCode::Error).unwrap(), json!(-1));
    }

    fn req(var: &str, value: Value) -> AdminSetRequest {
        AdminSetRequest { var: Identifier::parse(var).unwrap(), value, for_client: None, key: None, overwrite: None }
    }

    #[tokio::test]
    async fn set_and_confirm_reports_errors() {
        let ch = chat_channel();
        let resp = set_and_confirm(&ch, req("#chat", json!("not an object")), None).await;
        assert_eq!(resp.code, ResponseCode::Error);
    }

    #[tokio::test]
    async fn key_mismatch_is_rejected_before_touching_the_channel() {
        let ch = chat_channel();
        let mut r = req("#chat", json!({"m": "hi"}));
        r.key = Some("wrong".into());
        let resp = set_and_confirm(&ch, r, Some("secret")).await;
        assert_eq!(resp.code, ResponseCode::Error);
    }

    #[tokio::test]
    async fn matching_key_is_accepted() {
        let ch = chat_channel();
        let mut r = req("#chat", json!({"m": "hi"}));
        r.key = Some("secret".into());
        let resp = set_and_confirm(&ch, r, Some("secret")).await;
        assert_eq!(resp.code, ResponseCode::Ok);
    }

    #[tokio::test]
    async fn no_configured_key_accepts_any_request() {
        let ch = chat_channel();
        let resp = set_and_confirm(&ch, req("#chat", json!({"m": "hi"})), None).await;
        assert_eq!(resp.code, ResponseCode::Ok);
    }

    #[tokio::test]
    async fn for_targets_a_specific_clients_uservar_slot() {
        let tmpl: ChannelTemplate = toml::from_str(
            r#"
            prefix = "#"

            [var.vote]
            type = "bool"
            "#,
        )
        .unwrap();
        let (ch, _joined) = crate::channel::spawn("#x".into(), &tmpl).unwrap();
        let (client, _rx) = crate::client::test_support::test_client();
        ch.join(client.clone());

        let resp = set_and_confirm(
            &ch,
            AdminSetRequest {
                var: Identifier::parse("%vote").unwrap(),
                value: json!(true),
                for_client: Some(client.id),
                key: None,
                overwrite: None,
            },
            None,
        )
        .await;
        assert_eq!(resp.code, ResponseCode::Ok);

        let fetched = fetch(
            &ch,
            AdminFetchRequest { var: Identifier::parse("%vote").unwrap(), for_client: Some(client.id), key: None },
            None,
        )
        .await;
        assert_eq!(fetched.value, Some(json!(true)));
    }
}
