//! The client-adapter contract (spec §4.5): only the boundary the channel
//! loop actually touches. The read loop, the socket, and the transport
//! itself are out of scope (spec §1) — what's in scope is the shape a
//! channel needs from "a client": a stable id, and a non-blocking way to
//! hand it an outbound [`Frame`] (spec §5: "a channel's `notify` places
//! frames on each listener's outbound queue; this should be treated as a
//! potentially blocking send" from the channel's point of view, but never
//! actually blocks it).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::proto::Frame;

/// Process-wide unique id for a connected client.
pub type ClientId = u64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next unique [`ClientId`]. Adapters call this once per
/// connection when constructing a [`ClientHandle`].
pub fn next_client_id() -> ClientId {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The non-blocking enqueue a channel's event loop needs from a client's
/// outbound write queue (spec §5). Implementations MUST NOT block the
/// caller; bound the queue and drop-with-error on overflow, or keep it
/// unbounded — either satisfies spec §5, a stuck client must never stall
/// a channel.
pub trait ClientSink: fmt::Debug + Send + Sync {
    fn send(&self, frame: Frame);
}

/// A connected client as seen by a channel: an id for slot ownership
/// checks, plus somewhere to send frames.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    sink: Arc<dyn ClientSink>,
}

impl ClientHandle {
    pub fn new(id: ClientId, sink: Arc<dyn ClientSink>) -> ClientHandle {
        ClientHandle { id, sink }
    }

    pub fn send(&self, frame: Frame) {
        self.sink.send(frame);
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientHandle {}

impl Hash for ClientHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// An in-memory [`ClientSink`] backed by an `mpsc` channel, plus a
/// constructor for a ready-to-use [`ClientHandle`]. Used by this crate's
/// own unit tests and by `tests/scenarios.rs`; gated behind the
/// `test-util` feature (rather than plain `#[cfg(test)]`) so integration
/// tests, which link the library as an external crate, can see it too.
#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::*;
    use tokio::sync::mpsc::UnboundedSender;

    #[derive(Debug)]
    pub struct ChannelSink(pub UnboundedSender<Frame>);

    impl ClientSink for ChannelSink {
        fn send(&self, frame: Frame) {
            let _ = self.0.send(frame);
        }
    }

    pub fn test_client() -> (ClientHandle, tokio::sync::mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = ClientHandle::new(next_client_id(), Arc::new(ChannelSink(tx)));
        (handle, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_client;

    #[test]
    fn distinct_clients_have_distinct_ids() {
        let (a, _rx_a) = test_client();
        let (b, _rx_b) = test_client();
        assert_ne!(a.id, b.id);
        assert_ne!(a, b);
    }
}
