//! Channel Adapter
//!
//! The point-to-point transport capability the rendezvous and session layers
//! are written against. The crate does not implement NAT traversal,
//! encryption or signaling; it assumes something that can bind a named,
//! addressable listening endpoint, open outbound connections to named
//! endpoints, and report open/data/close events. [`crate::network::memory`]
//! is the in-process reference implementation.

use crate::network::protocol::WireMessage;
use crate::network::room::RoomId;
use std::future::Future;

/// Transport-level failures.
///
/// `IdTaken` is the one failure the rendezvous logic depends on being
/// distinct: it is the collision signal that turns a would-be host into a
/// guest. Everything else is either a closed channel or unclassified.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The named id is already bound by another listener.
    #[error("room id `{0}` is already bound")]
    IdTaken(RoomId),

    /// No listener is bound at the dialed id.
    #[error("no listener bound at `{0}`")]
    ConnectRefused(RoomId),

    /// The connection is closed (or closed while sending).
    #[error("connection closed")]
    Closed,

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// An event on an open connection, delivered one at a time in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    /// A decoded message from the peer.
    Message(WireMessage),
    /// The transport reports degraded underlying connectivity. The owner
    /// is expected to force-close the connection.
    LivenessLost,
    /// The connection is closed; no further events follow.
    Closed,
}

/// A transport that can bind named listeners and open anonymous endpoints.
pub trait Transport: Send + Sync + 'static {
    /// Listener type produced by [`Transport::open_listener`].
    type Listener: Listener<Conn = Self::Conn>;
    /// Endpoint type produced by [`Transport::open_endpoint`].
    type Endpoint: Endpoint<Conn = Self::Conn>;
    /// Connection type shared by listeners and endpoints.
    type Conn: Connection;

    /// Bind a listening endpoint at `id`. Fails with
    /// [`TransportError::IdTaken`] when the id is already bound.
    fn open_listener(
        &self,
        id: &RoomId,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;

    /// Open an anonymous endpoint capable of outbound connections.
    fn open_endpoint(&self) -> impl Future<Output = Result<Self::Endpoint, TransportError>> + Send;
}

/// A bound listening endpoint. Dropping it releases the id.
pub trait Listener: Send + 'static {
    /// Connection type yielded by [`Listener::accept`].
    type Conn: Connection;

    /// The next inbound connection, or `None` if the listener is defunct.
    fn accept(&mut self) -> impl Future<Output = Option<Self::Conn>> + Send;

    /// The id this listener is bound at.
    fn id(&self) -> &RoomId;
}

/// An anonymous endpoint for outbound connections. Dropping it discards it.
pub trait Endpoint: Send + Sync + 'static {
    /// Connection type yielded by [`Endpoint::connect`].
    type Conn: Connection;

    /// Open an outbound connection to the listener bound at `id`.
    fn connect(
        &self,
        id: &RoomId,
    ) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}

/// An open bidirectional connection carrying [`WireMessage`]s.
pub trait Connection: Send + 'static {
    /// Send a message to the peer.
    fn send(&self, msg: WireMessage) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// The next event on this connection. After [`ConnEvent::Closed`] is
    /// returned once, every later call returns it again.
    fn next_event(&mut self) -> impl Future<Output = ConnEvent> + Send;

    /// Close the connection. Synchronous and idempotent; queued sends on
    /// either side fail afterwards.
    fn close(&self);
}
