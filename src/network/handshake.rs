//! Rendezvous Handshake
//!
//! Deterministic pairing without a lobby server. Every participant walks the
//! same room id sequence: try to bind the current id and host, or find it
//! taken and join as guest. A bind collision is therefore not an error, it
//! is the pairing signal. Guests confirm the pairing with a HELLO/WELCOME
//! exchange; a full room, a dead channel or a stalled host all advance the
//! guest to the next id.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::game::board::Symbol;
use crate::network::peer::PeerConfig;
use crate::network::protocol::WireMessage;
use crate::network::room::{RoomId, RoomSequencer};
use crate::network::transport::{
    ConnEvent, Connection, Endpoint, Listener, Transport, TransportError,
};

/// Which side of the handshake this participant ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bound the room id first; plays X.
    Host,
    /// Found the id taken and joined; plays O.
    Guest,
}

impl Role {
    /// The mark this role plays with.
    pub fn symbol(self) -> Symbol {
        match self {
            Role::Host => Symbol::X,
            Role::Guest => Symbol::O,
        }
    }
}

/// Where the rendezvous currently stands. Purely observational; the engine
/// drives itself off the transport events, not off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Walking the room sequence looking for a bind or a host.
    Searching,
    /// Connected to a host, HELLO sent, awaiting WELCOME.
    Connecting,
    /// Hosting a room, waiting for a guest.
    Waiting,
    /// Session established.
    Playing,
    /// Session ended; a new rendezvous needs a fresh engine.
    Disconnected,
}

/// Rendezvous failures that end the search outright.
///
/// Collisions, full rooms and timeouts are not errors, they advance the
/// scan; only the transport itself giving up surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    /// The transport failed in a way the scan cannot route around.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The bound listener stopped yielding connections while hosting.
    #[error("listener closed while hosting")]
    ListenerClosed,
}

/// A successfully paired session, ready to be driven.
///
/// Hosts keep their listener so latecomers can still be turned away with
/// FULL for the lifetime of the session; guests never had one.
pub struct Established<T: Transport> {
    /// Negotiated role.
    pub role: Role,
    /// The mark this side plays with, fixed by the role.
    pub symbol: Symbol,
    /// The room both sides met in.
    pub room: RoomId,
    /// The established connection to the peer.
    pub conn: T::Conn,
    /// The host's still-bound listener, `None` on the guest side.
    pub listener: Option<T::Listener>,
}

/// Walks the room sequence until a session is established.
///
/// Consumed by [`HandshakeEngine::establish`]; one engine pairs one session.
pub struct HandshakeEngine<T: Transport> {
    transport: T,
    config: PeerConfig,
    rooms: RoomSequencer,
    state: SessionState,
}

impl<T: Transport> HandshakeEngine<T> {
    /// A fresh engine starting at the first room of `config`'s prefix.
    pub fn new(transport: T, config: PeerConfig) -> Self {
        let rooms = RoomSequencer::new(config.room_prefix.clone());
        Self {
            transport,
            config,
            rooms,
            state: SessionState::Searching,
        }
    }

    /// Current rendezvous state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "rendezvous state change");
        self.state = next;
    }

    /// Run the rendezvous to completion.
    ///
    /// Loops over the room sequence indefinitely: there is no give-up
    /// policy, the caller bounds the search by dropping the future. Returns
    /// the established session or the first unroutable transport failure.
    pub async fn establish(mut self) -> Result<Established<T>, RendezvousError> {
        loop {
            let room = self.rooms.current();
            match self.transport.open_listener(&room).await {
                Ok(listener) => return self.host(room, listener).await,
                Err(TransportError::IdTaken(_)) => {
                    debug!(%room, "room is hosted, joining as guest");
                    match self.join(&room).await? {
                        Some(conn) => {
                            self.set_state(SessionState::Playing);
                            info!(%room, "session established as guest");
                            return Ok(Established {
                                role: Role::Guest,
                                symbol: Role::Guest.symbol(),
                                room,
                                conn,
                                listener: None,
                            });
                        }
                        None => {
                            self.set_state(SessionState::Searching);
                            self.rooms.advance();
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Host `room`: accept candidates until one completes HELLO/WELCOME.
    async fn host(
        &mut self,
        room: RoomId,
        mut listener: T::Listener,
    ) -> Result<Established<T>, RendezvousError> {
        self.set_state(SessionState::Waiting);
        info!(%room, "hosting, waiting for a guest");

        loop {
            let Some(candidate) = listener.accept().await else {
                return Err(RendezvousError::ListenerClosed);
            };
            debug!(%room, "inbound connection, negotiating");

            if let Some(conn) = self.negotiate(&mut listener, candidate).await? {
                self.set_state(SessionState::Playing);
                info!(%room, "session established as host");
                return Ok(Established {
                    role: Role::Host,
                    symbol: Role::Host.symbol(),
                    room,
                    conn,
                    listener: Some(listener),
                });
            }
        }
    }

    /// Drive one candidate through the inner handshake. Connections arriving
    /// while a candidate is being negotiated are turned away with FULL.
    async fn negotiate(
        &mut self,
        listener: &mut T::Listener,
        mut candidate: T::Conn,
    ) -> Result<Option<T::Conn>, RendezvousError> {
        loop {
            // The select's futures borrow the candidate and the listener, so
            // the outcome is handled once it has resolved and released them.
            let polled = tokio::select! {
                event = candidate.next_event() => Polled::Candidate(event),
                extra = listener.accept() => Polled::Inbound(extra),
            };

            match polled {
                Polled::Candidate(ConnEvent::Message(WireMessage::Hello)) => {
                    if candidate.send(WireMessage::Welcome).await.is_err() {
                        debug!("candidate went away while welcoming");
                        return Ok(None);
                    }
                    return Ok(Some(candidate));
                }
                Polled::Candidate(ConnEvent::Message(msg)) => {
                    debug!(?msg, "unexpected message before HELLO, ignoring");
                }
                Polled::Candidate(ConnEvent::LivenessLost | ConnEvent::Closed) => {
                    candidate.close();
                    debug!("candidate went away before HELLO");
                    return Ok(None);
                }
                Polled::Inbound(Some(extra)) => {
                    debug!("room occupied, turning extra connection away");
                    tokio::spawn(turn_away(extra, self.config.full_grace));
                }
                Polled::Inbound(None) => return Err(RendezvousError::ListenerClosed),
            }
        }
    }

    /// One guest attempt at `room`. `Ok(None)` means move on to the next
    /// room: the room was full, the channel died, or the host never answered
    /// within the handshake timeout. Only collisions, full rooms, closes and
    /// timeouts advance the scan; an endpoint the transport cannot provide
    /// is not routable around and abandons the rendezvous.
    async fn join(&mut self, room: &RoomId) -> Result<Option<T::Conn>, RendezvousError> {
        let endpoint = match self.transport.open_endpoint().await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                error!(%room, %err, "endpoint unavailable, abandoning rendezvous");
                return Err(err.into());
            }
        };
        self.set_state(SessionState::Connecting);

        let attempt = async {
            let mut conn = match endpoint.connect(room).await {
                Ok(conn) => conn,
                Err(err) => {
                    debug!(%room, %err, "connect failed");
                    return None;
                }
            };
            if conn.send(WireMessage::Hello).await.is_err() {
                debug!(%room, "channel closed while greeting");
                return None;
            }
            loop {
                match conn.next_event().await {
                    ConnEvent::Message(WireMessage::Welcome) => return Some(conn),
                    ConnEvent::Message(WireMessage::Full) => {
                        debug!(%room, "room is full");
                        return None;
                    }
                    ConnEvent::Message(msg) => {
                        debug!(?msg, "unexpected message before WELCOME, ignoring");
                    }
                    ConnEvent::LivenessLost | ConnEvent::Closed => {
                        debug!(%room, "channel lost before WELCOME");
                        return None;
                    }
                }
            }
        };

        match timeout(self.config.handshake_timeout, attempt).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                debug!(%room, "handshake timed out");
                Ok(None)
            }
        }
    }
}

/// Outcome of one poll of the host's negotiation select.
enum Polled<C> {
    Candidate(ConnEvent),
    Inbound(Option<C>),
}

/// Refuse a connection to an occupied room: tell it FULL, give the message a
/// grace period to flush, then close.
pub(crate) async fn turn_away<C: Connection>(conn: C, grace: Duration) {
    if conn.send(WireMessage::Full).await.is_err() {
        return;
    }
    tokio::time::sleep(grace).await;
    conn.close();
}
