//! In-Process Transport
//!
//! Reference implementation of the channel capability, backed by tokio
//! channels. Two peers in the same process rendezvous through a shared
//! [`MemoryHub`]. Used by the test suite and the demo binary; a production
//! build would substitute a real peer-to-peer transport behind the same
//! traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

use crate::network::protocol::WireMessage;
use crate::network::room::RoomId;
use crate::network::transport::{ConnEvent, Connection, Endpoint, Listener, Transport, TransportError};

type RoomTable = HashMap<RoomId, mpsc::UnboundedSender<MemoryConnection>>;

fn lock_rooms(rooms: &Mutex<RoomTable>) -> MutexGuard<'_, RoomTable> {
    // A poisoned table is still structurally valid.
    rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared in-process rendezvous space: a table from bound room ids to the
/// listener waiting there. Cloning yields another handle to the same space.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    rooms: Arc<Mutex<RoomTable>>,
}

impl MemoryHub {
    /// A fresh hub with no bound rooms.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for MemoryHub {
    type Listener = MemoryListener;
    type Endpoint = MemoryEndpoint;
    type Conn = MemoryConnection;

    async fn open_listener(&self, id: &RoomId) -> Result<MemoryListener, TransportError> {
        let mut rooms = lock_rooms(&self.rooms);
        if let Some(existing) = rooms.get(id) {
            if !existing.is_closed() {
                return Err(TransportError::IdTaken(id.clone()));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        rooms.insert(id.clone(), tx);

        Ok(MemoryListener {
            id: id.clone(),
            inbound: rx,
            rooms: Arc::clone(&self.rooms),
        })
    }

    async fn open_endpoint(&self) -> Result<MemoryEndpoint, TransportError> {
        Ok(MemoryEndpoint {
            rooms: Arc::clone(&self.rooms),
        })
    }
}

/// A bound room in a [`MemoryHub`]. Dropping it releases the id.
#[derive(Debug)]
pub struct MemoryListener {
    id: RoomId,
    inbound: mpsc::UnboundedReceiver<MemoryConnection>,
    rooms: Arc<Mutex<RoomTable>>,
}

impl Listener for MemoryListener {
    type Conn = MemoryConnection;

    async fn accept(&mut self) -> Option<MemoryConnection> {
        self.inbound.recv().await
    }

    fn id(&self) -> &RoomId {
        &self.id
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        lock_rooms(&self.rooms).remove(&self.id);
    }
}

/// An anonymous outbound endpoint on a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryEndpoint {
    rooms: Arc<Mutex<RoomTable>>,
}

impl Endpoint for MemoryEndpoint {
    type Conn = MemoryConnection;

    async fn connect(&self, id: &RoomId) -> Result<MemoryConnection, TransportError> {
        let (local, remote) = MemoryConnection::pair();
        let rooms = lock_rooms(&self.rooms);
        match rooms.get(id) {
            Some(tx) if tx.send(remote).is_ok() => Ok(local),
            _ => Err(TransportError::ConnectRefused(id.clone())),
        }
    }
}

/// One half of an in-process connection.
///
/// Closing either half closes the whole connection; dropping a half closes
/// it too. Buffered messages are still delivered ahead of the close.
#[derive(Debug)]
pub struct MemoryConnection {
    tx: mpsc::UnboundedSender<WireMessage>,
    rx: mpsc::UnboundedReceiver<WireMessage>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    degraded_tx: Arc<watch::Sender<bool>>,
    degraded_rx: watch::Receiver<bool>,
    liveness_reported: bool,
}

impl MemoryConnection {
    fn pair() -> (MemoryConnection, MemoryConnection) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);
        let (degraded_tx, degraded_rx) = watch::channel(false);
        let degraded_tx = Arc::new(degraded_tx);

        let a = MemoryConnection {
            tx: a_tx,
            rx: a_rx,
            closed_tx: Arc::clone(&closed_tx),
            closed_rx: closed_rx.clone(),
            degraded_tx: Arc::clone(&degraded_tx),
            degraded_rx: degraded_rx.clone(),
            liveness_reported: false,
        };
        let b = MemoryConnection {
            tx: b_tx,
            rx: b_rx,
            closed_tx,
            closed_rx,
            degraded_tx,
            degraded_rx,
            liveness_reported: false,
        };
        (a, b)
    }

    /// Simulate loss of underlying connectivity. Both halves observe
    /// [`ConnEvent::LivenessLost`] on their next poll.
    pub fn degrade(&self) {
        let _ = self.degraded_tx.send(true);
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        if *self.closed_rx.borrow() {
            return Err(TransportError::Closed);
        }
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }

    async fn next_event(&mut self) -> ConnEvent {
        loop {
            // Deliver buffered messages ahead of any close.
            match self.rx.try_recv() {
                Ok(msg) => return ConnEvent::Message(msg),
                Err(mpsc::error::TryRecvError::Disconnected) => return ConnEvent::Closed,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }
            if *self.closed_rx.borrow() {
                return ConnEvent::Closed;
            }
            if *self.degraded_rx.borrow() && !self.liveness_reported {
                self.liveness_reported = true;
                return ConnEvent::LivenessLost;
            }

            tokio::select! {
                biased;
                msg = self.rx.recv() => {
                    return match msg {
                        Some(msg) => ConnEvent::Message(msg),
                        None => ConnEvent::Closed,
                    };
                }
                res = self.closed_rx.changed() => {
                    if res.is_err() {
                        return ConnEvent::Closed;
                    }
                }
                res = self.degraded_rx.changed() => {
                    if res.is_err() {
                        return ConnEvent::Closed;
                    }
                }
            }
        }
    }

    fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Symbol;
    use crate::network::room::DEFAULT_ROOM_PREFIX;

    fn room(index: u32) -> RoomId {
        RoomId::for_index(DEFAULT_ROOM_PREFIX, index)
    }

    #[tokio::test]
    async fn test_second_bind_collides() {
        let hub = MemoryHub::new();
        let _first = hub.open_listener(&room(1)).await.unwrap();

        let second = hub.open_listener(&room(1)).await;
        assert!(matches!(second, Err(TransportError::IdTaken(id)) if id == room(1)));
    }

    #[tokio::test]
    async fn test_dropping_listener_frees_the_id() {
        let hub = MemoryHub::new();
        let first = hub.open_listener(&room(1)).await.unwrap();
        drop(first);

        assert!(hub.open_listener(&room(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_to_unbound_room_is_refused() {
        let hub = MemoryHub::new();
        let endpoint = hub.open_endpoint().await.unwrap();

        let result = endpoint.connect(&room(9)).await;
        assert!(matches!(result, Err(TransportError::ConnectRefused(_))));
    }

    #[tokio::test]
    async fn test_messages_flow_both_ways() {
        let hub = MemoryHub::new();
        let mut listener = hub.open_listener(&room(1)).await.unwrap();
        let endpoint = hub.open_endpoint().await.unwrap();

        let mut guest = endpoint.connect(&room(1)).await.unwrap();
        let mut host = listener.accept().await.unwrap();

        guest.send(WireMessage::Hello).await.unwrap();
        assert_eq!(host.next_event().await, ConnEvent::Message(WireMessage::Hello));

        host.send(WireMessage::Welcome).await.unwrap();
        assert_eq!(guest.next_event().await, ConnEvent::Message(WireMessage::Welcome));
    }

    #[tokio::test]
    async fn test_close_reaches_both_halves() {
        let hub = MemoryHub::new();
        let mut listener = hub.open_listener(&room(1)).await.unwrap();
        let endpoint = hub.open_endpoint().await.unwrap();
        let guest = endpoint.connect(&room(1)).await.unwrap();
        let mut host = listener.accept().await.unwrap();

        guest.close();
        assert_eq!(host.next_event().await, ConnEvent::Closed);
        assert!(host.send(WireMessage::Welcome).await.is_err());
        assert!(guest.send(WireMessage::Hello).await.is_err());
    }

    #[tokio::test]
    async fn test_buffered_messages_beat_the_close() {
        let hub = MemoryHub::new();
        let mut listener = hub.open_listener(&room(1)).await.unwrap();
        let endpoint = hub.open_endpoint().await.unwrap();
        let guest = endpoint.connect(&room(1)).await.unwrap();
        let mut host = listener.accept().await.unwrap();

        guest
            .send(WireMessage::Move {
                index: 0,
                symbol: Symbol::O,
            })
            .await
            .unwrap();
        drop(guest);

        assert_eq!(
            host.next_event().await,
            ConnEvent::Message(WireMessage::Move {
                index: 0,
                symbol: Symbol::O,
            })
        );
        assert_eq!(host.next_event().await, ConnEvent::Closed);
    }

    #[tokio::test]
    async fn test_degrade_reports_liveness_loss_once() {
        let hub = MemoryHub::new();
        let mut listener = hub.open_listener(&room(1)).await.unwrap();
        let endpoint = hub.open_endpoint().await.unwrap();
        let mut guest = endpoint.connect(&room(1)).await.unwrap();
        let mut host = listener.accept().await.unwrap();

        guest.degrade();
        assert_eq!(host.next_event().await, ConnEvent::LivenessLost);
        assert_eq!(guest.next_event().await, ConnEvent::LivenessLost);

        // Still usable until someone actually closes it.
        guest.send(WireMessage::Hello).await.unwrap();
        assert_eq!(host.next_event().await, ConnEvent::Message(WireMessage::Hello));

        host.close();
        assert_eq!(guest.next_event().await, ConnEvent::Closed);
    }
}
