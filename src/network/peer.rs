//! Peer Runtime
//!
//! Owns one participant end to end: runs the rendezvous, then drives the
//! established session on a dedicated task. Callers talk to it through a
//! command channel and observe it through a broadcast of [`SessionEvent`]s,
//! so rendering and input handling never touch the connection directly.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::network::handshake::{turn_away, Established, HandshakeEngine};
use crate::network::protocol::WireMessage;
use crate::network::room::DEFAULT_ROOM_PREFIX;
use crate::network::session::{GameSession, SessionEvent};
use crate::network::transport::{ConnEvent, Connection, Listener, Transport};
use crate::{HANDSHAKE_TIMEOUT_MS, ROOM_FULL_GRACE_MS, TYPING_IDLE_MS};

/// Tunables for one peer. The defaults are the interoperable values; change
/// them only when both sides change together.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Room id prefix to scan under.
    pub room_prefix: String,
    /// How long a guest waits for WELCOME before moving on.
    pub handshake_timeout: Duration,
    /// How long a FULL notice gets to flush before the connection closes.
    pub full_grace: Duration,
    /// Idle time after which a typing indicator is retracted.
    pub typing_idle: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            room_prefix: DEFAULT_ROOM_PREFIX.to_string(),
            handshake_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            full_grace: Duration::from_millis(ROOM_FULL_GRACE_MS),
            typing_idle: Duration::from_millis(TYPING_IDLE_MS),
        }
    }
}

/// An instruction from the local participant.
#[derive(Debug, Clone)]
pub enum PeerCommand {
    /// Place the local mark at a cell.
    PlayCell(usize),
    /// Send a chat line.
    Chat(String),
    /// The chat input field changed to this content.
    ChatInput(String),
    /// Start a new game after a decided one.
    Reset,
    /// Close the session and stop the peer task.
    Shutdown,
}

/// Handle to a running peer task.
///
/// Command submission is fire-and-forget: once the task is gone the session
/// is over anyway, and the broadcast already carried
/// [`SessionEvent::Disconnected`].
#[derive(Debug, Clone)]
pub struct PeerHandle {
    commands: mpsc::Sender<PeerCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl PeerHandle {
    /// A fresh subscription to the peer's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Place the local mark at `index`.
    pub async fn play_cell(&self, index: usize) {
        let _ = self.commands.send(PeerCommand::PlayCell(index)).await;
    }

    /// Send a chat line.
    pub async fn chat(&self, text: impl Into<String>) {
        let _ = self.commands.send(PeerCommand::Chat(text.into())).await;
    }

    /// Report the current content of the chat input field.
    pub async fn chat_input(&self, text: impl Into<String>) {
        let _ = self
            .commands
            .send(PeerCommand::ChatInput(text.into()))
            .await;
    }

    /// Start a new game after a decided one.
    pub async fn reset(&self) {
        let _ = self.commands.send(PeerCommand::Reset).await;
    }

    /// Close the session and stop the peer task.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(PeerCommand::Shutdown).await;
    }
}

/// Spawn a peer on `transport`.
///
/// The returned receiver was subscribed before the task started, so it is
/// guaranteed to observe [`SessionEvent::Established`].
pub fn spawn_peer<T: Transport>(
    transport: T,
    config: PeerConfig,
) -> (PeerHandle, broadcast::Receiver<SessionEvent>) {
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let (events_tx, events_rx) = broadcast::channel(64);

    let handle = PeerHandle {
        commands: commands_tx,
        events: events_tx.clone(),
    };
    tokio::spawn(run_peer(transport, config, commands_rx, events_tx));

    (handle, events_rx)
}

async fn run_peer<T: Transport>(
    transport: T,
    config: PeerConfig,
    commands: mpsc::Receiver<PeerCommand>,
    events: broadcast::Sender<SessionEvent>,
) {
    let engine = HandshakeEngine::new(transport, config.clone());
    let established = match engine.establish().await {
        Ok(established) => established,
        Err(err) => {
            error!(%err, "rendezvous failed");
            let _ = events.send(SessionEvent::Disconnected);
            return;
        }
    };

    let _ = events.send(SessionEvent::Established {
        role: established.role,
        symbol: established.symbol,
        room: established.room.clone(),
    });

    run_session(established, config, commands, events).await;
}

/// What the event loop decided to do with the connection this iteration.
/// Computed inside the select, executed after it, when the connection is no
/// longer borrowed by the select's own futures.
enum Step {
    Send(Vec<WireMessage>),
    DropListener,
    PeerGone,
    Shutdown,
}

/// Drive an established session until either side ends it.
async fn run_session<T: Transport>(
    established: Established<T>,
    config: PeerConfig,
    mut commands: mpsc::Receiver<PeerCommand>,
    events: broadcast::Sender<SessionEvent>,
) {
    let Established {
        room,
        symbol,
        mut conn,
        mut listener,
        ..
    } = established;
    let mut session = GameSession::new(symbol);
    let mut typing = TypingTracker::new(config.typing_idle);

    loop {
        let step = tokio::select! {
            event = conn.next_event() => match event {
                ConnEvent::Message(msg) => {
                    for ev in session.apply_remote(msg) {
                        let _ = events.send(ev);
                    }
                    Step::Send(Vec::new())
                }
                ConnEvent::LivenessLost => {
                    info!(%room, "connectivity lost, closing session");
                    Step::PeerGone
                }
                ConnEvent::Closed => {
                    info!(%room, "peer closed the session");
                    Step::PeerGone
                }
            },

            cmd = commands.recv() => match cmd {
                Some(PeerCommand::PlayCell(index)) => {
                    match session.local_move(index) {
                        Some((msg, evs)) => {
                            for ev in evs {
                                let _ = events.send(ev);
                            }
                            Step::Send(vec![msg])
                        }
                        None => {
                            debug!(index, "move rejected");
                            Step::Send(Vec::new())
                        }
                    }
                }
                Some(PeerCommand::Chat(text)) => {
                    match session.local_chat(text) {
                        Some((msg, ev)) => {
                            let _ = events.send(ev);
                            let mut out = vec![msg];
                            // Sending a line empties the input field.
                            if typing.clear().is_some() {
                                out.push(WireMessage::Typing { is_typing: false });
                            }
                            Step::Send(out)
                        }
                        None => Step::Send(Vec::new()),
                    }
                }
                Some(PeerCommand::ChatInput(text)) => {
                    match typing.on_input(!text.is_empty(), Instant::now()) {
                        Some(is_typing) => Step::Send(vec![WireMessage::Typing { is_typing }]),
                        None => Step::Send(Vec::new()),
                    }
                }
                Some(PeerCommand::Reset) => {
                    match session.local_reset() {
                        Some((msg, evs)) => {
                            for ev in evs {
                                let _ = events.send(ev);
                            }
                            Step::Send(vec![msg])
                        }
                        None => {
                            debug!("reset rejected, game not decided");
                            Step::Send(Vec::new())
                        }
                    }
                }
                Some(PeerCommand::Shutdown) | None => Step::Shutdown,
            },

            // Hosts keep their listener bound so latecomers learn the room
            // is occupied instead of hanging until their timeout.
            extra = accept_next(&mut listener) => match extra {
                Some(extra) => {
                    debug!(%room, "turning away a latecomer");
                    tokio::spawn(turn_away(extra, config.full_grace));
                    Step::Send(Vec::new())
                }
                None => Step::DropListener,
            },

            _ = typing_expiry(typing.deadline()) => match typing.clear() {
                Some(is_typing) => Step::Send(vec![WireMessage::Typing { is_typing }]),
                None => Step::Send(Vec::new()),
            },
        };

        match step {
            Step::Send(messages) => {
                for msg in messages {
                    if conn.send(msg).await.is_err() {
                        // The channel is gone even though no Closed event
                        // has been observed yet.
                        for ev in session.peer_left() {
                            let _ = events.send(ev);
                        }
                        return;
                    }
                }
            }
            Step::DropListener => listener = None,
            Step::PeerGone => {
                conn.close();
                for ev in session.peer_left() {
                    let _ = events.send(ev);
                }
                return;
            }
            Step::Shutdown => {
                info!(%room, "shutting down");
                conn.close();
                let _ = events.send(SessionEvent::Disconnected);
                return;
            }
        }
    }
}

/// Accept on the listener if there still is one, otherwise park.
async fn accept_next<L: Listener>(listener: &mut Option<L>) -> Option<L::Conn> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the typing indicator expires, or park if none is pending.
async fn typing_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Edge-triggered typing indicator.
///
/// `true` goes out when the input turns non-empty, `false` when it empties,
/// is sent as a chat line, or has been idle past the configured window.
/// Repeated keystrokes only refresh the expiry.
#[derive(Debug)]
struct TypingTracker {
    idle: Duration,
    active: bool,
    deadline: Option<Instant>,
}

impl TypingTracker {
    fn new(idle: Duration) -> Self {
        Self {
            idle,
            active: false,
            deadline: None,
        }
    }

    /// Record an input change. Returns the indicator value to transmit, if
    /// the edge requires one.
    fn on_input(&mut self, non_empty: bool, now: Instant) -> Option<bool> {
        if non_empty {
            self.deadline = Some(now + self.idle);
            if self.active {
                None
            } else {
                self.active = true;
                Some(true)
            }
        } else {
            self.clear()
        }
    }

    /// Retract the indicator. Returns `Some(false)` if it was showing.
    fn clear(&mut self) -> Option<bool> {
        self.deadline = None;
        if self.active {
            self.active = false;
            Some(false)
        } else {
            None
        }
    }

    fn deadline(&self) -> Option<Instant> {
        if self.active {
            self.deadline
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Outcome, Symbol};
    use crate::network::handshake::Role;
    use crate::network::memory::MemoryHub;
    use crate::network::room::RoomId;
    use crate::network::session::OPPONENT_LEFT_NOTICE;
    use crate::network::transport::Endpoint;

    type Events = broadcast::Receiver<SessionEvent>;

    /// Receive events until one matches.
    async fn next_where(rx: &mut Events, f: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        loop {
            let ev = rx.recv().await.unwrap();
            if f(&ev) {
                return ev;
            }
        }
    }

    /// Spawn two peers on one hub and return them host-first.
    async fn paired_peers(hub: &MemoryHub) -> ((PeerHandle, Events), (PeerHandle, Events)) {
        let (handle_a, mut rx_a) = spawn_peer(hub.clone(), PeerConfig::default());
        let (handle_b, mut rx_b) = spawn_peer(hub.clone(), PeerConfig::default());

        let role_of = |ev: &SessionEvent| match ev {
            SessionEvent::Established { role, .. } => Some(*role),
            _ => None,
        };
        let a = next_where(&mut rx_a, |e| role_of(e).is_some()).await;
        let b = next_where(&mut rx_b, |e| role_of(e).is_some()).await;

        match (role_of(&a), role_of(&b)) {
            (Some(Role::Host), Some(Role::Guest)) => ((handle_a, rx_a), (handle_b, rx_b)),
            (Some(Role::Guest), Some(Role::Host)) => ((handle_b, rx_b), (handle_a, rx_a)),
            other => panic!("expected one host and one guest, got {other:?}"),
        }
    }

    /// Drive a full game: X takes the top row while O answers on row two.
    async fn play_top_row_win(
        host: &PeerHandle,
        host_rx: &mut Events,
        guest: &PeerHandle,
        guest_rx: &mut Events,
    ) {
        for (cell, answer) in [(0usize, Some(3usize)), (1, Some(4)), (2, None)] {
            host.play_cell(cell).await;
            next_where(guest_rx, |e| {
                matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
            })
            .await;

            if let Some(answer) = answer {
                guest.play_cell(answer).await;
                next_where(host_rx, |e| {
                    matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
                })
                .await;
            }
        }
    }

    #[tokio::test]
    async fn test_two_peers_play_to_a_win() {
        let hub = MemoryHub::new();
        let ((host, mut host_rx), (guest, mut guest_rx)) = paired_peers(&hub).await;

        play_top_row_win(&host, &mut host_rx, &guest, &mut guest_rx).await;

        for rx in [&mut host_rx, &mut guest_rx] {
            let over = next_where(rx, |e| matches!(e, SessionEvent::GameOver { .. })).await;
            let SessionEvent::GameOver { outcome, score } = over else {
                unreachable!()
            };
            assert_eq!(outcome, Outcome::Winner(Symbol::X));
            assert_eq!(score.wins(Symbol::X), 1);
            assert_eq!(score.wins(Symbol::O), 0);
        }
    }

    #[tokio::test]
    async fn test_reset_hands_the_start_to_the_other_side() {
        let hub = MemoryHub::new();
        let ((host, mut host_rx), (guest, mut guest_rx)) = paired_peers(&hub).await;
        play_top_row_win(&host, &mut host_rx, &guest, &mut guest_rx).await;

        // Game 1 started with X, so game 2 starts with O: the guest.
        host.reset().await;
        let cleared = next_where(&mut host_rx, |e| {
            matches!(e, SessionEvent::BoardCleared { .. })
        })
        .await;
        assert!(matches!(
            cleared,
            SessionEvent::BoardCleared { my_turn: false }
        ));
        let cleared = next_where(&mut guest_rx, |e| {
            matches!(e, SessionEvent::BoardCleared { .. })
        })
        .await;
        assert!(matches!(
            cleared,
            SessionEvent::BoardCleared { my_turn: true }
        ));

        // And the guest can indeed open the new game.
        guest.play_cell(4).await;
        next_where(&mut host_rx, |e| {
            matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_indicator_expires_after_idle() {
        let hub = MemoryHub::new();
        let ((_host, mut host_rx), (guest, _guest_rx)) = paired_peers(&hub).await;

        guest.chat_input("h").await;
        let ev = next_where(&mut host_rx, |e| {
            matches!(e, SessionEvent::OpponentTyping(_))
        })
        .await;
        assert!(matches!(ev, SessionEvent::OpponentTyping(true)));

        // No further input: the indicator retracts on its own.
        let ev = next_where(&mut host_rx, |e| {
            matches!(e, SessionEvent::OpponentTyping(_))
        })
        .await;
        assert!(matches!(ev, SessionEvent::OpponentTyping(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sending_a_chat_line_retracts_the_indicator() {
        let hub = MemoryHub::new();
        let ((_host, mut host_rx), (guest, _guest_rx)) = paired_peers(&hub).await;

        guest.chat_input("hello").await;
        next_where(&mut host_rx, |e| {
            matches!(e, SessionEvent::OpponentTyping(true))
        })
        .await;

        guest.chat("hello").await;
        let chat = next_where(&mut host_rx, |e| matches!(e, SessionEvent::Chat(_))).await;
        let SessionEvent::Chat(line) = chat else {
            unreachable!()
        };
        assert_eq!(line.text, "hello");
        assert!(!line.local);
        assert!(!line.system);

        next_where(&mut host_rx, |e| {
            matches!(e, SessionEvent::OpponentTyping(false))
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_latecomer_is_turned_away_from_live_session() {
        let hub = MemoryHub::new();
        let ((host, _host_rx), (_guest, mut guest_rx)) = paired_peers(&hub).await;

        let endpoint = hub.open_endpoint().await.unwrap();
        let mut late = endpoint
            .connect(&RoomId::for_index(DEFAULT_ROOM_PREFIX, 1))
            .await
            .unwrap();

        assert_eq!(
            late.next_event().await,
            ConnEvent::Message(WireMessage::Full)
        );
        assert_eq!(late.next_event().await, ConnEvent::Closed);

        // The established session is undisturbed.
        host.play_cell(0).await;
        next_where(&mut guest_rx, |e| {
            matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
        })
        .await;
    }

    #[tokio::test]
    async fn test_liveness_loss_ends_the_session_with_notice() {
        let hub = MemoryHub::new();
        // Host the room by hand so the test keeps a handle on the raw
        // connection shared with the peer under test.
        let mut listener = hub
            .open_listener(&RoomId::for_index(DEFAULT_ROOM_PREFIX, 1))
            .await
            .unwrap();
        let (_peer, mut rx) = spawn_peer(hub.clone(), PeerConfig::default());

        let mut conn = listener.accept().await.unwrap();
        loop {
            if conn.next_event().await == ConnEvent::Message(WireMessage::Hello) {
                conn.send(WireMessage::Welcome).await.unwrap();
                break;
            }
        }
        next_where(&mut rx, |e| matches!(e, SessionEvent::Established { .. })).await;

        // Underlying connectivity degrades mid-session.
        conn.degrade();

        let chat = next_where(&mut rx, |e| matches!(e, SessionEvent::Chat(_))).await;
        let SessionEvent::Chat(line) = chat else {
            unreachable!()
        };
        assert!(line.system);
        assert_eq!(line.text, OPPONENT_LEFT_NOTICE);
        next_where(&mut rx, |e| matches!(e, SessionEvent::Disconnected)).await;

        // The peer force-closed its half, so the raw side is dead too. This
        // half sees its own liveness-loss report before the close lands.
        loop {
            match conn.next_event().await {
                ConnEvent::Closed => break,
                ConnEvent::LivenessLost => continue,
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_notifies_the_other_side() {
        let hub = MemoryHub::new();
        let ((host, mut host_rx), (_guest, mut guest_rx)) = paired_peers(&hub).await;

        host.shutdown().await;
        next_where(&mut host_rx, |e| matches!(e, SessionEvent::Disconnected)).await;

        let chat = next_where(&mut guest_rx, |e| matches!(e, SessionEvent::Chat(_))).await;
        let SessionEvent::Chat(line) = chat else {
            unreachable!()
        };
        assert!(line.system);
        assert_eq!(line.text, OPPONENT_LEFT_NOTICE);
        next_where(&mut guest_rx, |e| matches!(e, SessionEvent::Disconnected)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_tracker_edges() {
        let idle = Duration::from_millis(TYPING_IDLE_MS);
        let mut tracker = TypingTracker::new(idle);
        let now = Instant::now();

        assert_eq!(tracker.on_input(true, now), Some(true));
        // Further keystrokes refresh silently.
        assert_eq!(tracker.on_input(true, now + idle / 2), None);
        assert!(tracker.deadline().unwrap() > now + idle);

        // Emptying the field retracts.
        assert_eq!(tracker.on_input(false, now + idle), Some(false));
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.clear(), None);

        assert_eq!(tracker.on_input(true, now), Some(true));
        assert_eq!(tracker.clear(), Some(false));
    }
}
