//! Grid Duel Demo
//!
//! Spawns two peers on an in-process hub, lets them rendezvous, and plays a
//! scripted match with chat, a reset and a clean shutdown.

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use grid_duel::{
    network::handshake::Role,
    network::peer::{spawn_peer, PeerConfig, PeerHandle},
    network::session::SessionEvent,
    MemoryHub, Outcome, Symbol, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Grid Duel v{}", VERSION);

    let hub = MemoryHub::new();
    let (peer_a, rx_a) = spawn_peer(hub.clone(), PeerConfig::default());
    let (peer_b, rx_b) = spawn_peer(hub.clone(), PeerConfig::default());

    // Both walk the same room sequence; one ends up hosting, one joining.
    let (host, mut host_rx, guest, mut guest_rx) =
        sort_by_role((peer_a, rx_a), (peer_b, rx_b)).await?;

    // A bit of chat before the first move.
    guest.chat_input("g").await;
    guest.chat("gl hf").await;
    let SessionEvent::Chat(line) =
        wait_for(&mut host_rx, |e| matches!(e, SessionEvent::Chat(_))).await?
    else {
        unreachable!()
    };
    info!("host sees chat: {}", line.text);

    // X takes the main diagonal while O answers on the top row.
    for (host_cell, guest_cell) in [(0usize, Some(1usize)), (4, Some(2)), (8, None)] {
        host.play_cell(host_cell).await;
        wait_for(&mut guest_rx, |e| {
            matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
        })
        .await?;
        info!("host played cell {host_cell}");

        if let Some(guest_cell) = guest_cell {
            guest.play_cell(guest_cell).await;
            wait_for(&mut host_rx, |e| {
                matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
            })
            .await?;
            info!("guest played cell {guest_cell}");
        }
    }

    let SessionEvent::GameOver { outcome, score } =
        wait_for(&mut host_rx, |e| matches!(e, SessionEvent::GameOver { .. })).await?
    else {
        unreachable!()
    };
    match outcome {
        Outcome::Winner(symbol) => info!("game over, {symbol} wins"),
        Outcome::Draw => info!("game over, draw"),
        Outcome::Ongoing => {}
    }
    info!(
        "score: X {} - O {}",
        score.wins(Symbol::X),
        score.wins(Symbol::O)
    );

    // New game; the start alternates, so O opens this one.
    host.reset().await;
    wait_for(&mut guest_rx, |e| {
        matches!(e, SessionEvent::BoardCleared { my_turn: true })
    })
    .await?;
    info!("board reset, guest to move");
    guest.play_cell(4).await;
    wait_for(&mut host_rx, |e| {
        matches!(e, SessionEvent::BoardChanged { my_turn: true, .. })
    })
    .await?;
    info!("guest opened the new game");

    host.shutdown().await;
    wait_for(&mut guest_rx, |e| matches!(e, SessionEvent::Disconnected)).await?;
    info!("host left, session over");

    Ok(())
}

/// Wait on both event streams for `Established` and order the pair host
/// first.
async fn sort_by_role(
    a: (PeerHandle, broadcast::Receiver<SessionEvent>),
    b: (PeerHandle, broadcast::Receiver<SessionEvent>),
) -> Result<(
    PeerHandle,
    broadcast::Receiver<SessionEvent>,
    PeerHandle,
    broadcast::Receiver<SessionEvent>,
)> {
    let (handle_a, mut rx_a) = a;
    let (handle_b, mut rx_b) = b;

    let established = |e: &SessionEvent| matches!(e, SessionEvent::Established { .. });
    let SessionEvent::Established { role, room, .. } = wait_for(&mut rx_a, established).await?
    else {
        unreachable!()
    };
    wait_for(&mut rx_b, established).await?;
    info!("paired in {room}, first peer is {role:?}");

    match role {
        Role::Host => Ok((handle_a, rx_a, handle_b, rx_b)),
        Role::Guest => Ok((handle_b, rx_b, handle_a, rx_a)),
    }
}

/// Receive events until one matches `want`.
async fn wait_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    want: impl Fn(&SessionEvent) -> bool,
) -> Result<SessionEvent> {
    loop {
        let event = rx.recv().await.context("event stream ended")?;
        if want(&event) {
            return Ok(event);
        }
    }
}
