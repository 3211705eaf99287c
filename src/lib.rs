//! # Grid Duel
//!
//! Serverless two-player tic-tac-toe over a peer-to-peer channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        GRID DUEL                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/            - Match engine (pure)                      │
//! │  └── board.rs     - Board, symbols, outcome evaluation       │
//! │                                                              │
//! │  network/         - Rendezvous and session                   │
//! │  ├── room.rs      - Deterministic room id sequence           │
//! │  ├── protocol.rs  - Tagged JSON wire messages                │
//! │  ├── transport.rs - Channel capability traits                │
//! │  ├── memory.rs    - In-process reference transport           │
//! │  ├── handshake.rs - Host/guest rendezvous state machine      │
//! │  ├── session.rs   - Established-session state and events     │
//! │  └── peer.rs      - Peer task: commands in, events out       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pairing Without a Lobby
//!
//! There is no matchmaking service. Both participants walk the same
//! deterministic room id sequence; whoever binds an id first hosts it and
//! plays X, the other finds the id taken, joins as guest and plays O. Full
//! rooms, dead channels and unresponsive hosts advance the scan to the next
//! id, so any number of concurrent players pair up two by two.
//!
//! The match engine in `game/` is pure and synchronous; everything
//! time-dependent or fallible lives in `network/`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{evaluate, Board, Outcome, Symbol};
pub use network::handshake::{HandshakeEngine, Role, SessionState};
pub use network::memory::MemoryHub;
pub use network::peer::{spawn_peer, PeerConfig, PeerHandle};
pub use network::protocol::WireMessage;
pub use network::room::{RoomId, RoomSequencer, DEFAULT_ROOM_PREFIX};
pub use network::session::{GameSession, SessionEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long a guest waits for WELCOME before advancing the room scan (ms)
pub const HANDSHAKE_TIMEOUT_MS: u64 = 3000;

/// How long a FULL notice gets to flush before the host closes (ms)
pub const ROOM_FULL_GRACE_MS: u64 = 500;

/// Idle time after which a typing indicator is retracted (ms)
pub const TYPING_IDLE_MS: u64 = 3000;
