//! Network Layer
//!
//! Rendezvous, handshake and in-session protocol over an abstract
//! peer-to-peer channel.
//!
//! - `room` picks deterministic rendezvous identifiers
//! - `protocol` defines the tagged JSON wire messages
//! - `handshake` negotiates host/guest roles and establishes a session
//! - `session` interprets in-session messages against local game state
//! - `peer` is the per-participant event loop that owns the channel
//! - `transport` is the channel capability the above are written against
//! - `memory` is the in-process reference transport (tests and demo)

pub mod handshake;
pub mod memory;
pub mod peer;
pub mod protocol;
pub mod room;
pub mod session;
pub mod transport;
