//! Game Logic Module
//!
//! Pure, deterministic game state and match evaluation. No I/O, no clocks,
//! no channels: the networking layer calls into this module, never the
//! other way around.

pub mod board;
