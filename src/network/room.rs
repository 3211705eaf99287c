//! Room Identifiers
//!
//! Deterministic rendezvous identifiers. Both participants derive the same
//! sequence of room ids from the same prefix, so no coordination is needed
//! to agree on where to meet: first to bind an id hosts it, everyone else
//! finds it taken and joins as guest.

use std::fmt;

/// Prefix shared by every room this build can rendezvous in.
///
/// Changing it partitions the population, so it carries a version suffix.
pub const DEFAULT_ROOM_PREFIX: &str = "grid-duel-v1-";

/// A named rendezvous point, formatted `"<prefix>room-<index>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    /// The deterministic id for `index` under `prefix`. Pure: the same
    /// index always yields the same id, and ids order by index.
    pub fn for_index(prefix: &str, index: u32) -> Self {
        RoomId(format!("{prefix}room-{index}"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Walks the room index sequence for one participant.
///
/// The current index lives here and nowhere else; the handshake engine owns
/// the sequencer and advances it on every failed guest attempt. There is no
/// upper bound and no give-up policy: scanning continues indefinitely.
#[derive(Debug, Clone)]
pub struct RoomSequencer {
    prefix: String,
    index: u32,
}

impl RoomSequencer {
    /// Start scanning at index 1 under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            index: 1,
        }
    }

    /// The room id for the current index.
    pub fn current(&self) -> RoomId {
        RoomId::for_index(&self.prefix, self.index)
    }

    /// The current index, 1-based.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Move to the next index.
    pub fn advance(&mut self) {
        self.index += 1;
    }
}
