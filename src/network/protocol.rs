//! Protocol Messages
//!
//! Wire format exchanged between the two peers. All messages are tagged
//! JSON records; the `type` field is the sole discriminator. The schema is
//! deliberately small: three handshake messages and four session messages.

use crate::game::board::Symbol;
use serde::{Deserialize, Serialize};

/// A message on the peer-to-peer channel.
///
/// `Hello`, `Welcome` and `Full` are valid only during the handshake;
/// the rest are valid only once a session is established. Receipt of a
/// message outside its phase is a protocol violation and is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WireMessage {
    /// Guest greeting, opens the inner handshake.
    Hello,

    /// Host reply to `Hello`; the session is established on receipt.
    Welcome,

    /// Host refusal: the room already has two participants.
    Full,

    /// A mark placed at `index` (0..9) by the peer holding `symbol`.
    Move {
        /// Board cell, row-major 0..9.
        index: u8,
        /// The mover's mark.
        symbol: Symbol,
    },

    /// Clear the board for a new game; `next_to_move` starts it.
    Reset {
        /// The symbol that moves first in the new game.
        #[serde(rename = "nextToMove")]
        next_to_move: Symbol,
    },

    /// A chat line from the peer.
    Chat {
        /// Message body, not interpreted.
        text: String,
    },

    /// Transient remote-typing indicator, no acknowledgement.
    Typing {
        /// Whether the peer currently has a non-empty chat input.
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

impl WireMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
