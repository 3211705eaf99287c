//! Session Protocol
//!
//! Validates and interprets in-session messages against local game and chat
//! state, enforcing the turn and ordering invariants. Pure with respect to
//! I/O: [`GameSession`] never touches the channel, it only decides which
//! message to emit and which events to surface. The event loop in
//! [`crate::network::peer`] owns the wire.

use tracing::debug;

use crate::game::board::{evaluate, Board, Outcome, Symbol};
use crate::network::handshake::Role;
use crate::network::protocol::WireMessage;
use crate::network::room::RoomId;

/// System chat notice appended when the peer goes away.
pub const OPPONENT_LEFT_NOTICE: &str = "Opponent left the game.";

/// One line in the session chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// Whether the local participant wrote it.
    pub local: bool,
    /// Whether it is a system notice rather than a peer message.
    pub system: bool,
}

/// Win counts per symbol. Survives resets; only a process restart clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scoreboard {
    /// Games won by X.
    pub x: u32,
    /// Games won by O.
    pub o: u32,
}

impl Scoreboard {
    /// Credit a win to `symbol`.
    pub fn record_win(&mut self, symbol: Symbol) {
        match symbol {
            Symbol::X => self.x += 1,
            Symbol::O => self.o += 1,
        }
    }

    /// Wins recorded for `symbol`.
    pub fn wins(&self, symbol: Symbol) -> u32 {
        match symbol {
            Symbol::X => self.x,
            Symbol::O => self.o,
        }
    }
}

/// Something observable happened in the session.
///
/// Broadcast by the peer event loop; a rendering layer would subscribe to
/// these instead of polling state.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The handshake finished and the session is live.
    Established {
        /// Negotiated role.
        role: Role,
        /// Local mark, fixed for the session lifetime.
        symbol: Symbol,
        /// The room both participants met in.
        room: RoomId,
    },
    /// A move was applied (local or remote).
    BoardChanged {
        /// Board after the move.
        board: Board,
        /// Whether the local side may move next.
        my_turn: bool,
    },
    /// The game was decided.
    GameOver {
        /// Winner or draw.
        outcome: Outcome,
        /// Running win counts after this game.
        score: Scoreboard,
    },
    /// The board was cleared for a new game.
    BoardCleared {
        /// Whether the local side starts the new game.
        my_turn: bool,
    },
    /// A chat line was appended (local, remote or system).
    Chat(ChatMessage),
    /// The remote typing indicator changed.
    OpponentTyping(bool),
    /// The session ended; no recovery, a new rendezvous needs a restart.
    Disconnected,
}

/// Local view of an established session: board, turn ownership, chat and
/// score. One instance per established session, reinitialized on every
/// successful handshake; the score outlives resets.
#[derive(Debug, Clone)]
pub struct GameSession {
    symbol: Symbol,
    board: Board,
    my_turn: bool,
    outcome: Outcome,
    next_starter: Symbol,
    score: Scoreboard,
    chat: Vec<ChatMessage>,
    opponent_typing: bool,
    playing: bool,
}

impl GameSession {
    /// Fresh session state for the local participant holding `symbol`.
    ///
    /// X always starts the first game, so the host opens with the turn flag
    /// set; the starter of the following game is O.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            board: Board::new(),
            my_turn: symbol == Symbol::X,
            outcome: Outcome::Ongoing,
            next_starter: Symbol::O,
            score: Scoreboard::default(),
            chat: Vec::new(),
            opponent_typing: false,
            playing: true,
        }
    }

    /// The local participant's mark.
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Whether the local side may submit the next move.
    pub fn my_turn(&self) -> bool {
        self.my_turn
    }

    /// Outcome of the current game.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Running win counts.
    pub fn score(&self) -> Scoreboard {
        self.score
    }

    /// The chat log, oldest first.
    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    /// Whether the peer currently shows a typing indicator.
    pub fn opponent_typing(&self) -> bool {
        self.opponent_typing
    }

    /// Whether the session is still live (not disconnected).
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Apply a message received from the peer.
    ///
    /// Malformed or out-of-phase messages are discarded silently: a correct
    /// remote never sends them, and dropping them keeps the session alive
    /// under duplicate delivery.
    pub fn apply_remote(&mut self, msg: WireMessage) -> Vec<SessionEvent> {
        if !self.playing {
            return Vec::new();
        }

        match msg {
            WireMessage::Move { index, symbol } => self.apply_remote_move(index as usize, symbol),
            WireMessage::Chat { text } => {
                let line = ChatMessage {
                    text,
                    local: false,
                    system: false,
                };
                self.chat.push(line.clone());
                vec![SessionEvent::Chat(line)]
            }
            WireMessage::Reset { next_to_move } => {
                self.board.clear();
                self.outcome = Outcome::Ongoing;
                self.my_turn = next_to_move == self.symbol;
                self.next_starter = next_to_move.opponent();
                vec![SessionEvent::BoardCleared {
                    my_turn: self.my_turn,
                }]
            }
            WireMessage::Typing { is_typing } => {
                self.opponent_typing = is_typing;
                vec![SessionEvent::OpponentTyping(is_typing)]
            }
            WireMessage::Hello | WireMessage::Welcome | WireMessage::Full => {
                debug!(?msg, "handshake message during established session, ignoring");
                Vec::new()
            }
        }
    }

    fn apply_remote_move(&mut self, index: usize, symbol: Symbol) -> Vec<SessionEvent> {
        if symbol != self.symbol.opponent() {
            debug!(index, %symbol, "remote move with wrong symbol, ignoring");
            return Vec::new();
        }
        if !self.board.set(index, symbol) {
            debug!(index, "remote move on occupied or invalid cell, ignoring");
            return Vec::new();
        }

        self.my_turn = true;
        self.finish_move()
    }

    /// Submit a local move at `index`.
    ///
    /// Legal only while playing, on the local turn, onto an empty cell of an
    /// undecided game; anything else is a complete no-op. On success returns
    /// the message to put on the wire (built before local re-evaluation, so
    /// both sides compute the result from identical applied state) and the
    /// events to surface.
    pub fn local_move(&mut self, index: usize) -> Option<(WireMessage, Vec<SessionEvent>)> {
        if !self.playing
            || !self.my_turn
            || self.outcome.is_decided()
            || !self.board.is_empty_cell(index)
        {
            return None;
        }

        self.board.set(index, self.symbol);
        self.my_turn = false;
        let msg = WireMessage::Move {
            index: index as u8,
            symbol: self.symbol,
        };

        Some((msg, self.finish_move()))
    }

    fn finish_move(&mut self) -> Vec<SessionEvent> {
        let mut events = vec![SessionEvent::BoardChanged {
            board: self.board,
            my_turn: self.my_turn,
        }];

        self.outcome = evaluate(&self.board);
        if let Outcome::Winner(winner) = self.outcome {
            self.score.record_win(winner);
        }
        if self.outcome.is_decided() {
            events.push(SessionEvent::GameOver {
                outcome: self.outcome,
                score: self.score,
            });
        }

        events
    }

    /// Start a new game after a decided one.
    ///
    /// Enabled only once a winner or draw is recorded. The starter strictly
    /// alternates game over game regardless of who won; the peer is told who
    /// moves first via the returned Reset message.
    pub fn local_reset(&mut self) -> Option<(WireMessage, Vec<SessionEvent>)> {
        if !self.playing || !self.outcome.is_decided() {
            return None;
        }

        let starter = self.next_starter;
        self.board.clear();
        self.outcome = Outcome::Ongoing;
        self.my_turn = self.symbol == starter;
        self.next_starter = starter.opponent();

        let msg = WireMessage::Reset {
            next_to_move: starter,
        };
        let events = vec![SessionEvent::BoardCleared {
            my_turn: self.my_turn,
        }];
        Some((msg, events))
    }

    /// Append a local chat line. Empty submissions are dropped.
    pub fn local_chat(&mut self, text: String) -> Option<(WireMessage, SessionEvent)> {
        if !self.playing || text.is_empty() {
            return None;
        }

        let line = ChatMessage {
            text: text.clone(),
            local: true,
            system: false,
        };
        self.chat.push(line.clone());
        Some((WireMessage::Chat { text }, SessionEvent::Chat(line)))
    }

    /// The channel closed or degraded: the session is over, irrecoverably.
    pub fn peer_left(&mut self) -> Vec<SessionEvent> {
        if !self.playing {
            return Vec::new();
        }

        self.playing = false;
        let notice = ChatMessage {
            text: OPPONENT_LEFT_NOTICE.to_string(),
            local: false,
            system: true,
        };
        self.chat.push(notice.clone());
        vec![SessionEvent::Chat(notice), SessionEvent::Disconnected]
    }
}
