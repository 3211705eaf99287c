//! Board State and Match Evaluation
//!
//! Pure, deterministic game logic: the 3x3 board, the two player symbols
//! and the winner/draw evaluation. No side effects, no I/O, safe to call
//! redundantly after every mutation (local or remote).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A player mark. The host always plays `X`, the guest always plays `O`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    /// The host's mark. `X` starts the first game.
    X,
    /// The guest's mark.
    O,
}

impl Symbol {
    /// The other player's mark.
    pub fn opponent(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => write!(f, "X"),
            Symbol::O => write!(f, "O"),
        }
    }
}

/// The 8 fixed winning triples, checked in this order.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// The 3x3 board, cells indexed 0..9 row-major.
///
/// A cell once set is only cleared again by [`Board::clear`]; a move is
/// legal only on an empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Board([Option<Symbol>; 9]);

impl Board {
    /// Number of cells on the board.
    pub const CELLS: usize = 9;

    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mark at `index`, or `None` if the cell is empty or out of range.
    pub fn cell(&self, index: usize) -> Option<Symbol> {
        self.0.get(index).copied().flatten()
    }

    /// Whether `index` is a legal, still-empty cell.
    pub fn is_empty_cell(&self, index: usize) -> bool {
        index < Self::CELLS && self.0[index].is_none()
    }

    /// Place `symbol` at `index`. Returns false without mutating if the
    /// cell is occupied or out of range.
    pub fn set(&mut self, index: usize, symbol: Symbol) -> bool {
        if !self.is_empty_cell(index) {
            return false;
        }
        self.0[index] = Some(symbol);
        true
    }

    /// Reset every cell to empty.
    pub fn clear(&mut self) {
        self.0 = [None; 9];
    }

    /// Whether no empty cell remains.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(|c| c.is_some())
    }

    /// All cells in index order.
    pub fn cells(&self) -> &[Option<Symbol>; 9] {
        &self.0
    }
}

/// Result of evaluating a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No winner yet and at least one empty cell remains.
    Ongoing,
    /// Some winning triple is uniformly held by this symbol.
    Winner(Symbol),
    /// No winner and no empty cell remains.
    Draw,
}

impl Outcome {
    /// Whether the game has ended (winner or draw).
    pub fn is_decided(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }
}

/// Evaluate a board for a winner or a draw.
///
/// Checks the 8 triples of [`WINNING_LINES`] in fixed order and returns
/// the first uniform non-empty triple's symbol. Otherwise `Draw` when the
/// board is full, `Ongoing` when it is not. Pure and idempotent.
pub fn evaluate(board: &Board) -> Outcome {
    for [a, b, c] in WINNING_LINES {
        if let Some(symbol) = board.cell(a) {
            if board.cell(b) == Some(symbol) && board.cell(c) == Some(symbol) {
                return Outcome::Winner(symbol);
            }
        }
    }

    if board.is_full() {
        Outcome::Draw
    } else {
        Outcome::Ongoing
    }
}
