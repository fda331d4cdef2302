use serde::{Deserialize, Serialize};

use crate::domain::board::{Board, StoneColor};

/// Number of contiguous same-color stones that wins the match.
pub const WIN_LENGTH: usize = 5;

/// Axis directions for the straight-five scan: horizontal, vertical, and the
/// two diagonals. Each is walked forward and backward from the anchor move.
const SCAN_AXES: [(i32, i32); 4] = [(0, 1), (1, 0), (-1, 1), (1, 1)];

/// Immutable record of one placed stone. The color is assigned by the server
/// at validation time, never taken from the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub row: usize,
    pub col: usize,
    pub color: StoneColor,
}

/// Ordered list of the moves made in the current match. Grows only while a
/// match runs; cleared together with the board on every (re)start.
#[derive(Debug, Clone, Default)]
pub struct MoveLedger {
    moves: Vec<Move>,
}

impl MoveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mv: Move) {
        self.moves.push(mv);
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn last(&self) -> Option<&Move> {
        self.moves.last()
    }

    /// Check the win condition anchored at the most recently ledgered move.
    ///
    /// Scans the four axes, counting contiguous same-color stones extending
    /// forward and backward from the last move, including its own cell. Runs
    /// once per completed turn, so only the latest move can complete a run.
    pub fn winner(&self, board: &Board) -> Option<StoneColor> {
        let last = self.moves.last()?;

        for axis in SCAN_AXES {
            if consecutive_stones(board, last, axis) >= WIN_LENGTH {
                return Some(last.color);
            }
        }

        None
    }
}

fn consecutive_stones(board: &Board, anchor: &Move, (dr, dc): (i32, i32)) -> usize {
    let mut count = 1; // The anchor's own cell.

    for (sr, sc) in [(dr, dc), (-dr, -dc)] {
        let mut row = anchor.row as i32 + sr;
        let mut col = anchor.col as i32 + sc;
        while board.in_bounds(row, col)
            && board.occupant(row as usize, col as usize) == Some(anchor.color)
        {
            count += 1;
            row += sr;
            col += sc;
        }
    }

    count
}
