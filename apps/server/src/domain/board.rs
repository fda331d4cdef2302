use serde::{Deserialize, Serialize};

use crate::errors::domain::DomainError;

/// One of the two stone colors. Black always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoneColor {
    Black,
    White,
}

impl StoneColor {
    pub fn opponent(self) -> Self {
        match self {
            StoneColor::Black => StoneColor::White,
            StoneColor::White => StoneColor::Black,
        }
    }
}

/// Square grid of cell occupancy, exactly `size` rows by `size` columns.
///
/// Owned by the room that created it for the lifetime of one match and
/// replaced wholesale at every match start, rematches included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    cells: Vec<Option<StoneColor>>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_bounds(&self, row: i32, col: i32) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.size && (col as usize) < self.size
    }

    pub fn occupant(&self, row: usize, col: usize) -> Option<StoneColor> {
        self.cells[row * self.size + col]
    }

    /// Place a stone on an empty in-bounds cell.
    pub fn place(&mut self, row: usize, col: usize, color: StoneColor) -> Result<(), DomainError> {
        if row >= self.size || col >= self.size {
            return Err(DomainError::validation(format!(
                "cell ({row}, {col}) is outside the {size}x{size} board",
                size = self.size
            )));
        }
        let cell = &mut self.cells[row * self.size + col];
        if cell.is_some() {
            return Err(DomainError::validation(format!(
                "cell ({row}, {col}) is already occupied"
            )));
        }
        *cell = Some(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_board_is_empty() {
        let board = Board::new(15);
        assert_eq!(board.size(), 15);
        for row in 0..15 {
            for col in 0..15 {
                assert_eq!(board.occupant(row, col), None);
            }
        }
    }

    #[test]
    fn place_marks_the_cell() {
        let mut board = Board::new(15);
        board.place(7, 7, StoneColor::Black).unwrap();
        assert_eq!(board.occupant(7, 7), Some(StoneColor::Black));
    }

    #[test]
    fn place_rejects_occupied_cell() {
        let mut board = Board::new(15);
        board.place(7, 7, StoneColor::Black).unwrap();
        let err = board.place(7, 7, StoneColor::White).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(board.occupant(7, 7), Some(StoneColor::Black));
    }

    #[test]
    fn place_rejects_out_of_bounds() {
        let mut board = Board::new(10);
        assert!(board.place(10, 0, StoneColor::Black).is_err());
        assert!(board.place(0, 10, StoneColor::Black).is_err());
    }

    #[test]
    fn in_bounds_covers_edges() {
        let board = Board::new(10);
        assert!(board.in_bounds(0, 0));
        assert!(board.in_bounds(9, 9));
        assert!(!board.in_bounds(-1, 0));
        assert!(!board.in_bounds(0, 10));
    }
}
