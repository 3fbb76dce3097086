//! Tic-tac-toe board model and the local win check.
//!
//! The board is a flat array of nine cells addressed row-major:
//! `index = row * 3 + col`. [`local_win_check`] is the pure function the
//! reconciler uses for its optimistic end-of-game hint; it never decides the
//! authoritative result.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PlayroomError;

/// Number of cells on a tic-tac-toe board.
pub const BOARD_CELLS: usize = 9;

/// Side length of the board.
pub const BOARD_SIDE: u8 = 3;

/// The eight winning lines, in evaluation order: rows, columns, diagonals.
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// The symbol a participant plays as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    X,
    O,
}

impl Marker {
    /// The other marker.
    pub fn opponent(self) -> Self {
        match self {
            Marker::X => Marker::O,
            Marker::O => Marker::X,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::X => f.write_str("X"),
            Marker::O => f.write_str("O"),
        }
    }
}

/// A single board cell: empty or holding a marker.
pub type Cell = Option<Marker>;

/// Row/column coordinates of a cell, as sent in `make-move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: u8,
    pub col: u8,
}

impl CellPosition {
    /// Convert a board index (0-8) into coordinates.
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= BOARD_CELLS {
            return None;
        }
        let side = usize::from(BOARD_SIDE);
        Some(Self {
            row: u8::try_from(index / side).ok()?,
            col: u8::try_from(index % side).ok()?,
        })
    }

    /// The board index for these coordinates, if they are on the board.
    pub fn to_index(self) -> Option<usize> {
        if self.row >= BOARD_SIDE || self.col >= BOARD_SIDE {
            return None;
        }
        Some(usize::from(self.row) * usize::from(BOARD_SIDE) + usize::from(self.col))
    }
}

/// A validated nine-cell board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Cell; BOARD_CELLS],
}

impl Board {
    /// An empty board.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a board from exactly nine cells.
    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self { cells }
    }

    /// The cell at `index`, or `None` when the index is off the board.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Whether the cell at `index` is on the board and empty.
    pub fn is_empty_at(&self, index: usize) -> bool {
        matches!(self.get(index), Some(None))
    }

    /// Whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Number of cells holding `marker`.
    pub fn count(&self, marker: Marker) -> usize {
        self.cells.iter().filter(|c| **c == Some(marker)).count()
    }

    /// Indices that are occupied here but empty in `next`.
    pub fn cleared_in(&self, next: &Board) -> Vec<usize> {
        self.cells
            .iter()
            .zip(next.cells.iter())
            .enumerate()
            .filter(|(_, (before, after))| before.is_some() && after.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// All cells in index order.
    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.cells
    }
}

impl TryFrom<Vec<Cell>> for Board {
    type Error = PlayroomError;

    fn try_from(cells: Vec<Cell>) -> Result<Self, Self::Error> {
        let len = cells.len();
        let cells: [Cell; BOARD_CELLS] = cells
            .try_into()
            .map_err(|_| PlayroomError::InvalidBoardLength(len))?;
        Ok(Self { cells })
    }
}

impl From<Board> for Vec<Cell> {
    fn from(board: Board) -> Self {
        board.cells.to_vec()
    }
}

/// Result of the local win check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardVerdict {
    /// A full line of this marker exists.
    Winner(Marker),
    /// The board is full with no line.
    Draw,
    /// Neither of the above.
    #[default]
    Undecided,
}

impl BoardVerdict {
    /// Whether the verdict ends the game.
    pub fn is_decided(self) -> bool {
        !matches!(self, BoardVerdict::Undecided)
    }
}

/// Evaluate the eight win lines of `board`.
///
/// Lines are checked rows first, then columns, then diagonals; the first
/// complete line decides. A full board without a line is a draw.
pub fn local_win_check(board: &Board) -> BoardVerdict {
    for line in WIN_LINES {
        let [a, b, c] = line.map(|i| board.get(i).flatten());
        if let Some(marker) = a {
            if b == Some(marker) && c == Some(marker) {
                return BoardVerdict::Winner(marker);
            }
        }
    }
    if board.is_full() {
        BoardVerdict::Draw
    } else {
        BoardVerdict::Undecided
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const A: Cell = Some(Marker::X);
    const B: Cell = Some(Marker::O);
    const E: Cell = None;

    /// Decode `n` as a base-3 board: 0 empty, 1 X, 2 O.
    fn board_from_code(mut n: u32) -> Board {
        let mut cells = [None; BOARD_CELLS];
        for cell in &mut cells {
            *cell = match n % 3 {
                0 => None,
                1 => Some(Marker::X),
                _ => Some(Marker::O),
            };
            n /= 3;
        }
        Board::from_cells(cells)
    }

    fn complete_lines(board: &Board) -> Vec<Marker> {
        WIN_LINES
            .iter()
            .filter_map(|line| {
                let first = board.cells()[line[0]]?;
                line.iter()
                    .all(|&i| board.cells()[i] == Some(first))
                    .then_some(first)
            })
            .collect()
    }

    #[test]
    fn top_row_wins() {
        let board = Board::from_cells([A, A, A, E, E, E, E, E, E]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::X));
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let board = Board::from_cells([A, B, A, B, A, B, B, A, B]);
        assert_eq!(local_win_check(&board), BoardVerdict::Draw);
    }

    #[test]
    fn empty_board_is_undecided() {
        assert_eq!(local_win_check(&Board::empty()), BoardVerdict::Undecided);
    }

    #[test]
    fn earlier_rows_take_priority() {
        let board = Board::from_cells([B, B, B, A, A, A, E, E, E]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::O));

        let board = Board::from_cells([E, E, E, A, A, A, B, B, B]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::X));
    }

    #[test]
    fn earlier_columns_take_priority() {
        let board = Board::from_cells([B, A, E, B, A, E, B, A, E]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::O));

        let board = Board::from_cells([E, B, A, E, B, A, E, B, A]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::O));
    }

    #[test]
    fn diagonals_are_checked() {
        let board = Board::from_cells([A, B, E, B, A, E, E, E, A]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::X));

        let board = Board::from_cells([A, A, B, E, B, E, B, E, A]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::O));
    }

    #[test]
    fn a_line_on_a_full_board_beats_draw() {
        let board = Board::from_cells([A, B, A, A, B, B, A, A, B]);
        assert_eq!(local_win_check(&board), BoardVerdict::Winner(Marker::X));
    }

    #[test]
    fn exhaustive_single_line_boards_report_their_marker() {
        for code in 0..3u32.pow(9) {
            let board = board_from_code(code);
            let lines = complete_lines(&board);
            if lines.len() == 1 {
                assert_eq!(
                    local_win_check(&board),
                    BoardVerdict::Winner(lines[0]),
                    "board code {code}"
                );
            }
        }
    }

    #[test]
    fn exhaustive_full_boards_without_lines_are_draws() {
        for code in 0..3u32.pow(9) {
            let board = board_from_code(code);
            if board.is_full() && complete_lines(&board).is_empty() {
                assert_eq!(local_win_check(&board), BoardVerdict::Draw, "code {code}");
            }
        }
    }

    #[test]
    fn exhaustive_open_boards_without_lines_are_undecided() {
        for code in 0..3u32.pow(9) {
            let board = board_from_code(code);
            if !board.is_full() && complete_lines(&board).is_empty() {
                assert_eq!(
                    local_win_check(&board),
                    BoardVerdict::Undecided,
                    "code {code}"
                );
            }
        }
    }

    #[test]
    fn board_rejects_wrong_length() {
        let err = Board::try_from(vec![None; 8]).unwrap_err();
        assert!(matches!(err, PlayroomError::InvalidBoardLength(8)));
        let err = Board::try_from(vec![None; 10]).unwrap_err();
        assert!(matches!(err, PlayroomError::InvalidBoardLength(10)));
        assert!(Board::try_from(vec![None; 9]).is_ok());
    }

    #[test]
    fn position_index_mapping() {
        assert_eq!(
            CellPosition::from_index(0),
            Some(CellPosition { row: 0, col: 0 })
        );
        assert_eq!(
            CellPosition::from_index(5),
            Some(CellPosition { row: 1, col: 2 })
        );
        assert_eq!(
            CellPosition::from_index(7),
            Some(CellPosition { row: 2, col: 1 })
        );
        assert_eq!(CellPosition::from_index(9), None);
        for i in 0..BOARD_CELLS {
            assert_eq!(CellPosition::from_index(i).unwrap().to_index(), Some(i));
        }
        assert_eq!(CellPosition { row: 3, col: 0 }.to_index(), None);
    }

    #[test]
    fn cleared_cells_are_detected() {
        let before = Board::from_cells([A, E, B, E, E, E, E, E, E]);
        let after = Board::from_cells([E, E, B, E, A, E, E, E, E]);
        assert_eq!(before.cleared_in(&after), vec![0]);
        assert!(after.cleared_in(&after).is_empty());
    }

    #[test]
    fn marker_wire_form() {
        assert_eq!(serde_json::to_string(&Marker::X).unwrap(), "\"X\"");
        let cells: Vec<Cell> = serde_json::from_str(r#"["O",null,"X"]"#).unwrap();
        assert_eq!(cells, vec![B, E, A]);
    }
}
