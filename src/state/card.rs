//! Card geometry: 24 pool-derived cells laid out around a free centre on a 5x5 grid.

use rand::{Rng, seq::SliceRandom};
use uuid::Uuid;

/// Cells drawn from the pool for every card.
pub const CARD_CELLS: usize = 24;
/// Width and height of the grid.
pub const GRID_SIZE: usize = 5;
/// Grid index of the free centre cell. Never persisted, always counted as marked.
pub const FREE_CELL: usize = 12;
/// Rows, columns and both diagonals.
pub const LINE_COUNT: usize = 2 * GRID_SIZE + 2;

/// A 5x5 grid of marked flags, row-major.
pub type MarkedGrid = [bool; GRID_SIZE * GRID_SIZE];

/// Shuffle a copy of `pool` and keep the first [`CARD_CELLS`] entries.
///
/// Returns `None` when the pool is too small to fill a card.
pub fn deal_card<R>(pool: &[Uuid], rng: &mut R) -> Option<Vec<Uuid>>
where
    R: Rng + ?Sized,
{
    if pool.len() < CARD_CELLS {
        return None;
    }

    let mut cells = pool.to_vec();
    cells.shuffle(rng);
    cells.truncate(CARD_CELLS);
    Some(cells)
}

/// Grid index of the `position`-th stored cell, skipping the centre.
pub fn grid_index(position: usize) -> usize {
    if position < FREE_CELL {
        position
    } else {
        position + 1
    }
}

/// Every winning line as five grid indices.
pub fn winning_lines() -> [[usize; GRID_SIZE]; LINE_COUNT] {
    let mut lines = [[0; GRID_SIZE]; LINE_COUNT];
    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            lines[i][j] = i * GRID_SIZE + j;
            lines[GRID_SIZE + i][j] = j * GRID_SIZE + i;
        }
        lines[2 * GRID_SIZE][i] = i * GRID_SIZE + i;
        lines[2 * GRID_SIZE + 1][i] = i * GRID_SIZE + (GRID_SIZE - 1 - i);
    }
    lines
}

/// Project a card onto the grid, flagging the cells whose event is marked.
pub fn marked_grid(cells: &[Uuid], is_marked: impl Fn(Uuid) -> bool) -> MarkedGrid {
    let mut grid = [false; GRID_SIZE * GRID_SIZE];
    grid[FREE_CELL] = true;
    for (position, cell) in cells.iter().take(CARD_CELLS).enumerate() {
        grid[grid_index(position)] = is_marked(*cell);
    }
    grid
}

pub fn has_line(grid: &MarkedGrid) -> bool {
    winning_lines()
        .iter()
        .any(|line| line.iter().all(|&index| grid[index]))
}

pub fn is_full(grid: &MarkedGrid) -> bool {
    grid.iter().all(|marked| *marked)
}
