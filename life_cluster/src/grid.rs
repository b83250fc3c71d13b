// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Cells, grids and the Game of Life rule engine
//!
//! A [Grid] is a dense, row-major rectangle of [Cell]s. Every [Cell] remembers the
//! *absolute* coordinates it has on the global board, so a worker's tile (or a tile
//! wrapped in a border of its neighbours' edges) can be handed back to the master
//! and merged without any translation.
//!
//! Rule evaluation never wraps: neighbours outside of the grid count as dead. Toroidal
//! wraparound is produced one level up, by the boundary exchange between workers.

use std::fmt::Display;

use crate::topology::{Direction, Topology};

#[cfg(test)]
mod tests;

/// A single cell of the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Absolute row on the global board
    pub row: usize,
    /// Absolute column on the global board
    pub col: usize,
    /// Is the cell alive
    pub alive: bool,
}

impl Cell {
    /// Create a new cell
    pub fn new(row: usize, col: usize, alive: bool) -> Self {
        Self { row, col, alive }
    }

    /// The same cell, with a different alive-state
    pub fn with_alive(self, alive: bool) -> Self {
        Self { alive, ..self }
    }
}

/// Grid construction errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// A grid must have at least one row and one column
    Empty,
    /// The number of cells supplied doesn't fill the rectangle
    CellCount {
        /// rows * cols
        expected: usize,
        /// What we got
        got: usize,
    },
    /// A position of the rectangle was never filled in
    MissingCell {
        /// Local row
        row: usize,
        /// Local column
        col: usize,
    },
    /// The tile size doesn't evenly divide the board, or the worker id is out of range
    BadTile(String),
    /// Block size of zero was requested when embedding a pattern
    ZeroBlockSize,
}

impl std::error::Error for GridError {}

impl Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Grid has no rows or no columns"),
            Self::CellCount { expected, got } => {
                write!(f, "Grid expected {expected} cells but received {got}")
            }
            Self::MissingCell { row, col } => {
                write!(f, "Grid position ({row}, {col}) was never populated")
            }
            Self::BadTile(reason) => write!(f, "Invalid tile: {reason}"),
            Self::ZeroBlockSize => write!(f, "Block size must be at least 1"),
        }
    }
}

/// A dense rectangle of cells, stored row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// A `rows` x `cols` grid of dead cells whose absolute coordinates
    /// equal their local position
    pub fn dead(rows: usize, cols: usize) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        let cells = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| Cell::new(row, col, false)))
            .collect();
        Ok(Self { rows, cols, cells })
    }

    /// Build a grid from row-major cells
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<Cell>) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        if cells.len() != rows * cols {
            return Err(GridError::CellCount {
                expected: rows * cols,
                got: cells.len(),
            });
        }
        Ok(Self { rows, cols, cells })
    }

    /// Build a grid from cells placed at arbitrary local positions. Every position
    /// must be supplied (later placements replace earlier ones).
    pub fn from_placements<I>(rows: usize, cols: usize, placements: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = ((usize, usize), Cell)>,
    {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        let mut slots: Vec<Option<Cell>> = vec![None; rows * cols];
        for ((row, col), cell) in placements {
            if row < rows && col < cols {
                slots[row * cols + col] = Some(cell);
            } else {
                log::warn!("Dropping cell {cell:?} placed outside of a {rows}x{cols} grid");
            }
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for (idx, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(cell) => cells.push(cell),
                None => {
                    return Err(GridError::MissingCell {
                        row: idx / cols,
                        col: idx % cols,
                    })
                }
            }
        }
        Ok(Self { rows, cols, cells })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The cell at a local position
    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        if row < self.rows && col < self.cols {
            self.cells.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Iterate all cells, row-major
    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter()
    }

    /// Absolute coordinates of every live cell, row-major
    pub fn live_cells(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .filter(|c| c.alive)
            .map(|c| (c.row, c.col))
            .collect()
    }

    /// Two grids are identical when they have the same shape and the same
    /// alive-state at every position. Coordinates are not compared.
    pub fn is_identical(&self, other: &Grid) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .cells
                .iter()
                .zip(other.cells.iter())
                .all(|(a, b)| a.alive == b.alive)
    }

    /// A rectangular window of this grid. Cells keep their absolute coordinates.
    pub fn window(
        &self,
        first_row: usize,
        first_col: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Grid, GridError> {
        if first_row + rows > self.rows || first_col + cols > self.cols {
            return Err(GridError::BadTile(format!(
                "window {rows}x{cols} at ({first_row}, {first_col}) exceeds {}x{}",
                self.rows, self.cols
            )));
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for row in first_row..first_row + rows {
            let start = row * self.cols + first_col;
            cells.extend_from_slice(&self.cells[start..start + cols]);
        }
        Grid::from_cells(rows, cols, cells)
    }

    /// The tile of the board owned by worker `id` in `topology`
    pub fn tile(&self, topology: &Topology, id: usize) -> Result<Grid, GridError> {
        if self.rows % topology.rows() != 0 || self.cols % topology.cols() != 0 {
            return Err(GridError::BadTile(format!(
                "{}x{} board doesn't split into {}x{} tiles",
                self.rows,
                self.cols,
                topology.rows(),
                topology.cols()
            )));
        }
        let Some((worker_row, worker_col)) = topology.position(id) else {
            return Err(GridError::BadTile(format!("no worker {id} in {topology}")));
        };
        let tile_rows = self.rows / topology.rows();
        let tile_cols = self.cols / topology.cols();
        self.window(
            worker_row * tile_rows,
            worker_col * tile_cols,
            tile_rows,
            tile_cols,
        )
    }
}

impl Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.cells.chunks(self.cols) {
            for cell in row {
                write!(f, "{}", if cell.alive { 'O' } else { '.' })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Number of live cells among the 8 neighbours of a local position. Positions
/// outside of the grid contribute nothing.
pub fn count_live_neighbours(grid: &Grid, row: usize, col: usize) -> usize {
    Direction::ALL
        .iter()
        .filter_map(|direction| {
            let (d_row, d_col) = direction.offset();
            let r = row.checked_add_signed(d_row)?;
            let c = col.checked_add_signed(d_col)?;
            grid.get(r, c)
        })
        .filter(|cell| cell.alive)
        .count()
}

/// Apply the Game of Life rule to every cell, producing a new grid
pub fn next_state(grid: &Grid) -> Grid {
    let mut cells = Vec::with_capacity(grid.cells.len());
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let cell = grid.cells[row * grid.cols + col];
            let neighbours = count_live_neighbours(grid, row, col);
            let alive = matches!((cell.alive, neighbours), (true, 2) | (true, 3) | (false, 3));
            cells.push(cell.with_alive(alive));
        }
    }
    Grid {
        rows: grid.rows,
        cols: grid.cols,
        cells,
    }
}

/// Centre `pattern` on a dead board sized for `topology` with `block_size` x `block_size`
/// cells per worker. The pattern is truncated at the board's edges.
pub fn embed_pattern(
    topology: &Topology,
    block_size: usize,
    pattern: &Grid,
) -> Result<Grid, GridError> {
    if block_size == 0 {
        return Err(GridError::ZeroBlockSize);
    }
    let board_rows = topology.rows() * block_size;
    let board_cols = topology.cols() * block_size;

    // floor(dim / 2 * block) without going through floating point
    let start_row = (topology.rows() * block_size / 2).saturating_sub(pattern.rows() / 2);
    let start_col = (topology.cols() * block_size / 2).saturating_sub(pattern.cols() / 2);

    let mut board = Grid::dead(board_rows, board_cols)?;
    let end_row = (start_row + pattern.rows()).min(board_rows);
    let end_col = (start_col + pattern.cols()).min(board_cols);
    for row in start_row..end_row {
        for col in start_col..end_col {
            if let Some(source) = pattern.get(row - start_row, col - start_col) {
                board.cells[row * board_cols + col] = Cell::new(row, col, source.alive);
            }
        }
    }
    Ok(board)
}
