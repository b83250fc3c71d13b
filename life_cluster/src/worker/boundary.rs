// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Tile edges and the bordered tile the rule is applied to
//!
//! A worker surrounds its `R x C` tile with a one cell wide border built from its
//! neighbours' edges, giving an `(R+2) x (C+2)` grid. The rule is applied to the whole
//! bordered grid and the border is stripped off again, so every cell of the tile sees
//! all 8 of its neighbours.

use std::fmt::Display;

use crate::grid::{Cell, Grid, GridError};
use crate::topology::Direction;


/// Boundary assembly failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    /// No cells were received from the neighbour in this direction
    Missing(Direction),
    /// A neighbour's edge doesn't match the length of ours
    EdgeLength {
        /// The neighbour's direction
        direction: Direction,
        /// Length of our matching edge
        expected: usize,
        /// Cells received
        got: usize,
    },
    /// The bordered grid couldn't be built
    Grid(GridError),
}

impl std::error::Error for BoundaryError {}

impl Display for BoundaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(direction) => write!(f, "No boundary received from the {direction}"),
            Self::EdgeLength {
                direction,
                expected,
                got,
            } => write!(
                f,
                "Boundary from the {direction} has {got} cells, expected {expected}"
            ),
            Self::Grid(err) => write!(f, "Grid error: {err}"),
        }
    }
}

impl From<GridError> for BoundaryError {
    fn from(value: GridError) -> Self {
        Self::Grid(value)
    }
}

/// The edge of `tile` lying on `side`: a single corner for diagonals, otherwise
/// the full first/last row or column
pub fn edge(tile: &Grid, side: Direction) -> Vec<Cell> {
    let last_row = tile.rows() - 1;
    let last_col = tile.cols() - 1;
    let row = |r: usize| (0..tile.cols()).filter_map(move |c| tile.get(r, c)).copied();
    let col = |c: usize| (0..tile.rows()).filter_map(move |r| tile.get(r, c)).copied();
    match side {
        Direction::North => row(0).collect(),
        Direction::South => row(last_row).collect(),
        Direction::West => col(0).collect(),
        Direction::East => col(last_col).collect(),
        Direction::NorthEast => tile.get(0, last_col).copied().into_iter().collect(),
        Direction::SouthEast => tile.get(last_row, last_col).copied().into_iter().collect(),
        Direction::SouthWest => tile.get(last_row, 0).copied().into_iter().collect(),
        Direction::NorthWest => tile.get(0, 0).copied().into_iter().collect(),
    }
}

/// What the serving worker sends back to a peer lying to its `requested.inverse()`.
///
/// `requested` is where the *serving* worker sits as seen from the requester, so the
/// requester wants the edge of our tile facing it.
pub fn edge_facing(tile: &Grid, requested: Direction) -> Vec<Cell> {
    edge(tile, requested.inverse())
}

/// The edges received from the 8 neighbours, indexed by direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryEdges {
    edges: [Vec<Cell>; 8],
}

impl BoundaryEdges {
    /// No edges received yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the edge received from the neighbour in `direction`
    pub fn set(&mut self, direction: Direction, cells: Vec<Cell>) {
        self.edges[direction.index()] = cells;
    }

    /// The edge received from the neighbour in `direction`
    pub fn get(&self, direction: Direction) -> &[Cell] {
        &self.edges[direction.index()]
    }

    /// The first direction, in wire order, whose edge was never received
    pub fn missing(&self) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|direction| self.get(*direction).is_empty())
    }
}

/// The `(rows+2) x (cols+2)` grid with `tile` at offset `(1, 1)` and the neighbours'
/// edges along the border
pub fn assemble_bordered(tile: &Grid, edges: &BoundaryEdges) -> Result<Grid, BoundaryError> {
    let rows = tile.rows();
    let cols = tile.cols();

    if let Some(direction) = edges.missing() {
        return Err(BoundaryError::Missing(direction));
    }
    for direction in Direction::ALL {
        let got = edges.get(direction).len();
        let expected = match direction {
            Direction::North | Direction::South => cols,
            Direction::East | Direction::West => rows,
            _ => 1,
        };
        if got != expected {
            return Err(BoundaryError::EdgeLength {
                direction,
                expected,
                got,
            });
        }
    }

    // placed by position, not by absolute coordinate
    let mut placements: Vec<((usize, usize), Cell)> = tile
        .cells()
        .enumerate()
        .map(|(idx, cell)| ((idx / cols + 1, idx % cols + 1), *cell))
        .collect();

    for (c, cell) in edges.get(Direction::North).iter().enumerate() {
        placements.push(((0, c + 1), *cell));
    }
    for (c, cell) in edges.get(Direction::South).iter().enumerate() {
        placements.push(((rows + 1, c + 1), *cell));
    }
    for (r, cell) in edges.get(Direction::West).iter().enumerate() {
        placements.push(((r + 1, 0), *cell));
    }
    for (r, cell) in edges.get(Direction::East).iter().enumerate() {
        placements.push(((r + 1, cols + 1), *cell));
    }
    let corners = [
        (Direction::NorthWest, (0, 0)),
        (Direction::NorthEast, (0, cols + 1)),
        (Direction::SouthWest, (rows + 1, 0)),
        (Direction::SouthEast, (rows + 1, cols + 1)),
    ];
    for (direction, at) in corners {
        placements.extend(edges.get(direction).iter().map(|cell| (at, *cell)));
    }

    Ok(Grid::from_placements(rows + 2, cols + 2, placements)?)
}

/// Drop the one cell wide border again
pub fn strip_border(bordered: &Grid) -> Result<Grid, GridError> {
    if bordered.rows() < 3 || bordered.cols() < 3 {
        return Err(GridError::Empty);
    }
    let (rows, cols) = (bordered.rows() - 2, bordered.cols() - 2);
    bordered.window(1, 1, rows, cols)
}
