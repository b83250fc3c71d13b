// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Worker layout on a torus
//!
//! Workers are arranged on a `rows` x `cols` grid which wraps in both dimensions.
//! A worker id `i` sits at `(i / cols, i % cols)`; looking one step past any edge
//! lands on the opposite edge. With a single worker, every direction points back
//! at that worker, which gives one board the same wraparound as a distributed one.

use std::fmt::Display;
use std::str::FromStr;

#[cfg(test)]
mod tests;

/// One of the 8 compass directions. [Direction::ALL] is the canonical order used
/// everywhere on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// (-1, 0)
    North,
    /// (-1, 1)
    NorthEast,
    /// (0, 1)
    East,
    /// (1, 1)
    SouthEast,
    /// (1, 0)
    South,
    /// (1, -1)
    SouthWest,
    /// (0, -1)
    West,
    /// (-1, -1)
    NorthWest,
}

impl Direction {
    /// Canonical iteration order
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// `(row, col)` offset of a single step in this direction
    pub fn offset(&self) -> (isize, isize) {
        match self {
            Self::North => (-1, 0),
            Self::NorthEast => (-1, 1),
            Self::East => (0, 1),
            Self::SouthEast => (1, 1),
            Self::South => (1, 0),
            Self::SouthWest => (1, -1),
            Self::West => (0, -1),
            Self::NorthWest => (-1, -1),
        }
    }

    /// The direction with both offsets negated
    pub fn inverse(&self) -> Direction {
        match self {
            Self::North => Self::South,
            Self::NorthEast => Self::SouthWest,
            Self::East => Self::West,
            Self::SouthEast => Self::NorthWest,
            Self::South => Self::North,
            Self::SouthWest => Self::NorthEast,
            Self::West => Self::East,
            Self::NorthWest => Self::SouthEast,
        }
    }

    /// Diagonal directions exchange a single corner cell
    pub fn is_diagonal(&self) -> bool {
        let (row, col) = self.offset();
        row != 0 && col != 0
    }

    /// Position in [Direction::ALL]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::North => "NORTH",
            Self::NorthEast => "NORTHEAST",
            Self::East => "EAST",
            Self::SouthEast => "SOUTHEAST",
            Self::South => "SOUTH",
            Self::SouthWest => "SOUTHWEST",
            Self::West => "WEST",
            Self::NorthWest => "NORTHWEST",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The token didn't name one of the 8 directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDirection(pub String);

impl std::error::Error for UnknownDirection {}

impl Display for UnknownDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown direction '{}'", self.0)
    }
}

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownDirection(token.to_string()))
    }
}

/// Topology planning errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A run needs at least one worker
    NoWorkers,
}

impl std::error::Error for TopologyError {}

impl Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoWorkers => write!(f, "At least one worker is required"),
        }
    }
}

/// A `rows` x `cols` torus holding `workers` workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    workers: usize,
    rows: usize,
    cols: usize,
}

impl Topology {
    /// Lay out `workers` workers.
    ///
    /// The count is trial-divided by increasing integers. Factors are appended to a list
    /// seeded with `1`, and whenever the list reaches 3 entries its first and last entries
    /// are replaced by their product. What's left is `[cols, rows]`.
    ///
    /// The result is close to square for small counts but not ordered by magnitude,
    /// e.g. 6 workers give 3 rows of 2 and 12 workers give 6 rows of 2.
    pub fn plan(workers: usize) -> Result<Self, TopologyError> {
        if workers == 0 {
            return Err(TopologyError::NoWorkers);
        }
        if workers == 1 {
            return Ok(Self {
                workers,
                rows: 1,
                cols: 1,
            });
        }

        let mut factors: Vec<usize> = vec![1];
        let mut remaining = workers;
        let mut divisor = 2;
        while remaining > 1 {
            while remaining % divisor == 0 {
                factors.push(divisor);
                if factors.len() == 3 {
                    let first = factors.remove(0);
                    let last = factors.pop().unwrap_or(1);
                    factors.push(first * last);
                }
                remaining /= divisor;
            }
            divisor += 1;
        }

        Ok(Self {
            workers,
            rows: factors[1],
            cols: factors[0],
        })
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Rows of workers
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Columns of workers
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(row, col)` of a worker, if the id exists
    pub fn position(&self, id: usize) -> Option<(usize, usize)> {
        if id < self.workers {
            Some((id / self.cols, id % self.cols))
        } else {
            None
        }
    }

    /// The worker at a grid position
    pub fn worker_at(&self, row: usize, col: usize) -> Option<usize> {
        if row < self.rows && col < self.cols {
            Some(row * self.cols + col)
        } else {
            None
        }
    }

    /// The worker one step from `id` in `direction`, wrapping around the torus
    pub fn neighbour(&self, id: usize, direction: Direction) -> Option<usize> {
        let (row, col) = self.position(id)?;
        let (d_row, d_col) = direction.offset();
        let row = (row as isize + d_row).rem_euclid(self.rows as isize) as usize;
        let col = (col as isize + d_col).rem_euclid(self.cols as isize) as usize;
        self.worker_at(row, col)
    }

    /// The neighbours of `id`, in canonical direction order
    pub fn neighbour_table(&self, id: usize) -> [(Direction, Option<usize>); 8] {
        Direction::ALL.map(|d| (d, self.neighbour(id, d)))
    }
}

impl Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} workers as {} rows x {} cols",
            self.workers, self.rows, self.cols
        )
    }
}
