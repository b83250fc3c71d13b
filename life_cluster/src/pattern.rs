// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Plain-text starting patterns. One line per row, one character per column.

use std::fmt::Display;
use std::path::Path;

use crate::grid::{Cell, Grid};

/// The character marking a live cell unless configured otherwise
pub const DEFAULT_LIVE_CHAR: char = 'x';

/// Failure to load a pattern
#[derive(Debug)]
pub enum PatternError {
    /// The file couldn't be read
    Io(std::io::Error),
    /// The file has no rows or no columns
    Empty,
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(cause) => Some(cause),
            Self::Empty => None,
        }
    }
}

impl Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to read pattern: {err}"),
            Self::Empty => write!(f, "Pattern is empty"),
        }
    }
}

impl From<std::io::Error> for PatternError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Parse a pattern. Lines shorter than the longest line are padded with dead cells.
pub fn parse_pattern(text: &str, live_char: char) -> Result<Grid, PatternError> {
    let lines: Vec<&str> = text.lines().collect();
    let cols = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    if lines.is_empty() || cols == 0 {
        return Err(PatternError::Empty);
    }

    let mut cells = Vec::with_capacity(lines.len() * cols);
    for (row, line) in lines.iter().enumerate() {
        let mut chars = line.chars();
        for col in 0..cols {
            let alive = chars.next() == Some(live_char);
            cells.push(Cell::new(row, col, alive));
        }
    }
    Grid::from_cells(lines.len(), cols, cells)
        .map_err(|_| PatternError::Empty)
}

/// Read and parse a pattern file
pub fn load_pattern<P: AsRef<Path>>(path: P, live_char: char) -> Result<Grid, PatternError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let grid = parse_pattern(&text, live_char)?;
    log::info!(
        "Loaded {}x{} pattern from {}",
        grid.rows(),
        grid.cols(),
        path.as_ref().display()
    );
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_lines_with_dead_cells() {
        let grid = parse_pattern(".x\nxxx\n", 'x').expect("pattern should parse");
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);
        assert_eq!(grid.live_cells(), vec![(0, 1), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn honours_the_live_character() {
        let grid = parse_pattern("O.x", 'O').expect("pattern should parse");
        assert_eq!(grid.live_cells(), vec![(0, 0)]);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        for text in ["", "\n\n"] {
            assert!(matches!(parse_pattern(text, 'x'), Err(PatternError::Empty)));
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_pattern("/definitely/not/a/pattern/file.txt", 'x');
        assert!(matches!(result, Err(PatternError::Io(_))));
    }
}
