// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Line-oriented text protocol spoken between the master and its workers, and
//! between neighbouring workers
//!
//! ## Master <-> Worker
//!
//! The worker connects and sends the handshake lines `worker`, `<port>`, `<host>`.
//! After that every exchange is initiated by a single [WorkerRequest] line:
//!
//! | Worker sends | Master replies |
//! |---|---|
//! | `neighbours` | 8 [NeighbourEntry] lines, then `done` |
//! | `rows` / `cols` | one integer |
//! | `cells` | `row,col,alive` records, then `done` |
//! | `ready` | nothing until a [MasterSignal] (`nextState` / `GameOver`) |
//!
//! Once the tile has been handed out, `cells` introduces a generation report from the
//! worker: records, then `done`.
//!
//! ## Worker <-> Worker
//!
//! `getBoundary`, then a direction token naming where the *serving* worker sits relative
//! to the requester. The reply is zero or more records, then `done`.

use std::fmt::Display;
use std::str::FromStr;

use crate::grid::{Cell, Grid};
use crate::topology::{Direction, UnknownDirection};

/// First handshake line sent by a worker
pub const HANDSHAKE_TOKEN: &str = "worker";
/// Terminates every multi-line reply
pub const DONE: &str = "done";
/// A neighbour table slot without a worker
pub const NULL_NEIGHBOUR: &str = "NULL";
/// Peer request for an edge of the serving worker's tile
pub const GET_BOUNDARY: &str = "getBoundary";

/// Protocol violations. These are reported and the offending line is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A cell record without exactly three fields, or with unparsable fields
    MalformedCell(String),
    /// A neighbour table line which is neither `NULL` nor `DIRECTION, host, port`
    MalformedNeighbour(String),
    /// A direction token we don't know
    UnknownDirection(String),
    /// A line which isn't a known command in the current context
    UnknownCommand(String),
    /// A line which should have held an integer
    BadInteger(String),
}

impl std::error::Error for ProtocolError {}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedCell(line) => write!(f, "Badly formatted cell record '{line}'"),
            Self::MalformedNeighbour(line) => write!(f, "Badly formatted neighbour '{line}'"),
            Self::UnknownDirection(token) => write!(f, "Unknown direction '{token}'"),
            Self::UnknownCommand(line) => write!(f, "Unknown command '{line}'"),
            Self::BadInteger(line) => write!(f, "Expected an integer, received '{line}'"),
        }
    }
}

impl From<UnknownDirection> for ProtocolError {
    fn from(value: UnknownDirection) -> Self {
        Self::UnknownDirection(value.0)
    }
}

// ============== Cell records ============== //

/// Encode a cell as `row,col,alive`
pub fn encode_cell(cell: &Cell) -> String {
    format!("{},{},{}", cell.row, cell.col, cell.alive)
}

/// Decode a `row,col,alive` record
pub fn decode_cell(line: &str) -> Result<Cell, ProtocolError> {
    let malformed = || ProtocolError::MalformedCell(line.to_string());
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(malformed());
    }
    let row = fields[0].parse::<usize>().map_err(|_| malformed())?;
    let col = fields[1].parse::<usize>().map_err(|_| malformed())?;
    let alive = if fields[2].eq_ignore_ascii_case("true") {
        true
    } else if fields[2].eq_ignore_ascii_case("false") {
        false
    } else {
        return Err(malformed());
    };
    Ok(Cell::new(row, col, alive))
}

/// Every cell of a grid as a record line, row-major
pub fn encode_grid(grid: &Grid) -> Vec<String> {
    grid.cells().map(encode_cell).collect()
}

impl FromStr for Cell {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_cell(s)
    }
}

// ============== Integers ============== //

/// Decode a single-integer line (`rows`, `cols` replies, the handshake port)
pub fn decode_usize(line: &str) -> Result<usize, ProtocolError> {
    line.trim()
        .parse::<usize>()
        .map_err(|_| ProtocolError::BadInteger(line.to_string()))
}

// ============== Neighbour table ============== //

/// Host and port a worker accepts peer connections on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerAddress {
    /// Host name or IP as declared by the worker
    pub host: String,
    /// Listening port
    pub port: u16,
}

impl WorkerAddress {
    /// `host:port`, suitable for connecting
    pub fn connect_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Display for WorkerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.host, self.port)
    }
}

/// One line of the neighbour table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighbourEntry {
    /// No neighbour in this slot
    Null,
    /// The worker lying in `direction`
    Peer {
        /// Where the neighbour lies
        direction: Direction,
        /// Where to reach it
        address: WorkerAddress,
    },
}

impl NeighbourEntry {
    /// Encode as `NULL` or `DIRECTION, host, port`
    pub fn encode(&self) -> String {
        match self {
            Self::Null => NULL_NEIGHBOUR.to_string(),
            Self::Peer { direction, address } => format!("{direction}, {address}"),
        }
    }

    /// Decode a neighbour table line
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let trimmed = line.trim();
        if trimmed == NULL_NEIGHBOUR {
            return Ok(Self::Null);
        }
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(ProtocolError::MalformedNeighbour(line.to_string()));
        }
        let direction = fields[0].parse::<Direction>()?;
        let port = fields[2]
            .parse::<u16>()
            .map_err(|_| ProtocolError::MalformedNeighbour(line.to_string()))?;
        Ok(Self::Peer {
            direction,
            address: WorkerAddress {
                host: fields[1].to_string(),
                port,
            },
        })
    }
}

// ============== Commands ============== //

/// A request line sent from a worker to the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Send me my neighbour table
    Neighbours,
    /// How many rows does my tile have
    Rows,
    /// How many columns does my tile have
    Cols,
    /// Send me my tile, or (once running) here comes my report
    Cells,
    /// I'm waiting for the next heartbeat
    Ready,
}

impl WorkerRequest {
    /// The wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neighbours => "neighbours",
            Self::Rows => "rows",
            Self::Cols => "cols",
            Self::Cells => "cells",
            Self::Ready => "ready",
        }
    }
}

impl FromStr for WorkerRequest {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "neighbours" => Ok(Self::Neighbours),
            "rows" => Ok(Self::Rows),
            "cols" => Ok(Self::Cols),
            "cells" => Ok(Self::Cells),
            "ready" => Ok(Self::Ready),
            _ => Err(ProtocolError::UnknownCommand(s.to_string())),
        }
    }
}

/// A line sent by the master to an idle, ready worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterSignal {
    /// Compute the next generation
    NextState,
    /// The run is over, disconnect
    GameOver,
}

impl MasterSignal {
    /// The wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextState => "nextState",
            Self::GameOver => "GameOver",
        }
    }
}

impl FromStr for MasterSignal {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "nextState" => Ok(Self::NextState),
            "GameOver" => Ok(Self::GameOver),
            _ => Err(ProtocolError::UnknownCommand(s.to_string())),
        }
    }
}
