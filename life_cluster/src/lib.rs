// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! # Conway's Game of Life, distributed over a pool of worker processes
//!
//! A single **master** loads a starting pattern, centres it on a board sized for the
//! number of workers and splits the board into equal rectangular tiles, one per
//! **worker**. The workers are laid out on a torus (see [topology]), so every worker
//! has exactly 8 neighbours and the board wraps around at its edges.
//!
//! Every generation each worker fetches the edge cells facing it from its 8 neighbours,
//! applies the rule to its tile and reports the result to the master, which merges the
//! reports and stops once the board no longer changes or the generation limit is hit.
//!
//! All of the traffic, between the master and its workers as well as between
//! neighbouring workers, is a line-oriented text protocol over TCP (see [protocol]).
//!
//! ## Processes
//!
//! * [master::MasterServer] and [master::Coordinator] (or just [master::run_master])
//!   run the master
//! * [worker::WorkerNode] runs a worker
//!
//! Both sides are built from [ractor] actors: one actor per listening socket, one per
//! connection, plus a registry actor owning each side's shared state.

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod net;

pub mod config;
pub mod grid;
pub mod master;
pub mod pattern;
pub mod protocol;
pub mod topology;
pub mod worker;

#[cfg(test)]
mod tests;

/// Represents the id of a connection, unique per accepting server
pub type NodeId = u64;

// ============== Re-exports ============== //
pub use config::{MasterConfig, WorkerConfig};
pub use grid::{Cell, Grid};
pub use master::{
    run_master, Coordinator, MasterServer, MasterServerMessage, RunOutcome, RunSummary,
};
pub use net::{LineStream, NetworkPort, SessionEvent};
pub use topology::{Direction, Topology};
pub use worker::{WorkerNode, WorkerSummary};
