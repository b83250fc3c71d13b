// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Drives a run from the master's side: waits on the roster, hands out the tiles and
//! collects one generation after the other until the board stops changing or the
//! generation limit is reached.

use std::fmt::Display;

use futures::future::join_all;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, MessagingErr};

use super::{LiveWorker, MasterServer, MasterServerMessage, WorkAssignment, WorkerSessionMessage};
use crate::config::MasterConfig;
use crate::grid::{self, Cell, Grid, GridError};
use crate::protocol::NeighbourEntry;
use crate::topology::{Topology, TopologyError};

/// Failures which abort a run
#[derive(Debug)]
pub enum CoordinatorError {
    /// The master server couldn't be started
    Startup(String),
    /// Not enough workers showed up in time
    StartupTimeout,
    /// The worker layout couldn't be computed
    Topology(TopologyError),
    /// The board couldn't be built or split into tiles
    Grid(GridError),
    /// A worker went away while the run was in progress
    WorkerLost {
        /// Roster id of the worker
        worker: usize,
        /// What happened
        reason: String,
    },
    /// A worker didn't report its generation in time
    GenerationTimeout {
        /// Roster id of the worker
        worker: usize,
        /// The generation being computed
        generation: usize,
    },
    /// The merged reports didn't cover the whole board
    IncompleteGeneration {
        /// The generation being computed
        generation: usize,
        /// What was missing
        cause: GridError,
    },
}

impl std::error::Error for CoordinatorError {}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Startup(reason) => write!(f, "Failed to start the master: {reason}"),
            Self::StartupTimeout => write!(f, "Timed out waiting for workers to connect"),
            Self::Topology(err) => write!(f, "Topology error: {err}"),
            Self::Grid(err) => write!(f, "Grid error: {err}"),
            Self::WorkerLost { worker, reason } => write!(f, "Lost worker {worker}: {reason}"),
            Self::GenerationTimeout { worker, generation } => write!(
                f,
                "Worker {worker} didn't report generation {generation} in time"
            ),
            Self::IncompleteGeneration { generation, cause } => {
                write!(f, "Generation {generation} is incomplete: {cause}")
            }
        }
    }
}

impl From<TopologyError> for CoordinatorError {
    fn from(value: TopologyError) -> Self {
        Self::Topology(value)
    }
}

impl From<GridError> for CoordinatorError {
    fn from(value: GridError) -> Self {
        Self::Grid(value)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The board stopped changing
    Converged,
    /// The generation limit was reached
    ExhaustedGenerations,
}

/// The result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Generations computed
    pub generations: usize,
    /// The board at the end of the run
    pub board: Grid,
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinatorPhase {
    AwaitingWorkers,
    DistributingWork,
    Running(usize),
    Converged(usize),
    ExhaustedGenerations(usize),
    ShuttingDown,
}

/// Steps a board through the workers registered with a [MasterServer]
pub struct Coordinator {
    config: MasterConfig,
    server: ActorRef<MasterServerMessage>,
}

impl Coordinator {
    /// Create a coordinator for the workers of `server`
    pub fn new(config: MasterConfig, server: ActorRef<MasterServerMessage>) -> Self {
        Self { config, server }
    }

    fn enter(&self, phase: CoordinatorPhase) {
        log::info!("Coordinator entering {phase:?}");
    }

    /// Run `pattern` to completion. The workers are sent `GameOver` whatever the result.
    pub async fn run(&self, pattern: &Grid) -> Result<RunSummary, CoordinatorError> {
        self.enter(CoordinatorPhase::AwaitingWorkers);
        let roster = self.await_workers().await?;

        let result = self.drive(&roster, pattern).await;
        if let Err(err) = &result {
            log::error!("Run aborted: {err}");
        }

        self.enter(CoordinatorPhase::ShuttingDown);
        self.shutdown(&roster).await;
        result
    }

    async fn await_workers(&self) -> Result<Vec<LiveWorker>, CoordinatorError> {
        match self
            .server
            .call(
                MasterServerMessage::AwaitWorkers,
                self.config.startup_timeout,
            )
            .await
        {
            Ok(CallResult::Success(roster)) => Ok(roster),
            Ok(CallResult::Timeout) => Err(CoordinatorError::StartupTimeout),
            Ok(CallResult::SenderError) => Err(CoordinatorError::Startup(
                "the master server dropped the request".to_string(),
            )),
            Err(err) => Err(CoordinatorError::Startup(err.to_string())),
        }
    }

    async fn drive(
        &self,
        roster: &[LiveWorker],
        pattern: &Grid,
    ) -> Result<RunSummary, CoordinatorError> {
        let topology = Topology::plan(roster.len())?;
        log::info!("Topology: {topology}");

        let mut board = grid::embed_pattern(&topology, self.config.block_size, pattern)?;
        log::info!("Generation 0:\n{board}");

        self.enter(CoordinatorPhase::DistributingWork);
        for worker in roster {
            let assignment = WorkAssignment {
                neighbours: neighbour_entries(&topology, roster, worker.id),
                tile: board.tile(&topology, worker.id)?,
            };
            worker
                .session
                .cast(WorkerSessionMessage::Assign(assignment))
                .map_err(|err| lost(worker, err))?;
        }

        for generation in 1..=self.config.generation_limit {
            self.enter(CoordinatorPhase::Running(generation));
            let next = self.collect_generation(roster, &board, generation).await?;
            log::info!("Generation {generation}:\n{next}");

            let converged = next.is_identical(&board);
            board = next;
            if converged {
                self.enter(CoordinatorPhase::Converged(generation));
                return Ok(RunSummary {
                    outcome: RunOutcome::Converged,
                    generations: generation,
                    board,
                });
            }
        }

        self.enter(CoordinatorPhase::ExhaustedGenerations(
            self.config.generation_limit,
        ));
        Ok(RunSummary {
            outcome: RunOutcome::ExhaustedGenerations,
            generations: self.config.generation_limit,
            board,
        })
    }

    /// Ask every worker for its next tile and merge the reports into a new board
    async fn collect_generation(
        &self,
        roster: &[LiveWorker],
        board: &Grid,
        generation: usize,
    ) -> Result<Grid, CoordinatorError> {
        let timeout = self.config.generation_timeout;
        let next = WorkerSessionMessage::NextGeneration;
        let calls = roster
            .iter()
            .map(|worker| worker.session.call(next, timeout));
        let results = join_all(calls).await;

        let mut cells: Vec<Cell> = Vec::with_capacity(board.rows() * board.cols());
        for (worker, result) in roster.iter().zip(results) {
            match result {
                Ok(CallResult::Success(reported)) => cells.extend(reported),
                Ok(CallResult::Timeout) => {
                    return Err(CoordinatorError::GenerationTimeout {
                        worker: worker.id,
                        generation,
                    })
                }
                Ok(CallResult::SenderError) => {
                    return Err(CoordinatorError::WorkerLost {
                        worker: worker.id,
                        reason: "connection closed before the report was complete".to_string(),
                    })
                }
                Err(err) => return Err(lost(worker, err)),
            }
        }

        let placements = cells.into_iter().map(|cell| ((cell.row, cell.col), cell));
        match Grid::from_placements(board.rows(), board.cols(), placements) {
            Ok(next) => Ok(next),
            Err(cause) => Err(CoordinatorError::IncompleteGeneration { generation, cause }),
        }
    }

    async fn shutdown(&self, roster: &[LiveWorker]) {
        let timeout = self.config.shutdown_timeout;
        let shutdown = WorkerSessionMessage::Shutdown;
        let calls = roster
            .iter()
            .map(|worker| worker.session.call(shutdown, timeout));
        for (worker, result) in roster.iter().zip(join_all(calls).await) {
            if !matches!(result, Ok(CallResult::Success(()))) {
                log::debug!("Worker {} was already gone at shutdown", worker.id);
            }
        }
    }
}

fn lost<T>(worker: &LiveWorker, err: MessagingErr<T>) -> CoordinatorError {
    CoordinatorError::WorkerLost {
        worker: worker.id,
        reason: err.to_string(),
    }
}

/// The neighbour table sent to worker `id`
fn neighbour_entries(
    topology: &Topology,
    roster: &[LiveWorker],
    id: usize,
) -> Vec<NeighbourEntry> {
    topology
        .neighbour_table(id)
        .into_iter()
        .map(|(direction, neighbour)| {
            let worker = neighbour.and_then(|n| roster.get(n));
            match worker {
                Some(worker) => NeighbourEntry::Peer {
                    direction,
                    address: worker.address.clone(),
                },
                None => NeighbourEntry::Null,
            }
        })
        .collect()
}

/// Start a [MasterServer], run `pattern` on the workers which connect to it and stop
/// the server again
pub async fn run_master(
    config: MasterConfig,
    pattern: Grid,
) -> Result<RunSummary, CoordinatorError> {
    let (server, handle) = Actor::spawn(
        None,
        MasterServer::new(config.port, config.worker_count),
        (),
    )
    .await
    .map_err(|err| CoordinatorError::Startup(err.to_string()))?;

    let result = Coordinator::new(config, server.clone()).run(&pattern).await;

    server.stop(None);
    let _ = handle.await;
    result
}
