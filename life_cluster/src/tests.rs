// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Full runs of a master and its workers over localhost sockets

use std::net::SocketAddr;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::grid::{embed_pattern, Cell, Grid};
use crate::master::{Coordinator, MasterServer, MasterServerMessage, RunOutcome, RunSummary};
use crate::pattern::parse_pattern;
use crate::topology::Topology;
use crate::worker::{WorkerError, WorkerNode, WorkerSummary};
use crate::{MasterConfig, WorkerConfig};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const GLIDER: &str = ".x.\n..x\nxxx\n";

const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

async fn start_master(
    workers: usize,
) -> (ActorRef<MasterServerMessage>, JoinHandle<()>, SocketAddr) {
    let (server, handle) = Actor::spawn(None, MasterServer::new(0, workers), ())
        .await
        .expect("Failed to start master server");
    let addr = match server
        .call(MasterServerMessage::GetLocalAddr, Some(TEST_TIMEOUT))
        .await
        .expect("Failed to query the master's address")
    {
        CallResult::Success(addr) => addr,
        _ => panic!("Master didn't report its address"),
    };
    (server, handle, addr)
}

fn spawn_worker(master: SocketAddr) -> JoinHandle<Result<WorkerSummary, WorkerError>> {
    let config = WorkerConfig::new(0, "127.0.0.1".to_string(), master.port())
        .with_io_timeout(Some(TEST_TIMEOUT));
    tokio::spawn(async move { WorkerNode::new(config).run().await })
}

/// Run `pattern` on `workers` workers and wait on everyone to exit
async fn run_cluster(
    workers: usize,
    block_size: usize,
    generation_limit: usize,
    pattern: &Grid,
) -> (RunSummary, Vec<WorkerSummary>) {
    let (server, server_handle, addr) = start_master(workers).await;
    let worker_handles: Vec<_> = (0..workers).map(|_| spawn_worker(addr)).collect();

    let config = MasterConfig::new(0, generation_limit, workers)
        .with_block_size(block_size)
        .with_generation_timeout(Some(TEST_TIMEOUT));
    let summary = tokio::time::timeout(
        TEST_TIMEOUT * 3,
        Coordinator::new(config, server.clone()).run(pattern),
    )
    .await
    .expect("Run timed out")
    .expect("Run failed");

    let mut worker_summaries = Vec::new();
    for handle in worker_handles {
        let worker = tokio::time::timeout(TEST_TIMEOUT, handle)
            .await
            .expect("Worker didn't exit after GameOver")
            .expect("Worker task panicked")
            .expect("Worker failed");
        worker_summaries.push(worker);
    }

    server.stop(None);
    server_handle.await.expect("Master server panicked");
    (summary, worker_summaries)
}

/// A plain single-process step on a torus
fn toroidal_step(grid: &Grid) -> Grid {
    let rows = grid.rows() as isize;
    let cols = grid.cols() as isize;
    let alive = |r: isize, c: isize| {
        let (r, c) = (r.rem_euclid(rows) as usize, c.rem_euclid(cols) as usize);
        grid.get(r, c).map(|cell| cell.alive).unwrap_or(false)
    };
    let mut cells = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            let neighbours = NEIGHBOUR_OFFSETS
                .iter()
                .filter(|(dr, dc)| alive(r + dr, c + dc))
                .count();
            let next = matches!((alive(r, c), neighbours), (true, 2) | (_, 3));
            cells.push(Cell::new(r as usize, c as usize, next));
        }
    }
    Grid::from_cells(grid.rows(), grid.cols(), cells)
        .expect("Failed to build reference grid")
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_moves_a_glider() {
    let pattern = parse_pattern(GLIDER, 'x').expect("Failed to parse glider");
    let topology = Topology::plan(1).expect("Failed to plan");
    let mut expected = embed_pattern(&topology, 10, &pattern).expect("Failed to embed pattern");

    let mut history = vec![expected.live_cells()];
    for limit in 1..=5 {
        let (summary, workers) = run_cluster(1, 10, limit, &pattern).await;
        expected = toroidal_step(&expected);

        assert_eq!(summary.outcome, RunOutcome::ExhaustedGenerations);
        assert_eq!(summary.generations, limit);
        assert_eq!((summary.board.rows(), summary.board.cols()), (10, 10));
        assert_eq!(summary.board.live_cells(), expected.live_cells());
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].generations, limit);
        assert!(workers[0].tile.is_identical(&summary.board));
        history.push(summary.board.live_cells());
    }

    // every 4 generations the glider is back in shape, one cell down and to the right
    let shifted = |cells: &[(usize, usize)]| -> Vec<(usize, usize)> {
        cells.iter().map(|(r, c)| (r + 1, c + 1)).collect()
    };
    assert_eq!(history[4], shifted(&history[0]));
    assert_eq!(history[5], shifted(&history[1]));
    assert_eq!(history[5], vec![(6, 5), (6, 7), (7, 6), (7, 7), (8, 6)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_board_converges_after_one_generation() {
    let pattern = parse_pattern(".", 'x').expect("Failed to parse pattern");
    let (summary, workers) = run_cluster(1, 1, 10, &pattern).await;

    assert_eq!(summary.outcome, RunOutcome::Converged);
    assert_eq!(summary.generations, 1);
    assert_eq!(summary.board.rows(), 1);
    assert!(summary.board.live_cells().is_empty());
    assert_eq!(workers[0].generations, 1);
}

/// Run a glider on `workers` workers and compare every tile with a single-process torus
async fn glider_matches_a_single_torus(workers: usize, block_size: usize, generations: usize) {
    let pattern = parse_pattern(GLIDER, 'x').expect("Failed to parse glider");
    let (summary, worker_summaries) =
        run_cluster(workers, block_size, generations, &pattern).await;

    let topology = Topology::plan(workers).expect("Failed to plan");
    let mut expected =
        embed_pattern(&topology, block_size, &pattern).expect("Failed to embed pattern");
    for _ in 0..generations {
        expected = toroidal_step(&expected);
    }

    assert_eq!(summary.outcome, RunOutcome::ExhaustedGenerations);
    assert_eq!(summary.generations, generations);
    assert_eq!(summary.board.live_cells(), expected.live_cells());

    assert_eq!(worker_summaries.len(), workers);
    let tiles: usize = worker_summaries
        .iter()
        .map(|w| w.tile.live_cells().len())
        .sum();
    assert_eq!(tiles, expected.live_cells().len());
}

#[tokio::test(flavor = "multi_thread")]
async fn two_workers_match_a_single_torus() {
    // 2 workers stack as 2 rows of 1, the glider starts across the seam between them
    let topology = Topology::plan(2).expect("Failed to plan");
    assert_eq!((topology.rows(), topology.cols()), (2, 1));
    glider_matches_a_single_torus(2, 6, 8).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn six_workers_match_a_single_torus() {
    // 3 rows of 2 tiles, a 12x8 board which the glider crosses in both directions
    let topology = Topology::plan(6).expect("Failed to plan");
    assert_eq!((topology.rows(), topology.cols()), (3, 2));
    glider_matches_a_single_torus(6, 4, 16).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn twelve_workers_match_a_single_torus() {
    // 6 rows of 2 tiles of 3x3, narrow enough for the glider to wrap sideways
    let topology = Topology::plan(12).expect("Failed to plan");
    assert_eq!((topology.rows(), topology.cols()), (6, 2));
    glider_matches_a_single_torus(12, 3, 12).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn block_is_stable_across_four_workers() {
    let pattern = parse_pattern("xx\nxx\n", 'x').expect("Failed to parse block");
    let (summary, _) = run_cluster(4, 3, 10, &pattern).await;

    assert_eq!(summary.outcome, RunOutcome::Converged);
    assert_eq!(summary.generations, 1);
    // centred on the corner shared by all 4 tiles
    assert_eq!(
        summary.board.live_cells(),
        vec![(2, 2), (2, 3), (3, 2), (3, 3)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_handshake_is_disconnected() {
    let (server, server_handle, addr) = start_master(1).await;

    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("Failed to connect to the master");
    let (read, mut write) = stream.into_split();
    write.write_all(b"hello\n").await.expect("Failed to write");

    let mut reader = BufReader::new(read);
    let mut line = String::new();
    let read = tokio::time::timeout(TEST_TIMEOUT, reader.read_line(&mut line))
        .await
        .expect("Connection wasn't closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    let workers = server
        .call(MasterServerMessage::GetWorkers, Some(TEST_TIMEOUT))
        .await
        .expect("Failed to query workers");
    let CallResult::Success(workers) = workers else {
        panic!("Master didn't report its workers");
    };
    assert!(workers.is_empty());

    server.stop(None);
    server_handle.await.expect("Master server panicked");
}
