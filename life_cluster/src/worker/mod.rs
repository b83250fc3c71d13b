// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The worker process: owns one tile of the board and advances it a generation at a
//! time on the master's signal
//!
//! ## Overview
//!
//! A [WorkerNode] binds its peer listener first, so its neighbours can reach it as
//! soon as the master publishes the neighbour tables. It then connects to the master,
//! announces itself and pulls its settings: the neighbour table, the tile dimensions
//! and the tile itself. One [PeerLink] is opened per neighbour.
//!
//! Every generation the worker fetches the 8 edges facing it from its neighbours,
//! borders its tile with them, applies the rule and reports the new tile to the master.
//!
//! ## Supervision
//!
//! The [TileKeeper] and the [PeerServer] are spawned by the [WorkerNode] and stopped
//! when the run ends. [PeerServer] supervises the peer listener and every inbound
//! [peer_server::PeerSession].

pub mod boundary;
pub mod peer_link;
pub mod peer_server;
pub mod tile_keeper;

pub use boundary::BoundaryError;
pub use peer_link::PeerLink;
pub use peer_server::{PeerServer, PeerServerMessage};
pub use tile_keeper::{TileKeeper, TileKeeperMessage};

use std::collections::BTreeMap;
use std::fmt::Display;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef};
use tokio::io::ErrorKind;

use crate::config::WorkerConfig;
use crate::grid::{self, Grid, GridError};
use crate::net::{listener, LineStream};
use crate::protocol::{
    self, MasterSignal, NeighbourEntry, ProtocolError, WorkerRequest, HANDSHAKE_TOKEN,
};
use crate::topology::Direction;

/// Failures which end a worker's run
#[derive(Debug)]
pub enum WorkerError {
    /// Network failure talking to the master or to a neighbour
    Io(std::io::Error),
    /// The master sent something which can't be used
    Protocol(ProtocolError),
    /// The tile couldn't be built
    Grid(GridError),
    /// A neighbour's edge doesn't fit the tile
    Boundary(BoundaryError),
    /// One of the worker's actors couldn't be started or reached
    Actor(String),
    /// Neighbours didn't collect this generation's edges in time
    CommitTimeout(usize),
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(cause) => Some(cause),
            Self::Protocol(cause) => Some(cause),
            Self::Grid(cause) => Some(cause),
            Self::Boundary(cause) => Some(cause),
            Self::Actor(_) | Self::CommitTimeout(_) => None,
        }
    }
}

impl Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Network error: {err}"),
            Self::Protocol(err) => write!(f, "Protocol error: {err}"),
            Self::Grid(err) => write!(f, "Grid error: {err}"),
            Self::Boundary(err) => write!(f, "Boundary error: {err}"),
            Self::Actor(reason) => write!(f, "Actor error: {reason}"),
            Self::CommitTimeout(generation) => write!(
                f,
                "Neighbours didn't collect the edges of generation {generation} in time"
            ),
        }
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ProtocolError> for WorkerError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<GridError> for WorkerError {
    fn from(value: GridError) -> Self {
        Self::Grid(value)
    }
}

impl From<BoundaryError> for WorkerError {
    fn from(value: BoundaryError) -> Self {
        Self::Boundary(value)
    }
}

/// The result of a worker's run
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    /// Generations computed before `GameOver`
    pub generations: usize,
    /// The last committed tile
    pub tile: Grid,
}

/// Errors worth another connection attempt to the master
fn is_retryable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable
    )
}

/// A worker process
pub struct WorkerNode {
    config: WorkerConfig,
}

impl WorkerNode {
    /// Create a new worker
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Serve one run, from connecting to the master until `GameOver`
    pub async fn run(&self) -> Result<WorkerSummary, WorkerError> {
        let socket = listener::bind(self.config.listen_port).await?;
        let listen_port = socket.local_addr()?.port();
        log::info!("Worker accepting peers on port {listen_port}");

        let (tile_keeper, keeper_handle) = Actor::spawn(None, TileKeeper, ())
            .await
            .map_err(|err| WorkerError::Actor(err.to_string()))?;
        let (peer_server, server_handle) =
            match Actor::spawn(None, PeerServer::new(tile_keeper.clone()), socket).await {
                Ok(spawned) => spawned,
                Err(err) => {
                    tile_keeper.stop(None);
                    return Err(WorkerError::Actor(err.to_string()));
                }
            };

        let result = self.serve(listen_port, &tile_keeper).await;
        match &result {
            Ok(summary) => log::info!("Game over after {} generations", summary.generations),
            Err(err) => log::error!("Worker failed: {err}"),
        }

        peer_server.stop(None);
        tile_keeper.stop(None);
        let _ = server_handle.await;
        let _ = keeper_handle.await;
        result
    }

    async fn connect_master(&self) -> Result<LineStream, WorkerError> {
        let address = self.config.master_address();
        loop {
            match LineStream::connect(address.as_str(), self.config.connect_timeout, None).await {
                Ok(stream) => {
                    log::info!("Connected to the master at {address}");
                    return Ok(stream);
                }
                Err(err) if is_retryable(&err) => {
                    log::warn!(
                        "Master at {address} unreachable ({err}), retrying in {}ms",
                        self.config.connect_retry_delay.as_millis()
                    );
                    tokio::time::sleep(self.config.connect_retry_delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn serve(
        &self,
        listen_port: u16,
        tile_keeper: &ActorRef<TileKeeperMessage>,
    ) -> Result<WorkerSummary, WorkerError> {
        let mut master = self.connect_master().await?;

        let host = match &self.config.advertise_host {
            Some(host) => host.clone(),
            None => master.local_addr().ip().to_string(),
        };
        master
            .send_lines([
                HANDSHAKE_TOKEN.to_string(),
                listen_port.to_string(),
                host.clone(),
            ])
            .await?;
        log::info!("Announced ourselves as {host}:{listen_port}");

        let (mut links, expected_peers) = self.link_neighbours(&mut master).await?;
        let mut tile = fetch_tile(&mut master).await?;
        tile_keeper
            .cast(TileKeeperMessage::Install {
                tile: tile.clone(),
                expected_peers,
            })
            .map_err(|err| WorkerError::Actor(err.to_string()))?;

        let mut generation = 0;
        loop {
            master.send_line(WorkerRequest::Ready.as_str()).await?;
            match next_signal(&mut master).await? {
                MasterSignal::GameOver => break,
                MasterSignal::NextState => {}
            }
            generation += 1;

            tile = self
                .step(&tile, &mut links, tile_keeper, generation)
                .await?;

            let report = std::iter::once(WorkerRequest::Cells.as_str().to_string())
                .chain(protocol::encode_grid(&tile))
                .chain(std::iter::once(protocol::DONE.to_string()));
            master.send_lines(report).await?;
            log::debug!("Reported generation {generation}");
        }

        for (_, link) in links {
            link.close().await;
        }
        let _ = master.shutdown().await;
        Ok(WorkerSummary {
            generations: generation,
            tile,
        })
    }

    /// Request the neighbour table and open a link per neighbour. Also returns the
    /// number of neighbours in the table, which is how many edge requests the tile
    /// keeper serves per generation.
    ///
    /// A neighbour which can't be reached is left out of the links, so its edge is
    /// missing and the rule falls back to the bare tile
    async fn link_neighbours(
        &self,
        master: &mut LineStream,
    ) -> Result<(BTreeMap<Direction, PeerLink>, usize), WorkerError> {
        master.send_line(WorkerRequest::Neighbours.as_str()).await?;
        let mut links = BTreeMap::new();
        let mut expected_peers = 0;
        for line in master.recv_until_done().await? {
            let (direction, address) = match NeighbourEntry::decode(&line) {
                Ok(NeighbourEntry::Peer { direction, address }) => (direction, address),
                Ok(NeighbourEntry::Null) => continue,
                Err(err) => {
                    log::warn!("{err}. Skipping");
                    continue;
                }
            };
            expected_peers += 1;
            match PeerLink::connect(
                direction,
                address.clone(),
                self.config.connect_timeout,
                self.config.peer_timeout,
            )
            .await
            {
                Ok(link) => {
                    if let Some(previous) = links.insert(direction, link) {
                        log::warn!("Duplicate {direction} neighbour, replacing the first link");
                        previous.close().await;
                    }
                }
                Err(err) => {
                    log::warn!("{direction} neighbour at {address} unreachable ({err}), no edge");
                }
            }
        }
        log::info!("Linked to {} of {expected_peers} neighbours", links.len());
        Ok((links, expected_peers))
    }

    /// Compute the next tile and commit it once our neighbours have what they need
    async fn step(
        &self,
        tile: &Grid,
        links: &mut BTreeMap<Direction, PeerLink>,
        tile_keeper: &ActorRef<TileKeeperMessage>,
        generation: usize,
    ) -> Result<Grid, WorkerError> {
        let mut edges = boundary::BoundaryEdges::new();
        for (direction, link) in links.iter_mut() {
            edges.set(*direction, link.fetch_boundary().await?);
        }

        let next = match boundary::assemble_bordered(tile, &edges) {
            Ok(bordered) => boundary::strip_border(&grid::next_state(&bordered))?,
            Err(BoundaryError::Missing(direction)) => {
                log::warn!(
                    "No boundary from the {direction} in generation {generation}, edges are dead"
                );
                grid::next_state(tile)
            }
            Err(err) => return Err(err.into()),
        };

        match tile_keeper
            .call(
                |tx| TileKeeperMessage::Commit(next.clone(), tx),
                self.config.commit_timeout,
            )
            .await
        {
            Ok(CallResult::Success(())) => Ok(next),
            Ok(CallResult::Timeout) => Err(WorkerError::CommitTimeout(generation)),
            Ok(CallResult::SenderError) => Err(WorkerError::Actor(
                "the tile keeper dropped the commit".to_string(),
            )),
            Err(err) => Err(WorkerError::Actor(err.to_string())),
        }
    }
}

/// Request the tile dimensions and cells. Cells are placed by their absolute
/// coordinates modulo the tile size.
async fn fetch_tile(master: &mut LineStream) -> Result<Grid, WorkerError> {
    master.send_line(WorkerRequest::Rows.as_str()).await?;
    let rows = protocol::decode_usize(&master.recv_line().await?)?;
    master.send_line(WorkerRequest::Cols.as_str()).await?;
    let cols = protocol::decode_usize(&master.recv_line().await?)?;
    if rows == 0 || cols == 0 {
        return Err(GridError::Empty.into());
    }

    master.send_line(WorkerRequest::Cells.as_str()).await?;
    let cells = master
        .recv_until_done()
        .await?
        .iter()
        .filter_map(|line| match protocol::decode_cell(line) {
            Ok(cell) => Some(((cell.row % rows, cell.col % cols), cell)),
            Err(err) => {
                log::warn!("{err}. Skipping");
                None
            }
        })
        .collect::<Vec<_>>();
    let tile = Grid::from_placements(rows, cols, cells)?;
    log::info!("Received a {rows}x{cols} tile");
    Ok(tile)
}

/// Wait on the master's next signal, skipping anything else
async fn next_signal(master: &mut LineStream) -> Result<MasterSignal, WorkerError> {
    loop {
        let line = master.recv_line().await?;
        match line.parse::<MasterSignal>() {
            Ok(signal) => return Ok(signal),
            Err(err) => log::warn!("{err} while waiting on the master. Skipping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::protocol::{WorkerAddress, DONE};

    fn local(port: u16) -> WorkerAddress {
        WorkerAddress {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[test]
    fn retryable_connect_errors() {
        let retryable = |kind: ErrorKind| is_retryable(&std::io::Error::from(kind));
        assert!(retryable(ErrorKind::ConnectionRefused));
        assert!(retryable(ErrorKind::TimedOut));
        assert!(!retryable(ErrorKind::InvalidInput));
        assert!(!retryable(ErrorKind::PermissionDenied));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_neighbour_is_left_out() {
        let master_socket = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind master");
        let master_port = master_socket.local_addr().expect("No address").port();
        let live = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind neighbour");
        let live_port = live.local_addr().expect("No address").port();
        // nothing listens here once the socket is dropped
        let dead_port = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind")
            .local_addr()
            .expect("No address")
            .port();

        let table = vec![
            NeighbourEntry::Peer {
                direction: Direction::North,
                address: local(live_port),
            },
            NeighbourEntry::Peer {
                direction: Direction::South,
                address: local(dead_port),
            },
            NeighbourEntry::Null,
        ];
        let master = tokio::spawn(async move {
            let (stream, _) = master_socket.accept().await.expect("Failed to accept");
            let mut stream = LineStream::from_stream(stream, None).expect("Bad stream");
            let request = stream.recv_line().await.expect("Failed to read request");
            assert_eq!(request, WorkerRequest::Neighbours.as_str());
            let lines = table
                .iter()
                .map(NeighbourEntry::encode)
                .chain(std::iter::once(DONE.to_string()));
            stream
                .send_lines(lines)
                .await
                .expect("Failed to send table");
            stream
        });

        let node = WorkerNode::new(WorkerConfig::new(0, "127.0.0.1".to_string(), master_port));
        let mut stream = LineStream::connect(("127.0.0.1", master_port), None, None)
            .await
            .expect("Failed to reach master");
        let (links, expected_peers) = node
            .link_neighbours(&mut stream)
            .await
            .expect("Unreachable neighbour failed the worker");

        assert_eq!(expected_peers, 2);
        assert_eq!(
            links.keys().copied().collect::<Vec<_>>(),
            vec![Direction::North]
        );

        for (_, link) in links {
            link.close().await;
        }
        let _ = master.await.expect("Master task panicked");
        drop(live);
    }
}
