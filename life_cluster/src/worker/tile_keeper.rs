// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The [TileKeeper] owns a worker's current tile. Peer sessions read edges from it
//! and the generation loop commits each new tile to it.
//!
//! It also acts as the generation barrier: a committed tile only replaces the current
//! one once the current one has served an edge to every inbound peer, so a slow peer
//! never reads an edge from the wrong generation. Requests arriving before the first
//! tile is installed are parked and answered (and counted) by the install.

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use super::boundary;
use crate::grid::{Cell, Grid};
use crate::topology::Direction;

/// Messages handled by the [TileKeeper]
pub enum TileKeeperMessage {
    /// Install the first tile. `expected_peers` boundary requests are served per generation
    Install {
        /// The tile as received from the master
        tile: Grid,
        /// Boundary requests to serve before a commit may proceed
        expected_peers: usize,
    },

    /// Serve the edge facing a requester, who sees us lying in the given direction
    Boundary(Direction, RpcReplyPort<Vec<Cell>>),

    /// Replace the current tile, replying once it has been swapped in
    Commit(Grid, RpcReplyPort<()>),

    /// The current tile
    GetTile(RpcReplyPort<Option<Grid>>),
}

/// Holds the current tile of a worker
pub struct TileKeeper;

/// The state of the [TileKeeper]
pub struct TileKeeperState {
    tile: Option<Grid>,
    expected_peers: usize,
    served: usize,
    generation: usize,
    pending: Option<(Grid, RpcReplyPort<()>)>,
    early: Vec<(Direction, RpcReplyPort<Vec<Cell>>)>,
}

impl TileKeeperState {
    fn serve(&mut self, direction: Direction, reply: RpcReplyPort<Vec<Cell>>) {
        match &self.tile {
            Some(tile) => {
                self.served += 1;
                let _ = reply.send(boundary::edge_facing(tile, direction));
            }
            None => {
                log::debug!("Boundary {direction} requested before the tile arrived, parking it");
                self.early.push((direction, reply));
            }
        }
    }

    fn try_commit(&mut self) {
        if self.served < self.expected_peers {
            return;
        }
        if let Some((tile, reply)) = self.pending.take() {
            self.served -= self.expected_peers;
            self.tile = Some(tile);
            self.generation += 1;
            log::debug!("Tile committed for generation {}", self.generation);
            let _ = reply.send(());
        }
    }
}

#[async_trait::async_trait]
impl Actor for TileKeeper {
    type Msg = TileKeeperMessage;
    type State = TileKeeperState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _: (),
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(Self::State {
            tile: None,
            expected_peers: 0,
            served: 0,
            generation: 0,
            pending: None,
            early: Vec::new(),
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Self::Msg::Install {
                tile,
                expected_peers,
            } => {
                log::info!(
                    "Installed {}x{} tile, serving {} peers per generation",
                    tile.rows(),
                    tile.cols(),
                    expected_peers
                );
                state.tile = Some(tile);
                state.expected_peers = expected_peers;
                for (direction, reply) in std::mem::take(&mut state.early) {
                    state.serve(direction, reply);
                }
                state.try_commit();
            }
            Self::Msg::Boundary(direction, reply) => {
                state.serve(direction, reply);
                state.try_commit();
            }
            Self::Msg::Commit(tile, reply) => {
                if state.pending.replace((tile, reply)).is_some() {
                    log::warn!("Overlapping commits, the earlier one is dropped");
                }
                state.try_commit();
            }
            Self::Msg::GetTile(reply) => {
                let _ = reply.send(state.tile.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ractor::rpc::CallResult;
    use tokio::time::Duration;

    use super::*;

    fn square(alive: bool) -> Grid {
        let cells = (0..2)
            .flat_map(|r| (0..2).map(move |c| Cell::new(r, c, alive)))
            .collect();
        Grid::from_cells(2, 2, cells).expect("Failed to build tile")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_waits_on_every_peer() {
        let (keeper, handle) = Actor::spawn(None, TileKeeper, ())
            .await
            .expect("Failed to start tile keeper");
        keeper
            .cast(TileKeeperMessage::Install {
                tile: square(false),
                expected_peers: 2,
            })
            .expect("Failed to install tile");

        let commit = {
            let keeper = keeper.clone();
            tokio::spawn(async move {
                keeper
                    .call(|tx| TileKeeperMessage::Commit(square(true), tx), None)
                    .await
            })
        };

        // the first peer still reads the old tile
        let edge = keeper
            .call(|tx| TileKeeperMessage::Boundary(Direction::South, tx), None)
            .await
            .expect("Failed to query boundary");
        let CallResult::Success(cells) = edge else {
            panic!("Boundary request failed");
        };
        assert!(cells.iter().all(|c| !c.alive));
        assert!(!commit.is_finished());

        let edge = keeper
            .call(|tx| TileKeeperMessage::Boundary(Direction::East, tx), None)
            .await
            .expect("Failed to query boundary");
        let CallResult::Success(cells) = edge else {
            panic!("Boundary request failed");
        };
        assert_eq!(cells.len(), 2);
        assert!(cells.iter().all(|c| !c.alive));

        let committed = commit.await.expect("Commit task panicked");
        assert!(matches!(committed, Ok(CallResult::Success(()))));

        let tile = keeper
            .call(TileKeeperMessage::GetTile, None)
            .await
            .expect("Failed to query tile");
        let CallResult::Success(tile) = tile else {
            panic!("Tile query failed");
        };
        assert_eq!(tile, Some(square(true)));

        keeper.stop(None);
        handle.await.expect("Tile keeper panicked");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn early_requests_count_towards_the_next_commit() {
        let (keeper, handle) = Actor::spawn(None, TileKeeper, ())
            .await
            .expect("Failed to start tile keeper");
        keeper
            .cast(TileKeeperMessage::Install {
                tile: square(false),
                expected_peers: 1,
            })
            .expect("Failed to install tile");

        let _ = keeper
            .call(|tx| TileKeeperMessage::Boundary(Direction::North, tx), None)
            .await
            .expect("Failed to query boundary");
        let committed = keeper
            .call(|tx| TileKeeperMessage::Commit(square(true), tx), None)
            .await
            .expect("Failed to commit");
        assert!(matches!(committed, CallResult::Success(())));

        keeper.stop(None);
        handle.await.expect("Tile keeper panicked");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn requests_before_install_are_served_by_it() {
        let (keeper, handle) = Actor::spawn(None, TileKeeper, ())
            .await
            .expect("Failed to start tile keeper");

        // a fast neighbour asks before our tile has arrived from the master
        let (tx, rx) = ractor::concurrency::oneshot();
        keeper
            .cast(TileKeeperMessage::Boundary(Direction::North, tx.into()))
            .expect("Failed to request boundary");
        keeper
            .cast(TileKeeperMessage::Install {
                tile: square(true),
                expected_peers: 1,
            })
            .expect("Failed to install tile");

        let edge = rx.await.expect("Early request was dropped");
        assert_eq!(edge.len(), 2);
        assert!(edge.iter().all(|c| c.alive));

        let committed = keeper
            .call(
                |tx| TileKeeperMessage::Commit(square(false), tx),
                Some(Duration::from_secs(2)),
            )
            .await
            .expect("Failed to commit");
        assert!(matches!(committed, CallResult::Success(())));

        keeper.stop(None);
        handle.await.expect("Tile keeper panicked");
    }
}
