// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Serves this worker's tile edges to its neighbours
//!
//! [PeerServer] supervises the peer listener and one [PeerSession] per inbound
//! connection. A session answers `getBoundary` followed by a direction token with
//! the matching edge of the current tile, read from the [super::TileKeeper].

use std::collections::HashMap;
use std::net::SocketAddr;

use ractor::rpc::CallResult;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::net::{TcpListener, TcpStream};

use super::tile_keeper::TileKeeperMessage;
use crate::net::listener::ListenerMessage;
use crate::net::{
    ConnectionSink, Listener, SessionEvent, SessionReader, SessionReaderMessage, SessionWriter,
};
use crate::protocol::{self, ProtocolError, DONE, GET_BOUNDARY};
use crate::topology::Direction;
use crate::NodeId;

/// Messages to the [PeerServer]
pub enum PeerServerMessage {
    /// The listener accepted a socket
    ConnectionOpened {
        /// The accepted stream
        stream: TcpStream,
        /// Remote address
        peer_addr: SocketAddr,
    },

    /// Number of open peer sessions
    GetSessionCount(ractor::RpcReplyPort<usize>),
}

impl ConnectionSink for PeerServerMessage {
    fn connection_opened(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self::ConnectionOpened { stream, peer_addr }
    }
}

/// Accepts connections from neighbouring workers
pub struct PeerServer {
    tile_keeper: ActorRef<TileKeeperMessage>,
}

impl PeerServer {
    /// Create a new peer server answering from `tile_keeper`
    pub fn new(tile_keeper: ActorRef<TileKeeperMessage>) -> Self {
        Self { tile_keeper }
    }
}

/// The state of the [PeerServer]
pub struct PeerServerState {
    listener: ActorRef<ListenerMessage>,
    sessions: HashMap<ActorId, (NodeId, SocketAddr, ActorRef<PeerSessionMessage>)>,
    node_id_counter: NodeId,
}

#[async_trait::async_trait]
impl Actor for PeerServer {
    type Msg = PeerServerMessage;
    type State = PeerServerState;
    /// The socket is bound by the worker, which needs its port for the handshake
    type Arguments = TcpListener;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        socket: TcpListener,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (listener, _) = Actor::spawn_linked(
            None,
            Listener::new(myself.clone()),
            socket,
            myself.get_cell(),
        )
        .await?;
        Ok(Self::State {
            listener,
            sessions: HashMap::new(),
            node_id_counter: 0,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.listener.kill();
        for (_, _, session) in state.sessions.values() {
            session.stop(Some("worker_stopped".to_string()));
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Self::Msg::ConnectionOpened { stream, peer_addr } => {
                let node_id = state.node_id_counter;
                if let Ok((actor, _)) = Actor::spawn_linked(
                    None,
                    PeerSession::new(node_id, peer_addr, self.tile_keeper.clone()),
                    stream,
                    myself.get_cell(),
                )
                .await
                {
                    state
                        .sessions
                        .insert(actor.get_id(), (node_id, peer_addr, actor));
                    state.node_id_counter += 1;
                } else {
                    log::warn!("Failed to startup `PeerSession`, dropping connection");
                }
            }
            Self::Msg::GetSessionCount(reply) => {
                let _ = reply.send(state.sessions.len());
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorPanicked(actor, msg) => {
                if state.listener.get_id() == actor.get_id() {
                    log::error!("The peer listener failed with '{msg}'");
                } else if let Some((node_id, _, _)) = state.sessions.remove(&actor.get_id()) {
                    log::warn!("Peer session {node_id} panicked with '{msg}'");
                }
            }
            SupervisionEvent::ActorTerminated(actor, _, maybe_reason) => {
                if state.listener.get_id() == actor.get_id() {
                    log::debug!("The peer listener exited with '{maybe_reason:?}'");
                } else if let Some((node_id, addr, _)) = state.sessions.remove(&actor.get_id()) {
                    log::debug!("Peer session {node_id} ({addr}) exited with '{maybe_reason:?}'");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ========================= Peer session ========================= //

/// Where a [PeerSession] is in the `getBoundary <DIRECTION>` exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerRequest {
    AwaitingCommand,
    AwaitingDirection,
}

/// Messages handled by a [PeerSession]
pub enum PeerSessionMessage {
    /// Traffic from the socket
    Session(SessionEvent),
}

impl From<SessionEvent> for PeerSessionMessage {
    fn from(value: SessionEvent) -> Self {
        Self::Session(value)
    }
}

/// One inbound connection from a neighbouring worker
pub struct PeerSession {
    node_id: NodeId,
    peer_addr: SocketAddr,
    tile_keeper: ActorRef<TileKeeperMessage>,
}

impl PeerSession {
    fn new(
        node_id: NodeId,
        peer_addr: SocketAddr,
        tile_keeper: ActorRef<TileKeeperMessage>,
    ) -> Self {
        Self {
            node_id,
            peer_addr,
            tile_keeper,
        }
    }

    async fn serve(
        &self,
        writer: &mut SessionWriter,
        direction: Direction,
    ) -> Result<(), ActorProcessingErr> {
        let cells = match self
            .tile_keeper
            .call(|tx| TileKeeperMessage::Boundary(direction, tx), None)
            .await?
        {
            CallResult::Success(cells) => cells,
            _ => {
                log::warn!("Peer session {} couldn't read the tile", self.node_id);
                Vec::new()
            }
        };
        log::trace!(
            "Peer session {} serving {} cells for {direction}",
            self.node_id,
            cells.len()
        );
        let lines = cells
            .iter()
            .map(protocol::encode_cell)
            .chain(std::iter::once(DONE.to_string()));
        writer.send_lines(lines).await?;
        Ok(())
    }
}

/// The state of a [PeerSession]
pub struct PeerSessionState {
    request: PeerRequest,
    writer: SessionWriter,
    reader: ActorRef<SessionReaderMessage>,
}

#[async_trait::async_trait]
impl Actor for PeerSession {
    type Msg = PeerSessionMessage;
    type State = PeerSessionState;
    type Arguments = TcpStream;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        stream: TcpStream,
    ) -> Result<Self::State, ActorProcessingErr> {
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        let (reader, _) = Actor::spawn_linked(
            None,
            SessionReader::new(myself.clone()),
            read,
            myself.get_cell(),
        )
        .await?;
        log::debug!(
            "Peer session {} opened for {}",
            self.node_id,
            self.peer_addr
        );
        Ok(Self::State {
            request: PeerRequest::AwaitingCommand,
            writer: SessionWriter::new(write),
            reader,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.reader.kill();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Self::Msg::Session(SessionEvent::Line(line)) => match state.request {
                PeerRequest::AwaitingCommand => {
                    if line.trim() == GET_BOUNDARY {
                        state.request = PeerRequest::AwaitingDirection;
                    } else {
                        log::warn!(
                            "Peer session {}: {}. Skipping",
                            self.node_id,
                            ProtocolError::UnknownCommand(line)
                        );
                    }
                }
                PeerRequest::AwaitingDirection => {
                    state.request = PeerRequest::AwaitingCommand;
                    match line.parse::<Direction>() {
                        Ok(direction) => self.serve(&mut state.writer, direction).await?,
                        Err(err) => {
                            log::warn!(
                                "Peer session {}: {}",
                                self.node_id,
                                ProtocolError::from(err)
                            );
                            // the requester is blocked on a reply, so answer with nothing
                            state.writer.send_line(DONE).await?;
                        }
                    }
                }
            },
            Self::Msg::Session(SessionEvent::Closed) => {
                myself.stop(Some("connection_closed".to_string()));
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let SupervisionEvent::ActorPanicked(_, msg) = message {
            log::error!(
                "Peer session {}'s reader panicked with '{msg}'",
                self.node_id
            );
            myself.stop(Some("child_panic".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ractor::rpc::CallResult;

    use super::*;
    use crate::grid::{Cell, Grid};
    use crate::net::listener;
    use crate::protocol::WorkerAddress;
    use crate::worker::{PeerLink, TileKeeper};

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_the_edge_facing_the_requester() {
        let (keeper, keeper_handle) = Actor::spawn(None, TileKeeper, ())
            .await
            .expect("Failed to start tile keeper");
        let cells = vec![
            Cell::new(0, 0, false),
            Cell::new(0, 1, false),
            Cell::new(1, 0, true),
            Cell::new(1, 1, false),
        ];
        keeper
            .cast(TileKeeperMessage::Install {
                tile: Grid::from_cells(2, 2, cells).expect("Failed to build tile"),
                expected_peers: 1,
            })
            .expect("Failed to install tile");

        let socket = listener::bind(0).await.expect("Failed to bind");
        let port = socket.local_addr().expect("No local address").port();
        let (server, server_handle) = Actor::spawn(None, PeerServer::new(keeper.clone()), socket)
            .await
            .expect("Failed to start peer server");

        let address = WorkerAddress {
            host: "127.0.0.1".to_string(),
            port,
        };
        // we lie to the north of the requester, so it reads our southern row
        let mut link = PeerLink::connect(Direction::North, address.clone(), None, None)
            .await
            .expect("Failed to connect");
        assert_eq!(link.direction(), Direction::North);
        assert_eq!(link.address(), &address);

        let edge = link.fetch_boundary().await.expect("Failed to fetch edge");
        assert_eq!(edge, vec![Cell::new(1, 0, true), Cell::new(1, 1, false)]);

        let sessions = server
            .call(PeerServerMessage::GetSessionCount, None)
            .await
            .expect("Failed to query sessions");
        assert!(matches!(sessions, CallResult::Success(1)));

        link.close().await;
        server.stop(None);
        keeper.stop(None);
        server_handle.await.expect("Peer server panicked");
        keeper_handle.await.expect("Tile keeper panicked");
    }
}
