// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A [WorkerSession] is the master's end of the connection to one worker process.
//!
//! It walks the connection through its lifecycle:
//!
//! 1. `Pending`: the [HandshakeProcess] consumes the worker's three announcement lines,
//!    then the [super::MasterServer] is told the worker is live
//! 2. Setup: the worker's `neighbours`, `rows`, `cols` and `cells` requests are answered
//!    from the [WorkAssignment] handed over by the coordinator. Requests which arrive
//!    before the assignment are queued and answered as soon as it lands
//! 3. Running: a [WorkerSessionMessage::NextGeneration] request and the worker's `ready`
//!    line form a latch, whichever arrives second triggers the `nextState` heartbeat. The
//!    worker's `cells ... done` report answers the request
//! 4. [WorkerSessionMessage::Shutdown] writes `GameOver` and closes the socket

use std::collections::VecDeque;
use std::net::SocketAddr;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tokio::net::TcpStream;

use super::handshake::HandshakeProcess;
use super::MasterServerMessage;
use crate::grid::{Cell, Grid};
use crate::net::{SessionEvent, SessionReader, SessionReaderMessage, SessionWriter};
use crate::protocol::{self, MasterSignal, NeighbourEntry, WorkerRequest, DONE};
use crate::NodeId;

/// Everything a worker needs to start computing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkAssignment {
    /// The 8 neighbour table entries, in canonical direction order
    pub neighbours: Vec<NeighbourEntry>,
    /// The worker's tile of the board
    pub tile: Grid,
}

/// Messages handled by a [WorkerSession]
pub enum WorkerSessionMessage {
    /// Traffic from the socket
    Session(SessionEvent),

    /// The coordinator publishes this worker's neighbour table and tile
    Assign(WorkAssignment),

    /// Heartbeat the worker once it's ready and reply with the cells it reports
    NextGeneration(RpcReplyPort<Vec<Cell>>),

    /// Send `GameOver` and close the connection
    Shutdown(RpcReplyPort<()>),
}

impl From<SessionEvent> for WorkerSessionMessage {
    fn from(value: SessionEvent) -> Self {
        Self::Session(value)
    }
}

#[derive(Debug)]
enum SessionPhase {
    /// The tile hasn't been sent yet
    Setup,
    /// Between generation reports
    Running,
    /// A `cells` report is being received
    Reporting(Vec<Cell>),
}

/// The master's end of a single worker connection
pub struct WorkerSession {
    node_id: NodeId,
    peer_addr: SocketAddr,
    server: ActorRef<MasterServerMessage>,
}

impl WorkerSession {
    /// Construct a new [WorkerSession]
    ///
    /// * `node_id`: The accept-order id of this connection
    /// * `peer_addr`: Remote socket address, for diagnostics
    /// * `server`: The owning [super::MasterServer]
    pub fn new(
        node_id: NodeId,
        peer_addr: SocketAddr,
        server: ActorRef<MasterServerMessage>,
    ) -> Self {
        Self {
            node_id,
            peer_addr,
            server,
        }
    }
}

/// The state of a worker session
pub struct WorkerSessionState {
    handshake: HandshakeProcess,
    writer: SessionWriter,
    reader: ActorRef<SessionReaderMessage>,
    assignment: Option<WorkAssignment>,
    deferred: VecDeque<WorkerRequest>,
    phase: SessionPhase,
    ready: bool,
    pending: Option<RpcReplyPort<Vec<Cell>>>,
}

impl WorkerSession {
    async fn handle_line(
        &self,
        myself: &ActorRef<WorkerSessionMessage>,
        state: &mut WorkerSessionState,
        line: String,
    ) -> Result<(), ActorProcessingErr> {
        if !state.handshake.is_live() {
            let next = state.handshake.next(&line);
            match &next {
                HandshakeProcess::Live(address) => {
                    log::info!(
                        "Worker session {} ({}) is live, peers reach it at {}",
                        self.node_id,
                        self.peer_addr,
                        address
                    );
                    self.server.cast(MasterServerMessage::WorkerLive {
                        actor_id: myself.get_id(),
                        address: address.clone(),
                    })?;
                }
                HandshakeProcess::Close(err) => {
                    log::warn!(
                        "Worker session {} failed its handshake: {err}. Closing",
                        self.node_id
                    );
                    myself.stop(Some("handshake_failed".to_string()));
                }
                _ => {}
            }
            state.handshake = next;
            return Ok(());
        }

        if let SessionPhase::Reporting(cells) = &mut state.phase {
            if line.trim() == DONE {
                let cells = std::mem::take(cells);
                state.phase = SessionPhase::Running;
                match state.pending.take() {
                    Some(reply) => {
                        log::debug!(
                            "Worker session {} reported {} cells",
                            self.node_id,
                            cells.len()
                        );
                        let _ = reply.send(cells);
                    }
                    None => log::warn!(
                        "Worker session {} sent an unsolicited report, discarding",
                        self.node_id
                    ),
                }
            } else {
                match protocol::decode_cell(&line) {
                    Ok(cell) => cells.push(cell),
                    Err(err) => log::warn!("Worker session {}: {err}. Skipping", self.node_id),
                }
            }
            return Ok(());
        }

        let request = match line.parse::<WorkerRequest>() {
            Ok(request) => request,
            Err(err) => {
                log::warn!("Worker session {}: {err}. Skipping", self.node_id);
                return Ok(());
            }
        };

        let running = matches!(state.phase, SessionPhase::Running);
        match request {
            WorkerRequest::Ready => {
                state.ready = true;
                self.try_heartbeat(state).await?;
            }
            WorkerRequest::Cells if running => {
                state.phase = SessionPhase::Reporting(Vec::new());
            }
            request => {
                if state.assignment.is_some() {
                    self.answer(state, request).await?;
                } else {
                    log::debug!(
                        "Worker session {} deferring '{}' until work is assigned",
                        self.node_id,
                        request.as_str()
                    );
                    state.deferred.push_back(request);
                }
            }
        }
        Ok(())
    }

    async fn answer(
        &self,
        state: &mut WorkerSessionState,
        request: WorkerRequest,
    ) -> Result<(), ActorProcessingErr> {
        let Some(assignment) = &state.assignment else {
            return Ok(());
        };
        match request {
            WorkerRequest::Neighbours => {
                let lines = assignment
                    .neighbours
                    .iter()
                    .map(NeighbourEntry::encode)
                    .chain(std::iter::once(DONE.to_string()));
                state.writer.send_lines(lines).await?;
            }
            WorkerRequest::Rows => {
                state
                    .writer
                    .send_line(&assignment.tile.rows().to_string())
                    .await?;
            }
            WorkerRequest::Cols => {
                state
                    .writer
                    .send_line(&assignment.tile.cols().to_string())
                    .await?;
            }
            WorkerRequest::Cells => {
                let lines = protocol::encode_grid(&assignment.tile)
                    .into_iter()
                    .chain(std::iter::once(DONE.to_string()));
                state.writer.send_lines(lines).await?;
                state.phase = SessionPhase::Running;
                log::info!(
                    "Worker session {} received its {}x{} tile",
                    self.node_id,
                    assignment.tile.rows(),
                    assignment.tile.cols()
                );
            }
            WorkerRequest::Ready => {}
        }
        Ok(())
    }

    /// Send the heartbeat once both the worker is ready and the coordinator asked for it
    async fn try_heartbeat(
        &self,
        state: &mut WorkerSessionState,
    ) -> Result<(), ActorProcessingErr> {
        if state.ready && state.pending.is_some() {
            state.ready = false;
            state
                .writer
                .send_line(MasterSignal::NextState.as_str())
                .await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Actor for WorkerSession {
    type Msg = WorkerSessionMessage;
    type State = WorkerSessionState;
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

        Ok(Self::State {
            handshake: HandshakeProcess::init(),
            writer: SessionWriter::new(write),
            reader,
            assignment: None,
            deferred: VecDeque::new(),
            phase: SessionPhase::Setup,
            ready: false,
            pending: None,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // the reader is most likely parked in a read, so don't wait on it
        state.reader.kill();
        log::info!(
            "Worker session {} closed ({})",
            self.node_id,
            self.peer_addr
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Self::Msg::Session(SessionEvent::Line(line)) => {
                self.handle_line(&myself, state, line).await?;
            }
            Self::Msg::Session(SessionEvent::Closed) => {
                log::info!(
                    "Worker session {} connection closed by {}",
                    self.node_id,
                    self.peer_addr
                );
                myself.stop(Some("connection_closed".to_string()));
            }
            Self::Msg::Assign(assignment) => {
                state.assignment = Some(assignment);
                while let Some(request) = state.deferred.pop_front() {
                    self.answer(state, request).await?;
                }
            }
            Self::Msg::NextGeneration(reply) => {
                if state.pending.replace(reply).is_some() {
                    log::warn!(
                        "Worker session {} received overlapping generation requests",
                        self.node_id
                    );
                }
                self.try_heartbeat(state).await?;
            }
            Self::Msg::Shutdown(reply) => {
                if let Err(err) = state
                    .writer
                    .send_line(MasterSignal::GameOver.as_str())
                    .await
                {
                    log::debug!(
                        "Worker session {} couldn't send GameOver: {err}",
                        self.node_id
                    );
                }
                let _ = state.writer.shutdown().await;
                let _ = reply.send(());
                myself.stop(Some("game_over".to_string()));
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
        match message {
            SupervisionEvent::ActorPanicked(_, panic_msg) => {
                log::error!(
                    "Worker session {}'s reader panicked with '{}'",
                    self.node_id,
                    panic_msg
                );
                myself.stop(Some("child_panic".to_string()));
            }
            SupervisionEvent::ActorTerminated(_, _, exit_reason) => {
                // the reader reports EOF through a `SessionEvent::Closed` first
                log::debug!(
                    "Worker session {}'s reader exited with {:?}",
                    self.node_id,
                    exit_reason
                );
            }
            _ => {
                // all ok
            }
        }
        Ok(())
    }
}
