// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The master process: accepts worker connections, hands out tiles and steps the
//! board one generation at a time
//!
//! ## Overview
//!
//! A [MasterServer] owns the TCP listener and the registry of worker connections. Each
//! accepted socket becomes a [WorkerSession] which runs the handshake and then speaks
//! the master side of the line protocol for that worker.
//!
//! The [Coordinator] drives the run. It asks the [MasterServer] for the roster (the
//! reply is deferred until enough workers are live), publishes the work assignments
//! and then collects every generation from the sessions.
//!
//! ## Supervision
//!
//! [MasterServer] supervises
//!     1. The server-socket TCP `Listener`
//!     2. All of the individual [WorkerSession]s
//!
//! Each [WorkerSession] supervises the `SessionReader` pulling lines off its socket.
//! A session which loses its socket exits, and the [MasterServer] removes it from the
//! registry.

pub mod coordinator;
pub(crate) mod handshake;
pub mod worker_session;

pub use coordinator::{run_master, Coordinator, CoordinatorError, RunOutcome, RunSummary};
pub use worker_session::{WorkAssignment, WorkerSession, WorkerSessionMessage};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;

use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tokio::net::TcpStream;

use crate::net::listener::{self, ListenerMessage};
use crate::net::{ConnectionSink, Listener, NetworkPort};
use crate::protocol::WorkerAddress;
use crate::NodeId;

/// A worker which completed its handshake
#[derive(Clone)]
pub struct LiveWorker {
    /// Position in the roster, which is also the worker's id in the topology
    pub id: usize,
    /// Accept-order id of the connection
    pub node_id: NodeId,
    /// Where peers reach the worker
    pub address: WorkerAddress,
    /// The session talking to the worker
    pub session: ActorRef<WorkerSessionMessage>,
}

impl std::fmt::Debug for LiveWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveWorker")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("address", &self.address)
            .finish()
    }
}

/// Messages to the master's connection registry
pub enum MasterServerMessage {
    /// The listener accepted a socket
    ConnectionOpened {
        /// The accepted stream
        stream: TcpStream,
        /// Remote address
        peer_addr: SocketAddr,
    },

    /// A [WorkerSession] completed its handshake
    WorkerLive {
        /// The session actor
        actor_id: ActorId,
        /// Where peers reach the worker
        address: WorkerAddress,
    },

    /// Reply with the roster once the configured number of workers are live. The
    /// roster is frozen at that point and later arrivals are refused.
    AwaitWorkers(RpcReplyPort<Vec<LiveWorker>>),

    /// The address the listener is bound to
    GetLocalAddr(RpcReplyPort<SocketAddr>),

    /// All sessions which completed their handshake, in the order they went live
    GetWorkers(RpcReplyPort<Vec<LiveWorker>>),
}

impl ConnectionSink for MasterServerMessage {
    fn connection_opened(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self::ConnectionOpened { stream, peer_addr }
    }
}

/// Lifecycle of a registered connection
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionState {
    /// Accepted, handshake in progress
    Pending,
    /// Handshake complete
    Live(WorkerAddress),
}

struct SessionInformation {
    actor: ActorRef<WorkerSessionMessage>,
    node_id: NodeId,
    peer_addr: SocketAddr,
    state: ConnectionState,
}

/// Represents the server which is managing all of the worker connections
pub struct MasterServer {
    port: NetworkPort,
    worker_count: usize,
}

impl MasterServer {
    /// Create a new master server
    ///
    /// * `port`: The port to accept workers on, `0` for any free port
    /// * `worker_count`: How many live workers make up the roster
    pub fn new(port: NetworkPort, worker_count: usize) -> Self {
        Self { port, worker_count }
    }
}

/// The state of the master server
pub struct MasterServerState {
    listener: ActorRef<ListenerMessage>,
    local_addr: SocketAddr,
    sessions: HashMap<ActorId, SessionInformation>,
    node_id_counter: NodeId,
    /// Sessions in the order they went live
    live_order: Vec<ActorId>,
    roster: Option<Vec<LiveWorker>>,
    waiting: Vec<RpcReplyPort<Vec<LiveWorker>>>,
}

impl MasterServerState {
    fn live_workers(&self) -> Vec<LiveWorker> {
        self.live_order
            .iter()
            .filter_map(|actor_id| self.sessions.get(actor_id))
            .enumerate()
            .filter_map(|(id, info)| match &info.state {
                ConnectionState::Live(address) => Some(LiveWorker {
                    id,
                    node_id: info.node_id,
                    address: address.clone(),
                    session: info.actor.clone(),
                }),
                ConnectionState::Pending => None,
            })
            .collect()
    }

    fn freeze_if_complete(&mut self, worker_count: usize) {
        if self.roster.is_some() || self.live_order.len() < worker_count {
            return;
        }
        let roster = self.live_workers();
        log::info!(
            "{} workers are live, roster is frozen: {:?}",
            roster.len(),
            roster
        );
        for reply in self.waiting.drain(..) {
            let _ = reply.send(roster.clone());
        }
        self.roster = Some(roster);
    }

    fn remove_session(&mut self, actor_id: ActorId) -> Option<SessionInformation> {
        self.live_order.retain(|id| *id != actor_id);
        self.sessions.remove(&actor_id)
    }
}

#[async_trait::async_trait]
impl Actor for MasterServer {
    type Msg = MasterServerMessage;
    type State = MasterServerState;
    type Arguments = ();

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _: (),
    ) -> Result<Self::State, ActorProcessingErr> {
        let socket = listener::bind(self.port).await?;
        let local_addr = socket.local_addr()?;
        log::info!(
            "Master listening on {local_addr}, waiting on {} workers",
            self.worker_count
        );

        let (listener, _) = Actor::spawn_linked(
            None,
            Listener::new(myself.clone()),
            socket,
            myself.get_cell(),
        )
        .await?;

        Ok(Self::State {
            listener,
            local_addr,
            sessions: HashMap::new(),
            node_id_counter: 0,
            live_order: Vec::new(),
            roster: None,
            waiting: Vec::new(),
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // the listener is parked in `accept()`, so it has to be killed
        state.listener.kill();
        for info in state.sessions.values() {
            info.actor.stop(Some("master_stopped".to_string()));
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
                if state.roster.is_some() {
                    log::warn!("Roster is frozen, refusing the connection from {peer_addr}");
                    drop(stream);
                    return Ok(());
                }
                let node_id = state.node_id_counter;
                if let Ok((actor, _)) = Actor::spawn_linked(
                    None,
                    WorkerSession::new(node_id, peer_addr, myself.clone()),
                    stream,
                    myself.get_cell(),
                )
                .await
                {
                    state.sessions.insert(
                        actor.get_id(),
                        SessionInformation {
                            actor,
                            node_id,
                            peer_addr,
                            state: ConnectionState::Pending,
                        },
                    );
                    state.node_id_counter += 1;
                } else {
                    // failed to startup actor, drop the socket
                    log::warn!("Failed to startup `WorkerSession`, dropping connection");
                }
            }
            Self::Msg::WorkerLive { actor_id, address } => {
                let frozen = state.roster.is_some();
                match state.sessions.entry(actor_id) {
                    Entry::Occupied(mut o) if frozen => {
                        log::warn!(
                            "Roster is frozen, refusing worker {} at {address}",
                            o.get().peer_addr
                        );
                        o.get_mut().actor.stop(Some("roster_full".to_string()));
                        o.remove();
                    }
                    Entry::Occupied(mut o) => {
                        o.get_mut().state = ConnectionState::Live(address);
                        state.live_order.push(actor_id);
                        log::info!(
                            "{} of {} workers are live",
                            state.live_order.len(),
                            self.worker_count
                        );
                        state.freeze_if_complete(self.worker_count);
                    }
                    Entry::Vacant(_) => {
                        log::warn!("An unknown session ({actor_id:?}) reported it is live");
                    }
                }
            }
            Self::Msg::AwaitWorkers(reply) => {
                if let Some(roster) = &state.roster {
                    let _ = reply.send(roster.clone());
                } else {
                    state.waiting.push(reply);
                    state.freeze_if_complete(self.worker_count);
                }
            }
            Self::Msg::GetLocalAddr(reply) => {
                let _ = reply.send(state.local_addr);
            }
            Self::Msg::GetWorkers(reply) => {
                let _ = reply.send(state.live_workers());
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
                    log::error!("The master's TCP listener failed with '{msg}'");
                } else if let Some(info) = state.remove_session(actor.get_id()) {
                    log::warn!("Worker session {} panicked with '{msg}'", info.node_id);
                } else {
                    log::warn!(
                        "An unknown actor ({:?}) panicked with '{}'",
                        actor.get_id(),
                        msg
                    );
                }
            }
            SupervisionEvent::ActorTerminated(actor, _, maybe_reason) => {
                if state.listener.get_id() == actor.get_id() {
                    log::info!("The master's TCP listener exited with '{maybe_reason:?}'");
                } else if let Some(info) = state.remove_session(actor.get_id()) {
                    if state.roster.is_some() && matches!(info.state, ConnectionState::Live(_)) {
                        log::warn!(
                            "Worker session {} ({}) left the roster with '{:?}'",
                            info.node_id,
                            info.peer_addr,
                            maybe_reason
                        );
                    } else {
                        log::info!(
                            "Worker session {} exited with '{:?}'",
                            info.node_id,
                            maybe_reason
                        );
                    }
                }
            }
            _ => {
                //no-op
            }
        }
        Ok(())
    }
}
