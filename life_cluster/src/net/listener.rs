// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! TCP Server to accept incoming sessions

use std::marker::PhantomData;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::net::TcpListener;

use super::ConnectionSink;

/// Bind a listening socket on all interfaces. Port `0` picks a free port.
pub(crate) async fn bind(port: super::NetworkPort) -> Result<TcpListener, tokio::io::Error> {
    let addr = format!("0.0.0.0:{port}");
    TcpListener::bind(&addr).await
}

/// A Tcp Socket [Listener] responsible for accepting new connections and handing them to
/// its owner, which spawns the session actors handling the traffic over the socket.
///
/// The socket is bound by the owner before spawning the [Listener] so that the owner
/// knows the real port (port `0` binds are common in tests).
pub(crate) struct Listener<TMsg: ConnectionSink> {
    owner: ActorRef<TMsg>,
    _msg: PhantomData<fn() -> TMsg>,
}

impl<TMsg: ConnectionSink> Listener<TMsg> {
    /// Create a new `Listener`
    pub(crate) fn new(owner: ActorRef<TMsg>) -> Self {
        Self {
            owner,
            _msg: PhantomData,
        }
    }
}

/// The listener's state
pub(crate) struct ListenerState {
    listener: Option<TcpListener>,
}

/// Accept the next socket
pub(crate) struct ListenerMessage;

#[async_trait::async_trait]
impl<TMsg: ConnectionSink> Actor for Listener<TMsg> {
    type Msg = ListenerMessage;
    type State = ListenerState;
    type Arguments = TcpListener;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        listener: TcpListener,
    ) -> Result<Self::State, ActorProcessingErr> {
        // startup the event processing loop by sending an initial msg
        let _ = myself.cast(ListenerMessage);

        Ok(Self::State {
            listener: Some(listener),
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // close the listener properly, in case anyone else has handles to the actor stopping
        drop(state.listener.take());
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        _message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(listener) = &mut state.listener {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    if self
                        .owner
                        .cast(TMsg::connection_opened(stream, addr))
                        .is_err()
                    {
                        log::warn!("Listener owner is gone, dropping connection from {addr}");
                        myself.stop(Some("owner_closed".to_string()));
                        return Ok(());
                    }
                    log::info!("TCP Session opened for {}", addr);
                }
                Err(socket_accept_error) => {
                    log::warn!("Error accepting socket {}", socket_accept_error);
                }
            }
        }

        // continue accepting new sockets
        let _ = myself.cast(ListenerMessage);
        Ok(())
    }
}
