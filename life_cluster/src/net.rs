// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! TCP listener and line-session plumbing shared by the master and the workers

use std::net::SocketAddr;

use tokio::net::TcpStream;

pub(crate) mod listener;
pub(crate) mod session;

pub(crate) use listener::Listener;
pub use session::{LineStream, SessionEvent};
pub(crate) use session::{SessionReader, SessionReaderMessage, SessionWriter};

/// A network port
pub type NetworkPort = u16;

/// An actor message type which can be told about freshly accepted sockets
pub(crate) trait ConnectionSink: ractor::Message {
    /// Wrap an accepted stream into a message for the owning actor
    fn connection_opened(stream: TcpStream, peer_addr: SocketAddr) -> Self;
}
