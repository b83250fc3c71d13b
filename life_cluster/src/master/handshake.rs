// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The worker announces itself with three lines: the literal `worker`, the port
//! it accepts peer connections on, and the host it can be reached at. The master
//! doesn't reply. A connection only becomes usable once all three lines have been
//! consumed.

use crate::protocol::{self, ProtocolError, WorkerAddress, HANDSHAKE_TOKEN};

/// Master-side handshake FSM
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HandshakeProcess {
    /// (1) Socket accepted, waiting on the `worker` token
    WaitingOnToken,

    /// (2) Waiting on the worker's listening port
    WaitingOnPort,

    /// (3) Waiting on the worker's host. Argument is the port already received
    WaitingOnHost(u16),

    /// (4) Handshake complete, the connection is live
    Live(WorkerAddress),

    /// The peer isn't speaking the protocol, close the connection
    Close(ProtocolError),
}

impl HandshakeProcess {
    /// Initialize the FSM state
    pub(crate) fn init() -> Self {
        Self::WaitingOnToken
    }

    /// Has the handshake completed
    pub(crate) fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Implement the FSM state transitions
    pub(crate) fn next(&self, line: &str) -> Self {
        let line = line.trim();
        match self {
            Self::WaitingOnToken => {
                if line == HANDSHAKE_TOKEN {
                    Self::WaitingOnPort
                } else {
                    Self::Close(ProtocolError::UnknownCommand(line.to_string()))
                }
            }
            Self::WaitingOnPort => match protocol::decode_usize(line) {
                Ok(port) if port > 0 && port <= u16::MAX as usize => {
                    Self::WaitingOnHost(port as u16)
                }
                _ => Self::Close(ProtocolError::BadInteger(line.to_string())),
            },
            Self::WaitingOnHost(port) => {
                if line.is_empty() {
                    Self::Close(ProtocolError::UnknownCommand(line.to_string()))
                } else {
                    Self::Live(WorkerAddress {
                        host: line.to_string(),
                        port: *port,
                    })
                }
            }
            // terminal states don't move
            Self::Live(_) | Self::Close(_) => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> HandshakeProcess {
        lines
            .iter()
            .fold(HandshakeProcess::init(), |state, line| state.next(line))
    }

    #[test]
    fn three_lines_make_a_live_connection() {
        assert_eq!(run(&["worker"]), HandshakeProcess::WaitingOnPort);
        assert_eq!(
            run(&["worker", "4001"]),
            HandshakeProcess::WaitingOnHost(4001)
        );
        assert_eq!(
            run(&["worker", "4001", "node-3.local"]),
            HandshakeProcess::Live(WorkerAddress {
                host: "node-3.local".to_string(),
                port: 4001,
            })
        );
    }

    #[test]
    fn live_is_not_reached_early() {
        assert!(!run(&[]).is_live());
        assert!(!run(&["worker"]).is_live());
        assert!(!run(&["worker", "4001"]).is_live());
        assert!(run(&["worker", "4001", "localhost"]).is_live());
    }

    #[test]
    fn bad_token_or_port_closes() {
        let closes = |lines: &[&str]| matches!(run(lines), HandshakeProcess::Close(_));
        assert!(closes(&["hello"]));
        assert!(closes(&["worker", "port"]));
        assert!(closes(&["worker", "0"]));
        assert!(closes(&["worker", "70000"]));
        assert!(closes(&["worker", "1", ""]));
    }

    #[test]
    fn live_state_ignores_further_lines() {
        let live = run(&["worker", "4001", "localhost"]);
        assert_eq!(live.next("neighbours"), live);
    }
}
