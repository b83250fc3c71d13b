// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Outbound connection to a neighbouring worker, used to fetch its edge every
//! generation

use tokio::time::Duration;

use crate::grid::Cell;
use crate::net::LineStream;
use crate::protocol::{self, WorkerAddress, GET_BOUNDARY};
use crate::topology::Direction;

/// A connection to the neighbour lying in `direction`
#[derive(Debug)]
pub struct PeerLink {
    direction: Direction,
    address: WorkerAddress,
    stream: LineStream,
}

impl PeerLink {
    /// Connect to the neighbour in `direction`
    pub async fn connect(
        direction: Direction,
        address: WorkerAddress,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> Result<Self, tokio::io::Error> {
        let stream =
            LineStream::connect(address.connect_string(), connect_timeout, read_timeout).await?;
        log::debug!("Linked to {direction} neighbour at {address}");
        Ok(Self {
            direction,
            address,
            stream,
        })
    }

    /// Where the neighbour lies
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Where the neighbour is reached
    pub fn address(&self) -> &WorkerAddress {
        &self.address
    }

    /// Fetch the neighbour's edge facing us. Malformed records are skipped.
    pub async fn fetch_boundary(&mut self) -> Result<Vec<Cell>, tokio::io::Error> {
        self.stream
            .send_lines([GET_BOUNDARY, self.direction.as_str()])
            .await?;
        let lines = self.stream.recv_until_done().await?;
        let cells = lines
            .iter()
            .filter_map(|line| match protocol::decode_cell(line) {
                Ok(cell) => Some(cell),
                Err(err) => {
                    log::warn!("{} neighbour: {err}. Skipping", self.direction);
                    None
                }
            })
            .collect();
        Ok(cells)
    }

    /// Close the connection
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
