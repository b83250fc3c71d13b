// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Runtime settings for the master and the workers

use tokio::time::Duration;

use crate::net::NetworkPort;

/// Cells per side of each worker's tile unless configured otherwise
pub const DEFAULT_BLOCK_SIZE: usize = 20;

/// Delay between attempts to reach the master
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Settings of a master process
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Port workers connect to. `0` picks a free port
    pub port: NetworkPort,
    /// Number of workers the run waits for
    pub worker_count: usize,
    /// Maximum number of generations to compute
    pub generation_limit: usize,
    /// Cells per side of each worker's tile
    pub block_size: usize,
    /// How long to wait for all of the workers to connect. `None` waits indefinitely
    pub startup_timeout: Option<Duration>,
    /// How long every worker has to report a generation. `None` waits indefinitely
    pub generation_timeout: Option<Duration>,
    /// How long to wait on each worker to acknowledge `GameOver`
    pub shutdown_timeout: Option<Duration>,
}

impl MasterConfig {
    /// Settings with the default block size and no timeouts on the run itself
    pub fn new(port: NetworkPort, generation_limit: usize, worker_count: usize) -> Self {
        Self {
            port,
            worker_count,
            generation_limit,
            block_size: DEFAULT_BLOCK_SIZE,
            startup_timeout: None,
            generation_timeout: None,
            shutdown_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Override the block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Override the per-generation collection timeout
    pub fn with_generation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.generation_timeout = timeout;
        self
    }
}

/// Settings of a worker process
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Port peers connect to for boundary exchange. `0` picks a free port
    pub listen_port: NetworkPort,
    /// Host of the master
    pub master_host: String,
    /// Port of the master
    pub master_port: NetworkPort,
    /// Host announced to the master for peers to reach us at. Defaults to the local
    /// address of the connection to the master
    pub advertise_host: Option<String>,
    /// Delay between attempts to reach the master
    pub connect_retry_delay: Duration,
    /// Give up on a single connection attempt after this long
    pub connect_timeout: Option<Duration>,
    /// Read timeout on peer links
    pub peer_timeout: Option<Duration>,
    /// How long a commit may wait on peers collecting this generation's edges
    pub commit_timeout: Option<Duration>,
}

impl WorkerConfig {
    /// Settings with default retry behaviour and no I/O timeouts
    pub fn new(listen_port: NetworkPort, master_host: String, master_port: NetworkPort) -> Self {
        Self {
            listen_port,
            master_host,
            master_port,
            advertise_host: None,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
            connect_timeout: None,
            peer_timeout: None,
            commit_timeout: None,
        }
    }

    /// `host:port` of the master
    pub fn master_address(&self) -> String {
        format!("{}:{}", self.master_host, self.master_port)
    }

    /// Apply the same timeout to connecting, peer reads and commits
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self.peer_timeout = timeout;
        self.commit_timeout = timeout;
        self
    }
}
