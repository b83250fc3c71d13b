// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Line-oriented TCP sessions
//!
//! Server-side sessions are actors: a [SessionReader] child pulls lines off the socket
//! and forwards them as [SessionEvent]s to the owning session actor, which answers
//! through a [SessionWriter]. Client-side flows are strictly request/response and use
//! the plain [LineStream] instead.

use std::marker::PhantomData;
use std::net::SocketAddr;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, ErrorKind};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::Duration;

use crate::protocol::DONE;

/// Strip the line terminator (`\n` or `\r\n`)
fn trim_line_end(line: &mut String) {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
}

async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, tokio::io::Error>
where
    F: std::future::Future<Output = Result<T, tokio::io::Error>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(tokio::io::Error::new(
                ErrorKind::TimedOut,
                format!("no response within {}ms", limit.as_millis()),
            )),
        },
        None => fut.await,
    }
}

// ========================= Session events ========================= //

/// What a [SessionReader] tells its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A line was received, terminator removed
    Line(String),
    /// The remote side closed the socket, or reading failed
    Closed,
}

// ========================= Session writer ========================= //

/// Writing half of a session. Every call flushes, so a batch of lines is delivered
/// together.
pub(crate) struct SessionWriter {
    writer: BufWriter<OwnedWriteHalf>,
}

impl SessionWriter {
    pub(crate) fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Write a single line
    pub(crate) async fn send_line(&mut self, line: &str) -> Result<(), tokio::io::Error> {
        log::trace!("SEND '{line}'");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Write a batch of lines with a single flush
    pub(crate) async fn send_lines<I, S>(&mut self, lines: I) -> Result<(), tokio::io::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.writer.write_all(line.as_ref().as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await
    }

    /// Shut the write side down, signalling EOF to the peer
    pub(crate) async fn shutdown(&mut self) -> Result<(), tokio::io::Error> {
        self.writer.flush().await?;
        self.writer.shutdown().await
    }
}

// ========================= Session reader ========================= //

/// Reads lines off a socket and forwards them to the session actor which owns it.
/// Exits on EOF after reporting [SessionEvent::Closed].
pub(crate) struct SessionReader<TMsg>
where
    TMsg: From<SessionEvent> + ractor::Message,
{
    session: ActorRef<TMsg>,
    _msg: PhantomData<fn() -> TMsg>,
}

impl<TMsg> SessionReader<TMsg>
where
    TMsg: From<SessionEvent> + ractor::Message,
{
    pub(crate) fn new(session: ActorRef<TMsg>) -> Self {
        Self {
            session,
            _msg: PhantomData,
        }
    }
}

/// Wait for the next line on the stream
pub(crate) struct SessionReaderMessage;

pub(crate) struct SessionReaderState {
    reader: Option<BufReader<OwnedReadHalf>>,
}

#[async_trait::async_trait]
impl<TMsg> Actor for SessionReader<TMsg>
where
    TMsg: From<SessionEvent> + ractor::Message,
{
    type Msg = SessionReaderMessage;
    type State = SessionReaderState;
    type Arguments = OwnedReadHalf;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        reader: OwnedReadHalf,
    ) -> Result<Self::State, ActorProcessingErr> {
        // start waiting for the first line on the network
        let _ = myself.cast(SessionReaderMessage);
        Ok(Self::State {
            reader: Some(BufReader::new(reader)),
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // drop the channel to close it should we be exiting
        drop(state.reader.take());
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        _message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let Some(stream) = &mut state.reader else {
            return Ok(());
        };

        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) => {
                log::trace!("EOF on stream");
                drop(state.reader.take());
                let _ = self.session.cast(TMsg::from(SessionEvent::Closed));
                myself.stop(Some("channel_closed".to_string()));
                return Ok(());
            }
            Ok(_) => {
                trim_line_end(&mut line);
                log::trace!("RECEIVE '{line}'");
                let event = TMsg::from(SessionEvent::Line(line));
                if self.session.cast(event).is_err() {
                    // nobody is listening anymore
                    myself.stop(Some("session_closed".to_string()));
                    return Ok(());
                }
            }
            Err(err) => {
                log::debug!("Error ({err}) on stream");
                drop(state.reader.take());
                let _ = self.session.cast(TMsg::from(SessionEvent::Closed));
                myself.stop(Some("channel_error".to_string()));
                return Ok(());
            }
        }

        let _ = myself.cast(SessionReaderMessage);
        Ok(())
    }
}

// ========================= Client stream ========================= //

/// A client connection speaking the line protocol in a strict request/response fashion.
pub struct LineStream {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: SessionWriter,
    read_timeout: Option<Duration>,
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl LineStream {
    /// Connect to `address`
    ///
    /// * `connect_timeout` - give up connecting after this long (`None` waits on the OS)
    /// * `read_timeout` - every read fails with [ErrorKind::TimedOut] after this long
    pub async fn connect<T>(
        address: T,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> Result<Self, tokio::io::Error>
    where
        T: ToSocketAddrs,
    {
        let stream = with_timeout(connect_timeout, TcpStream::connect(address)).await?;
        Self::from_stream(stream, read_timeout)
    }

    /// Wrap an already connected stream
    pub fn from_stream(
        stream: TcpStream,
        read_timeout: Option<Duration>,
    ) -> Result<Self, tokio::io::Error> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        Ok(Self {
            peer_addr,
            local_addr,
            reader: BufReader::new(read),
            writer: SessionWriter::new(write),
            read_timeout,
        })
    }

    /// The remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The local address of this end of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Write a single line
    pub async fn send_line(&mut self, line: &str) -> Result<(), tokio::io::Error> {
        self.writer.send_line(line).await
    }

    /// Write a batch of lines with a single flush
    pub async fn send_lines<I, S>(&mut self, lines: I) -> Result<(), tokio::io::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.writer.send_lines(lines).await
    }

    /// Read the next line. EOF is reported as [ErrorKind::UnexpectedEof].
    pub async fn recv_line(&mut self) -> Result<String, tokio::io::Error> {
        let mut line = String::new();
        let read = with_timeout(self.read_timeout, self.reader.read_line(&mut line)).await?;
        if read == 0 {
            return Err(tokio::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.peer_addr),
            ));
        }
        trim_line_end(&mut line);
        log::trace!("RECEIVE {} '{line}'", self.peer_addr);
        Ok(line)
    }

    /// Read lines up to (and excluding) the `done` terminator
    pub async fn recv_until_done(&mut self) -> Result<Vec<String>, tokio::io::Error> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await?;
            if line.trim() == DONE {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Close the write side
    pub async fn shutdown(&mut self) -> Result<(), tokio::io::Error> {
        self.writer.shutdown().await
    }
}
