//! SLCP client
//!
//! AUTH, CONTEXT, and PROCESS are fire-and-forget: the server only answers
//! them when they fail. Replies are therefore read lazily, when a SEARCH
//! needs its `RESULTS` line or when the client finishes.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

use crate::error::{Result, SlcError};
use crate::protocol::{Command, ErrorKind, Reply};

/// Client side of an SLCP connection
pub struct SlcpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Non-fatal `ERROR process` replies seen so far
    process_errors: usize,
}

impl SlcpClient {
    /// Connect to a server
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            process_errors: 0,
        })
    }

    pub async fn auth(&mut self, token: &str) -> Result<()> {
        self.send(Command::Auth(Some(token.to_string()))).await
    }

    pub async fn context(&mut self, name: &str) -> Result<()> {
        self.send(Command::Context(Some(name.to_string()))).await
    }

    pub async fn process(&mut self, line: &str) -> Result<()> {
        self.send(Command::Process(Some(line.to_string()))).await
    }

    /// Send a SEARCH and wait for its result count
    pub async fn search(&mut self, term: &str) -> Result<usize> {
        self.send(Command::Search(Some(term.to_string()))).await?;

        loop {
            match self.next_reply().await? {
                Some(Reply::Results(count)) => return Ok(count),
                Some(Reply::Error(kind)) => self.on_error(kind)?,
                None => {
                    return Err(SlcError::Protocol(
                        "connection closed before RESULTS".into(),
                    ))
                }
            }
        }
    }

    /// Close the sending side and drain remaining replies.
    ///
    /// Returns the number of PROCESS commands the server failed to store.
    pub async fn finish(mut self) -> Result<usize> {
        self.writer.shutdown().await?;

        while let Some(reply) = self.next_reply().await? {
            match reply {
                Reply::Error(kind) => self.on_error(kind)?,
                Reply::Results(count) => debug!(count, "Unclaimed RESULTS reply"),
            }
        }

        Ok(self.process_errors)
    }

    fn on_error(&mut self, kind: ErrorKind) -> Result<()> {
        match kind {
            ErrorKind::Process => {
                warn!("Server failed to store a line");
                self.process_errors += 1;
                Ok(())
            }
            ErrorKind::Auth => Err(SlcError::Auth("server rejected token".into())),
            ErrorKind::Context => Err(SlcError::Context("server rejected context".into())),
            kind => Err(SlcError::Protocol(format!("server replied ERROR {}", kind))),
        }
    }

    async fn send(&mut self, command: Command) -> Result<()> {
        if let Err(e) = self.writer.write_all(command.to_line().as_bytes()).await {
            // The server closes right after a fatal ERROR reply
            if let Ok(Some(Reply::Error(kind))) = self.next_reply().await {
                self.on_error(kind)?;
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn next_reply(&mut self) -> Result<Option<Reply>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Reply::parse(line.trim_end_matches('\n')).map(Some)
    }
}
