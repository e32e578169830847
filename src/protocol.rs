//! SLCP wire protocol
//!
//! Searchable Logfile Compression Protocol: newline-delimited ASCII
//! commands over a byte stream.
//!
//! ```text
//! client -> server           server -> client
//! AUTH <token>               ERROR auth
//! CONTEXT <name>             ERROR context
//! PROCESS <line>             ERROR process
//! SEARCH <term>              RESULTS <count> | ERROR search
//! anything else              ERROR cmd
//! ```
//!
//! A successful AUTH, CONTEXT, or PROCESS gets no reply.

use std::fmt;

use crate::error::{Result, SlcError};

/// Default TCP port of an SLCP server
pub const DEFAULT_PORT: u16 = 7777;

/// Line terminator for commands and replies
pub const LINE_TERMINATOR: u8 = b'\n';

/// Error kind carried by an `ERROR` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Context,
    Process,
    Search,
    Cmd,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Context => "context",
            Self::Process => "process",
            Self::Search => "search",
            Self::Cmd => "cmd",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "auth" => Some(Self::Auth),
            "context" => Some(Self::Context),
            "process" => Some(Self::Process),
            "search" => Some(Self::Search),
            "cmd" => Some(Self::Cmd),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client command.
///
/// The argument is everything after the first space. `None` means the line
/// had no space at all, which is malformed for every verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Auth(Option<String>),
    Context(Option<String>),
    Process(Option<String>),
    Search(Option<String>),
    Unknown(String),
}

impl Command {
    /// Parse one command line (without its terminator)
    pub fn parse(line: &str) -> Self {
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, Some(arg.to_string())),
            None => (line, None),
        };

        match verb {
            "AUTH" => Self::Auth(arg),
            "CONTEXT" => Self::Context(arg),
            "PROCESS" => Self::Process(arg),
            "SEARCH" => Self::Search(arg),
            _ => Self::Unknown(verb.to_string()),
        }
    }

    /// Parse a raw framed line, rejecting invalid UTF-8
    pub fn from_bytes(line: &[u8]) -> Result<Self> {
        let line = std::str::from_utf8(line)
            .map_err(|e| SlcError::Protocol(format!("command is not valid UTF-8: {}", e)))?;
        Ok(Self::parse(line))
    }

    /// Error kind reported when this command fails
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Context(_) => ErrorKind::Context,
            Self::Process(_) => ErrorKind::Process,
            Self::Search(_) => ErrorKind::Search,
            Self::Unknown(_) => ErrorKind::Cmd,
        }
    }

    /// Render as a wire line, terminator included
    pub fn to_line(&self) -> String {
        let (verb, arg) = match self {
            Self::Auth(arg) => ("AUTH", arg),
            Self::Context(arg) => ("CONTEXT", arg),
            Self::Process(arg) => ("PROCESS", arg),
            Self::Search(arg) => ("SEARCH", arg),
            Self::Unknown(verb) => return format!("{}\n", verb),
        };
        match arg {
            Some(arg) => format!("{} {}\n", verb, arg),
            None => format!("{}\n", verb),
        }
    }
}

/// A server reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Results(usize),
    Error(ErrorKind),
}

impl Reply {
    /// Parse a reply line (without its terminator)
    pub fn parse(line: &str) -> Result<Self> {
        let parsed = match line.split_once(' ') {
            Some(("RESULTS", count)) => count.parse().ok().map(Self::Results),
            Some(("ERROR", kind)) => ErrorKind::from_token(kind).map(Self::Error),
            _ => None,
        };
        parsed.ok_or_else(|| SlcError::Protocol(format!("unexpected reply: {:?}", line)))
    }

    /// Render as a wire line, terminator included
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Results(count) => write!(f, "RESULTS {}", count),
            Self::Error(kind) => write!(f, "ERROR {}", kind),
        }
    }
}

/// Splits a byte stream into command lines.
///
/// Bytes after the last terminator are kept and prefixed to the next chunk,
/// so the emitted frames do not depend on how the stream was chunked. A line
/// longer than `max_line_len` yields one error frame, complete or not, after
/// which the framer discards all further input.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_line_len: usize,
    overflowed: bool,
}

impl LineFramer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_len,
            overflowed: false,
        }
    }

    /// Feed a chunk and return every frame it completes, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Vec<u8>>> {
        if self.overflowed {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
        {
            if offset > self.max_line_len {
                frames.push(Err(self.overflow()));
                return frames;
            }
            frames.push(Ok(self.pending[start..start + offset].to_vec()));
            start += offset + 1;
        }
        self.pending.drain(..start);

        if self.pending.len() > self.max_line_len {
            frames.push(Err(self.overflow()));
        }

        frames
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn overflow(&mut self) -> SlcError {
        self.overflowed = true;
        self.pending.clear();
        SlcError::Protocol(format!("line exceeds {} bytes", self.max_line_len))
    }
}
