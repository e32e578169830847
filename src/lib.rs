//! # slc: searchable log compression
//!
//! Compresses log lines into a denser representation that can still be
//! searched for substrings without decompression, and serves per-context
//! compressed logs over a small line-oriented protocol (SLCP).
//!
//! ## Features
//!
//! - **Folding**: timestamps, single-digit IPv4 addresses, and numbers collapse to compact code points
//! - **Bit packing**: lowercase runs are repacked at 5 bits per letter
//! - **Search**: query terms go through the same encoder and are matched against stored records
//! - **Persistence**: append-only record log plus JSON counters per context
//! - **SLCP server**: authenticated, one task per connection, single writer per context
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   SLCP Client   │    │   SLCP Server    │    │  Context Store  │
//! │                 │    │                  │    │                 │
//! │ • AUTH/CONTEXT  │◄──►│ • Line framing   │◄──►│ • <ctx>.bin     │
//! │ • PROCESS       │    │ • Session state  │    │ • <ctx>.meta    │
//! │ • SEARCH        │    │ • Encoder        │    │ • Per-ctx lock  │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! There is no decoder: records cannot be turned back into text.

#[cfg(feature = "server")]
pub mod client;
pub mod context;
pub mod encoder;
pub mod error;
pub mod fold;
pub mod pack;
pub mod protocol;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod source;
pub mod storage;

#[cfg(feature = "server")]
pub use client::SlcpClient;
pub use context::{ContextName, ContextStats};
pub use encoder::{encode, Record};
pub use error::{Result, SlcError};
#[cfg(feature = "server")]
pub use server::{ServerConfig, SlcpServer};
pub use session::{Authenticator, Session};
pub use storage::{ContextHandle, ContextStore, StorageConfig};
