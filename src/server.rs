//! SLCP server over TCP
//!
//! One task per accepted connection. Each connection reads raw chunks,
//! frames them into command lines, and feeds them to its [`Session`] one
//! at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};

use crate::error::Result;
use crate::protocol::{Command, LineFramer, Reply, DEFAULT_PORT};
use crate::session::{Authenticator, Session};
use crate::storage::{ContextStore, StorageConfig};

/// Size of a single socket read
const READ_CHUNK: usize = 5000;

/// How long input is drained after a fatal reply
const LINGER: Duration = Duration::from_secs(2);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// File whose first line is the shared secret
    pub secret_file: PathBuf,
    /// Close connections idle for this long
    pub idle_timeout: Option<Duration>,
    /// Longest accepted command line, in bytes
    pub max_line_len: usize,
    /// Storage configuration
    pub storage: StorageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            secret_file: PathBuf::from("authtoken.secret"),
            idle_timeout: None,
            max_line_len: 1 << 20,
            storage: StorageConfig::default(),
        }
    }
}

/// Per-connection settings shared by every session
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub idle_timeout: Option<Duration>,
    pub max_line_len: usize,
}

impl From<&ServerConfig> for ConnectionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            max_line_len: config.max_line_len,
        }
    }
}

/// SLCP server
pub struct SlcpServer {
    config: ServerConfig,
    store: Arc<ContextStore>,
    auth: Arc<Authenticator>,
}

impl SlcpServer {
    /// Create a new server
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = Arc::new(ContextStore::new(config.storage.clone())?);
        let auth = Arc::new(Authenticator::SecretFile(config.secret_file.clone()));
        Ok(Self { config, store, auth })
    }

    /// Create a server with an explicit authenticator
    pub fn with_authenticator(config: ServerConfig, auth: Authenticator) -> Result<Self> {
        let store = Arc::new(ContextStore::new(config.storage.clone())?);
        Ok(Self {
            config,
            store,
            auth: Arc::new(auth),
        })
    }

    /// Get server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let addr = self.address();
        let listener = TcpListener::bind(&addr).await?;
        info!("SLCP server listening on {}", addr);

        tokio::select! {
            result = self.serve(listener) => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down");
                Ok(())
            }
        }
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let limits = ConnectionLimits::from(&self.config);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let session = Session::new(Arc::clone(&self.store), Arc::clone(&self.auth));
                    let store = Arc::clone(&self.store);
                    let span = tracing::info_span!("session", id = %session.id(), %peer);
                    tokio::spawn(
                        async move {
                            info!("Connection accepted");
                            match handle_connection(stream, session, limits).await {
                                Ok(()) => info!("Connection closed"),
                                Err(e) => debug!(error = %e, "Connection ended with error"),
                            }
                            let open_contexts = store.open_contexts().await;
                            debug!(open_contexts, "Session released");
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Drive one session over a byte stream until it closes.
///
/// Returns when the peer closes the stream, a command ends the session, or
/// the idle timeout fires.
pub async fn handle_connection<S>(
    mut stream: S,
    mut session: Session,
    limits: ConnectionLimits,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = LineFramer::new(limits.max_line_len);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let read = match limits.idle_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    info!("Idle timeout reached");
                    return Ok(());
                }
            },
            None => stream.read(&mut buf).await?,
        };

        if read == 0 {
            debug!(pending = framer.pending().len(), "Peer closed connection");
            return Ok(());
        }

        let frames = framer.push(&buf[..read]);
        debug!(frames = frames.len(), "Received lines");

        for frame in frames {
            let outcome = match frame.and_then(|line| Command::from_bytes(&line)) {
                Ok(command) => session.dispatch(command).await,
                Err(e) => session.reject(&e),
            };

            send(&mut stream, outcome.reply).await?;
            if outcome.close {
                linger(&mut stream, &mut buf).await;
                return Ok(());
            }
        }
    }
}

/// Half-close and discard input for a while, so the peer reads the last
/// reply instead of a connection reset
async fn linger<S>(stream: &mut S, buf: &mut [u8])
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.shutdown().await.ok();
    let drain = async {
        while let Ok(read) = stream.read(buf).await {
            if read == 0 {
                break;
            }
        }
    };
    tokio::time::timeout(LINGER, drain).await.ok();
}

async fn send<S>(stream: &mut S, reply: Option<Reply>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if let Some(reply) = reply {
        stream.write_all(reply.to_line().as_bytes()).await?;
        stream.flush().await?;
    }
    Ok(())
}
