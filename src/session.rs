//! Per-connection session state and command dispatch
//!
//! ```text
//! Unauthenticated --AUTH ok--> Authenticated --CONTEXT ok--> Ready(context)
//! ```
//!
//! AUTH and CONTEXT may be repeated; a failed one ends the session. PROCESS
//! and SEARCH are only valid in `Ready`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::ContextName;
use crate::error::{Result, SlcError};
use crate::protocol::{Command, ErrorKind, Reply};
use crate::storage::{ContextHandle, ContextStore};

/// Where the shared secret comes from
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// First line of a file, re-read on every AUTH
    SecretFile(PathBuf),
    /// Fixed in-memory secret
    Static(String),
}

impl Authenticator {
    /// Load the configured secret
    pub fn secret(&self) -> Result<String> {
        match self {
            Self::SecretFile(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    SlcError::Auth(format!("cannot open secret file {}: {}", path.display(), e))
                })?;
                Ok(content.lines().next().unwrap_or_default().trim().to_string())
            }
            Self::Static(secret) => Ok(secret.clone()),
        }
    }

    /// Compare a client token byte-for-byte against the secret
    pub fn verify(&self, token: &str) -> Result<()> {
        if self.secret()? == token {
            Ok(())
        } else {
            Err(SlcError::Auth("secret token not matching".into()))
        }
    }
}

/// Unique identifier for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol state of a session
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Ready(Arc<ContextHandle>),
}

/// What the connection should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Line to send back, if any
    pub reply: Option<Reply>,
    /// Close the connection after sending the reply
    pub close: bool,
}

impl Outcome {
    fn silent() -> Self {
        Self {
            reply: None,
            close: false,
        }
    }

    fn reply(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            close: false,
        }
    }

    fn fatal(kind: ErrorKind) -> Self {
        Self {
            reply: Some(Reply::Error(kind)),
            close: true,
        }
    }
}

/// One client's view of the server
pub struct Session {
    id: SessionId,
    state: SessionState,
    store: Arc<ContextStore>,
    auth: Arc<Authenticator>,
}

impl Session {
    pub fn new(store: Arc<ContextStore>, auth: Arc<Authenticator>) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Unauthenticated,
            store,
            auth,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.state, SessionState::Unauthenticated)
    }

    /// Bound context, if any
    pub fn context(&self) -> Option<&Arc<ContextHandle>> {
        match &self.state {
            SessionState::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    /// Run one command against the session
    pub async fn dispatch(&mut self, command: Command) -> Outcome {
        let kind = command.error_kind();

        let result = match command {
            Command::Auth(token) => self.authenticate(token).await.map(|_| None),
            Command::Context(name) => self.bind_context(name).await.map(|_| None),
            Command::Process(line) => self.process(line).await.map(|_| None),
            Command::Search(term) => self.search(term).await.map(|count| Some(Reply::Results(count))),
            Command::Unknown(verb) => Err(SlcError::Protocol(format!("unknown command {:?}", verb))),
        };

        match result {
            Ok(Some(reply)) => Outcome::reply(reply),
            Ok(None) => Outcome::silent(),
            // A storage failure aborts only this PROCESS or SEARCH
            Err(e) if !e.is_fatal() && matches!(kind, ErrorKind::Process | ErrorKind::Search) => {
                warn!(session = %self.id, error = %e, "{} failed", kind);
                Outcome::reply(Reply::Error(kind))
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Closing session");
                Outcome::fatal(kind)
            }
        }
    }

    /// Handle a line that could not be decoded into a command
    pub fn reject(&self, error: &SlcError) -> Outcome {
        warn!(session = %self.id, error = %error, "Closing session");
        Outcome::fatal(error.reply_kind())
    }

    async fn authenticate(&mut self, token: Option<String>) -> Result<()> {
        let token = required(token, "AUTH")?;
        let auth = Arc::clone(&self.auth);
        tokio::task::spawn_blocking(move || auth.verify(&token))
            .await
            .map_err(|e| SlcError::Internal(e.to_string()))??;

        if let SessionState::Unauthenticated = self.state {
            self.state = SessionState::Authenticated;
        }
        info!(session = %self.id, "Authenticated");
        Ok(())
    }

    async fn bind_context(&mut self, name: Option<String>) -> Result<()> {
        if !self.is_authenticated() {
            return Err(SlcError::Auth("CONTEXT before AUTH".into()));
        }
        let name = ContextName::parse(&required(name, "CONTEXT")?)?;

        let handle = self.store.open_or_resume(&name).await?;
        info!(session = %self.id, context = %name, "Context set");
        self.state = SessionState::Ready(handle);
        Ok(())
    }

    async fn process(&mut self, line: Option<String>) -> Result<()> {
        let handle = self.ready()?;
        let line = required(line, "PROCESS")?;
        handle.process(&line).await?;
        Ok(())
    }

    async fn search(&mut self, term: Option<String>) -> Result<usize> {
        let handle = self.ready()?;
        let term = required(term, "SEARCH")?;
        let count = handle.search(&term).await?;
        debug!(session = %self.id, context = %handle.name(), count, term = %term, "Search results");
        Ok(count)
    }

    fn ready(&self) -> Result<Arc<ContextHandle>> {
        match &self.state {
            SessionState::Ready(handle) => Ok(Arc::clone(handle)),
            SessionState::Unauthenticated => Err(SlcError::Auth("not authenticated".into())),
            SessionState::Authenticated => Err(SlcError::Context("no context defined".into())),
        }
    }
}

fn required(arg: Option<String>, verb: &str) -> Result<String> {
    arg.ok_or_else(|| SlcError::Protocol(format!("{} without argument", verb)))
}
