// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Rendezvous channel between the test driver and helper agents.
//!
//! Helper programs connect back to a Unix socket as their first action
//! after startup. Holding the connection open is how the driver keeps a
//! helper running; closing it is the stop signal. The channel owns the
//! listener and the name-to-connection map, so teardown cannot leave a
//! bound socket or an open connection behind.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::{unix::SocketAddr, UnixListener, UnixStream};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel is already listening on {0}")]
    AlreadyListening(PathBuf),

    #[error("channel is not listening")]
    NotListening,

    #[error("failed to bind rendezvous socket {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    #[error("failed to accept helper connection: {0}")]
    Accept(#[from] io::Error),

    #[error("peer '{0}' already has a live connection; close it before accepting again")]
    DuplicatePeer(String),

    #[error("no such peer '{0}'")]
    UnknownPeer(String),
}

/// One connected helper agent. Valid from accept until `close_peer` or
/// channel teardown; dropping the slot closes the connection.
#[derive(Debug)]
pub struct PeerSlot {
    id: Uuid,
    name: String,
    #[allow(dead_code)]
    stream: UnixStream,
    addr: SocketAddr,
}

impl PeerSlot {
    /// Unique per accept; a re-accepted name gets a fresh id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> &SocketAddr {
        &self.addr
    }
}

/// Rendezvous endpoint plus the set of live helper connections.
pub struct AgentChannel {
    path: PathBuf,
    listener: Option<UnixListener>,
    peers: HashMap<String, PeerSlot>,
}

impl fmt::Debug for AgentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentChannel")
            .field("path", &self.path)
            .field("listening", &self.listener.is_some())
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AgentChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            listener: None,
            peers: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Bind the rendezvous endpoint. A stale socket file from an earlier
    /// run is removed first; a second `start` without an intervening
    /// `stop` is an error.
    pub fn start(&mut self) -> Result<(), ChannelError> {
        if self.listener.is_some() {
            return Err(ChannelError::AlreadyListening(self.path.clone()));
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ChannelError::Bind {
                    path: self.path.clone(),
                    source,
                })
            }
        }
        let listener = UnixListener::bind(&self.path).map_err(|source| ChannelError::Bind {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "agent channel listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// Wait for the next inbound connection and bind it to `name`.
    ///
    /// Blocks without bound; callers that need a deadline wrap this in a
    /// timeout (see [`crate::agent::start_agent`]). Accepting for a name
    /// that already has a live slot is a contract violation: the caller
    /// must `close_peer` first or it would leak the old connection.
    pub async fn accept(&mut self, name: &str) -> Result<&PeerSlot, ChannelError> {
        let listener = self.listener.as_ref().ok_or(ChannelError::NotListening)?;
        if self.peers.contains_key(name) {
            return Err(ChannelError::DuplicatePeer(name.to_string()));
        }
        let (stream, addr) = listener.accept().await?;
        debug!(name, "helper agent connected");
        let slot = PeerSlot {
            id: Uuid::new_v4(),
            name: name.to_string(),
            stream,
            addr,
        };
        Ok(self.peers.entry(name.to_string()).or_insert(slot))
    }

    pub fn peer(&self, name: &str) -> Option<&PeerSlot> {
        self.peers.get(name)
    }

    /// Close one peer's connection, signalling that helper to exit.
    pub fn close_peer(&mut self, name: &str) -> Result<(), ChannelError> {
        match self.peers.remove(name) {
            Some(_slot) => Ok(()),
            None => Err(ChannelError::UnknownPeer(name.to_string())),
        }
    }

    /// Tear the channel down: close every connection, stop listening and
    /// remove the socket file. Safe to call at any time, any number of
    /// times.
    pub fn stop(&mut self) {
        self.peers.clear();
        if self.listener.take().is_some() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to remove rendezvous socket");
                }
            }
            debug!(path = %self.path.display(), "agent channel stopped");
        }
    }
}

impl Drop for AgentChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
