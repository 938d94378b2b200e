// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Helper agent lifecycle: spawn on an emulated host, then handshake.
//!
//! A helper's first action is to connect back to the rendezvous socket,
//! so a completed `accept` doubles as the readiness signal: once
//! `start_agent` returns, the receiver is joined (or the sender is
//! emitting) and verification may begin.

use crate::channel::{AgentChannel, ChannelError};
use crate::fixtures::FixtureError;
use crate::poll::PollError;
use crate::topology::HostCtl;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use wait_timeout::ChildExt;

/// Test-infrastructure failures: the environment is broken, as opposed
/// to the routing daemon not converging. Reported distinctly so "helper
/// never started" cannot be mistaken for "RP not selected".
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("failed to spawn '{program}' on host {host}: {source}")]
    SpawnFailed {
        host: String,
        program: PathBuf,
        source: io::Error,
    },

    #[error("helper '{name}' did not connect back within {waited:?}")]
    AgentNeverConnected { name: String, waited: Duration },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("no router named '{0}' in the topology")]
    UnknownRouter(String),

    #[error("no host named '{0}' in the topology")]
    UnknownHost(String),
}

/// Structured helper invocation: program path plus argv, no shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SpawnRequest {
    /// Receiver helper: join `group` on `interface` until the control
    /// connection closes.
    pub fn receiver(program: &Path, endpoint: &Path, group: Ipv4Addr, interface: &str) -> Self {
        Self {
            program: program.to_path_buf(),
            args: vec![
                endpoint.display().to_string(),
                group.to_string(),
                interface.to_string(),
            ],
        }
    }

    /// Sender helper: emit one datagram to `group` every `send_interval`
    /// seconds.
    pub fn sender(
        program: &Path,
        endpoint: &Path,
        group: Ipv4Addr,
        interface: &str,
        send_interval: f64,
    ) -> Self {
        let mut request = Self::receiver(program, endpoint, group, interface);
        request.args.push("--send".to_string());
        request.args.push(send_interval.to_string());
        request
    }
}

/// A running helper process. Killed on drop; prefer [`AgentHandle::stop`]
/// after closing its connection so it can exit on its own.
#[derive(Debug)]
pub struct AgentHandle {
    name: String,
    child: Child,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reap the helper after its control connection has been closed,
    /// giving it `grace` to exit before killing it.
    pub fn stop(mut self, grace: Duration) -> io::Result<ExitStatus> {
        match self.child.wait_timeout(grace)? {
            Some(status) => Ok(status),
            None => {
                warn!(name = %self.name, "helper did not exit within grace period, killing");
                self.child.kill()?;
                self.child.wait()
            }
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawn a helper on `host` and wait for it to connect back.
///
/// The ordering is load-bearing: spawn happens before `accept`, and
/// `accept` returning happens before the caller proceeds to verification.
/// The handshake is bounded; a helper that never connects is killed and
/// reported as an infrastructure failure.
pub async fn start_agent(
    host: &dyn HostCtl,
    channel: &mut AgentChannel,
    name: &str,
    request: &SpawnRequest,
    handshake: Duration,
) -> Result<AgentHandle, InfraError> {
    info!(
        host = host.name(),
        name,
        program = %request.program.display(),
        "starting helper agent"
    );
    let child = host
        .spawn(request)
        .map_err(|source| InfraError::SpawnFailed {
            host: host.name().to_string(),
            program: request.program.clone(),
            source,
        })?;
    let handle = AgentHandle {
        name: name.to_string(),
        child,
    };

    match tokio::time::timeout(handshake, channel.accept(name)).await {
        Ok(Ok(_slot)) => {
            info!(name, "helper agent ready");
            Ok(handle)
        }
        Ok(Err(e)) => Err(e.into()),
        // Dropping the handle kills the stuck helper.
        Err(_) => Err(InfraError::AgentNeverConnected {
            name: name.to_string(),
            waited: handshake,
        }),
    }
}
