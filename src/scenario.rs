// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Scenario sequencing for one RP-selection test case.
//!
//! A scenario walks `Idle -> AgentsStarting -> AgentsReady ->
//! VerifyingIngress -> VerifyingRp -> TearingDown -> Idle`. Verification
//! is deliberately two-stage: the ingress router proves the ACL matched
//! the group at all, the expected-RP router proves the right RP was
//! picked. Teardown runs on every exit path, so the rendezvous endpoint
//! and the helper processes never leak into the next scenario.

use crate::agent::{start_agent, AgentHandle, InfraError, SpawnRequest};
use crate::channel::AgentChannel;
use crate::fixtures::FixtureStore;
use crate::json_cmp::json_cmp;
use crate::poll::{poll, PollOutcome, PollSpec};
use crate::topology::Topology;
use crate::TestCase;
use serde_json::Value;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Grace given to a helper between its connection closing and a kill.
const AGENT_EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Idle,
    AgentsStarting,
    AgentsReady,
    VerifyingIngress,
    VerifyingRp,
    TearingDown,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AgentsStarting => "agents-starting",
            Self::AgentsReady => "agents-ready",
            Self::VerifyingIngress => "verifying-ingress",
            Self::VerifyingRp => "verifying-rp",
            Self::TearingDown => "tearing-down",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ScenarioError {
    /// The environment is broken; remaining scenarios should not run.
    #[error(transparent)]
    Infrastructure(#[from] InfraError),

    /// The ACL was not even matched at the ingress router.
    #[error("ingress router {router} never showed the join for group {group}: {outcome}")]
    IngressNotConverged {
        router: String,
        group: Ipv4Addr,
        expected: Value,
        outcome: PollOutcome,
    },

    /// The ACL matched at ingress, but the wrong router ended up as RP.
    #[error("router {router} was not selected as RP for group {group}: {outcome}")]
    RpNotSelected {
        router: String,
        group: Ipv4Addr,
        expected: Value,
        outcome: PollOutcome,
    },

    /// A protocol precheck (e.g. OSPF or PIM neighbor formation) never
    /// settled, so scenarios would fail for reasons unrelated to ACLs.
    #[error("router {router} did not converge for '{command}': {outcome}")]
    ProtocolNotConverged {
        router: String,
        command: String,
        expected: Value,
        outcome: PollOutcome,
    },
}

impl ScenarioError {
    /// Infrastructure failures abort the run; convergence failures are
    /// per-case assertion outcomes.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// The expected document the observation was held against.
    pub fn expected(&self) -> Option<&Value> {
        match self {
            Self::Infrastructure(_) => None,
            Self::IngressNotConverged { expected, .. }
            | Self::RpNotSelected { expected, .. }
            | Self::ProtocolNotConverged { expected, .. } => Some(expected),
        }
    }

    /// The last document observed before giving up.
    pub fn observed(&self) -> Option<&Value> {
        match self {
            Self::Infrastructure(_) => None,
            Self::IngressNotConverged { outcome, .. }
            | Self::RpNotSelected { outcome, .. }
            | Self::ProtocolNotConverged { outcome, .. } => outcome.last.as_ref(),
        }
    }
}

/// Per-run knobs; one instance drives every case.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Rendezvous socket the helpers connect back to
    pub socket_path: PathBuf,
    /// Helper program implementing the sender/receiver contract
    pub helper_program: PathBuf,
    /// Router whose ACLs pick the RP
    pub ingress_router: String,
    pub receiver_host: String,
    pub receiver_interface: String,
    pub sender_host: String,
    pub sender_interface: String,
    /// Seconds between sender datagrams
    pub send_interval: f64,
    /// Show command compared against the join fixtures
    pub join_command: String,
    /// Bound on the spawn-to-connect readiness handshake
    pub handshake_timeout: Duration,
    pub poll: PollSpec,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub case: TestCase,
    pub ingress_attempts: u32,
    pub rp_attempts: u32,
}

/// Drives test cases against a topology, one at a time. Owns the agent
/// channel: the rendezvous endpoint is a singleton resource, so no two
/// scenarios can overlap.
pub struct ScenarioRunner<'a> {
    topo: &'a Topology,
    fixtures: &'a FixtureStore,
    cfg: ScenarioConfig,
    channel: AgentChannel,
    agents: Vec<AgentHandle>,
    state: ScenarioState,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(topo: &'a Topology, fixtures: &'a FixtureStore, cfg: ScenarioConfig) -> Self {
        let channel = AgentChannel::new(cfg.socket_path.clone());
        Self {
            topo,
            fixtures,
            cfg,
            channel,
            agents: Vec::new(),
            state: ScenarioState::Idle,
        }
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    /// Run one test case. Teardown runs whether verification succeeds,
    /// fails, or an infrastructure error cuts the scenario short.
    pub async fn run(&mut self, case: &TestCase) -> Result<ScenarioReport, ScenarioError> {
        info!(
            case = case.id,
            group = %case.group,
            expected_rp = %case.expected_rp,
            "running RP selection scenario"
        );
        let outcome = self.drive(case).await;
        self.teardown();
        outcome
    }

    async fn drive(&mut self, case: &TestCase) -> Result<ScenarioReport, ScenarioError> {
        self.state = ScenarioState::AgentsStarting;
        self.channel.start().map_err(InfraError::from)?;

        // Receiver joins first so the sender's initial packets land on an
        // established membership.
        let request = SpawnRequest::receiver(
            &self.cfg.helper_program,
            self.channel.path(),
            case.group,
            &self.cfg.receiver_interface,
        );
        let host = self.topo.host(&self.cfg.receiver_host)?;
        let receiver_name = self.cfg.receiver_host.clone();
        let handle = start_agent(
            host,
            &mut self.channel,
            &receiver_name,
            &request,
            self.cfg.handshake_timeout,
        )
        .await?;
        self.agents.push(handle);

        let request = SpawnRequest::sender(
            &self.cfg.helper_program,
            self.channel.path(),
            case.group,
            &self.cfg.sender_interface,
            self.cfg.send_interval,
        );
        let host = self.topo.host(&self.cfg.sender_host)?;
        let sender_name = self.cfg.sender_host.clone();
        let handle = start_agent(
            host,
            &mut self.channel,
            &sender_name,
            &request,
            self.cfg.handshake_timeout,
        )
        .await?;
        self.agents.push(handle);

        self.state = ScenarioState::AgentsReady;
        info!(group = %case.group, "mcast join and source started");

        self.state = ScenarioState::VerifyingIngress;
        let ingress = self.cfg.ingress_router.clone();
        let (outcome, expected) = self.verify_join(&ingress, case).await?;
        if !outcome.converged {
            return Err(ScenarioError::IngressNotConverged {
                router: ingress,
                group: case.group,
                expected,
                outcome,
            });
        }
        let ingress_attempts = outcome.attempts;

        self.state = ScenarioState::VerifyingRp;
        let (outcome, expected) = self.verify_join(&case.expected_rp, case).await?;
        if !outcome.converged {
            return Err(ScenarioError::RpNotSelected {
                router: case.expected_rp.clone(),
                group: case.group,
                expected,
                outcome,
            });
        }

        Ok(ScenarioReport {
            case: case.clone(),
            ingress_attempts,
            rp_attempts: outcome.attempts,
        })
    }

    /// Poll `router`'s join state against the fixture for this case.
    async fn verify_join(
        &self,
        router_name: &str,
        case: &TestCase,
    ) -> Result<(PollOutcome, Value), InfraError> {
        let router = self.topo.router(router_name)?;
        let expected = self.fixtures.join_state(router_name, case.id)?;
        info!(router = router_name, group = %case.group, "verifying pim join");
        let command = self.cfg.join_command.as_str();
        let outcome = poll(
            &self.cfg.poll,
            || {
                let result = router.show(command);
                async move { result }
            },
            |observed| json_cmp(observed, &expected),
        )
        .await?;
        Ok((outcome, expected))
    }

    /// Close helper connections, reap helper processes, release the
    /// rendezvous endpoint. Runs on every exit path; the channel and
    /// agent handles also clean up on drop if the scenario is aborted
    /// mid-flight.
    fn teardown(&mut self) {
        self.state = ScenarioState::TearingDown;
        self.channel.stop();
        for agent in self.agents.drain(..) {
            let name = agent.name().to_string();
            match agent.stop(AGENT_EXIT_GRACE) {
                Ok(status) => debug!(name = %name, %status, "helper agent exited"),
                Err(e) => warn!(name = %name, error = %e, "failed to reap helper agent"),
            }
        }
        self.state = ScenarioState::Idle;
    }
}

/// Poll an arbitrary show-command on one router against a named fixture.
///
/// Run before the scenarios to make sure the control plane has settled;
/// without this, every case would burn its attempt budget on unrelated
/// protocol startup (OSPF adjacency, PIM neighbor formation).
pub async fn verify_protocol_convergence(
    topo: &Topology,
    fixtures: &FixtureStore,
    spec: &PollSpec,
    router_name: &str,
    command: &str,
    fixture: &str,
) -> Result<PollOutcome, ScenarioError> {
    let router = topo.router(router_name).map_err(InfraError::from)?;
    let expected = fixtures
        .load(router_name, fixture)
        .map_err(InfraError::from)?;
    info!(router = router_name, command, "checking protocol convergence");
    let outcome = poll(
        spec,
        || {
            let result = router.show(command);
            async move { result }
        },
        |observed| json_cmp(observed, &expected),
    )
    .await
    .map_err(InfraError::from)?;

    if outcome.converged {
        Ok(outcome)
    } else {
        Err(ScenarioError::ProtocolNotConverged {
            router: router_name.to_string(),
            command: command.to_string(),
            expected,
            outcome,
        })
    }
}
