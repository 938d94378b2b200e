// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Harness configuration file types and parsing.
//!
//! JSON5 configuration format supporting:
//! - Router and host argv prefixes for the topology facade
//! - The test-case table (ACL entry, group, expected RP)
//! - Poll budget, handshake timeout and helper knobs
//! - Comments and trailing commas

use crate::poll::PollSpec;
use crate::scenario::ScenarioConfig;
use crate::topology::{ExecHost, ExecRouter, Topology};
use crate::TestCase;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    IoError(PathBuf, String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("duplicate test case id {0}")]
    DuplicateCase(u32),

    #[error("{role} host '{host}' is not declared in hosts")]
    UnknownHost { role: &'static str, host: String },

    #[error("router '{0}' is not declared in routers")]
    UnknownRouter(String),

    #[error("poll_max_attempts must be at least 1")]
    ZeroPollAttempts,

    #[error("no test cases configured")]
    NoCases,
}

/// Which emulated host runs a helper, and on which interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub host: String,
    pub interface: String,
}

/// A protocol convergence precheck run before any scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Precheck {
    pub router: String,
    pub command: String,
    pub fixture: String,
}

/// Harness configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    /// Rendezvous socket the helpers connect back to
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Helper program implementing the sender/receiver contract
    pub helper_program: PathBuf,

    /// Directory holding the expected-state documents
    pub fixture_dir: PathBuf,

    /// Router whose ACLs pick the RP
    #[serde(default = "default_ingress_router")]
    pub ingress_router: String,

    pub receiver: AgentEndpoint,
    pub sender: AgentEndpoint,

    /// Seconds between sender datagrams
    #[serde(default = "default_send_interval")]
    pub send_interval: f64,

    /// Show command compared against the join fixtures
    #[serde(default = "default_join_command")]
    pub join_command: String,

    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Argv prefix per router for executing show commands
    /// (e.g. `["ip", "netns", "exec", "r1", "vtysh", "-c"]`)
    #[serde(default)]
    pub routers: HashMap<String, Vec<String>>,

    /// Argv prefix per host for launching helpers
    #[serde(default)]
    pub hosts: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub prechecks: Vec<Precheck>,

    #[serde(default)]
    pub cases: Vec<TestCase>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/rp_harness_apps.sock")
}

fn default_ingress_router() -> String {
    "r1".to_string()
}

fn default_send_interval() -> f64 {
    0.7
}

fn default_join_command() -> String {
    "show ip pim join json".to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> f64 {
    2.0
}

fn default_poll_max_attempts() -> u32 {
    60
}

impl HarnessConfig {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_max_attempts == 0 {
            return Err(ConfigError::ZeroPollAttempts);
        }
        if self.cases.is_empty() {
            return Err(ConfigError::NoCases);
        }

        let mut seen = HashSet::new();
        for case in &self.cases {
            if !seen.insert(case.id) {
                return Err(ConfigError::DuplicateCase(case.id));
            }
            if !self.routers.contains_key(&case.expected_rp) {
                return Err(ConfigError::UnknownRouter(case.expected_rp.clone()));
            }
        }

        for (role, endpoint) in [("receiver", &self.receiver), ("sender", &self.sender)] {
            if !self.hosts.contains_key(&endpoint.host) {
                return Err(ConfigError::UnknownHost {
                    role,
                    host: endpoint.host.clone(),
                });
            }
        }

        if !self.routers.contains_key(&self.ingress_router) {
            return Err(ConfigError::UnknownRouter(self.ingress_router.clone()));
        }
        for check in &self.prechecks {
            if !self.routers.contains_key(&check.router) {
                return Err(ConfigError::UnknownRouter(check.router.clone()));
            }
        }

        Ok(())
    }

    pub fn poll_spec(&self) -> PollSpec {
        PollSpec::new(
            Duration::from_secs_f64(self.poll_interval_secs),
            self.poll_max_attempts,
        )
    }

    /// Per-scenario view of this configuration.
    pub fn scenario_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            socket_path: self.socket_path.clone(),
            helper_program: self.helper_program.clone(),
            ingress_router: self.ingress_router.clone(),
            receiver_host: self.receiver.host.clone(),
            receiver_interface: self.receiver.interface.clone(),
            sender_host: self.sender.host.clone(),
            sender_interface: self.sender.interface.clone(),
            send_interval: self.send_interval,
            join_command: self.join_command.clone(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            poll: self.poll_spec(),
        }
    }

    /// Build the topology facade from the configured argv prefixes.
    pub fn build_topology(&self) -> Topology {
        let mut topo = Topology::new();
        for (name, argv) in &self.routers {
            topo.add_router(ExecRouter::new(name.clone(), argv.clone()));
        }
        for (name, argv) in &self.hosts {
            topo.add_host(ExecHost::new(name.clone(), argv.clone()));
        }
        topo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        // RP selection harness, 6-entry ACL topology
        helper_program: "/usr/lib/rp_harness/mcast_agent",
        fixture_dir: "fixtures",
        receiver: { host: "h1", interface: "h1-eth0" },
        sender: { host: "h2", interface: "h2-eth0" },
        routers: {
            r1: ["ip", "netns", "exec", "r1", "vtysh", "-c"],
            r11: ["ip", "netns", "exec", "r11", "vtysh", "-c"],
            r12: ["ip", "netns", "exec", "r12", "vtysh", "-c"],
        },
        hosts: {
            h1: ["ip", "netns", "exec", "h1"],
            h2: ["ip", "netns", "exec", "h2"],
        },
        prechecks: [
            { router: "r1", command: "show ip ospf neighbor json", fixture: "ospf_neighbor.json" },
        ],
        cases: [
            { id: 1, group: "239.100.0.1", expected_rp: "r11" },
            { id: 2, group: "239.100.0.17", expected_rp: "r12" },
        ],
    }"#;

    #[test]
    fn parses_json5_with_comments_and_defaults() {
        let config = HarnessConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.ingress_router, "r1");
        assert_eq!(config.send_interval, 0.7);
        assert_eq!(config.join_command, "show ip pim join json");
        assert_eq!(config.poll_max_attempts, 60);
        assert_eq!(config.cases.len(), 2);
        assert_eq!(config.cases[1].expected_rp, "r12");
        config.validate().unwrap();
    }

    #[test]
    fn duplicate_case_ids_are_rejected() {
        let mut config = HarnessConfig::parse(SAMPLE).unwrap();
        let case = config.cases[0].clone();
        config.cases.push(case);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateCase(1))
        ));
    }

    #[test]
    fn case_rp_must_be_a_declared_router() {
        let mut config = HarnessConfig::parse(SAMPLE).unwrap();
        config.cases[0].expected_rp = "r15".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownRouter(r)) if r == "r15"
        ));
    }

    #[test]
    fn endpoints_must_name_declared_hosts() {
        let mut config = HarnessConfig::parse(SAMPLE).unwrap();
        config.sender.host = "h9".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownHost { role: "sender", .. })
        ));
    }

    #[test]
    fn zero_poll_attempts_are_rejected() {
        let mut config = HarnessConfig::parse(SAMPLE).unwrap();
        config.poll_max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroPollAttempts)
        ));
    }

    #[test]
    fn empty_case_table_is_rejected() {
        let mut config = HarnessConfig::parse(SAMPLE).unwrap();
        config.cases.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoCases)));
    }

    #[test]
    fn scenario_config_carries_the_poll_budget() {
        let config = HarnessConfig::parse(SAMPLE).unwrap();
        let scenario = config.scenario_config();
        assert_eq!(scenario.poll.max_attempts, 60);
        assert_eq!(scenario.poll.interval, Duration::from_secs(2));
        assert_eq!(scenario.handshake_timeout, Duration::from_secs(10));
        assert_eq!(scenario.receiver_host, "h1");
        assert_eq!(scenario.sender_interface, "h2-eth0");
    }

    #[test]
    fn topology_is_built_from_the_prefixes() {
        let config = HarnessConfig::parse(SAMPLE).unwrap();
        let topo = config.build_topology();
        assert!(topo.has_router("r1"));
        assert!(topo.has_router("r12"));
        assert!(topo.has_host("h2"));
        assert!(!topo.has_router("r15"));
    }
}
