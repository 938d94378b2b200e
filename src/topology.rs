// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Facade over the external topology emulation.
//!
//! Routers and hosts are collaborators the harness only talks to: a
//! router executes a show-command and returns its structured output, a
//! host launches helper programs. The `Exec*` implementations drive real
//! emulated nodes through a configured argv prefix (for example
//! `ip netns exec r1 vtysh -c`); tests substitute mocks.

use crate::agent::{InfraError, SpawnRequest};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::process::{Child, Command, Stdio};

pub trait RouterCtl {
    fn name(&self) -> &str;

    /// Execute an observation command and parse its structured output.
    fn show(&self, command: &str) -> Result<Value>;
}

pub trait HostCtl {
    fn name(&self) -> &str;

    /// Launch a helper program on this host.
    fn spawn(&self, request: &SpawnRequest) -> io::Result<Child>;
}

/// Name-keyed registry of the routers and hosts a scenario may touch.
#[derive(Default)]
pub struct Topology {
    routers: HashMap<String, Box<dyn RouterCtl>>,
    hosts: HashMap<String, Box<dyn HostCtl>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_router(&mut self, router: impl RouterCtl + 'static) -> &mut Self {
        self.routers
            .insert(router.name().to_string(), Box::new(router));
        self
    }

    pub fn add_host(&mut self, host: impl HostCtl + 'static) -> &mut Self {
        self.hosts.insert(host.name().to_string(), Box::new(host));
        self
    }

    /// Unknown names are environment bugs, not convergence outcomes.
    pub fn router(&self, name: &str) -> Result<&dyn RouterCtl, InfraError> {
        self.routers
            .get(name)
            .map(|r| r.as_ref())
            .ok_or_else(|| InfraError::UnknownRouter(name.to_string()))
    }

    pub fn host(&self, name: &str) -> Result<&dyn HostCtl, InfraError> {
        self.hosts
            .get(name)
            .map(|h| h.as_ref())
            .ok_or_else(|| InfraError::UnknownHost(name.to_string()))
    }

    pub fn has_router(&self, name: &str) -> bool {
        self.routers.contains_key(name)
    }

    pub fn has_host(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }
}

/// Router driven by running a command line, e.g.
/// `ip netns exec r1 vtysh -c "<show command>"`. The show command is
/// passed as a single trailing argument.
pub struct ExecRouter {
    name: String,
    argv: Vec<String>,
}

impl ExecRouter {
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
        }
    }
}

impl RouterCtl for ExecRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn show(&self, command: &str) -> Result<Value> {
        let (program, rest) = self
            .argv
            .split_first()
            .with_context(|| format!("router {} has an empty exec prefix", self.name))?;
        let output = Command::new(program)
            .args(rest)
            .arg(command)
            .output()
            .with_context(|| format!("failed to run show command on {}", self.name))?;
        if !output.status.success() {
            bail!(
                "show command failed on {}: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("router {} returned non-JSON output", self.name))
    }
}

/// Host driven the same way; the spawn prefix wraps the helper argv. An
/// empty prefix runs the helper directly on the test machine.
pub struct ExecHost {
    name: String,
    argv: Vec<String>,
}

impl ExecHost {
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
        }
    }
}

impl HostCtl for ExecHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, request: &SpawnRequest) -> io::Result<Child> {
        let mut argv = self.argv.iter();
        let mut cmd = match argv.next() {
            Some(program) => {
                let mut cmd = Command::new(program);
                cmd.args(argv);
                cmd.arg(&request.program);
                cmd
            }
            None => Command::new(&request.program),
        };
        cmd.args(&request.args).stdin(Stdio::null()).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn unknown_names_are_infrastructure_errors() {
        let topo = Topology::new();
        assert!(matches!(
            topo.router("r1"),
            Err(InfraError::UnknownRouter(_))
        ));
        assert!(matches!(topo.host("h1"), Err(InfraError::UnknownHost(_))));
    }

    #[test]
    fn registered_nodes_are_found_by_name() {
        let mut topo = Topology::new();
        topo.add_router(ExecRouter::new("r1", vec!["true".to_string()]));
        topo.add_host(ExecHost::new("h1", vec![]));
        assert!(topo.has_router("r1"));
        assert!(topo.has_host("h1"));
        assert_eq!(topo.router("r1").unwrap().name(), "r1");
        assert_eq!(topo.host("h1").unwrap().name(), "h1");
    }

    #[test]
    fn exec_router_parses_command_output() {
        // `echo` stands in for the netns + vtysh prefix: the trailing
        // argument is the show command, the stdout is the document.
        let router = ExecRouter::new("r1", vec!["echo".to_string()]);
        let doc = router.show(r#"{"up": true}"#).unwrap();
        assert_eq!(doc, json!({"up": true}));
    }

    #[test]
    fn exec_router_rejects_non_json_output() {
        let router = ExecRouter::new("r1", vec!["echo".to_string()]);
        let err = router.show("not json").unwrap_err();
        assert!(err.to_string().contains("non-JSON"));
    }

    #[test]
    fn exec_router_reports_command_failure() {
        let router = ExecRouter::new("r1", vec!["false".to_string()]);
        assert!(router.show("show ip pim join json").is_err());
    }

    #[test]
    fn exec_host_with_empty_prefix_runs_the_helper_directly() {
        let host = ExecHost::new("h1", vec![]);
        let request = SpawnRequest {
            program: Path::new("true").to_path_buf(),
            args: vec![],
        };
        let mut child = host.spawn(&request).unwrap();
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn exec_host_prefix_wraps_the_helper_argv() {
        // `env` as prefix: exercises prefix + program + args composition.
        let host = ExecHost::new("h1", vec!["env".to_string()]);
        let request = SpawnRequest {
            program: Path::new("true").to_path_buf(),
            args: vec![],
        };
        let mut child = host.spawn(&request).unwrap();
        assert!(child.wait().unwrap().success());
    }
}
