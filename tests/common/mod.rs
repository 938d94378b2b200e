// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Mock topology collaborators for driving the harness without a real
//! network emulation.
//!
//! Routers serve scripted show-command output. Hosts spawn a placeholder
//! process and emulate the helper contract from a thread: connect back
//! to the rendezvous socket named in the spawn request, then block until
//! the harness closes the connection.

use rp_harness::agent::SpawnRequest;
use rp_harness::topology::{HostCtl, RouterCtl};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

/// Records probe/spawn order across the whole mock topology.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Scripted router: serves responses front-to-back, repeating the final
/// one once the script is exhausted.
pub struct MockRouter {
    name: String,
    script: Mutex<VecDeque<Value>>,
    log: EventLog,
}

impl MockRouter {
    pub fn new(name: &str, script: Vec<Value>, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            log,
        }
    }

    /// Router that reports `settling` for `delay` probes, then `settled`
    /// forever.
    pub fn converging(name: &str, delay: usize, settling: Value, settled: Value, log: EventLog) -> Self {
        let mut script: Vec<Value> = std::iter::repeat(settling).take(delay).collect();
        script.push(settled);
        Self::new(name, script, log)
    }

    /// Router that never converges: serves the same document forever.
    pub fn stuck(name: &str, doc: Value, log: EventLog) -> Self {
        Self::new(name, vec![doc], log)
    }
}

impl RouterCtl for MockRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn show(&self, _command: &str) -> anyhow::Result<Value> {
        self.log.lock().unwrap().push(format!("show {}", self.name));
        let mut script = self.script.lock().unwrap();
        let doc = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Value::Null)
        };
        Ok(doc)
    }
}

/// Host that emulates the helper contract. The spawned child is a
/// placeholder (`sleep`); the connect-back happens from a thread using
/// the endpoint path carried in the spawn request.
pub struct MockHost {
    name: String,
    connect_back: bool,
    log: EventLog,
}

impl MockHost {
    pub fn new(name: &str, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            connect_back: true,
            log,
        }
    }

    /// A host whose helper starts but never reaches the rendezvous.
    pub fn mute(name: &str, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            connect_back: false,
            log,
        }
    }
}

impl HostCtl for MockHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, request: &SpawnRequest) -> io::Result<Child> {
        self.log.lock().unwrap().push(format!("spawn {}", self.name));
        if self.connect_back {
            let endpoint = request.args[0].clone();
            std::thread::spawn(move || {
                // The listener is bound before spawn is called; the retry
                // only absorbs scheduling noise.
                for _ in 0..100 {
                    if let Ok(mut stream) = std::os::unix::net::UnixStream::connect(&endpoint) {
                        let mut buf = [0u8; 16];
                        loop {
                            match io::Read::read(&mut stream, &mut buf) {
                                Ok(0) | Err(_) => return,
                                Ok(_) => {}
                            }
                        }
                    }
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            });
        }
        // Short-lived placeholder: the real helper's lifetime is driven
        // by its control connection, which the thread above emulates.
        Command::new("sleep").arg("0.2").stdin(Stdio::null()).spawn()
    }
}

/// A representative join-state document for `group` as seen on `iface`.
/// `extra_dynamic` mimics the timer fields real output carries and
/// fixtures omit.
pub fn join_doc(iface: &str, group: &str, extra_dynamic: bool) -> Value {
    let mut entry = json!({
        "source": "*",
        "group": group,
        "channelJoinName": "JOIN",
    });
    if extra_dynamic {
        entry["upTime"] = json!("00:01:02");
        entry["expire"] = json!("02:56");
    }
    json!({
        iface: {
            "name": iface,
            group: { "*": entry },
        }
    })
}

/// Empty interface table: the state of a router that has not installed
/// the join (or was never supposed to).
pub fn idle_doc(iface: &str) -> Value {
    json!({ iface: { "name": iface } })
}

pub fn write_join_fixture(root: &Path, router: &str, case: u32, doc: &Value) {
    let dir = root.join(router);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("acl_{case}_pim_join.json")),
        serde_json::to_string_pretty(doc).unwrap(),
    )
    .unwrap();
}

pub fn write_fixture(root: &Path, router: &str, file: &str, doc: &Value) {
    let dir = root.join(router);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(file), serde_json::to_string_pretty(doc).unwrap()).unwrap();
}
