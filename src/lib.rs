use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub mod agent;
pub mod channel;
pub mod config;
pub mod fixtures;
pub mod json_cmp;
pub mod poll;
pub mod scenario;
pub mod topology;

pub use channel::{AgentChannel, PeerSlot};
pub use poll::{PollOutcome, PollSpec};
pub use scenario::{ScenarioError, ScenarioRunner, ScenarioState};

/// One RP-selection scenario: which ACL entry is exercised, the multicast
/// group driven through it, and the router that entry must select as RP.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// ACL entry number, also the key for fixture lookup
    pub id: u32,
    /// Multicast group joined by the receiver and targeted by the sender
    pub group: Ipv4Addr,
    /// Router that must end up holding the join state for the group
    pub expected_rp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_serialization() {
        let case = TestCase {
            id: 1,
            group: "239.100.0.1".parse().unwrap(),
            expected_rp: "r11".to_string(),
        };
        let json = serde_json::to_string(&case).unwrap();
        let deserialized: TestCase = serde_json::from_str(&json).unwrap();
        assert_eq!(case, deserialized);
    }

    #[test]
    fn test_case_from_config_form() {
        let case: TestCase =
            serde_json::from_str(r#"{"id":2,"group":"239.100.0.17","expected_rp":"r12"}"#).unwrap();
        assert_eq!(case.id, 2);
        assert_eq!(case.group, "239.100.0.17".parse::<Ipv4Addr>().unwrap());
        assert_eq!(case.expected_rp, "r12");
    }
}
