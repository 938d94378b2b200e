// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Structural subset comparison for router show-command output.
//!
//! Expected documents are fixtures that intentionally omit dynamic fields
//! (timers, counters). An observed document matches when every key the
//! fixture names is present with a matching value; observed keys the
//! fixture does not mention are ignored. The string `"*"` matches any
//! present value, and an expected `null` asserts the key is absent.

use serde_json::Value;
use std::fmt;

/// A single point of disagreement between observed and expected documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// Location of the disagreement, e.g. `$.r1-eth0.239.100.0.1`
    pub path: String,
    pub expected: Value,
    pub actual: Value,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at {}: expected {}, got {}",
            self.path, self.expected, self.actual
        )
    }
}

/// Compare an observed document against an expected subset document.
///
/// Returns `None` on match, or the first mismatch found in document order.
pub fn json_cmp(observed: &Value, expected: &Value) -> Option<Mismatch> {
    cmp_at("$", observed, expected)
}

fn cmp_at(path: &str, observed: &Value, expected: &Value) -> Option<Mismatch> {
    match expected {
        // Wildcard: the key must exist, its value is unconstrained.
        Value::String(s) if s == "*" => None,
        Value::Object(exp_map) => {
            let obs_map = match observed {
                Value::Object(map) => map,
                _ => return Some(mismatch(path, expected, observed)),
            };
            for (key, exp_val) in exp_map {
                let child = format!("{path}.{key}");
                match (obs_map.get(key), exp_val) {
                    // Expected null pins the key down as absent.
                    (None, Value::Null) => {}
                    (Some(obs_val), Value::Null) => {
                        return Some(mismatch(&child, &Value::Null, obs_val));
                    }
                    (None, _) => return Some(mismatch(&child, exp_val, &Value::Null)),
                    (Some(obs_val), _) => {
                        if let Some(m) = cmp_at(&child, obs_val, exp_val) {
                            return Some(m);
                        }
                    }
                }
            }
            None
        }
        Value::Array(exp_items) => {
            let obs_items = match observed {
                Value::Array(items) => items,
                _ => return Some(mismatch(path, expected, observed)),
            };
            if obs_items.len() < exp_items.len() {
                return Some(mismatch(path, expected, observed));
            }
            for (idx, exp_item) in exp_items.iter().enumerate() {
                let child = format!("{path}[{idx}]");
                if let Some(m) = cmp_at(&child, &obs_items[idx], exp_item) {
                    return Some(m);
                }
            }
            None
        }
        _ => {
            if observed == expected {
                None
            } else {
                Some(mismatch(path, expected, observed))
            }
        }
    }
}

fn mismatch(path: &str, expected: &Value, actual: &Value) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        expected: expected.clone(),
        actual: actual.clone(),
    }
}
