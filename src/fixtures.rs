// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Stored expected-state documents.
//!
//! One JSON document per (router, verification step), laid out on disk
//! as `<root>/<router>/<file>`. Join-state fixtures for the ACL
//! scenarios follow the `acl_<id>_pim_join.json` naming scheme; the
//! document schema is owned by the router collaborator, not by the
//! harness.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("fixture {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expected join state on `router` for ACL entry `case_id`.
    pub fn join_state(&self, router: &str, case_id: u32) -> Result<Value, FixtureError> {
        self.load(router, &format!("acl_{case_id}_pim_join.json"))
    }

    pub fn load(&self, router: &str, file: &str) -> Result<Value, FixtureError> {
        let path = self.root.join(router).join(file);
        let content = std::fs::read_to_string(&path).map_err(|source| FixtureError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| FixtureError::Parse { path, source })
    }
}
