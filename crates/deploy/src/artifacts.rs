//! Compiled contract artifacts.
//!
//! Artifacts are read from a directory of compiler output. Both the Hardhat
//! layout (`"bytecode": "0x..."`) and the Foundry layout
//! (`"bytecode": {"object": "0x..."}`, nested under `<Name>.sol/`) are accepted.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use serde_json::Value;

use crate::errors::DeployError;

/// Bytecode for the artifacts a run may deploy, keyed by artifact name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    dir: Option<PathBuf>,
    bytecode: BTreeMap<String, Bytes>,
}

impl ArtifactStore {
    /// An empty store backed by `dir`. Artifacts are read lazily on first use.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            bytecode: BTreeMap::new(),
        }
    }

    /// Register bytecode directly, bypassing the filesystem.
    pub fn insert(&mut self, name: impl Into<String>, bytecode: impl Into<Bytes>) -> &mut Self {
        self.bytecode.insert(name.into(), bytecode.into());
        self
    }

    /// Look up the creation bytecode for `name`, loading it from disk if needed.
    pub fn bytecode(&mut self, name: &str) -> Result<Bytes, DeployError> {
        if let Some(code) = self.bytecode.get(name) {
            return Ok(code.clone());
        }

        let dir = self.dir.as_ref().ok_or_else(|| DeployError::Artifact {
            name: name.to_string(),
            cause: "not registered and no artifacts directory configured".to_string(),
        })?;

        let path = find_artifact(dir, name)?;
        let code = read_bytecode(&path, name)?;
        tracing::debug!(
            artifact = name,
            path = %path.display(),
            len = code.len(),
            "Loaded artifact"
        );

        self.bytecode.insert(name.to_string(), code.clone());
        Ok(code)
    }
}

fn find_artifact(dir: &Path, name: &str) -> Result<PathBuf, DeployError> {
    let candidates = [
        dir.join(format!("{name}.json")),
        dir.join(format!("{name}.sol")).join(format!("{name}.json")),
    ];

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| DeployError::Artifact {
            name: name.to_string(),
            cause: format!("no artifact file found under {}", dir.display()),
        })
}

fn read_bytecode(path: &Path, name: &str) -> Result<Bytes, DeployError> {
    let artifact_err = |cause: String| DeployError::Artifact {
        name: name.to_string(),
        cause,
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| artifact_err(format!("failed to read {}: {e}", path.display())))?;
    let json: Value = serde_json::from_str(&content)
        .map_err(|e| artifact_err(format!("failed to parse {}: {e}", path.display())))?;

    parse_bytecode(&json).map_err(artifact_err)
}

/// Extract creation bytecode from a compiler artifact.
pub fn parse_bytecode(json: &Value) -> Result<Bytes, String> {
    let raw = match &json["bytecode"] {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj
            .get("object")
            .and_then(|o| o.as_str())
            .ok_or("bytecode object has no `object` field")?,
        _ => return Err("artifact has no `bytecode` field".to_string()),
    };

    let code = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| format!("bytecode is not valid hex: {e}"))?;

    if code.is_empty() {
        return Err("bytecode is empty (abstract contract or interface?)".to_string());
    }

    Ok(code.into())
}
