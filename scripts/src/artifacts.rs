//! Reading compiled contract artifacts
//!
//! Both Hardhat (`artifacts/contracts/<Source>.sol/<Name>.json`, bytecode as a
//! hex string) and Foundry (`out/<Source>.sol/<Name>.json`, bytecode under
//! `object`) layouts are supported. Build info, required for verification, is
//! only produced by Hardhat.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::Bytes;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    constants::{BUILD_INFO_DIR, DBG_FILE_SUFFIX},
    errors::ScriptError,
};

/// A compiled contract
#[derive(Clone, Debug)]
pub struct ContractArtifact {
    /// The name of the contract
    pub contract_name: String,
    /// The path of the source file defining the contract, only recorded in
    /// Hardhat artifacts
    pub source_name: Option<String>,
    /// The creation bytecode, without constructor arguments
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// The fully qualified `<source>:<contract>` name used by block explorers
    pub fn fully_qualified_name(&self) -> Result<String, ScriptError> {
        let source = self.source_name.as_ref().ok_or_else(|| {
            ScriptError::ArtifactParsing(format!(
                "artifact for {} has no source name",
                self.contract_name
            ))
        })?;
        Ok(format!("{}:{}", source, self.contract_name))
    }
}

/// The compiler invocation which produced an artifact
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// The full solc version, e.g. `0.8.7+commit.e28d00a7`
    pub solc_long_version: String,
    /// The standard-JSON compiler input
    pub input: serde_json::Value,
}

/// The on-disk format of an artifact
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    /// Set by Hardhat
    #[serde(default)]
    contract_name: Option<String>,
    /// Set by Hardhat
    #[serde(default)]
    source_name: Option<String>,
    /// The creation bytecode
    bytecode: RawBytecode,
}

/// Bytecode as written by the different toolchains
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// Hardhat writes the bytecode as a hex string
    Hex(Bytes),
    /// Foundry nests it in an object
    Object {
        /// The hex bytecode
        object: Bytes,
    },
}

/// The Hardhat debug file sitting next to each artifact
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    /// The path to the build info, relative to the debug file
    build_info: PathBuf,
}

/// A directory of compiled artifacts
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    /// The root of the artifacts directory
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact of the named contract
    pub fn load(&self, contract: &str) -> Result<ContractArtifact, ScriptError> {
        let path = self.artifact_path(contract)?;
        let raw: RawArtifact = read_json(&path)?;

        let bytecode = match raw.bytecode {
            RawBytecode::Hex(bytes) | RawBytecode::Object { object: bytes } => bytes,
        };
        if bytecode.is_empty() {
            return Err(ScriptError::ArtifactParsing(format!(
                "{contract} has no creation bytecode, is it abstract?"
            )));
        }

        // Foundry only records the file name of the source, not its path, so
        // no source name is known for its artifacts
        Ok(ContractArtifact {
            contract_name: raw.contract_name.unwrap_or_else(|| contract.to_string()),
            source_name: raw.source_name,
            bytecode,
        })
    }

    /// Load the build info of the named contract via its debug file
    pub fn build_info(&self, contract: &str) -> Result<BuildInfo, ScriptError> {
        let artifact_path = self.artifact_path(contract)?;
        let dbg_path = artifact_path.with_file_name(format!("{contract}{DBG_FILE_SUFFIX}"));
        let dbg: DebugFile = read_json(&dbg_path)?;

        let build_info_path = match dbg_path.parent() {
            Some(dir) => dir.join(&dbg.build_info),
            None => dbg.build_info,
        };
        read_json(&build_info_path)
    }

    /// Find the artifact file of the named contract
    fn artifact_path(&self, contract: &str) -> Result<PathBuf, ScriptError> {
        let file_name = format!("{contract}.json");
        find_file(&self.root, &file_name)?.ok_or_else(|| {
            ScriptError::ArtifactParsing(format!(
                "no artifact for {} under {}",
                contract,
                self.root.display()
            ))
        })
    }
}

/// Recursively search `dir` for a file with the given name, skipping build info
fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>, ScriptError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", dir.display(), e)))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?
            .path();
        if path.is_dir() {
            if !path.ends_with(BUILD_INFO_DIR) {
                subdirs.push(path);
            }
        } else if path.file_name().is_some_and(|name| name == file_name) {
            return Ok(Some(path));
        }
    }

    // Sort for a deterministic pick when a contract name is reused across sources
    subdirs.sort();
    for subdir in subdirs {
        if let Some(path) = find_file(&subdir, file_name)? {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Read and parse a JSON file
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ScriptError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))
}
