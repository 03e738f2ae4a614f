//! Compiled contract artifacts.
//!
//! Artifacts are produced by an external compiler. [`DirectoryResolver`] reads
//! the JSON files Hardhat writes under `artifacts/` and Foundry writes under
//! `out/`; [`InMemoryResolver`] serves artifacts built in code.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use serde::Deserialize;

/// Deployable bytecode and ABI of one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    pub bytecode: Bytes,
    pub abi: JsonAbi,
}

impl Artifact {
    pub fn new(contract_name: impl Into<String>, bytecode: Bytes, abi: JsonAbi) -> Self {
        Self {
            contract_name: contract_name.into(),
            bytecode,
            abi,
        }
    }

    /// Build an artifact from human-readable ABI signatures, e.g.
    /// `"constructor(string,string)"` or `"function authorizeOnce(address)"`.
    pub fn from_signatures(
        contract_name: impl Into<String>,
        bytecode: Bytes,
        signatures: &[&str],
    ) -> Result<Self, ArtifactError> {
        let contract_name = contract_name.into();
        let abi = JsonAbi::parse(signatures.iter().copied()).map_err(|e| {
            ArtifactError::Malformed {
                name: contract_name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::new(contract_name, bytecode, abi))
    }

    /// Interfaces and abstract contracts compile to empty bytecode.
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("no artifact named `{name}`")]
    NotFound { name: String },

    #[error("artifact `{name}` is ambiguous: {candidates:?}")]
    Ambiguous {
        name: String,
        candidates: Vec<PathBuf>,
    },

    #[error("artifact `{name}` is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("failed to read artifacts: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of contract artifacts.
pub trait ArtifactResolver {
    fn resolve(&self, contract: &str) -> Result<Artifact, ArtifactError>;
}

impl<R: ArtifactResolver + ?Sized> ArtifactResolver for &R {
    fn resolve(&self, contract: &str) -> Result<Artifact, ArtifactError> {
        (**self).resolve(contract)
    }
}

/// Hardhat stores bytecode as a hex string, Foundry as `{ "object": "0x.." }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(Bytes),
    Object { object: Bytes },
}

#[derive(Deserialize)]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: BytecodeField,
}

/// Resolves artifacts from a compiler output directory.
///
/// `Name` is looked up as `Name.json` anywhere below the root, skipping
/// `build-info` directories and `.dbg.json` debug files.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect_candidates(
        dir: &Path,
        file_name: &str,
        found: &mut Vec<PathBuf>,
    ) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                if path.file_name().is_some_and(|n| n == "build-info") {
                    continue;
                }
                Self::collect_candidates(&path, file_name, found)?;
            } else if path.file_name().is_some_and(|n| n == file_name) {
                found.push(path);
            }
        }
        Ok(())
    }
}

impl ArtifactResolver for DirectoryResolver {
    fn resolve(&self, contract: &str) -> Result<Artifact, ArtifactError> {
        let mut candidates = Vec::new();
        if self.root.is_dir() {
            Self::collect_candidates(&self.root, &format!("{contract}.json"), &mut candidates)?;
        }

        let path = match candidates.len() {
            0 => {
                return Err(ArtifactError::NotFound {
                    name: contract.to_string(),
                });
            }
            1 => candidates.remove(0),
            _ => {
                candidates.sort();
                return Err(ArtifactError::Ambiguous {
                    name: contract.to_string(),
                    candidates,
                });
            }
        };

        let content = std::fs::read_to_string(&path)?;
        let file: ArtifactFile =
            serde_json::from_str(&content).map_err(|e| ArtifactError::Malformed {
                name: contract.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;

        let bytecode = match file.bytecode {
            BytecodeField::Hex(bytes) | BytecodeField::Object { object: bytes } => bytes,
        };

        tracing::debug!(
            contract,
            path = %path.display(),
            bytecode_len = bytecode.len(),
            "Artifact resolved"
        );

        Ok(Artifact::new(contract, bytecode, file.abi))
    }
}

/// Artifacts held in memory, keyed by contract name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    artifacts: HashMap<String, Artifact>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }
}

impl ArtifactResolver for InMemoryResolver {
    fn resolve(&self, contract: &str) -> Result<Artifact, ArtifactError> {
        self.artifacts
            .get(contract)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound {
                name: contract.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const HARDHAT_ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "TreeToken",
        "sourceName": "contracts/TreeToken.sol",
        "abi": [
            {
                "type": "constructor",
                "inputs": [
                    { "name": "name_", "type": "string", "internalType": "string" },
                    { "name": "symbol_", "type": "string", "internalType": "string" }
                ],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "authorizeOnce",
                "inputs": [{ "name": "minter", "type": "address", "internalType": "address" }],
                "outputs": [],
                "stateMutability": "nonpayable"
            }
        ],
        "bytecode": "0x6080604052",
        "deployedBytecode": "0x6080",
        "linkReferences": {},
        "deployedLinkReferences": {}
    }"#;

    const FOUNDRY_ARTIFACT: &str = r#"{
        "abi": [],
        "bytecode": { "object": "0x60806040", "sourceMap": "", "linkReferences": {} },
        "deployedBytecode": { "object": "0x6080" }
    }"#;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_hardhat_artifact() {
        let dir = TempDir::new("arbor-artifacts").unwrap();
        write(dir.path(), "contracts/TreeToken.sol/TreeToken.json", HARDHAT_ARTIFACT);
        write(dir.path(), "contracts/TreeToken.sol/TreeToken.dbg.json", "{}");
        write(dir.path(), "build-info/TreeToken.json", "not json");

        let artifact = DirectoryResolver::new(dir.path()).resolve("TreeToken").unwrap();

        assert_eq!(artifact.contract_name, "TreeToken");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(artifact.abi.constructor.as_ref().unwrap().inputs.len(), 2);
        assert!(artifact.abi.function("authorizeOnce").is_some());
    }

    #[test]
    fn test_resolve_foundry_artifact() {
        let dir = TempDir::new("arbor-artifacts").unwrap();
        write(dir.path(), "AdoptionPlant.sol/AdoptionPlant.json", FOUNDRY_ARTIFACT);

        let artifact = DirectoryResolver::new(dir.path())
            .resolve("AdoptionPlant")
            .unwrap();
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40]);
        assert!(artifact.is_deployable());
    }

    #[test]
    fn test_unknown_contract_not_found() {
        let dir = TempDir::new("arbor-artifacts").unwrap();
        write(dir.path(), "contracts/TreeToken.sol/TreeToken.json", HARDHAT_ARTIFACT);

        let err = DirectoryResolver::new(dir.path()).resolve("Missing").unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { name } if name == "Missing"));

        let err = DirectoryResolver::new(dir.path().join("absent"))
            .resolve("TreeToken")
            .unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
    }

    #[test]
    fn test_duplicate_names_are_ambiguous() {
        let dir = TempDir::new("arbor-artifacts").unwrap();
        write(dir.path(), "contracts/a/Token.sol/Token.json", FOUNDRY_ARTIFACT);
        write(dir.path(), "contracts/b/Token.sol/Token.json", FOUNDRY_ARTIFACT);

        let err = DirectoryResolver::new(dir.path()).resolve("Token").unwrap_err();
        assert!(
            matches!(err, ArtifactError::Ambiguous { candidates, .. } if candidates.len() == 2)
        );
    }

    #[test]
    fn test_malformed_artifact() {
        let dir = TempDir::new("arbor-artifacts").unwrap();
        write(dir.path(), "Broken.json", r#"{ "abi": "nope" }"#);

        let err = DirectoryResolver::new(dir.path()).resolve("Broken").unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed { .. }));
    }

    #[test]
    fn test_in_memory_resolver() {
        let artifact = Artifact::from_signatures(
            "TreeToken",
            Bytes::from_static(&[0x60, 0x80]),
            &["constructor(string,string)", "function authorizeOnce(address)"],
        )
        .unwrap();
        let resolver = InMemoryResolver::new().with_artifact(artifact.clone());

        assert_eq!(resolver.resolve("TreeToken").unwrap(), artifact);
        assert!(resolver.resolve("AdoptionPlant").is_err());
    }
}
