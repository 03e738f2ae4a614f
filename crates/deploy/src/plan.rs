//! Declarative deployment plans.
//!
//! A plan is an ordered list of [`DeploymentStep`]s plus an optional
//! [`AuthorizationLink`]. Plans are usually authored as TOML:
//!
//! ```toml
//! [[steps]]
//! name = "TokenX"
//! contract = "TreeToken"
//! args = ["TREE", "TREE"]
//!
//! [[steps]]
//! name = "MarketY"
//! contract = "AdoptionPlant"
//! args = [{ ref = "TokenX" }]
//!
//! [link]
//! grantor = "TokenX"
//! grantee = "MarketY"
//! mode = "one-shot"
//! grant = "authorizeOnce"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Default grant function of one-shot grantors.
pub const DEFAULT_ONE_SHOT_GRANT: &str = "authorizeOnce";
/// Default grant function of settable grantors.
pub const DEFAULT_SETTABLE_GRANT: &str = "authorizeMinter";
/// Default status query of settable grantors.
pub const DEFAULT_SETTABLE_STATUS: &str = "isMinterAuthorized";

/// A constructor argument: a literal or the address produced by an earlier step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstructorArg {
    Ref {
        #[serde(rename = "ref")]
        step: String,
    },
    Literal(Value),
}

impl ConstructorArg {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(step: impl Into<String>) -> Self {
        Self::Ref { step: step.into() }
    }

    /// String form of a literal, as accepted by ABI type coercion.
    pub(crate) fn literal_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentStep {
    /// Step identifier, unique within the plan.
    pub name: String,
    /// Artifact to deploy. Defaults to the step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

impl DeploymentStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            args: Vec::new(),
        }
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(ConstructorArg::literal(value));
        self
    }

    pub fn arg_ref(mut self, step: impl Into<String>) -> Self {
        self.args.push(ConstructorArg::reference(step));
        self
    }

    /// The artifact name this step deploys.
    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }
}

/// How the grantor contract treats repeated grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AuthorizationMode {
    /// The grant can be issued once; the contract reverts any later attempt.
    OneShot {
        #[serde(default = "default_one_shot_grant")]
        grant: String,
    },
    /// The grant can be set and cleared any number of times and queried.
    Settable {
        #[serde(default = "default_settable_grant")]
        grant: String,
        #[serde(default = "default_settable_status")]
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revoke: Option<String>,
    },
}

fn default_one_shot_grant() -> String {
    DEFAULT_ONE_SHOT_GRANT.to_string()
}

fn default_settable_grant() -> String {
    DEFAULT_SETTABLE_GRANT.to_string()
}

fn default_settable_status() -> String {
    DEFAULT_SETTABLE_STATUS.to_string()
}

impl AuthorizationMode {
    pub fn one_shot() -> Self {
        Self::OneShot {
            grant: default_one_shot_grant(),
        }
    }

    pub fn settable() -> Self {
        Self::Settable {
            grant: default_settable_grant(),
            status: default_settable_status(),
            revoke: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthorizationMode::OneShot { .. } => "one-shot",
            AuthorizationMode::Settable { .. } => "settable",
        }
    }
}

/// Capability grant from the grantor contract to the grantee contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LinkFields")]
pub struct AuthorizationLink {
    /// Step whose contract holds the authorizable resource.
    pub grantor: String,
    /// Step whose contract receives the capability.
    pub grantee: String,
    #[serde(flatten)]
    pub mode: AuthorizationMode,
}

impl AuthorizationLink {
    pub fn new(
        grantor: impl Into<String>,
        grantee: impl Into<String>,
        mode: AuthorizationMode,
    ) -> Self {
        Self {
            grantor: grantor.into(),
            grantee: grantee.into(),
            mode,
        }
    }
}

/// `[link]` as written in a plan file. Unknown keys are rejected so a
/// misspelled function name never falls back to a default.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkFields {
    grantor: String,
    grantee: String,
    mode: ModeName,
    grant: Option<String>,
    status: Option<String>,
    revoke: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ModeName {
    OneShot,
    Settable,
}

impl TryFrom<LinkFields> for AuthorizationLink {
    type Error = String;

    fn try_from(fields: LinkFields) -> Result<Self, Self::Error> {
        let mode = match fields.mode {
            ModeName::OneShot => {
                if fields.status.is_some() || fields.revoke.is_some() {
                    return Err("`status` and `revoke` only apply to settable links".to_string());
                }
                AuthorizationMode::OneShot {
                    grant: fields.grant.unwrap_or_else(default_one_shot_grant),
                }
            }
            ModeName::Settable => AuthorizationMode::Settable {
                grant: fields.grant.unwrap_or_else(default_settable_grant),
                status: fields.status.unwrap_or_else(default_settable_status),
                revoke: fields.revoke,
            },
        };

        Ok(Self::new(fields.grantor, fields.grantee, mode))
    }
}

/// Ordered deployment steps and the optional link between two of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentPlan {
    #[serde(default)]
    pub steps: Vec<DeploymentStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<AuthorizationLink>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: DeploymentStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn link(mut self, link: AuthorizationLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn position(&self, step: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == step)
    }

    /// Parse a plan from TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse deployment plan as TOML")
    }

    /// Load a plan from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan from {}", path.display()))?;
        let plan = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), steps = plan.steps.len(), "Plan loaded");
        Ok(plan)
    }

    /// SHA-256 of the plan's JSON form, hex encoded.
    ///
    /// Two plans with the same steps, arguments and link share a fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let json = serde_json::to_vec(self).context("Failed to serialize deployment plan")?;
        Ok(hex::encode(Sha256::digest(&json)))
    }
}
