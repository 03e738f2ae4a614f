//! Human and JSON run reports.

use std::path::Path;

use anyhow::{Context, Result};
use arbor_deploy::{AuthorizationOutcome, DeployError, RunResult};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;

/// Error part of a failed run's report.
#[derive(Debug, Serialize)]
pub struct ReportedError {
    pub kind: String,
    pub message: String,
}

impl From<&DeployError> for ReportedError {
    fn from(error: &DeployError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error_chain(error),
        }
    }
}

/// An error followed by its causes, separated by `: `.
pub fn error_chain(error: &DeployError) -> String {
    std::iter::successors(Some(error as &dyn std::error::Error), |e| e.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

/// Everything written with `--output`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub network: &'a str,
    pub chain_id: u64,
    #[serde(flatten)]
    pub result: &'a RunResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportedError>,
}

impl RunReport<'_> {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Run report written");
        Ok(())
    }
}

/// One row per confirmed deployment.
pub fn deployments_table(result: &RunResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Step", "Contract", "Address", "Block", "Transaction"]);

    for deployed in result.deployments.iter() {
        table.add_row(vec![
            Cell::new(&deployed.step),
            Cell::new(&deployed.contract),
            Cell::new(deployed.address),
            Cell::new(deployed.block_number),
            Cell::new(deployed.tx_hash),
        ]);
    }

    table
}

pub fn describe_outcome(outcome: &AuthorizationOutcome) -> String {
    match outcome {
        AuthorizationOutcome::Granted {
            grantor,
            grantee,
            tx_hash,
            verified,
        } => format!(
            "{grantee} authorized on {grantor} in {tx_hash}{}",
            if *verified { " (verified)" } else { "" }
        ),
        AuthorizationOutcome::AlreadyAuthorized { grantor, grantee } => {
            format!("{grantee} was already authorized on {grantor}, nothing sent")
        }
    }
}

/// Print the result of a run, complete or partial.
pub fn print_run(result: &RunResult, error: Option<&DeployError>) {
    println!("Deployer: {}", result.deployer);
    if !result.plan_fingerprint.is_empty() {
        println!("Plan:     {}", result.plan_fingerprint);
    }

    if result.deployments.is_empty() {
        println!("No contract deployed.");
    } else {
        println!("{}", deployments_table(result));
    }

    match &result.authorization {
        Some(outcome) => println!("Authorization: {}", describe_outcome(outcome)),
        None if error.is_none() => println!("Authorization: none declared"),
        None => {}
    }

    if let Some(error) = error {
        println!(
            "Run aborted after {} deployment(s): [{}] {}",
            result.deployments.len(),
            error.kind(),
            error_chain(error)
        );
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{Address, B256};
    use arbor_deploy::{Deployments, LedgerError};
    use tempdir::TempDir;

    use super::*;

    fn result() -> RunResult {
        RunResult {
            plan_fingerprint: "ab".repeat(32),
            deployer: Address::repeat_byte(0x01),
            deployments: Deployments::default(),
            authorization: Some(AuthorizationOutcome::AlreadyAuthorized {
                grantor: Address::repeat_byte(0x02),
                grantee: Address::repeat_byte(0x03),
            }),
        }
    }

    #[test]
    fn test_describe_outcome() {
        let outcome = AuthorizationOutcome::Granted {
            grantor: Address::repeat_byte(0x02),
            grantee: Address::repeat_byte(0x03),
            tx_hash: B256::ZERO,
            verified: true,
        };
        assert!(describe_outcome(&outcome).ends_with("(verified)"));
        assert!(describe_outcome(&result().authorization.unwrap()).contains("already authorized"));
    }

    #[test]
    fn test_json_report() {
        let dir = TempDir::new("arbor-report").unwrap();
        let path = dir.path().join("report.json");
        let result = result();
        let error = DeployError::Unsupported {
            operation: "revoke",
            mode: "one-shot",
        };

        RunReport {
            network: "blast-local",
            chain_id: 31337,
            result: &result,
            error: Some((&error).into()),
        }
        .write_json(&path)
        .unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report["network"], "blast-local");
        assert_eq!(report["chain_id"], 31337);
        assert_eq!(report["plan_fingerprint"], "ab".repeat(32));
        assert_eq!(report["authorization"]["outcome"], "already-authorized");
        assert_eq!(report["error"]["kind"], "other");
    }

    #[test]
    fn test_error_chain_lists_each_cause_once() {
        let error = DeployError::Step {
            step: "MarketY".to_string(),
            source: LedgerError::Network("connection reset".to_string()),
        };
        assert_eq!(
            error_chain(&error),
            "step `MarketY` failed: network error: connection reset"
        );
        assert_eq!(ReportedError::from(&error).kind, "network");
    }
}
