//! Shared types for the pgfleet CRDs
//!
//! These types are used across the CRD definitions and the dbops core.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Supported database operation types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DbOpsOperation {
    /// Rolling update to the latest patched container images
    SecurityUpgrade,
    /// Restart of the cluster pods
    Restart,
    /// Upgrade to a newer PostgreSQL minor version
    MinorVersionUpgrade,
    /// Upgrade to a newer PostgreSQL major version
    MajorVersionUpgrade,
    /// Table repack to reclaim bloated storage
    Repack,
    /// Manual vacuum run
    Vacuum,
    /// pgbench-style benchmark
    Benchmark,
}

impl DbOpsOperation {
    pub const ALL: [DbOpsOperation; 7] = [
        DbOpsOperation::SecurityUpgrade,
        DbOpsOperation::Restart,
        DbOpsOperation::MinorVersionUpgrade,
        DbOpsOperation::MajorVersionUpgrade,
        DbOpsOperation::Repack,
        DbOpsOperation::Vacuum,
        DbOpsOperation::Benchmark,
    ];

    /// Wire name as it appears in a PgDbOps spec
    pub fn as_str(&self) -> &'static str {
        match self {
            DbOpsOperation::SecurityUpgrade => "securityUpgrade",
            DbOpsOperation::Restart => "restart",
            DbOpsOperation::MinorVersionUpgrade => "minorVersionUpgrade",
            DbOpsOperation::MajorVersionUpgrade => "majorVersionUpgrade",
            DbOpsOperation::Repack => "repack",
            DbOpsOperation::Vacuum => "vacuum",
            DbOpsOperation::Benchmark => "benchmark",
        }
    }
}

impl std::fmt::Display for DbOpsOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DbOpsOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidOperation(s.to_string()))
    }
}

/// How restart-style operations replace cluster pods
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RestartMethod {
    /// Restart pods in place, the primary last
    #[default]
    InPlace,
    /// Switch the primary over to a replica before restarting it
    ReducedImpact,
}

impl std::fmt::Display for RestartMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartMethod::InPlace => write!(f, "InPlace"),
            RestartMethod::ReducedImpact => write!(f, "ReducedImpact"),
        }
    }
}

/// Status condition following Kubernetes API conventions
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Running", "Completed", "Failed")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl Condition {
    pub fn new(type_: &str, status: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}
