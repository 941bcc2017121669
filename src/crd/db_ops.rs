//! PgDbOps Custom Resource Definition
//!
//! A PgDbOps resource is a declarative request to run one database operation
//! (restart, upgrade, vacuum, ...) against a PgCluster. The jobs launcher
//! reads the spec and records the outcome in the status subresource; the
//! resource itself is created by users or controllers and never deleted by
//! the core.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, DbOpsOperation, RestartMethod};
use crate::error::Result;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "pgfleet.io",
    version = "v1",
    kind = "PgDbOps",
    plural = "pgdbops",
    namespaced,
    status = "PgDbOpsStatus",
    shortname = "pgdo",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.cluster"}"#,
    printcolumn = r#"{"name":"Operation","type":"string","jsonPath":".spec.op"}"#,
    printcolumn = r#"{"name":"Running","type":"string","jsonPath":".status.conditions[?(@.type=='Running')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PgDbOpsSpec {
    /// Name of the target PgCluster in the same namespace
    pub cluster: String,

    /// Requested operation (e.g. "securityUpgrade", "restart")
    pub op: String,

    /// ISO 8601 duration after which the operation is considered hung
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Maximum number of launch retries an external scheduler may perform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_upgrade: Option<SecurityUpgradeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor_version_upgrade: Option<MinorVersionUpgradeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub major_version_upgrade: Option<MajorVersionUpgradeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vacuum: Option<VacuumConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repack: Option<RepackConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkConfig>,
}

impl PgDbOpsSpec {
    /// Parse the requested operation against the known enumeration
    pub fn operation(&self) -> Result<DbOpsOperation> {
        self.op.parse()
    }

    /// Restart method configured for the requested operation
    pub fn restart_method(&self) -> RestartMethod {
        let method = match self.op.parse() {
            Ok(DbOpsOperation::Restart) => self.restart.as_ref().and_then(|c| c.method),
            Ok(DbOpsOperation::SecurityUpgrade) => {
                self.security_upgrade.as_ref().and_then(|c| c.method)
            }
            Ok(DbOpsOperation::MinorVersionUpgrade) => {
                self.minor_version_upgrade.as_ref().and_then(|c| c.method)
            }
            _ => None,
        };
        method.unwrap_or_default()
    }

    /// Whether only pods already pending a restart should be touched
    pub fn only_pending_restart(&self) -> bool {
        self.restart
            .as_ref()
            .and_then(|c| c.only_pending_restart)
            .unwrap_or(false)
    }
}

/// Configuration for the restart operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestartConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<RestartMethod>,
    /// Restart only the pods flagged as pending restart, skipping the
    /// switchover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_pending_restart: Option<bool>,
}

/// Configuration for the security upgrade operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityUpgradeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<RestartMethod>,
}

/// Configuration for the minor version upgrade operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinorVersionUpgradeConfig {
    /// Target PostgreSQL version; defaults to the latest supported minor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<RestartMethod>,
}

/// Configuration for the major version upgrade operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MajorVersionUpgradeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_version: Option<String>,
    /// Use pg_upgrade hard links instead of copying data files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<bool>,
    /// Clone data files where the filesystem supports reflinks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone: Option<bool>,
    /// Run pg_upgrade checks without performing the upgrade
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<bool>,
}

/// Configuration for the vacuum operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VacuumConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_page_skipping: Option<bool>,
}

/// Configuration for the repack operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_kill_backend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_analyze: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout: Option<String>,
}

/// Configuration for the benchmark operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkConfig {
    /// Benchmark type; only "pgbench" is currently supported
    #[serde(rename = "type")]
    pub benchmark_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Status block maintained by the jobs launcher
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgDbOpsStatus {
    /// RFC 3339 time the current launch attempt started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_started: Option<String>,

    /// Number of times the operation has been relaunched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_retries: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
