//! PgCluster Custom Resource Definition
//!
//! The PgCluster CRD represents a managed PostgreSQL cluster. The dbops core
//! only reads the spec and uses the metadata annotations as the durable home
//! of the operation lock; pod management belongs to the cluster controller.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "pgfleet.io",
    version = "v1",
    kind = "PgCluster",
    namespaced,
    status = "PgClusterStatus",
    shortname = "pgc",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.postgresVersion"}"#,
    printcolumn = r#"{"name":"Instances","type":"integer","jsonPath":".spec.instances"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PgClusterSpec {
    /// PostgreSQL version the cluster runs (e.g. "16.3")
    pub postgres_version: String,

    /// Number of database pods
    pub instances: i32,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Persistent storage configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Volume size (e.g. "10Gi")
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            size: "10Gi".to_string(),
            storage_class: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgClusterStatus {
    /// Name of the pod currently acting as primary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_instances: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
