//! Custom Resource Definitions for pgfleet
//!
//! This module defines the Kubernetes CRDs for managed PostgreSQL clusters
//! and the declarative database operations that act on them.

mod db_ops;
mod pg_cluster;
pub mod types;


pub use db_ops::{
    BenchmarkConfig, MajorVersionUpgradeConfig, MinorVersionUpgradeConfig, PgDbOps, PgDbOpsSpec,
    PgDbOpsStatus, RepackConfig, RestartConfig, SecurityUpgradeConfig, VacuumConfig,
};
pub use pg_cluster::{PgCluster, PgClusterSpec, PgClusterStatus, StorageConfig};
pub use types::*;
