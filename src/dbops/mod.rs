//! Database operation orchestration
//!
//! This module contains the jobs launcher, the cluster-scoped operation
//! lock, the polymorphic executor registry, and the restart state model
//! consumed by restart-style operations.

pub mod conditions;
mod job;
mod launcher;
mod lock;
mod restart_job;
mod restart_state;

#[cfg(test)]
pub(crate) mod testutil;

pub use job::{DatabaseOperationJob, JobRegistry};
pub use launcher::{DbOpsLauncher, LauncherConfig};
pub use lock::{LockAcquirer, LockRequest, LOCK_POD_ANNOTATION, LOCK_TIMESTAMP_ANNOTATION};
pub use restart_job::{
    ClusterRestartJob, CLUSTER_NAME_LABEL, CONFIG_HASH_ANNOTATION, ROLE_LABEL, ROLE_PRIMARY,
};
pub use restart_state::{ClusterRestartState, PodRef, RestartReason, RestartReasons};
