//! Polymorphic dispatch of database operations
//!
//! Each operation type maps to one executor implementing
//! [`DatabaseOperationJob`]; the registry is resolved once at startup so an
//! unregistered operation is caught before any work begins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::restart_state::ClusterRestartState;
use crate::crd::types::DbOpsOperation;
use crate::crd::{PgCluster, PgDbOps};
use crate::error::Result;

/// A single database operation implementation
#[async_trait]
pub trait DatabaseOperationJob: Send + Sync {
    /// Execute the operation against the target cluster
    ///
    /// Returns the final restart state on success; errors are propagated to
    /// the launcher, which records them in the PgDbOps status.
    async fn run_job(
        &self,
        db_ops: &PgDbOps,
        cluster: &PgCluster,
    ) -> Result<ClusterRestartState>;
}

/// Operation-type to executor lookup table
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: HashMap<DbOpsOperation, Arc<dyn DatabaseOperationJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: DbOpsOperation, job: Arc<dyn DatabaseOperationJob>) {
        self.jobs.insert(operation, job);
    }

    pub fn get(&self, operation: DbOpsOperation) -> Option<Arc<dyn DatabaseOperationJob>> {
        self.jobs.get(&operation).cloned()
    }
}
