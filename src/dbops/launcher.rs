//! End-to-end launcher for PgDbOps operations
//!
//! `launch_db_op` resolves a PgDbOps request, takes the cluster lock, and
//! drives the operation through its Running/Completed/Failed conditions.
//! The Running conditions are persisted before the executor is dispatched
//! so observers see the operation as running even if the executor hangs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument};

use super::conditions;
use super::job::JobRegistry;
use super::lock::{LockAcquirer, LockRequest};
use crate::crd::{Condition, PgCluster, PgDbOps};
use crate::error::{Error, Result};
use crate::resource::{CustomResourceFinder, CustomResourceWriter};

/// Lock parameters applied to every launch
#[derive(Clone, Debug)]
pub struct LauncherConfig {
    /// Holder identity recorded in the cluster lock
    pub pod_name: String,
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
}

/// Launches database operations against their target clusters
pub struct DbOpsLauncher<D, C>
where
    D: CustomResourceFinder<PgDbOps> + CustomResourceWriter<PgDbOps>,
    C: CustomResourceFinder<PgCluster> + CustomResourceWriter<PgCluster>,
{
    db_ops_store: Arc<D>,
    cluster_store: Arc<C>,
    lock: LockAcquirer<C>,
    jobs: JobRegistry,
    config: LauncherConfig,
}

impl<D, C> DbOpsLauncher<D, C>
where
    D: CustomResourceFinder<PgDbOps> + CustomResourceWriter<PgDbOps>,
    C: CustomResourceFinder<PgCluster> + CustomResourceWriter<PgCluster>,
{
    pub fn new(
        db_ops_store: Arc<D>,
        cluster_store: Arc<C>,
        jobs: JobRegistry,
        config: LauncherConfig,
    ) -> Self {
        Self {
            db_ops_store,
            cluster_store: cluster_store.clone(),
            lock: LockAcquirer::new(cluster_store),
            jobs,
            config,
        }
    }

    /// Launch the named operation and block until it completes or fails
    ///
    /// Exactly one of the Completed/Failed conditions is true in the
    /// persisted status once this returns, provided the locked section was
    /// reached; lookup failures, unknown operations and lock conflicts
    /// surface without touching the status.
    #[instrument(skip(self))]
    pub async fn launch_db_op(&self, name: &str, namespace: &str) -> Result<()> {
        let db_ops = self
            .db_ops_store
            .find_by_name_and_namespace(name, namespace)
            .await?
            .ok_or_else(|| Error::not_found("PgDbOps", namespace, name))?;

        let operation = db_ops.spec.operation()?;
        let job = self.jobs.get(operation).ok_or_else(|| {
            Error::ConfigError(format!("no executor registered for operation {operation}"))
        })?;

        let cluster_name = db_ops.spec.cluster.clone();
        let cluster = self
            .cluster_store
            .find_by_name_and_namespace(&cluster_name, namespace)
            .await?
            .ok_or_else(|| Error::not_found("PgCluster", namespace, &cluster_name))?;

        let request = LockRequest {
            namespace: namespace.to_string(),
            cluster_name: cluster_name.clone(),
            pod_name: self.config.pod_name.clone(),
            lock_timeout: self.config.lock_timeout,
            poll_interval: self.config.lock_poll_interval,
        };

        self.lock
            .lock_run(&request, async {
                let db_ops = self.persist_running_status(db_ops).await?;
                info!(
                    "Executing {} on cluster {}/{}",
                    operation, namespace, cluster_name
                );

                match job.run_job(&db_ops, &cluster).await {
                    Ok(state) => {
                        info!(
                            "Operation {} on cluster {}/{} completed ({} pods pending restart)",
                            operation,
                            namespace,
                            cluster_name,
                            state.restart_plan().len()
                        );
                        self.persist_terminal_status(&db_ops, conditions::completed_conditions())
                            .await?;
                        Ok(())
                    }
                    Err(err) => {
                        error!(
                            "Operation {} on cluster {}/{} failed: {}",
                            operation, namespace, cluster_name, err
                        );
                        // The executor error is the one the caller cares
                        // about; a failure to persist the Failed conditions
                        // is logged and must not replace it.
                        if let Err(persist_err) = self
                            .persist_terminal_status(
                                &db_ops,
                                conditions::failed_conditions(&err.to_string()),
                            )
                            .await
                        {
                            error!(
                                "Failed to persist Failed conditions for {}/{}: {}",
                                namespace, name, persist_err
                            );
                        }
                        Err(err)
                    }
                }
            })
            .await
    }

    /// Initialize the status block and persist the Running conditions
    ///
    /// `op_retries` is preserved as-is; incrementing it is the business of
    /// whatever relaunches a failed operation, not of this launcher.
    async fn persist_running_status(&self, mut db_ops: PgDbOps) -> Result<PgDbOps> {
        let mut status = db_ops.status.take().unwrap_or_default();
        status.op_started = Some(Utc::now().to_rfc3339());
        status.conditions = conditions::running_conditions();
        db_ops.status = Some(status);
        self.db_ops_store.update_status(&db_ops).await
    }

    async fn persist_terminal_status(
        &self,
        db_ops: &PgDbOps,
        conditions: Vec<Condition>,
    ) -> Result<PgDbOps> {
        let mut db_ops = db_ops.clone();
        let mut status = db_ops.status.take().unwrap_or_default();
        status.conditions = conditions;
        db_ops.status = Some(status);
        self.db_ops_store.update_status(&db_ops).await
    }
}
