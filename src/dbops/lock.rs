//! Cluster-scoped distributed lock for database operations
//!
//! The lock's durable state is a pair of annotations on the target
//! PgCluster, written through the API server's optimistic concurrency
//! control: every write carries the resource version it was derived from,
//! so of two racing acquirers exactly one wins. A lock whose timestamp has
//! not been refreshed within the lock timeout is considered abandoned and
//! may be taken over.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::crd::PgCluster;
use crate::error::{Error, Result};
use crate::resource::{CustomResourceFinder, CustomResourceWriter};

/// Annotation holding the lock holder's pod name
pub const LOCK_POD_ANNOTATION: &str = "pgfleet.io/lock-pod";
/// Annotation holding the RFC 3339 time the lock was last refreshed
pub const LOCK_TIMESTAMP_ANNOTATION: &str = "pgfleet.io/lock-timestamp";

/// Parameters of one lock acquisition
#[derive(Clone, Debug)]
pub struct LockRequest {
    pub namespace: String,
    pub cluster_name: String,
    /// Holder identity recorded in the lock annotation
    pub pod_name: String,
    /// Age after which a lock is considered abandoned
    pub lock_timeout: Duration,
    /// Interval at which a held lock is refreshed
    pub poll_interval: Duration,
}

/// Acquires and releases the per-cluster operation lock
pub struct LockAcquirer<S> {
    store: Arc<S>,
}

impl<S> LockAcquirer<S>
where
    S: CustomResourceFinder<PgCluster> + CustomResourceWriter<PgCluster>,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run `work` while holding the cluster lock
    ///
    /// The lock is released after `work` finishes regardless of its
    /// outcome. While `work` runs the lock timestamp is refreshed every
    /// `poll_interval`; losing the lock to a concurrent writer cancels
    /// `work` and surfaces the loss as an error.
    #[instrument(skip(self, request, work), fields(namespace = %request.namespace, cluster = %request.cluster_name))]
    pub async fn lock_run<F, T>(&self, request: &LockRequest, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut held = self.acquire(request).await?;
        info!(
            "Acquired lock on cluster {}/{}",
            request.namespace, request.cluster_name
        );

        let mut refresh =
            tokio::time::interval(request.poll_interval.max(Duration::from_millis(1)));
        refresh.tick().await;

        tokio::pin!(work);
        let result = loop {
            tokio::select! {
                res = &mut work => break res,
                _ = refresh.tick() => {
                    match self.refresh(request, held).await {
                        Ok(updated) => held = updated,
                        Err(err) => {
                            warn!(
                                "Canceling operation on cluster {}/{}: {}",
                                request.namespace, request.cluster_name, err
                            );
                            break Err(err);
                        }
                    }
                }
            }
        };

        self.release(request).await;
        result
    }

    async fn acquire(&self, request: &LockRequest) -> Result<PgCluster> {
        let mut cluster = self
            .store
            .find_by_name_and_namespace(&request.cluster_name, &request.namespace)
            .await?
            .ok_or_else(|| {
                Error::not_found("PgCluster", &request.namespace, &request.cluster_name)
            })?;

        if let Some(holder) = lock_holder(&cluster) {
            if holder == request.pod_name {
                debug!("Lock already held by this pod, refreshing");
            } else if is_stale(&cluster, request.lock_timeout) {
                info!("Taking over stale lock held by {}", holder);
            } else {
                return Err(Error::LockConflict {
                    cluster: request.cluster_name.clone(),
                    holder,
                });
            }
        }

        set_lock_annotations(&mut cluster, &request.pod_name);
        match self.store.update(&cluster).await {
            Ok(updated) => Ok(updated),
            Err(err) if err.is_conflict() => {
                // A concurrent writer won the race; name it if we can.
                let holder = self
                    .store
                    .find_by_name_and_namespace(&request.cluster_name, &request.namespace)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|c| lock_holder(&c))
                    .unwrap_or_else(|| "another holder".to_string());
                Err(Error::LockConflict {
                    cluster: request.cluster_name.clone(),
                    holder,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Re-stamp the lock timestamp, conditional on still being the holder
    async fn refresh(&self, request: &LockRequest, held: PgCluster) -> Result<PgCluster> {
        let mut cluster = held;
        loop {
            set_lock_annotations(&mut cluster, &request.pod_name);
            match self.store.update(&cluster).await {
                Ok(updated) => return Ok(updated),
                Err(err) if err.is_conflict() => {
                    let fresh = self
                        .store
                        .find_by_name_and_namespace(&request.cluster_name, &request.namespace)
                        .await?
                        .ok_or_else(|| {
                            Error::not_found(
                                "PgCluster",
                                &request.namespace,
                                &request.cluster_name,
                            )
                        })?;
                    if lock_holder(&fresh).as_deref() != Some(request.pod_name.as_str()) {
                        return Err(Error::LockLost(format!(
                            "{}/{}",
                            request.namespace, request.cluster_name
                        )));
                    }
                    cluster = fresh;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Remove the lock annotations if this pod still holds them
    ///
    /// Runs on every exit path of `lock_run`. Failures are logged rather
    /// than returned so they never mask the result of the protected work;
    /// an unreleased lock expires through the staleness timeout.
    async fn release(&self, request: &LockRequest) {
        let mut cluster = match self
            .store
            .find_by_name_and_namespace(&request.cluster_name, &request.namespace)
            .await
        {
            Ok(Some(cluster)) => cluster,
            Ok(None) => return,
            Err(err) => {
                warn!(
                    "Failed to read cluster {}/{} while releasing lock: {}",
                    request.namespace, request.cluster_name, err
                );
                return;
            }
        };

        loop {
            if lock_holder(&cluster).as_deref() != Some(request.pod_name.as_str()) {
                return;
            }
            clear_lock_annotations(&mut cluster);
            match self.store.update(&cluster).await {
                Ok(_) => {
                    debug!(
                        "Released lock on cluster {}/{}",
                        request.namespace, request.cluster_name
                    );
                    return;
                }
                Err(err) if err.is_conflict() => {
                    match self
                        .store
                        .find_by_name_and_namespace(&request.cluster_name, &request.namespace)
                        .await
                    {
                        Ok(Some(fresh)) => cluster = fresh,
                        Ok(None) => return,
                        Err(err) => {
                            warn!(
                                "Failed to re-read cluster {}/{} while releasing lock: {}",
                                request.namespace, request.cluster_name, err
                            );
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to release lock on cluster {}/{}: {}",
                        request.namespace, request.cluster_name, err
                    );
                    return;
                }
            }
        }
    }
}

fn lock_holder(cluster: &PgCluster) -> Option<String> {
    cluster.annotations().get(LOCK_POD_ANNOTATION).cloned()
}

fn lock_timestamp(cluster: &PgCluster) -> Option<DateTime<Utc>> {
    cluster
        .annotations()
        .get(LOCK_TIMESTAMP_ANNOTATION)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// A lock with a missing or unparseable timestamp counts as stale
fn is_stale(cluster: &PgCluster, timeout: Duration) -> bool {
    match lock_timestamp(cluster) {
        Some(ts) => (Utc::now() - ts)
            .to_std()
            .map(|age| age > timeout)
            .unwrap_or(false),
        None => true,
    }
}

fn set_lock_annotations(cluster: &mut PgCluster, pod_name: &str) {
    let annotations = cluster.annotations_mut();
    annotations.insert(LOCK_POD_ANNOTATION.to_string(), pod_name.to_string());
    annotations.insert(
        LOCK_TIMESTAMP_ANNOTATION.to_string(),
        Utc::now().to_rfc3339(),
    );
}

fn clear_lock_annotations(cluster: &mut PgCluster) {
    let annotations = cluster.annotations_mut();
    annotations.remove(LOCK_POD_ANNOTATION);
    annotations.remove(LOCK_TIMESTAMP_ANNOTATION);
}
