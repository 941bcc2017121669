//! Test fixtures for the dbops core
//!
//! `MockKubeDb` is an in-memory stand-in for the API server with the same
//! optimistic-concurrency behavior the real store has: writes carrying a
//! stale resource version fail with a 409 conflict.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use rand::Rng;

use super::lock::LockRequest;
use super::restart_state::{ClusterRestartState, PodRef, RestartReasons};
use crate::crd::types::RestartMethod;
use crate::crd::{
    PgCluster, PgClusterSpec, PgDbOps, PgDbOpsSpec, SecurityUpgradeConfig, StorageConfig,
};
use crate::error::{Error, Result};
use crate::resource::{CustomResourceFinder, CustomResourceWriter};

pub fn random_name(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8).map(|_| rng.gen_range('a'..='z')).collect();
    format!("{prefix}-{suffix}")
}

pub fn test_db_ops(name: &str, namespace: &str, cluster: &str, op: &str) -> PgDbOps {
    PgDbOps {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: PgDbOpsSpec {
            cluster: cluster.to_string(),
            op: op.to_string(),
            timeout: None,
            max_retries: None,
            restart: None,
            security_upgrade: Some(SecurityUpgradeConfig {
                method: Some(RestartMethod::InPlace),
            }),
            minor_version_upgrade: None,
            major_version_upgrade: None,
            vacuum: None,
            repack: None,
            benchmark: None,
        },
        status: None,
    }
}

pub fn test_cluster(name: &str, namespace: &str) -> PgCluster {
    PgCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: PgClusterSpec {
            postgres_version: "16.3".to_string(),
            instances: 2,
            storage: StorageConfig::default(),
        },
        status: None,
    }
}

pub fn test_lock_request(namespace: &str, cluster: &str, pod: &str) -> LockRequest {
    LockRequest {
        namespace: namespace.to_string(),
        cluster_name: cluster.to_string(),
        pod_name: pod.to_string(),
        lock_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_millis(50),
    }
}

/// Single-pod restart state as a job would return it on success
pub fn test_restart_state(db_ops: &PgDbOps) -> ClusterRestartState {
    let namespace = db_ops.namespace().unwrap_or_else(|| "default".to_string());
    let primary = PodRef::new(&namespace, &format!("{}-0", db_ops.spec.cluster));
    ClusterRestartState {
        namespace,
        db_ops_name: db_ops.name_any(),
        operation: db_ops.spec.operation().expect("fixture uses a known op"),
        cluster_name: db_ops.spec.cluster.clone(),
        restart_method: RestartMethod::InPlace,
        only_pending_restart: false,
        switchover_initiated: false,
        switchover_finalized: false,
        primary_instance: primary.clone(),
        initial_instances: vec![primary.clone()],
        total_instances: vec![primary.clone()],
        pod_restart_reasons: [(primary, RestartReasons::none())].into_iter().collect(),
    }
}

fn conflict_error() -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "the object has been modified".to_string(),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}

fn key<T: Resource>(resource: &T) -> (String, String)
where
    T::DynamicType: Default,
{
    (
        resource.namespace().unwrap_or_else(|| "default".to_string()),
        resource.name_any(),
    )
}

fn bump_version<T: Resource>(resource: &mut T) {
    let next = resource
        .meta()
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    resource.meta_mut().resource_version = Some(next.to_string());
}

#[derive(Default)]
pub struct MockKubeDb {
    db_ops: Mutex<HashMap<(String, String), PgDbOps>>,
    clusters: Mutex<HashMap<(String, String), PgCluster>>,
    cluster_updates: AtomicUsize,
    fail_next_cluster_update: AtomicBool,
}

impl MockKubeDb {
    pub fn add_or_replace_db_ops(&self, db_ops: &PgDbOps) -> PgDbOps {
        let mut stored = db_ops.clone();
        bump_version(&mut stored);
        self.db_ops
            .lock()
            .unwrap()
            .insert(key(db_ops), stored.clone());
        stored
    }

    pub fn add_or_replace_cluster(&self, cluster: &PgCluster) -> PgCluster {
        let mut stored = cluster.clone();
        bump_version(&mut stored);
        self.clusters
            .lock()
            .unwrap()
            .insert(key(cluster), stored.clone());
        stored
    }

    pub fn get_db_ops(&self, name: &str, namespace: &str) -> Option<PgDbOps> {
        self.db_ops
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn get_cluster(&self, name: &str, namespace: &str) -> Option<PgCluster> {
        self.clusters
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of cluster write attempts seen so far
    pub fn cluster_update_count(&self) -> usize {
        self.cluster_updates.load(Ordering::SeqCst)
    }

    /// Make the next cluster write fail with a 409 conflict
    pub fn fail_next_cluster_update(&self) {
        self.fail_next_cluster_update.store(true, Ordering::SeqCst);
    }

    fn write_db_ops(&self, resource: &PgDbOps, status_only: bool) -> Result<PgDbOps> {
        let mut map = self.db_ops.lock().unwrap();
        let mut next = resource.clone();
        if let Some(stored) = map.get(&key(resource)) {
            if stored.meta().resource_version != resource.meta().resource_version {
                return Err(conflict_error());
            }
            if status_only {
                next.spec = stored.spec.clone();
            }
        }
        bump_version(&mut next);
        map.insert(key(resource), next.clone());
        Ok(next)
    }

    fn write_cluster(&self, resource: &PgCluster, status_only: bool) -> Result<PgCluster> {
        self.cluster_updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_cluster_update.swap(false, Ordering::SeqCst) {
            return Err(conflict_error());
        }
        let mut map = self.clusters.lock().unwrap();
        let mut next = resource.clone();
        if let Some(stored) = map.get(&key(resource)) {
            if stored.meta().resource_version != resource.meta().resource_version {
                return Err(conflict_error());
            }
            if status_only {
                next.spec = stored.spec.clone();
            }
        }
        bump_version(&mut next);
        map.insert(key(resource), next.clone());
        Ok(next)
    }
}

#[async_trait]
impl CustomResourceFinder<PgDbOps> for MockKubeDb {
    async fn find_by_name_and_namespace(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PgDbOps>> {
        Ok(self.get_db_ops(name, namespace))
    }
}

#[async_trait]
impl CustomResourceWriter<PgDbOps> for MockKubeDb {
    async fn update(&self, resource: &PgDbOps) -> Result<PgDbOps> {
        self.write_db_ops(resource, false)
    }

    async fn update_status(&self, resource: &PgDbOps) -> Result<PgDbOps> {
        self.write_db_ops(resource, true)
    }
}

#[async_trait]
impl CustomResourceFinder<PgCluster> for MockKubeDb {
    async fn find_by_name_and_namespace(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PgCluster>> {
        Ok(self.get_cluster(name, namespace))
    }
}

#[async_trait]
impl CustomResourceWriter<PgCluster> for MockKubeDb {
    async fn update(&self, resource: &PgCluster) -> Result<PgCluster> {
        self.write_cluster(resource, false)
    }

    async fn update_status(&self, resource: &PgCluster) -> Result<PgCluster> {
        self.write_cluster(resource, true)
    }
}
