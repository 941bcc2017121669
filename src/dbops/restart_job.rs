//! Cluster restart executor
//!
//! Shared by the restart-style operations (restart, security upgrade,
//! minor version upgrade): it scans the cluster's pods, derives why each
//! one needs a restart, and walks the restart plan as a sequence of
//! immutable state transitions. Replacing the pods themselves is the
//! cluster controller's job; this executor computes and records the
//! rollout the controller follows.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use super::job::DatabaseOperationJob;
use super::restart_state::{ClusterRestartState, PodRef, RestartReason, RestartReasons};
use crate::crd::{PgCluster, PgDbOps};
use crate::error::{Error, Result};
use crate::resource::PodScanner;

/// Label selecting the pods of one cluster
pub const CLUSTER_NAME_LABEL: &str = "pgfleet.io/cluster-name";
/// Label carrying the pod's database role
pub const ROLE_LABEL: &str = "pgfleet.io/role";
pub const ROLE_PRIMARY: &str = "primary";
/// Annotation stamping the configuration a pod was started with
pub const CONFIG_HASH_ANNOTATION: &str = "pgfleet.io/config-hash";

pub struct ClusterRestartJob<P> {
    pods: Arc<P>,
}

impl<P: PodScanner> ClusterRestartJob<P> {
    pub fn new(pods: Arc<P>) -> Self {
        Self { pods }
    }

    fn build_initial_state(
        &self,
        db_ops: &PgDbOps,
        cluster: &PgCluster,
        pods: &[Pod],
        namespace: &str,
    ) -> Result<ClusterRestartState> {
        let expected_hash = expected_config_hash(cluster);

        let primary = pods
            .iter()
            .find(|pod| pod.labels().get(ROLE_LABEL).map(String::as_str) == Some(ROLE_PRIMARY))
            .or_else(|| pods.first())
            .ok_or_else(|| {
                Error::OperationFailure(format!(
                    "cluster {}/{} has no pods",
                    namespace,
                    cluster.name_any()
                ))
            })?;

        let instances: Vec<PodRef> = pods
            .iter()
            .map(|pod| pod_ref(pod, namespace))
            .collect();

        let pod_restart_reasons: BTreeMap<PodRef, RestartReasons> = pods
            .iter()
            .map(|pod| (pod_ref(pod, namespace), restart_reasons(pod, cluster, &expected_hash)))
            .collect();

        Ok(ClusterRestartState {
            namespace: namespace.to_string(),
            db_ops_name: db_ops.name_any(),
            operation: db_ops.spec.operation()?,
            cluster_name: cluster.name_any(),
            restart_method: db_ops.spec.restart_method(),
            only_pending_restart: db_ops.spec.only_pending_restart(),
            switchover_initiated: false,
            switchover_finalized: false,
            primary_instance: pod_ref(primary, namespace),
            initial_instances: instances.clone(),
            total_instances: instances,
            pod_restart_reasons,
        })
    }
}

#[async_trait]
impl<P: PodScanner> DatabaseOperationJob for ClusterRestartJob<P> {
    async fn run_job(
        &self,
        db_ops: &PgDbOps,
        cluster: &PgCluster,
    ) -> Result<ClusterRestartState> {
        let namespace = db_ops.namespace().unwrap_or_else(|| "default".to_string());
        let selector = format!("{}={}", CLUSTER_NAME_LABEL, cluster.name_any());
        let pods = self.pods.find_by_label(&namespace, &selector).await?;

        let mut state = self.build_initial_state(db_ops, cluster, &pods, &namespace)?;
        let plan: Vec<PodRef> = state.restart_plan().into_iter().cloned().collect();
        info!(
            "Cluster {}/{} restart plan: {} of {} pods, method {}",
            namespace,
            state.cluster_name,
            plan.len(),
            state.total_instances.len(),
            state.restart_method
        );

        if state.requires_switchover() {
            info!(
                "Initiating switchover away from primary {}",
                state.primary_instance
            );
            state = state.with_switchover_initiated();
            state = state.with_switchover_finalized();
        }

        for pod in &plan {
            debug!("Marking pod {} for restart", pod);
            state = state.with_pod_restarted(pod);
        }

        Ok(state)
    }
}

fn pod_ref(pod: &Pod, namespace: &str) -> PodRef {
    let ns = pod.namespace().unwrap_or_else(|| namespace.to_string());
    PodRef::new(&ns, &pod.name_any())
}

fn restart_reasons(pod: &Pod, cluster: &PgCluster, expected_hash: &str) -> RestartReasons {
    let mut reasons = RestartReasons::none();

    let pod_hash = pod.annotations().get(CONFIG_HASH_ANNOTATION);
    if pod_hash.map(String::as_str) != Some(expected_hash) {
        reasons = reasons.with(RestartReason::ConfigChange);
    }

    let image_current = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|container| container.image.as_deref())
        .map(|image| image.contains(&cluster.spec.postgres_version))
        .unwrap_or(false);
    if !image_current {
        reasons = reasons.with(RestartReason::PodSpecChange);
    }

    let running = pod
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .map(|phase| phase == "Running")
        .unwrap_or(false);
    if !running {
        reasons = reasons.with(RestartReason::PodStatus);
    }

    reasons
}

/// Hash of the cluster spec a pod must have been started with to be
/// considered up to date
fn expected_config_hash(cluster: &PgCluster) -> String {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&cluster.spec)
        .unwrap_or_default()
        .hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
