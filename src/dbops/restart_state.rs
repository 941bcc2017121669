//! Immutable restart progress model for restart-style operations
//!
//! Executors build a fresh `ClusterRestartState` when an operation starts
//! and derive new values from it as pods are processed; no state is ever
//! mutated in place.

use std::collections::{BTreeMap, BTreeSet};

use crate::crd::types::{DbOpsOperation, RestartMethod};

/// Reference to a cluster pod
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Why a pod needs to be restarted
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestartReason {
    /// The cluster configuration changed since the pod started
    ConfigChange,
    /// The pod template no longer matches the desired spec
    PodSpecChange,
    /// The operator version managing the pod changed
    OperatorVersion,
    /// The pod is in a non-running phase
    PodStatus,
}

/// Set of restart reasons for one pod; an empty set means no restart is
/// needed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestartReasons {
    reasons: BTreeSet<RestartReason>,
}

impl RestartReasons {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(reasons: impl IntoIterator<Item = RestartReason>) -> Self {
        Self {
            reasons: reasons.into_iter().collect(),
        }
    }

    pub fn with(mut self, reason: RestartReason) -> Self {
        self.reasons.insert(reason);
        self
    }

    pub fn requires_restart(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn contains(&self, reason: RestartReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RestartReason> {
        self.reasons.iter()
    }
}

/// Point-in-time snapshot of a cluster restart
///
/// `initial_instances` holds the pods present when the operation began;
/// `total_instances` holds the pods present now and may be larger if the
/// cluster was scaled up concurrently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRestartState {
    pub namespace: String,
    pub db_ops_name: String,
    pub operation: DbOpsOperation,
    pub cluster_name: String,
    pub restart_method: RestartMethod,
    pub only_pending_restart: bool,
    pub switchover_initiated: bool,
    pub switchover_finalized: bool,
    pub primary_instance: PodRef,
    pub initial_instances: Vec<PodRef>,
    pub total_instances: Vec<PodRef>,
    pub pod_restart_reasons: BTreeMap<PodRef, RestartReasons>,
}

impl ClusterRestartState {
    /// Whether the given pod still needs a restart
    pub fn has_to_be_restarted(&self, pod: &PodRef) -> bool {
        self.pod_restart_reasons
            .get(pod)
            .map(RestartReasons::requires_restart)
            .unwrap_or(false)
    }

    /// Pods still waiting for a restart, primary last
    ///
    /// Replicas are ordered by name so the rollout is deterministic; the
    /// primary is appended at the end and, under the reduced-impact method,
    /// is only reached after the switchover demoted it.
    pub fn restart_plan(&self) -> Vec<&PodRef> {
        let mut plan: Vec<&PodRef> = self
            .total_instances
            .iter()
            .filter(|pod| **pod != self.primary_instance && self.has_to_be_restarted(pod))
            .collect();
        plan.sort();
        if self.has_to_be_restarted(&self.primary_instance) {
            plan.push(&self.primary_instance);
        }
        plan
    }

    /// Whether the primary must be switched over before its restart
    pub fn requires_switchover(&self) -> bool {
        self.restart_method == RestartMethod::ReducedImpact
            && !self.only_pending_restart
            && self.has_to_be_restarted(&self.primary_instance)
    }

    pub fn with_switchover_initiated(self) -> Self {
        Self {
            switchover_initiated: true,
            ..self
        }
    }

    pub fn with_switchover_finalized(self) -> Self {
        Self {
            switchover_initiated: true,
            switchover_finalized: true,
            ..self
        }
    }

    /// Derive the state that follows a pod restart
    pub fn with_pod_restarted(self, pod: &PodRef) -> Self {
        let mut next = self;
        next.pod_restart_reasons
            .insert(pod.clone(), RestartReasons::none());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str) -> PodRef {
        PodRef::new("ns1", name)
    }

    fn state_with_reasons(reasons: Vec<(PodRef, RestartReasons)>) -> ClusterRestartState {
        let pods: Vec<PodRef> = reasons.iter().map(|(p, _)| p.clone()).collect();
        ClusterRestartState {
            namespace: "ns1".to_string(),
            db_ops_name: "restart-1".to_string(),
            operation: DbOpsOperation::Restart,
            cluster_name: "c1".to_string(),
            restart_method: RestartMethod::InPlace,
            only_pending_restart: false,
            switchover_initiated: false,
            switchover_finalized: false,
            primary_instance: pod("c1-0"),
            initial_instances: pods.clone(),
            total_instances: pods,
            pod_restart_reasons: reasons.into_iter().collect(),
        }
    }

    #[test]
    fn test_restart_plan_puts_primary_last() {
        let state = state_with_reasons(vec![
            (pod("c1-0"), RestartReasons::of([RestartReason::ConfigChange])),
            (pod("c1-1"), RestartReasons::of([RestartReason::ConfigChange])),
            (pod("c1-2"), RestartReasons::of([RestartReason::PodStatus])),
        ]);

        let plan = state.restart_plan();
        assert_eq!(
            plan,
            vec![&pod("c1-1"), &pod("c1-2"), &pod("c1-0")],
            "replicas come first in name order, the primary last"
        );
    }

    #[test]
    fn test_restart_plan_skips_pods_without_reasons() {
        let state = state_with_reasons(vec![
            (pod("c1-0"), RestartReasons::none()),
            (pod("c1-1"), RestartReasons::of([RestartReason::PodSpecChange])),
        ]);

        let plan = state.restart_plan();
        assert_eq!(plan, vec![&pod("c1-1")]);
    }

    #[test]
    fn test_switchover_required_only_for_reduced_impact() {
        let in_place = state_with_reasons(vec![(
            pod("c1-0"),
            RestartReasons::of([RestartReason::ConfigChange]),
        )]);
        assert!(!in_place.requires_switchover());

        let reduced = ClusterRestartState {
            restart_method: RestartMethod::ReducedImpact,
            ..in_place
        };
        assert!(reduced.requires_switchover());
    }

    #[test]
    fn test_switchover_not_required_when_only_pending_restart() {
        let state = ClusterRestartState {
            restart_method: RestartMethod::ReducedImpact,
            only_pending_restart: true,
            ..state_with_reasons(vec![(
                pod("c1-0"),
                RestartReasons::of([RestartReason::ConfigChange]),
            )])
        };
        assert!(!state.requires_switchover());
    }

    #[test]
    fn test_updates_derive_new_values() {
        let initial = state_with_reasons(vec![(
            pod("c1-0"),
            RestartReasons::of([RestartReason::ConfigChange]),
        )]);

        let before = initial.clone();
        let after = initial.with_switchover_finalized();

        assert!(!before.switchover_finalized, "the original value is unchanged");
        assert!(after.switchover_initiated);
        assert!(after.switchover_finalized);
    }

    #[test]
    fn test_pod_restarted_clears_its_reasons() {
        let state = state_with_reasons(vec![
            (pod("c1-0"), RestartReasons::of([RestartReason::ConfigChange])),
            (pod("c1-1"), RestartReasons::of([RestartReason::ConfigChange])),
        ]);

        let next = state.with_pod_restarted(&pod("c1-1"));
        assert!(!next.has_to_be_restarted(&pod("c1-1")));
        assert!(next.has_to_be_restarted(&pod("c1-0")));
    }

    #[test]
    fn test_restart_reasons_accumulate() {
        let reasons = RestartReasons::none()
            .with(RestartReason::ConfigChange)
            .with(RestartReason::PodStatus);

        assert!(reasons.requires_restart());
        assert!(reasons.contains(RestartReason::ConfigChange));
        assert!(!reasons.contains(RestartReason::OperatorVersion));
        assert_eq!(reasons.iter().count(), 2);
        assert!(!RestartReasons::none().requires_restart());
    }
}
