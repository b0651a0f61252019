//! Suspend, wake and status over a namespace selection
//!
//! Namespaces are processed one after another. A failure in one namespace is
//! logged and recorded, the rest still run. Cancellation and invariant
//! violations stop the whole run.

use crate::context::SleepContext;
use crate::error::{Result, SleepError};
use crate::k8s::KubeApi;
use crate::namespace::{NamespaceSelection, NamespaceStatus, SuspendOutcome, SuspendableNamespace};

/// Per-namespace results of a bulk run.
#[derive(Debug)]
pub struct BulkReport<T> {
    pub completed: Vec<(String, T)>,
    pub failures: Vec<(String, SleepError)>,
}

impl<T> Default for BulkReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BulkReport<T> {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// A single failure is returned as is, several collapse into `SleepError::Bulk`.
    pub fn into_result(mut self) -> Result<Vec<(String, T)>> {
        match self.failures.len() {
            0 => Ok(self.completed),
            1 => Err(self.failures.remove(0).1),
            _ => Err(SleepError::Bulk {
                failed: self.failures.into_iter().map(|(ns, _)| ns).collect(),
            }),
        }
    }

    fn record(&mut self, ctx: &SleepContext, namespace: &str, result: Result<T>) -> Result<()> {
        match result {
            Ok(value) => self.completed.push((namespace.to_string(), value)),
            Err(err) if err.is_cancelled() || err.is_invariant_violation() => return Err(err),
            Err(err) => {
                ctx.logger.log_namespace_failed(namespace, &err);
                self.failures.push((namespace.to_string(), err));
            }
        }
        Ok(())
    }
}

/// Look up the namespaces a selection refers to.
///
/// Named namespaces that cannot be resolved fail the lookup. Terminating
/// namespaces are left out of `All` by the adapter.
pub async fn resolve_namespaces(
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
) -> Result<Vec<SuspendableNamespace>> {
    match selection {
        NamespaceSelection::All => api.get_suspendable_namespaces().await,
        NamespaceSelection::Named { namespaces, .. } => {
            let mut resolved = Vec::with_capacity(namespaces.len());
            for name in namespaces {
                resolved.push(api.get_suspendable_namespace(name).await?);
            }
            Ok(resolved)
        }
    }
}

pub async fn suspend(
    ctx: &SleepContext,
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
) -> Result<BulkReport<SuspendOutcome>> {
    let mut report = BulkReport::default();
    for namespace in resolve_namespaces(api, selection).await? {
        let result = namespace.suspend(ctx, api, selection).await;
        report.record(ctx, namespace.name(), result)?;
    }
    Ok(report)
}

/// Wake the named namespaces. Returns the number of workloads restored per namespace.
///
/// Waking has no bulk form, so [`NamespaceSelection::All`] is rejected.
pub async fn wake(
    ctx: &SleepContext,
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
) -> Result<BulkReport<usize>> {
    if selection.is_bulk() {
        return Err(SleepError::Invariant(
            "wake called without named namespaces".to_string(),
        ));
    }

    let mut report = BulkReport::default();
    for namespace in resolve_namespaces(api, selection).await? {
        let result = namespace.wake(ctx, api).await;
        report.record(ctx, namespace.name(), result)?;
    }
    Ok(report)
}

pub async fn status(
    ctx: &SleepContext,
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
) -> Result<BulkReport<NamespaceStatus>> {
    let mut report = BulkReport::default();
    for namespace in resolve_namespaces(api, selection).await? {
        let result = namespace.status(api).await;
        report.record(ctx, namespace.name(), result)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suspendable::ManifestKind;
    use crate::testing::FakeKube;

    fn cluster() -> FakeKube {
        let kube = FakeKube::new();
        kube.add_namespace("team-a", false);
        kube.add_namespace("team-b", false);
        kube.add_namespace("kube-system", false);
        kube.add_namespace("pinned", true);
        kube.add_workload("team-a", ManifestKind::Deployment, "web", 2);
        kube.add_workload("team-b", ManifestKind::StatefulSet, "db", 1);
        kube.add_workload("kube-system", ManifestKind::Deployment, "coredns", 2);
        kube.add_workload("pinned", ManifestKind::Deployment, "api", 3);
        kube
    }

    #[tokio::test]
    async fn test_bulk_suspend_skips_protected() {
        let kube = cluster();
        let ctx = SleepContext::noop();

        let results = suspend(&ctx, &kube, &NamespaceSelection::All)
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(kube.replicas("team-a", ManifestKind::Deployment, "web"), Some(0));
        assert_eq!(kube.replicas("team-b", ManifestKind::StatefulSet, "db"), Some(0));
        assert_eq!(
            kube.replicas("kube-system", ManifestKind::Deployment, "coredns"),
            Some(2)
        );
        assert_eq!(kube.replicas("pinned", ManifestKind::Deployment, "api"), Some(3));
        assert!(kube.state_file("kube-system").is_none());
        assert!(kube.state_file("pinned").is_none());
    }

    #[tokio::test]
    async fn test_bulk_suspend_continues_past_failures() {
        let kube = cluster();
        kube.fail_scale(ManifestKind::Deployment, "web");
        let ctx = SleepContext::noop();

        let report = suspend(&ctx, &kube, &NamespaceSelection::All).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "team-a");
        assert_eq!(kube.replicas("team-b", ManifestKind::StatefulSet, "db"), Some(0));
    }

    #[tokio::test]
    async fn test_several_failures_collapse_into_bulk_error() {
        let kube = cluster();
        kube.fail_scale(ManifestKind::Deployment, "web");
        kube.fail_scale(ManifestKind::StatefulSet, "db");
        let ctx = SleepContext::noop();

        let err = suspend(&ctx, &kube, &NamespaceSelection::All)
            .await
            .unwrap()
            .into_result()
            .unwrap_err();

        match err {
            SleepError::Bulk { failed } => assert_eq!(failed, vec!["team-a", "team-b"]),
            other => panic!("expected Bulk, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_named_unknown_namespace_fails_lookup() {
        let kube = cluster();
        let selection = NamespaceSelection::named(vec!["missing".to_string()], false).unwrap();
        let err = suspend(&SleepContext::noop(), &kube, &selection)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wake_requires_namespaces() {
        let kube = cluster();
        let err = wake(&SleepContext::noop(), &kube, &NamespaceSelection::All)
            .await
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_suspend_wake_status_cycle() {
        let kube = cluster();
        let ctx = SleepContext::noop();
        let selection = NamespaceSelection::named(vec!["team-a".to_string()], false).unwrap();

        suspend(&ctx, &kube, &selection).await.unwrap().into_result().unwrap();
        let statuses = status(&ctx, &kube, &selection)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(statuses[0].1.status, crate::namespace::SuspendStatus::Suspended);

        let woken = wake(&ctx, &kube, &selection)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(woken, vec![("team-a".to_string(), 1)]);
        assert_eq!(kube.replicas("team-a", ManifestKind::Deployment, "web"), Some(2));

        let statuses = status(&ctx, &kube, &NamespaceSelection::All)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert!(statuses
            .iter()
            .all(|(_, s)| s.status == crate::namespace::SuspendStatus::Awake));
    }
}
