//! Listing and scaling Deployments, StatefulSets and CronJobs

use crate::error::{Result, SleepError};
use crate::suspendable::{ManifestKind, Suspendable};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::ScaleSpec;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Kubernetes defaults `spec.replicas` to 1 when unset
const DEFAULT_REPLICAS: i32 = 1;

/// CronJobs are recorded as 1 (active) or 0 (suspended).
pub fn suspended_to_replicas(suspended: bool) -> i32 {
    if suspended {
        0
    } else {
        1
    }
}

pub fn replicas_to_suspended(replicas: i32) -> Result<bool> {
    match replicas {
        0 => Ok(true),
        1 => Ok(false),
        other => Err(SleepError::Invariant(format!(
            "can't scale CronJob to {} replicas, only 0 (suspended) and 1 (active) exist",
            other
        ))),
    }
}

pub(super) async fn list_deployments(client: Client, namespace: &str) -> Result<Vec<Suspendable>> {
    let api: Api<Deployment> = Api::namespaced(client, namespace);
    let suspendables = api
        .list(&ListParams::default())
        .await?
        .into_iter()
        .map(|deployment| {
            let replicas = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(DEFAULT_REPLICAS);
            Suspendable::new(ManifestKind::Deployment, deployment.name_any(), replicas)
        })
        .collect::<Vec<_>>();
    debug!(namespace = %namespace, count = suspendables.len(), "Listed Deployments");
    Ok(suspendables)
}

pub(super) async fn list_stateful_sets(
    client: Client,
    namespace: &str,
) -> Result<Vec<Suspendable>> {
    let api: Api<StatefulSet> = Api::namespaced(client, namespace);
    let suspendables = api
        .list(&ListParams::default())
        .await?
        .into_iter()
        .map(|stateful_set| {
            let replicas = stateful_set
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(DEFAULT_REPLICAS);
            Suspendable::new(ManifestKind::StatefulSet, stateful_set.name_any(), replicas)
        })
        .collect::<Vec<_>>();
    debug!(namespace = %namespace, count = suspendables.len(), "Listed StatefulSets");
    Ok(suspendables)
}

pub(super) async fn list_cron_jobs(client: Client, namespace: &str) -> Result<Vec<Suspendable>> {
    let api: Api<CronJob> = Api::namespaced(client, namespace);
    let suspendables = api
        .list(&ListParams::default())
        .await?
        .into_iter()
        .map(|cron_job| {
            let suspended = cron_job
                .spec
                .as_ref()
                .and_then(|spec| spec.suspend)
                .unwrap_or(false);
            Suspendable::new(
                ManifestKind::CronJob,
                cron_job.name_any(),
                suspended_to_replicas(suspended),
            )
        })
        .collect::<Vec<_>>();
    debug!(namespace = %namespace, count = suspendables.len(), "Listed CronJobs");
    Ok(suspendables)
}

/// Read-modify-write of the scale subresource.
///
/// The scale carries the resourceVersion that was read, so a concurrent
/// change turns into a `Conflict` instead of being overwritten.
async fn replace_scale<K>(client: Client, namespace: &str, name: &str, replicas: i32) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    let mut scale = api.get_scale(name).await?;
    scale.spec = Some(ScaleSpec {
        replicas: Some(replicas),
    });
    let body = serde_json::to_vec(&scale)?;
    api.replace_scale(name, &PostParams::default(), body).await?;
    Ok(())
}

pub(super) async fn scale_deployment(
    client: Client,
    namespace: &str,
    name: &str,
    replicas: i32,
) -> Result<()> {
    replace_scale::<Deployment>(client, namespace, name, replicas).await
}

pub(super) async fn scale_stateful_set(
    client: Client,
    namespace: &str,
    name: &str,
    replicas: i32,
) -> Result<()> {
    replace_scale::<StatefulSet>(client, namespace, name, replicas).await
}

pub(super) async fn scale_cron_job(
    client: Client,
    namespace: &str,
    name: &str,
    replicas: i32,
) -> Result<()> {
    let suspended = replicas_to_suspended(replicas)?;
    let api: Api<CronJob> = Api::namespaced(client, namespace);
    let mut cron_job = api.get(name).await?;
    let spec = cron_job.spec.as_mut().ok_or_else(|| {
        SleepError::Invariant(format!("CronJob {}/{} has no spec", namespace, name))
    })?;
    spec.suspend = Some(suspended);
    api.replace(name, &PostParams::default(), &cron_job).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspended_to_replicas() {
        assert_eq!(suspended_to_replicas(true), 0);
        assert_eq!(suspended_to_replicas(false), 1);
    }

    #[test]
    fn test_replicas_to_suspended() {
        assert!(replicas_to_suspended(0).unwrap());
        assert!(!replicas_to_suspended(1).unwrap());
    }

    #[test]
    fn test_cron_job_cannot_scale_beyond_one() {
        let err = replicas_to_suspended(2).unwrap_err();
        assert!(err.is_invariant_violation());
    }
}
