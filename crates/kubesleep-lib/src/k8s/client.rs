//! `kube` backed implementation of [`KubeApi`]

use super::statefile::ConfigMapStateFile;
use super::{workloads, KubeApi, StateFileActions};
use crate::error::{Result, SleepError};
use crate::namespace::SuspendableNamespace;
use crate::state::SuspendState;
use crate::suspendable::{collect_suspendables, ManifestKind, Suspendable};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Namespace annotation that protects a namespace from being suspended
pub const DO_NOT_SUSPEND_ANNOTATION: &str = "kubesleep.xyz/do-not-suspend";

const NAMESPACE_TERMINATING: &str = "Terminating";

/// Cluster access through a `kube::Client`
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig and/or context, or infer one.
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    SleepError::Config(format!("failed to read kubeconfig {:?}: {}", path, e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| SleepError::Config(format!("invalid kubeconfig: {}", e)))?
            }
            None if context.is_some() => Config::from_kubeconfig(&options)
                .await
                .map_err(|e| SleepError::Config(format!("invalid kubeconfig: {}", e)))?,
            None => Config::infer()
                .await
                .map_err(|e| SleepError::Config(format!("failed to infer kubeconfig: {}", e)))?,
        };

        debug!(cluster_url = %config.cluster_url, "Kubernetes client configured");
        Ok(Self::new(Client::try_from(config)?))
    }

    pub(crate) fn client(&self) -> Client {
        self.client.clone()
    }
}

/// Turn a Namespace object into its protection descriptor.
pub fn build_suspendable_namespace(namespace: &Namespace) -> Result<SuspendableNamespace> {
    let name = namespace.name_any();
    let phase = namespace.status.as_ref().and_then(|s| s.phase.as_deref());
    if phase == Some(NAMESPACE_TERMINATING) {
        return Err(SleepError::NamespaceTerminating(name));
    }

    let protected = namespace
        .metadata
        .annotations
        .as_ref()
        .map(|annotations| annotations.contains_key(DO_NOT_SUSPEND_ANNOTATION))
        .unwrap_or(false);

    debug!(namespace = %name, protected = protected, "Parsed namespace");
    Ok(SuspendableNamespace::new(name, protected))
}

#[async_trait]
impl KubeApi for KubeClient {
    async fn get_suspendable_namespace(&self, name: &str) -> Result<SuspendableNamespace> {
        let namespaces: Api<Namespace> = Api::all(self.client());
        let namespace = namespaces.get(name).await?;
        build_suspendable_namespace(&namespace)
    }

    async fn get_suspendable_namespaces(&self) -> Result<Vec<SuspendableNamespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client());
        let mut result = Vec::new();
        for namespace in namespaces.list(&ListParams::default()).await? {
            match build_suspendable_namespace(&namespace) {
                Ok(ns) => result.push(ns),
                Err(SleepError::NamespaceTerminating(name)) => {
                    info!(namespace = %name, "Skipping terminating namespace");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }

    async fn get_suspendables(&self, namespace: &str) -> Result<BTreeMap<String, Suspendable>> {
        let (deployments, stateful_sets, cron_jobs) = tokio::try_join!(
            workloads::list_deployments(self.client(), namespace),
            workloads::list_stateful_sets(self.client(), namespace),
            workloads::list_cron_jobs(self.client(), namespace),
        )?;
        collect_suspendables([deployments, stateful_sets, cron_jobs])
    }

    async fn scale_suspendable(
        &self,
        namespace: &str,
        kind: ManifestKind,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        debug!(
            namespace = %namespace,
            kind = %kind,
            name = %name,
            replicas = replicas,
            "Scaling suspendable"
        );
        match kind {
            ManifestKind::Deployment => {
                workloads::scale_deployment(self.client(), namespace, name, replicas).await
            }
            ManifestKind::StatefulSet => {
                workloads::scale_stateful_set(self.client(), namespace, name, replicas).await
            }
            ManifestKind::CronJob => {
                workloads::scale_cron_job(self.client(), namespace, name, replicas).await
            }
        }
    }

    async fn get_state_file(
        &self,
        namespace: &str,
    ) -> Result<(SuspendState, Box<dyn StateFileActions>)> {
        let state_file = ConfigMapStateFile::get(self.client(), namespace).await?;
        let state = state_file.read()?;
        Ok((state, Box::new(state_file)))
    }

    async fn create_state_file(
        &self,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) -> Result<Box<dyn StateFileActions>> {
        let state_file = ConfigMapStateFile::create(self.client(), namespace, data).await?;
        Ok(Box::new(state_file))
    }

    async fn delete_state_file(&self, namespace: &str) -> Result<()> {
        ConfigMapStateFile::delete_in(self.client(), namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::NamespaceStatus;
    use kube::api::ObjectMeta;

    fn namespace(name: &str, annotations: Option<&[&str]>, phase: Option<&str>) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: annotations.map(|keys| {
                    keys.iter()
                        .map(|k| (k.to_string(), String::new()))
                        .collect()
                }),
                ..Default::default()
            },
            spec: None,
            status: phase.map(|p| NamespaceStatus {
                phase: Some(p.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_namespace_without_annotations() {
        let ns = build_suspendable_namespace(&namespace("team-a", None, Some("Active"))).unwrap();
        assert_eq!(ns.name(), "team-a");
        assert!(!ns.is_protected());
    }

    #[test]
    fn test_namespace_with_do_not_suspend_annotation() {
        let ns = build_suspendable_namespace(&namespace(
            "team-a",
            Some(&[DO_NOT_SUSPEND_ANNOTATION, "other"]),
            None,
        ))
        .unwrap();
        assert!(ns.is_explicitly_protected());
    }

    #[test]
    fn test_namespace_with_unrelated_annotations() {
        let ns = build_suspendable_namespace(&namespace("team-a", Some(&["owner"]), None)).unwrap();
        assert!(!ns.is_protected());
    }

    #[test]
    fn test_terminating_namespace() {
        let err = build_suspendable_namespace(&namespace("old", None, Some("Terminating")))
            .unwrap_err();
        assert!(matches!(err, SleepError::NamespaceTerminating(name) if name == "old"));
    }
}
