//! State file stored as a ConfigMap

use super::StateFileActions;
use crate::error::{Result, SleepError};
use crate::state::SuspendState;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

/// Well-known name of the state file ConfigMap
pub const STATE_FILE_NAME: &str = "kubesleep-suspend-state";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// A state file ConfigMap at the version it was last read or written.
pub struct ConfigMapStateFile {
    api: Api<ConfigMap>,
    configmap: ConfigMap,
}

impl ConfigMapStateFile {
    pub(super) async fn get(client: Client, namespace: &str) -> Result<Self> {
        let api: Api<ConfigMap> = Api::namespaced(client, namespace);
        let configmap = api
            .get_opt(STATE_FILE_NAME)
            .await?
            .ok_or_else(|| SleepError::StateFileNotFound(namespace.to_string()))?;
        Ok(Self { api, configmap })
    }

    pub(super) async fn create(
        client: Client,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) -> Result<Self> {
        let api: Api<ConfigMap> = Api::namespaced(client, namespace);
        let configmap = ConfigMap {
            metadata: ObjectMeta {
                name: Some(STATE_FILE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    "kubesleep".to_string(),
                )])),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        let created = api
            .create(&PostParams::default(), &configmap)
            .await
            .map_err(|e| match SleepError::from(e) {
                err if err.is_already_exists() => SleepError::StateFileAlreadyExists {
                    namespace: namespace.to_string(),
                    name: STATE_FILE_NAME.to_string(),
                },
                err => err,
            })?;
        debug!(namespace = %namespace, "Created state file");
        Ok(Self {
            api,
            configmap: created,
        })
    }

    pub(super) async fn delete_in(client: Client, namespace: &str) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(client, namespace);
        api.delete(STATE_FILE_NAME, &DeleteParams::default()).await?;
        Ok(())
    }

    pub fn read(&self) -> Result<SuspendState> {
        let data = self.configmap.data.clone().unwrap_or_default();
        SuspendState::read(&data)
    }
}

#[async_trait]
impl StateFileActions for ConfigMapStateFile {
    async fn update(&mut self, data: BTreeMap<String, String>) -> Result<()> {
        let mut configmap = self.configmap.clone();
        configmap.data = Some(data);
        self.configmap = self
            .api
            .replace(STATE_FILE_NAME, &PostParams::default(), &configmap)
            .await?;
        debug!(
            resource_version = ?self.configmap.metadata.resource_version,
            "Updated state file"
        );
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.api
            .delete(STATE_FILE_NAME, &DeleteParams::default())
            .await?;
        debug!("Deleted state file");
        Ok(())
    }
}
