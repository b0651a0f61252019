//! Kubernetes boundary
//!
//! The suspend/wake logic only talks to the cluster through [`KubeApi`].
//! [`KubeClient`] implements it on top of `kube`; tests use an in-memory fake.

mod client;
mod statefile;
mod workloads;

pub use client::{build_suspendable_namespace, KubeClient, DO_NOT_SUSPEND_ANNOTATION};
pub use statefile::{ConfigMapStateFile, STATE_FILE_NAME};
pub use workloads::{replicas_to_suspended, suspended_to_replicas};

use crate::error::Result;
use crate::namespace::SuspendableNamespace;
use crate::state::SuspendState;
use crate::suspendable::{ManifestKind, Suspendable};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Cluster operations the state machine depends on
#[async_trait]
pub trait KubeApi: Send + Sync {
    /// Look up one namespace and its protection flag.
    async fn get_suspendable_namespace(&self, name: &str) -> Result<SuspendableNamespace>;

    /// All namespaces, minus the ones being deleted.
    async fn get_suspendable_namespaces(&self) -> Result<Vec<SuspendableNamespace>>;

    /// Every Deployment, StatefulSet and CronJob in the namespace, keyed by identifier.
    async fn get_suspendables(&self, namespace: &str) -> Result<BTreeMap<String, Suspendable>>;

    /// Set the replica count (or CronJob suspend flag) of one workload.
    async fn scale_suspendable(
        &self,
        namespace: &str,
        kind: ManifestKind,
        name: &str,
        replicas: i32,
    ) -> Result<()>;

    /// Read the state file. Fails with `StateFileNotFound` if there is none.
    async fn get_state_file(
        &self,
        namespace: &str,
    ) -> Result<(SuspendState, Box<dyn StateFileActions>)>;

    /// Create the state file. Fails with `StateFileAlreadyExists` instead of overwriting.
    async fn create_state_file(
        &self,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) -> Result<Box<dyn StateFileActions>>;

    async fn delete_state_file(&self, namespace: &str) -> Result<()>;
}

/// Writes against the version of the state file that was read or created.
#[async_trait]
pub trait StateFileActions: Send + Sync {
    /// Replace the data. Fails with `Conflict` if the state file changed since it was read.
    async fn update(&mut self, data: BTreeMap<String, String>) -> Result<()>;

    async fn delete(&self) -> Result<()>;
}
