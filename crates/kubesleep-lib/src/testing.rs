//! In-memory cluster for tests
//!
//! [`FakeKube`] keeps namespaces, workload replica counts and state files in
//! a shared map. State files carry a resource version so stale writes fail
//! with a conflict, the same way the API server rejects them.

use crate::error::{Result, SleepError};
use crate::k8s::{replicas_to_suspended, KubeApi, StateFileActions};
use crate::namespace::SuspendableNamespace;
use crate::state::SuspendState;
use crate::suspendable::{collect_suspendables, ManifestKind, Suspendable};
use async_trait::async_trait;
use kube::error::ErrorResponse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type WorkloadKey = (String, ManifestKind, String);

/// A recorded `scale_suspendable` call, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCall {
    pub namespace: String,
    pub kind: ManifestKind,
    pub name: String,
    pub replicas: i32,
}

#[derive(Debug, Clone)]
struct FakeNamespace {
    protected: bool,
    terminating: bool,
}

#[derive(Debug, Clone)]
struct StoredStateFile {
    data: BTreeMap<String, String>,
    version: u64,
}

#[derive(Debug, Default)]
struct FakeState {
    namespaces: BTreeMap<String, FakeNamespace>,
    workloads: BTreeMap<WorkloadKey, i32>,
    scale_calls: Vec<ScaleCall>,
    scale_failures: HashSet<(ManifestKind, String)>,
    scale_conflicts: HashMap<(ManifestKind, String), u32>,
    state_files: BTreeMap<String, StoredStateFile>,
    state_update_conflicts: u32,
    state_updates: u32,
    fail_state_delete: bool,
}

fn server_error(message: String) -> SleepError {
    SleepError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// Shared in-memory implementation of [`KubeApi`].
#[derive(Debug, Clone, Default)]
pub struct FakeKube {
    state: Arc<Mutex<FakeState>>,
}

impl FakeKube {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_namespace(&self, name: &str, protected: bool) {
        self.lock().namespaces.insert(
            name.to_string(),
            FakeNamespace {
                protected,
                terminating: false,
            },
        );
    }

    pub fn add_terminating_namespace(&self, name: &str) {
        self.lock().namespaces.insert(
            name.to_string(),
            FakeNamespace {
                protected: false,
                terminating: true,
            },
        );
    }

    pub fn add_workload(&self, namespace: &str, kind: ManifestKind, name: &str, replicas: i32) {
        self.lock()
            .workloads
            .insert((namespace.to_string(), kind, name.to_string()), replicas);
    }

    pub fn replicas(&self, namespace: &str, kind: ManifestKind, name: &str) -> Option<i32> {
        self.lock()
            .workloads
            .get(&(namespace.to_string(), kind, name.to_string()))
            .copied()
    }

    pub fn scale_calls(&self) -> Vec<ScaleCall> {
        self.lock().scale_calls.clone()
    }

    /// Every scale of this workload fails with a 500 until [`Self::clear_failures`].
    pub fn fail_scale(&self, kind: ManifestKind, name: &str) {
        self.lock().scale_failures.insert((kind, name.to_string()));
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.scale_failures.clear();
        state.scale_conflicts.clear();
        state.state_update_conflicts = 0;
        state.fail_state_delete = false;
    }

    /// The next `times` scales of this workload fail with a conflict.
    pub fn conflict_scale(&self, kind: ManifestKind, name: &str, times: u32) {
        self.lock()
            .scale_conflicts
            .insert((kind, name.to_string()), times);
    }

    /// The next `times` state file updates fail with a conflict, as if another
    /// writer had bumped the version in between.
    pub fn conflict_state_updates(&self, times: u32) {
        self.lock().state_update_conflicts = times;
    }

    /// Number of state file updates that went through.
    pub fn state_updates(&self) -> u32 {
        self.lock().state_updates
    }

    pub fn fail_state_delete(&self) {
        self.lock().fail_state_delete = true;
    }

    /// Decoded state file of `namespace`, if any.
    pub fn state_file(&self, namespace: &str) -> Option<SuspendState> {
        let state = self.lock();
        let stored = state.state_files.get(namespace)?;
        SuspendState::read(&stored.data).ok()
    }

    pub fn state_file_data(&self, namespace: &str) -> Option<BTreeMap<String, String>> {
        self.lock()
            .state_files
            .get(namespace)
            .map(|stored| stored.data.clone())
    }

    /// Store a state file directly, bumping its version.
    pub fn put_state_file(&self, namespace: &str, suspend_state: &SuspendState) -> Result<()> {
        let data = suspend_state.write()?;
        let mut state = self.lock();
        let version = state
            .state_files
            .get(namespace)
            .map(|stored| stored.version + 1)
            .unwrap_or(1);
        state
            .state_files
            .insert(namespace.to_string(), StoredStateFile { data, version });
        Ok(())
    }

    fn describe(&self, namespace: &str) -> Result<SuspendableNamespace> {
        let state = self.lock();
        match state.namespaces.get(namespace) {
            None => Err(SleepError::NotFound(format!("namespace {}", namespace))),
            Some(ns) if ns.terminating => {
                Err(SleepError::NamespaceTerminating(namespace.to_string()))
            }
            Some(ns) => Ok(SuspendableNamespace::new(namespace, ns.protected)),
        }
    }
}

#[async_trait]
impl KubeApi for FakeKube {
    async fn get_suspendable_namespace(&self, name: &str) -> Result<SuspendableNamespace> {
        self.describe(name)
    }

    async fn get_suspendable_namespaces(&self) -> Result<Vec<SuspendableNamespace>> {
        let state = self.lock();
        Ok(state
            .namespaces
            .iter()
            .filter(|(_, ns)| !ns.terminating)
            .map(|(name, ns)| SuspendableNamespace::new(name.clone(), ns.protected))
            .collect())
    }

    async fn get_suspendables(&self, namespace: &str) -> Result<BTreeMap<String, Suspendable>> {
        let found = {
            let state = self.lock();
            state
                .workloads
                .iter()
                .filter(|((ns, _, _), _)| ns == namespace)
                .map(|((_, kind, name), replicas)| Suspendable::new(*kind, name.clone(), *replicas))
                .collect::<Vec<_>>()
        };
        collect_suspendables([found])
    }

    async fn scale_suspendable(
        &self,
        namespace: &str,
        kind: ManifestKind,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        let mut state = self.lock();
        state.scale_calls.push(ScaleCall {
            namespace: namespace.to_string(),
            kind,
            name: name.to_string(),
            replicas,
        });

        let key = (kind, name.to_string());
        if state.scale_failures.contains(&key) {
            return Err(server_error(format!("scaling {} {} failed", kind, name)));
        }
        if let Some(remaining) = state.scale_conflicts.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SleepError::Conflict(format!(
                    "{} {} has been modified",
                    kind, name
                )));
            }
        }
        if kind == ManifestKind::CronJob {
            replicas_to_suspended(replicas)?;
        }

        match state
            .workloads
            .get_mut(&(namespace.to_string(), kind, name.to_string()))
        {
            Some(current) => {
                *current = replicas;
                Ok(())
            }
            None => Err(SleepError::NotFound(format!("{} {}", kind, name))),
        }
    }

    async fn get_state_file(
        &self,
        namespace: &str,
    ) -> Result<(SuspendState, Box<dyn StateFileActions>)> {
        let stored = self
            .lock()
            .state_files
            .get(namespace)
            .cloned()
            .ok_or_else(|| SleepError::StateFileNotFound(namespace.to_string()))?;
        let suspend_state = SuspendState::read(&stored.data)?;
        let actions = FakeStateFile {
            kube: self.clone(),
            namespace: namespace.to_string(),
            version: stored.version,
        };
        Ok((suspend_state, Box::new(actions)))
    }

    async fn create_state_file(
        &self,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) -> Result<Box<dyn StateFileActions>> {
        let mut state = self.lock();
        if state.state_files.contains_key(namespace) {
            return Err(SleepError::StateFileAlreadyExists {
                namespace: namespace.to_string(),
                name: crate::k8s::STATE_FILE_NAME.to_string(),
            });
        }
        state
            .state_files
            .insert(namespace.to_string(), StoredStateFile { data, version: 1 });
        Ok(Box::new(FakeStateFile {
            kube: self.clone(),
            namespace: namespace.to_string(),
            version: 1,
        }))
    }

    async fn delete_state_file(&self, namespace: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_state_delete {
            return Err(server_error("deleting state file failed".to_string()));
        }
        state
            .state_files
            .remove(namespace)
            .map(|_| ())
            .ok_or_else(|| SleepError::StateFileNotFound(namespace.to_string()))
    }
}

/// State file handle pinned to the version it was read or created at.
struct FakeStateFile {
    kube: FakeKube,
    namespace: String,
    version: u64,
}

#[async_trait]
impl StateFileActions for FakeStateFile {
    async fn update(&mut self, data: BTreeMap<String, String>) -> Result<()> {
        let mut state = self.kube.lock();
        let pending_conflict = state.state_update_conflicts > 0;
        if pending_conflict {
            state.state_update_conflicts -= 1;
        }

        let stored = state
            .state_files
            .get_mut(&self.namespace)
            .ok_or_else(|| SleepError::StateFileNotFound(self.namespace.clone()))?;
        if pending_conflict {
            stored.version += 1;
        }
        if stored.version != self.version {
            return Err(SleepError::Conflict(format!(
                "state file in {} is at version {}, update was for {}",
                self.namespace, stored.version, self.version
            )));
        }

        stored.data = data;
        stored.version += 1;
        self.version = stored.version;
        state.state_updates += 1;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.kube.delete_state_file(&self.namespace).await
    }
}
