//! Uniform handle over a scalable workload
//!
//! A [`Suspendable`] is a plain value: kind, name and the replica count seen
//! when it was scanned. Suspending is described by a [`SuspendAction`] value
//! and waking dispatches on the kind through [`KubeApi::scale_suspendable`].

use crate::error::{Result, SleepError};
use crate::k8s::KubeApi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Workload kinds kubesleep knows how to suspend.
///
/// The discriminant is the integer stored in the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestKind {
    Deployment = 0,
    StatefulSet = 1,
    CronJob = 2,
}

impl ManifestKind {
    pub fn ordinal(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ManifestKind {
    type Error = i32;

    fn try_from(tag: i32) -> std::result::Result<Self, Self::Error> {
        match tag {
            0 => Ok(ManifestKind::Deployment),
            1 => Ok(ManifestKind::StatefulSet),
            2 => Ok(ManifestKind::CronJob),
            other => Err(other),
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManifestKind::Deployment => "Deployment",
            ManifestKind::StatefulSet => "StatefulSet",
            ManifestKind::CronJob => "CronJob",
        };
        f.write_str(name)
    }
}

/// A workload captured during a namespace scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspendable {
    kind: ManifestKind,
    name: String,
    replicas: i32,
}

impl Suspendable {
    pub fn new(kind: ManifestKind, name: impl Into<String>, replicas: i32) -> Self {
        Self {
            kind,
            name: name.into(),
            replicas,
        }
    }

    pub fn kind(&self) -> ManifestKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replica count to restore on wake. CronJobs use 1 for active, 0 for suspended.
    pub fn replicas(&self) -> i32 {
        self.replicas
    }

    /// `<kind-ordinal>:<name>`, unique within a namespace.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.kind.ordinal(), self.name)
    }

    /// What suspending this workload takes, or `None` if it is already at zero.
    pub fn suspend_action(&self) -> Option<SuspendAction> {
        if self.replicas == 0 {
            return None;
        }
        Some(SuspendAction {
            kind: self.kind,
            name: self.name.clone(),
            target_replicas: 0,
        })
    }

    /// Restore the recorded replica count.
    pub async fn wake(&self, api: &dyn KubeApi, namespace: &str) -> Result<()> {
        api.scale_suspendable(namespace, self.kind, &self.name, self.replicas)
            .await
            .map_err(|source| SleepError::Workload {
                kind: self.kind,
                name: self.name.clone(),
                source: Box::new(source),
            })
    }

    pub(crate) fn to_record(&self) -> SuspendableRecord {
        SuspendableRecord {
            kind: self.kind.ordinal(),
            name: self.name.clone(),
            replicas: self.replicas,
        }
    }
}

/// Scale-down of one workload, decided at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendAction {
    pub kind: ManifestKind,
    pub name: String,
    pub target_replicas: i32,
}

impl SuspendAction {
    pub async fn apply(&self, api: &dyn KubeApi, namespace: &str) -> Result<()> {
        api.scale_suspendable(namespace, self.kind, &self.name, self.target_replicas)
            .await
            .map_err(|source| SleepError::Workload {
                kind: self.kind,
                name: self.name.clone(),
                source: Box::new(source),
            })
    }
}

/// Serialized form of a [`Suspendable`].
///
/// Earlier releases wrote `ManifestType`/`Name`/`Replicas`, those spellings are still accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SuspendableRecord {
    #[serde(alias = "ManifestType")]
    pub kind: i32,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Replicas")]
    pub replicas: i32,
}

impl TryFrom<SuspendableRecord> for Suspendable {
    type Error = SleepError;

    fn try_from(record: SuspendableRecord) -> Result<Self> {
        let kind = ManifestKind::try_from(record.kind).map_err(|tag| SleepError::UnknownKind {
            tag,
            name: record.name.clone(),
        })?;
        if record.replicas < 0 {
            return Err(SleepError::Invariant(format!(
                "negative replica count {} for {} {}",
                record.replicas, kind, record.name
            )));
        }
        Ok(Suspendable::new(kind, record.name, record.replicas))
    }
}

/// Union per-kind scan results keyed by identifier.
///
/// Two entries with the same identifier mean the scan itself is broken.
pub fn collect_suspendables<I>(groups: I) -> Result<BTreeMap<String, Suspendable>>
where
    I: IntoIterator<Item = Vec<Suspendable>>,
{
    let mut result = BTreeMap::new();
    for suspendable in groups.into_iter().flatten() {
        let id = suspendable.identifier();
        if result.contains_key(&id) {
            return Err(SleepError::Invariant(format!(
                "duplicate suspendable identifier: {}",
                id
            )));
        }
        result.insert(id, suspendable);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeKube;

    #[test]
    fn test_identifier() {
        let s = Suspendable::new(ManifestKind::StatefulSet, "db", 3);
        assert_eq!(s.identifier(), "1:db");
        assert_eq!(
            Suspendable::new(ManifestKind::CronJob, "db", 1).identifier(),
            "2:db"
        );
    }

    #[test]
    fn test_suspend_action_skips_zero_replicas() {
        assert!(Suspendable::new(ManifestKind::Deployment, "idle", 0)
            .suspend_action()
            .is_none());

        let action = Suspendable::new(ManifestKind::Deployment, "web", 4)
            .suspend_action()
            .unwrap();
        assert_eq!(action.target_replicas, 0);
        assert_eq!(action.name, "web");
    }

    #[test]
    fn test_collect_rejects_duplicates() {
        let result = collect_suspendables(vec![
            vec![Suspendable::new(ManifestKind::Deployment, "web", 1)],
            vec![Suspendable::new(ManifestKind::Deployment, "web", 2)],
        ]);
        let err = result.unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("0:web"));
    }

    #[test]
    fn test_collect_same_name_different_kinds() {
        let result = collect_suspendables(vec![
            vec![Suspendable::new(ManifestKind::Deployment, "web", 1)],
            vec![Suspendable::new(ManifestKind::StatefulSet, "web", 2)],
            vec![Suspendable::new(ManifestKind::CronJob, "web", 1)],
        ])
        .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_unknown_kind_tag() {
        let record = SuspendableRecord {
            kind: 7,
            name: "mystery".to_string(),
            replicas: 1,
        };
        match Suspendable::try_from(record) {
            Err(SleepError::UnknownKind { tag, name }) => {
                assert_eq!(tag, 7);
                assert_eq!(name, "mystery");
            }
            other => panic!("expected UnknownKind, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wake_dispatches_recorded_replicas() {
        let kube = FakeKube::new();
        kube.add_workload("ns", ManifestKind::StatefulSet, "db", 0);

        Suspendable::new(ManifestKind::StatefulSet, "db", 3)
            .wake(&kube, "ns")
            .await
            .unwrap();

        assert_eq!(kube.replicas("ns", ManifestKind::StatefulSet, "db"), Some(3));
        assert_eq!(kube.scale_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_wake_missing_workload_keeps_cause() {
        let kube = FakeKube::new();
        let err = Suspendable::new(ManifestKind::Deployment, "gone", 2)
            .wake(&kube, "ns")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Deployment gone"));
    }
}
