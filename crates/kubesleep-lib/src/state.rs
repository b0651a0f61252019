//! Persisted suspend state
//!
//! The state of a suspend lives in a ConfigMap under two keys. The current
//! key always carries the real record. The legacy key carries the same bytes
//! unless CronJobs are involved, in which case it carries an upgrade notice
//! that older readers reject instead of silently dropping the CronJobs.

use crate::error::{Result, SleepError};
use crate::suspendable::{ManifestKind, Suspendable, SuspendableRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// ConfigMap data key read by releases without CronJob support.
pub const STATE_FILE_KEY_LEGACY: &str = "kubesleep.json";

/// ConfigMap data key of the current schema.
pub const STATE_FILE_KEY_CURRENT: &str = "kubesleep.v2.json";

/// Written under the legacy key when the record contains CronJobs.
pub const LEGACY_UPGRADE_MESSAGE: &str =
    r#"{"message":"please upgrade kubesleep to a version that supports CronJobs"}"#;

#[derive(Debug, Serialize, Deserialize)]
struct SuspendStateRecord {
    suspendables: Vec<SuspendableRecord>,
    finished: bool,
}

/// Workloads captured by a suspend plus whether every scale-down went through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendState {
    suspendables: BTreeMap<String, Suspendable>,
    finished: bool,
}

impl SuspendState {
    pub fn new(suspendables: BTreeMap<String, Suspendable>, finished: bool) -> Self {
        Self {
            suspendables,
            finished,
        }
    }

    /// Fresh record for a suspend that has not applied anything yet.
    pub fn unfinished(suspendables: BTreeMap<String, Suspendable>) -> Self {
        Self::new(suspendables, false)
    }

    pub fn suspendables(&self) -> &BTreeMap<String, Suspendable> {
        &self.suspendables
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    pub fn len(&self) -> usize {
        self.suspendables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suspendables.is_empty()
    }

    pub fn has_cron_jobs(&self) -> bool {
        self.suspendables
            .values()
            .any(|s| s.kind() == ManifestKind::CronJob)
    }

    /// Pretty-printed JSON of the current schema.
    pub fn to_json(&self) -> Result<String> {
        let record = SuspendStateRecord {
            suspendables: self.suspendables.values().map(Suspendable::to_record).collect(),
            finished: self.finished,
        };
        Ok(serde_json::to_string_pretty(&record)?)
    }

    /// Parse one payload. Malformed or incomplete payloads are invariant violations.
    pub fn from_json(json: &str) -> Result<Self> {
        let record: SuspendStateRecord = serde_json::from_str(json).map_err(|e| {
            SleepError::Invariant(format!("malformed state file payload: {}", e))
        })?;

        let mut suspendables = BTreeMap::new();
        for entry in record.suspendables {
            let suspendable = Suspendable::try_from(entry)?;
            suspendables.insert(suspendable.identifier(), suspendable);
        }

        let state = Self {
            suspendables,
            finished: record.finished,
        };
        debug!(entries = state.len(), finished = state.finished, "Read state file from json");
        Ok(state)
    }

    /// ConfigMap data for this record under both schema keys.
    pub fn write(&self) -> Result<BTreeMap<String, String>> {
        let json = self.to_json()?;
        let mut data = BTreeMap::new();
        if self.has_cron_jobs() {
            data.insert(
                STATE_FILE_KEY_LEGACY.to_string(),
                LEGACY_UPGRADE_MESSAGE.to_string(),
            );
        } else {
            data.insert(STATE_FILE_KEY_LEGACY.to_string(), json.clone());
        }
        data.insert(STATE_FILE_KEY_CURRENT.to_string(), json);
        Ok(data)
    }

    /// Read ConfigMap data, preferring the current key over the legacy one.
    pub fn read(data: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(current) = data.get(STATE_FILE_KEY_CURRENT).filter(|v| !v.is_empty()) {
            return Self::from_json(current);
        }
        if let Some(legacy) = data.get(STATE_FILE_KEY_LEGACY).filter(|v| !v.is_empty()) {
            return Self::from_json(legacy);
        }
        Err(SleepError::MissingStateKeys {
            legacy_key: STATE_FILE_KEY_LEGACY,
            current_key: STATE_FILE_KEY_CURRENT,
        })
    }

    /// Read only the legacy key, the way releases without CronJob support do.
    pub fn read_legacy(data: &BTreeMap<String, String>) -> Result<Self> {
        match data.get(STATE_FILE_KEY_LEGACY) {
            Some(legacy) => Self::from_json(legacy),
            None => Err(SleepError::MissingStateKeys {
                legacy_key: STATE_FILE_KEY_LEGACY,
                current_key: STATE_FILE_KEY_CURRENT,
            }),
        }
    }

    /// Reconcile this (earlier) record with an incoming one.
    ///
    /// The result holds exactly the identifiers of `incoming`. Where an
    /// identifier is also known here, the value recorded here wins because it
    /// was captured before anything was scaled down.
    pub fn merge(&self, incoming: &SuspendState) -> SuspendState {
        let suspendables = incoming
            .suspendables
            .iter()
            .map(|(id, theirs)| {
                let value = self.suspendables.get(id).unwrap_or(theirs).clone();
                (id.clone(), value)
            })
            .collect();

        let merged = SuspendState {
            suspendables,
            finished: self.finished && incoming.finished,
        };
        debug!(
            entries = merged.len(),
            finished = merged.finished,
            "Merged two state files together"
        );
        merged
    }
}
