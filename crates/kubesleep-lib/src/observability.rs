//! Structured event logging for suspend and wake operations
//!
//! Library code receives a [`StructuredLogger`] handle instead of reaching
//! for a process-wide logger. Events are emitted through `tracing` with an
//! `event` field so they can be filtered in JSON output.

use crate::error::SleepError;
use crate::suspendable::ManifestKind;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Logger for namespace suspend/wake events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    cluster: String,
    enabled: bool,
}

impl StructuredLogger {
    /// `cluster` is attached to every event, usually the kubeconfig context name.
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            enabled: true,
        }
    }

    /// A logger that emits nothing
    pub fn noop() -> Self {
        Self {
            cluster: String::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_suspend_started(&self, namespace: &str, workloads: usize) {
        if !self.enabled {
            return;
        }
        info!(
            event = "suspend_started",
            cluster = %self.cluster,
            namespace = %namespace,
            workloads = workloads,
            "Suspending namespace"
        );
    }

    /// An earlier suspend left its state file behind and was merged with the fresh scan.
    pub fn log_state_merged(&self, namespace: &str, existing: usize, merged: usize) {
        if !self.enabled {
            return;
        }
        warn!(
            event = "state_merged",
            cluster = %self.cluster,
            namespace = %namespace,
            existing_entries = existing,
            merged_entries = merged,
            "Found state file of an interrupted suspend, keeping its replica counts"
        );
    }

    pub fn log_workload_suspended(&self, namespace: &str, kind: ManifestKind, name: &str) {
        if !self.enabled {
            return;
        }
        info!(
            event = "workload_suspended",
            cluster = %self.cluster,
            namespace = %namespace,
            kind = %kind,
            name = %name,
            "Suspended workload"
        );
    }

    pub fn log_workload_already_suspended(&self, namespace: &str, kind: ManifestKind, name: &str) {
        if !self.enabled {
            return;
        }
        debug!(
            event = "workload_already_suspended",
            cluster = %self.cluster,
            namespace = %namespace,
            kind = %kind,
            name = %name,
            "Workload already at zero, skipping"
        );
    }

    pub fn log_suspend_finished(&self, namespace: &str, workloads: usize) {
        if !self.enabled {
            return;
        }
        info!(
            event = "suspend_finished",
            cluster = %self.cluster,
            namespace = %namespace,
            workloads = workloads,
            "Namespace suspended"
        );
    }

    pub fn log_namespace_skipped(&self, namespace: &str, reason: &str) {
        if !self.enabled {
            return;
        }
        info!(
            event = "namespace_skipped",
            cluster = %self.cluster,
            namespace = %namespace,
            reason = %reason,
            "Skipping namespace"
        );
    }

    pub fn log_workload_woken(&self, namespace: &str, kind: ManifestKind, name: &str, replicas: i32) {
        if !self.enabled {
            return;
        }
        info!(
            event = "workload_woken",
            cluster = %self.cluster,
            namespace = %namespace,
            kind = %kind,
            name = %name,
            replicas = replicas,
            "Woke up workload"
        );
    }

    pub fn log_wake_finished(&self, namespace: &str, workloads: usize) {
        if !self.enabled {
            return;
        }
        info!(
            event = "wake_finished",
            cluster = %self.cluster,
            namespace = %namespace,
            workloads = workloads,
            "Namespace woken up"
        );
    }

    pub fn log_retry(&self, attempt: u32, delay: Duration, err: &SleepError) {
        if !self.enabled {
            return;
        }
        warn!(
            event = "retry_scheduled",
            cluster = %self.cluster,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed and will be retried"
        );
    }

    pub fn log_namespace_failed(&self, namespace: &str, err: &SleepError) {
        if !self.enabled {
            return;
        }
        error!(
            event = "namespace_failed",
            cluster = %self.cluster,
            namespace = %namespace,
            error = %err,
            "Namespace operation failed"
        );
    }
}
