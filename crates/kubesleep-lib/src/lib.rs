//! Library behind the kubesleep CLI
//!
//! This crate provides the core functionality for:
//! - Scanning namespaces for Deployments, StatefulSets and CronJobs
//! - Persisting the pre-suspend replica counts in a versioned state file
//! - Recovering interrupted suspends by merging with the state file
//! - Waking namespaces back to their recorded scale

pub mod context;
pub mod error;
pub mod k8s;
pub mod namespace;
pub mod observability;
pub mod operations;
pub mod retry;
pub mod state;
pub mod suspendable;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::SleepContext;
pub use error::{Result, SleepError};
pub use k8s::{KubeApi, KubeClient, StateFileActions};
pub use namespace::{
    NamespaceSelection, NamespaceStatus, SkipReason, SuspendOutcome, SuspendStatus,
    SuspendableNamespace,
};
pub use observability::StructuredLogger;
pub use operations::BulkReport;
pub use retry::RetryPolicy;
pub use state::SuspendState;
pub use suspendable::{ManifestKind, SuspendAction, Suspendable};
