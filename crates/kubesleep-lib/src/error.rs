//! Error types for suspend and wake operations.

use crate::suspendable::ManifestKind;
use thiserror::Error;

/// Errors that can occur while suspending, waking or inspecting a namespace.
#[derive(Debug, Error)]
pub enum SleepError {
    /// Invalid argument combination or empty namespace name.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Unclassified Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// Optimistic-concurrency collision on a workload or the state file.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Object creation collided with an existing object.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict retries were used up.
    #[error("operation failed after {attempts} tries: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: Box<SleepError>,
    },

    /// The state file already exists, a prior suspend is in progress or was aborted.
    #[error("statefile configmap {name} already exists in namespace {namespace}, indicating an in-progress or aborted suspend operation")]
    StateFileAlreadyExists { namespace: String, name: String },

    /// The state file does not exist.
    #[error("statefile configmap not found in namespace {0}")]
    StateFileNotFound(String),

    /// Wake was requested for a namespace that has no state file.
    #[error("namespace {namespace} has no suspend state, nothing to wake")]
    NothingToWake { namespace: String },

    /// Wake was requested for a namespace whose suspend never finished.
    #[error("cannot wake namespace {namespace}: namespace partially suspended; resume or retry suspend first")]
    PartiallySuspended { namespace: String },

    /// Neither state file key is present in the ConfigMap.
    #[error("missing both {legacy_key} and {current_key} in statefile configmap")]
    MissingStateKeys {
        legacy_key: &'static str,
        current_key: &'static str,
    },

    /// Wake succeeded but removing the state file failed.
    #[error("woke namespace {namespace} but failed to delete its statefile: {source}")]
    StateFileCleanup {
        namespace: String,
        #[source]
        source: Box<SleepError>,
    },

    /// Persisted workload kind tag is not known to this version.
    #[error("unknown manifest kind {tag} for suspendable {name}")]
    UnknownKind { tag: i32, name: String },

    /// Scaling a single workload failed.
    #[error("failed to scale {kind} {name}: {source}")]
    Workload {
        kind: ManifestKind,
        name: String,
        #[source]
        source: Box<SleepError>,
    },

    /// The namespace is being deleted.
    #[error("namespace {0} is terminating")]
    NamespaceTerminating(String),

    /// Some namespaces of a bulk run failed.
    #[error("failed to process namespaces: {}", .failed.join(", "))]
    Bulk { failed: Vec<String> },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A scan or a persisted record broke an invariant the tool relies on.
    /// Not recoverable; callers should stop rather than retry.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Result type for kubesleep operations.
pub type Result<T> = std::result::Result<T, SleepError>;

impl SleepError {
    /// Innermost error, looking through wrappers that only add context.
    pub fn root(&self) -> &SleepError {
        match self {
            SleepError::Workload { source, .. } | SleepError::RetriesExhausted { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), SleepError::Conflict(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.root(),
            SleepError::AlreadyExists(_) | SleepError::StateFileAlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            SleepError::NotFound(_) | SleepError::StateFileNotFound(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SleepError::Cancelled)
    }

    /// True for the fatal category: a defect, not a runtime condition.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self.root(), SleepError::Invariant(_))
    }

    /// True when retries were attempted and given up on.
    pub fn is_retries_exhausted(&self) -> bool {
        match self {
            SleepError::RetriesExhausted { .. } => true,
            SleepError::Workload { source, .. } => source.is_retries_exhausted(),
            _ => false,
        }
    }
}

impl From<kube::Error> for SleepError {
    fn from(err: kube::Error) -> Self {
        if let kube::Error::Api(response) = &err {
            match (response.code, response.reason.as_str()) {
                (409, "Conflict") => return SleepError::Conflict(response.message.clone()),
                (409, "AlreadyExists") => {
                    return SleepError::AlreadyExists(response.message.clone())
                }
                (404, _) => return SleepError::NotFound(response.message.clone()),
                _ => {}
            }
        }
        SleepError::Kube(err)
    }
}

impl From<serde_json::Error> for SleepError {
    fn from(err: serde_json::Error) -> Self {
        SleepError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_conflict_classification() {
        let err = SleepError::from(api_error(409, "Conflict"));
        assert!(err.is_conflict());
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_already_exists_classification() {
        let err = SleepError::from(api_error(409, "AlreadyExists"));
        assert!(err.is_already_exists());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_not_found_classification() {
        let err = SleepError::from(api_error(404, "NotFound"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_api_errors_stay_unclassified() {
        let err = SleepError::from(api_error(500, "InternalError"));
        assert!(matches!(err, SleepError::Kube(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_predicates_see_through_wrappers() {
        let err = SleepError::Workload {
            kind: ManifestKind::Deployment,
            name: "web".to_string(),
            source: Box::new(SleepError::RetriesExhausted {
                attempts: 5,
                source: Box::new(SleepError::Conflict("stale".to_string())),
            }),
        };
        assert!(err.is_conflict());
        assert!(err.is_retries_exhausted());
        assert!(!err.is_invariant_violation());
    }

    #[test]
    fn test_partially_suspended_message() {
        let err = SleepError::PartiallySuspended {
            namespace: "team-a".to_string(),
        };
        assert!(err.to_string().contains("partially suspended"));
    }
}
