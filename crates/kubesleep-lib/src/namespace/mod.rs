//! Suspend, wake and status of a single namespace
//!
//! Suspend runs as:
//! 1. scan the namespace for workloads
//! 2. create the state file with `finished=false`, or merge with the one an
//!    interrupted suspend left behind
//! 3. scale every workload down, one at a time
//! 4. mark the state file finished
//!
//! A failure anywhere leaves a state file that the next suspend picks up in
//! step 2. Wake refuses to run on a state file that is not finished.

use crate::context::SleepContext;
use crate::error::{Result, SleepError};
use crate::k8s::{KubeApi, StateFileActions};
use crate::state::SuspendState;
use serde::Serialize;
use std::fmt;


/// System namespaces that bulk suspends never touch.
pub const AUTO_PROTECTED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

/// Which namespaces a command acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceSelection {
    /// Namespaces given by name; `force` overrides protection.
    Named { namespaces: Vec<String>, force: bool },
    /// Every namespace in the cluster.
    All,
}

impl NamespaceSelection {
    /// Validate command-line style arguments.
    ///
    /// `force` combined with `all_namespaces` is rejected rather than ignored.
    pub fn from_args(namespaces: Vec<String>, all_namespaces: bool, force: bool) -> Result<Self> {
        if all_namespaces {
            if force {
                return Err(SleepError::Config(
                    "--all-namespaces cannot be combined with --force".to_string(),
                ));
            }
            if !namespaces.is_empty() {
                return Err(SleepError::Config(
                    "--all-namespaces cannot be combined with --namespace".to_string(),
                ));
            }
            return Ok(NamespaceSelection::All);
        }
        Self::named(namespaces, force)
    }

    pub fn named(namespaces: Vec<String>, force: bool) -> Result<Self> {
        if namespaces.is_empty() {
            return Err(SleepError::Config(
                "either --all-namespaces or --namespace (-n) must be specified".to_string(),
            ));
        }
        if namespaces.iter().any(|ns| ns.trim().is_empty()) {
            return Err(SleepError::Config("namespace must not be empty".to_string()));
        }
        Ok(NamespaceSelection::Named { namespaces, force })
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, NamespaceSelection::All)
    }

    pub fn force(&self) -> bool {
        matches!(self, NamespaceSelection::Named { force: true, .. })
    }
}

/// Why a namespace was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// System namespace from [`AUTO_PROTECTED_NAMESPACES`]
    AutoProtected,
    /// Carries the do-not-suspend annotation
    Protected,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AutoProtected => "auto-protected system namespace",
            SkipReason::Protected => "protected by annotation",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum SuspendOutcome {
    Suspended { workloads: usize },
    Skipped { reason: SkipReason },
}

/// Suspend progress as recorded in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspendStatus {
    /// No state file
    Awake,
    /// State file exists but the suspend never finished
    Suspending,
    Suspended,
}

impl fmt::Display for SuspendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuspendStatus::Awake => "awake",
            SuspendStatus::Suspending => "suspending",
            SuspendStatus::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceStatus {
    pub name: String,
    pub status: SuspendStatus,
    pub protected: bool,
}

/// A namespace together with its protection flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendableNamespace {
    name: String,
    protected: bool,
}

impl SuspendableNamespace {
    pub fn new(name: impl Into<String>, protected: bool) -> Self {
        Self {
            name: name.into(),
            protected,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Carries the do-not-suspend annotation.
    pub fn is_explicitly_protected(&self) -> bool {
        self.protected
    }

    pub fn is_auto_protected(&self) -> bool {
        AUTO_PROTECTED_NAMESPACES.contains(&self.name.as_str())
    }

    pub fn is_protected(&self) -> bool {
        self.protected || self.is_auto_protected()
    }

    /// Protection policy. `None` means the namespace may be suspended.
    pub fn skip_reason(&self, selection: &NamespaceSelection) -> Option<SkipReason> {
        match selection {
            NamespaceSelection::All if self.is_auto_protected() => Some(SkipReason::AutoProtected),
            NamespaceSelection::All if self.protected => Some(SkipReason::Protected),
            NamespaceSelection::All => None,
            NamespaceSelection::Named { force: true, .. } => None,
            NamespaceSelection::Named { .. } if self.is_auto_protected() => {
                Some(SkipReason::AutoProtected)
            }
            NamespaceSelection::Named { .. } if self.protected => Some(SkipReason::Protected),
            NamespaceSelection::Named { .. } => None,
        }
    }

    /// Suspend the namespace unless the protection policy says otherwise.
    pub async fn suspend(
        &self,
        ctx: &SleepContext,
        api: &dyn KubeApi,
        selection: &NamespaceSelection,
    ) -> Result<SuspendOutcome> {
        if let Some(reason) = self.skip_reason(selection) {
            ctx.logger.log_namespace_skipped(&self.name, reason.as_str());
            return Ok(SuspendOutcome::Skipped { reason });
        }
        let workloads = self.suspend_workloads(ctx, api).await?;
        Ok(SuspendOutcome::Suspended { workloads })
    }

    async fn suspend_workloads(&self, ctx: &SleepContext, api: &dyn KubeApi) -> Result<usize> {
        let namespace = self.name.as_str();

        let scanned = SuspendState::unfinished(api.get_suspendables(namespace).await?);
        ctx.logger.log_suspend_started(namespace, scanned.len());

        let (resolved, actions) = self.ensure_state_file(ctx, api, scanned).await?;

        for suspendable in resolved.suspendables().values() {
            let Some(action) = suspendable.suspend_action() else {
                ctx.logger.log_workload_already_suspended(
                    namespace,
                    suspendable.kind(),
                    suspendable.name(),
                );
                continue;
            };
            let action = &action;
            ctx.repeat(move || action.apply(api, namespace)).await?;
            ctx.logger
                .log_workload_suspended(namespace, action.kind, &action.name);
        }

        self.finish(ctx, api, &resolved, actions).await?;
        ctx.logger.log_suspend_finished(namespace, resolved.len());
        Ok(resolved.len())
    }

    /// Create the state file, or merge the scan into the one left by an
    /// interrupted suspend. The existing replica counts win.
    async fn ensure_state_file(
        &self,
        ctx: &SleepContext,
        api: &dyn KubeApi,
        scanned: SuspendState,
    ) -> Result<(SuspendState, Box<dyn StateFileActions>)> {
        match api.create_state_file(&self.name, scanned.write()?).await {
            Ok(actions) => Ok((scanned, actions)),
            Err(err) if err.is_already_exists() => {
                let (existing, actions) = api.get_state_file(&self.name).await?;
                let merged = existing.merge(&scanned);
                ctx.logger
                    .log_state_merged(&self.name, existing.len(), merged.len());
                self.persist_merged(ctx, api, &scanned, merged, actions)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Write the merged record back before anything is scaled, so workloads
    /// adopted from the scan keep their replica counts if this run fails too.
    ///
    /// After a conflict the state file is read and merged with the scan again.
    async fn persist_merged(
        &self,
        ctx: &SleepContext,
        api: &dyn KubeApi,
        scanned: &SuspendState,
        merged: SuspendState,
        actions: Box<dyn StateFileActions>,
    ) -> Result<(SuspendState, Box<dyn StateFileActions>)> {
        let namespace = self.name.as_str();
        let mut first_attempt = Some((merged, actions));

        ctx.repeat(move || {
            let pending = first_attempt.take();
            async move {
                let (state, mut actions) = match pending {
                    Some(pending) => pending,
                    None => {
                        let (current, actions) = api.get_state_file(namespace).await?;
                        (current.merge(scanned), actions)
                    }
                };
                actions.update(state.write()?).await?;
                Ok((state, actions))
            }
        })
        .await
    }

    /// Persist `finished=true`.
    ///
    /// The first write goes against the version from [`Self::ensure_state_file`].
    /// After a conflict the state file is read again and merged so a
    /// concurrent writer's replica counts are kept.
    async fn finish(
        &self,
        ctx: &SleepContext,
        api: &dyn KubeApi,
        resolved: &SuspendState,
        actions: Box<dyn StateFileActions>,
    ) -> Result<()> {
        let mut finished = resolved.clone();
        finished.set_finished(true);
        let data = finished.write()?;
        let namespace = self.name.as_str();
        let mut first_attempt = Some(actions);

        ctx.repeat(move || {
            let handle = first_attempt.take();
            let data = data.clone();
            async move {
                match handle {
                    Some(mut actions) => actions.update(data).await,
                    None => {
                        let (current, mut actions) = api.get_state_file(namespace).await?;
                        let mut merged = current.merge(resolved);
                        merged.set_finished(true);
                        actions.update(merged.write()?).await
                    }
                }
            }
        })
        .await
    }

    /// Restore every workload from a finished state file, then delete it.
    pub async fn wake(&self, ctx: &SleepContext, api: &dyn KubeApi) -> Result<usize> {
        let namespace = self.name.as_str();

        let (state, actions) = match api.get_state_file(namespace).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                return Err(SleepError::NothingToWake {
                    namespace: namespace.to_string(),
                })
            }
            Err(err) => return Err(err),
        };

        if !state.is_finished() {
            return Err(SleepError::PartiallySuspended {
                namespace: namespace.to_string(),
            });
        }

        for suspendable in state.suspendables().values() {
            ctx.repeat(move || suspendable.wake(api, namespace)).await?;
            ctx.logger.log_workload_woken(
                namespace,
                suspendable.kind(),
                suspendable.name(),
                suspendable.replicas(),
            );
        }

        actions
            .delete()
            .await
            .map_err(|source| SleepError::StateFileCleanup {
                namespace: namespace.to_string(),
                source: Box::new(source),
            })?;

        ctx.logger.log_wake_finished(namespace, state.len());
        Ok(state.len())
    }

    pub async fn status(&self, api: &dyn KubeApi) -> Result<NamespaceStatus> {
        let status = match api.get_state_file(&self.name).await {
            Ok((state, _)) if state.is_finished() => SuspendStatus::Suspended,
            Ok(_) => SuspendStatus::Suspending,
            Err(err) if err.is_not_found() => SuspendStatus::Awake,
            Err(err) => return Err(err),
        };
        Ok(NamespaceStatus {
            name: self.name.clone(),
            status,
            protected: self.is_protected(),
        })
    }
}
