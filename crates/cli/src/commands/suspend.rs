//! Suspend command

use anyhow::Result;
use colored::Colorize;
use kubesleep_lib::{operations, KubeApi, NamespaceSelection, SleepContext, SuspendOutcome};
use serde::Serialize;

use crate::output::{print_json, print_success, print_warning, OutputFormat};

#[derive(Serialize)]
struct SuspendRow<'a> {
    namespace: &'a str,
    #[serde(flatten)]
    outcome: &'a SuspendOutcome,
}

/// Suspend the selected namespaces and report each one.
///
/// Namespaces that failed are logged by the library; the returned error
/// names them.
pub async fn suspend(
    ctx: &SleepContext,
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
    format: OutputFormat,
) -> Result<()> {
    let report = operations::suspend(ctx, api, selection).await?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<SuspendRow> = report
                .completed
                .iter()
                .map(|(namespace, outcome)| SuspendRow { namespace, outcome })
                .collect();
            print_json(&rows)?;
        }
        OutputFormat::Table => {
            for (namespace, outcome) in &report.completed {
                match outcome {
                    SuspendOutcome::Suspended { workloads } => print_success(&format!(
                        "Suspended namespace {} ({} workloads)",
                        namespace.cyan(),
                        workloads
                    )),
                    SuspendOutcome::Skipped { reason } => print_warning(&format!(
                        "Skipped namespace {}: {}",
                        namespace.cyan(),
                        reason
                    )),
                }
            }
        }
    }

    report.into_result()?;
    Ok(())
}
