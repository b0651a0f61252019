//! Wake command

use anyhow::Result;
use colored::Colorize;
use kubesleep_lib::{operations, KubeApi, NamespaceSelection, SleepContext};
use serde::Serialize;

use crate::output::{print_json, print_success, OutputFormat};

#[derive(Serialize)]
struct WakeRow<'a> {
    namespace: &'a str,
    workloads: usize,
}

pub async fn wake(
    ctx: &SleepContext,
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
    format: OutputFormat,
) -> Result<()> {
    let report = operations::wake(ctx, api, selection).await?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<WakeRow> = report
                .completed
                .iter()
                .map(|(namespace, workloads)| WakeRow {
                    namespace,
                    workloads: *workloads,
                })
                .collect();
            print_json(&rows)?;
        }
        OutputFormat::Table => {
            for (namespace, workloads) in &report.completed {
                print_success(&format!(
                    "Woke namespace {} ({} workloads)",
                    namespace.cyan(),
                    workloads
                ));
            }
        }
    }

    report.into_result()?;
    Ok(())
}
