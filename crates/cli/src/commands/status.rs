//! Status command

use anyhow::Result;
use kubesleep_lib::{operations, KubeApi, NamespaceSelection, NamespaceStatus, SleepContext};
use tabled::Tabled;

use crate::output::{color_status, print_json, print_table, OutputFormat};

/// Row for the status table
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PROTECTED")]
    protected: bool,
}

impl From<&NamespaceStatus> for StatusRow {
    fn from(status: &NamespaceStatus) -> Self {
        Self {
            name: status.name.clone(),
            status: color_status(status.status),
            protected: status.protected,
        }
    }
}

/// Show the suspend status of the selected namespaces
pub async fn status(
    ctx: &SleepContext,
    api: &dyn KubeApi,
    selection: &NamespaceSelection,
    format: OutputFormat,
) -> Result<()> {
    let report = operations::status(ctx, api, selection).await?;
    let statuses: Vec<NamespaceStatus> = report
        .completed
        .iter()
        .map(|(_, status)| status.clone())
        .collect();

    match format {
        OutputFormat::Json => print_json(&statuses)?,
        OutputFormat::Table => {
            let rows: Vec<StatusRow> = statuses.iter().map(StatusRow::from).collect();
            print_table(&rows);
        }
    }

    report.into_result()?;
    Ok(())
}
