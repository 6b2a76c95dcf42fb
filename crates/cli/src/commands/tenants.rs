//! Per-tenant task commands

use anyhow::Result;
use colored::Colorize;
use metrics_engine::models::{TaskMetricRecord, TaskState};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_percent, color_status, format_bytes, print_json, print_rows, print_info, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Task")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Mem %")]
    memory_percent: String,
    #[tabled(rename = "Net RX/TX")]
    network: String,
    #[tabled(rename = "Note")]
    note: String,
}

fn status_name(state: TaskState) -> String {
    serde_json::to_value(state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn task_row(record: &TaskMetricRecord) -> TaskRow {
    let note = match (&record.error, record.reachable) {
        (Some(error), _) => error.clone(),
        (None, Some(false)) => "remote node, stats not polled".to_string(),
        _ => String::new(),
    };

    match &record.stats {
        Some(stats) => TaskRow {
            name: record.container_name.clone(),
            status: color_status(&status_name(record.status)),
            cpu: format!("{:.2}%", stats.cpu_percent),
            memory: format!(
                "{} / {}",
                format_bytes(stats.memory_usage as f64),
                format_bytes(stats.memory_limit as f64)
            ),
            memory_percent: color_percent(stats.memory_percent),
            network: format!(
                "{} / {}",
                format_bytes(stats.network_rx as f64),
                format_bytes(stats.network_tx as f64)
            ),
            note,
        },
        None => TaskRow {
            name: record.container_name.clone(),
            status: color_status(&status_name(record.status)),
            cpu: "-".to_string(),
            memory: "-".to_string(),
            memory_percent: "-".to_string(),
            network: "-".to_string(),
            note,
        },
    }
}

/// Show the tasks of a tenant with their container stats
pub async fn show_tasks(client: &ApiClient, tenant: &str, format: OutputFormat) -> Result<()> {
    let path = format!("tenants/{}/metrics", tenant);
    let records: Vec<TaskMetricRecord> = client.get(&path, &[]).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            println!("{} {}", "Tasks for tenant".bold(), tenant.cyan());
            println!();

            if records.iter().all(|r| r.status == TaskState::NotFound) {
                print_warning(&format!("No service found for tenant {}", tenant));
                return Ok(());
            }

            let remote = records.iter().filter(|r| r.reachable == Some(false)).count();
            print_rows(records.iter().map(task_row).collect());

            if remote > 0 {
                print_info(&format!(
                    "{} task(s) run on nodes this aggregator cannot poll; use `wpm usage` for backend figures",
                    remote
                ));
            }
        }
    }

    Ok(())
}

/// Print the tail of a tenant's service logs
pub async fn show_logs(
    client: &ApiClient,
    tenant: &str,
    lines: usize,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("tenants/{}/logs", tenant);
    let logs: Vec<String> = client.get(&path, &[("lines", lines.to_string())]).await?;

    match format {
        OutputFormat::Json => print_json(&logs)?,
        OutputFormat::Table => {
            if logs.is_empty() {
                print_warning("No log lines returned");
            }
            for line in &logs {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
