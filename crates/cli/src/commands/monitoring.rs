//! Time-series backed monitoring commands

use anyhow::Result;
use colored::Colorize;
use metrics_engine::models::{
    BackendHealth, ClusterMetrics, HistoryRange, TenantHistory, TenantMetrics, TimeSeries,
};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_percent, format_bytes, format_millis, format_rate, print_json, print_rows, print_warning,
    OutputFormat,
};

/// Show the current resource rollup of a tenant
pub async fn show_usage(client: &ApiClient, tenant: &str, format: OutputFormat) -> Result<()> {
    let path = format!("monitoring/{}/prometheus", tenant);
    let metrics: TenantMetrics = client.get(&path, &[]).await?;

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Table => {
            println!("{} {}", "Resource usage for tenant".bold(), tenant.cyan());
            println!("{}", "=".repeat(50));

            if metrics.container_count == 0 {
                print_warning("No containers reported (idle tenant or backend unavailable)");
            }

            println!("Containers:     {}", metrics.container_count);
            println!(
                "CPU:            {:.2}% (avg {:.2}%, max {:.2}%)",
                metrics.cpu.current, metrics.cpu.avg, metrics.cpu.max
            );

            let limit_note = if metrics.memory.limit_estimated {
                " (estimated)".dimmed().to_string()
            } else {
                String::new()
            };
            println!(
                "Memory:         {} / {}{} {}",
                format_bytes(metrics.memory.current),
                format_bytes(metrics.memory.limit),
                limit_note,
                color_percent(metrics.memory.percent)
            );
            println!(
                "Network:        rx {} ({}), tx {} ({})",
                format_bytes(metrics.network.rx_bytes),
                format_rate(metrics.network.rx_rate),
                format_bytes(metrics.network.tx_bytes),
                format_rate(metrics.network.tx_rate)
            );
            println!(
                "Storage:        {} / {} {}",
                format_bytes(metrics.storage.used),
                format_bytes(metrics.storage.total),
                color_percent(metrics.storage.percent)
            );
            println!();
            println!("As of {}", metrics.timestamp.to_rfc3339().dimmed());
        }
    }

    Ok(())
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "CPU %")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "RX")]
    rx: String,
    #[tabled(rename = "TX")]
    tx: String,
}

fn value_at(series: &TimeSeries, timestamp: i64) -> Option<f64> {
    series
        .binary_search_by_key(&timestamp, |p| p.timestamp)
        .ok()
        .map(|i| series[i].value)
}

/// One row per timestamp; metrics missing at that instant show `-`
fn history_rows(history: &TenantHistory) -> Vec<HistoryRow> {
    let mut timestamps: Vec<i64> = [
        &history.cpu,
        &history.memory,
        &history.network.rx,
        &history.network.tx,
    ]
    .iter()
    .flat_map(|series| series.iter().map(|p| p.timestamp))
    .collect();
    timestamps.sort_unstable();
    timestamps.dedup();

    let cell = |value: Option<f64>, render: &dyn Fn(f64) -> String| {
        value.map(render).unwrap_or_else(|| "-".to_string())
    };

    timestamps
        .into_iter()
        .map(|t| HistoryRow {
            time: format_millis(t),
            cpu: cell(value_at(&history.cpu, t), &|v: f64| format!("{:.2}", v)),
            memory: cell(value_at(&history.memory, t), &format_bytes),
            rx: cell(value_at(&history.network.rx, t), &format_rate),
            tx: cell(value_at(&history.network.tx, t), &format_rate),
        })
        .collect()
}

/// Show chart history of a tenant as a table
pub async fn show_history(
    client: &ApiClient,
    tenant: &str,
    range: HistoryRange,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("monitoring/{}/prometheus/history", tenant);
    let history: TenantHistory = client
        .get(&path, &[("range", range.to_string())])
        .await?;

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            println!(
                "{} {} ({})",
                "History for tenant".bold(),
                tenant.cyan(),
                history.range
            );

            let rows = history_rows(&history);
            if rows.is_empty() {
                print_warning("No data available for this range");
                return Ok(());
            }
            print_rows(rows);
        }
    }

    Ok(())
}

/// Show the cluster-wide overview
pub async fn show_cluster(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let cluster: ClusterMetrics = client.get("monitoring/cluster/overview", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&cluster)?,
        OutputFormat::Table => {
            println!("{}", "Cluster Overview".bold());
            println!("{}", "=".repeat(50));
            println!("Nodes:              {}", cluster.node_count);
            println!("Tenants:            {}", cluster.tenant_count);
            println!("Containers:         {}", cluster.total_containers);
            println!("CPU:                {}", color_percent(cluster.total_cpu));
            println!("Memory:             {}", format_bytes(cluster.total_memory));

            if cluster.proxy_metrics_available {
                println!("Requests/s:         {:.2}", cluster.requests_per_second);
                println!("Avg latency:        {:.1} ms", cluster.avg_latency * 1000.0);
            } else {
                println!("Requests/s:         {}", "n/a".dimmed());
                print_warning("Reverse proxy exports no request metrics");
            }
        }
    }

    Ok(())
}

/// Show whether the time-series backend is reachable
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: BackendHealth = client.get("monitoring/prometheus/health", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            let status = if health.healthy {
                "healthy".green().bold()
            } else {
                "unreachable".red().bold()
            };
            println!("Time-series backend: {}", status);
            println!("Checked at:          {}", health.timestamp.to_rfc3339().dimmed());
        }
    }

    Ok(())
}
