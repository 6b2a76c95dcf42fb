//! Container stat normalization
//!
//! Turns cumulative counters into the percentage/byte stat block shown per
//! task. CPU needs two samples of the same container; the first poll
//! reports 0% instead of leaving the field out.

use crate::models::{round2, ContainerResourceSnapshot, ContainerStats};

/// Normalize `current` against an optional `previous` read of the same container
pub fn normalize(
    previous: Option<&ContainerResourceSnapshot>,
    current: &ContainerResourceSnapshot,
) -> ContainerStats {
    let cpu_percent = previous
        .map(|prev| cpu_percent(prev, current))
        .unwrap_or(0.0);

    let memory_limit = current.memory_limit.unwrap_or(0);
    let (network_rx, network_tx) = network_totals(current);

    ContainerStats {
        cpu_percent: round2(cpu_percent),
        memory_usage: current.memory_used,
        memory_limit,
        memory_percent: round2(memory_percent(current.memory_used, memory_limit)),
        network_rx,
        network_tx,
    }
}

/// Container CPU delta over host CPU delta, scaled by online CPUs
pub fn cpu_percent(previous: &ContainerResourceSnapshot, current: &ContainerResourceSnapshot) -> f64 {
    let cpu_delta = current.cpu_time_used - previous.cpu_time_used;
    let system_delta = current.system_cpu_time - previous.system_cpu_time;

    if system_delta > 0.0 && cpu_delta > 0.0 {
        let percent = (cpu_delta / system_delta) * current.online_cpus.max(1) as f64 * 100.0;
        if percent.is_finite() {
            return percent;
        }
    }
    0.0
}

/// `used / limit * 100` clamped to `[0, 100]`; 0 without a limit
pub fn memory_percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (used as f64 / limit as f64 * 100.0).clamp(0.0, 100.0)
}

/// rx/tx summed across every interface of the container
pub fn network_totals(snapshot: &ContainerResourceSnapshot) -> (u64, u64) {
    snapshot
        .networks
        .values()
        .fold((0u64, 0u64), |(rx, tx), n| {
            (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
        })
}
