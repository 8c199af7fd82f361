//! Host CPU and memory utilization, read from the Linux /proc filesystem.
//!
//! Values are best effort: on other platforms, or if /proc cannot be read, the
//! affected figure is reported as 0.
use serde::Serialize;

/// Snapshot served by the `/systemStats` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    /// Busy share of CPU time since boot, e.g. "12.34%".
    pub cpu_usage: String,
    /// Share of memory in use, e.g. "56.78%".
    pub memory_usage: String,
    /// Number of logical CPU cores available to the runtime.
    pub workers: usize,
}

impl SystemStats {
    pub fn collect() -> Self {
        let cpu = std::fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|stat| cpu_usage_percent(&stat))
            .unwrap_or(0.0);
        let memory = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|meminfo| memory_usage_percent(&meminfo))
            .unwrap_or(0.0);

        Self {
            cpu_usage: format!("{cpu:.2}%"),
            memory_usage: format!("{memory:.2}%"),
            workers: num_cpus::get(),
        }
    }
}

/// Busy percentage from the aggregate `cpu` line of /proc/stat.
///
/// The counters are cumulative since boot, so this is an average, not a current load.
fn cpu_usage_percent(stat: &str) -> Option<f64> {
    let cpu_line = stat.lines().find(|line| line.starts_with("cpu "))?;
    let times: Vec<u64> = cpu_line
        .split_whitespace()
        .skip(1)
        .filter_map(|field| field.parse().ok())
        .collect();

    // user nice system idle iowait irq softirq steal ...
    let idle = times.get(3)? + times.get(4).copied().unwrap_or(0);
    let total: u64 = times.iter().sum();
    if total == 0 {
        return None;
    }
    Some(100.0 - (idle as f64 / total as f64) * 100.0)
}

/// Used memory percentage from /proc/meminfo (MemTotal vs MemAvailable).
fn memory_usage_percent(meminfo: &str) -> Option<f64> {
    let mut total = None;
    let mut available = None;

    for line in meminfo.lines() {
        if line.starts_with("MemTotal:") {
            total = parse_meminfo_value(line);
        } else if line.starts_with("MemAvailable:") {
            available = parse_meminfo_value(line);
        }
    }

    let total = total.filter(|total| *total > 0)?;
    let used = total.saturating_sub(available?);
    Some(used as f64 / total as f64 * 100.0)
}

/// Parse a value from /proc/meminfo (e.g., "MemTotal:       16384 kB")
fn parse_meminfo_value(line: &str) -> Option<u64> {
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  300 0 100 500 100 0 0 0 0 0\ncpu0 150 0 50 250 50 0 0 0 0 0\nintr 1 2 3\n";
    const MEMINFO: &str = "MemTotal:       16000 kB\nMemFree:         2000 kB\nMemAvailable:    4000 kB\n";

    #[test]
    fn test_cpu_usage_uses_idle_and_iowait_as_idle_time() {
        // idle 500 + iowait 100 out of 1000
        let usage = cpu_usage_percent(STAT).unwrap();
        assert!((usage - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_memory_usage_from_available_memory() {
        let usage = memory_usage_percent(MEMINFO).unwrap();
        assert!((usage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_input_yields_none() {
        assert!(cpu_usage_percent("intr 1 2 3").is_none());
        assert!(memory_usage_percent("MemFree: 10 kB").is_none());
    }

    #[test]
    fn test_collect_formats_percentages() {
        let stats = SystemStats::collect();
        assert!(stats.cpu_usage.ends_with('%'));
        assert!(stats.memory_usage.ends_with('%'));
        assert!(stats.workers >= 1);
    }
}
