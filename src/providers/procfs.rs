//! Process-tree resource sampler backed by Linux `/proc`.
//!
//! A sample walks the tree rooted at the supervised pid, takes
//! `samples + 1` counter snapshots spread evenly over the window, and turns
//! consecutive snapshots into rates. Memory is averaged across snapshots.
//! Network counters in `/proc/<pid>/net/dev` are namespace wide, so they are
//! read once per tree from the root process.

use std::collections::HashMap;
use std::fs;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{ProcessStatsProvider, ProviderFuture};
use crate::models::status::ResourceStats;

/// Kernel clock ticks per second used by `/proc/<pid>/stat` times.
const USER_HZ: f64 = 100.0;

/// Counters read for one process at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ProcessCounters {
    cpu_ticks: u64,
    rss_bytes: u64,
    io_bytes: u64,
}

/// Counters for a whole tree at one instant.
#[derive(Debug, Clone)]
struct TreeSnapshot {
    at: Instant,
    processes: HashMap<u32, ProcessCounters>,
    net_bytes: u64,
}

/// Samples CPU, memory, network and disk usage from `/proc`.
#[derive(Debug, Clone)]
pub struct ProcfsStatsProvider {
    window: Duration,
    samples: u32,
}

impl ProcfsStatsProvider {
    /// Create a sampler averaging `samples` intervals across `window`.
    #[must_use]
    pub fn new(window: Duration, samples: u32) -> Self {
        Self {
            window,
            samples: samples.max(1),
        }
    }

    /// Blocking sample of the tree rooted at `pid`.
    #[must_use]
    pub fn sample_blocking(&self, pid: u32) -> Option<ResourceStats> {
        let step = self.window / self.samples;
        let mut previous = snapshot_tree(pid)?;
        let mut totals = ResourceStats::default();
        let mut rss_sum = rss_total(&previous);

        for _ in 0..self.samples {
            std::thread::sleep(step);
            let current = snapshot_tree(pid)?;
            let elapsed = current
                .at
                .saturating_duration_since(previous.at)
                .as_secs_f64()
                .max(f64::EPSILON);

            let mut cpu_ticks = 0u64;
            let mut io_bytes = 0u64;
            for (child_pid, now) in &current.processes {
                if let Some(before) = previous.processes.get(child_pid) {
                    cpu_ticks += now.cpu_ticks.saturating_sub(before.cpu_ticks);
                    io_bytes += now.io_bytes.saturating_sub(before.io_bytes);
                }
            }
            let net_bytes = current.net_bytes.saturating_sub(previous.net_bytes);

            totals.cpu += to_f64(cpu_ticks) / USER_HZ / elapsed * 100.0;
            totals.disk_io += to_f64(io_bytes) / elapsed;
            totals.net += to_f64(net_bytes) / elapsed;
            rss_sum += rss_total(&current);
            previous = current;
        }

        let n = f64::from(self.samples);
        Some(ResourceStats {
            cpu: totals.cpu / n,
            mem: rss_sum / (n + 1.0),
            net: totals.net / n,
            disk_io: totals.disk_io / n,
        })
    }
}

impl ProcessStatsProvider for ProcfsStatsProvider {
    fn sample(&self, pid: u32) -> ProviderFuture<'_, Option<ResourceStats>> {
        let sampler = self.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || sampler.sample_blocking(pid)).await {
                Ok(stats) => stats,
                Err(err) => {
                    debug!(pid, %err, "stats sampling task failed");
                    None
                }
            }
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(value: u64) -> f64 {
    value as f64
}

fn rss_total(snapshot: &TreeSnapshot) -> f64 {
    to_f64(snapshot.processes.values().map(|c| c.rss_bytes).sum())
}

/// Read counters for `root` and all its descendants; `None` if `root` is gone.
fn snapshot_tree(root: u32) -> Option<TreeSnapshot> {
    let root_counters = read_counters(root)?;
    let mut processes = HashMap::from([(root, root_counters)]);
    for pid in descendants(root) {
        if let Some(counters) = read_counters(pid) {
            processes.insert(pid, counters);
        }
    }
    let net_bytes = fs::read_to_string(format!("/proc/{root}/net/dev"))
        .map(|raw| parse_net_dev(&raw))
        .unwrap_or(0);
    Some(TreeSnapshot {
        at: Instant::now(),
        processes,
        net_bytes,
    })
}

fn read_counters(pid: u32) -> Option<ProcessCounters> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let cpu_ticks = parse_stat_ticks(&stat)?;
    let rss_bytes = fs::read_to_string(format!("/proc/{pid}/status"))
        .ok()
        .and_then(|raw| parse_vm_rss(&raw))
        .unwrap_or(0);
    // `io` is unreadable for processes owned by other users.
    let io_bytes = fs::read_to_string(format!("/proc/{pid}/io"))
        .ok()
        .and_then(|raw| parse_io_bytes(&raw))
        .unwrap_or(0);
    Some(ProcessCounters {
        cpu_ticks,
        rss_bytes,
        io_bytes,
    })
}

/// All descendants of `root`, breadth first.
fn descendants(root: u32) -> Vec<u32> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(pid) = frontier.pop() {
        let Ok(raw) = fs::read_to_string(format!("/proc/{pid}/task/{pid}/children")) else {
            continue;
        };
        for child in raw.split_whitespace().filter_map(|s| s.parse::<u32>().ok()) {
            if !found.contains(&child) {
                found.push(child);
                frontier.push(child);
            }
        }
    }
    found
}

/// `utime + stime` from a `/proc/<pid>/stat` line.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
fn parse_stat_ticks(raw: &str) -> Option<u64> {
    let rest = &raw[raw.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is the state (field 3); utime and stime are fields 14 and 15.
    let utime = fields.get(11)?.parse::<u64>().ok()?;
    let stime = fields.get(12)?.parse::<u64>().ok()?;
    Some(utime + stime)
}

/// `VmRSS` from `/proc/<pid>/status`, in bytes.
fn parse_vm_rss(raw: &str) -> Option<u64> {
    raw.lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// `read_bytes + write_bytes` from `/proc/<pid>/io`.
fn parse_io_bytes(raw: &str) -> Option<u64> {
    let mut read = None;
    let mut write = None;
    for line in raw.lines() {
        if let Some(v) = line.strip_prefix("read_bytes:") {
            read = v.trim().parse::<u64>().ok();
        } else if let Some(v) = line.strip_prefix("write_bytes:") {
            write = v.trim().parse::<u64>().ok();
        }
    }
    Some(read? + write?)
}

/// Received plus transmitted bytes over all interfaces in `net/dev`.
fn parse_net_dev(raw: &str) -> u64 {
    raw.lines()
        .skip(2)
        .filter_map(|line| line.split_once(':').map(|(_, counters)| counters))
        .map(|counters| {
            let cols: Vec<&str> = counters.split_whitespace().collect();
            let rx = cols.first().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            let tx = cols.get(8).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            rx + tx
        })
        .sum()
}
