// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host metric sampling for heartbeats.
//!
//! Load, memory and disk space come from `sys-info`; CPU utilization is
//! derived from `/proc/stat` deltas between ticks, the CPU temperature from
//! the sysfs thermal zone, and cumulative disk writes (an SD-wear proxy)
//! from `/proc/diskstats`. Everything degrades to zero / null on platforms
//! that do not expose a source.

use std::fs;
use std::path::PathBuf;

const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSample {
    /// 1-minute load average.
    pub cpu_load: f64,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_percent: f64,
    /// Degrees Celsius; `None` without a thermal zone.
    pub temperature: Option<f64>,
    pub disk_free: u64,
    pub disk_writes_total: u64,
}

pub struct HostSampler {
    stat_path: PathBuf,
    thermal_path: PathBuf,
    diskstats_path: PathBuf,
    previous_cpu: Option<(u64, u64)>,
}

impl Default for HostSampler {
    fn default() -> Self {
        HostSampler::with_paths(
            "/proc/stat".into(),
            "/sys/class/thermal/thermal_zone0/temp".into(),
            "/proc/diskstats".into(),
        )
    }
}

impl HostSampler {
    pub fn with_paths(stat_path: PathBuf, thermal_path: PathBuf, diskstats_path: PathBuf) -> Self {
        HostSampler {
            stat_path,
            thermal_path,
            diskstats_path,
            previous_cpu: None,
        }
    }

    pub fn sample(&mut self) -> HostSample {
        let (memory_used, memory_percent) = memory();
        HostSample {
            cpu_load: sys_info::loadavg().map(|l| l.one).unwrap_or(0.0),
            cpu_percent: self.cpu_percent(),
            memory_used,
            memory_percent,
            temperature: self.temperature(),
            disk_free: sys_info::disk_info()
                .map(|d| d.free * 1024)
                .unwrap_or(0),
            disk_writes_total: self.disk_writes_total(),
        }
    }

    /// Utilization over the window since the previous call; 0 on the first.
    fn cpu_percent(&mut self) -> f64 {
        let Some((idle, total)) = read_cpu_times(&self.stat_path) else {
            return 0.0;
        };
        let previous = self.previous_cpu.replace((idle, total));
        match previous {
            Some((prev_idle, prev_total)) if total > prev_total => {
                let busy = (total - prev_total).saturating_sub(idle.saturating_sub(prev_idle));
                100.0 * busy as f64 / (total - prev_total) as f64
            }
            _ => 0.0,
        }
    }

    fn temperature(&self) -> Option<f64> {
        let raw = fs::read_to_string(&self.thermal_path).ok()?;
        // Millidegrees on the wire.
        raw.trim().parse::<i64>().ok().map(|v| v as f64 / 1000.0)
    }

    fn disk_writes_total(&self) -> u64 {
        let Ok(raw) = fs::read_to_string(&self.diskstats_path) else {
            return 0;
        };
        raw.lines()
            .filter_map(|line| {
                let columns: Vec<&str> = line.split_whitespace().collect();
                // major minor name reads ... sectors-written at index 9.
                let name = columns.get(2)?;
                if !is_whole_disk(name) {
                    return None;
                }
                columns.get(9)?.parse::<u64>().ok()
            })
            .sum::<u64>()
            * SECTOR_SIZE
    }
}

/// Whole physical devices only; partitions would double-count writes.
fn is_whole_disk(name: &str) -> bool {
    for virtual_prefix in ["loop", "ram", "zram", "dm-", "md"] {
        if name.starts_with(virtual_prefix) {
            return false;
        }
    }
    if name.starts_with("mmcblk") || name.starts_with("nvme") {
        return !name.contains('p');
    }
    !name.ends_with(|c: char| c.is_ascii_digit())
}

fn memory() -> (u64, f64) {
    match sys_info::mem_info() {
        Ok(info) => {
            let used_kb = info.total.saturating_sub(info.avail);
            let percent = if info.total > 0 {
                100.0 * used_kb as f64 / info.total as f64
            } else {
                0.0
            };
            (used_kb * 1024, percent)
        }
        Err(_) => (0, 0.0),
    }
}

fn read_cpu_times(path: &std::path::Path) -> Option<(u64, u64)> {
    let raw = fs::read_to_string(path).ok()?;
    let line = raw.lines().next()?;
    let mut columns = line.split_whitespace();
    if columns.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = columns.filter_map(|v| v.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }
    // idle + iowait count as idle time.
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().sum();
    Some((idle, total))
}
