#![allow(dead_code)]

use std::collections::HashMap;
use tempfile::TempDir;
use vigilante_daemon::error::QueryError;
use vigilante_daemon::handler::ingest;
use vigilante_daemon::model::{
    parse_timestamp, Device, DeviceInfo, Metric, MetricValue, PerformanceSnapshot, PidTotal,
    ProcessSnapshot, SampleRecord, TenantId, TimeWindow,
};
use vigilante_daemon::store::sqlite::TenantRegistry;
use vigilante_daemon::store::MetricStore;

pub const WINDOW_START: &str = "2024-01-01 10:00:00";
pub const WINDOW_END: &str = "2024-01-01 10:05:00";

pub fn ts(raw: &str) -> i64 {
    parse_timestamp(raw).unwrap()
}

pub fn window() -> TimeWindow {
    TimeWindow::parse(WINDOW_START, WINDOW_END).unwrap()
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

pub fn process(pid: u32, name: &str, cpu: f64, ram: i64) -> ProcessSnapshot {
    ProcessSnapshot {
        pid,
        name: name.to_string(),
        command: format!("/usr/bin/{}", name),
        cpu_usage: cpu,
        ram_usage: ram,
    }
}

pub fn snapshot(
    device_id: &str,
    hostname: &str,
    at: &str,
    processes: Vec<ProcessSnapshot>,
) -> PerformanceSnapshot {
    PerformanceSnapshot {
        device: DeviceInfo {
            device_id: device_id.to_string(),
            hostname: hostname.to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            ip_address: "10.0.0.1".to_string(),
        },
        timestamp: ts(at),
        cpu_usage: processes.iter().map(|p| p.cpu_usage).sum(),
        ram_usage: processes.iter().map(|p| p.ram_usage).sum(),
        disk_usage: None,
        processes,
    }
}

/// Tenant `T1`: `alpha` (A) runs chrome at 10 and 20 CPU plus bash at 5, ` beta ` (B) runs
/// chrome at 30 under the same PID, `gamma` (C) only reported before the window.
/// Tenant `T2` has its own `alpha` with a much busier process.
pub fn fleet_snapshots() -> Vec<(&'static str, PerformanceSnapshot)> {
    vec![
        (
            "T1",
            snapshot(
                "A",
                "alpha",
                "2024-01-01 10:00:00",
                vec![process(100, "chrome", 10.0, 1000), process(200, "bash", 5.0, 300)],
            ),
        ),
        ("T1", snapshot("A", "alpha", "2024-01-01 10:01:00", vec![process(100, "chrome", 20.0, 2001)])),
        ("T1", snapshot("B", " beta ", "2024-01-01 10:02:00", vec![process(100, "chrome", 30.0, 4000)])),
        ("T1", snapshot("C", "gamma", "2024-01-01 09:00:00", vec![process(300, "java", 90.0, 9000)])),
        ("T2", snapshot("Z", "alpha", "2024-01-01 10:01:00", vec![process(100, "miner", 99.0, 99999)])),
    ]
}

/// Data directory with every fleet snapshot ingested.
pub fn seeded_registry() -> (TempDir, TenantRegistry) {
    let dir = TempDir::new().unwrap();
    let registry = TenantRegistry::new(dir.path().join("tenants"));
    for (tenant_id, snap) in fleet_snapshots() {
        ingest(&registry, &tenant(tenant_id), &snap).unwrap();
    }
    (dir, registry)
}

/// Tenant `T1` with one snapshot of `count` distinct processes on `alpha`.
pub fn crowded_registry(count: u32) -> (TempDir, TenantRegistry) {
    let dir = TempDir::new().unwrap();
    let registry = TenantRegistry::new(dir.path().join("tenants"));
    let processes = (1..=count)
        .map(|pid| process(pid, &format!("worker-{}", pid), f64::from(pid % 100), i64::from(pid)))
        .collect();
    ingest(&registry, &tenant("T1"), &snapshot("A", "alpha", WINDOW_START, processes)).unwrap();
    (dir, registry)
}

pub fn sample(at: &str, device: &str, pid: u32, name: &str, cpu: f64, ram: i64) -> SampleRecord {
    SampleRecord {
        timestamp: ts(at),
        device_id: device.to_string(),
        pid,
        process_name: name.to_string(),
        command: format!("/usr/bin/{}", name),
        cpu_usage: cpu,
        ram_usage: ram,
    }
}

/// In-memory store holding rows in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    pub devices: Vec<Device>,
    pub samples: Vec<SampleRecord>,
}

impl MemoryStore {
    pub fn with_devices(devices: &[(&str, &str)]) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|(id, host)| Device { device_id: id.to_string(), hostname: host.to_string() })
                .collect(),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: SampleRecord) -> &mut Self {
        self.samples.push(sample);
        self
    }

    fn in_scope<'a>(
        &'a self,
        device_ids: &'a [String],
        window: TimeWindow,
    ) -> impl Iterator<Item = &'a SampleRecord> + 'a {
        self.samples
            .iter()
            .filter(move |s| device_ids.contains(&s.device_id) && window.contains(s.timestamp))
    }
}

impl MetricStore for MemoryStore {
    fn resolve_devices(&self, hostnames: &[String]) -> Result<Vec<Device>, QueryError> {
        Ok(self
            .devices
            .iter()
            .filter(|d| hostnames.is_empty() || hostnames.iter().any(|h| h == d.hostname.trim()))
            .cloned()
            .collect())
    }

    fn sum_metric_by_pid(
        &self,
        device_ids: &[String],
        metric: Metric,
        window: TimeWindow,
    ) -> Result<Vec<PidTotal>, QueryError> {
        let mut index: HashMap<u32, usize> = HashMap::new();
        let mut totals: Vec<PidTotal> = Vec::new();
        for s in self.in_scope(device_ids, window) {
            let slot = *index.entry(s.pid).or_insert_with(|| {
                let zero = match metric {
                    Metric::Cpu => MetricValue::Cpu(0.0),
                    Metric::Ram => MetricValue::Ram(0),
                };
                totals.push(PidTotal { pid: s.pid, total: zero });
                totals.len() - 1
            });
            totals[slot].total = match (totals[slot].total, s.value(metric)) {
                (MetricValue::Ram(a), MetricValue::Ram(b)) => MetricValue::Ram(a + b),
                (a, b) => MetricValue::Cpu(a.as_f64() + b.as_f64()),
            };
        }
        Ok(totals)
    }

    fn fetch_samples(
        &self,
        device_ids: &[String],
        pids: &[u32],
        window: TimeWindow,
    ) -> Result<Vec<SampleRecord>, QueryError> {
        let mut rows: Vec<SampleRecord> = self
            .in_scope(device_ids, window)
            .filter(|s| pids.contains(&s.pid))
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }
}

/// Store whose retrievals always fail after device resolution.
pub struct FailingStore {
    pub devices: Vec<Device>,
}

impl MetricStore for FailingStore {
    fn resolve_devices(&self, _hostnames: &[String]) -> Result<Vec<Device>, QueryError> {
        Ok(self.devices.clone())
    }

    fn sum_metric_by_pid(
        &self,
        _device_ids: &[String],
        _metric: Metric,
        _window: TimeWindow,
    ) -> Result<Vec<PidTotal>, QueryError> {
        Err(QueryError::StorageUnavailable("disk I/O error".to_string()))
    }

    fn fetch_samples(
        &self,
        _device_ids: &[String],
        _pids: &[u32],
        _window: TimeWindow,
    ) -> Result<Vec<SampleRecord>, QueryError> {
        Err(QueryError::StorageUnavailable("disk I/O error".to_string()))
    }
}
