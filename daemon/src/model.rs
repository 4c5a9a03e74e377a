//! Shared data types for ingest, queries and rollups

use crate::error::QueryError;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const MAX_TENANT_ID_LEN: usize = 64;

/// Validated tenant identifier. Restricted to `[A-Za-z0-9_-]` so it can name a database file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(QueryError::InvalidRequest("tenant id is required".to_string()));
        }
        if id.len() > MAX_TENANT_ID_LEN {
            return Err(QueryError::InvalidRequest(format!(
                "tenant id longer than {} characters",
                MAX_TENANT_ID_LEN
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(QueryError::InvalidRequest(format!("malformed tenant id: {:?}", id)));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cpu,
    Ram,
}

impl Metric {
    /// Column of `process_metrics` holding this metric.
    pub fn process_column(self) -> &'static str {
        match self {
            Metric::Cpu => "process_cpu_usage",
            Metric::Ram => "process_ram_usage",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cpu => f.write_str("cpu"),
            Metric::Ram => f.write_str("ram"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingPolicy {
    /// One ranking across all resolved devices.
    Global,
    /// An independent ranking per device.
    PerDevice,
}

impl RankingPolicy {
    pub fn from_per_device(per_device: bool) -> Self {
        if per_device {
            RankingPolicy::PerDevice
        } else {
            RankingPolicy::Global
        }
    }
}

/// Inclusive `[start, end]` range in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvalidRequest(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, QueryError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` (UTC), the same with a `T` separator, or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<i64, QueryError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    Err(QueryError::InvalidRequest(format!("malformed timestamp: {:?}", raw)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub hostname: String,
    pub mac_address: String,
    pub ip_address: String,
}

/// Summed metric for one PID over a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTotal {
    pub pid: u32,
    pub total: MetricValue,
}

/// One process row joined with its parent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub timestamp: i64,
    pub device_id: String,
    pub pid: u32,
    pub process_name: String,
    pub command: String,
    pub cpu_usage: f64,
    pub ram_usage: i64,
}

impl SampleRecord {
    pub fn value(&self, metric: Metric) -> MetricValue {
        match metric {
            Metric::Cpu => MetricValue::Cpu(self.cpu_usage),
            Metric::Ram => MetricValue::Ram(self.ram_usage),
        }
    }
}

/// CPU percentages are fractional, RAM is whole bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Ram(i64),
    Cpu(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Ram(v) => v as f64,
            MetricValue::Cpu(v) => v,
        }
    }

    /// Total order; RAM values compare exactly as integers.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MetricValue::Ram(a), MetricValue::Ram(b)) => a.cmp(b),
            _ => self.as_f64().total_cmp(&other.as_f64()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupSample {
    pub timestamp: i64,
    pub pid: u32,
    pub process_name: String,
    pub command: String,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroup {
    pub process_name: String,
    /// Distinct PIDs seen in this group, in order of first appearance. Stands in for a
    /// per-PID sub-grouping: each sample still carries its own `pid`.
    pub pids: Vec<u32>,
    pub mean_value: MetricValue,
    pub samples: Vec<RollupSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRollup {
    pub device_id: String,
    pub device_name: String,
    pub groups: Vec<ProcessGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "data", rename_all = "snake_case")]
pub enum RollupResult {
    Global(Vec<ProcessGroup>),
    PerDevice(Vec<DeviceRollup>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rollup(RollupResult),
    Empty(EmptyResult),
}

/// One reported snapshot, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSnapshot {
    pub device: DeviceInfo,
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub ram_usage: i64,
    pub disk_usage: Option<i64>,
    pub processes: Vec<ProcessSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub cpu_usage: f64,
    pub ram_usage: i64,
}
