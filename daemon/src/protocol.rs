//! IPC protocol definitions (JSON messages)

use crate::engine::MetricsQuery;
use crate::error::QueryError;
use crate::model::{
    parse_timestamp, DeviceInfo, Metric, PerformanceSnapshot, ProcessSnapshot, QueryOutcome,
    RollupResult, TenantId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    QueryMetrics { params: QueryMetricsParams },
    ListDevices { params: ListDevicesParams },
    PostMetrics { params: PostMetricsParams },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetricsParams {
    pub tenant_id: String,
    pub query: QueryParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub number_of_processes: Option<i64>,
    #[serde(default)]
    pub devices: Vec<String>,
    pub time_range: TimeRange,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub per_device: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl QueryMetricsParams {
    pub fn into_query(self, default_top_k: i64) -> MetricsQuery {
        MetricsQuery {
            tenant_id: self.tenant_id,
            devices: self.query.devices,
            metric: self.query.metric,
            start: self.query.time_range.start,
            end: self.query.time_range.end,
            top_k: self.query.number_of_processes.unwrap_or(default_top_k),
            per_device: self.query.per_device,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDevicesParams {
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMetricsParams {
    pub total_consumption: TotalConsumption,
    pub machine_properties: MachineProperties,
    #[serde(default)]
    pub process_info: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalConsumption {
    pub total_cpu: f64,
    #[serde(default)]
    pub total_memory: i64,
    pub used_memory: i64,
    #[serde(default)]
    pub used_memory_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_usage: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineProperties {
    pub device_id: String,
    pub tenant_id: String,
    pub device_name: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub ip_address: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    #[serde(default)]
    pub command: String,
    pub cpu_usage: f64,
    pub mem_usage: i64,
}

impl PostMetricsParams {
    pub fn into_snapshot(self) -> Result<(TenantId, PerformanceSnapshot), QueryError> {
        let props = self.machine_properties;
        let tenant = TenantId::parse(&props.tenant_id)?;
        let device_id = props.device_id.trim().to_string();
        if device_id.is_empty() {
            return Err(QueryError::InvalidRequest("device id is required".to_string()));
        }
        let timestamp = parse_timestamp(&props.timestamp)?;
        let snapshot = PerformanceSnapshot {
            device: DeviceInfo {
                device_id,
                hostname: props.device_name,
                mac_address: props.mac_address,
                ip_address: props.ip_address,
            },
            timestamp,
            cpu_usage: self.total_consumption.total_cpu,
            ram_usage: self.total_consumption.used_memory,
            disk_usage: self.total_consumption.disk_usage,
            processes: self
                .process_info
                .into_iter()
                .map(|p| ProcessSnapshot {
                    pid: p.pid,
                    name: p.name,
                    command: p.command,
                    cpu_usage: p.cpu_usage,
                    ram_usage: p.mem_usage,
                })
                .collect(),
        };
        Ok((tenant, snapshot))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Rollup { data: RollupResult },
    Empty { message: String },
    Devices { data: Vec<DeviceInfo> },
    Ack { message: String },
    Error { kind: String, message: String },
}

impl Response {
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Response::Error { kind: kind.to_string(), message: message.into() }
    }
}

impl From<QueryOutcome> for Response {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Rollup(data) => Response::Rollup { data },
            QueryOutcome::Empty(empty) => Response::Empty { message: empty.message },
        }
    }
}

impl From<QueryError> for Response {
    fn from(e: QueryError) -> Self {
        Response::error(e.kind(), e.to_string())
    }
}
