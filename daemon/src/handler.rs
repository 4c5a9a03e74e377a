//! Request dispatch for the daemon

use crate::config::Config;
use crate::engine::QueryEngine;
use crate::error::QueryError;
use crate::model::{DeviceInfo, PerformanceSnapshot, TenantId};
use crate::protocol::{ListDevicesParams, PostMetricsParams, QueryMetricsParams, Request, Response};
use crate::socket::RequestHandler;
use crate::store::sqlite::TenantRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

pub struct DaemonState {
    registry: Arc<TenantRegistry>,
    engine: QueryEngine,
    default_top_k: i64,
}

impl DaemonState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(TenantRegistry::new(config.storage.data_dir.clone()));
        let engine = QueryEngine::new(
            Arc::clone(&registry),
            config.storage.max_connections,
            config.query_timeout(),
        );
        Self { registry, engine, default_top_k: config.query.default_top_k }
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    async fn query_metrics(&self, params: QueryMetricsParams) -> Response {
        let query = params.into_query(self.default_top_k);
        match self.engine.query(&query).await {
            Ok(outcome) => outcome.into(),
            Err(e) => e.into(),
        }
    }

    async fn list_devices(&self, params: ListDevicesParams) -> Response {
        let tenant = match TenantId::parse(&params.tenant_id) {
            Ok(tenant) => tenant,
            Err(e) => return e.into(),
        };
        let registry = Arc::clone(&self.registry);
        let result = tokio::task::spawn_blocking(move || -> Result<Vec<DeviceInfo>, QueryError> {
            let db = registry.open_reader(&tenant)?;
            Ok(db.list_devices()?)
        })
        .await;
        match result {
            Ok(Ok(devices)) => Response::Devices { data: devices },
            Ok(Err(e)) => e.into(),
            Err(e) => Response::error("storage_unavailable", e.to_string()),
        }
    }

    async fn post_metrics(&self, params: PostMetricsParams) -> Response {
        let (tenant, snapshot) = match params.into_snapshot() {
            Ok(parsed) => parsed,
            Err(e) => return e.into(),
        };
        let registry = Arc::clone(&self.registry);
        let result = tokio::task::spawn_blocking(move || ingest(&registry, &tenant, &snapshot))
            .await
            .context("ingest worker failed")
            .and_then(|r| r);
        match result {
            Ok(metric_id) => Response::Ack {
                message: format!("performance data recorded ({})", metric_id),
            },
            Err(e) => {
                error!("Failed to record performance data: {:#}", e);
                Response::error("ingest_failed", format!("{:#}", e))
            }
        }
    }
}

/// Stores one snapshot, provisioning the tenant database when it does not exist yet.
pub fn ingest(
    registry: &TenantRegistry,
    tenant: &TenantId,
    snapshot: &PerformanceSnapshot,
) -> Result<i64> {
    let mut db = registry
        .provision(tenant)
        .with_context(|| format!("failed to open database for tenant {}", tenant))?;
    let metric_id = db
        .insert_snapshot(snapshot)
        .with_context(|| format!("failed to insert snapshot for device {}", snapshot.device.device_id))?;
    info!(
        "Recorded snapshot for tenant {} device {} ({} processes)",
        tenant,
        snapshot.device.device_id,
        snapshot.processes.len()
    );
    Ok(metric_id)
}

#[async_trait::async_trait]
impl RequestHandler for DaemonState {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,
            Request::QueryMetrics { params } => self.query_metrics(params).await,
            Request::ListDevices { params } => self.list_devices(params).await,
            Request::PostMetrics { params } => self.post_metrics(params).await,
        }
    }
}
