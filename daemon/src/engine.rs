//! Top-K process rollup engine
//!
//! A query runs four stages against one tenant store: resolve devices, rank processes,
//! fetch their samples, aggregate them into groups. Each invocation opens its own
//! read-only connection and runs every stage inside one read transaction.

pub mod fetcher;
pub mod ranking;
pub mod resolver;
pub mod rollup;

use crate::error::QueryError;
use crate::model::{
    EmptyResult, Metric, QueryOutcome, RankingPolicy, RollupResult, TenantId, TimeWindow,
};
use crate::store::sqlite::{SqliteMetricStore, TenantDatabase, TenantRegistry};
use crate::store::MetricStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Query as received from the request layer, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub tenant_id: String,
    #[serde(default)]
    pub devices: Vec<String>,
    pub metric: Metric,
    pub start: String,
    pub end: String,
    pub top_k: i64,
    #[serde(default)]
    pub per_device: bool,
}

impl MetricsQuery {
    pub fn validate(&self) -> Result<ValidatedQuery, QueryError> {
        Ok(ValidatedQuery {
            tenant: TenantId::parse(&self.tenant_id)?,
            hostnames: self.devices.clone(),
            metric: self.metric,
            window: TimeWindow::parse(&self.start, &self.end)?,
            top_k: self.top_k,
            policy: RankingPolicy::from_per_device(self.per_device),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub tenant: TenantId,
    pub hostnames: Vec<String>,
    pub metric: Metric,
    pub window: TimeWindow,
    pub top_k: i64,
    pub policy: RankingPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Idle,
    ResolvingDevices,
    Ranking,
    Fetching,
    Aggregating,
    Done,
    EmptyResult,
    Failed,
}

impl QueryStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryStage::Done | QueryStage::EmptyResult | QueryStage::Failed)
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStage::Idle => "idle",
            QueryStage::ResolvingDevices => "resolving_devices",
            QueryStage::Ranking => "ranking",
            QueryStage::Fetching => "fetching",
            QueryStage::Aggregating => "aggregating",
            QueryStage::Done => "done",
            QueryStage::EmptyResult => "empty_result",
            QueryStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Follows one query through its stages and decides how it ends.
pub struct StageTracker {
    tenant: String,
    stage: QueryStage,
}

impl StageTracker {
    pub fn new(tenant: &str) -> Self {
        Self { tenant: tenant.to_string(), stage: QueryStage::Idle }
    }

    pub fn stage(&self) -> QueryStage {
        self.stage
    }

    fn advance(&mut self, next: QueryStage) {
        debug!("Query for tenant {}: {} -> {}", self.tenant, self.stage, next);
        self.stage = next;
    }

    /// Turns the informational failures into an empty result; everything else fails the query.
    pub fn settle(
        mut self,
        result: Result<RollupResult, QueryError>,
    ) -> Result<QueryOutcome, QueryError> {
        match result {
            Ok(rollup) => {
                self.advance(QueryStage::Done);
                Ok(QueryOutcome::Rollup(rollup))
            }
            Err(e) => match e.empty_message() {
                Some(message) => {
                    info!("Query for tenant {} ended at {}: {}", self.tenant, self.stage, e);
                    self.advance(QueryStage::EmptyResult);
                    Ok(QueryOutcome::Empty(EmptyResult { message: message.to_string() }))
                }
                None => {
                    warn!("Query for tenant {} failed at {}: {}", self.tenant, self.stage, e);
                    self.advance(QueryStage::Failed);
                    Err(e)
                }
            },
        }
    }
}

fn run_stages(
    store: &dyn MetricStore,
    query: &ValidatedQuery,
    tracker: &mut StageTracker,
) -> Result<RollupResult, QueryError> {
    tracker.advance(QueryStage::ResolvingDevices);
    let devices = resolver::resolve_devices(store, &query.hostnames)?;

    tracker.advance(QueryStage::Ranking);
    let selection = ranking::select(
        store,
        &devices,
        query.metric,
        query.window,
        query.top_k,
        query.policy,
    )?;

    tracker.advance(QueryStage::Fetching);
    let fetched = fetcher::fetch(store, &devices, &selection, query.window)?;

    tracker.advance(QueryStage::Aggregating);
    Ok(rollup::rollup(fetched, query.metric))
}

/// Runs every stage against `store` and settles the outcome.
pub fn run_pipeline(
    store: &dyn MetricStore,
    query: &ValidatedQuery,
) -> Result<QueryOutcome, QueryError> {
    let mut tracker = StageTracker::new(query.tenant.as_str());
    let result = run_stages(store, query, &mut tracker);
    tracker.settle(result)
}

pub struct QueryEngine {
    registry: Arc<TenantRegistry>,
    connections: Arc<Semaphore>,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(registry: Arc<TenantRegistry>, max_connections: usize, timeout: Duration) -> Self {
        Self {
            registry,
            connections: Arc::new(Semaphore::new(max_connections.max(1))),
            timeout,
        }
    }

    pub async fn query(&self, request: &MetricsQuery) -> Result<QueryOutcome, QueryError> {
        let query = request.validate().map_err(|e| {
            warn!("Rejected query: {}", e);
            e
        })?;
        let started = Instant::now();
        let tenant = query.tenant.clone();
        let outcome = self.execute(query).await;
        debug!("Query for tenant {} finished in {:?}", tenant, started.elapsed());
        outcome
    }

    /// Permit acquisition, the open and every stage share one deadline. The permit travels
    /// with the blocking worker and is released only after its connection is closed.
    async fn execute(&self, query: ValidatedQuery) -> Result<QueryOutcome, QueryError> {
        let deadline = Instant::now() + self.timeout;

        let permit = match tokio::time::timeout_at(
            deadline.into(),
            Arc::clone(&self.connections).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(QueryError::StorageUnavailable(
                    "connection limiter closed".to_string(),
                ))
            }
            Err(_) => {
                warn!("Query waited {:?} for a connection", self.timeout);
                return Err(QueryError::Timeout(self.timeout));
            }
        };

        let mut db = match self.registry.open_reader(&query.tenant) {
            Ok(db) => db,
            Err(e) => return StageTracker::new(query.tenant.as_str()).settle(Err(e)),
        };
        let interrupt = db.interrupt_handle();

        let task = tokio::task::spawn_blocking(move || -> Result<QueryOutcome, QueryError> {
            let outcome = read_snapshot(&mut db, &query);
            drop(db);
            drop(permit);
            outcome
        });

        match tokio::time::timeout_at(deadline.into(), task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(QueryError::StorageUnavailable(format!("query worker failed: {}", e))),
            Err(_) => {
                interrupt.interrupt();
                warn!("Query exceeded {:?}, interrupted", self.timeout);
                Err(QueryError::Timeout(self.timeout))
            }
        }
    }

    /// Permits not held by a running query.
    pub fn available_connections(&self) -> usize {
        self.connections.available_permits()
    }
}

fn read_snapshot(db: &mut TenantDatabase, query: &ValidatedQuery) -> Result<QueryOutcome, QueryError> {
    let tx = db.read_transaction()?;
    let outcome = run_pipeline(&SqliteMetricStore::new(&tx), query);
    tx.commit()?;
    outcome
}
