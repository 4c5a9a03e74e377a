//! Tenant-scoped metric storage

pub mod sqlite;

use crate::error::QueryError;
use crate::model::{Device, Metric, PidTotal, SampleRecord, TimeWindow};

/// Read-only view of one tenant's metric history.
///
/// Every implementation is bound to a single tenant at construction, so no method can
/// reach another tenant's rows.
pub trait MetricStore {
    /// Devices whose trimmed hostname is in `hostnames`, or every device when `hostnames`
    /// is empty. Ordered by device registration.
    fn resolve_devices(&self, hostnames: &[String]) -> Result<Vec<Device>, QueryError>;

    /// Sum of `metric` per PID over samples of `device_ids` inside `window`, ordered by
    /// the first process row contributing to each PID.
    fn sum_metric_by_pid(
        &self,
        device_ids: &[String],
        metric: Metric,
        window: TimeWindow,
    ) -> Result<Vec<PidTotal>, QueryError>;

    /// Process rows of `device_ids` with a PID in `pids` inside `window`, ordered by
    /// timestamp then insertion.
    fn fetch_samples(
        &self,
        device_ids: &[String],
        pids: &[u32],
        window: TimeWindow,
    ) -> Result<Vec<SampleRecord>, QueryError>;
}
