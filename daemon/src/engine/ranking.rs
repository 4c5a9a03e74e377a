//! Top-K process selection

use crate::error::QueryError;
use crate::model::{Device, Metric, PidTotal, RankingPolicy, TimeWindow};
use crate::store::MetricStore;
use std::slice;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Global(Vec<u32>),
    /// Devices in resolver order; devices with nothing in the window are left out.
    PerDevice(Vec<(Device, Vec<u32>)>),
}

impl Selection {
    pub fn pid_count(&self) -> usize {
        match self {
            Selection::Global(pids) => pids.len(),
            Selection::PerDevice(ranked) => ranked.iter().map(|(_, pids)| pids.len()).sum(),
        }
    }
}

/// Orders totals by value descending and keeps the first `k`. `k <= 0` keeps everything.
///
/// The sort is stable, so equal totals keep the order the store reported them in.
pub fn top_k(mut totals: Vec<PidTotal>, k: i64) -> Vec<u32> {
    totals.sort_by(|a, b| b.total.total_cmp(&a.total));
    let mut pids: Vec<u32> = totals.into_iter().map(|t| t.pid).collect();
    if k > 0 {
        pids.truncate(usize::try_from(k).unwrap_or(usize::MAX));
    }
    pids
}

pub fn select(
    store: &dyn MetricStore,
    devices: &[Device],
    metric: Metric,
    window: TimeWindow,
    k: i64,
    policy: RankingPolicy,
) -> Result<Selection, QueryError> {
    let selection = match policy {
        RankingPolicy::Global => {
            let device_ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();
            let totals = store.sum_metric_by_pid(&device_ids, metric, window)?;
            Selection::Global(top_k(totals, k))
        }
        RankingPolicy::PerDevice => {
            let mut ranked = Vec::with_capacity(devices.len());
            for device in devices {
                let totals =
                    store.sum_metric_by_pid(slice::from_ref(&device.device_id), metric, window)?;
                let pids = top_k(totals, k);
                if !pids.is_empty() {
                    ranked.push((device.clone(), pids));
                }
            }
            Selection::PerDevice(ranked)
        }
    };

    if selection.pid_count() == 0 {
        return Err(QueryError::NoProcessesInWindow);
    }
    debug!("Selected {} processes by {}", selection.pid_count(), metric);
    Ok(selection)
}
