//! Raw sample retrieval for selected processes

use super::ranking::Selection;
use crate::error::QueryError;
use crate::model::{Device, SampleRecord, TimeWindow};
use crate::store::MetricStore;
use std::slice;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchedSamples {
    Global(Vec<SampleRecord>),
    PerDevice(Vec<(Device, Vec<SampleRecord>)>),
}

/// Global selections are fetched in one retrieval over all devices. Per-device selections
/// are fetched one device at a time so each retrieval only names that device's PIDs.
pub fn fetch(
    store: &dyn MetricStore,
    devices: &[Device],
    selection: &Selection,
    window: TimeWindow,
) -> Result<FetchedSamples, QueryError> {
    match selection {
        Selection::Global(pids) => {
            let device_ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();
            let samples = store.fetch_samples(&device_ids, pids, window)?;
            debug!("Fetched {} samples across {} devices", samples.len(), device_ids.len());
            Ok(FetchedSamples::Global(samples))
        }
        Selection::PerDevice(ranked) => {
            let mut fetched = Vec::with_capacity(ranked.len());
            for (device, pids) in ranked {
                let samples =
                    store.fetch_samples(slice::from_ref(&device.device_id), pids, window)?;
                debug!("Fetched {} samples for device {}", samples.len(), device.device_id);
                fetched.push((device.clone(), samples));
            }
            Ok(FetchedSamples::PerDevice(fetched))
        }
    }
}
