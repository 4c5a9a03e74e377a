//! Device resolution

use crate::error::QueryError;
use crate::model::Device;
use crate::store::MetricStore;
use std::collections::HashSet;
use tracing::debug;

/// Trims requested hostnames and drops blanks and repeats, keeping request order.
pub fn normalize_hostnames(requested: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    requested
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Resolves requested hostnames to devices. Names without a match are dropped; an empty
/// request resolves to every device of the tenant.
pub fn resolve_devices(
    store: &dyn MetricStore,
    requested: &[String],
) -> Result<Vec<Device>, QueryError> {
    let hostnames = normalize_hostnames(requested);
    let devices = store.resolve_devices(&hostnames)?;
    if devices.is_empty() {
        return Err(QueryError::NoDevicesResolved);
    }
    debug!("Resolved {} of {} requested devices", devices.len(), hostnames.len());
    Ok(devices)
}
