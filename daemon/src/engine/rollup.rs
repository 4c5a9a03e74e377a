//! Grouping and averaging of fetched samples

use super::fetcher::FetchedSamples;
use crate::model::{
    DeviceRollup, Metric, MetricValue, ProcessGroup, RollupResult, RollupSample, SampleRecord,
};
use std::collections::HashMap;

struct GroupAccumulator {
    process_name: String,
    pids: Vec<u32>,
    cpu_total: f64,
    ram_total: i64,
    samples: Vec<RollupSample>,
}

impl GroupAccumulator {
    fn new(process_name: &str) -> Self {
        Self {
            process_name: process_name.to_string(),
            pids: Vec::new(),
            cpu_total: 0.0,
            ram_total: 0,
            samples: Vec::new(),
        }
    }

    fn push(&mut self, record: &SampleRecord, metric: Metric) {
        if !self.pids.contains(&record.pid) {
            self.pids.push(record.pid);
        }
        self.cpu_total += record.cpu_usage;
        self.ram_total = self.ram_total.saturating_add(record.ram_usage);
        self.samples.push(RollupSample {
            timestamp: record.timestamp,
            pid: record.pid,
            process_name: record.process_name.clone(),
            command: record.command.clone(),
            value: record.value(metric),
        });
    }

    // Only built from at least one sample, so the count is never zero.
    fn finish(self, metric: Metric) -> ProcessGroup {
        let count = self.samples.len().max(1);
        let mean_value = match metric {
            Metric::Cpu => MetricValue::Cpu(self.cpu_total / count as f64),
            Metric::Ram => MetricValue::Ram(self.ram_total / count as i64),
        };
        ProcessGroup {
            process_name: self.process_name,
            pids: self.pids,
            mean_value,
            samples: self.samples,
        }
    }
}

/// Groups samples by process name and orders groups by mean value, highest first.
/// Groups with equal means stay in order of their first sample.
pub fn group_by_process(samples: &[SampleRecord], metric: Metric) -> Vec<ProcessGroup> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<GroupAccumulator> = Vec::new();

    for record in samples {
        let slot = *index.entry(record.process_name.as_str()).or_insert_with(|| {
            groups.push(GroupAccumulator::new(&record.process_name));
            groups.len() - 1
        });
        groups[slot].push(record, metric);
    }

    let mut finished: Vec<ProcessGroup> = groups.into_iter().map(|g| g.finish(metric)).collect();
    finished.sort_by(|a, b| b.mean_value.total_cmp(&a.mean_value));
    finished
}

pub fn rollup(fetched: FetchedSamples, metric: Metric) -> RollupResult {
    match fetched {
        FetchedSamples::Global(samples) => RollupResult::Global(group_by_process(&samples, metric)),
        FetchedSamples::PerDevice(per_device) => RollupResult::PerDevice(
            per_device
                .into_iter()
                .filter_map(|(device, samples)| {
                    let groups = group_by_process(&samples, metric);
                    if groups.is_empty() {
                        return None;
                    }
                    Some(DeviceRollup {
                        device_id: device.device_id,
                        device_name: device.hostname,
                        groups,
                    })
                })
                .collect(),
        ),
    }
}
