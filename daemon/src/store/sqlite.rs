//! SQLite tenant databases, one file per tenant

use super::MetricStore;
use crate::error::QueryError;
use crate::model::{
    Device, DeviceInfo, Metric, MetricValue, PerformanceSnapshot, PidTotal, SampleRecord, TenantId,
    TimeWindow,
};
use rusqlite::types::Value;
use rusqlite::vtab::array::{self, Array};
use rusqlite::{params, Connection, InterruptHandle, OpenFlags, Transaction};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Locates and provisions per-tenant database files under one data directory.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    data_dir: PathBuf,
}

impl TenantRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database_path(&self, tenant: &TenantId) -> PathBuf {
        self.data_dir.join(format!("performance_{}.db", tenant))
    }

    pub fn is_provisioned(&self, tenant: &TenantId) -> bool {
        self.database_path(tenant).is_file()
    }

    /// Read-only handle on an existing tenant database.
    pub fn open_reader(&self, tenant: &TenantId) -> Result<TenantDatabase, QueryError> {
        let path = self.database_path(tenant);
        if !path.is_file() {
            return Err(QueryError::TenantNotFound(tenant.to_string()));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(TenantDatabase::configure(conn)?)
    }

    /// Opens the tenant database for writing, creating file and schema on first use.
    pub fn provision(&self, tenant: &TenantId) -> rusqlite::Result<TenantDatabase> {
        let path = self.database_path(tenant);
        let fresh = !path.exists();
        let db = TenantDatabase::open(&path)?;
        db.init_schema()?;
        if fresh {
            info!("Provisioned database for tenant {} at {:?}", tenant, path);
        }
        Ok(db)
    }
}

pub struct TenantDatabase {
    conn: Connection,
}

impl TenantDatabase {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::configure(Connection::open(path)?)
    }

    // Id lists are bound as one `rarray` parameter, so their length never meets the
    // bound-parameter limit.
    fn configure(conn: Connection) -> rusqlite::Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        array::load_module(&conn)?;
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(include_str!("../../schema.sql"))
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Starts the deferred transaction that gives one query a consistent snapshot.
    pub fn read_transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.transaction()
    }

    /// Records one snapshot: upserts the device, then appends the metric row and its
    /// process rows. Returns the new metric id.
    pub fn insert_snapshot(&mut self, snapshot: &PerformanceSnapshot) -> rusqlite::Result<i64> {
        let tx = self.conn.transaction()?;
        let device = &snapshot.device;
        tx.execute(
            "INSERT INTO devices (device_id, device_hostname, mac_address, ip_address)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_id) DO UPDATE SET
                 device_hostname = excluded.device_hostname,
                 mac_address = excluded.mac_address,
                 ip_address = excluded.ip_address",
            params![device.device_id, device.hostname, device.mac_address, device.ip_address],
        )?;
        tx.execute(
            "INSERT INTO performance_metrics (device_id, timestamp, cpu_usage, ram_usage, disk_usage)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                device.device_id,
                snapshot.timestamp,
                snapshot.cpu_usage,
                snapshot.ram_usage,
                snapshot.disk_usage
            ],
        )?;
        let metric_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO process_metrics
                 (metric_id, process_pid, process_name, process_command, process_cpu_usage, process_ram_usage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for process in &snapshot.processes {
                stmt.execute(params![
                    metric_id,
                    process.pid,
                    process.name,
                    process.command,
                    process.cpu_usage,
                    process.ram_usage
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            "Stored snapshot {} for device {} with {} processes",
            metric_id,
            device.device_id,
            snapshot.processes.len()
        );
        Ok(metric_id)
    }

    pub fn list_devices(&self) -> rusqlite::Result<Vec<DeviceInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT device_id, device_hostname, mac_address, ip_address FROM devices ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DeviceInfo {
                device_id: row.get(0)?,
                hostname: row.get(1)?,
                mac_address: row.get(2)?,
                ip_address: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn store(&self) -> SqliteMetricStore<'_> {
        SqliteMetricStore::new(&self.conn)
    }
}

/// `MetricStore` over a borrowed tenant connection or transaction.
pub struct SqliteMetricStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteMetricStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn map_device(row: &rusqlite::Row) -> rusqlite::Result<Device> {
        Ok(Device { device_id: row.get(0)?, hostname: row.get(1)? })
    }

    fn map_sample(row: &rusqlite::Row) -> rusqlite::Result<SampleRecord> {
        Ok(SampleRecord {
            timestamp: row.get(0)?,
            device_id: row.get(1)?,
            pid: row.get(2)?,
            process_name: row.get(3)?,
            command: row.get(4)?,
            cpu_usage: row.get(5)?,
            ram_usage: row.get(6)?,
        })
    }
}

fn text_array(items: &[String]) -> Array {
    Rc::new(items.iter().cloned().map(Value::from).collect())
}

fn pid_array(pids: &[u32]) -> Array {
    Rc::new(pids.iter().map(|&pid| Value::from(i64::from(pid))).collect())
}

impl MetricStore for SqliteMetricStore<'_> {
    fn resolve_devices(&self, hostnames: &[String]) -> Result<Vec<Device>, QueryError> {
        let devices = if hostnames.is_empty() {
            let mut stmt = self
                .conn
                .prepare("SELECT device_id, TRIM(device_hostname) FROM devices ORDER BY id")?;
            let rows = stmt.query_map([], Self::map_device)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = self.conn.prepare(
                "SELECT device_id, TRIM(device_hostname) FROM devices
                 WHERE TRIM(device_hostname) IN rarray(?1) ORDER BY id",
            )?;
            let rows = stmt.query_map(params![text_array(hostnames)], Self::map_device)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(devices)
    }

    fn sum_metric_by_pid(
        &self,
        device_ids: &[String],
        metric: Metric,
        window: TimeWindow,
    ) -> Result<Vec<PidTotal>, QueryError> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }
        // RAM sums stay integral; TOTAL() would round them through a double.
        let aggregate = match metric {
            Metric::Cpu => format!("TOTAL(psm.{})", metric.process_column()),
            Metric::Ram => format!("COALESCE(SUM(psm.{}), 0)", metric.process_column()),
        };
        let sql = format!(
            "SELECT psm.process_pid, {aggregate}
             FROM performance_metrics pm
             JOIN process_metrics psm ON pm.metric_id = psm.metric_id
             WHERE pm.device_id IN rarray(?1)
               AND pm.timestamp BETWEEN ?2 AND ?3
             GROUP BY psm.process_pid
             ORDER BY MIN(psm.process_metric_id)"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![text_array(device_ids), window.start, window.end],
            |row| {
                let total = match metric {
                    Metric::Cpu => MetricValue::Cpu(row.get(1)?),
                    Metric::Ram => MetricValue::Ram(row.get(1)?),
                };
                Ok(PidTotal { pid: row.get(0)?, total })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn fetch_samples(
        &self,
        device_ids: &[String],
        pids: &[u32],
        window: TimeWindow,
    ) -> Result<Vec<SampleRecord>, QueryError> {
        if device_ids.is_empty() || pids.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT pm.timestamp, pm.device_id, psm.process_pid, psm.process_name,
                    psm.process_command, psm.process_cpu_usage, psm.process_ram_usage
             FROM performance_metrics pm
             JOIN process_metrics psm ON pm.metric_id = psm.metric_id
             WHERE pm.device_id IN rarray(?1)
               AND psm.process_pid IN rarray(?2)
               AND pm.timestamp BETWEEN ?3 AND ?4
             ORDER BY pm.timestamp, psm.process_metric_id",
        )?;
        let rows = stmt.query_map(
            params![text_array(device_ids), pid_array(pids), window.start, window.end],
            Self::map_sample,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
