//! SQLite record store implementation
//!
//! This module provides a SQLite-based implementation of the `RecordStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Encoding
//!
//! - timestamps: Unix milliseconds (`INTEGER`)
//! - status-like enums: their integer codes
//! - flap history and sensor params: JSON text
//!
//! ## Limitations
//!
//! - **Concurrency**: Limited concurrent writes
//! - **Distributed**: Single-machine only

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{DowntimeFilter, EventQuery, HealthStatus, RecordStore};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Acknowledgement, AcknowledgementId, CheckMode, DowntimeId, Event, EventId, EventPatch,
    EventStatus, Host, HostId, HostKind, ItemKind, ItemRef, ScheduledDowntime, Service,
    ServiceId, ServiceStatus, ServiceTemplate, Significance, TemplateId,
};
use crate::monitors::flapping::FlapHistory;

const EVENT_COLUMNS: &str =
    "id, service_id, name, significance, status, date, content, correlation_id, provider";

const SERVICE_COLUMNS: &str = "id, host_id, template_id, name, status, is_hard_status, status_since, \
     is_flapping, is_active, flap_state_cache, current_check, last_check, suppress_informational";

/// SQLite record store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use siem_monitoring::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./siem.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
    }

    fn opt_millis_to_timestamp(millis: Option<i64>) -> Option<DateTime<Utc>> {
        millis.map(Self::millis_to_timestamp)
    }

    fn corrupt(table: &'static str, message: impl Into<String>) -> StorageError {
        StorageError::CorruptRecord {
            table,
            message: message.into(),
        }
    }

    fn host_from_row(row: &SqliteRow) -> StorageResult<Host> {
        let kind: String = row.try_get("kind")?;
        Ok(Host {
            id: row.try_get("id")?,
            kind: HostKind::parse(&kind)
                .ok_or_else(|| Self::corrupt("hosts", format!("unknown host kind {kind}")))?,
            item_id: row.try_get("item_id")?,
            name: row.try_get("name")?,
            availability_service: row.try_get("availability_service")?,
            is_reachable: row.try_get("is_reachable")?,
            date_creation: Self::millis_to_timestamp(row.try_get("date_creation")?),
        })
    }

    fn template_from_row(row: &SqliteRow) -> StorageResult<ServiceTemplate> {
        let check_mode: i64 = row.try_get("check_mode")?;
        let sensor_params: Option<String> = row.try_get("sensor_params")?;
        Ok(ServiceTemplate {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            comment: row.try_get("comment")?,
            priority: row.try_get::<i64, _>("priority")? as u8,
            calendar_id: row.try_get("calendar_id")?,
            notification_interval: row
                .try_get::<Option<i64>, _>("notification_interval")?
                .map(|v| v as u32),
            check_interval: row
                .try_get::<Option<i64>, _>("check_interval")?
                .map(|v| v as u32),
            use_flap_detection: row.try_get("use_flap_detection")?,
            check_mode: CheckMode::from_code(check_mode).ok_or_else(|| {
                Self::corrupt("service_templates", format!("unknown check mode {check_mode}"))
            })?,
            flap_threshold_low: row.try_get::<i64, _>("flap_threshold_low")? as u8,
            flap_threshold_high: row.try_get::<i64, _>("flap_threshold_high")? as u8,
            max_checks: row.try_get::<i64, _>("max_checks")? as u32,
            provider: row.try_get("provider")?,
            sensor: row.try_get("sensor")?,
            sensor_params: sensor_params
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
            is_stateless: row.try_get("is_stateless")?,
        })
    }

    fn service_from_row(row: &SqliteRow) -> StorageResult<Service> {
        let status: i64 = row.try_get("status")?;
        let flap_cache: Option<String> = row.try_get("flap_state_cache")?;
        // A missing or unreadable cache is reset rather than failing the load
        let flap_state_cache = flap_cache
            .and_then(|raw| serde_json::from_str::<Vec<u8>>(&raw).ok())
            .map(FlapHistory::from)
            .unwrap_or_default();

        Ok(Service {
            id: row.try_get("id")?,
            host_id: row.try_get("host_id")?,
            template_id: row.try_get("template_id")?,
            name: row.try_get("name")?,
            status: ServiceStatus::from_code(status)
                .ok_or_else(|| Self::corrupt("services", format!("unknown status {status}")))?,
            is_hard_status: row.try_get("is_hard_status")?,
            status_since: Self::opt_millis_to_timestamp(row.try_get("status_since")?),
            is_flapping: row.try_get("is_flapping")?,
            is_active: row.try_get("is_active")?,
            flap_state_cache,
            current_check: row.try_get::<i64, _>("current_check")? as u32,
            last_check: Self::opt_millis_to_timestamp(row.try_get("last_check")?),
            suppress_informational: row.try_get("suppress_informational")?,
        })
    }

    fn event_from_row(row: &SqliteRow) -> StorageResult<Event> {
        let significance: i64 = row.try_get("significance")?;
        let status: i64 = row.try_get("status")?;
        Ok(Event {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            name: row.try_get("name")?,
            significance: Significance::from_code(significance).ok_or_else(|| {
                Self::corrupt("events", format!("unknown significance {significance}"))
            })?,
            status: EventStatus::from_code(status)
                .ok_or_else(|| Self::corrupt("events", format!("unknown status {status}")))?,
            date: Self::millis_to_timestamp(row.try_get("date")?),
            content: row.try_get("content")?,
            correlation_id: row.try_get("correlation_id")?,
            provider: row.try_get("provider")?,
        })
    }

    fn item_ref(is_service: bool, id: i64) -> ItemRef {
        if is_service {
            ItemRef::service(id)
        } else {
            ItemRef::host(id)
        }
    }

    fn downtime_from_row(row: &SqliteRow) -> StorageResult<ScheduledDowntime> {
        Ok(ScheduledDowntime {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            comment: row.try_get("comment")?,
            target: Self::item_ref(row.try_get("is_service")?, row.try_get("target_id")?),
            is_fixed: row.try_get("is_fixed")?,
            begin: Self::millis_to_timestamp(row.try_get("begin_date")?),
            end: Self::millis_to_timestamp(row.try_get("end_date")?),
            is_cancelled: row.try_get("is_cancelled")?,
        })
    }

    fn acknowledgement_from_row(row: &SqliteRow) -> StorageResult<Acknowledgement> {
        Ok(Acknowledgement {
            id: row.try_get("id")?,
            target: Self::item_ref(row.try_get("is_service")?, row.try_get("target_id")?),
            status: row.try_get("status")?,
            user: row.try_get("user")?,
            comment: row.try_get("comment")?,
            is_sticky: row.try_get("is_sticky")?,
            created_at: Self::millis_to_timestamp(row.try_get("date_creation")?),
            expires_at: Self::opt_millis_to_timestamp(row.try_get("date_expiration")?),
        })
    }

    /// Appends the `WHERE` clause of an event query
    fn push_event_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &EventQuery) {
        builder.push(" WHERE 1 = 1");

        match &query.service_ids {
            Some(ids) if ids.is_empty() => {
                builder.push(" AND 0 = 1");
            }
            Some(ids) => {
                builder.push(" AND service_id IN (");
                let mut separated = builder.separated(", ");
                for id in ids {
                    separated.push_bind(*id);
                }
                separated.push_unseparated(")");
            }
            None => {}
        }
        if let Some(correlation_id) = &query.correlation_id {
            builder.push(" AND correlation_id = ");
            builder.push_bind(correlation_id.clone());
        }
        if let Some(exclude_id) = query.exclude_id {
            builder.push(" AND id != ");
            builder.push_bind(exclude_id);
        }
        if let Some(before) = query.before {
            builder.push(" AND date < ");
            builder.push_bind(Self::timestamp_to_millis(&before));
        }
    }

    fn ensure_updated(rows: u64, kind: &'static str, id: i64) -> StorageResult<()> {
        if rows == 0 {
            return Err(StorageError::NotFound { kind, id });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    #[instrument(skip(self, host), fields(name = %host.name))]
    async fn insert_host(&self, mut host: Host) -> StorageResult<Host> {
        let result = sqlx::query(
            r#"
            INSERT INTO hosts (kind, item_id, name, availability_service, is_reachable, date_creation)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(host.kind.as_str())
        .bind(host.item_id)
        .bind(&host.name)
        .bind(host.availability_service)
        .bind(host.is_reachable)
        .bind(Self::timestamp_to_millis(&host.date_creation))
        .execute(&self.pool)
        .await?;

        host.id = result.last_insert_rowid();
        Ok(host)
    }

    async fn get_host(&self, id: HostId) -> StorageResult<Option<Host>> {
        sqlx::query("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::host_from_row)
            .transpose()
    }

    async fn update_host(&self, host: &Host) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE hosts
            SET kind = ?, item_id = ?, name = ?, availability_service = ?, is_reachable = ?
            WHERE id = ?
            "#,
        )
        .bind(host.kind.as_str())
        .bind(host.item_id)
        .bind(&host.name)
        .bind(host.availability_service)
        .bind(host.is_reachable)
        .bind(host.id)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), "host", host.id)
    }

    #[instrument(skip(self))]
    async fn delete_host(&self, id: HostId) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM events WHERE service_id IN (SELECT id FROM services WHERE host_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        for table in ["scheduled_downtimes", "acknowledgements"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE (is_service = 0 AND target_id = ?) \
                 OR (is_service = 1 AND target_id IN (SELECT id FROM services WHERE host_id = ?))"
            ))
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM services WHERE host_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM hosts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        sqlx::query("SELECT * FROM hosts ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::host_from_row)
            .collect()
    }

    async fn insert_template(&self, mut template: ServiceTemplate) -> StorageResult<ServiceTemplate> {
        let sensor_params = template
            .sensor_params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO service_templates (
                name, comment, priority, calendar_id, notification_interval, check_interval,
                use_flap_detection, check_mode, flap_threshold_low, flap_threshold_high,
                max_checks, provider, sensor, sensor_params, is_stateless
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.name)
        .bind(&template.comment)
        .bind(template.priority as i64)
        .bind(template.calendar_id)
        .bind(template.notification_interval.map(|v| v as i64))
        .bind(template.check_interval.map(|v| v as i64))
        .bind(template.use_flap_detection)
        .bind(template.check_mode.code())
        .bind(template.flap_threshold_low as i64)
        .bind(template.flap_threshold_high as i64)
        .bind(template.max_checks as i64)
        .bind(&template.provider)
        .bind(&template.sensor)
        .bind(sensor_params)
        .bind(template.is_stateless)
        .execute(&self.pool)
        .await?;

        template.id = result.last_insert_rowid();
        Ok(template)
    }

    async fn get_template(&self, id: TemplateId) -> StorageResult<Option<ServiceTemplate>> {
        sqlx::query("SELECT * FROM service_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::template_from_row)
            .transpose()
    }

    async fn update_template(&self, template: &ServiceTemplate) -> StorageResult<()> {
        let sensor_params = template
            .sensor_params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE service_templates
            SET name = ?, comment = ?, priority = ?, calendar_id = ?, notification_interval = ?,
                check_interval = ?, use_flap_detection = ?, check_mode = ?,
                flap_threshold_low = ?, flap_threshold_high = ?, max_checks = ?,
                provider = ?, sensor = ?, sensor_params = ?, is_stateless = ?
            WHERE id = ?
            "#,
        )
        .bind(&template.name)
        .bind(&template.comment)
        .bind(template.priority as i64)
        .bind(template.calendar_id)
        .bind(template.notification_interval.map(|v| v as i64))
        .bind(template.check_interval.map(|v| v as i64))
        .bind(template.use_flap_detection)
        .bind(template.check_mode.code())
        .bind(template.flap_threshold_low as i64)
        .bind(template.flap_threshold_high as i64)
        .bind(template.max_checks as i64)
        .bind(&template.provider)
        .bind(&template.sensor)
        .bind(sensor_params)
        .bind(template.is_stateless)
        .bind(template.id)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), "template", template.id)
    }

    async fn list_templates(&self) -> StorageResult<Vec<ServiceTemplate>> {
        sqlx::query("SELECT * FROM service_templates ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::template_from_row)
            .collect()
    }

    async fn insert_service(&self, mut service: Service) -> StorageResult<Service> {
        let flap_cache = serde_json::to_string(&service.flap_state_cache)?;

        let result = sqlx::query(
            r#"
            INSERT INTO services (
                host_id, template_id, name, status, is_hard_status, status_since, is_flapping,
                is_active, flap_state_cache, current_check, last_check, suppress_informational
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service.host_id)
        .bind(service.template_id)
        .bind(&service.name)
        .bind(service.status.code())
        .bind(service.is_hard_status)
        .bind(service.status_since.as_ref().map(Self::timestamp_to_millis))
        .bind(service.is_flapping)
        .bind(service.is_active)
        .bind(flap_cache)
        .bind(service.current_check as i64)
        .bind(service.last_check.as_ref().map(Self::timestamp_to_millis))
        .bind(service.suppress_informational)
        .execute(&self.pool)
        .await?;

        service.id = result.last_insert_rowid();
        Ok(service)
    }

    async fn get_service(&self, id: ServiceId) -> StorageResult<Option<Service>> {
        sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::service_from_row)
            .transpose()
    }

    #[instrument(skip(self, service), fields(service_id = service.id))]
    async fn update_service(&self, service: &Service) -> StorageResult<()> {
        let flap_cache = serde_json::to_string(&service.flap_state_cache)?;

        let result = sqlx::query(
            r#"
            UPDATE services
            SET host_id = ?, template_id = ?, name = ?, status = ?, is_hard_status = ?,
                status_since = ?, is_flapping = ?, is_active = ?, flap_state_cache = ?,
                current_check = ?, last_check = ?, suppress_informational = ?
            WHERE id = ?
            "#,
        )
        .bind(service.host_id)
        .bind(service.template_id)
        .bind(&service.name)
        .bind(service.status.code())
        .bind(service.is_hard_status)
        .bind(service.status_since.as_ref().map(Self::timestamp_to_millis))
        .bind(service.is_flapping)
        .bind(service.is_active)
        .bind(flap_cache)
        .bind(service.current_check as i64)
        .bind(service.last_check.as_ref().map(Self::timestamp_to_millis))
        .bind(service.suppress_informational)
        .bind(service.id)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), "service", service.id)
    }

    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_services(&self, host_id: Option<HostId>) -> StorageResult<Vec<Service>> {
        let rows = match host_id {
            Some(host_id) => {
                sqlx::query(&format!(
                    "SELECT {SERVICE_COLUMNS} FROM services WHERE host_id = ? ORDER BY id"
                ))
                .bind(host_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY id"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::service_from_row).collect()
    }

    /// Prefilters in SQL, then applies the exact interval check
    #[instrument(skip(self))]
    async fn due_services(&self, now: DateTime<Utc>) -> StorageResult<Vec<super::schema::EffectiveService>> {
        let now_millis = Self::timestamp_to_millis(&now);

        let ids: Vec<i64> = sqlx::query(
            r#"
            SELECT s.id
            FROM services s
            JOIN service_templates t ON t.id = s.template_id
            WHERE s.is_active = 1
              AND t.check_mode IN (?, ?)
              AND t.provider IS NOT NULL
              AND t.sensor IS NOT NULL
              AND (s.last_check IS NULL
                   OR s.last_check + COALESCE(t.check_interval, 0) * 60000 <= ?)
            ORDER BY s.id
            "#,
        )
        .bind(CheckMode::Active.code())
        .bind(CheckMode::Hybrid.code())
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.try_get("id"))
        .collect::<Result<_, _>>()?;

        let mut due = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(effective) = self.get_effective_service(id).await? {
                if effective.is_due(now) {
                    due.push(effective);
                }
            }
        }

        debug!("{} services due", due.len());
        Ok(due)
    }

    async fn insert_event(&self, mut event: Event) -> StorageResult<Event> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (service_id, name, significance, status, date, content, correlation_id, provider)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.service_id)
        .bind(&event.name)
        .bind(event.significance.code())
        .bind(event.status.code())
        .bind(Self::timestamp_to_millis(&event.date))
        .bind(&event.content)
        .bind(&event.correlation_id)
        .bind(&event.provider)
        .execute(&self.pool)
        .await?;

        event.id = result.last_insert_rowid();
        Ok(event)
    }

    async fn get_event(&self, id: EventId) -> StorageResult<Option<Event>> {
        sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::event_from_row)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list_events(&self, query: &EventQuery) -> StorageResult<Vec<Event>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        Self::push_event_filters(&mut builder, query);
        builder.push(" ORDER BY date DESC, id DESC LIMIT ");
        builder.push_bind(query.limit.map(|l| l as i64).unwrap_or(-1));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset as i64);

        let events: Vec<Event> = builder
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::event_from_row)
            .collect::<StorageResult<_>>()?;

        debug!("query returned {} events", events.len());
        Ok(events)
    }

    #[instrument(skip(self, patch))]
    async fn update_events(&self, query: &EventQuery, patch: &EventPatch) -> StorageResult<usize> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE events SET ");
        {
            let mut assignments = builder.separated(", ");
            if let Some(status) = patch.status {
                assignments.push("status = ");
                assignments.push_bind_unseparated(status.code());
            }
            if let Some(significance) = patch.significance {
                assignments.push("significance = ");
                assignments.push_bind_unseparated(significance.code());
            }
            if let Some(name) = &patch.name {
                assignments.push("name = ");
                assignments.push_bind_unseparated(name.clone());
            }
            if let Some(correlation_id) = &patch.correlation_id {
                assignments.push("correlation_id = ");
                assignments.push_bind_unseparated(correlation_id.clone());
            }
        }
        Self::push_event_filters(&mut builder, query);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_events(&self, ids: &[EventId]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM events WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn insert_downtime(&self, mut downtime: ScheduledDowntime) -> StorageResult<ScheduledDowntime> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_downtimes (
                name, comment, is_service, target_id, is_fixed, begin_date, end_date, is_cancelled
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&downtime.name)
        .bind(&downtime.comment)
        .bind(downtime.target.kind == ItemKind::Service)
        .bind(downtime.target.id)
        .bind(downtime.is_fixed)
        .bind(Self::timestamp_to_millis(&downtime.begin))
        .bind(Self::timestamp_to_millis(&downtime.end))
        .bind(downtime.is_cancelled)
        .execute(&self.pool)
        .await?;

        downtime.id = result.last_insert_rowid();
        Ok(downtime)
    }

    async fn get_downtime(&self, id: DowntimeId) -> StorageResult<Option<ScheduledDowntime>> {
        sqlx::query("SELECT * FROM scheduled_downtimes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::downtime_from_row)
            .transpose()
    }

    async fn update_downtime(&self, downtime: &ScheduledDowntime) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_downtimes
            SET name = ?, comment = ?, is_service = ?, target_id = ?, is_fixed = ?,
                begin_date = ?, end_date = ?, is_cancelled = ?
            WHERE id = ?
            "#,
        )
        .bind(&downtime.name)
        .bind(&downtime.comment)
        .bind(downtime.target.kind == ItemKind::Service)
        .bind(downtime.target.id)
        .bind(downtime.is_fixed)
        .bind(Self::timestamp_to_millis(&downtime.begin))
        .bind(Self::timestamp_to_millis(&downtime.end))
        .bind(downtime.is_cancelled)
        .bind(downtime.id)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), "downtime", downtime.id)
    }

    async fn list_downtimes(&self, filter: &DowntimeFilter) -> StorageResult<Vec<ScheduledDowntime>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM scheduled_downtimes WHERE 1 = 1");

        if let Some(target) = filter.target {
            builder.push(" AND is_service = ");
            builder.push_bind(target.kind == ItemKind::Service);
            builder.push(" AND target_id = ");
            builder.push_bind(target.id);
        }
        if let Some(now) = filter.active_at {
            let now = Self::timestamp_to_millis(&now);
            builder.push(" AND is_cancelled = 0 AND begin_date <= ");
            builder.push_bind(now);
            builder.push(" AND end_date >= ");
            builder.push_bind(now);
        }
        builder.push(" ORDER BY id");

        builder
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::downtime_from_row)
            .collect()
    }

    async fn insert_acknowledgement(&self, mut ack: Acknowledgement) -> StorageResult<Acknowledgement> {
        let result = sqlx::query(
            r#"
            INSERT INTO acknowledgements (
                is_service, target_id, status, user, comment, is_sticky, date_creation, date_expiration
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ack.target.kind == ItemKind::Service)
        .bind(ack.target.id)
        .bind(ack.status)
        .bind(&ack.user)
        .bind(&ack.comment)
        .bind(ack.is_sticky)
        .bind(Self::timestamp_to_millis(&ack.created_at))
        .bind(ack.expires_at.as_ref().map(Self::timestamp_to_millis))
        .execute(&self.pool)
        .await?;

        ack.id = result.last_insert_rowid();
        Ok(ack)
    }

    async fn find_acknowledgement(&self, target: ItemRef) -> StorageResult<Option<Acknowledgement>> {
        sqlx::query("SELECT * FROM acknowledgements WHERE is_service = ? AND target_id = ?")
            .bind(target.kind == ItemKind::Service)
            .bind(target.id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::acknowledgement_from_row)
            .transpose()
    }

    async fn list_acknowledgements(&self) -> StorageResult<Vec<Acknowledgement>> {
        sqlx::query("SELECT * FROM acknowledgements ORDER BY date_creation")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::acknowledgement_from_row)
            .collect()
    }

    async fn delete_acknowledgement(&self, id: AcknowledgementId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM acknowledgements WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let services: i64 = sqlx::query("SELECT COUNT(*) AS count FROM services")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        let events: i64 = sqlx::query("SELECT COUNT(*) AS count FROM events")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        Ok(HealthStatus {
            healthy: true,
            message: "SQLite store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "sqlite".to_string()),
                ("path".to_string(), self.db_path.clone()),
                ("services".to_string(), services.to_string()),
                ("events".to_string(), events.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
