//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{DeliveryStatus, NotificationRecord, Priority};
use crate::store::migrations;
use crate::store::traits::{Database, NotificationFilter};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Escape LIKE wildcards so the key is matched literally.
fn like_pattern(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len() + 2);
    escaped.push('%');
    // SQLite's lower() only folds ASCII; fold the key the same way.
    for ch in key.to_ascii_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Map a libsql Row to a NotificationRecord.
///
/// Column order matches NOTIFICATION_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<NotificationRecord, DatabaseError> {
    let err = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let channel: String = row.get(4).map_err(err)?;
    let priority: Option<String> = row.get(5).ok();
    let status_str: String = row.get(7).map_err(err)?;
    let created_str: Option<String> = row.get(8).ok();
    let updated_str: String = row.get(9).map_err(err)?;

    let status: DeliveryStatus = status_str.parse().map_err(DatabaseError::Query)?;

    Ok(NotificationRecord {
        notification_id: row.get(0).map_err(err)?,
        organization_id: row.get(1).map_err(err)?,
        to: row.get(2).map_err(err)?,
        from: row.get(3).map_err(err)?,
        channel: channel.into(),
        priority: priority.map(Priority::from),
        message: row.get(6).map_err(err)?,
        status,
        created_at: created_str.as_deref().map(parse_datetime),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const NOTIFICATION_COLUMNS: &str = "notification_id, organization_id, recipient, sender, channel, priority, message, status, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn store_notification(&self, record: &NotificationRecord) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let affected = conn
            .execute(
                "INSERT INTO notifications (id, notification_id, organization_id, recipient, sender,
                    channel, priority, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (notification_id) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    record.notification_id.clone(),
                    record.organization_id.clone(),
                    record.to.clone(),
                    record.from.clone(),
                    record.channel.as_str(),
                    opt_text(record.priority.clone().map(String::from)),
                    record.message.clone(),
                    record.status.as_str(),
                    opt_text(record.created_at.map(|t| t.to_rfc3339())),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("store_notification: {e}")))?;

        let inserted = affected > 0;
        debug!(
            notification_id = %record.notification_id,
            inserted,
            "Notification stored"
        );
        Ok(inserted)
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let conn = self.conn();
        let filter = filter.clone().normalized();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE (?1 IS NULL OR organization_id = ?1)
                       AND (?2 IS NULL
                            OR lower(notification_id) LIKE ?2 ESCAPE '\\'
                            OR lower(recipient) LIKE ?2 ESCAPE '\\'
                            OR lower(sender) LIKE ?2 ESCAPE '\\'
                            OR lower(channel) LIKE ?2 ESCAPE '\\'
                            OR lower(COALESCE(priority, '')) LIKE ?2 ESCAPE '\\'
                            OR lower(message) LIKE ?2 ESCAPE '\\')
                     ORDER BY rowid ASC"
                ),
                params![
                    opt_text(filter.organization_id),
                    opt_text(filter.key.as_deref().map(like_pattern)),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notifications: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notifications: {e}")))?
        {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping notification row: {e}");
                }
            }
        }
        Ok(records)
    }

    async fn get_notification(
        &self,
        notification_id: &str,
    ) -> Result<Option<NotificationRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE notification_id = ?1"),
                params![notification_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_notification: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_record(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_notification: {e}"))),
        }
    }
}
