//! `Database` trait — async interface for notification persistence.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DatabaseError;
use crate::pipeline::types::NotificationRecord;

/// Filter for listing stored notifications.
///
/// `key` is a case-insensitive substring matched against the id, recipient,
/// sender, channel, priority and message; `organization_id` is an exact match.
/// Absent (or empty) fields do not restrict the result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl NotificationFilter {
    pub fn new(key: Option<String>, organization_id: Option<String>) -> Self {
        Self {
            key,
            organization_id,
        }
        .normalized()
    }

    /// Treat blank values as absent.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            key: clean(self.key),
            organization_id: clean(self.organization_id),
        }
    }
}

/// Backend-agnostic notification store.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Persist one processed notification.
    ///
    /// Returns `false` without writing if a record with the same
    /// `notification_id` already exists.
    async fn store_notification(&self, record: &NotificationRecord) -> Result<bool, DatabaseError>;

    /// List notifications matching `filter`, in insertion order.
    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationRecord>, DatabaseError>;

    /// Look up a single notification by its id.
    async fn get_notification(
        &self,
        notification_id: &str,
    ) -> Result<Option<NotificationRecord>, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filter_values_are_dropped() {
        let f = NotificationFilter::new(Some("  ".into()), Some("org-1".into()));
        assert!(f.key.is_none());
        assert_eq!(f.organization_id.as_deref(), Some("org-1"));
    }
}
