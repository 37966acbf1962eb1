//! Notification records.
//!
//! The notification log is append-only and doubles as the dedup ledger: a
//! notification of a given type for a given key is suppressed when one was
//! already written inside the dedup window. The check always goes against the
//! persisted log because sweeps of the same type may run on different workers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identifiers::{NotificationId, ProductId, UserId};

/// Default dedup window in hours.
pub const DEFAULT_DEDUP_WINDOW_HOURS: i64 = 24;

/// Notification categories written by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A product is below its minimum stock
    LowStock,
    /// Stock lots expire soon
    NearExpiry,
}

impl NotificationType {
    /// Stable string stored in the log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowStock => "low_stock",
            Self::NearExpiry => "near_expiry",
        }
    }

    /// Parse the stored string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low_stock" => Some(Self::LowStock),
            "near_expiry" => Some(Self::NearExpiry),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The condition a notification reports on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    /// One key per low-stock product
    pub fn product(product_id: ProductId) -> Self {
        Self(format!("product:{}", product_id))
    }

    /// One key per near-expiry look-ahead window
    pub fn lead_days(days: i64) -> Self {
        Self(format!("days:{}", days))
    }

    /// Rebuild from the stored string
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Stored string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Start of the dedup window ending at `now`
pub fn dedup_cutoff(now: DateTime<Utc>, window_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(window_hours)
}

/// Content of a notification before it is addressed to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub notification_type: NotificationType,
    pub dedup_key: DedupKey,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

impl NotificationDraft {
    /// Address the draft to one user
    pub fn addressed_to(&self, user_id: UserId, created_at: DateTime<Utc>) -> NewNotification {
        NewNotification {
            user_id,
            notification_type: self.notification_type,
            dedup_key: self.dedup_key.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
            payload: self.payload.clone(),
            created_at,
        }
    }
}

/// A notification about to be appended to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: UserId,
    pub notification_type: NotificationType,
    pub dedup_key: DedupKey,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub user_id: UserId,
    pub notification_type: NotificationType,
    pub dedup_key: DedupKey,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Build the persisted form of a new notification
    pub fn from_new(id: NotificationId, new: NewNotification) -> Self {
        Self {
            id,
            user_id: new.user_id,
            notification_type: new.notification_type,
            dedup_key: new.dedup_key,
            title: new.title,
            message: new.message,
            payload: new.payload,
            created_at: new.created_at,
        }
    }

    /// Whether this record suppresses a new notification of `kind` for `key`
    pub fn suppresses(&self, kind: NotificationType, key: &DedupKey, since: DateTime<Utc>) -> bool {
        self.notification_type == kind && &self.dedup_key == key && self.created_at > since
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hours_ago: i64, now: DateTime<Utc>) -> NotificationRecord {
        NotificationRecord {
            id: NotificationId::new(1),
            user_id: UserId::new(1),
            notification_type: NotificationType::LowStock,
            dedup_key: DedupKey::product(ProductId::new(9)),
            title: "Stock bajo".to_string(),
            message: String::new(),
            payload: serde_json::Value::Null,
            created_at: now - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn test_dedup_window() {
        let now = Utc::now();
        let since = dedup_cutoff(now, DEFAULT_DEDUP_WINDOW_HOURS);
        let key = DedupKey::product(ProductId::new(9));

        assert!(record(23, now).suppresses(NotificationType::LowStock, &key, since));
        assert!(!record(25, now).suppresses(NotificationType::LowStock, &key, since));
    }

    #[test]
    fn test_dedup_is_per_type_and_key() {
        let now = Utc::now();
        let since = dedup_cutoff(now, DEFAULT_DEDUP_WINDOW_HOURS);
        let rec = record(1, now);

        assert!(!rec.suppresses(NotificationType::NearExpiry, &rec.dedup_key, since));
        assert!(!rec.suppresses(
            NotificationType::LowStock,
            &DedupKey::product(ProductId::new(10)),
            since
        ));
    }

    #[test]
    fn test_type_round_trip_strings() {
        for kind in [NotificationType::LowStock, NotificationType::NearExpiry] {
            assert_eq!(NotificationType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationType::parse("other"), None);
    }

    #[test]
    fn test_dedup_keys() {
        assert_eq!(DedupKey::product(ProductId::new(4)).as_str(), "product:4");
        assert_eq!(DedupKey::lead_days(30).as_str(), "days:30");
    }
}
