//! Bounded in-memory alert list

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::cutoff_days_ago;
use crate::error::BackupResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Error => write!(f, "error"),
            AlertType::Warning => write!(f, "warning"),
            AlertType::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Alerts in creation order; the oldest are dropped past `max_alerts`
#[derive(Debug)]
pub struct AlertStore {
    alerts: VecDeque<Alert>,
    max_alerts: usize,
}

impl AlertStore {
    pub fn new(max_alerts: usize) -> Self {
        Self {
            alerts: VecDeque::new(),
            max_alerts,
        }
    }

    pub fn create(&mut self, alert_type: AlertType, message: impl Into<String>, details: Option<Value>) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            alert_type,
            message: message.into(),
            timestamp: Utc::now(),
            resolved: false,
            resolved_at: None,
            details,
        };
        self.alerts.push_back(alert.clone());
        while self.alerts.len() > self.max_alerts {
            self.alerts.pop_front();
        }
        alert
    }

    /// Newest first
    pub fn list(&self, include_resolved: bool) -> Vec<Alert> {
        self.alerts
            .iter()
            .rev()
            .filter(|a| include_resolved || !a.resolved)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    /// Mark an alert resolved; `false` if no alert has that id
    pub fn resolve(&mut self, id: &str) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                if !alert.resolved {
                    alert.resolved = true;
                    alert.resolved_at = Some(Utc::now());
                }
                true
            }
            None => false,
        }
    }

    /// Drop resolved alerts older than `retention_days`
    pub fn prune(&mut self, retention_days: i64) -> BackupResult<usize> {
        let cutoff = cutoff_days_ago(retention_days)?;
        let before = self.alerts.len();
        self.alerts.retain(|a| !(a.resolved && a.timestamp < cutoff));
        Ok(before - self.alerts.len())
    }

    pub fn unresolved_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.resolved).count()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cap_drops_oldest() {
        let mut store = AlertStore::new(3);
        for i in 0..5 {
            store.create(AlertType::Info, format!("alert {}", i), None);
        }

        let messages: Vec<_> = store.list(true).into_iter().map(|a| a.message).collect();
        assert_eq!(messages, vec!["alert 4", "alert 3", "alert 2"]);
    }

    #[test]
    fn test_resolve_and_filter() {
        let mut store = AlertStore::new(10);
        let first = store.create(AlertType::Error, "disk", None);
        store.create(AlertType::Warning, "slow", None);

        assert!(store.resolve(&first.id));
        assert!(!store.resolve("missing"));
        assert_eq!(store.list(false).len(), 1);
        assert_eq!(store.list(true).len(), 2);
        assert_eq!(store.unresolved_count(), 1);
        assert!(store.get(&first.id).unwrap().resolved_at.is_some());
    }

    #[test]
    fn test_prune_only_old_resolved() {
        let mut store = AlertStore::new(10);
        let old = store.create(AlertType::Info, "old", None);
        let stale = store.create(AlertType::Info, "stale but open", None);
        store.create(AlertType::Info, "recent", None);
        store.resolve(&old.id);
        for alert in store.alerts.iter_mut() {
            if alert.id == old.id || alert.id == stale.id {
                alert.timestamp = Utc::now() - Duration::days(40);
            }
        }

        assert_eq!(store.prune(30).unwrap(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(&old.id).is_none());
    }

    #[test]
    fn test_prune_rejects_bad_retention() {
        let mut store = AlertStore::new(10);
        let alert = store.create(AlertType::Info, "kept", None);
        store.resolve(&alert.id);

        assert!(store.prune(-5).is_err());
        assert!(store.prune(100_000_000).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_serialized_type_field() {
        let mut store = AlertStore::new(1);
        let alert = store.create(AlertType::Warning, "x", Some(serde_json::json!({"k": 1})));
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["details"]["k"], 1);
    }
}
