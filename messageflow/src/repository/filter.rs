//! Deciding which records reach the repository.

use super::MessageRecord;
use crate::core::{MessageKind, ProcessingStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A custom record predicate.
pub type RecordPredicate = Arc<dyn Fn(&MessageRecord) -> bool + Send + Sync>;

/// Criteria a record must meet to be written.
///
/// Empty criteria accept everything. All non-empty criteria must match.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MessageRecordFilter {
    /// Accepted statuses.
    #[serde(default)]
    pub statuses: Vec<ProcessingStatus>,
    /// Minimum execution time in milliseconds.
    #[serde(default)]
    pub min_duration_ms: Option<f64>,
    /// Accepted content types.
    #[serde(default)]
    pub content_types: Vec<String>,
    /// Accepted message kinds.
    #[serde(default)]
    pub kinds: Vec<MessageKind>,
    #[serde(skip)]
    predicate: Option<RecordPredicate>,
}

impl MessageRecordFilter {
    /// Creates a filter that accepts every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accepts the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ProcessingStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Only accepts records that ran for at least `min`.
    #[must_use]
    pub fn with_min_duration(mut self, min: Duration) -> Self {
        self.min_duration_ms = Some(min.as_secs_f64() * 1000.0);
        self
    }

    /// Only accepts the given content types.
    #[must_use]
    pub fn with_content_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.content_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Only accepts the given kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Adds a custom predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&MessageRecord) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Returns true if the record passes every criterion.
    #[must_use]
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&record.kind) {
            return false;
        }
        if !self.content_types.is_empty() && !self.content_types.contains(&record.content_type) {
            return false;
        }
        if let Some(min) = self.min_duration_ms {
            if record.execution_duration_ms.map_or(true, |ms| ms < min) {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |predicate| predicate(record))
    }
}

impl fmt::Debug for MessageRecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRecordFilter")
            .field("statuses", &self.statuses)
            .field("min_duration_ms", &self.min_duration_ms)
            .field("content_types", &self.content_types)
            .field("kinds", &self.kinds)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn record(status: ProcessingStatus, duration_ms: Option<f64>) -> MessageRecord {
        MessageRecord {
            id: Uuid::new_v4(),
            kind: MessageKind::Command,
            content_type: "app::CreateOrder".to_string(),
            content: serde_json::Value::Null,
            error: None,
            created_at: Utc::now(),
            execution_duration_ms: duration_ms,
            status,
            status_code: status.code(),
            data: BTreeMap::new(),
            result: None,
            pipeline: None,
        }
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = MessageRecordFilter::new();
        assert!(filter.matches(&record(ProcessingStatus::Failed, None)));
        assert!(filter.matches(&record(ProcessingStatus::Completed, Some(1.0))));
    }

    #[test]
    fn test_status_filter() {
        let filter = MessageRecordFilter::new().with_statuses([ProcessingStatus::Failed]);
        assert!(filter.matches(&record(ProcessingStatus::Failed, None)));
        assert!(!filter.matches(&record(ProcessingStatus::Completed, None)));
    }

    #[test]
    fn test_min_duration_rejects_unmeasured_records() {
        let filter = MessageRecordFilter::new().with_min_duration(Duration::from_millis(10));
        assert!(filter.matches(&record(ProcessingStatus::Completed, Some(25.0))));
        assert!(!filter.matches(&record(ProcessingStatus::Completed, Some(2.0))));
        assert!(!filter.matches(&record(ProcessingStatus::Completed, None)));
    }

    #[test]
    fn test_kind_content_type_and_predicate() {
        let filter = MessageRecordFilter::new()
            .with_kinds([MessageKind::Command])
            .with_content_types(["app::CreateOrder"])
            .with_predicate(|r| r.status != ProcessingStatus::Rejected);

        assert!(filter.matches(&record(ProcessingStatus::Completed, None)));
        assert!(!filter.matches(&record(ProcessingStatus::Rejected, None)));

        let mut event = record(ProcessingStatus::Completed, None);
        event.kind = MessageKind::Event;
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_filter_deserializes_from_config() {
        let filter: MessageRecordFilter = serde_json::from_value(serde_json::json!({
            "statuses": ["failed", "rejected"],
            "min_duration_ms": 5.0
        }))
        .unwrap();

        assert_eq!(filter.statuses.len(), 2);
        assert!(filter.matches(&record(ProcessingStatus::Rejected, Some(6.0))));
    }
}
