use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Order Audit Trail - append-only field level change log
// ============================================================================

/// Actor recorded when no authenticated principal is known.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditField {
    Status,
    OrderLines,
    Deleted,
}

impl AuditField {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditField::Status => "STATUS",
            AuditField::OrderLines => "ORDER_LINES",
            AuditField::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for AuditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAudit {
    pub id: Uuid,
    pub order_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
}

impl OrderAudit {
    /// Audit ids are UUIDv7 so rows sharing a timestamp still sort by creation.
    pub fn record(
        order_id: Uuid,
        field: AuditField,
        old_value: Option<String>,
        new_value: Option<String>,
        changed_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            field_name: field.as_str().to_string(),
            old_value,
            new_value,
            changed_at: Utc::now(),
            changed_by: changed_by.into(),
        }
    }
}

/// Newest first, ties broken by id.
pub fn sort_newest_first(rows: &mut [OrderAudit]) {
    rows.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then_with(|| b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_populates_fields() {
        let order_id = Uuid::new_v4();
        let audit = OrderAudit::record(
            order_id,
            AuditField::Status,
            Some("UNPROCESSED".into()),
            Some("CANCELLED".into()),
            SYSTEM_ACTOR,
        );

        assert_eq!(audit.order_id, order_id);
        assert_eq!(audit.field_name, "STATUS");
        assert_eq!(audit.old_value.as_deref(), Some("UNPROCESSED"));
        assert_eq!(audit.changed_by, "SYSTEM");
    }

    #[test]
    fn test_sort_newest_first_is_stable_for_equal_timestamps() {
        let order_id = Uuid::new_v4();
        let first = OrderAudit::record(order_id, AuditField::Status, None, None, SYSTEM_ACTOR);
        let mut second = OrderAudit::record(order_id, AuditField::Deleted, None, None, SYSTEM_ACTOR);
        second.changed_at = first.changed_at;

        let mut rows = vec![first.clone(), second.clone()];
        sort_newest_first(&mut rows);

        assert_eq!(rows[0].id, second.id);
        assert_eq!(rows[1].id, first.id);
    }
}
