//! Completion notices
//!
//! Best-effort. A notifier reports failure through its `bool` return and the
//! caller only logs it.

use crate::enums::QueryKind;
use crate::payload::FlatMap;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// String fields at or above this length are left out of the message.
pub const MAX_FIELD_LEN: usize = 50;

/// A ready-to-send completion notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub kind: QueryKind,
    pub identifier: String,
    pub fields: BTreeMap<String, String>,
}

impl Notification {
    /// Build from callback fields, keeping only short string values.
    pub fn from_fields(
        recipient: impl Into<String>,
        kind: QueryKind,
        identifier: impl Into<String>,
        fields: &FlatMap,
    ) -> Self {
        let fields = fields
            .iter()
            .filter_map(|(key, value)| match value {
                JsonValue::String(s) if s.chars().count() < MAX_FIELD_LEN => {
                    Some((key.clone(), s.clone()))
                }
                _ => None,
            })
            .collect();

        Self {
            recipient: recipient.into(),
            kind,
            identifier: identifier.into(),
            fields,
        }
    }

    pub fn subject(&self) -> String {
        format!("Callback Notification: {} data ready", self.kind)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Data for {} ({}) has been received.\n",
            self.identifier, self.kind
        );
        for (key, value) in &self.fields {
            body.push_str(&format!("\n{}: {}", key, value));
        }
        body
    }
}

/// Delivery channel for completion notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns `false` on failure. Must not panic.
    async fn notify(&self, notification: &Notification) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_short_string_fields_kept() {
        let mut fields = FlatMap::new();
        fields.insert("esito".into(), json!("OK"));
        fields.insert("score".into(), json!(42));
        fields.insert("blob".into(), json!("x".repeat(MAX_FIELD_LEN)));
        fields.insert("nested".into(), json!({"a": "b"}));

        let n = Notification::from_fields("ops@example.com", QueryKind::AsyncFullProfile, "IT01", &fields);
        assert_eq!(n.fields.len(), 1);
        assert_eq!(n.fields.get("esito").map(String::as_str), Some("OK"));
    }

    #[test]
    fn test_subject_names_kind() {
        let n = Notification::from_fields("a@b", QueryKind::AsyncNegativeCheck, "X", &FlatMap::new());
        assert_eq!(n.subject(), "Callback Notification: negative-event data ready");
        assert!(n.body().contains("X (negative-event)"));
    }
}
