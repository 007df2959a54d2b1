//! Mail model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MailId;

/// A single received message owned by an address.
///
/// Only `id` and `arrived_at` carry meaning for synchronization; the other
/// fields are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
    /// Unique identifier.
    pub id: MailId,
    /// When the mail reached the service.
    pub arrived_at: DateTime<Utc>,
    /// Sender as reported by the service.
    #[serde(default)]
    pub from: String,
    /// Message subject.
    #[serde(default)]
    pub subject: String,
    /// Opaque reference used to fetch the body (e.g. a download URL).
    #[serde(default)]
    pub body_ref: Option<String>,
}

impl Mail {
    /// Create a mail with empty sender and subject.
    #[must_use]
    pub fn new(id: impl Into<MailId>, arrived_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            arrived_at,
            from: String::new(),
            subject: String::new(),
            body_ref: None,
        }
    }

    /// Set the sender.
    #[must_use]
    pub fn from_sender(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Set the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_remote_shape_with_missing_optional_fields() {
        let json = r#"{"id":"m1","arrivedAt":"2024-03-01T10:00:00Z"}"#;
        let mail: Mail = serde_json::from_str(json).unwrap();
        assert_eq!(mail.id, MailId::from("m1"));
        assert!(mail.from.is_empty());
        assert!(mail.body_ref.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let mail = Mail::new("m2", Utc::now())
            .from_sender("alice@example.org")
            .with_subject("hello");
        assert_eq!(mail.from, "alice@example.org");
        assert_eq!(mail.subject, "hello");
    }
}
