//! Message types for conversation logs.
//!
//! Provides the [`ChatMessage`], [`Role`], [`DeliveryStatus`], and
//! [`Attachment`] types that make up a conversation log entry.
//!
//! # Examples
//!
//! ```
//! use kinesia::chat::message::{ChatMessage, DeliveryStatus, Role};
//!
//! let msg = ChatMessage::user("My shoulder aches when I reach overhead.");
//! assert_eq!(msg.role, Role::User);
//! assert_eq!(msg.status, DeliveryStatus::Sent);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique, stable message identifier.
pub type MessageId = String;

/// The author of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Patient or clinician input.
    User,
    /// Assistant (model) output.
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Delivery status of a log entry.
///
/// User messages start `Sent` and become `Read` when the paired model
/// response begins arriving. Model messages become `Read` when their
/// stream completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Appended to the log, not yet acknowledged.
    Sent,
    /// Acknowledged (response started, or stream finished).
    Read,
}

/// An image attached to a message. Immutable once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type of the image (e.g. `"image/jpeg"`).
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl Attachment {
    /// Create a new attachment.
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// One entry in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique, stable identifier.
    pub id: MessageId,
    /// Who authored this entry.
    pub role: Role,
    /// Message text. Empty is a valid transient state for an in-flight
    /// model message.
    pub content: String,
    /// Attached images, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Delivery status.
    pub status: DeliveryStatus,
}

impl ChatMessage {
    /// Create a message with the given role, content, and status.
    pub fn new(role: Role, content: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            id: generate_message_id(role),
            role,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            status,
        }
    }

    /// Create a user message in the `Sent` state.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, DeliveryStatus::Sent)
    }

    /// Create a user message carrying image attachments.
    pub fn user_with_attachments(
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        let mut msg = Self::user(content);
        msg.attachments = attachments;
        msg
    }

    /// Create an empty model placeholder in the `Sent` state.
    ///
    /// The placeholder is filled incrementally as stream chunks arrive.
    pub fn model_placeholder() -> Self {
        Self::new(Role::Model, "", DeliveryStatus::Sent)
    }

    /// Create a completed model message in the `Read` state.
    pub fn model_read(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content, DeliveryStatus::Read)
    }

    /// Whether this message is an in-flight placeholder (empty model entry).
    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Model && self.content.is_empty()
    }
}

/// Generate a unique message ID.
///
/// Format: `{role}-{uuid}`. The role prefix keeps log dumps readable.
fn generate_message_id(role: Role) -> MessageId {
    format!("{role}-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Role / DeliveryStatus ─────────────────────────────────

    #[test]
    fn role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Model.to_string(), "model");
    }

    #[test]
    fn role_serde_round_trip() {
        for role in &[Role::User, Role::Model] {
            let json = serde_json::to_string(role).unwrap_or_default();
            let parsed: Result<Role, _> = serde_json::from_str(&json);
            assert!(parsed.is_ok());
            match parsed {
                Ok(r) => assert_eq!(r, *role),
                Err(_) => unreachable!("deserialization succeeded"),
            }
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DeliveryStatus::Sent).unwrap_or_default();
        assert_eq!(json, "\"sent\"");
        let json = serde_json::to_string(&DeliveryStatus::Read).unwrap_or_default();
        assert_eq!(json, "\"read\"");
    }

    // ── Construction ──────────────────────────────────────────

    #[test]
    fn user_message_starts_sent() {
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.status, DeliveryStatus::Sent);
        assert_eq!(msg.content, "hello");
        assert!(msg.attachments.is_empty());
        assert!(msg.id.starts_with("user-"));
    }

    #[test]
    fn placeholder_is_empty_model_sent() {
        let msg = ChatMessage::model_placeholder();
        assert_eq!(msg.role, Role::Model);
        assert_eq!(msg.status, DeliveryStatus::Sent);
        assert!(msg.content.is_empty());
        assert!(msg.is_placeholder());
    }

    #[test]
    fn filled_model_message_is_not_placeholder() {
        let msg = ChatMessage::model_read("All done.");
        assert!(!msg.is_placeholder());
        assert_eq!(msg.status, DeliveryStatus::Read);
    }

    #[test]
    fn user_message_is_not_placeholder_even_when_empty() {
        let mut msg = ChatMessage::user("x");
        msg.content.clear();
        assert!(!msg.is_placeholder());
    }

    #[test]
    fn attachments_carried() {
        let att = Attachment::new("image/png", "aGVsbG8=");
        let msg = ChatMessage::user_with_attachments("posture photo", vec![att.clone()]);
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0], att);
    }

    #[test]
    fn message_ids_are_unique() {
        let a = ChatMessage::user("a");
        let b = ChatMessage::user("b");
        assert_ne!(a.id, b.id);
    }

    // ── Serde ─────────────────────────────────────────────────

    #[test]
    fn message_serde_round_trip() {
        let original = ChatMessage::user("round trip");
        let json = serde_json::to_string(&original).unwrap_or_default();
        let parsed: Result<ChatMessage, _> = serde_json::from_str(&json);
        assert!(parsed.is_ok());
        match parsed {
            Ok(p) => assert_eq!(p, original),
            Err(_) => unreachable!("deserialization succeeded"),
        }
    }

    #[test]
    fn empty_attachments_omitted_from_json() {
        let msg = ChatMessage::user("no images");
        let json = serde_json::to_string(&msg).unwrap_or_default();
        assert!(!json.contains("attachments"));
    }

    #[test]
    fn message_with_attachments_serde_round_trip() {
        let original = ChatMessage::user_with_attachments(
            "check this",
            vec![Attachment::new("image/jpeg", "Zm9v")],
        );
        let json = serde_json::to_string(&original).unwrap_or_default();
        let parsed: Result<ChatMessage, _> = serde_json::from_str(&json);
        assert!(parsed.is_ok());
        match parsed {
            Ok(p) => {
                assert_eq!(p.attachments.len(), 1);
                assert_eq!(p, original);
            }
            Err(_) => unreachable!("deserialization succeeded"),
        }
    }

    #[test]
    fn message_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChatMessage>();
    }
}
