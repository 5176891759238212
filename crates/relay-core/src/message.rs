//! Chat message values.
//!
//! A [`Message`] is immutable once constructed and is shared read-only
//! (behind an `Arc`) by every consumer during fan-out. The wire shape is
//! `username` / `message_content` / `timestamp` / `type`, with the
//! attachment fields omitted when absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved display name used for hub-generated notifications.
pub const SYSTEM_USERNAME: &str = "System";

/// Whether a message was authored by a user or generated by the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    System,
}

/// One chat event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Display name of the sender.
    pub username: String,
    /// Text body.
    pub message_content: String,
    /// Creation time, RFC 3339 on the wire.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Base64-encoded attachment payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagen_data: Option<String>,
    /// MIME type of the attachment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagen_type: Option<String>,
}

impl Message {
    /// A user-authored text message.
    #[must_use]
    pub fn user(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            username: sender.into(),
            message_content: body.into(),
            timestamp: Utc::now(),
            kind: MessageKind::User,
            imagen_data: None,
            imagen_type: None,
        }
    }

    /// A hub-generated notification (join/leave/rejection).
    #[must_use]
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            username: SYSTEM_USERNAME.into(),
            message_content: body.into(),
            timestamp: Utc::now(),
            kind: MessageKind::System,
            imagen_data: None,
            imagen_type: None,
        }
    }

    /// A user message carrying an inline image attachment.
    ///
    /// The media type is recorded as-is; callers validate it beforehand
    /// with [`crate::is_supported_image_type`].
    #[must_use]
    pub fn with_image(
        sender: impl Into<String>,
        body: impl Into<String>,
        data: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            username: sender.into(),
            message_content: body.into(),
            timestamp: Utc::now(),
            kind: MessageKind::User,
            imagen_data: Some(data.into()),
            imagen_type: Some(media_type.into()),
        }
    }

    /// Whether this message carries an attachment payload.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.imagen_data.as_deref().is_some_and(|d| !d.is_empty())
    }
}
