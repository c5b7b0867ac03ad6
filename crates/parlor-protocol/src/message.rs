//! Participant identity and chat message types.
//!
//! These types appear on the wire inside [`crate::frames::ServerFrame`] and
//! are shared with the core routing layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reserved display name carried by every admin participant.
pub const ADMIN_NAME: &str = "ADMIN";

/// Avatar service used to derive participant avatars.
const AVATAR_BASE: &str = "https://api.dicebear.com/7.x/bottts/svg";

/// A unique identifier for a connection's participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create a participant ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh participant ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        Self(format!("part_{:x}", timestamp))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trust tier of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Logged in with the shared room password.
    Standard,
    /// Logged in with the admin password; may moderate the room.
    Admin,
}

impl Role {
    /// Whether this role may perform moderation actions.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A connected, authenticated participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Connection identity.
    pub id: ParticipantId,
    /// Display name, unique (case-insensitive) among connected participants.
    pub name: String,
    /// Trust tier.
    pub role: Role,
    /// Avatar URL, derived from name and role.
    pub avatar: String,
}

impl Participant {
    /// Create a participant, deriving the avatar from name and role.
    #[must_use]
    pub fn new(id: ParticipantId, name: impl Into<String>, role: Role) -> Self {
        let name = name.into();
        let avatar = avatar_url(&name, role);
        Self {
            id,
            name,
            role,
            avatar,
        }
    }
}

/// Deterministic avatar URL for a display name and role.
///
/// Admins share one fixed avatar; standard participants get one seeded by
/// their display name.
#[must_use]
pub fn avatar_url(name: &str, role: Role) -> String {
    match role {
        Role::Admin => format!("{AVATAR_BASE}?seed={ADMIN_NAME}&backgroundColor=c0392b"),
        Role::Standard => format!("{AVATAR_BASE}?seed={name}"),
    }
}

/// Current time in milliseconds since the Unix epoch.
///
/// Messages are stamped with this when the router accepts them; rendering
/// and localization are the client's concern.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// A routed chat message.
///
/// Each message is constructed, delivered, and discarded; nothing is
/// persisted. System messages carry no origin participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Room-level notice with no origin participant.
    System {
        /// Notice text.
        text: String,
        /// Epoch milliseconds when the message was accepted.
        timestamp: u64,
    },

    /// Plain text, broadcast to the whole room.
    Text {
        /// Origin participant.
        from: Participant,
        /// Message body.
        body: String,
        /// Epoch milliseconds when the message was accepted.
        timestamp: u64,
    },

    /// Image payload, broadcast to the whole room.
    Image {
        /// Origin participant.
        from: Participant,
        /// Opaque image bytes; the client handles encoding.
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
        /// Epoch milliseconds when the message was accepted.
        timestamp: u64,
    },

    /// Private message delivered to one target plus a sender echo.
    Whisper {
        /// Origin participant.
        from: Participant,
        /// Target display name, carried on both copies.
        to: String,
        /// Message body.
        body: String,
        /// Epoch milliseconds when the message was accepted.
        timestamp: u64,
        /// `true` on the copy delivered back to the sender.
        echo: bool,
    },
}

impl ChatMessage {
    /// Create a system notice stamped with the current time.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        ChatMessage::System {
            text: text.into(),
            timestamp: now_millis(),
        }
    }

    /// Create a text message stamped with the current time.
    #[must_use]
    pub fn text(from: Participant, body: impl Into<String>) -> Self {
        ChatMessage::Text {
            from,
            body: body.into(),
            timestamp: now_millis(),
        }
    }

    /// Create an image message stamped with the current time.
    #[must_use]
    pub fn image(from: Participant, data: Vec<u8>) -> Self {
        ChatMessage::Image {
            from,
            data,
            timestamp: now_millis(),
        }
    }

    /// Create the target-bound copy of a whisper, stamped with the current
    /// time. Use [`ChatMessage::into_echo`] to derive the sender copy.
    #[must_use]
    pub fn whisper(from: Participant, to: impl Into<String>, body: impl Into<String>) -> Self {
        ChatMessage::Whisper {
            from,
            to: to.into(),
            body: body.into(),
            timestamp: now_millis(),
            echo: false,
        }
    }

    /// Derive the sender-echo copy of a whisper, sharing its timestamp.
    ///
    /// Non-whisper messages are returned unchanged.
    #[must_use]
    pub fn into_echo(mut self) -> Self {
        if let ChatMessage::Whisper { echo, .. } = &mut self {
            *echo = true;
        }
        self
    }

    /// Epoch-millisecond timestamp of this message.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            ChatMessage::System { timestamp, .. }
            | ChatMessage::Text { timestamp, .. }
            | ChatMessage::Image { timestamp, .. }
            | ChatMessage::Whisper { timestamp, .. } => *timestamp,
        }
    }

    /// Short kind label, used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChatMessage::System { .. } => "system",
            ChatMessage::Text { .. } => "text",
            ChatMessage::Image { .. } => "image",
            ChatMessage::Whisper { .. } => "whisper",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_generation() {
        let id1 = ParticipantId::generate();
        let id2 = ParticipantId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("part_"));
    }

    #[test]
    fn test_avatar_derivation() {
        let standard = Participant::new("p1".into(), "Ada", Role::Standard);
        assert!(standard.avatar.contains("seed=Ada"));

        let admin = Participant::new("p2".into(), ADMIN_NAME, Role::Admin);
        assert!(admin.avatar.contains("seed=ADMIN"));
        assert!(admin.avatar.contains("backgroundColor=c0392b"));
    }

    #[test]
    fn test_whisper_echo_shares_timestamp() {
        let from = Participant::new("p1".into(), "Ada", Role::Standard);
        let out = ChatMessage::whisper(from, "Bob", "psst");
        let ts = out.timestamp();

        let echo = out.clone().into_echo();
        assert_eq!(echo.timestamp(), ts);
        assert!(matches!(echo, ChatMessage::Whisper { echo: true, .. }));
        assert!(matches!(out, ChatMessage::Whisper { echo: false, .. }));
    }

    #[test]
    fn test_message_kind() {
        assert_eq!(ChatMessage::system("hi").kind(), "system");
        let from = Participant::new("p1".into(), "Ada", Role::Standard);
        assert_eq!(ChatMessage::text(from.clone(), "hi").kind(), "text");
        assert_eq!(ChatMessage::image(from, vec![0u8; 4]).kind(), "image");
    }
}
