//! Frame types for the Parlor protocol.
//!
//! Frames are the unit of communication between clients and the server.
//! Each direction has its own enum; both are serialized with MessagePack
//! via [`crate::codec`].

use crate::message::{ChatMessage, Participant, ParticipantId};
use serde::{Deserialize, Serialize};

/// Content of an inbound chat submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChatContent {
    /// Plain UTF-8 text. Bodies starting with `/w ` are routed as whispers.
    Text {
        /// Message body.
        body: String,
    },
    /// Opaque image bytes, size-capped by the gateway.
    Image {
        /// Image payload.
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl ChatContent {
    /// Payload size in bytes, checked against the transport cap.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        match self {
            ChatContent::Text { body } => body.len(),
            ChatContent::Image { data } => data.len(),
        }
    }
}

/// Moderation operations available to admin participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdminAction {
    /// Direct all clients to clear their transcripts.
    ClearChat,
    /// Flip the room-wide mute flag.
    ToggleMute,
    /// Broadcast a standalone announcement.
    Announce {
        /// Announcement text.
        text: String,
    },
    /// Rotate the shared room password for standard logins.
    SetRoomPassword {
        /// New room password.
        password: String,
    },
    /// Disconnect a participant from the room.
    Kick {
        /// Identity of the participant to remove.
        target: ParticipantId,
    },
}

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Authenticate into the room.
    Join {
        /// Requested display name.
        name: String,
        /// Room password, or the admin password when `admin` is set.
        password: String,
        /// Whether this is an admin login attempt.
        #[serde(default)]
        admin: bool,
    },

    /// Submit a chat message.
    Chat {
        /// Text or image payload.
        content: ChatContent,
    },

    /// Typing-indicator change. Fire-and-forget; the server keeps no state.
    Typing {
        /// Whether the sender is currently typing.
        active: bool,
    },

    /// Perform a moderation action. Rejected for non-admin senders.
    Admin {
        /// The requested action.
        action: AdminAction,
    },
}

impl ClientFrame {
    /// Short kind label, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Join { .. } => "join",
            ClientFrame::Chat { .. } => "chat",
            ClientFrame::Typing { .. } => "typing",
            ClientFrame::Admin { .. } => "admin",
        }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(name: impl Into<String>, password: impl Into<String>, admin: bool) -> Self {
        ClientFrame::Join {
            name: name.into(),
            password: password.into(),
            admin,
        }
    }

    /// Create a text Chat frame.
    #[must_use]
    pub fn chat_text(body: impl Into<String>) -> Self {
        ClientFrame::Chat {
            content: ChatContent::Text { body: body.into() },
        }
    }

    /// Create an image Chat frame.
    #[must_use]
    pub fn chat_image(data: impl Into<Vec<u8>>) -> Self {
        ClientFrame::Chat {
            content: ChatContent::Image { data: data.into() },
        }
    }

    /// Create a Typing frame.
    #[must_use]
    pub fn typing(active: bool) -> Self {
        ClientFrame::Typing { active }
    }

    /// Create an Admin frame.
    #[must_use]
    pub fn admin(action: AdminAction) -> Self {
        ClientFrame::Admin { action }
    }
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Authentication succeeded.
    Welcome {
        /// The newly registered participant.
        participant: Participant,
        /// Current room mute flag, so the client starts consistent.
        muted: bool,
    },

    /// Private notice to one connection: auth errors, routing errors, and
    /// moderation confirmations all arrive here.
    Alert {
        /// Notice text.
        text: String,
    },

    /// Presence snapshot in registration order.
    Roster {
        /// All currently connected participants.
        participants: Vec<Participant>,
    },

    /// A routed chat message (system, text, image, or whisper).
    Message {
        /// The delivered message.
        message: ChatMessage,
    },

    /// Another participant's typing indicator changed.
    Typing {
        /// Display name of the typist.
        name: String,
        /// Whether they are currently typing.
        active: bool,
    },

    /// Directive to clear the client-side transcript. The server holds no
    /// transcript of its own.
    TranscriptCleared,

    /// This connection is being removed by an admin. Always delivered
    /// before the transport is closed.
    Kicked,

    /// Standalone announcement, distinct from chat messages.
    Announcement {
        /// Announcement text.
        text: String,
    },

    /// The room-wide mute flag changed.
    MuteChanged {
        /// New mute state.
        muted: bool,
    },
}

impl ServerFrame {
    /// Short kind label, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Welcome { .. } => "welcome",
            ServerFrame::Alert { .. } => "alert",
            ServerFrame::Roster { .. } => "roster",
            ServerFrame::Message { .. } => "message",
            ServerFrame::Typing { .. } => "typing",
            ServerFrame::TranscriptCleared => "transcript_cleared",
            ServerFrame::Kicked => "kicked",
            ServerFrame::Announcement { .. } => "announcement",
            ServerFrame::MuteChanged { .. } => "mute_changed",
        }
    }

    /// Create a Welcome frame.
    #[must_use]
    pub fn welcome(participant: Participant, muted: bool) -> Self {
        ServerFrame::Welcome { participant, muted }
    }

    /// Create an Alert frame.
    #[must_use]
    pub fn alert(text: impl Into<String>) -> Self {
        ServerFrame::Alert { text: text.into() }
    }

    /// Create a Roster frame.
    #[must_use]
    pub fn roster(participants: Vec<Participant>) -> Self {
        ServerFrame::Roster { participants }
    }

    /// Create a Message frame.
    #[must_use]
    pub fn message(message: ChatMessage) -> Self {
        ServerFrame::Message { message }
    }

    /// Create a system-notice Message frame.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        ServerFrame::Message {
            message: ChatMessage::system(text),
        }
    }

    /// Create a Typing frame.
    #[must_use]
    pub fn typing(name: impl Into<String>, active: bool) -> Self {
        ServerFrame::Typing {
            name: name.into(),
            active,
        }
    }

    /// Create an Announcement frame.
    #[must_use]
    pub fn announcement(text: impl Into<String>) -> Self {
        ServerFrame::Announcement { text: text.into() }
    }

    /// Create a MuteChanged frame.
    #[must_use]
    pub fn mute_changed(muted: bool) -> Self {
        ServerFrame::MuteChanged { muted }
    }
}
