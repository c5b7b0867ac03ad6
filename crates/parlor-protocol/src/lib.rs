//! # parlor-protocol
//!
//! Wire protocol definitions for the Parlor chat server.
//!
//! This crate defines the binary protocol spoken between Parlor clients and
//! the server: the frame enums for each direction, the participant and
//! message model they carry, and a length-prefixed MessagePack codec.
//!
//! ## Frame Types
//!
//! - `ClientFrame` - `Join` / `Chat` / `Typing` / `Admin`
//! - `ServerFrame` - `Welcome` / `Alert` / `Roster` / `Message` / `Typing` /
//!   `TranscriptCleared` / `Kicked` / `Announcement` / `MuteChanged`
//!
//! ## Example
//!
//! ```rust
//! use parlor_protocol::{codec, ClientFrame};
//!
//! // Create a join frame using the helper method
//! let frame = ClientFrame::join("Ada", "user123", false);
//!
//! // Encode and decode
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod message;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{AdminAction, ChatContent, ClientFrame, ServerFrame};
pub use message::{ChatMessage, Participant, ParticipantId, Role, ADMIN_NAME};
