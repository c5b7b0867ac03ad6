//! Session registry for the room.
//!
//! The roster is the authoritative mapping from connection identity to
//! participant record. It owns identity uniqueness and role assignment, and
//! holds each connection's outbound delivery handle so the router can fan
//! messages out. The roster itself is not thread-safe; the router guards it
//! behind a single critical section.

use crate::moderation::Moderation;
use parlor_protocol::{Participant, ParticipantId, Role, ServerFrame, ADMIN_NAME};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound delivery handle for one connection.
///
/// The gateway drains the receiving end; dropping the sender is how a
/// connection is terminated (after queued frames are delivered).
pub type Outbound = mpsc::UnboundedSender<ServerFrame>;

/// Minimum display name length, after trimming.
pub const MIN_NAME_LEN: usize = 2;

/// Maximum display name length; longer names are truncated.
pub const MAX_NAME_LEN: usize = 15;

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Display name shorter than [`MIN_NAME_LEN`] after trimming.
    #[error("Name must be at least {MIN_NAME_LEN} characters")]
    NameTooShort,

    /// Display name collides with a connected participant.
    #[error("That name is already taken")]
    NameTaken,

    /// Admin login attempted with the wrong admin password.
    #[error("Wrong admin password")]
    BadAdminPassword,

    /// Standard login attempted with the wrong room password.
    #[error("Wrong room password")]
    BadRoomPassword,
}

/// Normalize a requested display name: trim, reject names shorter than
/// [`MIN_NAME_LEN`], truncate to [`MAX_NAME_LEN`] characters.
///
/// # Errors
///
/// Returns [`AuthError::NameTooShort`] if the trimmed name is too short.
pub fn clean_name(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_NAME_LEN {
        return Err(AuthError::NameTooShort);
    }
    Ok(trimmed.chars().take(MAX_NAME_LEN).collect())
}

/// A registered participant together with its delivery handle.
struct RosterEntry {
    participant: Participant,
    outbound: Outbound,
}

/// The session registry.
///
/// Entries are kept in registration order, which doubles as the order of
/// presence snapshots.
#[derive(Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connected participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the room is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Authenticate a connection and register the resulting participant.
    ///
    /// Admin attempts are checked against the fixed admin password and get
    /// the reserved [`ADMIN_NAME`] identity, bypassing the uniqueness check.
    /// Standard attempts are checked against the current room password and
    /// must not collide (case-insensitively) with a connected participant.
    ///
    /// The caller must hold the registry's critical section across this
    /// whole call; the uniqueness check and the insert are not otherwise
    /// atomic.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing the first failed check.
    pub fn authenticate(
        &mut self,
        id: ParticipantId,
        raw_name: &str,
        password: &str,
        wants_admin: bool,
        moderation: &Moderation,
        outbound: Outbound,
    ) -> Result<Participant, AuthError> {
        let name = clean_name(raw_name)?;

        let participant = if wants_admin {
            if password != moderation.admin_password() {
                return Err(AuthError::BadAdminPassword);
            }
            Participant::new(id, ADMIN_NAME, Role::Admin)
        } else {
            if password != moderation.room_password() {
                return Err(AuthError::BadRoomPassword);
            }
            if self.name_taken(&name) {
                return Err(AuthError::NameTaken);
            }
            Participant::new(id, name, Role::Standard)
        };

        debug!(
            participant = %participant.id,
            name = %participant.name,
            role = ?participant.role,
            "Participant registered"
        );

        self.entries.push(RosterEntry {
            participant: participant.clone(),
            outbound,
        });

        Ok(participant)
    }

    /// Remove a participant, dropping its delivery handle.
    ///
    /// Idempotent: returns the removed participant if present, `None`
    /// otherwise.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        let index = self.entries.iter().position(|e| &e.participant.id == id)?;
        let entry = self.entries.remove(index);
        debug!(participant = %id, name = %entry.participant.name, "Participant removed");
        Some(entry.participant)
    }

    /// Look up a participant by connection identity.
    #[must_use]
    pub fn find(&self, id: &ParticipantId) -> Option<&Participant> {
        self.entries
            .iter()
            .map(|e| &e.participant)
            .find(|p| &p.id == id)
    }

    /// Look up a participant by exact display name.
    ///
    /// Case-sensitive: whisper targets are typed from the rendered name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Participant> {
        self.entries
            .iter()
            .map(|e| &e.participant)
            .find(|p| p.name == name)
    }

    /// Whether a display name is held by a connected participant,
    /// case-insensitively.
    #[must_use]
    pub fn name_taken(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.entries
            .iter()
            .any(|e| e.participant.name.to_lowercase() == lowered)
    }

    /// Snapshot of all connected participants, in registration order.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.entries.iter().map(|e| e.participant.clone()).collect()
    }

    /// Deliver a frame to one participant.
    ///
    /// Returns `false` if the participant is not registered or its
    /// connection has already gone away.
    pub fn send_to(&self, id: &ParticipantId, frame: ServerFrame) -> bool {
        match self.entries.iter().find(|e| &e.participant.id == id) {
            Some(entry) => entry.outbound.send(frame).is_ok(),
            None => false,
        }
    }

    /// Deliver a frame to every connected participant.
    pub fn broadcast(&self, frame: &ServerFrame) {
        for entry in &self.entries {
            let _ = entry.outbound.send(frame.clone());
        }
    }

    /// Deliver a frame to every connected participant except one.
    pub fn broadcast_except(&self, skip: &ParticipantId, frame: &ServerFrame) {
        for entry in &self.entries {
            if &entry.participant.id != skip {
                let _ = entry.outbound.send(frame.clone());
            }
        }
    }
}
