//! Moderation state for the room.
//!
//! This is a pure state container: the room-wide mute flag, the rotating
//! password for standard logins, and the fixed admin password. It performs
//! no authorization of its own; callers gate mutation by role (see
//! [`crate::router::Router::admin`]).

use tracing::debug;

/// Room-wide moderation state.
///
/// Lives for the whole process, owned by the router's critical section.
#[derive(Debug)]
pub struct Moderation {
    /// Whether non-admin chat is currently suppressed.
    muted: bool,
    /// Shared password for standard-tier logins. Rotatable at runtime.
    room_password: String,
    /// Admin password. Fixed at startup.
    admin_password: String,
}

impl Moderation {
    /// Create moderation state with the configured passwords. The room
    /// starts unmuted.
    #[must_use]
    pub fn new(room_password: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self {
            muted: false,
            room_password: room_password.into(),
            admin_password: admin_password.into(),
        }
    }

    /// Whether non-admin chat is currently suppressed.
    #[must_use]
    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Flip the mute flag.
    ///
    /// Returns the new state.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        debug!(muted = self.muted, "Mute flag toggled");
        self.muted
    }

    /// Current password for standard-tier logins.
    #[must_use]
    pub fn room_password(&self) -> &str {
        &self.room_password
    }

    /// Rotate the password for standard-tier logins. Connected participants
    /// are unaffected; only subsequent logins are checked against the new
    /// value.
    pub fn set_room_password(&mut self, password: impl Into<String>) {
        self.room_password = password.into();
        debug!("Room password rotated");
    }

    /// Admin password, as configured at startup.
    #[must_use]
    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unmuted() {
        let moderation = Moderation::new("user123", "adminSecret");
        assert!(!moderation.muted());
    }

    #[test]
    fn test_toggle_mute() {
        let mut moderation = Moderation::new("user123", "adminSecret");

        assert!(moderation.toggle_mute());
        assert!(moderation.muted());

        assert!(!moderation.toggle_mute());
        assert!(!moderation.muted());
    }

    #[test]
    fn test_room_password_rotation() {
        let mut moderation = Moderation::new("user123", "adminSecret");
        assert_eq!(moderation.room_password(), "user123");

        moderation.set_room_password("hunter2");
        assert_eq!(moderation.room_password(), "hunter2");

        // Admin password is not affected by rotation
        assert_eq!(moderation.admin_password(), "adminSecret");
    }
}
