//! Message routing for the room.
//!
//! The router classifies inbound content, computes the recipient set, and
//! fans frames out over the roster's delivery handles. It owns the registry
//! and the moderation state behind a single mutex, so the registry's
//! check-then-insert and the mute flag's read-then-broadcast each happen in
//! one critical section. Everything inside the lock is in-memory and
//! non-blocking.

use crate::moderation::Moderation;
use crate::roster::{AuthError, Outbound, Roster};
use parlor_protocol::{
    AdminAction, ChatContent, ChatMessage, Participant, ParticipantId, ServerFrame,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix marking a text body as a whisper command: `/w <name> <body...>`.
pub const WHISPER_PREFIX: &str = "/w ";

/// Routing errors. Each is recovered at the gateway and delivered as a
/// private alert to the originating connection; the Display strings are the
/// user-facing text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The room is muted and the sender is not an admin.
    #[error("The chat is currently muted")]
    ChatMuted,

    /// Whisper target is not connected.
    #[error("User {0} not found")]
    UserNotFound(String),

    /// Moderation action attempted by a non-admin.
    #[error("Not authorized")]
    NotAuthorized,

    /// Payload exceeds the configured transport cap. Produced by the
    /// gateway before the router sees the frame.
    #[error("Message payload too large")]
    PayloadTooLarge,
}

/// Shared room state, guarded by the router's mutex.
struct RoomState {
    roster: Roster,
    moderation: Moderation,
}

/// The central message router.
///
/// One router serves the whole process; every connection task calls into it
/// through `&self`.
pub struct Router {
    state: Mutex<RoomState>,
}

/// Router statistics.
#[derive(Debug, Clone, Copy)]
pub struct RoomStats {
    /// Number of connected participants.
    pub participants: usize,
    /// Current mute flag.
    pub muted: bool,
}

impl Router {
    /// Create a router over fresh registry state and the given moderation
    /// configuration.
    #[must_use]
    pub fn new(moderation: Moderation) -> Self {
        Self {
            state: Mutex::new(RoomState {
                roster: Roster::new(),
                moderation,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RoomStats {
        let state = self.lock();
        RoomStats {
            participants: state.roster.len(),
            muted: state.moderation.muted(),
        }
    }

    /// Authenticate a connection and announce the new participant.
    ///
    /// On success the joiner receives a `Welcome` frame first, then everyone
    /// (joiner included) receives the join notice and a fresh presence
    /// snapshot. On failure nothing is registered and nothing is broadcast;
    /// the caller delivers the error privately.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if any authentication check fails.
    pub fn join(
        &self,
        id: ParticipantId,
        raw_name: &str,
        password: &str,
        wants_admin: bool,
        outbound: Outbound,
    ) -> Result<Participant, AuthError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let muted = state.moderation.muted();
        let participant = state.roster.authenticate(
            id,
            raw_name,
            password,
            wants_admin,
            &state.moderation,
            outbound,
        )?;

        state.roster.send_to(
            &participant.id,
            ServerFrame::welcome(participant.clone(), muted),
        );
        state.roster.broadcast(&ServerFrame::system(format!(
            "{} joined the room.",
            participant.name
        )));
        state
            .roster
            .broadcast(&ServerFrame::roster(state.roster.participants()));

        info!(
            participant = %participant.id,
            name = %participant.name,
            total = state.roster.len(),
            "Participant joined"
        );

        Ok(participant)
    }

    /// Remove a participant and announce the departure.
    ///
    /// Idempotent: if the identity is no longer registered (never
    /// authenticated, or already removed by a kick) nothing is routed.
    pub fn leave(&self, id: &ParticipantId) {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(participant) = state.roster.remove(id) {
            state.roster.broadcast(&ServerFrame::system(format!(
                "{} disconnected.",
                participant.name
            )));
            state
                .roster
                .broadcast(&ServerFrame::roster(state.roster.participants()));

            info!(
                participant = %id,
                name = %participant.name,
                remaining = state.roster.len(),
                "Participant left"
            );
        }
    }

    /// Route a chat submission from an authenticated sender.
    ///
    /// Text bodies starting with [`WHISPER_PREFIX`] are routed as whispers;
    /// everything else is stamped and broadcast to the whole room, sender
    /// included. A sender that has already been removed (e.g. kicked while
    /// the frame was in flight) is ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] to be delivered privately to the sender.
    pub fn chat(&self, sender: &ParticipantId, content: ChatContent) -> Result<(), RouteError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(sender) = state.roster.find(sender).cloned() else {
            return Ok(());
        };

        if state.moderation.muted() && !sender.role.is_admin() {
            debug!(participant = %sender.id, "Chat rejected: room muted");
            return Err(RouteError::ChatMuted);
        }

        let message = match content {
            ChatContent::Text { body } => {
                if body.starts_with(WHISPER_PREFIX) {
                    return route_whisper(state, &sender, &body);
                }
                ChatMessage::text(sender, body)
            }
            ChatContent::Image { data } => ChatMessage::image(sender, data),
        };

        debug!(
            kind = message.kind(),
            recipients = state.roster.len(),
            "Broadcasting message"
        );
        state.roster.broadcast(&ServerFrame::message(message));
        Ok(())
    }

    /// Route a typing-indicator change to everyone except the sender.
    ///
    /// Fire-and-forget: no state is retained, and an unknown sender is
    /// ignored.
    pub fn typing(&self, sender: &ParticipantId, active: bool) {
        let guard = self.lock();

        if let Some(participant) = guard.roster.find(sender) {
            let frame = ServerFrame::typing(participant.name.clone(), active);
            guard.roster.broadcast_except(&participant.id, &frame);
        }
    }

    /// Perform a moderation action on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NotAuthorized`] unless the actor is an admin.
    pub fn admin(&self, actor: &ParticipantId, action: AdminAction) -> Result<(), RouteError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(actor) = state.roster.find(actor).cloned() else {
            return Ok(());
        };
        if !actor.role.is_admin() {
            warn!(participant = %actor.id, action = ?action, "Admin action rejected");
            return Err(RouteError::NotAuthorized);
        }

        match action {
            AdminAction::ClearChat => {
                state.roster.broadcast(&ServerFrame::TranscriptCleared);
                state.roster.broadcast(&ServerFrame::system(
                    "The chat transcript was cleared by an admin.",
                ));
                info!(actor = %actor.id, "Transcript cleared");
            }

            AdminAction::ToggleMute => {
                // Flag flip and notice fan-out share the critical section,
                // so every recipient sees them in the same order relative
                // to in-flight chat messages.
                let muted = state.moderation.toggle_mute();
                state.roster.broadcast(&ServerFrame::mute_changed(muted));
                state.roster.broadcast(&ServerFrame::system(if muted {
                    "Chat is now muted."
                } else {
                    "Chat is now unmuted."
                }));
                info!(actor = %actor.id, muted, "Mute toggled");
            }

            AdminAction::Announce { text } => {
                state.roster.broadcast(&ServerFrame::announcement(text));
                info!(actor = %actor.id, "Announcement broadcast");
            }

            AdminAction::SetRoomPassword { password } => {
                state.moderation.set_room_password(password);
                state
                    .roster
                    .send_to(&actor.id, ServerFrame::alert("Room password updated."));
                info!(actor = %actor.id, "Room password rotated");
            }

            AdminAction::Kick { target } => {
                // Notify-then-terminate: the Kicked frame is queued before
                // the delivery handle is dropped, so it drains ahead of the
                // transport teardown. An unknown target is a no-op; the
                // admin's roster view may be briefly stale.
                if state.roster.find(&target).is_some() {
                    state.roster.send_to(&target, ServerFrame::Kicked);
                    state.roster.remove(&target);
                    state.roster.broadcast(&ServerFrame::system(
                        "A participant was removed from the room.",
                    ));
                    state
                        .roster
                        .broadcast(&ServerFrame::roster(state.roster.participants()));
                    info!(actor = %actor.id, target = %target, "Participant kicked");
                }
            }
        }

        Ok(())
    }
}

/// Route a whisper command: `/w <name> <body...>`.
///
/// Delivers exactly two copies: one to the target and an echo to the
/// sender. A command with no body after the target name is silently
/// ignored.
fn route_whisper(
    state: &mut RoomState,
    sender: &Participant,
    command: &str,
) -> Result<(), RouteError> {
    let rest = &command[WHISPER_PREFIX.len()..];
    let Some((target_name, body)) = rest.split_once(' ') else {
        return Ok(());
    };

    let Some(target) = state.roster.find_by_name(target_name) else {
        return Err(RouteError::UserNotFound(target_name.to_string()));
    };
    let target_id = target.id.clone();

    let message = ChatMessage::whisper(sender.clone(), target_name, body);
    state
        .roster
        .send_to(&target_id, ServerFrame::message(message.clone()));
    state
        .roster
        .send_to(&sender.id, ServerFrame::message(message.into_echo()));

    debug!(from = %sender.id, to = %target_id, "Whisper delivered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::Role;
    use std::sync::Arc;
    use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

    const ROOM_PASS: &str = "user123";
    const ADMIN_PASS: &str = "adminSecret";

    fn router() -> Router {
        Router::new(Moderation::new(ROOM_PASS, ADMIN_PASS))
    }

    fn connect(
        router: &Router,
        id: &str,
        name: &str,
    ) -> (Participant, UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let participant = router.join(id.into(), name, ROOM_PASS, false, tx).unwrap();
        (participant, rx)
    }

    fn connect_admin(router: &Router, id: &str) -> (Participant, UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let participant = router.join(id.into(), "boss", ADMIN_PASS, true, tx).unwrap();
        (participant, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_join_delivers_welcome_then_presence() {
        let router = router();
        let (ada, mut rx) = connect(&router, "a", "Ada");
        assert_eq!(ada.role, Role::Standard);

        let frames = drain(&mut rx);
        assert!(matches!(&frames[0], ServerFrame::Welcome { muted: false, .. }));
        assert!(matches!(&frames[1], ServerFrame::Message { .. }));
        match &frames[2] {
            ServerFrame::Roster { participants } => {
                assert_eq!(participants.len(), 1);
                assert_eq!(participants[0].name, "Ada");
            }
            other => panic!("Expected roster snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_join_routes_nothing() {
        let router = router();
        let (_ada, mut rx_a) = connect(&router, "a", "Ada");
        drain(&mut rx_a);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let err = router
            .join("b".into(), "Bob", "wrong", false, tx)
            .unwrap_err();
        assert_eq!(err, AuthError::BadRoomPassword);

        assert!(drain(&mut rx).is_empty());
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(router.stats().participants, 1);
    }

    #[test]
    fn test_racing_joins_same_name_one_winner() {
        let router = Arc::new(router());

        let handles: Vec<_> = ["bob", "BOB"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
                    router
                        .join(format!("p{i}").into(), name, ROOM_PASS, false, tx)
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(router.stats().participants, 1);
    }

    #[test]
    fn test_chat_broadcasts_to_everyone_including_sender() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        let (_bob, mut rx_b) = connect(&router, "b", "Bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        router
            .chat(&ada.id, ChatContent::Text { body: "hello".into() })
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            match &frames[0] {
                ServerFrame::Message {
                    message: ChatMessage::Text { from, body, .. },
                } => {
                    assert_eq!(from.name, "Ada");
                    assert_eq!(body, "hello");
                }
                other => panic!("Expected text message, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_mute_blocks_standard_but_not_admin() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        let (admin, mut rx_m) = connect_admin(&router, "m");
        drain(&mut rx_a);
        drain(&mut rx_m);

        router.admin(&admin.id, AdminAction::ToggleMute).unwrap();
        let frames = drain(&mut rx_a);
        assert!(matches!(&frames[0], ServerFrame::MuteChanged { muted: true }));
        drain(&mut rx_m);

        // Standard sender: rejected, zero deliveries
        let err = router
            .chat(&ada.id, ChatContent::Text { body: "hi".into() })
            .unwrap_err();
        assert_eq!(err, RouteError::ChatMuted);
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_m).is_empty());

        // Admin sender: still broadcast to both
        router
            .chat(
                &admin.id,
                ChatContent::Text { body: "quiet please".into() },
            )
            .unwrap();
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_m).len(), 1);

        // Muted participants may still join; the welcome carries the flag
        let (tx, mut rx_c) = tokio::sync::mpsc::unbounded_channel();
        router.join("c".into(), "Cly", ROOM_PASS, false, tx).unwrap();
        let frames = drain(&mut rx_c);
        assert!(matches!(&frames[0], ServerFrame::Welcome { muted: true, .. }));
    }

    #[test]
    fn test_whisper_delivers_exactly_two_copies() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        let (_bob, mut rx_b) = connect(&router, "b", "Bob");
        let (_cly, mut rx_c) = connect(&router, "c", "Cly");
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        router
            .chat(
                &ada.id,
                ChatContent::Text { body: "/w Bob see you at 5".into() },
            )
            .unwrap();

        let to_bob = drain(&mut rx_b);
        assert_eq!(to_bob.len(), 1);
        match &to_bob[0] {
            ServerFrame::Message {
                message: ChatMessage::Whisper { from, to, body, echo, .. },
            } => {
                assert_eq!(from.name, "Ada");
                assert_eq!(to, "Bob");
                assert_eq!(body, "see you at 5");
                assert!(!echo);
            }
            other => panic!("Expected whisper, got {:?}", other),
        }

        let to_ada = drain(&mut rx_a);
        assert_eq!(to_ada.len(), 1);
        assert!(matches!(
            &to_ada[0],
            ServerFrame::Message {
                message: ChatMessage::Whisper { echo: true, .. }
            }
        ));

        // No third party sees a whisper
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_whisper_unknown_target() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        drain(&mut rx_a);

        let err = router
            .chat(&ada.id, ChatContent::Text { body: "/w Ghost boo".into() })
            .unwrap_err();
        assert_eq!(err, RouteError::UserNotFound("Ghost".to_string()));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_whisper_without_body_is_silently_ignored() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        let (_bob, mut rx_b) = connect(&router, "b", "Bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        router
            .chat(&ada.id, ChatContent::Text { body: "/w Bob".into() })
            .unwrap();

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_typing_excludes_sender() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        let (_bob, mut rx_b) = connect(&router, "b", "Bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        router.typing(&ada.id, true);

        assert!(drain(&mut rx_a).is_empty());
        let frames = drain(&mut rx_b);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], ServerFrame::Typing { active: true, .. }));
    }

    #[test]
    fn test_admin_action_requires_admin_role() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        drain(&mut rx_a);

        let err = router.admin(&ada.id, AdminAction::ToggleMute).unwrap_err();
        assert_eq!(err, RouteError::NotAuthorized);
        assert!(!router.stats().muted);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_clear_chat_broadcasts_directive_and_notice() {
        let router = router();
        let (admin, mut rx_m) = connect_admin(&router, "m");
        let (_ada, mut rx_a) = connect(&router, "a", "Ada");
        drain(&mut rx_m);
        drain(&mut rx_a);

        router.admin(&admin.id, AdminAction::ClearChat).unwrap();

        for rx in [&mut rx_m, &mut rx_a] {
            let frames = drain(rx);
            assert!(matches!(&frames[0], ServerFrame::TranscriptCleared));
            assert!(matches!(&frames[1], ServerFrame::Message { .. }));
        }
    }

    #[test]
    fn test_announcement_is_its_own_event_kind() {
        let router = router();
        let (admin, mut rx_m) = connect_admin(&router, "m");
        drain(&mut rx_m);

        router
            .admin(
                &admin.id,
                AdminAction::Announce { text: "Downtime at noon".into() },
            )
            .unwrap();

        let frames = drain(&mut rx_m);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], ServerFrame::Announcement { .. }));
    }

    #[test]
    fn test_password_rotation_gates_future_joins() {
        let router = router();
        let (admin, mut rx_m) = connect_admin(&router, "m");
        drain(&mut rx_m);

        router
            .admin(
                &admin.id,
                AdminAction::SetRoomPassword { password: "hunter2".into() },
            )
            .unwrap();

        // Confirmation goes to the actor only
        let frames = drain(&mut rx_m);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], ServerFrame::Alert { .. }));

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        assert_eq!(
            router.join("a".into(), "Ada", ROOM_PASS, false, tx).unwrap_err(),
            AuthError::BadRoomPassword
        );

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(router.join("a".into(), "Ada", "hunter2", false, tx).is_ok());
    }

    #[test]
    fn test_kick_notifies_target_before_teardown() {
        let router = router();
        let (admin, mut rx_m) = connect_admin(&router, "m");
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        drain(&mut rx_m);
        drain(&mut rx_a);

        router
            .admin(&admin.id, AdminAction::Kick { target: ada.id.clone() })
            .unwrap();

        // The target's queue ends with Kicked, then the channel closes
        assert!(matches!(rx_a.try_recv(), Ok(ServerFrame::Kicked)));
        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Disconnected));

        // Remaining participants get one notice plus a snapshot
        let frames = drain(&mut rx_m);
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], ServerFrame::Message { .. }));
        match &frames[1] {
            ServerFrame::Roster { participants } => assert_eq!(participants.len(), 1),
            other => panic!("Expected roster snapshot, got {:?}", other),
        }

        // The gateway's subsequent leave finds nothing to announce
        router.leave(&ada.id);
        assert!(drain(&mut rx_m).is_empty());
    }

    #[test]
    fn test_kick_unknown_target_is_noop() {
        let router = router();
        let (admin, mut rx_m) = connect_admin(&router, "m");
        drain(&mut rx_m);

        router
            .admin(&admin.id, AdminAction::Kick { target: "ghost".into() })
            .unwrap();
        assert!(drain(&mut rx_m).is_empty());
    }

    #[test]
    fn test_leave_announces_departure_once() {
        let router = router();
        let (ada, _rx_a) = connect(&router, "a", "Ada");
        let (_bob, mut rx_b) = connect(&router, "b", "Bob");
        drain(&mut rx_b);

        router.leave(&ada.id);
        let frames = drain(&mut rx_b);
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], ServerFrame::Message { .. }));
        assert!(matches!(&frames[1], ServerFrame::Roster { .. }));

        // Second leave is a no-op
        router.leave(&ada.id);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_image_chat_broadcasts() {
        let router = router();
        let (ada, mut rx_a) = connect(&router, "a", "Ada");
        drain(&mut rx_a);

        router
            .chat(&ada.id, ChatContent::Image { data: vec![1, 2, 3] })
            .unwrap();

        let frames = drain(&mut rx_a);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            &frames[0],
            ServerFrame::Message {
                message: ChatMessage::Image { .. }
            }
        ));
    }
}
