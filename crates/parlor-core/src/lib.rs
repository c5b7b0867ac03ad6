//! # parlor-core
//!
//! Session registry, moderation state, and message routing for the Parlor
//! chat server.
//!
//! This crate provides the stateful heart of the room:
//!
//! - **Roster** - Authoritative connection-identity → participant mapping
//! - **Moderation** - Room-wide mute flag and rotating room password
//! - **Router** - Classifies inbound commands and fans out deliveries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Gateway   │────▶│   Router    │────▶│   Roster    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │ Moderation  │
//!                     └─────────────┘
//! ```
//!
//! The router guards the roster and the moderation state behind a single
//! critical section; every operation inside it is in-memory and
//! non-blocking. Delivery happens over per-connection unbounded channels
//! whose receiving ends live in the gateway's connection tasks.

pub mod moderation;
pub mod roster;
pub mod router;

pub use moderation::Moderation;
pub use roster::{AuthError, Outbound, Roster};
pub use router::{RoomStats, RouteError, Router};
