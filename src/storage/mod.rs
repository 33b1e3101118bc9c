//! Durable storage for engine state.
//!
//! A [`StateSlot`] holds one serialized state. [`Persistence`] encodes the
//! engine state into the slot, degrading the payload when it grows past the
//! configured ceiling, and decodes it back as a [`StateOverlay`] that
//! tolerates missing fields and the legacy flat-counter layout.
//!
//! [`StateOverlay`]: crate::engine::StateOverlay

mod adapter;
mod layout;
mod slot;

pub use adapter::{Persistence, PersistenceConfig, SaveOutcome};
pub use layout::{decode, encode};
pub use slot::{FileSlot, MemorySlot, StateSlot};
