//! Counting engine.
//!
//! A pure state-transition function over [`EngineState`]. Every event
//! produces a fully transitioned state; there are no partial updates and
//! no error paths.

mod state;
mod transition;

pub use state::{EngineState, StateOverlay};
pub use transition::{transition, Event, HISTORY_LIMIT};
