//! # Footfall
//!
//! A manual foot-traffic tally engine. An operator records people passing
//! a shop, noticing it, consulting and buying, optionally tagging each
//! observation with a gender and age bracket.
//!
//! ## Core Concepts
//!
//! - **Funnel stages**: passing by, noticing, consulting, buying, in order
//! - **Cascade**: with correlation on, a tap at a stage also counts every
//!   upstream stage, tags included
//! - **Engine**: a pure `(state, event) -> state` transition
//! - **Persistence**: write-through JSON slot that degrades under size
//!   limits and migrates the legacy flat-counter layout
//! - **Statistics**: conversion rates, demographic breakdowns, exports
//!
//! ## Example
//!
//! ```ignore
//! use footfall::{FunnelStage, Session, SessionConfig};
//!
//! let mut session = Session::open_or_create(SessionConfig {
//!     path: "./tally".into(),
//!     ..Default::default()
//! })?;
//!
//! // Counts passing by and noticing
//! session.increment(FunnelStage::Noticing, None);
//!
//! let rates = session.rates().rounded();
//! println!("noticing rate: {}%", rates.noticing_rate);
//! ```

pub mod engine;
pub mod error;
pub mod session;
pub mod stats;
pub mod storage;
pub mod types;

// Re-exports
pub use engine::{transition, EngineState, Event, StateOverlay, HISTORY_LIMIT};
pub use error::{CounterError, Result};
pub use session::{Clock, ManualClock, Session, SessionConfig, SystemClock};
pub use stats::{
    DemographicBreakdown, FunnelRates, SessionReport, SessionInfo, StageRow,
};
pub use storage::{
    FileSlot, MemorySlot, Persistence, PersistenceConfig, SaveOutcome, StateSlot,
};
pub use types::*;
