//! Save/load with progressive degradation.

use super::layout;
use super::slot::StateSlot;
use crate::engine::{EngineState, StateOverlay};
use crate::error::{CounterError, Result};
use crate::types::HistoryEntry;
use tracing::{debug, info, warn};

/// Persistence configuration.
#[derive(Clone, Debug)]
pub struct PersistenceConfig {
    /// Largest payload written to the slot, in bytes.
    /// Default: 5 MiB
    pub max_bytes: usize,

    /// History entries kept on the first degraded retry.
    /// Default: 100
    pub degraded_history_len: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024, // 5 MiB
            degraded_history_len: 100,
        }
    }
}

/// How much of the state a save managed to persist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Full state written.
    Saved,
    /// Written with only the most recent history entries.
    TruncatedHistory,
    /// Written with no history at all.
    DroppedHistory,
    /// Nothing written; the slot keeps its previous contents.
    Failed,
}

impl SaveOutcome {
    pub fn is_saved(self) -> bool {
        !matches!(self, SaveOutcome::Failed)
    }
}

/// Reads and writes engine state through a [`StateSlot`].
///
/// Failures never reach the caller. They are logged and answered with a
/// smaller payload (save) or with an absent state (load).
#[derive(Debug)]
pub struct Persistence<S: StateSlot> {
    slot: S,
    config: PersistenceConfig,
}

impl<S: StateSlot> Persistence<S> {
    pub fn new(slot: S, config: PersistenceConfig) -> Self {
        Self { slot, config }
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Persist `state`.
    ///
    /// Tries the full state, then the state with its history cut to the
    /// last `degraded_history_len` entries, then with no history. The
    /// in-memory state is never modified.
    pub fn save(&self, state: &EngineState) -> SaveOutcome {
        match self.attempt(state, &state.history) {
            Ok(size) => {
                debug!(bytes = size, "saved state");
                return SaveOutcome::Saved;
            }
            Err(e) => warn!(error = %e, "saving full state failed, retrying with recent history"),
        }

        let keep_from = state
            .history
            .len()
            .saturating_sub(self.config.degraded_history_len);
        let recent = &state.history[keep_from..];

        match self.attempt(state, recent) {
            Ok(size) => {
                info!(bytes = size, retained = recent.len(), "saved state with truncated history");
                return SaveOutcome::TruncatedHistory;
            }
            Err(e) => warn!(error = %e, "saving truncated state failed, retrying without history"),
        }

        match self.attempt(state, &[]) {
            Ok(size) => {
                info!(bytes = size, "saved state without history");
                SaveOutcome::DroppedHistory
            }
            Err(e) => {
                warn!(error = %e, "saving state failed");
                SaveOutcome::Failed
            }
        }
    }

    /// Load the persisted state, if any.
    ///
    /// An unreadable slot or undecodable payload loads as absent.
    pub fn load(&self) -> Option<StateOverlay> {
        let bytes = match self.slot.read() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("no persisted state");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "reading persisted state failed");
                return None;
            }
        };

        match layout::decode(&bytes) {
            Ok(overlay) => {
                debug!(bytes = bytes.len(), "loaded persisted state");
                Some(overlay)
            }
            Err(e) => {
                warn!(error = %e, "discarding undecodable persisted state");
                None
            }
        }
    }

    /// Remove the persisted state. Returns whether the slot is now empty.
    pub fn clear(&self) -> bool {
        match self.slot.remove() {
            Ok(()) => {
                debug!("cleared persisted state");
                true
            }
            Err(e) => {
                warn!(error = %e, "clearing persisted state failed");
                false
            }
        }
    }

    fn attempt(&self, state: &EngineState, history: &[HistoryEntry]) -> Result<usize> {
        let bytes = layout::encode(state, history)?;

        if bytes.len() > self.config.max_bytes {
            return Err(CounterError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.config.max_bytes,
            });
        }

        self.slot.write(&bytes)?;
        Ok(bytes.len())
    }
}
