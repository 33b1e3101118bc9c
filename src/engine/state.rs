//! Engine state and the load overlay.

use crate::types::{
    CounterSnapshot, DemographicLog, DemographicTag, FunnelStage, HistoryEntry, Preferences,
    SessionClock, Timestamp,
};

/// Everything the engine tracks for one counting session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Count per stage.
    pub counts: CounterSnapshot,

    /// One tag per counted event, per stage.
    pub demographics: DemographicLog,

    /// Audit trail, oldest first, capped.
    pub history: Vec<HistoryEntry>,

    pub clock: SessionClock,

    pub preferences: Preferences,

    /// Sticky tag used when an increment carries none.
    pub current_demographic: DemographicTag,
}

impl EngineState {
    /// A fresh state with default preferences.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count recorded for `stage`.
    pub fn count(&self, stage: FunnelStage) -> u64 {
        self.counts[stage]
    }

    /// Tags logged for `stage`, oldest first.
    pub fn tags(&self, stage: FunnelStage) -> &[DemographicTag] {
        &self.demographics[stage]
    }

    /// Whether every stage has exactly one logged tag per count.
    pub fn logs_match_counts(&self) -> bool {
        FunnelStage::ALL
            .into_iter()
            .all(|stage| self.demographics[stage].len() as u64 == self.counts[stage])
    }

    /// Fresh data carrying over the display mode, the default demographic
    /// index and the current demographic. The cascade policy returns to its
    /// default.
    pub(crate) fn reset_from(previous: &EngineState) -> Self {
        Self {
            preferences: Preferences {
                detailed_mode: previous.preferences.detailed_mode,
                default_demographic_index: previous.preferences.default_demographic_index,
                ..Preferences::default()
            },
            current_demographic: previous.current_demographic,
            ..Self::default()
        }
    }
}

/// A partially decoded persisted state.
///
/// Each `None` field falls back to the fresh default when merged, so a
/// payload missing fields (older or newer versions) still loads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateOverlay {
    pub counts: Option<CounterSnapshot>,
    pub demographics: Option<DemographicLog>,
    pub history: Option<Vec<HistoryEntry>>,
    pub started_at: Option<Timestamp>,
    pub last_activity_at: Option<Timestamp>,
    pub detailed_mode: Option<bool>,
    pub correlate_counters: Option<bool>,
    pub current_demographic: Option<DemographicTag>,
    pub default_demographic_index: Option<usize>,
}

impl StateOverlay {
    /// Overlay onto a freshly constructed state.
    pub fn into_state(self) -> EngineState {
        let fresh = EngineState::new();
        EngineState {
            counts: self.counts.unwrap_or(fresh.counts),
            demographics: self.demographics.unwrap_or(fresh.demographics),
            history: self.history.unwrap_or(fresh.history),
            clock: SessionClock {
                started_at: self.started_at,
                last_activity_at: self.last_activity_at,
            },
            preferences: Preferences {
                detailed_mode: self.detailed_mode.unwrap_or(fresh.preferences.detailed_mode),
                correlate_counters: self
                    .correlate_counters
                    .unwrap_or(fresh.preferences.correlate_counters),
                default_demographic_index: self
                    .default_demographic_index
                    .unwrap_or(fresh.preferences.default_demographic_index),
            },
            current_demographic: self
                .current_demographic
                .unwrap_or(fresh.current_demographic),
        }
    }
}
