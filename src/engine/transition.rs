//! Event application.

use super::state::{EngineState, StateOverlay};
use crate::types::{DemographicTag, FunnelStage, HistoryAction, HistoryEntry, Timestamp};

/// Maximum retained history entries. Oldest are evicted first.
pub const HISTORY_LIMIT: usize = 1000;

/// An input to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Count one observation at `stage`, tagged with `tag` or the current
    /// demographic when absent.
    Increment {
        stage: FunnelStage,
        tag: Option<DemographicTag>,
    },

    /// Undo the most recent observation at `stage`. Never cascades.
    Decrement { stage: FunnelStage },

    SetCurrentDemographic(DemographicTag),

    /// Accepted as-is; range validity is the caller's concern.
    SetDefaultDemographicIndex(usize),

    ToggleDetailedMode,

    ToggleCorrelateCounters,

    /// Clear data. Keeps detailed mode, the default demographic index and
    /// the current demographic.
    Reset,

    /// Open the session if needed and mark activity.
    StartSession,

    /// Replace the state with a persisted overlay merged onto defaults.
    Load(Box<StateOverlay>),
}

/// Apply an event to a state.
///
/// Total: every event yields a valid state, and the history cap is
/// enforced afterwards regardless of the event.
pub fn transition(state: EngineState, event: Event, now: Timestamp) -> EngineState {
    let mut next = match event {
        Event::Increment { stage, tag } => increment(state, stage, tag, now),

        Event::Decrement { stage } => decrement(state, stage, now),

        Event::SetCurrentDemographic(tag) => EngineState {
            current_demographic: tag,
            ..state
        },

        Event::SetDefaultDemographicIndex(index) => {
            let mut state = state;
            state.preferences.default_demographic_index = index;
            state
        }

        Event::ToggleDetailedMode => {
            let mut state = state;
            state.preferences.detailed_mode = !state.preferences.detailed_mode;
            state
        }

        Event::ToggleCorrelateCounters => {
            let mut state = state;
            state.preferences.correlate_counters = !state.preferences.correlate_counters;
            state
        }

        Event::Reset => EngineState::reset_from(&state),

        Event::StartSession => {
            let mut state = state;
            state.clock.touch(now);
            state
        }

        Event::Load(overlay) => overlay.into_state(),
    };

    truncate_history(&mut next.history);
    next
}

fn increment(
    mut state: EngineState,
    stage: FunnelStage,
    tag: Option<DemographicTag>,
    now: Timestamp,
) -> EngineState {
    let tag = tag.unwrap_or(state.current_demographic);

    let cascade: &[FunnelStage] = if state.preferences.correlate_counters {
        stage.through()
    } else {
        stage.only()
    };

    for &target in cascade {
        state.counts[target] += 1;
        state.demographics[target].push(tag);
        state.history.push(HistoryEntry {
            timestamp: now,
            stage: target,
            value: state.counts[target],
            action: HistoryAction::Increment,
            demographic: Some(tag),
        });
    }

    state.clock.touch(now);
    state
}

fn decrement(mut state: EngineState, stage: FunnelStage, now: Timestamp) -> EngineState {
    let current = state.counts[stage];
    if current > 0 {
        state.counts[stage] = current - 1;
        // Legacy payloads may carry counts without tags.
        state.demographics[stage].pop();
    }

    state.history.push(HistoryEntry {
        timestamp: now,
        stage,
        value: state.counts[stage],
        action: HistoryAction::Decrement,
        demographic: None,
    });

    state.clock.last_activity_at = Some(now);
    state
}

fn truncate_history(history: &mut Vec<HistoryEntry>) {
    if history.len() > HISTORY_LIMIT {
        let excess = history.len() - HISTORY_LIMIT;
        history.drain(..excess);
    }
}
