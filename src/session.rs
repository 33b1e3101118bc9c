//! Session facade tying engine, persistence and statistics together.

use crate::engine::{transition, EngineState, Event};
use crate::error::Result;
use crate::stats::{self, DemographicBreakdown, FunnelRates, SessionReport, StageRow};
use crate::storage::{FileSlot, Persistence, PersistenceConfig, SaveOutcome, StateSlot};
use crate::types::{DemographicTag, FunnelStage, Timestamp};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self(Arc::new(AtomicI64::new(start.0)))
    }

    pub fn set(&self, now: Timestamp) {
        self.0.store(now.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(by))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::SeqCst))
    }
}

/// Configuration for a file-backed session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Slot directory.
    pub path: PathBuf,

    /// Whether to create the slot directory if it doesn't exist.
    pub create_if_missing: bool,

    pub persistence: PersistenceConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./footfall"),
            create_if_missing: true,
            persistence: PersistenceConfig::default(),
        }
    }
}

/// The single owner and writer of an [`EngineState`].
///
/// On open, the persisted state is loaded and a session is started. Every
/// mutation runs the engine and then writes the result through to the
/// slot immediately.
pub struct Session<S: StateSlot = FileSlot, C: Clock = SystemClock> {
    state: EngineState,
    persistence: Persistence<S>,
    clock: C,
}

impl Session {
    /// Open a file-backed session using the wall clock.
    pub fn open_or_create(config: SessionConfig) -> Result<Self> {
        let slot = FileSlot::open(&config.path, config.create_if_missing)?;
        Ok(Self::open(slot, config.persistence, SystemClock))
    }
}

impl<S: StateSlot, C: Clock> Session<S, C> {
    /// Load whatever `slot` holds, then start the session.
    pub fn open(slot: S, config: PersistenceConfig, clock: C) -> Self {
        let mut session = Self {
            state: EngineState::new(),
            persistence: Persistence::new(slot, config),
            clock,
        };

        if let Some(overlay) = session.persistence.load() {
            session.apply(Event::Load(Box::new(overlay)));
        }
        session.dispatch(Event::StartSession);

        debug!(
            started_at = ?session.state.clock.started_at,
            history = session.state.history.len(),
            "session opened"
        );
        session
    }

    // --- Mutations ---

    /// Count one observation at `stage`, cascading upstream when enabled.
    pub fn increment(&mut self, stage: FunnelStage, tag: Option<DemographicTag>) -> SaveOutcome {
        self.dispatch(Event::Increment { stage, tag })
    }

    /// Undo the latest observation at `stage` only.
    pub fn decrement(&mut self, stage: FunnelStage) -> SaveOutcome {
        self.dispatch(Event::Decrement { stage })
    }

    /// Clear all data, keeping detailed mode, the default demographic index
    /// and the current demographic.
    ///
    /// The slot is cleared before the fresh state is written, so a reload
    /// after a failed write still does not bring the old data back.
    pub fn reset(&mut self) -> SaveOutcome {
        self.persistence.clear();
        self.dispatch(Event::Reset)
    }

    pub fn toggle_detailed_mode(&mut self) -> SaveOutcome {
        self.dispatch(Event::ToggleDetailedMode)
    }

    pub fn toggle_correlate_counters(&mut self) -> SaveOutcome {
        self.dispatch(Event::ToggleCorrelateCounters)
    }

    pub fn set_current_demographic(&mut self, tag: DemographicTag) -> SaveOutcome {
        self.dispatch(Event::SetCurrentDemographic(tag))
    }

    pub fn set_default_demographic_index(&mut self, index: usize) -> SaveOutcome {
        self.dispatch(Event::SetDefaultDemographicIndex(index))
    }

    // --- Accessors ---

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Tag selected by the default demographic index, falling back to the
    /// table default when the index is out of range.
    pub fn default_demographic(&self) -> DemographicTag {
        stats::demographic_for_index(self.state.preferences.default_demographic_index)
    }

    // --- Statistics ---

    pub fn rates(&self) -> FunnelRates {
        FunnelRates::from_counts(&self.state.counts)
    }

    pub fn breakdown(&self, stage: FunnelStage) -> DemographicBreakdown {
        stats::breakdown(&self.state, stage)
    }

    pub fn total_interactions(&self) -> u64 {
        stats::total_interactions(&self.state.counts)
    }

    pub fn session_duration(&self) -> Option<Duration> {
        stats::session_duration(&self.state, self.clock.now())
    }

    pub fn report(&self) -> SessionReport<'_> {
        stats::report(&self.state, self.clock.now())
    }

    pub fn stage_rows(&self) -> Vec<StageRow> {
        stats::stage_rows(&self.state)
    }

    fn apply(&mut self, event: Event) {
        let now = self.clock.now();
        let state = std::mem::take(&mut self.state);
        self.state = transition(state, event, now);
    }

    fn dispatch(&mut self, event: Event) -> SaveOutcome {
        self.apply(event);
        self.persistence.save(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlot;
    use crate::types::{AgeGroup, Gender};

    fn memory_session(slot: &MemorySlot, clock: &ManualClock) -> Session<MemorySlot, ManualClock> {
        Session::open(slot.clone(), PersistenceConfig::default(), clock.clone())
    }

    #[test]
    fn test_open_starts_session_and_persists() {
        let slot = MemorySlot::new();
        let clock = ManualClock::new(Timestamp(1_000));
        let session = memory_session(&slot, &clock);

        assert_eq!(session.state().clock.started_at, Some(Timestamp(1_000)));
        assert!(slot.contents().is_some());
    }

    #[test]
    fn test_reopen_keeps_session_start() {
        let slot = MemorySlot::new();
        let clock = ManualClock::new(Timestamp(1_000));

        let mut session = memory_session(&slot, &clock);
        session.increment(FunnelStage::Noticing, None);
        drop(session);

        clock.set(Timestamp(5_000));
        let session = memory_session(&slot, &clock);

        assert_eq!(session.state().clock.started_at, Some(Timestamp(1_000)));
        assert_eq!(session.state().clock.last_activity_at, Some(Timestamp(5_000)));
        assert_eq!(session.state().counts.noticing, 1);
        assert_eq!(session.session_duration(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_mutations_write_through() {
        let slot = MemorySlot::new();
        let clock = ManualClock::new(Timestamp(1));
        let mut session = memory_session(&slot, &clock);

        let tag = DemographicTag::new(Gender::Male, AgeGroup::Young);
        assert_eq!(session.set_current_demographic(tag), SaveOutcome::Saved);
        session.set_default_demographic_index(3);
        session.toggle_detailed_mode();
        session.toggle_correlate_counters();
        session.increment(FunnelStage::Buying, None);

        let reloaded = memory_session(&slot, &clock);
        assert_eq!(reloaded.state().current_demographic, tag);
        assert_eq!(reloaded.state().preferences.default_demographic_index, 3);
        assert!(reloaded.state().preferences.detailed_mode);
        assert!(!reloaded.state().preferences.correlate_counters);
        assert_eq!(reloaded.state().counts.buying, 1);
        assert_eq!(reloaded.state().counts.passing_by, 0);
    }

    #[test]
    fn test_reset_does_not_resurrect_data() {
        let slot = MemorySlot::new();
        let clock = ManualClock::new(Timestamp(1));
        let mut session = memory_session(&slot, &clock);

        session.increment(FunnelStage::Consulting, None);
        session.toggle_detailed_mode();
        session.toggle_correlate_counters();
        session.reset();

        let reloaded = memory_session(&slot, &clock);
        assert_eq!(reloaded.total_interactions(), 0);
        assert!(reloaded.state().history.is_empty());
        assert!(reloaded.state().preferences.detailed_mode);
        assert!(reloaded.state().preferences.correlate_counters);
    }

    #[test]
    fn test_reset_clears_slot_when_fresh_state_cannot_be_saved() {
        let slot = MemorySlot::new();
        let clock = ManualClock::new(Timestamp(1));

        let mut session = memory_session(&slot, &clock);
        session.increment(FunnelStage::Buying, None);
        drop(session);
        assert!(slot.contents().is_some());

        // Nothing fits under a one-byte ceiling, so every save fails.
        let tight = PersistenceConfig {
            max_bytes: 1,
            ..Default::default()
        };
        let mut session = Session::open(slot.clone(), tight, clock.clone());
        assert_eq!(session.state().counts.buying, 1);
        assert_eq!(session.reset(), SaveOutcome::Failed);
        assert!(slot.contents().is_none());
        drop(session);

        let reloaded = memory_session(&slot, &clock);
        assert_eq!(reloaded.total_interactions(), 0);
        assert!(reloaded.state().history.is_empty());
    }

    #[test]
    fn test_default_demographic_out_of_range() {
        let slot = MemorySlot::new();
        let clock = ManualClock::new(Timestamp(1));
        let mut session = memory_session(&slot, &clock);

        session.set_default_demographic_index(9);
        assert_eq!(session.state().preferences.default_demographic_index, 9);
        assert_eq!(
            session.default_demographic(),
            DemographicTag::new(Gender::Female, AgeGroup::YoungAdult)
        );
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(Timestamp(10));
        let shared = clock.clone();
        clock.advance(Duration::from_millis(15));
        assert_eq!(shared.now(), Timestamp(25));

        clock.advance(Duration::MAX);
        assert_eq!(shared.now(), Timestamp(i64::MAX));
    }
}
