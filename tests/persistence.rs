//! Persistence tests: file-backed sessions, reloads, legacy payloads and
//! degraded saves.

use footfall::{
    AgeGroup, DemographicTag, FileSlot, FunnelStage, Gender, ManualClock, MemorySlot,
    PersistenceConfig, SaveOutcome, Session, SessionConfig, StateSlot, Timestamp,
};
use serde_json::json;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn file_session(dir: &TempDir, clock: &ManualClock) -> Session<FileSlot, ManualClock> {
    let slot = FileSlot::open(dir.path().join("tally"), true).unwrap();
    Session::open(slot, PersistenceConfig::default(), clock.clone())
}

// --- Reload ---

#[test]
fn test_file_session_survives_reload() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(Timestamp(1_000));

    let female = DemographicTag::new(Gender::Female, AgeGroup::Mature);
    let male = DemographicTag::new(Gender::Male, AgeGroup::Young);

    {
        let mut session = file_session(&dir, &clock);
        session.increment(FunnelStage::Consulting, Some(female));
        session.increment(FunnelStage::PassingBy, Some(male));
        session.decrement(FunnelStage::PassingBy);
        session.toggle_detailed_mode();
    }

    clock.set(Timestamp(61_000));
    let session = file_session(&dir, &clock);
    let state = session.state();

    assert_eq!(state.counts.passing_by, 1);
    assert_eq!(state.counts.noticing, 1);
    assert_eq!(state.counts.consulting, 1);
    assert_eq!(state.tags(FunnelStage::PassingBy), &[female]);
    assert_eq!(state.history.len(), 5);
    assert!(state.preferences.detailed_mode);
    assert_eq!(state.clock.started_at, Some(Timestamp(1_000)));
    assert_eq!(state.clock.last_activity_at, Some(Timestamp(61_000)));
    assert_eq!(session.session_duration().unwrap().as_secs(), 60);
}

#[test]
fn test_open_or_create_with_config() {
    let dir = TempDir::new().unwrap();
    let config = SessionConfig {
        path: dir.path().join("tally"),
        ..Default::default()
    };

    {
        let mut session = Session::open_or_create(config.clone()).unwrap();
        session.increment(FunnelStage::Buying, None);
        assert!(session.state().clock.is_open());
    }

    let session = Session::open_or_create(config).unwrap();
    assert_eq!(session.total_interactions(), 4);
    assert_eq!(session.rates().overall_rate, 100.0);
}

#[test]
fn test_reset_clears_file_slot() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(Timestamp(1));

    {
        let mut session = file_session(&dir, &clock);
        session.increment(FunnelStage::Buying, None);
        session.set_default_demographic_index(4);
        session.reset();
    }

    let session = file_session(&dir, &clock);
    assert_eq!(session.total_interactions(), 0);
    assert!(session.state().history.is_empty());
    assert_eq!(session.state().preferences.default_demographic_index, 4);
    assert_eq!(
        session.default_demographic(),
        DemographicTag::new(Gender::Male, AgeGroup::YoungAdult)
    );
}

// --- Legacy and partial payloads ---

#[test]
fn test_legacy_flat_counters_migrate() {
    init_tracing();
    let payload = json!({
        "counters": {"passingBy": 3, "noticing": 1, "consulting": 0, "buying": 0},
        "sessionStartTime": 500,
        "lastActivityTime": 900,
        "history": []
    });
    let slot = MemorySlot::with_contents(payload.to_string());
    let clock = ManualClock::new(Timestamp(2_000));

    let mut session = Session::open(slot.clone(), PersistenceConfig::default(), clock);

    let state = session.state();
    assert_eq!(state.counts.passing_by, 3);
    assert_eq!(state.counts.noticing, 1);
    for stage in FunnelStage::ALL {
        assert!(state.tags(stage).is_empty());
    }
    assert_eq!(state.clock.started_at, Some(Timestamp(500)));

    // Untagged counts still decrement.
    session.decrement(FunnelStage::PassingBy);
    assert_eq!(session.state().counts.passing_by, 2);
    assert_eq!(session.breakdown(FunnelStage::PassingBy).tagged(), 0);

    // The slot now holds the current layout.
    let saved: serde_json::Value = serde_json::from_slice(&slot.contents().unwrap()).unwrap();
    assert_eq!(saved["counters"]["total"]["passingBy"], 2);
    assert_eq!(saved["counters"]["demographics"]["passingBy"], json!([]));
}

#[test]
fn test_partial_payload_overlays_defaults() {
    let payload = json!({
        "counters": {"total": {"passingBy": 2, "noticing": 0, "consulting": 0, "buying": 0}},
        "currentDemographic": {"gender": "male", "ageGroup": "mature"}
    });
    let slot = MemorySlot::with_contents(payload.to_string());
    let session = Session::open(slot, PersistenceConfig::default(), ManualClock::default());

    let state = session.state();
    assert_eq!(state.counts.passing_by, 2);
    assert!(state.demographics.passing_by.is_empty());
    assert_eq!(
        state.current_demographic,
        DemographicTag::new(Gender::Male, AgeGroup::Mature)
    );
    assert_eq!(state.preferences.default_demographic_index, 1);
    assert!(state.preferences.correlate_counters);
    assert!(!state.preferences.detailed_mode);
}

#[test]
fn test_corrupt_file_starts_fresh() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally");
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("state.json"), b"\x00\x01 not json").unwrap();

    let slot = FileSlot::open(&path, false).unwrap();
    let mut session = Session::open(slot, PersistenceConfig::default(), ManualClock::default());

    assert_eq!(session.total_interactions(), 0);
    assert_eq!(session.increment(FunnelStage::PassingBy, None), SaveOutcome::Saved);
    assert!(session.persistence().slot().read().unwrap().is_some());
}

// --- Degraded saves ---

#[test]
fn test_session_degrades_large_history() {
    init_tracing();
    let slot = MemorySlot::new();
    let config = PersistenceConfig {
        max_bytes: 16 * 1024,
        degraded_history_len: 10,
    };
    let mut session = Session::open(slot.clone(), config, ManualClock::default());

    let mut last = SaveOutcome::Saved;
    for _ in 0..60 {
        last = session.increment(FunnelStage::Buying, None);
    }

    assert_eq!(last, SaveOutcome::TruncatedHistory);
    // The in-memory history is untouched by the degraded save.
    assert_eq!(session.state().history.len(), 240);

    let reloaded = Session::open(slot, PersistenceConfig::default(), ManualClock::default());
    assert_eq!(reloaded.state().history.len(), 10);
    assert_eq!(reloaded.state().counts.buying, 60);
    assert!(reloaded.state().logs_match_counts());
}
