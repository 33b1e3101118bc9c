//! Persisted state layout.
//!
//! The layout is versionless. Decoding works field by field: a field that
//! is absent or fails to decode is left unset in the overlay and falls back
//! to its default, so payloads written by older or newer versions still
//! load. Two `counters` shapes are accepted:
//!
//! - current: `{ "total": {stage: n}, "demographics": {stage: [tag]} }`
//! - legacy: `{stage: n}`, written before demographic tracking existed

use crate::engine::{EngineState, StateOverlay};
use crate::error::{CounterError, Result};
use crate::types::{
    CounterSnapshot, DemographicLog, DemographicTag, FunnelStage, HistoryEntry, Timestamp,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState<'a> {
    counters: PersistedCounters<'a>,
    detailed_mode: bool,
    current_demographic: DemographicTag,
    default_demographic_index: usize,
    session_start_time: Option<Timestamp>,
    last_activity_time: Option<Timestamp>,
    history: &'a [HistoryEntry],
    preferences: PersistedPreferences,
}

#[derive(Serialize)]
struct PersistedCounters<'a> {
    total: &'a CounterSnapshot,
    demographics: &'a DemographicLog,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedPreferences {
    correlate_counters: bool,
}

/// Encode `state`, writing `history` in place of the state's own history.
///
/// Passing a suffix of `state.history` lets the caller shrink the payload
/// without cloning the state.
pub fn encode(state: &EngineState, history: &[HistoryEntry]) -> Result<Vec<u8>> {
    let persisted = PersistedState {
        counters: PersistedCounters {
            total: &state.counts,
            demographics: &state.demographics,
        },
        detailed_mode: state.preferences.detailed_mode,
        current_demographic: state.current_demographic,
        default_demographic_index: state.preferences.default_demographic_index,
        session_start_time: state.clock.started_at,
        last_activity_time: state.clock.last_activity_at,
        history,
        preferences: PersistedPreferences {
            correlate_counters: state.preferences.correlate_counters,
        },
    };

    serde_json::to_vec(&persisted).map_err(|e| CounterError::Serialization(e.to_string()))
}

/// Decode a persisted payload into an overlay.
///
/// Fails only when the payload is not a JSON object at all.
pub fn decode(bytes: &[u8]) -> Result<StateOverlay> {
    let value: Value = serde_json::from_slice(bytes)?;

    let Value::Object(root) = value else {
        return Err(CounterError::InvalidFormat(
            "persisted state is not an object".into(),
        ));
    };

    let mut overlay = StateOverlay::default();

    match root.get("counters") {
        Some(Value::Object(counters)) => decode_counters(counters, &mut overlay),
        Some(_) => warn!(field = "counters", "discarding non-object counters"),
        None => {}
    }

    overlay.detailed_mode = field(&root, "detailedMode");
    overlay.current_demographic = field(&root, "currentDemographic");
    overlay.default_demographic_index = field(&root, "defaultDemographicIndex");
    overlay.started_at = field::<Option<Timestamp>>(&root, "sessionStartTime").flatten();
    overlay.last_activity_at = field::<Option<Timestamp>>(&root, "lastActivityTime").flatten();
    overlay.history = decode_history(&root);

    if let Some(Value::Object(preferences)) = root.get("preferences") {
        overlay.correlate_counters = field(preferences, "correlateCounters");
    }

    Ok(overlay)
}

/// Whether `counters` is the flat stage -> integer mapping.
fn is_legacy_counters(counters: &Map<String, Value>) -> bool {
    !counters.contains_key("total")
        && FunnelStage::ALL
            .iter()
            .any(|stage| counters.get(stage.as_str()).is_some_and(Value::is_number))
}

fn decode_counters(counters: &Map<String, Value>, overlay: &mut StateOverlay) {
    if is_legacy_counters(counters) {
        info!("migrating legacy flat counters, demographic logs start empty");
        overlay.counts = decode_value(&Value::Object(counters.clone()), "counters");
        overlay.demographics = Some(DemographicLog::default());
    } else {
        overlay.counts = field(counters, "total");
        overlay.demographics = field(counters, "demographics");
    }
}

fn decode_history(root: &Map<String, Value>) -> Option<Vec<HistoryEntry>> {
    let entries: Vec<Value> = field(root, "history")?;
    let total = entries.len();

    let history: Vec<HistoryEntry> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();

    if history.len() < total {
        warn!(
            dropped = total - history.len(),
            "discarding undecodable history entries"
        );
    }
    Some(history)
}

fn field<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<T> {
    decode_value(object.get(key)?, key)
}

fn decode_value<T: DeserializeOwned>(value: &Value, key: &str) -> Option<T> {
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(field = key, error = %e, "discarding undecodable field");
            None
        }
    }
}
