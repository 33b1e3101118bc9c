//! Read-only projections of engine state.
//!
//! Funnel conversion rates, demographic breakdowns, session duration, and
//! the export payloads an external formatter turns into JSON or CSV.

use crate::engine::EngineState;
use crate::types::{
    AgeGroup, CounterSnapshot, DemographicTag, FunnelStage, Gender, HistoryEntry, StageMap,
    Timestamp, DEFAULT_DEMOGRAPHIC_INDEX,
};
use serde::Serialize;
use std::time::Duration;

/// Percentage of `numerator` over `denominator`, 0 when the denominator is 0.
pub fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 100.0
}

/// Round to one decimal place for display.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Conversion rates between adjacent stages and across the whole funnel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelRates {
    /// Noticing over passing by.
    pub noticing_rate: f64,
    /// Consulting over noticing.
    pub consulting_rate: f64,
    /// Buying over consulting.
    pub buying_rate: f64,
    /// Buying over passing by.
    pub overall_rate: f64,
}

impl FunnelRates {
    pub fn from_counts(counts: &CounterSnapshot) -> Self {
        Self {
            noticing_rate: rate(counts.noticing, counts.passing_by),
            consulting_rate: rate(counts.consulting, counts.noticing),
            buying_rate: rate(counts.buying, counts.consulting),
            overall_rate: rate(counts.buying, counts.passing_by),
        }
    }

    /// Every rate rounded to one decimal.
    pub fn rounded(&self) -> Self {
        Self {
            noticing_rate: round_to_tenth(self.noticing_rate),
            consulting_rate: round_to_tenth(self.consulting_rate),
            buying_rate: round_to_tenth(self.buying_rate),
            overall_rate: round_to_tenth(self.overall_rate),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GenderCounts {
    pub male: usize,
    pub female: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AgeCounts {
    pub young: usize,
    pub young_adult: usize,
    pub mature: usize,
}

/// Tag counts for one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicBreakdown {
    /// Stage count. May exceed the tagged total for migrated legacy data.
    pub total: u64,
    pub by_gender: GenderCounts,
    pub by_age: AgeCounts,
}

impl DemographicBreakdown {
    fn from_tags(total: u64, tags: &[DemographicTag]) -> Self {
        let mut breakdown = Self {
            total,
            ..Default::default()
        };

        for tag in tags {
            match tag.gender {
                Gender::Male => breakdown.by_gender.male += 1,
                Gender::Female => breakdown.by_gender.female += 1,
            }
            match tag.age_group {
                AgeGroup::Young => breakdown.by_age.young += 1,
                AgeGroup::YoungAdult => breakdown.by_age.young_adult += 1,
                AgeGroup::Mature => breakdown.by_age.mature += 1,
            }
        }

        breakdown
    }

    /// Number of tags the breakdown was drawn from.
    pub fn tagged(&self) -> usize {
        self.by_gender.male + self.by_gender.female
    }
}

/// Demographic breakdown for `stage`.
pub fn breakdown(state: &EngineState, stage: FunnelStage) -> DemographicBreakdown {
    DemographicBreakdown::from_tags(state.counts[stage], &state.demographics[stage])
}

/// Breakdowns for every stage.
pub fn breakdowns(state: &EngineState) -> StageMap<DemographicBreakdown> {
    state
        .counts
        .map(|stage, &total| DemographicBreakdown::from_tags(total, &state.demographics[stage]))
}

/// Time since the session opened, `None` if no session is open.
pub fn session_duration(state: &EngineState, now: Timestamp) -> Option<Duration> {
    state
        .clock
        .started_at
        .map(|started| now.saturating_since(started))
}

/// Sum of every stage count.
pub fn total_interactions(counts: &CounterSnapshot) -> u64 {
    counts.iter().map(|(_, &count)| count).sum()
}

/// Tag at `index` in the demographic table, or the default tag when
/// `index` is out of range.
pub fn demographic_for_index(index: usize) -> DemographicTag {
    DemographicTag::from_index(index)
        .or_else(|| DemographicTag::from_index(DEFAULT_DEMOGRAPHIC_INDEX))
        .unwrap_or_default()
}

/// Session timing for the export payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub start_time: Option<Timestamp>,
    pub last_activity_time: Option<Timestamp>,
    /// Milliseconds since the session opened, 0 if none is open.
    pub session_duration: u64,
    pub detailed_mode_used: bool,
}

/// Derived figures for the export payload.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    #[serde(flatten)]
    pub rates: FunnelRates,
    pub total_interactions: u64,
}

/// Full-detail export payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport<'a> {
    pub export_timestamp: Timestamp,
    pub session_info: SessionInfo,
    pub counters: &'a CounterSnapshot,
    pub demographics: StageMap<DemographicBreakdown>,
    pub statistics: ReportStatistics,
    pub history: &'a [HistoryEntry],
}

/// Build the full-detail export payload as of `now`.
pub fn report(state: &EngineState, now: Timestamp) -> SessionReport<'_> {
    let duration = session_duration(state, now).unwrap_or_default();

    SessionReport {
        export_timestamp: now,
        session_info: SessionInfo {
            start_time: state.clock.started_at,
            last_activity_time: state.clock.last_activity_at,
            session_duration: duration.as_millis() as u64,
            detailed_mode_used: state.preferences.detailed_mode,
        },
        counters: &state.counts,
        demographics: breakdowns(state),
        statistics: ReportStatistics {
            rates: FunnelRates::from_counts(&state.counts),
            total_interactions: total_interactions(&state.counts),
        },
        history: &state.history,
    }
}

/// One row of the tabular export.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRow {
    pub stage: FunnelStage,
    pub total: u64,
    pub male: usize,
    pub female: usize,
    pub young: usize,
    pub young_adult: usize,
    pub mature: usize,
    /// Conversion from the previous stage, `None` for the first stage.
    pub rate: Option<f64>,
}

/// Tabular export: one row per stage in funnel order.
pub fn stage_rows(state: &EngineState) -> Vec<StageRow> {
    breakdowns(state)
        .iter()
        .map(|(stage, breakdown)| StageRow {
            stage,
            total: breakdown.total,
            male: breakdown.by_gender.male,
            female: breakdown.by_gender.female,
            young: breakdown.by_age.young,
            young_adult: breakdown.by_age.young_adult,
            mature: breakdown.by_age.mature,
            rate: stage
                .previous()
                .map(|prev| rate(breakdown.total, state.counts[prev])),
        })
        .collect()
}
