//! Core types for the tally engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        let delta = self.0.saturating_sub(earlier.0).max(0);
        Duration::from_millis(delta as u64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// One of the four ordered observation points.
///
/// The declaration order is the funnel order and drives the cascade
/// direction: every stage implies all stages declared before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunnelStage {
    PassingBy,
    Noticing,
    Consulting,
    Buying,
}

impl FunnelStage {
    /// All stages in funnel order.
    pub const ALL: [FunnelStage; 4] = [
        FunnelStage::PassingBy,
        FunnelStage::Noticing,
        FunnelStage::Consulting,
        FunnelStage::Buying,
    ];

    /// Position in the funnel, 0 for `PassingBy`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// This stage and every stage before it, in funnel order.
    pub fn through(self) -> &'static [FunnelStage] {
        &FUNNEL[..=self.index()]
    }

    /// This stage alone, as a slice.
    pub fn only(self) -> &'static [FunnelStage] {
        let i = self.index();
        &FUNNEL[i..=i]
    }

    /// The stage immediately upstream, if any.
    pub fn previous(self) -> Option<FunnelStage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Persisted key for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            FunnelStage::PassingBy => "passingBy",
            FunnelStage::Noticing => "noticing",
            FunnelStage::Consulting => "consulting",
            FunnelStage::Buying => "buying",
        }
    }
}

static FUNNEL: [FunnelStage; 4] = FunnelStage::ALL;

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    /// 0-19.
    Young,
    /// 20-35.
    YoungAdult,
    /// 36 and over.
    Mature,
}

/// A gender/age-bracket pair attached to a single counted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicTag {
    pub gender: Gender,
    pub age_group: AgeGroup,
}

impl DemographicTag {
    pub const fn new(gender: Gender, age_group: AgeGroup) -> Self {
        Self { gender, age_group }
    }

    /// Look up a tag in [`DEMOGRAPHIC_TABLE`].
    pub fn from_index(index: usize) -> Option<Self> {
        DEMOGRAPHIC_TABLE.get(index).copied()
    }

    /// Position of this tag in [`DEMOGRAPHIC_TABLE`].
    pub fn table_index(&self) -> usize {
        DEMOGRAPHIC_TABLE
            .iter()
            .position(|t| t == self)
            .unwrap_or(DEFAULT_DEMOGRAPHIC_INDEX)
    }
}

impl Default for DemographicTag {
    fn default() -> Self {
        DEMOGRAPHIC_TABLE[DEFAULT_DEMOGRAPHIC_INDEX]
    }
}

/// The six gender x age combinations, addressed by index everywhere.
pub const DEMOGRAPHIC_TABLE: [DemographicTag; 6] = [
    DemographicTag::new(Gender::Female, AgeGroup::Young),
    DemographicTag::new(Gender::Female, AgeGroup::YoungAdult),
    DemographicTag::new(Gender::Female, AgeGroup::Mature),
    DemographicTag::new(Gender::Male, AgeGroup::Young),
    DemographicTag::new(Gender::Male, AgeGroup::YoungAdult),
    DemographicTag::new(Gender::Male, AgeGroup::Mature),
];

/// Index of female/young-adult, the out-of-the-box default.
pub const DEFAULT_DEMOGRAPHIC_INDEX: usize = 1;

/// One value per funnel stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    default,
    bound(deserialize = "T: Deserialize<'de> + Default")
)]
pub struct StageMap<T> {
    pub passing_by: T,
    pub noticing: T,
    pub consulting: T,
    pub buying: T,
}

impl<T> StageMap<T> {
    /// Iterate `(stage, value)` pairs in funnel order.
    pub fn iter(&self) -> impl Iterator<Item = (FunnelStage, &T)> {
        FunnelStage::ALL.into_iter().map(move |stage| (stage, &self[stage]))
    }

    /// Build a new map by projecting every entry.
    pub fn map<U>(&self, mut f: impl FnMut(FunnelStage, &T) -> U) -> StageMap<U> {
        StageMap {
            passing_by: f(FunnelStage::PassingBy, &self.passing_by),
            noticing: f(FunnelStage::Noticing, &self.noticing),
            consulting: f(FunnelStage::Consulting, &self.consulting),
            buying: f(FunnelStage::Buying, &self.buying),
        }
    }
}

impl<T> Index<FunnelStage> for StageMap<T> {
    type Output = T;

    fn index(&self, stage: FunnelStage) -> &T {
        match stage {
            FunnelStage::PassingBy => &self.passing_by,
            FunnelStage::Noticing => &self.noticing,
            FunnelStage::Consulting => &self.consulting,
            FunnelStage::Buying => &self.buying,
        }
    }
}

impl<T> IndexMut<FunnelStage> for StageMap<T> {
    fn index_mut(&mut self, stage: FunnelStage) -> &mut T {
        match stage {
            FunnelStage::PassingBy => &mut self.passing_by,
            FunnelStage::Noticing => &mut self.noticing,
            FunnelStage::Consulting => &mut self.consulting,
            FunnelStage::Buying => &mut self.buying,
        }
    }
}

/// Count per stage. Unsigned, so never negative.
pub type CounterSnapshot = StageMap<u64>;

/// Tags per stage, oldest first. Only appended to or popped from the tail.
pub type DemographicLog = StageMap<Vec<DemographicTag>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Increment,
    Decrement,
}

/// A single audit entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,

    /// Stage the entry applies to.
    #[serde(rename = "type")]
    pub stage: FunnelStage,

    /// Count of `stage` after the action.
    pub value: u64,

    pub action: HistoryAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographic: Option<DemographicTag>,
}

/// Start and last-activity times of the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionClock {
    /// Set once per session, cleared only by a reset.
    pub started_at: Option<Timestamp>,
    pub last_activity_at: Option<Timestamp>,
}

impl SessionClock {
    /// Record activity at `now`, opening the session if needed.
    pub fn touch(&mut self, now: Timestamp) {
        self.started_at.get_or_insert(now);
        self.last_activity_at = Some(now);
    }

    pub fn is_open(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Operator preferences. All but `correlate_counters` survive a data reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preferences {
    /// Display granularity only.
    pub detailed_mode: bool,

    /// When set, a tap at one stage also counts every upstream stage.
    pub correlate_counters: bool,

    /// Index into [`DEMOGRAPHIC_TABLE`]. Not range-checked.
    pub default_demographic_index: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            detailed_mode: false,
            correlate_counters: true,
            default_demographic_index: DEFAULT_DEMOGRAPHIC_INDEX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_through() {
        assert!(FunnelStage::PassingBy < FunnelStage::Buying);
        assert_eq!(FunnelStage::PassingBy.through(), &[FunnelStage::PassingBy]);
        assert_eq!(
            FunnelStage::Consulting.through(),
            &[
                FunnelStage::PassingBy,
                FunnelStage::Noticing,
                FunnelStage::Consulting
            ]
        );
        assert_eq!(FunnelStage::Buying.through().len(), 4);
    }

    #[test]
    fn test_stage_previous() {
        assert_eq!(FunnelStage::PassingBy.previous(), None);
        assert_eq!(FunnelStage::Buying.previous(), Some(FunnelStage::Consulting));
    }

    #[test]
    fn test_demographic_table_lookup() {
        assert_eq!(
            DemographicTag::from_index(1),
            Some(DemographicTag::new(Gender::Female, AgeGroup::YoungAdult))
        );
        assert_eq!(DemographicTag::from_index(6), None);
        for (i, tag) in DEMOGRAPHIC_TABLE.iter().enumerate() {
            assert_eq!(tag.table_index(), i);
        }
    }

    #[test]
    fn test_tag_wire_format() {
        let tag = DemographicTag::new(Gender::Male, AgeGroup::YoungAdult);
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, r#"{"gender":"male","ageGroup":"young_adult"}"#);
    }

    #[test]
    fn test_history_entry_wire_format() {
        let entry = HistoryEntry {
            timestamp: Timestamp(42),
            stage: FunnelStage::PassingBy,
            value: 3,
            action: HistoryAction::Decrement,
            demographic: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": 42,
                "type": "passingBy",
                "value": 3,
                "action": "decrement"
            })
        );
    }

    #[test]
    fn test_stage_map_partial_decode() {
        let counts: CounterSnapshot = serde_json::from_str(r#"{"noticing": 4}"#).unwrap();
        assert_eq!(counts.passing_by, 0);
        assert_eq!(counts[FunnelStage::Noticing], 4);
    }

    #[test]
    fn test_session_clock_touch_keeps_start() {
        let mut clock = SessionClock::default();
        clock.touch(Timestamp(10));
        clock.touch(Timestamp(20));
        assert_eq!(clock.started_at, Some(Timestamp(10)));
        assert_eq!(clock.last_activity_at, Some(Timestamp(20)));
    }
}
