use chrono::{Datelike, Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::store::InMemoryMatchStore;

// ── Constants ──────────────────────────────────────────────────────────

pub const SLOTS_PER_WEEK: usize = 7;
pub const BRACKET_SIZE: usize = 16;
pub const BRACKET_NODE_COUNT: usize = 15;
pub const MAX_CASCADE_DEPTH: usize = 4;
pub const DEFAULT_MATCH_TIME: &str = "19:00";
pub const PLACEHOLDER_VENUE: &str = "TBD";
pub const FINAL_LABEL: &str = "FINAL";

// ── Shared state type aliases ──────────────────────────────────────────

pub type TeamId = u32;
pub type MatchId = u64;
pub type CompetitionId = u32;
pub type SharedMatchStore = Arc<InMemoryMatchStore>;

// ── Season data ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

impl Team {
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Team { id, name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeslot {
    pub id: u32,
    pub venue_id: u32,
    /// 1 = Monday .. 7 = Sunday
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A cup fixture already occupying a league slot in some week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedSlot {
    pub week: NaiveDate,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayingWeek {
    /// Always a Monday.
    pub monday: NaiveDate,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub reserved_slots: BTreeSet<usize>,
}

impl PlayingWeek {
    pub fn new(monday: NaiveDate) -> Self {
        PlayingWeek {
            monday: monday_of(monday),
            reserved_slots: BTreeSet::new(),
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.monday, self.monday + Days::new(6))
    }

    pub fn is_slot_free(&self, slot: usize) -> bool {
        !self.reserved_slots.contains(&slot)
    }

    pub fn free_slot_count(&self, slots_per_week: usize) -> usize {
        (0..slots_per_week).filter(|slot| self.is_slot_free(*slot)).count()
    }

    pub fn date_for_weekday(&self, day_of_week: u8) -> NaiveDate {
        let offset = u64::from(day_of_week.clamp(1, 7) - 1);
        self.monday + Days::new(offset)
    }
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

// ── Fixtures ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pool {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RoundKind {
    Regular,
    Playoff { pool: Pool, round: u8 },
}

impl RoundKind {
    pub fn code_prefix(&self) -> &'static str {
        match self {
            RoundKind::Regular => "R",
            RoundKind::Playoff { pool: Pool::Top, .. } => "T",
            RoundKind::Playoff { pool: Pool::Bottom, .. } => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub home: TeamId,
    pub away: TeamId,
    pub matchday: usize,
    pub kind: RoundKind,
}

impl Fixture {
    pub fn reversed(&self, matchday: usize) -> Fixture {
        Fixture {
            home: self.away,
            away: self.home,
            matchday,
            kind: self.kind,
        }
    }
}

// ── Matches ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Home,
    Away,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => f.write_str("home"),
            Side::Away => f.write_str("away"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Score { home, away }
    }

    /// `None` for a level score.
    pub fn winner_side(&self) -> Option<Side> {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => Some(Side::Home),
            std::cmp::Ordering::Less => Some(Side::Away),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchState {
    Unscheduled,
    Scheduled,
    Completed,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSchedule {
    pub week: NaiveDate,
    pub slot: usize,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub venue: String,
    pub timeslot_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum MatchKind {
    League {
        matchday: usize,
        round: RoundKind,
    },
    Cup {
        label: String,
        next_label: Option<String>,
        home_source: Option<String>,
        away_source: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: MatchId,
    pub competition_id: CompetitionId,
    pub code: String,
    pub home_team: Option<TeamId>,
    pub away_team: Option<TeamId>,
    pub kind: MatchKind,
    pub schedule: Option<MatchSchedule>,
    pub score: Option<Score>,
    pub completed: bool,
    pub locked: bool,
}

impl MatchRecord {
    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            MatchKind::Cup { label, .. } => Some(label.as_str()),
            MatchKind::League { .. } => None,
        }
    }

    pub fn next_label(&self) -> Option<&str> {
        match &self.kind {
            MatchKind::Cup { next_label, .. } => next_label.as_deref(),
            MatchKind::League { .. } => None,
        }
    }

    pub fn source_for(&self, side: Side) -> Option<&str> {
        match &self.kind {
            MatchKind::Cup { home_source, away_source, .. } => match side {
                Side::Home => home_source.as_deref(),
                Side::Away => away_source.as_deref(),
            },
            MatchKind::League { .. } => None,
        }
    }

    pub fn team(&self, side: Side) -> Option<TeamId> {
        match side {
            Side::Home => self.home_team,
            Side::Away => self.away_team,
        }
    }

    pub fn set_team(&mut self, side: Side, team: Option<TeamId>) {
        match side {
            Side::Home => self.home_team = team,
            Side::Away => self.away_team = team,
        }
    }

    pub fn has_both_teams(&self) -> bool {
        self.home_team.is_some() && self.away_team.is_some()
    }

    pub fn state(&self) -> MatchState {
        if self.locked {
            MatchState::Locked
        } else if self.completed {
            MatchState::Completed
        } else if self.has_both_teams() {
            MatchState::Scheduled
        } else {
            MatchState::Unscheduled
        }
    }

    /// Winner of a completed match, read from the recorded score.
    pub fn winner(&self) -> Option<TeamId> {
        if !self.completed {
            return None;
        }
        let side = self.score?.winner_side()?;
        self.team(side)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchUpdate {
    RecordScore(Score),
    ClearScore,
    SetLocked(bool),
}

/// Who is asking for an edit; locked matches only accept `Override`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditAuthority {
    Standard,
    Override,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_playing_week_normalizes_to_monday() {
        // 2025-09-04 is a Thursday
        let week = PlayingWeek::new(date(2025, 9, 4));
        assert_eq!(week.monday, date(2025, 9, 1));
        assert_eq!(week.date_for_weekday(2), date(2025, 9, 2));
        assert_eq!(week.range().end, date(2025, 9, 7));
    }

    #[test]
    fn test_score_winner_side() {
        assert_eq!(Score::new(3, 1).winner_side(), Some(Side::Home));
        assert_eq!(Score::new(0, 2).winner_side(), Some(Side::Away));
        assert_eq!(Score::new(2, 2).winner_side(), None);
    }

    #[test]
    fn test_match_state_progression() {
        let mut record = MatchRecord {
            id: 1,
            competition_id: 1,
            code: "CUP-QF-1".to_string(),
            home_team: None,
            away_team: None,
            kind: MatchKind::Cup {
                label: "QF-1".to_string(),
                next_label: Some("SF-1".to_string()),
                home_source: Some("1/8-1".to_string()),
                away_source: Some("1/8-2".to_string()),
            },
            schedule: None,
            score: None,
            completed: false,
            locked: false,
        };
        assert_eq!(record.state(), MatchState::Unscheduled);
        record.home_team = Some(1);
        record.away_team = Some(2);
        assert_eq!(record.state(), MatchState::Scheduled);
        record.score = Some(Score::new(1, 4));
        record.completed = true;
        assert_eq!(record.state(), MatchState::Completed);
        assert_eq!(record.winner(), Some(2));
        record.locked = true;
        assert_eq!(record.state(), MatchState::Locked);
    }
}
