use chrono::{NaiveDate, NaiveTime};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bracket::{
    bracket_nodes, build_bracket, AdvanceReport, BracketEngine, BracketNode, ClearReport,
};
use crate::calendar::eligible_weeks;
use crate::distribution::distribute;
use crate::error::ScheduleError;
use crate::match_details::assign_details;
use crate::playoffs::generate_playoffs;
use crate::round_robin::{generate_round_robin, matchday_count};
use crate::store::MatchStore;
use crate::timeslots::TimeslotResolver;
use crate::types::*;

// ── Collaborators ──────────────────────────────────────────────────────

pub trait TeamSource {
    /// Teams of a competition. For playoffs the order is the standings.
    fn list_teams(&self, competition_id: CompetitionId) -> Result<Vec<Team>, ScheduleError>;
}

pub trait SeasonSource {
    fn venues(&self) -> Vec<Venue>;
    fn timeslots(&self) -> Vec<Timeslot>;
    fn blackout_periods(&self) -> Vec<DateRange>;
    fn reserved_slots(&self) -> Vec<ReservedSlot> {
        Vec::new()
    }
}

impl TeamSource for Vec<Team> {
    fn list_teams(&self, _competition_id: CompetitionId) -> Result<Vec<Team>, ScheduleError> {
        Ok(self.clone())
    }
}

// ── Requests and summaries ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingOptions {
    pub slots_per_week: usize,
    pub default_time: NaiveTime,
    pub placeholder_venue: String,
}

impl Default for SchedulingOptions {
    fn default() -> Self {
        SchedulingOptions {
            slots_per_week: SLOTS_PER_WEEK,
            default_time: default_match_time(),
            placeholder_venue: PLACEHOLDER_VENUE.to_string(),
        }
    }
}

pub fn default_match_time() -> NaiveTime {
    NaiveTime::parse_from_str(DEFAULT_MATCH_TIME, "%H:%M").unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CompetitionFormat {
    RoundRobin { rounds: u8 },
    Cup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionRequest {
    pub competition_id: CompetitionId,
    pub code: String,
    #[serde(default)]
    pub format: Option<CompetitionFormat>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub playoff_pool_size: Option<usize>,
    /// Fixed seed for the cup draw; a random draw when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CompetitionRequest {
    fn validate_code(&self) -> Result<(), ScheduleError> {
        if self.code.trim().is_empty() {
            return Err(ScheduleError::input("competition code is empty"));
        }
        Ok(())
    }

    fn format(&self) -> Result<CompetitionFormat, ScheduleError> {
        self.format
            .ok_or_else(|| ScheduleError::input("no competition format selected"))
    }

    fn date_range(&self) -> Result<DateRange, ScheduleError> {
        let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
            return Err(ScheduleError::input("start and end dates are required"));
        };
        if end < start {
            return Err(ScheduleError::input(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(DateRange::new(start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub competition_id: CompetitionId,
    pub fixtures: usize,
    pub matchdays: usize,
    pub weeks_available: usize,
    pub weeks_used: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupSummary {
    pub competition_id: CompetitionId,
    pub nodes: Vec<BracketNode>,
}

// ── Season snapshot ────────────────────────────────────────────────────

/// Season data read once at the start of a generation run.
#[derive(Debug, Clone)]
pub struct SeasonSnapshot {
    pub resolver: TimeslotResolver,
    pub blackouts: Vec<DateRange>,
    pub reserved: Vec<ReservedSlot>,
    pub slots_per_week: usize,
}

impl SeasonSnapshot {
    pub fn capture(
        source: &dyn SeasonSource,
        options: &SchedulingOptions,
    ) -> Result<Self, ScheduleError> {
        if options.slots_per_week == 0 {
            return Err(ScheduleError::input("slots per week must be at least 1"));
        }
        let resolver = TimeslotResolver::new(
            &source.timeslots(),
            &source.venues(),
            options.default_time,
            &options.placeholder_venue,
        )?;
        Ok(SeasonSnapshot {
            resolver,
            blackouts: source.blackout_periods(),
            reserved: source.reserved_slots(),
            slots_per_week: options.slots_per_week,
        })
    }
}

// ── Service ────────────────────────────────────────────────────────────

pub struct CompetitionService<'a, S: MatchStore + ?Sized> {
    store: &'a S,
    teams: &'a dyn TeamSource,
    season: &'a dyn SeasonSource,
    options: SchedulingOptions,
}

impl<'a, S: MatchStore + ?Sized> CompetitionService<'a, S> {
    pub fn new(
        store: &'a S,
        teams: &'a dyn TeamSource,
        season: &'a dyn SeasonSource,
        options: SchedulingOptions,
    ) -> Self {
        CompetitionService { store, teams, season, options }
    }

    /// Run `f` against the bracket engine of one competition.
    fn with_bracket<F, R>(&self, competition_id: CompetitionId, f: F) -> Result<R, ScheduleError>
    where
        F: FnOnce(&BracketEngine<'a, S>) -> Result<R, ScheduleError>,
    {
        let engine = BracketEngine::new(self.store, competition_id);
        f(&engine)
    }

    fn ensure_empty(&self, competition_id: CompetitionId) -> Result<(), ScheduleError> {
        let existing = self.store.list_matches(competition_id)?.len();
        if existing > 0 {
            return Err(ScheduleError::input(format!(
                "competition {competition_id} already has {existing} matches; delete them before regenerating"
            )));
        }
        Ok(())
    }

    fn team_ids(&self, competition_id: CompetitionId) -> Result<Vec<TeamId>, ScheduleError> {
        Ok(self
            .teams
            .list_teams(competition_id)?
            .into_iter()
            .map(|team| team.id)
            .collect())
    }

    pub fn create_league(&self, request: &CompetitionRequest) -> Result<GenerationSummary, ScheduleError> {
        request.validate_code()?;
        let rounds = match request.format()? {
            CompetitionFormat::RoundRobin { rounds } => rounds,
            CompetitionFormat::Cup => {
                return Err(ScheduleError::input("cup competitions are created with create_cup"))
            }
        };
        let range = request.date_range()?;
        self.ensure_empty(request.competition_id)?;

        let snapshot = SeasonSnapshot::capture(self.season, &self.options)?;
        let teams = self.team_ids(request.competition_id)?;
        let fixtures = generate_round_robin(&teams, rounds)?;
        self.schedule(request, range, &snapshot, &fixtures)
    }

    /// Top and bottom pools from the current standings.
    ///
    /// Regular-season matches may already exist in the competition; earlier
    /// playoff matches may not.
    pub fn create_playoffs(&self, request: &CompetitionRequest) -> Result<GenerationSummary, ScheduleError> {
        request.validate_code()?;
        let pool_size = request
            .playoff_pool_size
            .ok_or_else(|| ScheduleError::input("playoff pool size is required"))?;
        let range = request.date_range()?;
        let has_playoffs = self
            .store
            .list_matches(request.competition_id)?
            .iter()
            .any(|m| matches!(m.kind, MatchKind::League { round: RoundKind::Playoff { .. }, .. }));
        if has_playoffs {
            return Err(ScheduleError::input(format!(
                "competition {} already has playoff matches",
                request.competition_id
            )));
        }

        let snapshot = SeasonSnapshot::capture(self.season, &self.options)?;
        let standings = self.team_ids(request.competition_id)?;
        let fixtures = generate_playoffs(&standings, pool_size)?;
        self.schedule(request, range, &snapshot, &fixtures)
    }

    fn schedule(
        &self,
        request: &CompetitionRequest,
        range: DateRange,
        snapshot: &SeasonSnapshot,
        fixtures: &[Fixture],
    ) -> Result<GenerationSummary, ScheduleError> {
        let weeks = eligible_weeks(range, &snapshot.blackouts, &snapshot.reserved, snapshot.slots_per_week)?;
        let distribution = distribute(fixtures, &weeks, snapshot.slots_per_week)?;
        let records = assign_details(
            request.competition_id,
            &request.code,
            &distribution.placements,
            &snapshot.resolver,
        )?;

        let dates = records
            .iter()
            .filter_map(|record| record.schedule.as_ref().map(|s| s.date))
            .collect::<Vec<_>>();
        let inserted = self.store.insert_matches(records)?;

        let summary = GenerationSummary {
            competition_id: request.competition_id,
            fixtures: inserted.len(),
            matchdays: matchday_count(fixtures),
            weeks_available: weeks.len(),
            weeks_used: distribution.weeks_used,
            first_date: dates.iter().min().copied(),
            last_date: dates.iter().max().copied(),
        };
        info!(
            competition_id = summary.competition_id,
            fixtures = summary.fixtures,
            weeks_used = summary.weeks_used,
            "competition scheduled"
        );
        Ok(summary)
    }

    pub fn create_cup(&self, request: &CompetitionRequest) -> Result<CupSummary, ScheduleError> {
        request.validate_code()?;
        if request.format()? != CompetitionFormat::Cup {
            return Err(ScheduleError::input("round-robin competitions are created with create_league"));
        }
        self.ensure_empty(request.competition_id)?;

        let teams = self.teams.list_teams(request.competition_id)?;
        let mut rng = match request.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let records = build_bracket(request.competition_id, &request.code, &teams, &mut rng)?;
        self.store.insert_matches(records)?;

        Ok(CupSummary {
            competition_id: request.competition_id,
            nodes: bracket_nodes(self.store, request.competition_id)?,
        })
    }

    pub fn submit_cup_result(
        &self,
        competition_id: CompetitionId,
        label: &str,
        score: Score,
        authority: EditAuthority,
    ) -> Result<AdvanceReport, ScheduleError> {
        self.with_bracket(competition_id, |engine| engine.record_result(label, score, authority))
    }

    pub fn invalidate_cup_result(
        &self,
        competition_id: CompetitionId,
        label: &str,
        authority: EditAuthority,
    ) -> Result<ClearReport, ScheduleError> {
        self.with_bracket(competition_id, |engine| engine.invalidate(label, authority))
    }

    pub fn lock_match(&self, competition_id: CompetitionId, label: &str) -> Result<MatchRecord, ScheduleError> {
        self.with_bracket(competition_id, |engine| engine.lock(label))
    }

    pub fn unlock_match(
        &self,
        competition_id: CompetitionId,
        label: &str,
        authority: EditAuthority,
    ) -> Result<MatchRecord, ScheduleError> {
        self.with_bracket(competition_id, |engine| engine.unlock(label, authority))
    }

    pub fn bracket(&self, competition_id: CompetitionId) -> Result<Vec<BracketNode>, ScheduleError> {
        bracket_nodes(self.store, competition_id)
    }

    pub fn delete_competition(&self, competition_id: CompetitionId) -> Result<usize, ScheduleError> {
        let removed = self.store.delete_competition(competition_id)?;
        info!(competition_id, removed, "competition deleted");
        Ok(removed)
    }
}
