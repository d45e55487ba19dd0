use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::error::{ScheduleError, StoreError};
use crate::store::MatchStore;
use crate::types::{
  CompetitionId, EditAuthority, MatchId, MatchKind, MatchRecord, MatchState, MatchUpdate, Score,
  Side, Team, TeamId, BRACKET_NODE_COUNT, BRACKET_SIZE, FINAL_LABEL, MAX_CASCADE_DEPTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
  RoundOf16,
  QuarterFinal,
  SemiFinal,
  Final,
}

impl Stage {
  pub const ALL: [Stage; 4] = [Stage::RoundOf16, Stage::QuarterFinal, Stage::SemiFinal, Stage::Final];

  fn prefix(self) -> &'static str {
    match self {
      Stage::RoundOf16 => "1/8",
      Stage::QuarterFinal => "QF",
      Stage::SemiFinal => "SF",
      Stage::Final => FINAL_LABEL,
    }
  }

  pub fn match_count(self) -> usize {
    match self {
      Stage::RoundOf16 => 8,
      Stage::QuarterFinal => 4,
      Stage::SemiFinal => 2,
      Stage::Final => 1,
    }
  }

  fn next(self) -> Option<Stage> {
    match self {
      Stage::RoundOf16 => Some(Stage::QuarterFinal),
      Stage::QuarterFinal => Some(Stage::SemiFinal),
      Stage::SemiFinal => Some(Stage::Final),
      Stage::Final => None,
    }
  }

  fn previous(self) -> Option<Stage> {
    match self {
      Stage::RoundOf16 => None,
      Stage::QuarterFinal => Some(Stage::RoundOf16),
      Stage::SemiFinal => Some(Stage::QuarterFinal),
      Stage::Final => Some(Stage::SemiFinal),
    }
  }
}

pub fn stage_label(stage: Stage, number: usize) -> String {
  match stage {
    Stage::Final => FINAL_LABEL.to_string(),
    _ => format!("{}-{}", stage.prefix(), number),
  }
}

/// Splits "QF-2" into its stage and 1-based number.
pub fn parse_label(label: &str) -> Option<(Stage, usize)> {
  if label == FINAL_LABEL {
    return Some((Stage::Final, 1));
  }
  let (prefix, number) = label.rsplit_once('-')?;
  let stage = Stage::ALL
    .into_iter()
    .find(|stage| *stage != Stage::Final && stage.prefix() == prefix)?;
  let number = number.parse::<usize>().ok()?;
  if number == 0 || number > stage.match_count() {
    return None;
  }
  Some((stage, number))
}

/// Where the winner of `label` goes: `ceil(n/2)` of the next stage, home for odd `n`.
pub fn next_slot(label: &str) -> Option<(String, Side)> {
  let (stage, number) = parse_label(label)?;
  let next = stage.next()?;
  let side = if number % 2 == 1 { Side::Home } else { Side::Away };
  Some((stage_label(next, (number + 1) / 2), side))
}

fn feeder_labels(stage: Stage, number: usize) -> Option<(String, String)> {
  let previous = stage.previous()?;
  Some((
    stage_label(previous, number * 2 - 1),
    stage_label(previous, number * 2),
  ))
}

/// Builds the 15 bracket matches for 16 teams, shuffling the first-round draw.
pub fn build_bracket<R: Rng + ?Sized>(
  competition_id: CompetitionId,
  code: &str,
  teams: &[Team],
  rng: &mut R,
) -> Result<Vec<MatchRecord>, ScheduleError> {
  if teams.len() != BRACKET_SIZE {
    return Err(ScheduleError::input(format!(
      "a cup bracket needs exactly {BRACKET_SIZE} teams, got {}",
      teams.len()
    )));
  }
  let mut seen = HashSet::new();
  if let Some(dup) = teams.iter().find(|team| !seen.insert(team.id)) {
    return Err(ScheduleError::input(format!(
      "team {} ({}) is listed twice",
      dup.id, dup.name
    )));
  }

  let mut draw = teams.iter().map(|team| team.id).collect::<Vec<_>>();
  draw.shuffle(rng);

  let mut records = Vec::with_capacity(BRACKET_NODE_COUNT);
  for stage in Stage::ALL {
    for number in 1..=stage.match_count() {
      let label = stage_label(stage, number);
      let (home_team, away_team) = if stage == Stage::RoundOf16 {
        (Some(draw[number * 2 - 2]), Some(draw[number * 2 - 1]))
      } else {
        (None, None)
      };
      let (home_source, away_source) = match feeder_labels(stage, number) {
        Some((home, away)) => (Some(home), Some(away)),
        None => (None, None),
      };
      records.push(MatchRecord {
        id: 0,
        competition_id,
        code: format!("{code}-{label}"),
        home_team,
        away_team,
        kind: MatchKind::Cup {
          next_label: next_slot(&label).map(|(next, _)| next),
          label,
          home_source,
          away_source,
        },
        schedule: None,
        score: None,
        completed: false,
        locked: false,
      });
    }
  }

  info!(competition_id, nodes = records.len(), "built cup bracket");
  Ok(records)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketNode {
  pub match_id: MatchId,
  pub label: String,
  pub home_team: Option<TeamId>,
  pub away_team: Option<TeamId>,
  pub next_label: Option<String>,
  pub state: MatchState,
}

impl BracketNode {
  pub fn from_record(record: &MatchRecord) -> Option<Self> {
    Some(BracketNode {
      match_id: record.id,
      label: record.label()?.to_string(),
      home_team: record.home_team,
      away_team: record.away_team,
      next_label: record.next_label().map(str::to_string),
      state: record.state(),
    })
  }
}

/// Current bracket in stage order.
pub fn bracket_nodes<S: MatchStore + ?Sized>(
  store: &S,
  competition_id: CompetitionId,
) -> Result<Vec<BracketNode>, ScheduleError> {
  let mut nodes = store
    .list_matches(competition_id)?
    .iter()
    .filter_map(BracketNode::from_record)
    .collect::<Vec<_>>();
  nodes.sort_by_key(|node| parse_label(&node.label));
  Ok(nodes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepOutcome {
  Changed,
  Unchanged,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceStep {
  pub source: String,
  pub target: String,
  pub side: Side,
  pub previous: Option<TeamId>,
  pub winner: TeamId,
  pub outcome: StepOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceReport {
  pub steps: Vec<AdvanceStep>,
}

impl AdvanceReport {
  pub fn changed(&self) -> bool {
    self.steps.iter().any(|step| step.outcome == StepOutcome::Changed)
  }

  pub fn targets(&self) -> Vec<&str> {
    self.steps.iter().map(|step| step.target.as_str()).collect()
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedSlot {
  pub label: String,
  pub side: Side,
  pub previous: Option<TeamId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
  pub label: String,
  pub cleared: Option<ClearedSlot>,
  /// Completed matches further down the path that still reflect the old result.
  pub stale: Vec<String>,
}

/// Winner propagation for one cup competition.
pub struct BracketEngine<'a, S: MatchStore + ?Sized> {
  store: &'a S,
  competition_id: CompetitionId,
}

impl<'a, S: MatchStore + ?Sized> BracketEngine<'a, S> {
  pub fn new(store: &'a S, competition_id: CompetitionId) -> Self {
    BracketEngine { store, competition_id }
  }

  fn fetch(&self, label: &str) -> Result<MatchRecord, ScheduleError> {
    self
      .store
      .get_match_by_label(self.competition_id, label)?
      .ok_or_else(|| ScheduleError::NotFound(format!("cup match {label}")))
  }

  /// Moves the winner of a completed match forward and re-resolves completed
  /// descendants whose participants changed.
  ///
  /// Writing into a locked match needs `EditAuthority::Override`.
  pub fn advance(&self, label: &str, authority: EditAuthority) -> Result<AdvanceReport, ScheduleError> {
    let mut report = AdvanceReport::default();
    let mut current = label.to_string();
    let mut iterations = 0;
    loop {
      iterations += 1;
      if iterations > MAX_CASCADE_DEPTH {
        error!(label, iterations, "cascade exceeded bracket depth");
        return Err(ScheduleError::invariant(format!(
          "advancing {label} cascaded more than {MAX_CASCADE_DEPTH} times"
        )));
      }

      let source = self.fetch(&current)?;
      let Some(winner) = source.winner() else {
        if iterations == 1 {
          return Err(ScheduleError::input(format!("{current} has no result to advance")));
        }
        break;
      };
      let Some((target, side)) = next_slot(&current) else {
        break;
      };

      let step = self.place_winner(&current, &source, &target, side, winner, authority)?;
      debug!(
        source = %step.source,
        target = %step.target,
        side = %step.side,
        previous = ?step.previous,
        winner = step.winner,
        outcome = ?step.outcome,
        "advance step"
      );
      let changed = step.outcome == StepOutcome::Changed;
      report.steps.push(step);
      if !changed {
        break;
      }

      let next = self.fetch(&target)?;
      if !(next.completed && next.has_both_teams()) {
        break;
      }
      current = target;
    }
    Ok(report)
  }

  fn place_winner(
    &self,
    source_label: &str,
    source: &MatchRecord,
    target: &str,
    side: Side,
    winner: TeamId,
    authority: EditAuthority,
  ) -> Result<AdvanceStep, ScheduleError> {
    if source.home_team != Some(winner) && source.away_team != Some(winner) {
      error!(source_label, winner, "winner did not play in the source match");
      return Err(ScheduleError::invariant(format!(
        "team {winner} did not play in {source_label}"
      )));
    }

    let mut retried = false;
    loop {
      let record = self.fetch(target)?;
      if record.source_for(side) != Some(source_label) {
        error!(source_label, slot_label = target, side = %side, "slot is fed by another match");
        return Err(ScheduleError::invariant(format!(
          "{source_label} may not write the {side} slot of {target}"
        )));
      }

      let previous = record.team(side);
      let step = |outcome| AdvanceStep {
        source: source_label.to_string(),
        target: target.to_string(),
        side,
        previous,
        winner,
        outcome,
      };
      if previous == Some(winner) {
        return Ok(step(StepOutcome::Unchanged));
      }
      if record.locked && authority != EditAuthority::Override {
        warn!(source_label, slot_label = target, "cascade stopped at a locked match");
        return Err(locked_error(target, source_label));
      }

      match self
        .store
        .update_slot(self.competition_id, target, side, previous, Some(winner))
      {
        Ok(_) => return Ok(step(StepOutcome::Changed)),
        Err(StoreError::Conflict { found, .. }) if !retried => {
          warn!(slot_label = target, side = %side, ?previous, ?found, "slot changed underneath us, retrying");
          retried = true;
        }
        Err(StoreError::Conflict { .. }) => {
          return Err(ScheduleError::Conflict {
            label: target.to_string(),
            side,
          });
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Stores a score and advances its winner.
  pub fn record_result(
    &self,
    label: &str,
    score: Score,
    authority: EditAuthority,
  ) -> Result<AdvanceReport, ScheduleError> {
    let record = self.fetch(label)?;
    if record.locked && authority != EditAuthority::Override {
      return Err(ScheduleError::input(format!("{label} is locked")));
    }
    if !record.has_both_teams() {
      return Err(ScheduleError::input(format!(
        "{label} does not have both teams yet"
      )));
    }
    if score.winner_side().is_none() {
      return Err(ScheduleError::input(format!(
        "cup matches cannot end level ({}-{})",
        score.home, score.away
      )));
    }

    if let Some(winner) = score.winner_side().and_then(|side| record.team(side)) {
      self.check_cascade_locks(label, winner, authority)?;
    }

    self.store.update_match(record.id, MatchUpdate::RecordScore(score))?;
    info!(label, home = score.home, away = score.away, "cup result recorded");
    self.advance(label, authority)
  }

  /// Walks the path `winner` would be written along and rejects a locked stop.
  fn check_cascade_locks(
    &self,
    label: &str,
    winner: TeamId,
    authority: EditAuthority,
  ) -> Result<(), ScheduleError> {
    if authority == EditAuthority::Override {
      return Ok(());
    }
    let mut current = label.to_string();
    for _ in 0..MAX_CASCADE_DEPTH {
      let Some((target, side)) = next_slot(&current) else {
        break;
      };
      let next = self.fetch(&target)?;
      if next.team(side) == Some(winner) {
        break;
      }
      if next.locked {
        return Err(locked_error(&target, label));
      }
      // goes on only while the replaced team is the one that won there
      let winning_side = next.score.and_then(|score| score.winner_side());
      if !(next.completed && next.has_both_teams()) || winning_side != Some(side) {
        break;
      }
      current = target;
    }
    Ok(())
  }

  /// Removes a result and empties the slot its winner occupied.
  ///
  /// Descendants are left alone; the ones already completed are listed as stale.
  pub fn invalidate(&self, label: &str, authority: EditAuthority) -> Result<ClearReport, ScheduleError> {
    let record = self.fetch(label)?;
    if record.locked && authority != EditAuthority::Override {
      return Err(ScheduleError::input(format!("{label} is locked")));
    }
    if !record.completed {
      return Err(ScheduleError::input(format!("{label} has no result to clear")));
    }

    let cleared = match next_slot(label) {
      Some((target, side)) => Some(self.clear_slot(label, &target, side, authority)?),
      None => None,
    };
    self.store.update_match(record.id, MatchUpdate::ClearScore)?;

    let mut stale = Vec::new();
    let mut next = next_slot(label);
    while let Some((downstream, _)) = next {
      if self.fetch(&downstream)?.completed {
        stale.push(downstream.clone());
      }
      next = next_slot(&downstream);
    }

    info!(label, stale = stale.len(), "cup result cleared");
    Ok(ClearReport {
      label: label.to_string(),
      cleared,
      stale,
    })
  }

  fn clear_slot(
    &self,
    source_label: &str,
    target: &str,
    side: Side,
    authority: EditAuthority,
  ) -> Result<ClearedSlot, ScheduleError> {
    let mut retried = false;
    loop {
      let record = self.fetch(target)?;
      let previous = record.team(side);
      let cleared = ClearedSlot {
        label: target.to_string(),
        side,
        previous,
      };
      if previous.is_none() {
        return Ok(cleared);
      }
      if record.locked && authority != EditAuthority::Override {
        return Err(locked_error(target, source_label));
      }
      match self
        .store
        .update_slot(self.competition_id, target, side, previous, None)
      {
        Ok(_) => return Ok(cleared),
        Err(StoreError::Conflict { found, .. }) if !retried => {
          warn!(slot_label = target, side = %side, ?previous, ?found, "slot changed underneath us, retrying");
          retried = true;
        }
        Err(StoreError::Conflict { .. }) => {
          return Err(ScheduleError::Conflict {
            label: target.to_string(),
            side,
          });
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  pub fn lock(&self, label: &str) -> Result<MatchRecord, ScheduleError> {
    let record = self.fetch(label)?;
    if !record.completed {
      return Err(ScheduleError::input(format!(
        "{label} must be completed before it can be locked"
      )));
    }
    Ok(self.store.update_match(record.id, MatchUpdate::SetLocked(true))?)
  }

  pub fn unlock(&self, label: &str, authority: EditAuthority) -> Result<MatchRecord, ScheduleError> {
    if authority != EditAuthority::Override {
      return Err(ScheduleError::input(format!(
        "unlocking {label} requires override authority"
      )));
    }
    let record = self.fetch(label)?;
    Ok(self.store.update_match(record.id, MatchUpdate::SetLocked(false))?)
  }
}

fn locked_error(target: &str, source_label: &str) -> ScheduleError {
  ScheduleError::input(format!(
    "{target} is locked; changing {source_label} requires override authority"
  ))
}
