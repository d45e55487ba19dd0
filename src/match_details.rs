use std::collections::{HashMap, HashSet};
use tracing::{debug, error};

use crate::distribution::PlacedFixture;
use crate::error::ScheduleError;
use crate::timeslots::TimeslotResolver;
use crate::types::{CompetitionId, MatchKind, MatchRecord, MatchSchedule, PlayingWeek, RoundKind};

/// `<COMP>-<R|T|B><matchday:02>-<seq:03>`, matchday shown 1-based.
pub fn league_code(code: &str, kind: RoundKind, matchday: usize, seq: usize) -> String {
  format!("{code}-{}{:02}-{seq:03}", kind.code_prefix(), matchday + 1)
}

/// Turns placed fixtures into match records ready for insertion.
///
/// The slot index inside the week is the position handed to the resolver, so
/// slot 0 always gets the best-ranked timeslot.
pub fn assign_details(
  competition_id: CompetitionId,
  code: &str,
  placements: &[PlacedFixture],
  resolver: &TimeslotResolver,
) -> Result<Vec<MatchRecord>, ScheduleError> {
  let mut per_week: HashMap<usize, usize> = HashMap::new();
  for placed in placements {
    *per_week.entry(placed.week_index).or_default() += 1;
  }

  let mut sequence: HashMap<(&'static str, usize), usize> = HashMap::new();
  let mut codes = HashSet::with_capacity(placements.len());
  let mut records = Vec::with_capacity(placements.len());

  for placed in placements {
    let fixture = placed.fixture;
    let matches_in_week = per_week.get(&placed.week_index).copied().unwrap_or(1);
    let resolved = resolver.resolve(placed.slot, matches_in_week, None);
    let date = PlayingWeek::new(placed.week).date_for_weekday(resolved.day_of_week.unwrap_or(1));

    let seq = sequence
      .entry((fixture.kind.code_prefix(), fixture.matchday))
      .or_default();
    *seq += 1;
    let match_code = league_code(code, fixture.kind, fixture.matchday, *seq);
    if !codes.insert(match_code.clone()) {
      error!(code = %match_code, "display code generated twice");
      return Err(ScheduleError::invariant(format!(
        "display code {match_code} generated twice"
      )));
    }

    debug!(
      code = %match_code,
      %date,
      time = %resolved.time,
      venue = %resolved.venue,
      "match details assigned"
    );
    records.push(MatchRecord {
      id: 0,
      competition_id,
      code: match_code,
      home_team: Some(fixture.home),
      away_team: Some(fixture.away),
      kind: MatchKind::League {
        matchday: fixture.matchday,
        round: fixture.kind,
      },
      schedule: Some(MatchSchedule {
        week: placed.week,
        slot: placed.slot,
        date,
        time: resolved.time,
        venue: resolved.venue,
        timeslot_id: resolved.timeslot_id,
      }),
      score: None,
      completed: false,
      locked: false,
    });
  }
  Ok(records)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Fixture, Pool, Timeslot, Venue};
  use chrono::{NaiveDate, NaiveTime};

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
  }

  fn resolver() -> TimeslotResolver {
    let venues = vec![Venue { id: 1, name: "Arena".to_string(), address: String::new() }];
    let slots = vec![
      Timeslot { id: 1, venue_id: 1, day_of_week: 1, start: time(19, 0), end: time(20, 30), priority: 1 },
      Timeslot { id: 2, venue_id: 1, day_of_week: 2, start: time(20, 30), end: time(22, 0), priority: 2 },
    ];
    TimeslotResolver::new(&slots, &venues, time(19, 0), "TBD").unwrap()
  }

  fn placed(home: u32, away: u32, matchday: usize, kind: RoundKind, slot: usize) -> PlacedFixture {
    PlacedFixture {
      fixture: Fixture { home, away, matchday, kind },
      week_index: 0,
      week: date(2025, 9, 1),
      slot,
    }
  }

  #[test]
  fn test_codes_and_schedule() {
    let placements = vec![
      placed(1, 2, 0, RoundKind::Regular, 0),
      placed(3, 4, 0, RoundKind::Regular, 1),
      placed(5, 6, 2, RoundKind::Playoff { pool: Pool::Bottom, round: 1 }, 2),
    ];
    let records = assign_details(9, "L25", &placements, &resolver()).unwrap();
    let codes = records.iter().map(|r| r.code.as_str()).collect::<Vec<_>>();
    assert_eq!(codes, vec!["L25-R01-001", "L25-R01-002", "L25-B03-001"]);

    let first = records[0].schedule.as_ref().unwrap();
    assert_eq!(first.date, date(2025, 9, 1));
    assert_eq!(first.time, time(19, 0));
    assert_eq!(first.venue, "Arena");

    // second-ranked slot is on Tuesday
    let second = records[1].schedule.as_ref().unwrap();
    assert_eq!(second.date, date(2025, 9, 2));
    assert_eq!(second.timeslot_id, Some(2));

    // slot 2 wraps back to the best slot
    assert_eq!(records[2].schedule.as_ref().unwrap().timeslot_id, Some(1));
    assert!(records.iter().all(|r| r.competition_id == 9 && !r.completed));
  }

  #[test]
  fn test_fallback_without_timeslots() {
    let resolver = TimeslotResolver::new(&[], &[], time(18, 0), "TBD").unwrap();
    let records = assign_details(1, "X", &[placed(1, 2, 0, RoundKind::Regular, 0)], &resolver).unwrap();
    let schedule = records[0].schedule.as_ref().unwrap();
    assert_eq!(schedule.venue, "TBD");
    assert_eq!(schedule.time, time(18, 0));
    assert_eq!(schedule.date, date(2025, 9, 1));
    assert_eq!(schedule.timeslot_id, None);
  }

  #[test]
  fn test_league_code_format() {
    let kind = RoundKind::Playoff { pool: Pool::Top, round: 2 };
    assert_eq!(league_code("SPRING", kind, 11, 4), "SPRING-T12-004");
  }
}
