use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::ScheduleError;
use crate::types::{Fixture, PlayingWeek, TeamId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedFixture {
  pub fixture: Fixture,
  pub week_index: usize,
  pub week: NaiveDate,
  pub slot: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
  pub placements: Vec<PlacedFixture>,
  pub weeks_used: usize,
}

impl Distribution {
  pub fn in_week(&self, week_index: usize) -> Vec<&PlacedFixture> {
    self
      .placements
      .iter()
      .filter(|placed| placed.week_index == week_index)
      .collect()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityPlan {
  pub fixtures: usize,
  pub teams: usize,
  pub per_week: usize,
  pub weeks_needed: usize,
}

/// A week can never hold more than `teams / 2` fixtures without repeating a team.
pub fn capacity_plan(fixtures: &[Fixture], slots_per_week: usize) -> CapacityPlan {
  let teams = distinct_teams(fixtures).len();
  let per_week = slots_per_week.min(teams / 2).max(1);
  CapacityPlan {
    fixtures: fixtures.len(),
    teams,
    per_week,
    weeks_needed: fixtures.len().div_ceil(per_week),
  }
}

/// Fails fast when the fixtures cannot fit into `weeks`.
///
/// Each week holds `min(free slots, teams / 2)` fixtures, so reserved cup
/// slots shrink it. Weeks missing after the last available one are counted at
/// the full per-week rate.
pub fn check_capacity(
  fixtures: &[Fixture],
  weeks: &[PlayingWeek],
  slots_per_week: usize,
) -> Result<CapacityPlan, ScheduleError> {
  let mut plan = capacity_plan(fixtures, slots_per_week);
  let week_cap = (plan.teams / 2).max(1);
  let usable = weeks
    .iter()
    .map(|week| week.free_slot_count(slots_per_week).min(week_cap))
    .collect::<Vec<_>>();

  let mut placed = 0usize;
  let filled = usable.iter().position(|cap| {
    placed += cap;
    placed >= plan.fixtures
  });
  plan.weeks_needed = match filled {
    _ if plan.fixtures == 0 => 0,
    Some(idx) => idx + 1,
    None => weeks.len() + (plan.fixtures - placed).div_ceil(plan.per_week),
  };
  if plan.weeks_needed <= weeks.len() {
    return Ok(plan);
  }

  let mut suggestions = capacity_suggestions(fixtures, &plan, weeks.len(), slots_per_week);
  let lost = weeks
    .iter()
    .map(|week| slots_per_week - week.free_slot_count(slots_per_week))
    .sum::<usize>();
  if lost > 0 {
    suggestions.push(format!("Release some of the {lost} reserved cup slot(s)."));
  }
  warn!(
    fixtures = plan.fixtures,
    weeks_needed = plan.weeks_needed,
    weeks_available = weeks.len(),
    reserved_slots = lost,
    "capacity pre-check failed"
  );
  Err(ScheduleError::Capacity {
    fixtures: plan.fixtures,
    per_week: plan.per_week,
    weeks_needed: plan.weeks_needed,
    weeks_available: weeks.len(),
    suggestions,
  })
}

/// Greedy placement of fixtures into weeks, matchday by matchday.
///
/// The week pointer only moves forward. A fixture goes into the first week
/// from the pointer on that has a free slot and hosts neither of its teams.
pub fn distribute(
  fixtures: &[Fixture],
  weeks: &[PlayingWeek],
  slots_per_week: usize,
) -> Result<Distribution, ScheduleError> {
  if slots_per_week == 0 {
    return Err(ScheduleError::input("slots per week must be at least 1"));
  }
  check_capacity(fixtures, weeks, slots_per_week)?;

  let mut by_matchday: BTreeMap<usize, Vec<Fixture>> = BTreeMap::new();
  for fixture in fixtures {
    by_matchday.entry(fixture.matchday).or_default().push(*fixture);
  }

  let capacity = weeks
    .iter()
    .map(|week| week.free_slot_count(slots_per_week))
    .collect::<Vec<_>>();
  let mut used = vec![0usize; weeks.len()];
  let mut occupied = vec![vec![false; slots_per_week]; weeks.len()];
  let mut teams_in_week: Vec<HashSet<TeamId>> = vec![HashSet::new(); weeks.len()];
  let mut current_week = 0usize;
  while current_week < weeks.len() && used[current_week] >= capacity[current_week] {
    current_week += 1;
  }

  let mut placements = Vec::with_capacity(fixtures.len());
  for (matchday, day_fixtures) in &by_matchday {
    for fixture in day_fixtures {
      let target = (current_week..weeks.len()).find(|&w| {
        used[w] < capacity[w]
          && !teams_in_week[w].contains(&fixture.home)
          && !teams_in_week[w].contains(&fixture.away)
      });
      let Some(w) = target else {
        let utilization = used.iter().copied().zip(capacity.iter().copied()).collect::<Vec<_>>();
        warn!(
          matchday,
          home = fixture.home,
          away = fixture.away,
          "fixture could not be placed in any remaining week"
        );
        return Err(ScheduleError::Deadlock {
          matchday: *matchday,
          home: fixture.home,
          away: fixture.away,
          utilization,
        });
      };
      let slot = (0..slots_per_week)
        .find(|&s| weeks[w].is_slot_free(s) && !occupied[w][s])
        .ok_or_else(|| ScheduleError::invariant(format!("week {} has no free slot index", weeks[w].monday)))?;

      occupied[w][slot] = true;
      used[w] += 1;
      teams_in_week[w].insert(fixture.home);
      teams_in_week[w].insert(fixture.away);
      placements.push(PlacedFixture {
        fixture: *fixture,
        week_index: w,
        week: weeks[w].monday,
        slot,
      });

      while current_week < weeks.len() && used[current_week] >= capacity[current_week] {
        current_week += 1;
      }
    }
    debug!(matchday, current_week, "matchday placed");
  }

  let weeks_used = used.iter().filter(|count| **count > 0).count();
  info!(
    fixtures = placements.len(),
    weeks_used,
    weeks_available = weeks.len(),
    "fixtures distributed"
  );
  Ok(Distribution { placements, weeks_used })
}

fn distinct_teams(fixtures: &[Fixture]) -> HashSet<TeamId> {
  fixtures.iter().flat_map(|f| [f.home, f.away]).collect()
}

fn weeks_for(fixtures: usize, teams: usize, slots_per_week: usize) -> usize {
  fixtures.div_ceil(slots_per_week.min(teams / 2).max(1))
}

fn capacity_suggestions(
  fixtures: &[Fixture],
  plan: &CapacityPlan,
  weeks_available: usize,
  slots_per_week: usize,
) -> Vec<String> {
  let pairs = fixtures
    .iter()
    .map(|f| (f.home.min(f.away), f.home.max(f.away)))
    .collect::<HashSet<_>>()
    .len()
    .max(1);
  let rounds = plan.fixtures.div_ceil(pairs);
  let mut out = Vec::new();

  let fewer = (2..plan.teams)
    .rev()
    .find(|&n| weeks_for(n * (n - 1) / 2 * rounds, n, slots_per_week) <= weeks_available);
  if let Some(n) = fewer {
    out.push(format!("Use at most {n} teams."));
  }

  if rounds > 1 {
    let single = weeks_for(plan.fixtures / rounds, plan.teams, slots_per_week);
    if single <= weeks_available {
      out.push(format!("Play a single round instead ({single} weeks)."));
    }
  }

  let slots_needed = plan.fixtures.div_ceil(weeks_available.max(1));
  if weeks_available > 0 && slots_needed > slots_per_week && slots_needed <= plan.teams / 2 {
    out.push(format!("Offer at least {slots_needed} slots per week."));
  } else {
    out.push(format!(
      "Add {} eligible week(s).",
      plan.weeks_needed - weeks_available
    ));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::round_robin::generate_round_robin;
  use crate::types::RoundKind;
  use chrono::Days;

  fn weeks(count: usize) -> Vec<PlayingWeek> {
    let first = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
    (0..count)
      .map(|i| PlayingWeek::new(first + Days::new(7 * i as u64)))
      .collect()
  }

  fn teams(n: u32) -> Vec<TeamId> {
    (1..=n).collect()
  }

  fn assert_week_rules(distribution: &Distribution, week_count: usize, slots_per_week: usize) {
    for w in 0..week_count {
      let placed = distribution.in_week(w);
      assert!(placed.len() <= slots_per_week);
      let mut seen = HashSet::new();
      let mut slots = HashSet::new();
      for p in placed {
        assert!(seen.insert(p.fixture.home));
        assert!(seen.insert(p.fixture.away));
        assert!(slots.insert(p.slot));
        assert!(p.slot < slots_per_week);
      }
    }
  }

  #[test]
  fn test_eight_teams_fill_seven_weeks() {
    let fixtures = generate_round_robin(&teams(8), 1).unwrap();
    let distribution = distribute(&fixtures, &weeks(7), 7).unwrap();
    assert_eq!(distribution.placements.len(), 28);
    assert_eq!(distribution.weeks_used, 7);
    for w in 0..7 {
      assert_eq!(distribution.in_week(w).len(), 4);
    }
    assert_week_rules(&distribution, 7, 7);
  }

  #[test]
  fn test_eight_teams_in_four_weeks_fails_precheck() {
    let fixtures = generate_round_robin(&teams(8), 1).unwrap();
    let err = distribute(&fixtures, &weeks(4), 7).unwrap_err();
    match err {
      ScheduleError::Capacity { weeks_needed, weeks_available, per_week, .. } => {
        assert_eq!(weeks_needed, 7);
        assert_eq!(weeks_available, 4);
        assert_eq!(per_week, 4);
      }
      other => panic!("expected capacity error, got {other:?}"),
    }
  }

  #[test]
  fn test_sixteen_teams_in_ten_weeks_fails() {
    let fixtures = generate_round_robin(&teams(16), 1).unwrap();
    assert_eq!(fixtures.len(), 120);
    let err = distribute(&fixtures, &weeks(10), 7).unwrap_err();
    assert!(err.to_string().contains("weeksNeeded=18, weeksAvailable=10"));
    let ScheduleError::Capacity { suggestions, .. } = err else {
      panic!("expected capacity error");
    };
    assert!(suggestions.iter().any(|s| s.starts_with("Use at most")));
  }

  #[test]
  fn test_sixteen_teams_in_eighteen_weeks() {
    let fixtures = generate_round_robin(&teams(16), 1).unwrap();
    let distribution = distribute(&fixtures, &weeks(18), 7).unwrap();
    assert_eq!(distribution.placements.len(), 120);
    assert_week_rules(&distribution, 18, 7);
  }

  #[test]
  fn test_double_round_suggests_single() {
    let fixtures = generate_round_robin(&teams(6), 2).unwrap();
    let err = check_capacity(&fixtures, &weeks(6), 7).unwrap_err();
    let ScheduleError::Capacity { suggestions, weeks_needed, .. } = err else {
      panic!("expected capacity error");
    };
    assert_eq!(weeks_needed, 10);
    assert!(suggestions.iter().any(|s| s.contains("single round")));
  }

  #[test]
  fn test_deadlock_reports_fixture() {
    let fixtures = vec![
      Fixture { home: 1, away: 2, matchday: 0, kind: RoundKind::Regular },
      Fixture { home: 1, away: 3, matchday: 1, kind: RoundKind::Regular },
      Fixture { home: 1, away: 4, matchday: 2, kind: RoundKind::Regular },
    ];
    let err = distribute(&fixtures, &weeks(2), 7).unwrap_err();
    assert_eq!(
      err,
      ScheduleError::Deadlock {
        matchday: 2,
        home: 1,
        away: 4,
        utilization: vec![(1, 7), (1, 7)],
      }
    );
  }

  #[test]
  fn test_reserved_slots_are_skipped() {
    let fixtures = generate_round_robin(&teams(4), 1).unwrap();
    let mut available = weeks(3);
    available[0].reserved_slots.insert(0);
    let distribution = distribute(&fixtures, &available, 7).unwrap();
    assert!(distribution.in_week(0).iter().all(|p| p.slot != 0));
  }

  #[test]
  fn test_reserved_slots_count_against_capacity() {
    let fixtures = generate_round_robin(&teams(4), 1).unwrap();
    let mut available = weeks(3);
    available[0].reserved_slots.insert(0);
    available[1].reserved_slots.insert(0);

    let err = distribute(&fixtures, &available, 2).unwrap_err();
    let ScheduleError::Capacity { weeks_needed, weeks_available, per_week, suggestions, .. } = err else {
      panic!("expected capacity error");
    };
    assert_eq!((weeks_needed, weeks_available, per_week), (4, 3, 2));
    assert!(suggestions.iter().any(|s| s.contains("2 reserved cup slot")));

    available.push(PlayingWeek::new(available[2].monday + Days::new(7)));
    let plan = check_capacity(&fixtures, &available, 2).unwrap();
    assert_eq!(plan.weeks_needed, 4);
  }

  #[test]
  fn test_matchdays_are_placed_in_order() {
    let fixtures = generate_round_robin(&teams(10), 1).unwrap();
    let distribution = distribute(&fixtures, &weeks(12), 7).unwrap();
    let order = distribution
      .placements
      .iter()
      .map(|p| p.fixture.matchday)
      .collect::<Vec<_>>();
    assert!(order.windows(2).all(|w| w[0] <= w[1]));
  }

  mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
      /// No team twice in a week and no week over capacity.
      #[test]
      fn prop_week_rules_hold(n in 2u32..=18, rounds in 1u8..=2, slots in 1usize..=8, spare in 0usize..4) {
        let fixtures = generate_round_robin(&teams(n), rounds).unwrap();
        let needed = capacity_plan(&fixtures, slots).weeks_needed;
        let available = weeks(needed + spare + n as usize);
        if let Ok(distribution) = distribute(&fixtures, &available, slots) {
          prop_assert_eq!(distribution.placements.len(), fixtures.len());
          for w in 0..available.len() {
            let placed = distribution.in_week(w);
            prop_assert!(placed.len() <= slots);
            let mut seen = HashSet::new();
            for p in placed {
              prop_assert!(seen.insert(p.fixture.home));
              prop_assert!(seen.insert(p.fixture.away));
            }
          }
        }
      }
    }
  }
}
