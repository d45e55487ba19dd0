use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::error::ScheduleError;
use crate::types::{Fixture, RoundKind, TeamId};

/// Circle-method round robin.
///
/// Odd team lists are padded with a bye; fixtures against the bye are
/// dropped from the output. With `rounds == 2` every fixture is repeated with
/// home and away swapped, `N - 1` matchdays later.
pub fn generate_round_robin(teams: &[TeamId], rounds: u8) -> Result<Vec<Fixture>, ScheduleError> {
  validate_teams(teams)?;
  if !(1..=2).contains(&rounds) {
    return Err(ScheduleError::input(format!(
      "rounds must be 1 or 2, got {rounds}"
    )));
  }

  let mut slots: Vec<Option<TeamId>> = teams.iter().copied().map(Some).collect();
  if slots.len() % 2 != 0 {
    slots.push(None);
  }
  let n = slots.len();
  let matchdays = n - 1;
  let fixed = slots[0];
  let rest = &slots[1..];

  let mut fixtures = Vec::with_capacity(n * matchdays / 2 * rounds as usize);
  for matchday in 0..matchdays {
    let mut rotated = rest.to_vec();
    rotated.rotate_right(matchday);
    let mut arrangement = Vec::with_capacity(n);
    arrangement.push(fixed);
    arrangement.extend(rotated);

    let pairs = (0..n / 2)
      .map(|i| (arrangement[i], arrangement[n - 1 - i]))
      .collect::<Vec<_>>();
    check_matchday_coverage(matchday, &pairs, &slots)?;

    for (idx, pair) in pairs.into_iter().enumerate() {
      let (Some(a), Some(b)) = pair else {
        continue;
      };
      // the fixed team would otherwise be at home every matchday
      let (home, away) = if idx == 0 && matchday % 2 == 1 { (b, a) } else { (a, b) };
      fixtures.push(Fixture {
        home,
        away,
        matchday,
        kind: RoundKind::Regular,
      });
    }
  }

  if rounds == 2 {
    let second = fixtures
      .iter()
      .map(|fixture| fixture.reversed(fixture.matchday + matchdays))
      .collect::<Vec<_>>();
    fixtures.extend(second);
  }

  info!(
    teams = teams.len(),
    rounds,
    fixtures = fixtures.len(),
    matchdays = matchdays * rounds as usize,
    "generated round robin"
  );
  Ok(fixtures)
}

pub fn validate_teams(teams: &[TeamId]) -> Result<(), ScheduleError> {
  if teams.len() < 2 {
    return Err(ScheduleError::input(format!(
      "at least two teams are required, got {}",
      teams.len()
    )));
  }
  let mut seen = HashSet::new();
  for team in teams {
    if !seen.insert(*team) {
      return Err(ScheduleError::input(format!("team {team} is listed twice")));
    }
  }
  Ok(())
}

/// Number of matchdays a list of fixtures spans.
pub fn matchday_count(fixtures: &[Fixture]) -> usize {
  fixtures
    .iter()
    .map(|fixture| fixture.matchday + 1)
    .max()
    .unwrap_or(0)
}

fn check_matchday_coverage(
  matchday: usize,
  pairs: &[(Option<TeamId>, Option<TeamId>)],
  slots: &[Option<TeamId>],
) -> Result<(), ScheduleError> {
  let mut seen = HashSet::with_capacity(slots.len());
  for (a, b) in pairs {
    if !seen.insert(*a) || !seen.insert(*b) {
      let message = format!("matchday {matchday} lists a team twice");
      error!("{message}");
      return Err(ScheduleError::invariant(message));
    }
  }
  let expected = slots.iter().copied().collect::<HashSet<_>>();
  if seen != expected {
    let missing = expected.difference(&seen).count();
    let message = format!("matchday {matchday} is missing {missing} team(s)");
    error!("{message}");
    return Err(ScheduleError::invariant(message));
  }
  debug!(matchday, pairs = pairs.len(), "matchday coverage ok");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn teams(n: u32) -> Vec<TeamId> {
    (1..=n).collect()
  }

  fn pair_key(fixture: &Fixture) -> (TeamId, TeamId) {
    (fixture.home.min(fixture.away), fixture.home.max(fixture.away))
  }

  #[test]
  fn test_eight_teams_single_round() {
    let fixtures = generate_round_robin(&teams(8), 1).unwrap();
    assert_eq!(fixtures.len(), 28);
    assert_eq!(matchday_count(&fixtures), 7);
    for matchday in 0..7 {
      let count = fixtures.iter().filter(|f| f.matchday == matchday).count();
      assert_eq!(count, 4);
    }
  }

  #[test]
  fn test_double_round_swaps_home_and_away() {
    let fixtures = generate_round_robin(&teams(6), 2).unwrap();
    assert_eq!(fixtures.len(), 30);
    let (first, second) = fixtures.split_at(15);
    for (a, b) in first.iter().zip(second) {
      assert_eq!(a.home, b.away);
      assert_eq!(a.away, b.home);
      assert_eq!(b.matchday, a.matchday + 5);
    }
  }

  #[test]
  fn test_odd_team_count_gets_one_bye_per_team() {
    let fixtures = generate_round_robin(&teams(5), 1).unwrap();
    assert_eq!(fixtures.len(), 10);
    assert_eq!(matchday_count(&fixtures), 5);

    let mut byes: HashMap<TeamId, usize> = HashMap::new();
    for matchday in 0..5 {
      let playing = fixtures
        .iter()
        .filter(|f| f.matchday == matchday)
        .flat_map(|f| [f.home, f.away])
        .collect::<HashSet<_>>();
      assert_eq!(playing.len(), 4);
      for team in teams(5) {
        if !playing.contains(&team) {
          *byes.entry(team).or_default() += 1;
        }
      }
    }
    assert!(teams(5).iter().all(|team| byes.get(team) == Some(&1)));
  }

  #[test]
  fn test_fixed_team_alternates_home_and_away() {
    let fixtures = generate_round_robin(&teams(8), 1).unwrap();
    let homes = fixtures.iter().filter(|f| f.home == 1).count();
    let aways = fixtures.iter().filter(|f| f.away == 1).count();
    assert_eq!(homes, 4);
    assert_eq!(aways, 3);
  }

  #[test]
  fn test_rejects_bad_input() {
    assert!(matches!(
      generate_round_robin(&[1], 1),
      Err(ScheduleError::InputValidation(_))
    ));
    assert!(matches!(
      generate_round_robin(&[1, 2, 2], 1),
      Err(ScheduleError::InputValidation(_))
    ));
    assert!(matches!(
      generate_round_robin(&teams(4), 3),
      Err(ScheduleError::InputValidation(_))
    ));
  }

  #[test]
  fn test_coverage_check_flags_missing_team() {
    let slots = vec![Some(1), Some(2), Some(3), Some(4)];
    let pairs = vec![(Some(1), Some(2)), (Some(1), Some(3))];
    let err = check_matchday_coverage(0, &pairs, &slots).unwrap_err();
    assert!(matches!(err, ScheduleError::InvariantViolation(_)));
  }

  mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
      /// Every unordered pair meets exactly `rounds` times, swapped on repeat.
      #[test]
      fn prop_round_robin_completeness(half in 1u32..=10, rounds in 1u8..=2) {
        let n = half * 2;
        let fixtures = generate_round_robin(&teams(n), rounds).unwrap();
        let expected = (n * (n - 1) / 2) as usize * rounds as usize;
        prop_assert_eq!(fixtures.len(), expected);

        let mut meetings: HashMap<(TeamId, TeamId), Vec<&Fixture>> = HashMap::new();
        for fixture in &fixtures {
          prop_assert_ne!(fixture.home, fixture.away);
          meetings.entry(pair_key(fixture)).or_default().push(fixture);
        }
        prop_assert_eq!(meetings.len(), (n * (n - 1) / 2) as usize);
        for games in meetings.values() {
          prop_assert_eq!(games.len(), rounds as usize);
          if rounds == 2 {
            prop_assert_eq!(games[0].home, games[1].away);
          }
        }
      }

      /// Every matchday contains each team exactly once.
      #[test]
      fn prop_matchday_coverage(half in 1u32..=10, rounds in 1u8..=2) {
        let n = half * 2;
        let fixtures = generate_round_robin(&teams(n), rounds).unwrap();
        let all = teams(n).into_iter().collect::<HashSet<_>>();
        for matchday in 0..matchday_count(&fixtures) {
          let mut seen = HashSet::new();
          for fixture in fixtures.iter().filter(|f| f.matchday == matchday) {
            prop_assert!(seen.insert(fixture.home));
            prop_assert!(seen.insert(fixture.away));
          }
          prop_assert_eq!(&seen, &all);
        }
      }
    }
  }
}
