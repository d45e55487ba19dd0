use std::collections::HashMap;
use tracing::info;

use crate::error::ScheduleError;
use crate::round_robin::{generate_round_robin, matchday_count, validate_teams};
use crate::types::{Fixture, Pool, RoundKind, TeamId};

/// Double round robin inside the top and bottom `pool_size` teams of the standings.
///
/// Pairings come from the circle method so each matchday is a clean round
/// for the distribution scheduler. Round 1 gives the better-ranked team the
/// home game, round 2 swaps it. Both pools share matchday numbers.
pub fn generate_playoffs(ranked: &[TeamId], pool_size: usize) -> Result<Vec<Fixture>, ScheduleError> {
  validate_teams(ranked)?;
  let max_pool = ranked.len() / 2;
  if pool_size < 2 {
    return Err(ScheduleError::input(format!(
      "playoff pool size must be at least 2, got {pool_size}"
    )));
  }
  if pool_size > ranked.len() {
    return Err(ScheduleError::input(format!(
      "playoff pool size {pool_size} exceeds the {} teams in the standings",
      ranked.len()
    )));
  }
  if pool_size > max_pool {
    return Err(ScheduleError::input(format!(
      "top and bottom pools of {pool_size} would overlap with {} teams; use at most {max_pool}",
      ranked.len()
    )));
  }

  let top = pool_fixtures(&ranked[..pool_size], Pool::Top)?;
  let bottom = pool_fixtures(&ranked[ranked.len() - pool_size..], Pool::Bottom)?;

  let mut fixtures = top.into_iter().chain(bottom).collect::<Vec<_>>();
  fixtures.sort_by_key(|fixture| fixture.matchday);

  info!(pool_size, fixtures = fixtures.len(), "generated playoff pools");
  Ok(fixtures)
}

fn pool_fixtures(teams: &[TeamId], pool: Pool) -> Result<Vec<Fixture>, ScheduleError> {
  let rank = teams
    .iter()
    .enumerate()
    .map(|(idx, team)| (*team, idx))
    .collect::<HashMap<_, _>>();
  let first_round = generate_round_robin(teams, 1)?;
  let matchdays = matchday_count(&first_round);

  let mut out = Vec::with_capacity(first_round.len() * 2);
  for round in 1..=2u8 {
    for fixture in &first_round {
      let (better, worse) = if rank[&fixture.home] < rank[&fixture.away] {
        (fixture.home, fixture.away)
      } else {
        (fixture.away, fixture.home)
      };
      let (home, away, matchday) = if round == 1 {
        (better, worse, fixture.matchday)
      } else {
        (worse, better, fixture.matchday + matchdays)
      };
      out.push(Fixture {
        home,
        away,
        matchday,
        kind: RoundKind::Playoff { pool, round },
      });
    }
  }
  Ok(out)
}
