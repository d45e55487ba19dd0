use chrono::Days;
use tracing::debug;

use crate::error::ScheduleError;
use crate::types::{monday_of, DateRange, PlayingWeek, ReservedSlot};

/// Weeks between `season.start` and `season.end` that can host league matches.
///
/// A week overlapping any blackout period is dropped. Reserved cup slots are
/// marked on their week; a week with every slot reserved is dropped too.
pub fn eligible_weeks(
  season: DateRange,
  blackouts: &[DateRange],
  reserved: &[ReservedSlot],
  slots_per_week: usize,
) -> Result<Vec<PlayingWeek>, ScheduleError> {
  if season.end < season.start {
    return Err(ScheduleError::input(format!(
      "season ends ({}) before it starts ({})",
      season.end, season.start
    )));
  }
  if let Some(bad) = blackouts.iter().find(|range| range.end < range.start) {
    return Err(ScheduleError::input(format!(
      "blackout period {} .. {} is inverted",
      bad.start, bad.end
    )));
  }

  let mut weeks = Vec::new();
  let mut monday = monday_of(season.start);
  while monday <= season.end {
    let mut week = PlayingWeek::new(monday);
    monday = monday + Days::new(7);

    if let Some(blackout) = blackouts.iter().find(|range| range.overlaps(&week.range())) {
      debug!(week = %week.monday, from = %blackout.start, to = %blackout.end, "week blacked out");
      continue;
    }
    for reservation in reserved {
      if monday_of(reservation.week) == week.monday && reservation.slot < slots_per_week {
        week.reserved_slots.insert(reservation.slot);
      }
    }
    if week.free_slot_count(slots_per_week) == 0 {
      debug!(week = %week.monday, "every slot reserved by cup fixtures");
      continue;
    }
    weeks.push(week);
  }
  Ok(weeks)
}
