use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::ScheduleError;
use crate::types::{Timeslot, Venue};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSlot {
  pub timeslot: Timeslot,
  pub venue: Venue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSlot {
  pub time: NaiveTime,
  pub venue: String,
  /// `None` when the fallback was used.
  pub day_of_week: Option<u8>,
  pub timeslot_id: Option<u32>,
}

impl ResolvedSlot {
  pub fn is_fallback(&self) -> bool {
    self.timeslot_id.is_none()
  }
}

/// Picks venue/time combinations by ascending priority rank.
#[derive(Clone, Debug)]
pub struct TimeslotResolver {
  ranked: Vec<RankedSlot>,
  default_time: NaiveTime,
  placeholder_venue: String,
}

impl TimeslotResolver {
  pub fn new(
    timeslots: &[Timeslot],
    venues: &[Venue],
    default_time: NaiveTime,
    placeholder_venue: &str,
  ) -> Result<Self, ScheduleError> {
    let venues_by_id = venues
      .iter()
      .map(|venue| (venue.id, venue))
      .collect::<HashMap<_, _>>();

    let mut priorities = HashSet::new();
    let mut ranked = Vec::with_capacity(timeslots.len());
    for timeslot in timeslots {
      if !(1..=7).contains(&timeslot.day_of_week) {
        return Err(ScheduleError::input(format!(
          "timeslot {} has day of week {}, expected 1..=7",
          timeslot.id, timeslot.day_of_week
        )));
      }
      if !priorities.insert(timeslot.priority) {
        return Err(ScheduleError::input(format!(
          "priority rank {} is used by more than one timeslot",
          timeslot.priority
        )));
      }
      let venue = venues_by_id.get(&timeslot.venue_id).ok_or_else(|| {
        ScheduleError::input(format!(
          "timeslot {} references unknown venue {}",
          timeslot.id, timeslot.venue_id
        ))
      })?;
      ranked.push(RankedSlot {
        timeslot: timeslot.clone(),
        venue: (*venue).clone(),
      });
    }
    ranked.sort_by_key(|slot| slot.timeslot.priority);

    Ok(TimeslotResolver {
      ranked,
      default_time,
      placeholder_venue: placeholder_venue.to_string(),
    })
  }

  pub fn ranked(&self) -> &[RankedSlot] {
    &self.ranked
  }

  /// Slot for the `position`-th match of a day.
  ///
  /// Position 0 always gets the best-ranked slot; later positions wrap
  /// around the available list. With `target_date` only slots on that
  /// weekday are considered.
  pub fn resolve(
    &self,
    position: usize,
    matches_in_day: usize,
    target_date: Option<NaiveDate>,
  ) -> ResolvedSlot {
    let weekday = target_date.map(|date| date.weekday().number_from_monday() as u8);
    let available = self
      .ranked
      .iter()
      .filter(|slot| weekday.map_or(true, |day| slot.timeslot.day_of_week == day))
      .collect::<Vec<_>>();

    if available.is_empty() {
      debug!(?target_date, "no timeslot matches, using fallback");
      return ResolvedSlot {
        time: self.default_time,
        venue: self.placeholder_venue.clone(),
        day_of_week: weekday,
        timeslot_id: None,
      };
    }
    if matches_in_day > available.len() {
      debug!(
        matches_in_day,
        available = available.len(),
        "more matches than timeslots, slots will be shared"
      );
    }

    let picked = available[position % available.len()];
    ResolvedSlot {
      time: picked.timeslot.start,
      venue: picked.venue.name.clone(),
      day_of_week: Some(picked.timeslot.day_of_week),
      timeslot_id: Some(picked.timeslot.id),
    }
  }
}
