use crate::competition::{default_match_time, CompetitionRequest, SchedulingOptions, SeasonSource};
use crate::types::*;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{
  env,
  fs,
  path::{Path, PathBuf},
};

pub const CONFIG_PATH_VAR: &str = "LEAGUE_CONFIG_PATH";
pub const LOG_DIR_VAR: &str = "LEAGUE_LOG_DIR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonConfig {
  pub venues: Vec<Venue>,
  pub timeslots: Vec<Timeslot>,
  pub blackout_periods: Vec<DateRange>,
  pub reserved_slots: Vec<ReservedSlot>,
  pub slots_per_week: Option<usize>,
  /// "HH:MM", used when no timeslot fits.
  pub default_time: Option<String>,
  pub placeholder_venue: Option<String>,
}

impl SeasonSource for SeasonConfig {
  fn venues(&self) -> Vec<Venue> {
    self.venues.clone()
  }

  fn timeslots(&self) -> Vec<Timeslot> {
    self.timeslots.clone()
  }

  fn blackout_periods(&self) -> Vec<DateRange> {
    self.blackout_periods.clone()
  }

  fn reserved_slots(&self) -> Vec<ReservedSlot> {
    self.reserved_slots.clone()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
  pub season: SeasonConfig,
  /// In standings order when generating playoffs.
  pub teams: Vec<Team>,
  pub competition: CompetitionRequest,
}

impl AppConfig {
  pub fn scheduling_options(&self) -> Result<SchedulingOptions, String> {
    let default_time = match self.season.default_time.as_deref() {
      Some(raw) => parse_match_time(raw)?,
      None => default_match_time(),
    };
    Ok(SchedulingOptions {
      slots_per_week: self.season.slots_per_week.unwrap_or(SLOTS_PER_WEEK),
      default_time,
      placeholder_venue: self
        .season
        .placeholder_venue
        .clone()
        .unwrap_or_else(|| PLACEHOLDER_VENUE.to_string()),
    })
  }
}

pub fn parse_match_time(raw: &str) -> Result<NaiveTime, String> {
  let trimmed = raw.trim();
  NaiveTime::parse_from_str(trimmed, "%H:%M")
    .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
    .map_err(|e| format!("invalid match time {trimmed:?}: {e}"))
}

/// First CLI argument, then `LEAGUE_CONFIG_PATH`, then `config.json`.
pub fn config_path(arg: Option<&str>) -> PathBuf {
  arg
    .map(str::trim)
    .filter(|raw| !raw.is_empty())
    .map(PathBuf::from)
    .or_else(|| env_default(CONFIG_PATH_VAR).map(PathBuf::from))
    .unwrap_or_else(|| PathBuf::from("config.json"))
}

pub fn log_dir() -> PathBuf {
  env_default(LOG_DIR_VAR)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("logs"))
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

/// Fills settings the file left out from `lookup`.
pub fn apply_defaults_from<F>(mut config: AppConfig, lookup: F) -> Result<AppConfig, String>
where
  F: Fn(&str) -> Option<String>,
{
  if config.season.slots_per_week.is_none() {
    if let Some(value) = lookup("LEAGUE_SLOTS_PER_WEEK") {
      let slots = value
        .parse::<usize>()
        .map_err(|e| format!("LEAGUE_SLOTS_PER_WEEK={value}: {e}"))?;
      config.season.slots_per_week = Some(slots);
    }
  }
  if config.season.default_time.is_none() {
    if let Some(value) = lookup("LEAGUE_DEFAULT_TIME") {
      parse_match_time(&value)?;
      config.season.default_time = Some(value);
    }
  }
  if config.season.placeholder_venue.is_none() {
    if let Some(value) = lookup("LEAGUE_PLACEHOLDER_VENUE") {
      config.season.placeholder_venue = Some(value);
    }
  }
  Ok(config)
}

pub fn apply_env_defaults(config: AppConfig) -> Result<AppConfig, String> {
  apply_defaults_from(config, env_default)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, String> {
  if !path.is_file() {
    return apply_env_defaults(AppConfig::default());
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  apply_env_defaults(config)
}

pub fn log_config_warnings(config: &AppConfig) {
  let mut warnings = Vec::new();

  if config.season.timeslots.is_empty() {
    warnings.push("no timeslots configured; every league match gets the fallback time and venue");
  }
  if config.teams.is_empty() {
    warnings.push("no teams configured; generation will fail");
  }
  if config.competition.format.is_none() {
    warnings.push("competition.format not set; generation will fail");
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}

/// Loads `.env` from `dir` without overriding variables already set.
pub fn load_env_file(dir: &Path) {
  let env_path = dir.join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let value = raw_value.trim();
  let unquoted = ['"', '\'']
    .iter()
    .find_map(|quote| {
      value
        .strip_prefix(*quote)
        .and_then(|rest| rest.strip_suffix(*quote))
    });
  let value = match unquoted {
    Some(inner) => inner,
    None => value.split('#').next().unwrap_or_default().trim_end(),
  };
  Some((key.to_string(), value.to_string()))
}
