use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use crate::error::StoreError;
use crate::types::{CompetitionId, MatchId, MatchRecord, MatchUpdate, Side, TeamId};

/// Record store for persisted matches.
///
/// Implementations must give `insert_matches` all-or-nothing semantics and
/// make `update_slot` a compare-and-swap on the slot occupant.
pub trait MatchStore: Send + Sync {
    /// Inserts the batch atomically and returns the assigned ids in input order.
    fn insert_matches(&self, matches: Vec<MatchRecord>) -> Result<Vec<MatchId>, StoreError>;

    fn update_match(&self, id: MatchId, update: MatchUpdate) -> Result<MatchRecord, StoreError>;

    fn get_match_by_label(
        &self,
        competition_id: CompetitionId,
        label: &str,
    ) -> Result<Option<MatchRecord>, StoreError>;

    fn list_matches(&self, competition_id: CompetitionId) -> Result<Vec<MatchRecord>, StoreError>;

    /// Removes every match of the competition; returns how many were removed.
    fn delete_competition(&self, competition_id: CompetitionId) -> Result<usize, StoreError>;

    /// Writes `new` into the slot only if it still holds `expected`.
    fn update_slot(
        &self,
        competition_id: CompetitionId,
        label: &str,
        side: Side,
        expected: Option<TeamId>,
        new: Option<TeamId>,
    ) -> Result<MatchRecord, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    matches: BTreeMap<MatchId, MatchRecord>,
    label_index: HashMap<(CompetitionId, String), MatchId>,
    next_id: MatchId,
}

/// Mutex-guarded store used by the binary and the tests.
#[derive(Default)]
pub struct InMemoryMatchStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        InMemoryMatchStore::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Serialized view of a competition, used to compare store states.
    pub fn snapshot_json(&self, competition_id: CompetitionId) -> Result<Vec<u8>, StoreError> {
        let matches = self.list_matches(competition_id)?;
        serde_json::to_vec(&matches).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert_matches(&self, matches: Vec<MatchRecord>) -> Result<Vec<MatchId>, StoreError> {
        let mut guard = self.lock()?;

        let mut used_codes: HashSet<(CompetitionId, String)> = guard
            .matches
            .values()
            .map(|m| (m.competition_id, m.code.clone()))
            .collect();
        let mut new_labels: HashSet<(CompetitionId, String)> = HashSet::new();
        for record in &matches {
            if !used_codes.insert((record.competition_id, record.code.clone())) {
                return Err(StoreError::DuplicateCode(record.code.clone()));
            }
            if let Some(label) = record.label() {
                let key = (record.competition_id, label.to_string());
                if guard.label_index.contains_key(&key) || !new_labels.insert(key) {
                    return Err(StoreError::DuplicateCode(label.to_string()));
                }
            }
        }

        let mut ids = Vec::with_capacity(matches.len());
        for mut record in matches {
            guard.next_id += 1;
            let id = guard.next_id;
            record.id = id;
            if let Some(label) = record.label() {
                guard
                    .label_index
                    .insert((record.competition_id, label.to_string()), id);
            }
            guard.matches.insert(id, record);
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_match(&self, id: MatchId, update: MatchUpdate) -> Result<MatchRecord, StoreError> {
        let mut guard = self.lock()?;
        let record = guard
            .matches
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))?;
        match update {
            MatchUpdate::RecordScore(score) => {
                record.score = Some(score);
                record.completed = true;
            }
            MatchUpdate::ClearScore => {
                record.score = None;
                record.completed = false;
            }
            MatchUpdate::SetLocked(locked) => {
                record.locked = locked;
            }
        }
        Ok(record.clone())
    }

    fn get_match_by_label(
        &self,
        competition_id: CompetitionId,
        label: &str,
    ) -> Result<Option<MatchRecord>, StoreError> {
        let guard = self.lock()?;
        let record = guard
            .label_index
            .get(&(competition_id, label.to_string()))
            .and_then(|id| guard.matches.get(id))
            .cloned();
        Ok(record)
    }

    fn list_matches(&self, competition_id: CompetitionId) -> Result<Vec<MatchRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .matches
            .values()
            .filter(|m| m.competition_id == competition_id)
            .cloned()
            .collect())
    }

    fn delete_competition(&self, competition_id: CompetitionId) -> Result<usize, StoreError> {
        let mut guard = self.lock()?;
        let before = guard.matches.len();
        guard.matches.retain(|_, m| m.competition_id != competition_id);
        guard.label_index.retain(|(comp, _), _| *comp != competition_id);
        Ok(before - guard.matches.len())
    }

    fn update_slot(
        &self,
        competition_id: CompetitionId,
        label: &str,
        side: Side,
        expected: Option<TeamId>,
        new: Option<TeamId>,
    ) -> Result<MatchRecord, StoreError> {
        let mut guard = self.lock()?;
        let id = guard
            .label_index
            .get(&(competition_id, label.to_string()))
            .copied()
            .ok_or_else(|| StoreError::NotFound(label.to_string()))?;
        let record = guard
            .matches
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(label.to_string()))?;
        let found = record.team(side);
        if found != expected {
            return Err(StoreError::Conflict {
                label: label.to_string(),
                side,
                expected,
                found,
            });
        }
        record.set_team(side, new);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchKind, RoundKind, Score};

    fn league_match(competition_id: CompetitionId, code: &str) -> MatchRecord {
        MatchRecord {
            id: 0,
            competition_id,
            code: code.to_string(),
            home_team: Some(1),
            away_team: Some(2),
            kind: MatchKind::League {
                matchday: 0,
                round: RoundKind::Regular,
            },
            schedule: None,
            score: None,
            completed: false,
            locked: false,
        }
    }

    fn cup_match(label: &str) -> MatchRecord {
        MatchRecord {
            id: 0,
            competition_id: 7,
            code: format!("CUP-{label}"),
            home_team: None,
            away_team: None,
            kind: MatchKind::Cup {
                label: label.to_string(),
                next_label: None,
                home_source: None,
                away_source: None,
            },
            schedule: None,
            score: None,
            completed: false,
            locked: false,
        }
    }

    #[test]
    fn test_insert_is_all_or_nothing() {
        let store = InMemoryMatchStore::new();
        store.insert_matches(vec![league_match(1, "L-R01-001")]).unwrap();

        let err = store
            .insert_matches(vec![league_match(1, "L-R01-002"), league_match(1, "L-R01-001")])
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateCode("L-R01-001".to_string()));
        assert_eq!(store.list_matches(1).unwrap().len(), 1);
    }

    #[test]
    fn test_same_code_allowed_across_competitions() {
        let store = InMemoryMatchStore::new();
        store.insert_matches(vec![league_match(1, "X-1")]).unwrap();
        store.insert_matches(vec![league_match(2, "X-1")]).unwrap();
        assert_eq!(store.list_matches(2).unwrap().len(), 1);
    }

    #[test]
    fn test_update_slot_compare_and_swap() {
        let store = InMemoryMatchStore::new();
        store.insert_matches(vec![cup_match("QF-1")]).unwrap();

        store.update_slot(7, "QF-1", Side::Home, None, Some(5)).unwrap();
        let err = store
            .update_slot(7, "QF-1", Side::Home, None, Some(6))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: Some(5), .. }));

        let record = store.get_match_by_label(7, "QF-1").unwrap().unwrap();
        assert_eq!(record.home_team, Some(5));
        assert_eq!(record.away_team, None);
    }

    #[test]
    fn test_record_and_clear_score() {
        let store = InMemoryMatchStore::new();
        let ids = store.insert_matches(vec![league_match(1, "A")]).unwrap();

        let record = store
            .update_match(ids[0], MatchUpdate::RecordScore(Score::new(2, 0)))
            .unwrap();
        assert!(record.completed);

        let record = store.update_match(ids[0], MatchUpdate::ClearScore).unwrap();
        assert!(!record.completed);
        assert_eq!(record.score, None);
    }

    #[test]
    fn test_delete_competition_frees_labels() {
        let store = InMemoryMatchStore::new();
        store.insert_matches(vec![cup_match("FINAL")]).unwrap();
        assert_eq!(store.delete_competition(7).unwrap(), 1);
        assert!(store.get_match_by_label(7, "FINAL").unwrap().is_none());
        store.insert_matches(vec![cup_match("FINAL")]).unwrap();
    }
}
