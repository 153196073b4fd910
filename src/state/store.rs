// src/state/store.rs

//! Durable per-target state records.
//!
//! Records live in a `redb` database keyed by target name. Every access runs
//! inside [`StateStore::write_scope`] or [`StateStore::read_scope`]: take the
//! lock file, open the database, run one transaction, close the database,
//! release the lock. Jobs on other nodes open the same files, so no database
//! handle outlives a scope.
//!
//! A second table maps a submitted target to the job id the backend gave it,
//! so a later `run` can make new jobs wait on jobs that are still in flight.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use redb::{
    Database, Key, ReadOnlyTable, ReadableTable, Table, TableDefinition, TableError, Value,
};
use tracing::debug;

use crate::errors::{StateError, StoreError};
use crate::state::lock::LockGuard;
use crate::state::machine::{State, TargetState};
use crate::target::{Target, TargetName};

/// Database file inside the metadata directory.
pub const DB_FILE: &str = "state.redb";

/// Lock file guarding [`DB_FILE`].
pub const LOCK_FILE: &str = "state.lock";

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("target_state");
const JOB_TABLE: TableDefinition<&str, &str> = TableDefinition::new("target_job");

type StateTable<'txn> = Table<'txn, &'static str, &'static [u8]>;
type JobTable<'txn> = Table<'txn, &'static str, &'static str>;
type ReadStateTable = ReadOnlyTable<&'static str, &'static [u8]>;

/// Both tables of one write transaction.
struct Tables<'txn> {
    states: StateTable<'txn>,
    jobs: JobTable<'txn>,
}

/// What [`StateStore::rearm`] replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rearmed {
    pub previous: State,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
    lock_path: PathBuf,
}

impl StateStore {
    /// Use (and create if needed) the store under `metadata_dir`.
    pub fn open(metadata_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = metadata_dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            db_path: dir.join(DB_FILE),
            lock_path: dir.join(LOCK_FILE),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Current record for `name`, or a fresh initial record if none exists.
    pub fn get(&self, name: &str) -> Result<TargetState, StoreError> {
        self.read_scope(STATE_TABLE, |table| read_record(table, name))
    }

    /// Current records for all `targets`, in the same order, under one lock.
    pub fn load<'a, I>(&self, targets: I) -> Result<Vec<TargetState>, StoreError>
    where
        I: IntoIterator<Item = &'a Target>,
    {
        let names: Vec<&str> = targets.into_iter().map(|t| t.name.as_str()).collect();
        debug!(count = names.len(), "loading target states");
        self.read_scope(STATE_TABLE, |table| {
            names
                .iter()
                .map(|name| read_record(table, name))
                .collect()
        })
    }

    /// Job ids recorded for `names`. Names without one are left out.
    pub fn job_ids<'a, I>(&self, names: I) -> Result<HashMap<TargetName, String>, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.read_scope(JOB_TABLE, |table| {
            let mut found = HashMap::new();
            let Some(table) = table else {
                return Ok(found);
            };
            for name in names {
                if let Some(guard) = table.get(name).map_err(redb::Error::from)? {
                    found.insert(name.to_string(), guard.value().to_string());
                }
            }
            Ok(found)
        })
    }

    /// Overwrite the record for `state.name` with `state`.
    pub fn commit(&self, state: &TargetState) -> Result<(), StoreError> {
        debug!(target = %state.name, state = %state.state, "committing target state");
        self.write_scope(|tables| write_record(&mut tables.states, state))
    }

    /// Read-modify-write a single record inside one transaction.
    ///
    /// `f` sees the authoritative persisted record. If it fails, nothing is
    /// written and the error is returned.
    pub fn update<F>(&self, name: &str, f: F) -> Result<TargetState, StoreError>
    where
        F: FnOnce(&mut TargetState) -> Result<(), StateError>,
    {
        self.write_scope(|tables| {
            let mut current = decode_record(&tables.states, name)?;
            f(&mut current)?;
            write_record(&mut tables.states, &current)?;
            Ok(current)
        })
    }

    /// Move `state` to `to` and commit.
    ///
    /// The transition is validated against the persisted record, not the
    /// caller's snapshot; on success `state` is replaced with what was written.
    pub fn transition(&self, state: &mut TargetState, to: State) -> Result<(), StoreError> {
        let committed = self.update(&state.name, |current| current.transition(to))?;
        debug!(target = %committed.name, state = %committed.state, "target state committed");
        *state = committed;
        Ok(())
    }

    /// Record that `job_id` was accepted for `name`.
    ///
    /// An end-state record is re-armed first. The submitted record and the job
    /// id land in the same transaction.
    pub fn submit(&self, name: &str, job_id: &str) -> Result<TargetState, StoreError> {
        self.write_scope(|tables| {
            let mut current = decode_record(&tables.states, name)?;
            if current.is_end_state() {
                current.reset();
            }
            current.transition(State::Submitted)?;
            write_record(&mut tables.states, &current)?;
            tables
                .jobs
                .insert(name, job_id)
                .map_err(redb::Error::from)?;
            Ok(current)
        })
    }

    /// Re-arm the record for `name` and commit, dropping its job id.
    pub fn reset(&self, name: &str) -> Result<TargetState, StoreError> {
        self.write_scope(|tables| {
            let mut current = decode_record(&tables.states, name)?;
            current.reset();
            write_record(&mut tables.states, &current)?;
            remove_job(&mut tables.jobs, name)?;
            Ok(current)
        })
    }

    /// Re-arm `name` if it is in an end state, or in flight when `force` is set.
    ///
    /// The check and the write share one transaction, so a record that another
    /// process just submitted is never wiped by a plain re-arm. Returns `None`
    /// when the record was left alone.
    pub fn rearm(&self, name: &str, force: bool) -> Result<Option<Rearmed>, StoreError> {
        self.write_scope(|tables| {
            let mut current = decode_record(&tables.states, name)?;
            let previous = current.state;
            let eligible = current.is_end_state() || (force && previous != State::INITIAL);
            if !eligible {
                return Ok(None);
            }

            current.reset();
            write_record(&mut tables.states, &current)?;
            let job_id = remove_job(&mut tables.jobs, name)?;
            Ok(Some(Rearmed { previous, job_id }))
        })
    }

    /// Scoped write transaction: lock, open, run `f`, commit or abort, close, unlock.
    fn write_scope<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Tables<'_>) -> Result<T, StoreError>,
    {
        let _lock = LockGuard::acquire(&self.lock_path)?;
        let db = Database::create(&self.db_path).map_err(redb::Error::from)?;
        let txn = db.begin_write().map_err(redb::Error::from)?;

        let result = {
            let mut tables = Tables {
                states: txn.open_table(STATE_TABLE).map_err(redb::Error::from)?,
                jobs: txn.open_table(JOB_TABLE).map_err(redb::Error::from)?,
            };
            f(&mut tables)
        };

        match result {
            Ok(value) => {
                txn.commit().map_err(redb::Error::from)?;
                Ok(value)
            }
            Err(e) => {
                txn.abort().map_err(redb::Error::from)?;
                Err(e)
            }
        }
    }

    /// Scoped snapshot read of one table. `f` gets `None` if it was never written.
    fn read_scope<K, V, T, F>(&self, definition: TableDefinition<K, V>, f: F) -> Result<T, StoreError>
    where
        K: Key + 'static,
        V: Value + 'static,
        F: FnOnce(Option<&ReadOnlyTable<K, V>>) -> Result<T, StoreError>,
    {
        let _lock = LockGuard::acquire(&self.lock_path)?;
        if !self.db_path.exists() {
            return f(None);
        }

        let db = Database::create(&self.db_path).map_err(redb::Error::from)?;
        let txn = db.begin_read().map_err(redb::Error::from)?;
        match txn.open_table(definition) {
            Ok(table) => f(Some(&table)),
            Err(TableError::TableDoesNotExist(_)) => f(None),
            Err(e) => Err(redb::Error::from(e).into()),
        }
    }
}

fn read_record(table: Option<&ReadStateTable>, name: &str) -> Result<TargetState, StoreError> {
    match table {
        Some(table) => decode_record(table, name),
        None => Ok(TargetState::new(name)),
    }
}

fn decode_record<T>(table: &T, name: &str) -> Result<TargetState, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(name).map_err(redb::Error::from)? {
        Some(guard) => Ok(TargetState::from_payload(name, guard.value())?),
        None => Ok(TargetState::new(name)),
    }
}

fn write_record(table: &mut StateTable<'_>, state: &TargetState) -> Result<(), StoreError> {
    let payload = state.to_payload();
    table
        .insert(state.name.as_str(), payload.as_slice())
        .map_err(redb::Error::from)?;
    Ok(())
}

fn remove_job(table: &mut JobTable<'_>, name: &str) -> Result<Option<String>, StoreError> {
    let removed = table.remove(name).map_err(redb::Error::from)?;
    Ok(removed.map(|guard| guard.value().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join(".clusterflow")).unwrap();
        (dir, store)
    }

    #[test]
    fn absent_record_is_initial_state() {
        let (_dir, store) = store();
        assert_eq!(store.get("missing").unwrap(), TargetState::new("missing"));
    }

    #[test]
    fn commit_then_load_round_trips() {
        let (_dir, store) = store();
        let target = Target::empty("A", "/tmp");

        let mut state = TargetState::new("A");
        state.transition_at(State::Submitted, 10.0).unwrap();
        state.transition_at(State::Running, 11.0).unwrap();
        store.commit(&state).unwrap();

        let loaded = store.load([&target]).unwrap();
        assert_eq!(loaded, vec![state]);
    }

    #[test]
    fn transition_commits_and_validates_against_persisted_record() {
        let (_dir, store) = store();

        let mut state = store.get("A").unwrap();
        store.transition(&mut state, State::Submitted).unwrap();
        assert_eq!(store.get("A").unwrap().state, State::Submitted);

        // A stale snapshot does not get to skip the table.
        let mut stale = TargetState::new("A");
        store.transition(&mut stale, State::Running).unwrap();
        assert_eq!(stale.state, State::Running);
        assert!(stale.submitted_at.is_some());

        let err = store.transition(&mut state, State::Submitted).unwrap_err();
        assert!(matches!(err, StoreError::State(StateError::InvalidTransition { .. })));
        assert_eq!(store.get("A").unwrap().state, State::Running);
    }

    #[test]
    fn failed_update_writes_nothing() {
        let (_dir, store) = store();
        let mut state = store.get("A").unwrap();
        store.transition(&mut state, State::Submitted).unwrap();

        let before = store.get("A").unwrap();
        let res = store.update("A", |s| {
            s.reset();
            s.transition(State::Completed)
        });
        assert!(res.is_err());
        assert_eq!(store.get("A").unwrap(), before);
    }

    #[test]
    fn reset_rearms_end_state() {
        let (_dir, store) = store();
        let mut state = store.get("A").unwrap();
        for s in [State::Submitted, State::Running, State::Failed] {
            store.transition(&mut state, s).unwrap();
        }

        let reset = store.reset("A").unwrap();
        assert_eq!(reset, TargetState::new("A"));
        assert_eq!(store.get("A").unwrap(), TargetState::new("A"));
    }

    #[test]
    fn corrupt_record_is_a_hard_error() {
        let (_dir, store) = store();
        store
            .write_scope(|tables| {
                tables
                    .states
                    .insert("A", &b"\xff\x00garbage"[..])
                    .map_err(redb::Error::from)?;
                Ok(())
            })
            .unwrap();

        let err = store.get("A").unwrap_err();
        assert!(matches!(err, StoreError::State(StateError::Corrupt { .. })));
    }

    #[test]
    fn submit_records_job_and_rearms_end_state() {
        let (_dir, store) = store();
        let mut state = store.get("A").unwrap();
        for s in [State::Submitted, State::Running, State::Killed] {
            store.transition(&mut state, s).unwrap();
        }

        let submitted = store.submit("A", "42").unwrap();
        assert_eq!(submitted.state, State::Submitted);
        assert!(submitted.started_at.is_none());

        let jobs = store.job_ids(["A", "B"]).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs["A"], "42");
    }

    #[test]
    fn rearm_leaves_in_flight_records_unless_forced() {
        let (_dir, store) = store();
        store.submit("A", "7").unwrap();

        assert_eq!(store.rearm("A", false).unwrap(), None);
        assert_eq!(store.get("A").unwrap().state, State::Submitted);

        let rearmed = store.rearm("A", true).unwrap().unwrap();
        assert_eq!(rearmed.previous, State::Submitted);
        assert_eq!(rearmed.job_id.as_deref(), Some("7"));
        assert_eq!(store.get("A").unwrap(), TargetState::new("A"));
        assert!(store.job_ids(["A"]).unwrap().is_empty());

        assert_eq!(store.rearm("A", true).unwrap(), None);
    }
}
