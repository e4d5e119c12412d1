use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::clock::{Clock, IdGenerator};
use crate::dataset::{self, DatasetDocument, DatasetError};
use crate::history::History;
use crate::store::{KeyValueStore, StoreError, ACTIVE_TRACKER_KEY, HISTORY_KEY};
use crate::tracker::{Tracker, TrackerEngine};

/// Everything the app persists: the active tracker slot plus the history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub active: Option<Tracker>,
    pub history: History,
}

impl AppState {
    /// Reads both keys. Missing or unreadable values fall back to an empty
    /// slot and an empty history.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let active = load_key::<Option<Tracker>>(store, ACTIVE_TRACKER_KEY).flatten();
        let history = load_key::<History>(store, HISTORY_KEY).unwrap_or_default();
        Self { active, history }
    }

    /// Rewrites both keys in full. History goes first so an interrupted
    /// archive leaves the tracker in both places rather than in neither.
    pub fn persist(&self, store: &mut dyn KeyValueStore) -> Result<(), StoreError> {
        let active = serde_json::to_vec(&self.active)
            .map_err(|err| StoreError::Unavailable(format!("encode active tracker: {err}")))?;
        let history = serde_json::to_vec(&self.history)
            .map_err(|err| StoreError::Unavailable(format!("encode history: {err}")))?;
        store.set(HISTORY_KEY, &history)?;
        store.set(ACTIVE_TRACKER_KEY, &active)?;
        Ok(())
    }
}

fn load_key<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(err) => {
            warn!(key, error = %err, "could not read stored value; using default");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "stored value is not valid; using default");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub has_active: bool,
    pub history_len: usize,
}

/// Owns the state, the store it is persisted to, and the engine that
/// transitions it. Each mutation swaps in a whole new `AppState` and then
/// writes it out; write failures are logged and the in-memory state wins.
#[derive(Debug)]
pub struct Session<S, C, G> {
    store: S,
    engine: TrackerEngine<C, G>,
    state: AppState,
}

impl<S, C, G> Session<S, C, G>
where
    S: KeyValueStore,
    C: Clock,
    G: IdGenerator,
{
    pub fn open(store: S, engine: TrackerEngine<C, G>) -> Self {
        let state = AppState::load(&store);
        debug!(
            has_active = state.active.is_some(),
            history = state.history.len(),
            "session opened"
        );
        Self {
            store,
            engine,
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn active(&self) -> Option<&Tracker> {
        self.state.active.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.state.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn commit(&mut self, next: AppState) {
        self.state = next;
        if let Err(err) = self.state.persist(&mut self.store) {
            warn!(error = %err, "failed to persist state; keeping in-memory copy");
        }
    }

    /// Replaces the active slot with a fresh tracker. Whatever was active
    /// before is dropped, not archived.
    pub fn create(&mut self, label: &str, target_input: &str) -> Option<&Tracker> {
        let tracker = self.engine.create(label, target_input)?;
        if let Some(previous) = &self.state.active {
            debug!(tracker = %previous.id, "replacing active tracker without archiving");
        }
        let next = AppState {
            active: Some(tracker),
            ..self.state.clone()
        };
        self.commit(next);
        self.active()
    }

    pub fn increment(&mut self) -> Option<&Tracker> {
        let tracker = self.engine.increment(self.state.active.as_ref()?)?;
        self.replace_active(tracker);
        self.active()
    }

    pub fn decrement(&mut self) -> Option<&Tracker> {
        let tracker = self.engine.decrement(self.state.active.as_ref()?)?;
        self.replace_active(tracker);
        self.active()
    }

    fn replace_active(&mut self, tracker: Tracker) {
        let next = AppState {
            active: Some(tracker),
            ..self.state.clone()
        };
        self.commit(next);
    }

    /// Moves the active tracker to the front of the history. Returns `None`
    /// when there is nothing to archive.
    pub fn archive(&mut self) -> Option<&Tracker> {
        let archived = self.engine.archive(self.state.active.as_ref()?);
        info!(tracker = %archived.id, label = %archived.label, "tracker archived");
        let mut history = self.state.history.clone();
        history.add(archived);
        self.commit(AppState {
            active: None,
            history,
        });
        self.state.history.iter().next()
    }

    pub fn delete_from_history(&mut self, id: &str) -> usize {
        let mut history = self.state.history.clone();
        let removed = history.remove(id);
        if removed > 0 {
            info!(tracker = id, removed, "removed from history");
            self.commit(AppState {
                active: self.state.active.clone(),
                history,
            });
        }
        removed
    }

    pub fn export_document(&self) -> DatasetDocument {
        dataset::export(self.state.active.as_ref(), &self.state.history)
    }

    /// All or nothing: on error neither the state nor the store changes.
    pub fn import(&mut self, raw: &[u8]) -> Result<ImportSummary, DatasetError> {
        let data = match dataset::import_document(raw) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "import rejected");
                return Err(err);
            }
        };
        let summary = ImportSummary {
            has_active: data.active_tracker.is_some(),
            history_len: data.history.len(),
        };
        info!(
            has_active = summary.has_active,
            history = summary.history_len,
            "dataset imported"
        );
        self.commit(AppState {
            active: data.active_tracker,
            history: data.history,
        });
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::store::MemoryStore;
    use crate::tracker::LogAction;
    use pretty_assertions::assert_eq;

    type TestSession = Session<MemoryStore, ManualClock, SequentialIds>;

    fn session(store: MemoryStore) -> TestSession {
        Session::open(
            store,
            TrackerEngine::new(ManualClock::with_step(5_000, 10), SequentialIds::default()),
        )
    }

    #[test]
    fn load_falls_back_on_garbage() {
        let store = MemoryStore::new()
            .with_entry(ACTIVE_TRACKER_KEY, "{oops")
            .with_entry(HISTORY_KEY, "42");
        let state = AppState::load(&store);
        assert_eq!(state, AppState::default());
    }

    #[test]
    fn load_accepts_null_active() {
        let store = MemoryStore::new()
            .with_entry(ACTIVE_TRACKER_KEY, "null")
            .with_entry(HISTORY_KEY, "[]");
        assert_eq!(AppState::load(&store), AppState::default());
    }

    #[test]
    fn mutations_are_persisted() {
        let mut session = session(MemoryStore::new());
        session.create("Swim", "2").expect("created");
        session.increment().expect("incremented");

        let reloaded = AppState::load(session.store());
        assert_eq!(&reloaded, session.state());
        assert_eq!(reloaded.active.map(|t| t.current), Some(1));
    }

    #[test]
    fn archive_moves_tracker_to_front_of_history() {
        let mut session = session(MemoryStore::new());
        session.create("First", "1").expect("created");
        session.archive().expect("archived");
        session.create("Second", "1").expect("created");
        let archived_id = session.archive().expect("archived").id.clone();

        assert!(session.active().is_none());
        let labels: Vec<&str> = session.history().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["Second", "First"]);
        assert_eq!(session.history().iter().next().map(|t| t.id.clone()), Some(archived_id));
        assert!(session.archive().is_none());
    }

    #[test]
    fn create_overwrites_without_archiving() {
        let mut session = session(MemoryStore::new());
        session.create("Old", "3").expect("created");
        session.create("New", "4").expect("created");
        assert_eq!(session.active().map(|t| t.label.as_str()), Some("New"));
        assert!(session.history().is_empty());
    }

    #[test]
    fn invalid_create_keeps_previous_tracker() {
        let mut session = session(MemoryStore::new());
        session.create("Keep", "3").expect("created");
        assert!(session.create("Drop", "nope").is_none());
        assert_eq!(session.active().map(|t| t.label.as_str()), Some("Keep"));
    }

    #[test]
    fn persistence_failure_keeps_memory_state() {
        let mut session = session(MemoryStore::failing());
        session.create("Offline", "2").expect("created");
        session.increment().expect("incremented");
        assert_eq!(session.active().map(|t| t.current), Some(1));
        assert!(session.store().raw(ACTIVE_TRACKER_KEY).is_none());
    }

    #[test]
    fn failed_history_write_never_loses_archived_tracker() {
        let engine = TrackerEngine::new(ManualClock::with_step(1, 1), SequentialIds::new("seed"));
        let seeded = engine.create("Keep me", "2").expect("created");
        let store = MemoryStore::refusing(HISTORY_KEY).with_entry(
            ACTIVE_TRACKER_KEY,
            serde_json::to_vec(&Some(&seeded)).expect("json"),
        );
        let mut session = session(store);
        session.archive().expect("archived");
        assert!(session.active().is_none());
        assert_eq!(session.history().len(), 1);

        let reloaded = AppState::load(session.store());
        assert_eq!(reloaded.active, Some(seeded));
        assert!(reloaded.history.is_empty());
    }

    #[test]
    fn archiving_imported_archived_tracker_keeps_its_stamp() {
        let mut session = session(MemoryStore::new());
        session
            .import(
                br#"{"version":1,"activeTracker":{"id":"old","label":"Done","target":2,"current":2,"createdAt":1,"completedAt":3,"archivedAt":5,"logs":[]}}"#,
            )
            .expect("import");
        let archived = session.archive().expect("archived").clone();
        assert_eq!(archived.archived_at, Some(5));
        assert!(archived.logs.is_empty());
        assert!(session.active().is_none());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn delete_from_history_persists() {
        let mut session = session(MemoryStore::new());
        session.create("Gone", "1").expect("created");
        let id = session.archive().expect("archived").id.clone();
        assert_eq!(session.delete_from_history("unknown"), 0);
        assert_eq!(session.delete_from_history(&id), 1);
        assert!(AppState::load(session.store()).history.is_empty());
    }

    #[test]
    fn failed_import_changes_nothing() {
        let mut session = session(MemoryStore::new());
        session.create("Stay", "5").expect("created");
        session.increment().expect("incremented");
        let before = session.state().clone();
        let stored = session.store().raw(ACTIVE_TRACKER_KEY).map(<[u8]>::to_vec);

        assert!(session.import(b"not json").is_err());
        assert!(session.import(br#"{"version":1}"#).is_err());
        assert_eq!(session.state(), &before);
        assert_eq!(session.store().raw(ACTIVE_TRACKER_KEY).map(<[u8]>::to_vec), stored);
    }

    #[test]
    fn import_replaces_everything() {
        let mut source = session(MemoryStore::new());
        source.create("Exported", "2").expect("created");
        source.archive().expect("archived");
        source.create("Current", "9").expect("created");
        let json = source.export_document().to_json_pretty().expect("json");

        let mut target = session(MemoryStore::new());
        target.create("Local", "3").expect("created");
        let summary = target.import(json.as_bytes()).expect("import");
        assert_eq!(
            summary,
            ImportSummary {
                has_active: true,
                history_len: 1
            }
        );
        assert_eq!(target.state(), source.state());
        assert_eq!(AppState::load(target.store()), *source.state());
        let last = target
            .history()
            .iter()
            .next()
            .and_then(|t| t.last_log())
            .map(|e| e.action);
        assert_eq!(last, Some(LogAction::Archived));
    }
}
