//! In-memory directory adapter
//!
//! Keeps the tree in a map guarded by a single lock, so a create is an
//! atomic check-and-insert. Intended for tests and local tooling: it records
//! every operation it receives, counts open sessions, and can inject read or
//! write failures or simulate a concurrent writer winning a create race.

use super::{AdapterError, AttributeSelection, Attributes, DirectoryAdapter, DirectorySession, Entry};
use crate::dn::Dn;
use crate::filter::Filter;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One operation received by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `find_by_path`
    Find {
        /// Path looked up
        path: Dn,
    },
    /// `search_one_level`
    SearchOneLevel {
        /// Search base
        base: Dn,
        /// Rendered filter
        filter: String,
    },
    /// `search_subtree`
    SearchSubtree {
        /// Search base
        base: Dn,
        /// Rendered filter
        filter: String,
    },
    /// `create_entry`, successful or not
    Create {
        /// Path to create
        path: Dn,
    },
}

impl Operation {
    /// Whether this operation attempted a write
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create { .. })
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<Dn, Entry>,
    suffixes: HashSet<Dn>,
    journal: Vec<Operation>,
    write_failures: HashMap<Dn, AdapterError>,
    read_failures: HashMap<Dn, AdapterError>,
    /// Entries a simulated concurrent writer creates; `None` copies the request
    races: HashMap<Dn, Option<Entry>>,
}

/// In-memory tree store
#[derive(Default)]
pub struct InMemoryDirectory {
    state: RwLock<State>,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
    offline: AtomicBool,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory whose naming context is `suffix` (e.g. `dc=test`)
    pub fn with_suffix(suffix: &Dn) -> Self {
        let dir = Self::new();
        dir.add_suffix(suffix);
        dir
    }

    /// Register a naming context; entries directly below it may be created
    pub fn add_suffix(&self, suffix: &Dn) {
        let mut state = self.state.write();
        state.suffixes.insert(suffix.clone());
        if let Some(rdn) = suffix.leaf() {
            let mut attributes = Attributes::new();
            attributes.insert("objectClass".to_string(), vec!["top".to_string()]);
            attributes.insert(rdn.attr().to_string(), vec![rdn.value().to_string()]);
            state
                .entries
                .entry(suffix.clone())
                .or_insert_with(|| Entry::new(suffix.clone(), attributes));
        }
    }

    /// Insert an entry directly, bypassing parent checks and the journal
    pub fn seed(&self, path: &Dn, object_classes: &[&str], attributes: &[(&str, &str)]) {
        let entry = seed_entry(path, object_classes, attributes);
        self.state.write().entries.insert(path.clone(), entry);
    }

    /// Make the next create of `path` fail with `error`
    pub fn fail_writes_to(&self, path: &Dn, error: AdapterError) {
        self.state.write().write_failures.insert(path.clone(), error);
    }

    /// Make every find or search at or below `path` fail with `error`
    pub fn fail_reads_at(&self, path: &Dn, error: AdapterError) {
        self.state.write().read_failures.insert(path.clone(), error);
    }

    /// Let a simulated concurrent writer create `path` just before the next
    /// create request for it arrives, so that request sees `AlreadyExists`
    pub fn race_create_of(&self, path: &Dn) {
        self.state.write().races.insert(path.clone(), None);
    }

    /// Like [`race_create_of`](Self::race_create_of), but the concurrent
    /// writer stores its own entry instead of the requested one
    pub fn race_create_as(&self, path: &Dn, object_classes: &[&str], attributes: &[(&str, &str)]) {
        let entry = seed_entry(path, object_classes, attributes);
        self.state.write().races.insert(path.clone(), Some(entry));
    }

    /// Refuse new sessions
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Entry at `path`, if any
    pub fn get(&self, path: &Dn) -> Option<Entry> {
        self.state.read().entries.get(path).cloned()
    }

    /// Whether an entry exists at `path`
    pub fn contains(&self, path: &Dn) -> bool {
        self.state.read().entries.contains_key(path)
    }

    /// Number of entries, naming contexts included
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the directory holds no entries
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Entries strictly below `base`
    pub fn descendants_of(&self, base: &Dn) -> Vec<Dn> {
        let state = self.state.read();
        let mut paths: Vec<Dn> = state
            .entries
            .keys()
            .filter(|p| p.is_descendant_of(base))
            .cloned()
            .collect();
        paths.sort_by_key(|p| p.to_string());
        paths
    }

    /// Operations received so far, oldest first
    pub fn journal(&self) -> Vec<Operation> {
        self.state.read().journal.clone()
    }

    /// Number of write attempts received so far
    pub fn write_count(&self) -> usize {
        self.state.read().journal.iter().filter(|op| op.is_write()).count()
    }

    /// Forget recorded operations
    pub fn clear_journal(&self) {
        self.state.write().journal.clear();
    }

    /// Sessions currently open
    pub fn active_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened since creation
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Journal `op`, then report an injected read failure covering `path`
    fn record_read(&self, op: Operation, path: &Dn) -> Result<(), AdapterError> {
        let mut state = self.state.write();
        state.journal.push(op);
        let failure = state
            .read_failures
            .iter()
            .find(|(base, _)| path == *base || path.is_descendant_of(base))
            .map(|(_, err)| err.clone());
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn search(
        &self,
        base: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
        one_level: bool,
    ) -> Vec<Entry> {
        let state = self.state.read();
        let mut hits: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| {
                let path = e.path();
                if one_level {
                    path.is_child_of(base)
                } else {
                    path == base || path.is_descendant_of(base)
                }
            })
            .filter(|e| filter.matches(e))
            .map(|e| e.project(attributes))
            .collect();
        hits.sort_by_key(|e| e.path().to_string());
        hits
    }
}

fn seed_entry(path: &Dn, object_classes: &[&str], attributes: &[(&str, &str)]) -> Entry {
    build_entry(
        path,
        &object_classes.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        &attributes.iter().fold(Attributes::new(), |mut acc, (k, v)| {
            acc.entry(k.to_string()).or_default().push(v.to_string());
            acc
        }),
    )
}

fn build_entry(path: &Dn, object_classes: &[String], attributes: &Attributes) -> Entry {
    let mut all = attributes.clone();
    if !object_classes.is_empty() {
        all.insert("objectClass".to_string(), object_classes.to_vec());
    }
    Entry::new(path.clone(), all)
}

impl DirectoryAdapter for InMemoryDirectory {
    fn open_session(&self) -> Result<Box<dyn DirectorySession + '_>, AdapterError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AdapterError::Connection("directory is offline".to_string()));
        }
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession { dir: self }))
    }
}

/// Session over an [`InMemoryDirectory`]
pub struct InMemorySession<'a> {
    dir: &'a InMemoryDirectory,
}

impl Drop for InMemorySession<'_> {
    fn drop(&mut self) {
        self.dir.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DirectorySession for InMemorySession<'_> {
    fn find_by_path(
        &mut self,
        path: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
    ) -> Result<Option<Entry>, AdapterError> {
        self.dir.record_read(Operation::Find { path: path.clone() }, path)?;
        let state = self.dir.state.read();
        Ok(state
            .entries
            .get(path)
            .filter(|e| filter.matches(e))
            .map(|e| e.project(attributes)))
    }

    fn search_one_level(
        &mut self,
        base: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
    ) -> Result<Vec<Entry>, AdapterError> {
        self.dir.record_read(
            Operation::SearchOneLevel {
                base: base.clone(),
                filter: filter.to_string(),
            },
            base,
        )?;
        Ok(self.dir.search(base, filter, attributes, true))
    }

    fn search_subtree(
        &mut self,
        base: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
    ) -> Result<Vec<Entry>, AdapterError> {
        self.dir.record_read(
            Operation::SearchSubtree {
                base: base.clone(),
                filter: filter.to_string(),
            },
            base,
        )?;
        Ok(self.dir.search(base, filter, attributes, false))
    }

    fn create_entry(
        &mut self,
        path: &Dn,
        object_classes: &[String],
        attributes: &Attributes,
    ) -> Result<(), AdapterError> {
        let mut state = self.dir.state.write();
        state.journal.push(Operation::Create { path: path.clone() });

        if let Some(err) = state.write_failures.remove(path) {
            return Err(err);
        }

        let entry = build_entry(path, object_classes, attributes);
        if let Some(winner) = state.races.remove(path) {
            state
                .entries
                .insert(path.clone(), winner.unwrap_or_else(|| entry.clone()));
        }

        if state.entries.contains_key(path) {
            return Err(AdapterError::AlreadyExists(path.to_string()));
        }

        let parent_known = match path.parent() {
            Some(parent) => state.entries.contains_key(&parent) || state.suffixes.contains(&parent),
            None => false,
        };
        if !parent_known {
            return Err(AdapterError::NoSuchParent(path.to_string()));
        }

        state.entries.insert(path.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn ou(name: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("ou".to_string(), vec![name.to_string()]);
        attributes
    }

    #[test]
    fn test_create_requires_parent() {
        let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
        let mut session = dir.open_session().unwrap();
        let classes = vec!["organizationalUnit".to_string()];

        let err = session
            .create_entry(&dn("ou=A1,ou=Archives,dc=test"), &classes, &ou("A1"))
            .unwrap_err();
        assert!(matches!(err, AdapterError::NoSuchParent(_)));

        session
            .create_entry(&dn("ou=Archives,dc=test"), &classes, &ou("Archives"))
            .unwrap();
        session
            .create_entry(&dn("ou=A1,ou=Archives,dc=test"), &classes, &ou("A1"))
            .unwrap();

        let err = session
            .create_entry(&dn("ou=A1,ou=Archives,dc=test"), &classes, &ou("A1"))
            .unwrap_err();
        assert!(matches!(err, AdapterError::AlreadyExists(_)));
    }

    #[test]
    fn test_search_scopes() {
        let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
        dir.seed(&dn("ou=Archives,dc=test"), &["organizationalUnit"], &[("ou", "Archives")]);
        dir.seed(&dn("ou=A1,ou=Archives,dc=test"), &["organizationalUnit"], &[("ou", "A1")]);
        dir.seed(&dn("ou=Roles,ou=A1,ou=Archives,dc=test"), &["organizationalUnit"], &[("ou", "Roles")]);

        let mut session = dir.open_session().unwrap();
        let base = dn("ou=Archives,dc=test");

        let one = session.search_one_level(&base, &Filter::any(), &AttributeSelection::All).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].first("ou"), Some("A1"));

        let sub = session.search_subtree(&base, &Filter::any(), &AttributeSelection::All).unwrap();
        assert_eq!(sub.len(), 3);

        let missing = session
            .search_one_level(&dn("ou=Nowhere,dc=test"), &Filter::any(), &AttributeSelection::All)
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_sessions_released_on_drop() {
        let dir = InMemoryDirectory::new();
        {
            let _a = dir.open_session().unwrap();
            let _b = dir.open_session().unwrap();
            assert_eq!(dir.active_sessions(), 2);
        }
        assert_eq!(dir.active_sessions(), 0);
        assert_eq!(dir.sessions_opened(), 2);

        dir.set_offline(true);
        assert!(matches!(dir.open_session(), Err(AdapterError::Connection(_))));
    }

    #[test]
    fn test_race_and_fault_injection() {
        let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
        let classes = vec!["organizationalUnit".to_string()];
        let path = dn("ou=Groups,dc=test");

        dir.race_create_of(&path);
        let mut session = dir.open_session().unwrap();
        let err = session.create_entry(&path, &classes, &ou("Groups")).unwrap_err();
        assert!(matches!(err, AdapterError::AlreadyExists(_)));
        assert!(dir.contains(&path));

        let other = dn("ou=Members,dc=test");
        dir.fail_writes_to(&other, AdapterError::Rejected("read-only".to_string()));
        let err = session.create_entry(&other, &classes, &ou("Members")).unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
        assert!(!dir.contains(&other));
        assert_eq!(dir.write_count(), 2);
    }

    #[test]
    fn test_read_fault_injection_covers_subtree() {
        let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
        dir.seed(&dn("ou=Archives,dc=test"), &["organizationalUnit"], &[("ou", "Archives")]);
        dir.fail_reads_at(&dn("ou=Archives,dc=test"), AdapterError::Rejected("denied".to_string()));

        let mut session = dir.open_session().unwrap();
        let err = session
            .find_by_path(&dn("ou=A1,ou=Archives,dc=test"), &Filter::any(), &AttributeSelection::All)
            .unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));

        let found = session
            .find_by_path(&dn("dc=test"), &Filter::any(), &AttributeSelection::All)
            .unwrap();
        assert!(found.is_some());
        assert_eq!(dir.journal().len(), 2);
    }
}
