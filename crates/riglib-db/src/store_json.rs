use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::entry::{is_reserved_key, FieldUpdate, RigDatabase, RigMap, RigRecord};
use crate::paths::{normalize_path, path_key};
use crate::replace::{apply_replacements, PathReplacement};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access rig database: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rig database: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reads a database document, failing on any I/O or parse error.
pub fn read_database(path: &Path) -> Result<RigDatabase, StoreError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn write_database(path: &Path, database: &RigDatabase) -> Result<(), StoreError> {
    write_json(path, database)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Clones `raw` and rewrites every primary and alternative path through the
/// replacement rules. `raw` itself is left untouched.
pub fn derive_display(raw: &RigMap, rules: &[PathReplacement]) -> RigMap {
    let mut display = raw.clone();
    if rules.is_empty() {
        return display;
    }
    for record in display.values_mut() {
        if !record.path.is_empty() {
            record.path = apply_replacements(&record.path, rules);
        }
        for alternative in &mut record.alternatives {
            *alternative = apply_replacements(alternative, rules);
        }
    }
    display
}

/// Recomputes `exists` for every record from the filesystem.
pub fn probe_exists(display: &mut RigMap) {
    for record in display.values_mut() {
        record.exists = path_exists(&record.path);
    }
}

fn path_exists(path: &str) -> bool {
    !path.trim().is_empty() && Path::new(path).exists()
}

/// Maps the key of every primary and alternative path to its rig name.
pub fn build_path_lookup(display: &RigMap) -> HashMap<String, String> {
    let mut lookup = HashMap::new();
    for (name, record) in display {
        if is_reserved_key(name) {
            continue;
        }
        for path in record.all_paths() {
            lookup.entry(path_key(path)).or_insert_with(|| name.clone());
        }
    }
    lookup
}

#[derive(Debug, Default)]
struct StoreState {
    raw: RigDatabase,
    display: Arc<RigMap>,
    replacements: Vec<PathReplacement>,
}

impl StoreState {
    fn rebuild_display(&mut self) {
        let mut display = derive_display(&self.raw.records, &self.replacements);
        probe_exists(&mut display);
        self.display = Arc::new(display);
    }

    fn display_record(&self, record: &RigRecord) -> RigRecord {
        let mut display = record.clone();
        display.path = apply_replacements(&record.path, &self.replacements);
        display.alternatives = record
            .alternatives
            .iter()
            .map(|path| apply_replacements(path, &self.replacements))
            .collect();
        display.exists = path_exists(&display.path);
        display
    }
}

/// JSON-backed rig database holding the persisted ("raw") records and the
/// path-replaced ("display") view derived from them.
#[derive(Debug)]
pub struct RigStore {
    path: PathBuf,
    data: Mutex<StoreState>,
}

impl RigStore {
    /// Opens the store at `path`, falling back to an empty store when the file
    /// is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>, replacements: Vec<PathReplacement>) -> Self {
        let store = Self {
            path: path.into(),
            data: Mutex::new(StoreState {
                replacements,
                ..StoreState::default()
            }),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads from disk. Read and parse failures are logged and leave an
    /// empty store behind.
    pub fn load(&self) {
        let raw = if self.path.exists() {
            match read_database(&self.path) {
                Ok(database) => database,
                Err(err) => {
                    log::error!("failed to load {}: {err}", self.path.display());
                    RigDatabase::default()
                }
            }
        } else {
            RigDatabase::default()
        };
        let mut data = self.data.lock();
        data.raw = raw;
        data.rebuild_display();
        log::debug!("loaded {} rigs from {}", data.raw.records.len(), self.path.display());
    }

    /// Writes the raw records back to disk. Replaced paths are never persisted.
    pub fn save(&self) -> Result<(), StoreError> {
        let data = self.data.lock();
        write_database(&self.path, &data.raw).map_err(|err| {
            log::error!("failed to save {}: {err}", self.path.display());
            err
        })
    }

    pub fn replacements(&self) -> Vec<PathReplacement> {
        self.data.lock().replacements.clone()
    }

    pub fn set_replacements(&self, replacements: Vec<PathReplacement>) {
        let mut data = self.data.lock();
        data.replacements = replacements;
        data.rebuild_display();
    }

    /// Snapshot of the display view, cheap to hand to worker threads.
    pub fn display(&self) -> Arc<RigMap> {
        Arc::clone(&self.data.lock().display)
    }

    pub fn raw_records(&self) -> RigMap {
        self.data.lock().raw.records.clone()
    }

    pub fn raw_record(&self, name: &str) -> Option<RigRecord> {
        self.data.lock().raw.records.get(name).cloned()
    }

    pub fn display_record(&self, name: &str) -> Option<RigRecord> {
        self.data.lock().display.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data.lock().raw.records.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.data.lock().raw.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.data.lock().raw.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces a record. The caller decides when to [`save`](Self::save).
    pub fn insert(&self, name: impl Into<String>, record: RigRecord) {
        let name = name.into();
        let mut data = self.data.lock();
        let display = data.display_record(&record);
        data.raw.records.insert(name.clone(), record);
        Arc::make_mut(&mut data.display).insert(name, display);
    }

    /// Replaces the record stored under `old_name` with `record` under
    /// `new_name`. Returns `false` when `old_name` is unknown.
    pub fn rename(&self, old_name: &str, new_name: impl Into<String>, record: RigRecord) -> bool {
        let new_name = new_name.into();
        let mut data = self.data.lock();
        if data.raw.records.remove(old_name).is_none() {
            return false;
        }
        let display = data.display_record(&record);
        data.raw.records.insert(new_name.clone(), record);
        let view = Arc::make_mut(&mut data.display);
        view.remove(old_name);
        view.insert(new_name, display);
        true
    }

    pub fn remove(&self, name: &str) -> Option<RigRecord> {
        let mut data = self.data.lock();
        let removed = data.raw.records.remove(name);
        if removed.is_some() {
            Arc::make_mut(&mut data.display).remove(name);
        }
        removed
    }

    /// Applies a single-field update to the raw record and refreshes the
    /// matching display record. Returns `false` for an unknown rig.
    pub fn update_field(&self, name: &str, update: FieldUpdate) -> bool {
        let mut data = self.data.lock();
        let Some(record) = data.raw.records.get_mut(name) else {
            return false;
        };
        update.apply(record);
        let record = record.clone();
        let display = data.display_record(&record);
        Arc::make_mut(&mut data.display).insert(name.to_owned(), display);
        true
    }

    /// Path key to rig name for every display path, primary and alternative.
    pub fn path_lookup(&self) -> HashMap<String, String> {
        build_path_lookup(&self.data.lock().display)
    }

    pub fn find_by_path(&self, path: &str) -> Option<String> {
        let key = path_key(path);
        let data = self.data.lock();
        data.display
            .iter()
            .filter(|(name, _)| !is_reserved_key(name))
            .find(|(_, record)| record.all_paths().any(|candidate| path_key(candidate) == key))
            .map(|(name, _)| name.clone())
    }
}

/// Paths excluded from discovery and from the grid.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl Blacklist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Opens the blacklist at `path`, logging and starting empty on failure.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut blacklist = Self::new(path);
        blacklist.load();
        blacklist
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&mut self) {
        self.entries.clear();
        if !self.path.exists() {
            return;
        }
        let paths = fs::read_to_string(&self.path)
            .map_err(StoreError::from)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).map_err(StoreError::from));
        match paths {
            Ok(paths) => {
                for path in paths {
                    self.insert(&path);
                }
            }
            Err(err) => log::error!("failed to load blacklist {}: {err}", self.path.display()),
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let paths: Vec<&String> = self.entries.values().collect();
        write_json(&self.path, &paths).map_err(|err| {
            log::error!("failed to save blacklist {}: {err}", self.path.display());
            err
        })
    }

    /// Adds a path; returns `false` if it was already listed.
    pub fn insert(&mut self, path: &str) -> bool {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return false;
        }
        self.entries.insert(path_key(&normalized), normalized).is_none()
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.entries.remove(&path_key(path)).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&path_key(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// The set of path keys, for worker snapshots.
    pub fn keys(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn sample() -> RigRecord {
        RigRecord::new("D:/Rigs/Apollo.ma")
            .with_tags(["human", "male"])
            .with_collection("Apollo&Artemis")
            .with_alternatives(["D:/Rigs/Apollo_game.ma"])
    }

    #[test]
    fn display_derivation_leaves_raw_untouched() {
        let mut raw = RigMap::new();
        raw.insert("Apollo".into(), sample());
        let before = raw.clone();
        let display = derive_display(&raw, &[PathReplacement::new("D:/", "/mnt/d/")]);
        assert_eq!(raw, before);
        assert_eq!(display["Apollo"].path, "/mnt/d/Rigs/Apollo.ma");
        assert_eq!(display["Apollo"].alternatives, vec!["/mnt/d/Rigs/Apollo_game.ma"]);
    }

    #[test]
    fn save_persists_raw_paths_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rigs_database.json");
        let store = RigStore::open(&path, vec![PathReplacement::new("D:/", "/mnt/d/")]);
        store.insert("Apollo", sample());
        assert_eq!(store.display()["Apollo"].path, "/mnt/d/Rigs/Apollo.ma");
        store.save().unwrap();

        let database = read_database(&path).unwrap();
        assert_eq!(database.records["Apollo"].path, "D:/Rigs/Apollo.ma");
    }

    #[test]
    fn save_then_reload_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rigs_database.json");
        let rig = dir.path().join("Artemis.ma");
        fs::write(&rig, "").unwrap();

        let store = RigStore::open(&path, Vec::new());
        let mut artemis = RigRecord::new(rig.to_string_lossy()).with_author("Ramon");
        artemis.notes = Some("facial rig".into());
        artemis.favorite = true;
        store.insert("Artemis", artemis.clone());
        store.insert("Apollo", sample());
        store.save().unwrap();

        let reloaded = RigStore::open(&path, Vec::new());
        assert_eq!(reloaded.raw_records(), store.raw_records());
        assert!(reloaded.display()["Artemis"].exists);
        assert!(!reloaded.display()["Apollo"].exists);
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rigs_database.json");
        fs::write(&path, "{ not json").unwrap();
        let store = RigStore::open(&path, Vec::new());
        assert!(store.is_empty());
        assert!(read_database(&path).is_err());
    }

    #[test]
    fn rename_and_update_keep_views_in_step() {
        let dir = tempdir().unwrap();
        let store = RigStore::open(
            dir.path().join("db.json"),
            vec![PathReplacement::new("D:/", "/mnt/d/")],
        );
        store.insert("Apollo", sample());
        assert!(store.rename("Apollo", "Apollo v2", sample()));
        assert!(!store.contains("Apollo"));
        assert!(store.display().contains_key("Apollo v2"));

        assert!(store.update_field("Apollo v2", FieldUpdate::Path("D:/New/Apollo.ma".into())));
        assert_eq!(store.raw_record("Apollo v2").unwrap().path, "D:/New/Apollo.ma");
        assert_eq!(store.display_record("Apollo v2").unwrap().path, "/mnt/d/New/Apollo.ma");
        assert!(!store.update_field("Missing", FieldUpdate::Favorite(true)));

        assert!(store.remove("Apollo v2").is_some());
        assert!(store.display().is_empty());
    }

    #[test]
    fn lookup_covers_alternatives() {
        let dir = tempdir().unwrap();
        let store = RigStore::open(dir.path().join("db.json"), Vec::new());
        store.insert("Apollo", sample());
        let lookup = store.path_lookup();
        assert_eq!(lookup.get("D:/Rigs/Apollo_game.ma").map(String::as_str), Some("Apollo"));
        assert_eq!(store.find_by_path(r"D:\Rigs\Apollo.ma").as_deref(), Some("Apollo"));
        assert_eq!(store.find_by_path("D:/Rigs/Zeus.ma"), None);
    }

    #[test]
    fn blacklist_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        let mut blacklist = Blacklist::new(&path);
        assert!(blacklist.insert("/rigs//old/../Broken.ma"));
        assert!(!blacklist.insert("/rigs/Broken.ma"));
        blacklist.save().unwrap();

        let reloaded = Blacklist::open(&path);
        assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["/rigs/Broken.ma"]);
        assert!(reloaded.contains("/rigs/./Broken.ma"));
    }
}
