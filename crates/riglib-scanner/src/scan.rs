use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use riglib_db::paths::{normalize_path, path_key};
use riglib_db::{build_path_lookup, Blacklist, CancelToken, RigMap};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::patterns::BlockedPatterns;

pub const RIG_EXTENSIONS: &[&str] = &["ma", "mb"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to start scan worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Where a discovered file stands relative to the library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Category {
    New,
    Exists { name: String },
    Blacklisted,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::New => "new",
            Category::Exists { .. } => "exists",
            Category::Blacklisted => "blacklisted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub path: String,
    #[serde(flatten)]
    pub category: Category,
}

/// Snapshot of the tables a discovery is classified against: the store's
/// display paths (primary and alternatives) and the blacklist.
#[derive(Debug, Clone, Default)]
pub struct ScanLookup {
    existing: HashMap<String, String>,
    blacklist: HashSet<String>,
}

impl ScanLookup {
    pub fn new(existing: HashMap<String, String>, blacklist: HashSet<String>) -> Self {
        Self {
            existing,
            blacklist,
        }
    }

    pub fn from_records(display: &RigMap, blacklist: &Blacklist) -> Self {
        Self::new(build_path_lookup(display), blacklist.keys())
    }

    /// Blacklisted wins over an existing record, every other path is new.
    pub fn categorize(&self, path: &str) -> Category {
        let key = path_key(path);
        if self.blacklist.contains(&key) {
            Category::Blacklisted
        } else if let Some(name) = self.existing.get(&key) {
            Category::Exists { name: name.clone() }
        } else {
            Category::New
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub blocked: BlockedPatterns,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
}

impl ScanConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            blocked: BlockedPatterns::default(),
            follow_links: false,
            max_depth: None,
        }
    }

    pub fn with_blocked(mut self, blocked: BlockedPatterns) -> Self {
        self.blocked = blocked;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub new: usize,
    pub existing: usize,
    pub blacklisted: usize,
    pub pruned_dirs: usize,
    pub errors: usize,
    pub cancelled: bool,
}

impl ScanSummary {
    fn record(&mut self, category: &Category) {
        match category {
            Category::New => self.new += 1,
            Category::Exists { .. } => self.existing += 1,
            Category::Blacklisted => self.blacklisted += 1,
        }
    }

    pub fn discovered(&self) -> usize {
        self.new + self.existing + self.blacklisted
    }
}

pub fn is_rig_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            RIG_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

/// Walks `config.root`, calling `on_found` once per rig file. The token is
/// checked before every directory entry.
pub fn scan_directory(
    config: &ScanConfig,
    lookup: &ScanLookup,
    cancel: &CancelToken,
    mut on_found: impl FnMut(Discovery),
) -> ScanSummary {
    let mut summary = ScanSummary::default();
    if !config.root.is_dir() {
        log::warn!("scan root {} is not a directory", config.root.display());
        return summary;
    }

    let pruned = Cell::new(0usize);
    let mut walker = WalkDir::new(&config.root).follow_links(config.follow_links);
    if let Some(depth) = config.max_depth {
        walker = walker.max_depth(depth);
    }
    let entries = walker.into_iter().filter_entry(|entry| {
        let blocked = entry.depth() > 0
            && entry.file_type().is_dir()
            && config
                .blocked
                .is_blocked(&entry.file_name().to_string_lossy());
        if blocked {
            pruned.set(pruned.get() + 1);
        }
        !blocked
    });

    for entry in entries {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::debug!("skipping entry while scanning {}: {err}", config.root.display());
                summary.errors += 1;
                continue;
            }
        };
        // Linked files count, linked directories are never entered.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file || !is_rig_file(entry.path()) {
            continue;
        }
        let path = normalize_path(&entry.path().to_string_lossy());
        let category = lookup.categorize(&path);
        summary.record(&category);
        on_found(Discovery { path, category });
    }

    summary.pruned_dirs = pruned.get();
    log::debug!(
        "scan of {} found {} rigs ({} new)",
        config.root.display(),
        summary.discovered(),
        summary.new
    );
    summary
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Found(Discovery),
    Finished(ScanSummary),
}

/// A scan running on its own thread. Dropping the handle cancels the walk and
/// joins the worker.
#[derive(Debug)]
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the worker reports completion, returning every discovery.
    pub fn wait(self) -> (Vec<Discovery>, ScanSummary) {
        let mut discoveries = Vec::new();
        for event in self.events.iter() {
            match event {
                ScanEvent::Found(discovery) => discoveries.push(discovery),
                ScanEvent::Finished(summary) => return (discoveries, summary),
            }
        }
        let summary = ScanSummary {
            cancelled: true,
            ..ScanSummary::default()
        };
        (discoveries, summary)
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("scan worker panicked");
            }
        }
    }
}

/// Starts a scan on a worker thread. Discoveries arrive one event per file,
/// followed by a single [`ScanEvent::Finished`].
pub fn spawn_scan(config: ScanConfig, lookup: ScanLookup) -> Result<ScanHandle, ScanError> {
    let (sender, events) = crossbeam_channel::unbounded();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let worker = thread::Builder::new()
        .name("riglib-scan".into())
        .spawn(move || run_worker(&config, &lookup, &worker_cancel, &sender))?;
    Ok(ScanHandle {
        events,
        cancel,
        worker: Some(worker),
    })
}

fn run_worker(
    config: &ScanConfig,
    lookup: &ScanLookup,
    cancel: &CancelToken,
    sender: &Sender<ScanEvent>,
) {
    let summary = scan_directory(config, lookup, cancel, |discovery| {
        // A closed channel means nobody is listening any more.
        if sender.send(ScanEvent::Found(discovery)).is_err() {
            cancel.cancel();
        }
    });
    let _ = sender.send(ScanEvent::Finished(summary));
}

/// Discoveries accumulated from one or more scans, re-classifiable in place
/// when the lookup tables change.
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    discoveries: Vec<Discovery>,
    index: HashMap<String, usize>,
    summary: Option<ScanSummary>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a discovery; a path seen before is updated instead of duplicated.
    pub fn push(&mut self, discovery: Discovery) {
        let key = path_key(&discovery.path);
        match self.index.get(&key) {
            Some(&position) => self.discoveries[position] = discovery,
            None => {
                self.index.insert(key, self.discoveries.len());
                self.discoveries.push(discovery);
            }
        }
    }

    /// Feeds one worker event; returns the summary once the scan finished.
    pub fn apply(&mut self, event: ScanEvent) -> Option<&ScanSummary> {
        match event {
            ScanEvent::Found(discovery) => {
                self.push(discovery);
                None
            }
            ScanEvent::Finished(summary) => {
                self.summary = Some(summary);
                self.summary.as_ref()
            }
        }
    }

    /// Drains every pending event from `handle` without blocking.
    pub fn poll(&mut self, handle: &ScanHandle) -> bool {
        let mut finished = false;
        for event in handle.events().try_iter() {
            finished |= self.apply(event).is_some();
        }
        finished
    }

    pub fn discoveries(&self) -> &[Discovery] {
        &self.discoveries
    }

    pub fn summary(&self) -> Option<&ScanSummary> {
        self.summary.as_ref()
    }

    pub fn with_category<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Discovery> {
        self.discoveries
            .iter()
            .filter(move |discovery| discovery.category.label() == label)
    }

    pub fn new_paths(&self) -> Vec<String> {
        self.discoveries
            .iter()
            .filter(|discovery| discovery.category == Category::New)
            .map(|discovery| discovery.path.clone())
            .collect()
    }

    /// Re-classifies every discovery against `lookup` without touching the
    /// disk. Returns the discoveries whose category changed, in their new state.
    pub fn recategorize(&mut self, lookup: &ScanLookup) -> Vec<Discovery> {
        let mut changed = Vec::new();
        for discovery in &mut self.discoveries {
            let category = lookup.categorize(&discovery.path);
            if category != discovery.category {
                discovery.category = category;
                changed.push(discovery.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir_all, File};

    use pretty_assertions::assert_eq;
    use riglib_db::RigRecord;
    use tempfile::tempdir;

    use super::*;

    fn touch(path: &Path) {
        create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn key(path: &Path) -> String {
        normalize_path(&path.to_string_lossy())
    }

    #[test]
    fn classification_is_exhaustive_and_disjoint() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let apollo = root.join("chars/Apollo.ma");
        let artemis = root.join("chars/Artemis.MB");
        let broken = root.join("old/Broken.ma");
        let alt = root.join("chars/Apollo_game.ma");
        for path in [&apollo, &artemis, &broken, &alt] {
            touch(path);
        }
        touch(&root.join("chars/notes.txt"));
        touch(&root.join(".hidden/Secret.ma"));
        touch(&root.join("cycles.anim/Walk.ma"));
        touch(&root.join("__pycache__/Cache.ma"));

        let mut records = RigMap::new();
        records.insert(
            "Apollo".into(),
            RigRecord::new(key(&apollo)).with_alternatives([key(&alt)]),
        );
        let mut blacklist = Blacklist::new(root.join("blacklist.json"));
        blacklist.insert(&key(&broken));
        let lookup = ScanLookup::from_records(&records, &blacklist);

        let mut found = Vec::new();
        let summary = scan_directory(
            &ScanConfig::new(root),
            &lookup,
            &CancelToken::new(),
            |discovery| found.push(discovery),
        );
        found.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(summary.discovered(), 4);
        assert_eq!(summary.pruned_dirs, 3);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.existing, 2);
        assert_eq!(summary.blacklisted, 1);
        let category = |path: &Path| {
            found
                .iter()
                .find(|discovery| discovery.path == key(path))
                .map(|discovery| discovery.category.clone())
        };
        assert_eq!(category(&artemis), Some(Category::New));
        assert_eq!(
            category(&alt),
            Some(Category::Exists {
                name: "Apollo".into()
            })
        );
        assert_eq!(category(&broken), Some(Category::Blacklisted));
    }

    #[cfg(unix)]
    #[test]
    fn linked_rig_files_are_discovered() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let real = dir.path().join("store/Real.ma");
        touch(&real);
        touch(&dir.path().join("store/Other.mb"));
        let root = dir.path().join("scan");
        create_dir_all(&root).unwrap();
        symlink(&real, root.join("Linked.ma")).unwrap();
        symlink(dir.path().join("store"), root.join("shared")).unwrap();

        let mut found = Vec::new();
        let summary = scan_directory(
            &ScanConfig::new(&root),
            &ScanLookup::default(),
            &CancelToken::new(),
            |discovery| found.push(discovery),
        );
        assert_eq!(summary.new, 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, key(&root.join("Linked.ma")));
    }

    #[test]
    fn cancelled_scan_reports_nothing() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a/One.ma"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut found = 0;
        let summary = scan_directory(
            &ScanConfig::new(dir.path()),
            &ScanLookup::default(),
            &cancel,
            |_| found += 1,
        );
        assert!(summary.cancelled);
        assert_eq!(found, 0);
    }

    #[test]
    fn worker_streams_discoveries() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("One.ma"));
        touch(&dir.path().join("nested/Two.mb"));
        let handle = spawn_scan(ScanConfig::new(dir.path()), ScanLookup::default()).unwrap();
        let (discoveries, summary) = handle.wait();
        assert_eq!(discoveries.len(), 2);
        assert_eq!(summary.new, 2);
        assert!(!summary.cancelled);
    }

    #[test]
    fn recategorize_without_rescanning() {
        let dir = tempdir().unwrap();
        let rig = dir.path().join("Zeus.ma");
        touch(&rig);
        let handle = spawn_scan(ScanConfig::new(dir.path()), ScanLookup::default()).unwrap();
        let mut session = ScanSession::new();
        for event in handle.events().iter() {
            if session.apply(event).is_some() {
                break;
            }
        }
        assert_eq!(session.new_paths(), vec![key(&rig)]);

        std::fs::remove_file(&rig).unwrap();
        let mut existing = HashMap::new();
        existing.insert(path_key(&key(&rig)), "Zeus".to_string());
        let changed = session.recategorize(&ScanLookup::new(existing, HashSet::new()));
        assert_eq!(changed.len(), 1);
        assert_eq!(
            session.discoveries()[0].category,
            Category::Exists {
                name: "Zeus".into()
            }
        );
        assert!(session.new_paths().is_empty());
        assert_eq!(session.with_category("exists").count(), 1);
    }
}
