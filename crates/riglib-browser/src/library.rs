use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use riglib_db::paths::normalize_path;
use riglib_db::{
    is_reserved_key, AiSettings, Blacklist, CatalogMetadata, FieldUpdate, FilterCategory,
    FilterSelection, LibraryPaths, PathReplacement, RigMap, RigRecord, RigStore, Settings,
    SettingsError, SortKey, StoreError, ViewState, WindowGeometry,
};
use riglib_scanner::suggest::{suggest, Categorizer, Provider, SuggestError};
use riglib_scanner::{
    spawn_scan, BlockedPatterns, PatternError, ScanConfig, ScanError, ScanHandle, ScanLookup,
    ScanSession,
};
use thiserror::Error;

use crate::filter::SearchFilter;
use crate::grid::{CardFactory, Grid, RigCard};
use crate::host::{referenced_set, HostError, SceneHost};
use crate::worker::{SearchDispatcher, SearchResult};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Suggest(#[from] SuggestError),
    #[error("{0}")]
    UnknownProvider(String),
    #[error("failed to start search worker: {0}")]
    Worker(#[source] io::Error),
    #[error("failed to copy image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("rig name must not be empty")]
    InvalidName,
    #[error("a rig named '{0}' already exists")]
    DuplicateName(String),
    #[error("unknown rig '{0}'")]
    UnknownRig(String),
    #[error("rig file not found: {0}")]
    MissingFile(String),
}

/// Contents of the add/edit form before it becomes a [`RigRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RigDraft {
    pub name: String,
    pub path: String,
    /// Comma-separated, as typed.
    pub tags: String,
    pub collection: String,
    pub author: String,
    pub link: String,
    pub notes: String,
    pub alternatives: Vec<String>,
}

impl RigDraft {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// A draft named after the file stem of `path`.
    pub fn from_path(path: &str) -> Self {
        let path = normalize_path(path);
        let name = Path::new(&path.replace('\\', "/"))
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, path)
    }

    /// Pre-fills the form from a stored record.
    pub fn from_record(name: &str, record: &RigRecord) -> Self {
        Self {
            name: name.to_owned(),
            path: record.path.clone(),
            tags: record.tags().collect::<Vec<_>>().join(", "),
            collection: record.collection().unwrap_or_default().to_owned(),
            author: record.author().unwrap_or_default().to_owned(),
            link: record.link().unwrap_or_default().to_owned(),
            notes: record.notes.clone().unwrap_or_default(),
            alternatives: record.alternatives.clone(),
        }
    }

    pub fn parse_tags(text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Builds the record, keeping image, favorite flag and unknown keys of
    /// `previous` when editing.
    fn into_record(self, previous: Option<&RigRecord>) -> RigRecord {
        let mut record = previous.cloned().unwrap_or_default();
        record.path = normalize_path(&self.path);
        record.tags = Self::parse_tags(&self.tags);
        record.collection = non_blank(&self.collection);
        record.author = non_blank(&self.author);
        record.link = non_blank(&self.link);
        record.notes = non_blank(&self.notes);
        record.alternatives = self
            .alternatives
            .iter()
            .map(|path| path.trim())
            .filter(|path| !path.is_empty())
            .map(normalize_path)
            .collect();
        record
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Lowercase, spaces to underscores, anything outside `[a-z0-9_]` dropped.
pub fn sanitize_image_name(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Outcome of [`Library::merge_suggestions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

/// The library panel without its widgets: store, blacklist, settings, grid
/// and search kept consistent with each other.
pub struct Library<H> {
    paths: LibraryPaths,
    settings: Settings,
    store: RigStore,
    blacklist: Blacklist,
    metadata: CatalogMetadata,
    host: H,
    grid: Grid<RigCard>,
    cards: CardFactory,
    search: SearchDispatcher,
}

impl<H: SceneHost> Library<H> {
    /// Loads settings, store and blacklist from `paths` and runs the saved
    /// search synchronously.
    pub fn open(paths: LibraryPaths, host: H) -> Result<Self, LibraryError> {
        paths.ensure_dirs()?;
        let settings = Settings::load(&paths.settings);
        let store = RigStore::open(&paths.database, settings.path_replacements.clone());
        let blacklist = Blacklist::open(&paths.blacklist);
        let mut library = Self {
            cards: CardFactory::new(&paths.images),
            paths,
            settings,
            store,
            blacklist,
            metadata: CatalogMetadata::default(),
            host,
            grid: Grid::new(),
            search: SearchDispatcher::new(),
        };
        library.refresh_view();
        log::info!(
            "opened rigs library at {} with {} rigs",
            library.paths.root.display(),
            library.store.len()
        );
        Ok(library)
    }

    pub fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn view(&self) -> &ViewState {
        &self.settings.view
    }

    pub fn store(&self) -> &RigStore {
        &self.store
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn metadata(&self) -> &CatalogMetadata {
        &self.metadata
    }

    pub fn grid(&self) -> &Grid<RigCard> {
        &self.grid
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Visible rigs in render order.
    pub fn visible_names(&self) -> Vec<String> {
        self.grid
            .visible_names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Full refresh from disk.
    pub fn load_data(&mut self) {
        self.store.load();
        self.blacklist.load();
        self.refresh_view();
    }

    fn refresh_view(&mut self) {
        self.metadata = CatalogMetadata::collect(&self.store.display());
        self.refresh_grid();
        self.run_search_sync();
    }

    fn refresh_grid(&mut self) {
        self.cards.set_referenced(referenced_set(&self.host));
        let report = self.grid.reconcile(
            &self.store.display(),
            &self.blacklist,
            self.settings.view.sort_key,
            self.settings.view.sort_ascending,
            &mut self.cards,
        );
        log::debug!(
            "grid reconciled: {} created, {} updated, {} removed",
            report.created.len(),
            report.updated.len(),
            report.removed.len()
        );
    }

    fn current_filter(&self) -> SearchFilter {
        SearchFilter::new(
            &self.settings.view.search_text,
            self.settings.view.filters.clone(),
            referenced_set(&self.host),
        )
    }

    fn run_search_sync(&mut self) {
        let filter = self.current_filter();
        let result = self.search.run_sync(&self.store.display(), &filter);
        self.apply_search(result);
    }

    fn apply_search(&mut self, result: SearchResult) {
        let changed = self.grid.apply_visibility(&result.names);
        log::trace!(
            "search {} shows {} rigs ({changed} changed)",
            result.generation,
            result.names.len()
        );
    }

    /// Re-runs the current search, inline when `sync` is set, otherwise on
    /// the search worker.
    pub fn trigger_search(&mut self, sync: bool) -> Result<(), LibraryError> {
        if sync {
            self.run_search_sync();
            return Ok(());
        }
        let filter = self.current_filter();
        self.search
            .spawn(self.store.display(), filter)
            .map_err(LibraryError::Worker)?;
        Ok(())
    }

    /// Applies a finished background search; returns `true` if one arrived.
    pub fn poll_search(&mut self) -> bool {
        match self.search.poll() {
            Some(result) => {
                self.apply_search(result);
                true
            }
            None => false,
        }
    }

    /// Blocks on the background search and applies its result.
    pub fn wait_search(&mut self) -> bool {
        match self.search.wait() {
            Some(result) => {
                self.apply_search(result);
                true
            }
            None => false,
        }
    }

    fn save_settings(&self) -> Result<(), LibraryError> {
        self.settings.save(&self.paths.settings).map_err(|err| {
            log::error!("failed to save settings {}: {err}", self.paths.settings.display());
            LibraryError::from(err)
        })
    }

    pub fn set_search_text(&mut self, text: &str) -> Result<(), LibraryError> {
        self.settings.view.search_text = text.to_owned();
        self.save_settings()?;
        self.trigger_search(false)
    }

    pub fn set_filters(&mut self, filters: FilterSelection) -> Result<(), LibraryError> {
        self.settings.view.filters = filters;
        self.save_settings()?;
        self.trigger_search(false)
    }

    /// Replaces every checked filter with a single item, as clicking a tag or
    /// author in the info panel does.
    pub fn apply_single_filter(
        &mut self,
        category: FilterCategory,
        value: &str,
    ) -> Result<(), LibraryError> {
        self.set_filters(FilterSelection::single(category, value))
    }

    pub fn set_sort(&mut self, key: SortKey, ascending: bool) -> Result<(), LibraryError> {
        self.settings.view.sort_key = key;
        self.settings.view.sort_ascending = ascending;
        self.save_settings()?;
        self.refresh_grid();
        self.trigger_search(false)
    }

    /// Name of the rig already owning `path` as primary or alternative.
    pub fn check_new_path(&self, path: &str) -> Option<String> {
        self.store.find_by_path(&normalize_path(path))
    }

    fn validate_name(&self, name: &str, own: Option<&str>) -> Result<String, LibraryError> {
        let name = name.trim();
        if name.is_empty() || is_reserved_key(name) {
            return Err(LibraryError::InvalidName);
        }
        if Some(name) != own && self.store.contains(name) {
            return Err(LibraryError::DuplicateName(name.to_owned()));
        }
        Ok(name.to_owned())
    }

    fn persist_and_reload(&mut self) -> Result<(), LibraryError> {
        self.store.save()?;
        self.load_data();
        Ok(())
    }

    /// Validates and stores a new rig; returns its final name.
    pub fn add_rig(&mut self, draft: RigDraft) -> Result<String, LibraryError> {
        let name = self.validate_name(&draft.name, None)?;
        let record = draft.into_record(None);
        self.store.insert(name.clone(), record);
        self.persist_and_reload()?;
        log::info!("added rig {name}");
        Ok(name)
    }

    /// Rewrites `old_name` from `draft`, renaming it when the draft's name
    /// differs.
    pub fn edit_rig(&mut self, old_name: &str, draft: RigDraft) -> Result<String, LibraryError> {
        let previous = self
            .store
            .raw_record(old_name)
            .ok_or_else(|| LibraryError::UnknownRig(old_name.to_owned()))?;
        let name = self.validate_name(&draft.name, Some(old_name))?;
        let record = draft.into_record(Some(&previous));
        if name == old_name {
            self.store.insert(name.clone(), record);
        } else {
            self.store.rename(old_name, name.clone(), record);
        }
        self.persist_and_reload()?;
        Ok(name)
    }

    pub fn remove_rig(&mut self, name: &str) -> Result<RigRecord, LibraryError> {
        let removed = self
            .store
            .remove(name)
            .ok_or_else(|| LibraryError::UnknownRig(name.to_owned()))?;
        self.persist_and_reload()?;
        log::info!("removed rig {name}");
        Ok(removed)
    }

    /// Single-field edit from a card (image change, path repair). Only the
    /// affected card is refreshed; the store is not reloaded.
    pub fn update_field(&mut self, name: &str, update: FieldUpdate) -> Result<(), LibraryError> {
        let field = update.field_name();
        if !self.store.update_field(name, update) {
            return Err(LibraryError::UnknownRig(name.to_owned()));
        }
        self.store.save()?;
        log::debug!("updated {field} of {name}");
        self.metadata = CatalogMetadata::collect(&self.store.display());
        self.refresh_grid();
        Ok(())
    }

    /// Copies `source` into the images directory as `<sanitized name>.<ext>`
    /// and points the rig at it. Returns the stored file name.
    pub fn set_image(&mut self, name: &str, source: &Path) -> Result<String, LibraryError> {
        if !self.store.contains(name) {
            return Err(LibraryError::UnknownRig(name.to_owned()));
        }
        let mut file_name = sanitize_image_name(name);
        if let Some(ext) = source.extension() {
            file_name.push('.');
            file_name.push_str(&ext.to_string_lossy().to_lowercase());
        }
        let destination = self.paths.images.join(&file_name);
        fs::copy(source, &destination).map_err(|source_err| LibraryError::Image {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        self.update_field(name, FieldUpdate::Image(Some(file_name.clone())))?;
        Ok(file_name)
    }

    fn display_record(&self, name: &str) -> Result<RigRecord, LibraryError> {
        self.store
            .display_record(name)
            .ok_or_else(|| LibraryError::UnknownRig(name.to_owned()))
    }

    /// References the rig into the scene under a namespace derived from its
    /// name.
    pub fn add_reference(&mut self, name: &str) -> Result<(), LibraryError> {
        let record = self.display_record(name)?;
        if !record.exists {
            return Err(LibraryError::MissingFile(record.path));
        }
        let namespace = name.replace(' ', "_");
        self.host.add_reference(&record.path, &namespace)?;
        log::info!("referenced rig {name}");
        self.refresh_grid();
        Ok(())
    }

    pub fn remove_reference(&mut self, name: &str) -> Result<(), LibraryError> {
        let record = self.display_record(name)?;
        let removed = self.host.remove_reference(&record.path);
        self.refresh_grid();
        removed?;
        log::info!("removed reference {name}");
        Ok(())
    }

    /// Adds paths to the blacklist; returns how many were new.
    pub fn blacklist_paths<I, S>(&mut self, paths: I) -> Result<usize, LibraryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = paths
            .into_iter()
            .filter(|path| self.blacklist.insert(path.as_ref()))
            .count();
        self.blacklist.save()?;
        self.refresh_grid();
        self.run_search_sync();
        Ok(added)
    }

    pub fn unblacklist_paths<I, S>(&mut self, paths: I) -> Result<usize, LibraryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed = paths
            .into_iter()
            .filter(|path| self.blacklist.remove(path.as_ref()))
            .count();
        self.blacklist.save()?;
        self.refresh_grid();
        self.run_search_sync();
        Ok(removed)
    }

    /// Stores new replacement rules and rebuilds the display view from them.
    pub fn set_path_replacements(
        &mut self,
        rules: Vec<PathReplacement>,
    ) -> Result<(), LibraryError> {
        self.settings.path_replacements = rules.clone();
        self.save_settings()?;
        self.store.set_replacements(rules);
        self.refresh_view();
        Ok(())
    }

    pub fn set_blocked_patterns(&mut self, patterns: Vec<String>) -> Result<(), LibraryError> {
        BlockedPatterns::new(&patterns)?;
        self.settings.blocked_patterns = patterns;
        self.save_settings()
    }

    pub fn blocked_patterns(&self) -> Result<BlockedPatterns, LibraryError> {
        Ok(BlockedPatterns::new(&self.settings.blocked_patterns)?)
    }

    /// Classification tables for the current store and blacklist.
    pub fn scan_lookup(&self) -> ScanLookup {
        ScanLookup::from_records(&self.store.display(), &self.blacklist)
    }

    pub fn start_scan(&self, dir: impl Into<PathBuf>) -> Result<ScanHandle, LibraryError> {
        let config = ScanConfig::new(dir).with_blocked(self.blocked_patterns()?);
        Ok(spawn_scan(config, self.scan_lookup())?)
    }

    pub fn window(&self) -> &WindowGeometry {
        &self.settings.window
    }

    pub fn set_window(&mut self, window: WindowGeometry) -> Result<(), LibraryError> {
        self.settings.window = window;
        self.save_settings()
    }

    pub fn ai_settings(&self) -> &AiSettings {
        &self.settings.ai
    }

    /// Stores the suggestion provider, model and key. Unknown provider names
    /// are rejected before anything is saved.
    pub fn set_ai_settings(&mut self, mut ai: AiSettings) -> Result<(), LibraryError> {
        let provider = parse_provider(&ai.provider)?;
        ai.provider = provider.to_string();
        ai.model = ai.model.filter(|model| !model.trim().is_empty());
        ai.api_key = ai.api_key.filter(|key| !key.trim().is_empty());
        self.settings.ai = ai;
        self.save_settings()
    }

    /// Asks the configured provider to group the session's new files, merges
    /// the answer into the store and re-classifies the session.
    pub fn suggest_new_rigs(
        &mut self,
        categorizer: &dyn Categorizer,
        session: &mut ScanSession,
    ) -> Result<MergeReport, LibraryError> {
        let provider = parse_provider(&self.settings.ai.provider)?;
        let suggestions = suggest(
            categorizer,
            provider,
            self.settings.ai.model.as_deref(),
            self.settings.ai.api_key.as_deref().unwrap_or_default(),
            &session.new_paths(),
        )?;
        let report = self.merge_suggestions(suggestions)?;
        let changed = session.recategorize(&self.scan_lookup());
        log::debug!("{} discoveries changed category after merge", changed.len());
        Ok(report)
    }

    /// Adds suggested records whose name and paths are unknown to the store
    /// and the blacklist. Everything else is reported as skipped.
    pub fn merge_suggestions(&mut self, suggestions: RigMap) -> Result<MergeReport, LibraryError> {
        let mut report = MergeReport::default();
        for (name, mut record) in suggestions {
            let name = name.trim().to_owned();
            let known = self.validate_name(&name, None).is_err()
                || record.path.trim().is_empty()
                || record.all_paths().any(|path| {
                    self.check_new_path(path).is_some() || self.blacklist.contains(path)
                });
            if known {
                report.skipped.push(name);
                continue;
            }
            record.path = normalize_path(&record.path);
            record.exists = false;
            self.store.insert(name.clone(), record);
            report.added.push(name);
        }
        if !report.added.is_empty() {
            self.persist_and_reload()?;
        }
        log::info!(
            "merged {} suggestions, skipped {}",
            report.added.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

fn parse_provider(name: &str) -> Result<Provider, LibraryError> {
    name.parse().map_err(LibraryError::UnknownProvider)
}
