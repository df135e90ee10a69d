use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use riglib_db::paths::reference_key;
use riglib_db::{is_reserved_key, Blacklist, RigMap, RigRecord, SortKey, NOT_AVAILABLE};

use crate::sort::sort_entries;

/// A front-end widget showing one rig.
pub trait RigView {
    fn set_visible(&mut self, visible: bool);

    fn is_visible(&self) -> bool;
}

/// Creates views for new rigs and refreshes existing ones in place.
pub trait ViewFactory {
    type View: RigView;
    type Error: fmt::Display;

    fn create(&mut self, name: &str, record: &RigRecord) -> Result<Self::View, Self::Error>;

    fn update(&mut self, view: &mut Self::View, name: &str, record: &RigRecord);
}

/// What a [`Grid::reconcile`] pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Keyed views kept in step with the display records.
#[derive(Debug)]
pub struct Grid<V> {
    views: HashMap<String, V>,
    order: Vec<String>,
}

impl<V> Default for Grid<V> {
    fn default() -> Self {
        Self {
            views: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<V: RigView> Grid<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the views in line with `display`: views of records that are
    /// gone, reserved or blacklisted are dropped, new records get a view from
    /// `factory` and the rest are refreshed. The render order follows
    /// `sort_key`.
    pub fn reconcile<F>(
        &mut self,
        display: &RigMap,
        blacklist: &Blacklist,
        sort_key: SortKey,
        ascending: bool,
        factory: &mut F,
    ) -> ReconcileReport
    where
        F: ViewFactory<View = V>,
    {
        let mut report = ReconcileReport::default();
        let mut rendered: Vec<(String, &RigRecord)> = display
            .iter()
            .filter(|(name, record)| !is_reserved_key(name) && !blacklist.contains(&record.path))
            .map(|(name, record)| (name.clone(), record))
            .collect();

        let keep: HashSet<&str> = rendered.iter().map(|(name, _)| name.as_str()).collect();
        let stale: Vec<String> = self
            .views
            .keys()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            self.views.remove(&name);
            report.removed.push(name);
        }

        sort_entries(&mut rendered, sort_key, ascending);
        self.order.clear();
        for (name, record) in rendered {
            if let Some(view) = self.views.get_mut(&name) {
                factory.update(view, &name, record);
                report.updated.push(name.clone());
            } else {
                match factory.create(&name, record) {
                    Ok(view) => {
                        self.views.insert(name.clone(), view);
                        report.created.push(name.clone());
                    }
                    Err(err) => {
                        log::error!("failed to create view for '{name}': {err}");
                        report.failed.push(name);
                        continue;
                    }
                }
            }
            self.order.push(name);
        }
        report.removed.sort();
        report
    }

    /// Shows exactly the views named in `visible`. Returns how many views
    /// changed state.
    pub fn apply_visibility<S: AsRef<str>>(&mut self, visible: &[S]) -> usize {
        let visible: HashSet<&str> = visible.iter().map(|name| name.as_ref()).collect();
        let mut changed = 0;
        for (name, view) in &mut self.views {
            let show = visible.contains(name.as_str());
            if view.is_visible() != show {
                view.set_visible(show);
                changed += 1;
            }
        }
        changed
    }

    /// Render order of the last reconcile.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.views.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.views.get_mut(name)
    }

    /// Views in render order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order
            .iter()
            .filter_map(|name| self.views.get(name).map(|view| (name.as_str(), view)))
    }

    pub fn visible_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, view)| view.is_visible())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Action offered by a card's main button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Missing,
    Referenced,
    Available,
}

impl CardState {
    pub fn label(self) -> &'static str {
        match self {
            CardState::Missing => "MISSING",
            CardState::Referenced => "REMOVE",
            CardState::Available => "ADD",
        }
    }
}

/// Headless rig card.
#[derive(Debug, Clone, PartialEq)]
pub struct RigCard {
    pub name: String,
    pub record: RigRecord,
    pub visible: bool,
    pub state: CardState,
    pub image: Option<PathBuf>,
    pub tooltip: String,
}

impl RigView for RigCard {
    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}

fn or_not_available(value: Option<&str>) -> &str {
    value.unwrap_or(NOT_AVAILABLE)
}

pub fn format_tooltip(name: &str, record: &RigRecord) -> String {
    let tags = record.tags().collect::<Vec<_>>().join(", ");
    let path = Some(record.path.as_str()).filter(|path| !path.trim().is_empty());
    format!(
        "Name: {name}\nAuthor: {}\nLink: {}\nCollection: {}\nTags: {}\nPath: {}",
        or_not_available(record.author()),
        or_not_available(record.link()),
        or_not_available(record.collection()),
        if tags.is_empty() { NOT_AVAILABLE } else { tags.as_str() },
        or_not_available(path),
    )
}

/// Builds [`RigCard`]s against the images directory and the scene's
/// references.
#[derive(Debug, Clone, Default)]
pub struct CardFactory {
    images_dir: PathBuf,
    referenced: HashSet<String>,
}

impl CardFactory {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            referenced: HashSet::new(),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn set_referenced(&mut self, referenced: HashSet<String>) {
        self.referenced = referenced;
    }

    pub fn state(&self, record: &RigRecord) -> CardState {
        if !record.exists {
            CardState::Missing
        } else if self.referenced.contains(&reference_key(&record.path)) {
            CardState::Referenced
        } else {
            CardState::Available
        }
    }

    /// The record's image under the images directory, when that file exists.
    pub fn image_path(&self, record: &RigRecord) -> Option<PathBuf> {
        let image = self.images_dir.join(record.image()?);
        image.is_file().then_some(image)
    }

    fn refresh(&self, card: &mut RigCard, record: &RigRecord) {
        card.record = record.clone();
        card.state = self.state(record);
        card.image = self.image_path(record);
        card.tooltip = format_tooltip(&card.name, record);
    }
}

impl ViewFactory for CardFactory {
    type View = RigCard;
    type Error = std::convert::Infallible;

    fn create(&mut self, name: &str, record: &RigRecord) -> Result<RigCard, Self::Error> {
        let mut card = RigCard {
            name: name.to_owned(),
            record: RigRecord::default(),
            visible: true,
            state: CardState::Missing,
            image: None,
            tooltip: String::new(),
        };
        self.refresh(&mut card, record);
        Ok(card)
    }

    fn update(&mut self, view: &mut RigCard, _name: &str, record: &RigRecord) {
        self.refresh(view, record);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[derive(Debug, Default)]
    struct Label {
        text: String,
        shown: bool,
    }

    impl RigView for Label {
        fn set_visible(&mut self, visible: bool) {
            self.shown = visible;
        }

        fn is_visible(&self) -> bool {
            self.shown
        }
    }

    #[derive(Default)]
    struct Labels {
        refuse: Option<&'static str>,
    }

    impl ViewFactory for Labels {
        type View = Label;
        type Error = String;

        fn create(&mut self, name: &str, record: &RigRecord) -> Result<Label, String> {
            if self.refuse == Some(name) {
                return Err("no widget".into());
            }
            Ok(Label {
                text: record.path.clone(),
                shown: true,
            })
        }

        fn update(&mut self, view: &mut Label, _name: &str, record: &RigRecord) {
            view.text = record.path.clone();
        }
    }

    fn display() -> RigMap {
        let mut display = RigMap::new();
        display.insert("Zeus".into(), RigRecord::new("/rigs/Zeus.ma"));
        display.insert("apollo".into(), RigRecord::new("/rigs/Apollo.ma"));
        display.insert("Broken".into(), RigRecord::new("/rigs/Broken.ma"));
        display.insert("_settings".into(), RigRecord::new(""));
        display
    }

    #[test]
    fn reconcile_creates_updates_and_removes() {
        let mut blacklist = Blacklist::new("blacklist.json");
        blacklist.insert("/rigs/Broken.ma");
        let mut grid = Grid::new();
        let mut factory = Labels::default();

        let report = grid.reconcile(&display(), &blacklist, SortKey::Name, true, &mut factory);
        assert_eq!(report.created, vec!["apollo", "Zeus"]);
        assert_eq!(grid.order(), ["apollo".to_string(), "Zeus".to_string()]);

        let mut next = display();
        next.remove("Zeus");
        next.insert("apollo".into(), RigRecord::new("/rigs/Apollo_v2.ma"));
        next.insert("Hera".into(), RigRecord::new("/rigs/Hera.ma"));
        let report = grid.reconcile(&next, &blacklist, SortKey::Name, false, &mut factory);
        assert_eq!(report.created, vec!["Hera"]);
        assert_eq!(report.updated, vec!["apollo"]);
        assert_eq!(report.removed, vec!["Zeus"]);
        assert_eq!(grid.get("apollo").unwrap().text, "/rigs/Apollo_v2.ma");
        assert_eq!(grid.order(), ["Hera".to_string(), "apollo".to_string()]);
    }

    #[test]
    fn blacklisting_drops_existing_view() {
        let mut grid = Grid::new();
        let mut factory = Labels::default();
        let mut blacklist = Blacklist::new("blacklist.json");
        grid.reconcile(&display(), &blacklist, SortKey::Name, true, &mut factory);
        assert_eq!(grid.len(), 3);

        blacklist.insert(r"/rigs/./Zeus.ma");
        let report = grid.reconcile(&display(), &blacklist, SortKey::Name, true, &mut factory);
        assert_eq!(report.removed, vec!["Zeus"]);
        assert!(grid.get("Zeus").is_none());
    }

    #[test]
    fn factory_failure_skips_record() {
        let mut grid = Grid::new();
        let mut factory = Labels {
            refuse: Some("Zeus"),
        };
        let report = grid.reconcile(
            &display(),
            &Blacklist::default(),
            SortKey::Name,
            true,
            &mut factory,
        );
        assert_eq!(report.failed, vec!["Zeus"]);
        assert_eq!(grid.order(), ["apollo".to_string(), "Broken".to_string()]);
    }

    #[test]
    fn visibility_touches_only_changed_views() {
        let mut grid = Grid::new();
        grid.reconcile(
            &display(),
            &Blacklist::default(),
            SortKey::Name,
            true,
            &mut Labels::default(),
        );
        assert_eq!(grid.apply_visibility(&["Zeus"]), 2);
        assert_eq!(grid.apply_visibility(&["Zeus"]), 0);
        assert_eq!(grid.visible_names(), vec!["Zeus"]);
    }

    #[test]
    fn card_state_image_and_tooltip() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("apollo.jpg"), b"jpg").unwrap();
        let mut factory = CardFactory::new(dir.path());

        let mut record = RigRecord::new("/rigs/Apollo.ma")
            .with_tags(["human", "male"])
            .with_author("Empty");
        record.image = Some("apollo.jpg".into());
        let card = factory.create("Apollo", &record).unwrap();
        assert_eq!(card.state, CardState::Missing);
        assert_eq!(card.image, Some(dir.path().join("apollo.jpg")));
        assert_eq!(
            card.tooltip,
            "Name: Apollo\nAuthor: N/A\nLink: N/A\nCollection: N/A\nTags: human, male\nPath: /rigs/Apollo.ma"
        );

        record.exists = true;
        record.image = Some("missing.jpg".into());
        factory.set_referenced([reference_key("/RIGS/apollo.ma")].into_iter().collect());
        let mut card = card;
        factory.update(&mut card, "Apollo", &record);
        assert_eq!(card.state, CardState::Referenced);
        assert_eq!(card.state.label(), "REMOVE");
        assert_eq!(card.image, None);
    }
}
