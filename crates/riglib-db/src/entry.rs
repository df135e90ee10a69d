use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel written by the filter menus for records without a value.
pub const EMPTY: &str = "Empty";
/// Legacy sentinel written by older versions of the setup dialog.
pub const NOT_AVAILABLE: &str = "N/A";

/// Returns `true` when a stored field carries no meaningful value.
pub fn is_unset(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(value) => {
            let value = value.trim();
            value.is_empty() || value == EMPTY || value == NOT_AVAILABLE
        }
    }
}

/// Returns `true` for keys the store keeps verbatim but never iterates.
pub fn is_reserved_key(name: &str) -> bool {
    name.starts_with('_')
}

pub type RigMap = BTreeMap<String, RigRecord>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RecordWire", into = "RecordWire")]
pub struct RigRecord {
    pub path: String,
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub collection: Option<String>,
    pub author: Option<String>,
    pub link: Option<String>,
    pub alternatives: Vec<String>,
    pub notes: Option<String>,
    pub favorite: bool,
    /// Recomputed from the filesystem on every load, never written back.
    pub exists: bool,
    pub extra: Map<String, Value>,
    verbatim: Verbatim,
}

/// On-disk form of the leniently decoded fields. Written back as long as the
/// decoded value has not been changed.
#[derive(Debug, Clone, Default)]
struct Verbatim {
    tags: Option<Value>,
    alternatives: Option<Value>,
    favorite: Option<Value>,
}

impl PartialEq for RigRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.image == other.image
            && self.tags == other.tags
            && self.collection == other.collection
            && self.author == other.author
            && self.link == other.link
            && self.alternatives == other.alternatives
            && self.notes == other.notes
            && self.favorite == other.favorite
            && self.exists == other.exists
            && self.extra == other.extra
    }
}

impl RigRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_alternatives<I, S>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternatives = alternatives.into_iter().map(Into::into).collect();
        self
    }

    /// Collection name, or `None` when unset or a sentinel.
    pub fn collection(&self) -> Option<&str> {
        set_value(self.collection.as_deref())
    }

    pub fn author(&self) -> Option<&str> {
        set_value(self.author.as_deref())
    }

    pub fn link(&self) -> Option<&str> {
        set_value(self.link.as_deref())
    }

    pub fn image(&self) -> Option<&str> {
        set_value(self.image.as_deref())
    }

    /// Tags with blanks and the legacy `N/A` placeholder dropped.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|tag| is_real_tag(tag))
    }

    /// Primary path followed by every alternative, skipping blanks.
    pub fn all_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str())
            .chain(self.alternatives.iter().map(String::as_str))
            .filter(|path| !path.trim().is_empty())
    }
}

fn set_value(value: Option<&str>) -> Option<&str> {
    if is_unset(value) {
        None
    } else {
        value
    }
}

/// A single-field mutation coming from an edit surface.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Path(String),
    Image(Option<String>),
    Tags(Vec<String>),
    Collection(Option<String>),
    Author(Option<String>),
    Link(Option<String>),
    Alternatives(Vec<String>),
    Notes(Option<String>),
    Favorite(bool),
}

impl FieldUpdate {
    pub fn field_name(&self) -> &'static str {
        match self {
            FieldUpdate::Path(_) => "path",
            FieldUpdate::Image(_) => "image",
            FieldUpdate::Tags(_) => "tags",
            FieldUpdate::Collection(_) => "collection",
            FieldUpdate::Author(_) => "author",
            FieldUpdate::Link(_) => "link",
            FieldUpdate::Alternatives(_) => "alternatives",
            FieldUpdate::Notes(_) => "notes",
            FieldUpdate::Favorite(_) => "favorite",
        }
    }

    pub fn apply(self, record: &mut RigRecord) {
        match self {
            FieldUpdate::Path(path) => record.path = path,
            FieldUpdate::Image(image) => record.image = image,
            FieldUpdate::Tags(tags) => record.tags = tags,
            FieldUpdate::Collection(value) => record.collection = value,
            FieldUpdate::Author(value) => record.author = value,
            FieldUpdate::Link(value) => record.link = value,
            FieldUpdate::Alternatives(paths) => record.alternatives = paths,
            FieldUpdate::Notes(notes) => record.notes = notes,
            FieldUpdate::Favorite(favorite) => record.favorite = favorite,
        }
    }
}

/// Whole database document: rig records plus reserved `_` entries and any
/// entry that could not be decoded, both of which survive a save untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RigDatabase {
    pub records: RigMap,
    pub opaque: BTreeMap<String, Value>,
}

impl RigDatabase {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let entries: BTreeMap<String, Value> = serde_json::from_value(value)?;
        let mut database = RigDatabase::default();
        for (name, entry) in entries {
            if is_reserved_key(&name) {
                database.opaque.insert(name, entry);
                continue;
            }
            match serde_json::from_value::<RigRecord>(entry.clone()) {
                Ok(record) => {
                    database.records.insert(name, record);
                }
                Err(err) => {
                    log::warn!("keeping undecodable rig entry '{name}' verbatim: {err}");
                    database.opaque.insert(name, entry);
                }
            }
        }
        Ok(database)
    }
}

impl Serialize for RigDatabase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len() + self.opaque.len()))?;
        for (name, value) in &self.opaque {
            map.serialize_entry(name, value)?;
        }
        for (name, record) in &self.records {
            map.serialize_entry(name, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RigDatabase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RigDatabase::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn is_real_tag(tag: &str) -> bool {
    let tag = tag.trim();
    !tag.is_empty() && tag != NOT_AVAILABLE
}

#[derive(Serialize, Deserialize)]
struct RecordWire {
    #[serde(default)]
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    tags: Option<Value>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    alternatives: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    favorite: Option<Value>,
    /// Derived on load; read and dropped so it is never written back.
    #[serde(default, rename = "exists", skip_serializing)]
    _exists: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Keeps an explicit `null` apart from a missing key.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl From<RecordWire> for RigRecord {
    fn from(wire: RecordWire) -> Self {
        Self {
            path: wire.path,
            image: wire.image,
            tags: wire.tags.as_ref().map(tags_from_value).unwrap_or_default(),
            collection: wire.collection,
            author: wire.author,
            link: wire.link,
            alternatives: wire
                .alternatives
                .as_ref()
                .map(paths_from_value)
                .unwrap_or_default(),
            notes: wire.notes,
            favorite: wire.favorite.as_ref().is_some_and(flag_from_value),
            exists: false,
            extra: wire.extra,
            verbatim: Verbatim {
                tags: wire.tags,
                alternatives: wire.alternatives,
                favorite: wire.favorite,
            },
        }
    }
}

impl From<RigRecord> for RecordWire {
    fn from(record: RigRecord) -> Self {
        let Verbatim {
            tags,
            alternatives,
            favorite,
        } = record.verbatim;
        Self {
            tags: Some(write_back(
                tags,
                &record.tags,
                tags_from_value,
                Value::from(record.tags.clone()),
            )),
            alternatives: Some(write_back(
                alternatives,
                &record.alternatives,
                paths_from_value,
                Value::from(record.alternatives.clone()),
            )),
            favorite: Some(write_back(
                favorite,
                &record.favorite,
                flag_from_value,
                Value::Bool(record.favorite),
            )),
            path: record.path,
            image: record.image,
            collection: record.collection,
            author: record.author,
            link: record.link,
            notes: record.notes,
            _exists: None,
            extra: record.extra,
        }
    }
}

fn write_back<T: PartialEq>(
    stored: Option<Value>,
    current: &T,
    decode: fn(&Value) -> T,
    fresh: Value,
) -> Value {
    match stored {
        Some(value) if decode(&value) == *current => value,
        _ => fresh,
    }
}

fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Value::String(text) => text
            .split(',')
            .filter(|tag| is_real_tag(tag))
            .map(|tag| tag.trim().to_owned())
            .collect(),
        _ => Vec::new(),
    }
}

fn paths_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Value::String(path) if !path.trim().is_empty() => vec![path.clone()],
        _ => Vec::new(),
    }
}

fn flag_from_value(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn sentinels_read_as_unset() {
        let record: RigRecord = serde_json::from_value(json!({
            "path": "/rigs/a.ma",
            "collection": "Empty",
            "author": "N/A",
            "link": null,
            "tags": "N/A"
        }))
        .unwrap();
        assert_eq!(record.collection(), None);
        assert_eq!(record.author(), None);
        assert_eq!(record.link(), None);
        assert!(record.tags.is_empty());
        assert_eq!(record.collection.as_deref(), Some("Empty"));
    }

    #[test]
    fn exists_is_not_written_back() {
        let mut record = RigRecord::new("/rigs/a.ma");
        record.exists = true;
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("exists").is_none());
    }

    #[test]
    fn unknown_keys_survive() {
        let source = json!({"path": "/rigs/a.ma", "rating": 5});
        let record: RigRecord = serde_json::from_value(source).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["rating"], json!(5));
    }

    #[test]
    fn database_keeps_reserved_and_broken_entries() {
        let source = json!({
            "_version": 3,
            "Apollo": {"path": "/rigs/Apollo.ma", "tags": ["human"]},
            "Broken": {"path": 12}
        });
        let database = RigDatabase::from_value(source).unwrap();
        assert_eq!(database.records.len(), 1);
        assert!(database.opaque.contains_key("_version"));
        assert!(database.opaque.contains_key("Broken"));
        let value = serde_json::to_value(&database).unwrap();
        assert_eq!(value["Broken"], json!({"path": 12}));
        assert_eq!(value["Apollo"]["tags"], json!(["human"]));
    }

    #[test]
    fn lenient_fields_keep_their_stored_form() {
        let source = json!({
            "path": "/rigs/a.ma",
            "tags": "human, Empty",
            "alternatives": ["/rigs/a_v2.ma", 7],
            "favorite": "yes"
        });
        let record: RigRecord = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(record.tags().collect::<Vec<_>>(), vec!["human", "Empty"]);
        assert_eq!(record.alternatives, vec!["/rigs/a_v2.ma"]);
        assert!(!record.favorite);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["tags"], source["tags"]);
        assert_eq!(value["alternatives"], source["alternatives"]);
        assert_eq!(value["favorite"], source["favorite"]);
    }

    #[test]
    fn edited_fields_are_written_fresh() {
        let mut record: RigRecord =
            serde_json::from_value(json!({"path": "/rigs/a.ma", "tags": "N/A", "favorite": 1}))
                .unwrap();
        record.tags.push("creature".into());
        FieldUpdate::Favorite(true).apply(&mut record);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["tags"], json!(["creature"]));
        assert_eq!(value["favorite"], json!(true));
    }

    #[test]
    fn field_update_applies() {
        let mut record = RigRecord::new("/a.ma");
        FieldUpdate::Favorite(true).apply(&mut record);
        FieldUpdate::Collection(Some("Heroes".into())).apply(&mut record);
        assert!(record.favorite);
        assert_eq!(record.collection(), Some("Heroes"));
    }
}
