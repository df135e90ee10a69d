use std::collections::BTreeSet;

use crate::entry::{is_reserved_key, RigMap, EMPTY};
use crate::view::{FilterCategory, StatusFilter};

/// Distinct values found across the store, used to build filter menus and
/// autocompletion lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogMetadata {
    pub collections: BTreeSet<String>,
    pub authors: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub has_empty_collection: bool,
    pub has_empty_author: bool,
}

/// One section of the filter menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSection {
    pub category: FilterCategory,
    pub items: Vec<String>,
}

impl CatalogMetadata {
    pub fn collect(records: &RigMap) -> Self {
        let mut metadata = CatalogMetadata::default();
        for (name, record) in records {
            if is_reserved_key(name) {
                continue;
            }
            match record.collection() {
                Some(collection) => {
                    metadata.collections.insert(collection.to_owned());
                }
                None => metadata.has_empty_collection = true,
            }
            match record.author() {
                Some(author) => {
                    metadata.authors.insert(author.to_owned());
                }
                None => metadata.has_empty_author = true,
            }
            metadata.tags.extend(record.tags().map(str::to_owned));
        }
        metadata
    }

    /// Status, Tags, Collections and Author sections, with the synthetic
    /// "Empty" bucket leading Collections and Author when any record lacks one.
    pub fn filter_sections(&self) -> Vec<FilterSection> {
        vec![
            FilterSection {
                category: FilterCategory::Status,
                items: StatusFilter::ALL
                    .iter()
                    .map(|status| status.label().to_owned())
                    .collect(),
            },
            FilterSection {
                category: FilterCategory::Tags,
                items: self.tags.iter().cloned().collect(),
            },
            FilterSection {
                category: FilterCategory::Collections,
                items: with_empty(&self.collections, self.has_empty_collection),
            },
            FilterSection {
                category: FilterCategory::Author,
                items: with_empty(&self.authors, self.has_empty_author),
            },
        ]
    }

    /// Sorted collections, authors and tags without the "Empty" bucket.
    pub fn autocomplete(&self) -> Autocomplete {
        Autocomplete {
            collections: self.collections.iter().cloned().collect(),
            authors: self.authors.iter().cloned().collect(),
            tags: self.tags.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Autocomplete {
    pub collections: Vec<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
}

fn with_empty(values: &BTreeSet<String>, has_empty: bool) -> Vec<String> {
    let mut items = Vec::with_capacity(values.len() + 1);
    if has_empty {
        items.push(EMPTY.to_owned());
    }
    items.extend(values.iter().cloned());
    items
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entry::RigRecord;

    #[test]
    fn aggregates_and_buckets_empty() {
        let mut records = RigMap::new();
        records.insert(
            "Apollo".into(),
            RigRecord::new("/a.ma")
                .with_tags(["human", "male"])
                .with_collection("Apollo&Artemis")
                .with_author("Ramon"),
        );
        records.insert(
            "Crate".into(),
            RigRecord::new("/c.ma").with_tags(["prop"]).with_collection("N/A"),
        );
        records.insert("_meta".into(), RigRecord::new("/ignored.ma").with_tags(["hidden"]));

        let metadata = CatalogMetadata::collect(&records);
        assert!(metadata.has_empty_collection);
        assert!(metadata.has_empty_author);
        assert!(!metadata.tags.contains("hidden"));

        let sections = metadata.filter_sections();
        assert_eq!(sections[0].items, vec!["Only Available", "Only Referenced"]);
        assert_eq!(sections[1].items, vec!["human", "male", "prop"]);
        assert_eq!(sections[2].items, vec!["Empty", "Apollo&Artemis"]);
        assert_eq!(sections[3].items, vec!["Empty", "Ramon"]);

        let autocomplete = metadata.autocomplete();
        assert_eq!(autocomplete.collections, vec!["Apollo&Artemis"]);
        assert_eq!(autocomplete.authors, vec!["Ramon"]);
    }
}
