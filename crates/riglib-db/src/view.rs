//! Filter and sort selections shared by the browser and the settings file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusFilter {
    #[serde(rename = "Only Available")]
    OnlyAvailable,
    #[serde(rename = "Only Referenced")]
    OnlyReferenced,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 2] = [StatusFilter::OnlyAvailable, StatusFilter::OnlyReferenced];

    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::OnlyAvailable => "Only Available",
            StatusFilter::OnlyReferenced => "Only Referenced",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }
}

/// Filter menu sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterCategory {
    Status,
    Tags,
    Collections,
    Author,
}

impl FilterCategory {
    pub fn label(self) -> &'static str {
        match self {
            FilterCategory::Status => "Status",
            FilterCategory::Tags => "Tags",
            FilterCategory::Collections => "Collections",
            FilterCategory::Author => "Author",
        }
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FilterCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "status" => Ok(FilterCategory::Status),
            "tag" | "tags" => Ok(FilterCategory::Tags),
            "collection" | "collections" => Ok(FilterCategory::Collections),
            "author" | "authors" => Ok(FilterCategory::Author),
            other => Err(format!("unknown filter category: {other}")),
        }
    }
}

/// Checked items of the filter menu. Serialized with the menu's section names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSelection {
    #[serde(rename = "Status", skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<StatusFilter>,
    #[serde(rename = "Tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "Collections", skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(rename = "Author", skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
            && self.tags.is_empty()
            && self.collections.is_empty()
            && self.authors.is_empty()
    }

    pub fn has_status(&self, status: StatusFilter) -> bool {
        self.status.contains(&status)
    }

    /// Checks `value` in `category`; returns `false` for an unknown status label
    /// or a value that was already selected.
    pub fn select(&mut self, category: FilterCategory, value: &str) -> bool {
        match category {
            FilterCategory::Status => match StatusFilter::from_label(value) {
                Some(status) if !self.status.contains(&status) => {
                    self.status.push(status);
                    true
                }
                _ => false,
            },
            FilterCategory::Tags => push_unique(&mut self.tags, value),
            FilterCategory::Collections => push_unique(&mut self.collections, value),
            FilterCategory::Author => push_unique(&mut self.authors, value),
        }
    }

    /// Replaces the whole selection with a single checked item, as clicking a
    /// tag or author in the info panel does.
    pub fn single(category: FilterCategory, value: &str) -> Self {
        let mut selection = FilterSelection::default();
        selection.select(category, value);
        selection
    }

    pub fn clear(&mut self) {
        *self = FilterSelection::default();
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) -> bool {
    if values.iter().any(|existing| existing == value) {
        return false;
    }
    values.push(value.to_owned());
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    Name,
    Collection,
    Author,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "collection" => Ok(SortKey::Collection),
            "author" => Ok(SortKey::Author),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}
