use std::collections::HashSet;

use riglib_db::paths::reference_key;
use riglib_db::{
    is_reserved_key, CancelToken, FilterSelection, RigMap, RigRecord, StatusFilter, EMPTY,
};

use crate::query::{ParsedQuery, QueryField};

/// Search text, menu selection and scene references compiled into a
/// predicate over records.
///
/// Categories (name, status, collection, tags, author, link) are AND-ed.
/// Within a category the menu selections and the prefixed query terms are
/// OR-ed.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    query: ParsedQuery,
    selection: FilterSelection,
    referenced: HashSet<String>,
}

impl SearchFilter {
    /// `referenced` holds [`reference_key`]s of the paths loaded in the scene.
    pub fn new(text: &str, selection: FilterSelection, referenced: HashSet<String>) -> Self {
        Self {
            query: ParsedQuery::parse(text),
            selection,
            referenced,
        }
    }

    pub fn query(&self) -> &ParsedQuery {
        &self.query
    }

    pub fn matches(&self, name: &str, record: &RigRecord) -> bool {
        self.matches_name(name)
            && self.matches_status(record)
            && self.matches_labelled(
                record.collection(),
                &self.selection.collections,
                QueryField::Collection,
            )
            && self.matches_tags(record)
            && self.matches_labelled(record.author(), &self.selection.authors, QueryField::Author)
            && self.matches_link(record)
    }

    /// Names of the matching records in store order. Returns `None` when the
    /// token was cancelled part way; a cancelled run delivers nothing.
    pub fn run(&self, records: &RigMap, cancel: &CancelToken) -> Option<Vec<String>> {
        let mut visible = Vec::new();
        for (name, record) in records {
            if cancel.is_cancelled() {
                return None;
            }
            if !is_reserved_key(name) && self.matches(name, record) {
                visible.push(name.clone());
            }
        }
        Some(visible)
    }

    fn matches_name(&self, name: &str) -> bool {
        if self.query.general.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.query
            .general
            .iter()
            .all(|term| name.contains(term.as_str()))
    }

    fn matches_status(&self, record: &RigRecord) -> bool {
        if self.selection.has_status(StatusFilter::OnlyAvailable) && !record.exists {
            return false;
        }
        if self.selection.has_status(StatusFilter::OnlyReferenced) {
            let key = reference_key(&record.path);
            if key.is_empty() || !self.referenced.contains(&key) {
                return false;
            }
        }
        true
    }

    /// Collection and author: exact menu match (an unset value matches the
    /// "Empty" item) or a substring of the lowercased value.
    fn matches_labelled(
        &self,
        value: Option<&str>,
        selected: &[String],
        field: QueryField,
    ) -> bool {
        let terms = self.query.terms(field);
        if selected.is_empty() && terms.is_empty() {
            return true;
        }
        match value {
            Some(value) => {
                let lowered = value.to_lowercase();
                selected.iter().any(|item| item == value)
                    || terms.iter().any(|term| lowered.contains(term.as_str()))
            }
            None => selected.iter().any(|item| item == EMPTY),
        }
    }

    fn matches_tags(&self, record: &RigRecord) -> bool {
        let terms = self.query.terms(QueryField::Tags);
        let selected = &self.selection.tags;
        if selected.is_empty() && terms.is_empty() {
            return true;
        }
        record.tags().any(|tag| {
            if selected.iter().any(|item| item == tag) {
                return true;
            }
            let lowered = tag.to_lowercase();
            terms.iter().any(|term| lowered.contains(term.as_str()))
        })
    }

    fn matches_link(&self, record: &RigRecord) -> bool {
        let terms = self.query.terms(QueryField::Link);
        if terms.is_empty() {
            return true;
        }
        record.link().is_some_and(|link| {
            let lowered = link.to_lowercase();
            terms.iter().any(|term| lowered.contains(term.as_str()))
        })
    }
}

/// One-shot helper: names in `records` matching `text` and `selection`.
pub fn filter_names(
    records: &RigMap,
    text: &str,
    selection: &FilterSelection,
    referenced: &HashSet<String>,
) -> Vec<String> {
    let filter = SearchFilter::new(text, selection.clone(), referenced.clone());
    filter.run(records, &CancelToken::new()).unwrap_or_default()
}
