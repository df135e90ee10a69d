/// Field a prefixed search token narrows on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryField {
    Tags,
    Author,
    Collection,
    Link,
}

impl QueryField {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "t" | "tag" | "tags" => Some(QueryField::Tags),
            "a" | "auth" | "author" => Some(QueryField::Author),
            "c" | "col" | "collection" => Some(QueryField::Collection),
            "l" | "link" => Some(QueryField::Link),
            _ => None,
        }
    }
}

/// Lowercased search text split into name terms and field-prefixed terms.
///
/// `tag:human apo` yields the general term `apo` and the tag term `human`.
/// A token whose prefix is not a known field (`foo:bar`) stays a general
/// term as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub general: Vec<String>,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub collections: Vec<String>,
    pub links: Vec<String>,
}

impl ParsedQuery {
    pub fn parse(text: &str) -> Self {
        let mut query = ParsedQuery::default();
        for token in text.to_lowercase().split_whitespace() {
            let field = token
                .split_once(':')
                .and_then(|(key, value)| QueryField::from_key(key).map(|field| (field, value)));
            match field {
                Some((field, value)) => query.terms_mut(field).push(value.to_owned()),
                None => query.general.push(token.to_owned()),
            }
        }
        query
    }

    pub fn terms(&self, field: QueryField) -> &[String] {
        match field {
            QueryField::Tags => &self.tags,
            QueryField::Author => &self.authors,
            QueryField::Collection => &self.collections,
            QueryField::Link => &self.links,
        }
    }

    fn terms_mut(&mut self, field: QueryField) -> &mut Vec<String> {
        match field {
            QueryField::Tags => &mut self.tags,
            QueryField::Author => &mut self.authors,
            QueryField::Collection => &mut self.collections,
            QueryField::Link => &mut self.links,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty()
            && self.tags.is_empty()
            && self.authors.is_empty()
            && self.collections.is_empty()
            && self.links.is_empty()
    }
}
