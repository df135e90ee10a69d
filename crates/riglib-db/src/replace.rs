use serde::{Deserialize, Deserializer, Serialize};

/// A find/replace pair applied to stored paths at read time, so a database
/// written on one machine resolves against another machine's drive layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathReplacement {
    pub find: String,
    pub replace: String,
}

impl PathReplacement {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }

    fn apply(&self, path: &str) -> Option<String> {
        if self.find.is_empty() || !path.contains(&self.find) {
            return None;
        }
        Some(path.replacen(&self.find, &self.replace, 1))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplacementRepr {
    Pair(String, String),
    Object { find: String, replace: String },
}

impl<'de> Deserialize<'de> for PathReplacement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ReplacementRepr::deserialize(deserializer)? {
            ReplacementRepr::Pair(find, replace) => PathReplacement { find, replace },
            ReplacementRepr::Object { find, replace } => PathReplacement { find, replace },
        })
    }
}

/// Applies every rule in order; each rule rewrites the first occurrence of
/// its pattern in the output of the previous one.
pub fn apply_replacements(path: &str, rules: &[PathReplacement]) -> String {
    let mut current = path.to_owned();
    for rule in rules {
        if let Some(replaced) = rule.apply(&current) {
            current = replaced;
        }
    }
    current
}
