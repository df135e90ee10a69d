use std::collections::HashSet;

use riglib_db::paths::reference_key;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("scene host unavailable: {0}")]
    Unavailable(String),
    #[error("failed to reference {path}: {message}")]
    Reference { path: String, message: String },
    #[error("{0} is not referenced in the scene")]
    NotReferenced(String),
}

/// The host application's scene reference API.
pub trait SceneHost: Send {
    /// Paths of every file referenced into the current scene.
    fn references(&self) -> Result<Vec<String>, HostError>;

    fn add_reference(&mut self, path: &str, namespace: &str) -> Result<(), HostError>;

    fn remove_reference(&mut self, path: &str) -> Result<(), HostError>;
}

/// Case-folded keys of the scene's references. A failing host is logged and
/// reads as an empty scene.
pub fn referenced_set(host: &dyn SceneHost) -> HashSet<String> {
    match host.references() {
        Ok(paths) => paths.iter().map(|path| reference_key(path)).collect(),
        Err(err) => {
            log::warn!("could not query scene references: {err}");
            HashSet::new()
        }
    }
}

/// In-memory scene used by the command-line front-end and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    references: Vec<(String, String)>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(path, namespace)` pairs in load order.
    pub fn loaded(&self) -> &[(String, String)] {
        &self.references
    }
}

impl SceneHost for MemoryHost {
    fn references(&self) -> Result<Vec<String>, HostError> {
        Ok(self
            .references
            .iter()
            .map(|(path, _)| path.clone())
            .collect())
    }

    fn add_reference(&mut self, path: &str, namespace: &str) -> Result<(), HostError> {
        self.references
            .push((path.to_owned(), namespace.to_owned()));
        Ok(())
    }

    fn remove_reference(&mut self, path: &str) -> Result<(), HostError> {
        let key = reference_key(path);
        let before = self.references.len();
        self.references
            .retain(|(loaded, _)| reference_key(loaded) != key);
        if self.references.len() == before {
            return Err(HostError::NotReferenced(path.to_owned()));
        }
        Ok(())
    }
}
