//! Policy module sources

use crate::error::{PolicyError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Rego module sources keyed by file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySources {
    modules: BTreeMap<String, String>,
}

impl PolicySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file; the path becomes the module name
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut sources = Self::new();
        for path in paths {
            let path = path.as_ref();
            let source = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            sources.insert(path.display().to_string(), source);
        }
        Ok(sources)
    }

    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.modules.insert(name.into(), source.into());
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.modules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_files_keys_by_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "package approval").unwrap();

        let sources = PolicySources::from_files(&[file.path()]).unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources.names(), vec![file.path().display().to_string()]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PolicySources::from_files(&["/nonexistent/approval.rego"]).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }
}
