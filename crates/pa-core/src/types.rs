//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An assistant server found on disk.
///
/// Descriptors are rebuilt on every discovery request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Display name (from metadata or derived from the file name)
    pub name: String,
    /// Absolute path to the server definition
    pub path: PathBuf,
    /// Human-readable description
    pub description: String,
}

impl ServerDescriptor {
    /// Create a new descriptor
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}
