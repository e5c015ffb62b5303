//! The currently imported source item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validated, canonical reference to an imported media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    path: PathBuf,
    imported_at: DateTime<Utc>,
}

impl MediaReference {
    /// Wrap an already-validated canonical path, stamped with the current time.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            imported_at: Utc::now(),
        }
    }

    /// Absolute canonical path of the media file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the reference was created.
    pub fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }

    /// File name component, for replies and log lines.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }

    /// Lower-case extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}
