//! Path and file name validation against the workspace sandbox.
//!
//! [`is_safe_path`] and [`sanitize_filename`] are pure helpers; [`PathGuard`]
//! binds them to the configured directories and limits.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::MediaReference;

/// Returns true iff `path` resolves (symlinks included) to `base_dir` or
/// something nested under it.
///
/// Both paths must exist; anything that cannot be resolved is unsafe.
pub fn is_safe_path(path: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> bool {
    let (Ok(resolved), Ok(base)) = (
        std::fs::canonicalize(path.as_ref()),
        std::fs::canonicalize(base_dir.as_ref()),
    ) else {
        return false;
    };
    resolved.starts_with(&base)
}

/// Reduce `name` to its final path component, dropping NUL characters.
///
/// Both `/` and `\` count as separators. `.` and `..` reduce to the empty
/// string. Applying this twice gives the same result as applying it once.
pub fn sanitize_filename(name: &str) -> String {
    let without_nul: String = name.chars().filter(|c| *c != '\0').collect();
    let base = without_nul.rsplit(['/', '\\']).next().unwrap_or_default();
    match base {
        "." | ".." => String::new(),
        other => other.to_string(),
    }
}

/// Sandbox rules derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    input_dir: PathBuf,
    output_dir: PathBuf,
    allowed_extensions: Vec<String>,
    max_file_size: u64,
    max_filename_length: usize,
}

impl PathGuard {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.workspace.root.clone(),
            input_dir: config.workspace.input_dir(),
            output_dir: config.workspace.output_dir(),
            allowed_extensions: config.security.allowed_extensions.clone(),
            max_file_size: config.limits.max_file_size,
            max_filename_length: config.limits.max_filename_length,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Interpret a caller-supplied path: relative paths hang off the
    /// workspace root.
    pub fn resolve_input(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Whether `path` carries one of the allowed extensions (case-insensitive).
    pub fn has_allowed_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
        self.allowed_extensions.iter().any(|allowed| *allowed == dotted)
    }

    /// Check that `path` is an existing media file of an allowed type and
    /// size, returning a canonical reference to it.
    pub fn validate_media_file(&self, path: &Path) -> Result<MediaReference> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::invalid(format!(
                    "File does not exist: {}",
                    path.display()
                )))
            }
            Err(e) => {
                return Err(Error::invalid(format!(
                    "Cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        if !metadata.is_file() {
            return Err(Error::invalid(format!("Not a file: {}", path.display())));
        }

        if !self.has_allowed_extension(path) {
            return Err(Error::invalid(format!(
                "Unsupported file format (allowed: {})",
                self.allowed_extensions.join(", ")
            )));
        }

        if metadata.len() > self.max_file_size {
            return Err(Error::invalid(format!(
                "File is {} bytes; the limit is {} bytes",
                metadata.len(),
                self.max_file_size
            )));
        }

        let canonical = std::fs::canonicalize(path)
            .map_err(|e| Error::invalid(format!("Cannot resolve {}: {e}", path.display())))?;
        Ok(MediaReference::new(canonical))
    }

    /// Pick the export destination directory.
    ///
    /// `None` or an empty string selects the output directory. Anything else
    /// is resolved relative to the output directory, must already exist, and
    /// must stay inside it.
    pub fn resolve_output_dir(&self, raw: Option<&str>) -> Result<PathBuf> {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(self.output_dir.clone());
        };

        let candidate = self.output_dir.join(raw);
        if !candidate.is_dir() {
            return Err(Error::invalid(format!(
                "Export directory does not exist: {}",
                candidate.display()
            )));
        }
        if !is_safe_path(&candidate, &self.output_dir) {
            return Err(Error::security(
                "Access denied: export path must be inside the output directory",
            ));
        }

        std::fs::canonicalize(&candidate).map_err(Error::from)
    }

    /// Build `dir/<sanitized name>`, enforcing the file name length limit.
    pub fn output_path(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let safe = sanitize_filename(file_name);
        if safe.is_empty() {
            return Err(Error::invalid(format!(
                "File name {file_name:?} is empty after sanitization"
            )));
        }
        if safe.len() > self.max_filename_length {
            return Err(Error::invalid(format!(
                "Filename too long ({} > {} bytes)",
                safe.len(),
                self.max_filename_length
            )));
        }
        Ok(dir.join(safe))
    }
}
