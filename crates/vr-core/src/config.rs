//! Application configuration types.
//!
//! The top-level [`Config`] struct can be deserialized from JSON and is then
//! overlaid with environment variables. Every section defaults sensibly, so
//! an empty `{}` file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

/// Environment variable naming the workspace root.
pub const ENV_WORKSPACE: &str = "VIDEO_EDITOR_WORKSPACE";
/// Environment variable for the process timeout, in seconds.
pub const ENV_TIMEOUT: &str = "FFMPEG_TIMEOUT";
/// Environment variable for the maximum accepted input size, in bytes.
pub const ENV_MAX_FILE_SIZE: &str = "MAX_FILE_SIZE";
/// Environment variable for the comma-separated extension allow-list.
pub const ENV_ALLOWED_EXTENSIONS: &str = "ALLOWED_EXTENSIONS";
/// Environment variable for the maximum output file name length.
pub const ENV_MAX_FILENAME_LENGTH: &str = "MAX_FILENAME_LENGTH";
/// Environment variable overriding the ffmpeg binary.
pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";
/// Environment variable overriding the ffplay binary.
pub const ENV_FFPLAY_PATH: &str = "FFPLAY_PATH";

const DEFAULT_WORKSPACE: &str = "~/.video_editor";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;
const DEFAULT_MAX_FILENAME_LENGTH: usize = 255;
const DEFAULT_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".webm"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub limits: LimitsConfig,
    pub security: SecurityConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json_str)
            .map_err(|e| Error::invalid(format!("config parse error: {e}")))?;
        config.security.normalize();
        Ok(config)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load from an optional file, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::load_or_default(path);
        config.apply_env();
        config
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Unparsable values are logged and ignored, keeping the previous value.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            self.workspace.root = expand_path(root.trim());
        }

        if let Some(raw) = lookup(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.limits.process_timeout = Duration::from_secs(secs),
                Err(e) => tracing::warn!("Ignoring {ENV_TIMEOUT}={raw:?}: {e}"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_FILE_SIZE) {
            match raw.trim().parse::<u64>() {
                Ok(bytes) => self.limits.max_file_size = bytes,
                Err(e) => tracing::warn!("Ignoring {ENV_MAX_FILE_SIZE}={raw:?}: {e}"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_FILENAME_LENGTH) {
            match raw.trim().parse::<usize>() {
                Ok(len) => self.limits.max_filename_length = len,
                Err(e) => tracing::warn!("Ignoring {ENV_MAX_FILENAME_LENGTH}={raw:?}: {e}"),
            }
        }

        if let Some(raw) = lookup(ENV_ALLOWED_EXTENSIONS) {
            self.security.allowed_extensions = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            self.security.normalize();
        }

        if let Some(path) = lookup(ENV_FFMPEG_PATH).filter(|v| !v.trim().is_empty()) {
            self.tools.ffmpeg_path = Some(expand_path(path.trim()));
        }
        if let Some(path) = lookup(ENV_FFPLAY_PATH).filter(|v| !v.trim().is_empty()) {
            self.tools.ffplay_path = Some(expand_path(path.trim()));
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.limits.process_timeout.is_zero() {
            warnings.push("limits.process_timeout is 0; every run will time out".into());
        }
        if self.limits.max_file_size == 0 {
            warnings.push("limits.max_file_size is 0; every import will be rejected".into());
        }
        if self.limits.max_filename_length == 0 {
            warnings.push("limits.max_filename_length is 0; every output name is too long".into());
        }
        if self.security.allowed_extensions.is_empty() {
            warnings.push("security.allowed_extensions is empty; nothing can be imported".into());
        }
        if self.workspace.root.is_relative() {
            warnings.push(format!(
                "workspace.root {} is relative to the current directory",
                self.workspace.root.display()
            ));
        }

        warnings
    }

    /// Create the workspace root and its `temp/`, `input/` and `output/`
    /// subdirectories if they are missing.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.workspace.root.clone(),
            self.workspace.temp_dir(),
            self.workspace.input_dir(),
            self.workspace.output_dir(),
        ] {
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir)?;
                tracing::info!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Workspace directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

impl WorkspaceConfig {
    /// Scratch directory for intermediate files.
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    /// Sandbox from which media may be imported.
    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    /// Default destination for trimmed and exported files.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: expand_path(DEFAULT_WORKSPACE),
        }
    }
}

/// Size and time limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock budget for one external tool run.
    #[serde(with = "duration_secs")]
    pub process_timeout: Duration,
    /// Largest input file accepted by `import`, in bytes.
    pub max_file_size: u64,
    /// Longest output file name accepted, in bytes.
    pub max_filename_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            process_timeout: DEFAULT_TIMEOUT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
        }
    }
}

/// Input validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Lower-case extensions including the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl SecurityConfig {
    /// Lower-case every extension and make sure it starts with a dot.
    fn normalize(&mut self) {
        for ext in &mut self.allowed_extensions {
            let lower = ext.trim().to_lowercase();
            *ext = if lower.starts_with('.') {
                lower
            } else {
                format!(".{lower}")
            };
        }
        self.allowed_extensions.dedup();
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffplay_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Serde helpers to (de)serialize `Duration` as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
