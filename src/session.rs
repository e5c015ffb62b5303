//! Session state: the single currently imported media reference.
//!
//! The slot sits behind an async mutex. Every tool call holds the lock for
//! its whole duration, so a trim or export never races an import.

use std::path::Path;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use vr_core::{is_safe_path, Error, MediaReference, PathGuard, Result};

/// Holder of the active media reference.
#[derive(Debug, Default)]
pub struct Session {
    slot: Mutex<Option<MediaReference>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access, giving up if `cancel` fires first.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<SessionGuard<'_>> {
        tokio::select! {
            guard = self.slot.lock() => Ok(SessionGuard { slot: guard }),
            _ = cancel.cancelled() => Err(Error::Cancelled("waiting for session".into())),
        }
    }

    /// Copy of the active reference, if any, without holding the lock.
    pub async fn snapshot(&self) -> Option<MediaReference> {
        self.slot.lock().await.clone()
    }
}

/// Exclusive access to the session slot.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    slot: MutexGuard<'a, Option<MediaReference>>,
}

impl SessionGuard<'_> {
    /// Validate `path` and make it the active reference.
    ///
    /// The file must pass [`PathGuard::validate_media_file`] and live inside
    /// the input directory. On failure the previous reference is kept.
    pub fn import(&mut self, guard: &PathGuard, path: &Path) -> Result<MediaReference> {
        let media = guard.validate_media_file(path)?;
        if !is_safe_path(media.path(), guard.input_dir()) {
            return Err(Error::security(
                "Access denied: File must be in allowed input directory",
            ));
        }

        if let Some(previous) = self.slot.replace(media.clone()) {
            tracing::debug!("Replacing imported media {}", previous.display_name());
        }
        tracing::info!("Imported {}", media.path().display());
        Ok(media)
    }

    /// The active reference; fails if nothing has been imported yet.
    pub fn current(&self) -> Result<&MediaReference> {
        self.slot
            .as_ref()
            .ok_or_else(|| Error::invalid("No video imported"))
    }
}
