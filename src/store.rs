//! On-disk state: the access credential and the per-feed snapshot.
//!
//! Both files are plain JSON. Reads fail soft (a broken file behaves like a
//! missing one), writes go through a temporary file and a rename so a crash
//! never leaves a half-written document behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::auth::Credential;
use crate::detector::FeedSnapshot;
use crate::error::{RelayError, Result};
use crate::TARGET_STATE;

/// Reads and deserializes `path`. A missing file is `Ok(None)`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(RelayError::Persistence(format!(
                "Could not read {}: {}",
                path.display(),
                err
            )))
        }
    };

    serde_json::from_str(&data).map(Some).map_err(|err| {
        RelayError::Persistence(format!("Could not parse {}: {}", path.display(), err))
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let persistence = |err: std::io::Error| {
        RelayError::Persistence(format!("Could not write {}: {}", path.display(), err))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persistence)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|err| RelayError::Persistence(format!("Could not serialize state: {}", err)))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).map_err(persistence)?;
    fs::rename(&tmp, path).map_err(persistence)?;
    Ok(())
}

/// Persists the long-lived access credential across restarts.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored credential.
    ///
    /// Any problem other than a missing file is logged and reported as
    /// absent, so the caller falls back to a fresh handshake.
    pub fn load(&self) -> Option<Credential> {
        match read_json::<Credential>(&self.path) {
            Ok(Some(credential)) if credential.is_complete() => {
                info!(target: TARGET_STATE, "Loaded access token from {}", self.path.display());
                Some(credential)
            }
            Ok(Some(_)) => {
                warn!(target: TARGET_STATE, "Token file {} is missing the token or its secret, ignoring it", self.path.display());
                None
            }
            Ok(None) => {
                debug!(target: TARGET_STATE, "No token file at {}", self.path.display());
                None
            }
            Err(err) => {
                warn!(target: TARGET_STATE, "Could not load token file: {}", err);
                None
            }
        }
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        write_json(&self.path, credential)?;
        info!(target: TARGET_STATE, "Access token saved to {}", self.path.display());
        Ok(())
    }
}

/// Persists the [`FeedSnapshot`] so restarts do not repost old items.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, falling back to an empty one on any failure.
    ///
    /// An empty snapshot makes every feed a first run, which seeds instead of
    /// publishing, so a lost file never floods the account.
    pub fn load(&self) -> FeedSnapshot {
        match read_json::<FeedSnapshot>(&self.path) {
            Ok(Some(snapshot)) => {
                info!(target: TARGET_STATE, "Loaded snapshot for {} feeds from {}", snapshot.len(), self.path.display());
                snapshot
            }
            Ok(None) => FeedSnapshot::new(),
            Err(err) => {
                warn!(target: TARGET_STATE, "Could not load snapshot, starting empty: {}", err);
                FeedSnapshot::new()
            }
        }
    }

    pub fn save(&self, snapshot: &FeedSnapshot) -> Result<()> {
        write_json(&self.path, snapshot)?;
        debug!(target: TARGET_STATE, "Snapshot saved to {}", self.path.display());
        Ok(())
    }
}
