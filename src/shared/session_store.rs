//! Session records, one JSON file per local document.
//!
//! A record ties a local file to the session state it was committed with, so
//! successive `cf commit` runs start from the latest baseline and branch.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dirs;
use super::env_var::EnvVars;
use crate::commit::SessionState;

/// Number of retry attempts for acquiring the record lock.
const LOCK_RETRY_COUNT: u32 = 10;

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Could not determine a state directory (set COMMITFLOW_STATE_DIR or HOME)")]
    NoStateDir,

    #[error("No session for {0}; run `cf open` first")]
    NotFound(PathBuf),

    #[error("Session record {path} is corrupted: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Timed out waiting for the lock on {0}")]
    LockTimeout(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Local copy of the document.
    pub file: PathBuf,
    pub state: SessionState,
    pub saved_at: DateTime<Utc>,
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$COMMITFLOW_STATE_DIR`, or `$XDG_STATE_HOME/commitflow/sessions`.
    pub fn open_default() -> Result<Self, SessionError> {
        if let Some(dir) = EnvVars::load().state_dir {
            return Ok(Self::new(dir));
        }
        dirs::state_dir()
            .map(|d| Self::new(d.join("commitflow").join("sessions")))
            .ok_or(SessionError::NoStateDir)
    }

    fn record_path(&self, file: &Path) -> Result<PathBuf, SessionError> {
        let absolute = std::path::absolute(file)?;
        let key = utf8_percent_encode(&absolute.to_string_lossy(), NON_ALPHANUMERIC).to_string();
        Ok(self.dir.join(format!("{key}.json")))
    }

    pub fn load(&self, file: &Path) -> Result<SessionRecord, SessionError> {
        let path = self.record_path(file)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(file.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|source| SessionError::Parse { path, source })
    }

    /// Write the record atomically: temp file, then rename, under an exclusive lock.
    pub fn save(&self, file: &Path, state: &SessionState) -> Result<SessionRecord, SessionError> {
        let path = self.record_path(file)?;
        fs::create_dir_all(&self.dir)?;

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.with_extension("json.lock"))?;
        acquire_lock(&lock_file, &path)?;

        let record = SessionRecord {
            file: std::path::absolute(file)?,
            state: state.clone(),
            saved_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&record)
            .map_err(|source| SessionError::Parse {
                path: path.clone(),
                source,
            })?;

        let temp_path = path.with_extension("json.tmp");
        let mut temp_file = File::create(&temp_path)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!(record = %path.display(), "session saved");
        Ok(record)
    }
}

fn acquire_lock(file: &File, path: &Path) -> Result<(), SessionError> {
    for attempt in 0..LOCK_RETRY_COUNT {
        match file.try_lock() {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {
                if attempt < LOCK_RETRY_COUNT - 1 {
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
    }
    Err(SessionError::LockTimeout(path.to_path_buf()))
}
