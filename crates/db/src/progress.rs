//! Resumable scan progress.

use crate::error::PersistenceError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Progress of a scan over a fixed block range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    /// Every block up to and including this one is fully recorded.
    pub last_completed_block: Option<u64>,
}

impl ScanState {
    /// First block still to scan for a range starting at `range_start`.
    pub fn resume_from(&self, range_start: u64) -> u64 {
        match self.last_completed_block {
            Some(block) if block >= range_start => block.saturating_add(1),
            _ => range_start,
        }
    }
}

/// Single-number progress file holding `last_completed_block`.
#[derive(Debug, Clone)]
pub struct ProgressFile {
    path: PathBuf,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. A missing or unreadable file means nothing
    /// has been completed yet.
    pub fn load(&self) -> ScanState {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No progress file at {}", self.path.display());
                return ScanState::default();
            }
            Err(e) => {
                warn!("Ignoring unreadable progress file {}: {}", self.path.display(), e);
                return ScanState::default();
            }
        };

        match contents.trim().parse::<u64>() {
            Ok(block) => ScanState {
                last_completed_block: Some(block),
            },
            Err(_) => {
                warn!(
                    "Ignoring corrupt progress file {}: {:?}",
                    self.path.display(),
                    contents.trim()
                );
                ScanState::default()
            }
        }
    }

    /// Durably replace the stored block number.
    pub fn save(&self, last_completed_block: u64) -> Result<(), PersistenceError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = File::create(&tmp).map_err(|e| PersistenceError::io(&tmp, e))?;
        file.write_all(last_completed_block.to_string().as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| PersistenceError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| PersistenceError::io(&self.path, e))?;
        Ok(())
    }
}
