use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use drivesync_core::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const UNDEFINED_CHANGE_STAMP: i64 = -1;
const NANOS_PER_SEC: u32 = 1_000_000_000;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The two values carried from one run to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermarks {
    pub last_sync: Timestamp,
    pub change_stamp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    last_sync: Timestamp,
    change_stamp: i64,
}

/// Reads the state file. A missing or unreadable file starts over from the
/// epoch so the next merge re-evaluates every remote entry.
pub fn load(path: &Path) -> Watermarks {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no state file, starting from epoch");
            return Watermarks::default();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read state file, starting from epoch");
            return Watermarks::default();
        }
    };
    match serde_json::from_str::<StateRecord>(&text) {
        Ok(record) if record.last_sync.nsec >= NANOS_PER_SEC => {
            warn!(
                path = %path.display(),
                nsec = record.last_sync.nsec,
                "nanoseconds out of range in state file, starting from epoch"
            );
            Watermarks::default()
        }
        Ok(record) => Watermarks {
            last_sync: record.last_sync,
            change_stamp: (record.change_stamp != UNDEFINED_CHANGE_STAMP)
                .then_some(record.change_stamp),
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed state file, starting from epoch");
            Watermarks::default()
        }
    }
}

pub fn save(path: &Path, watermarks: &Watermarks) -> Result<(), PersistError> {
    let record = StateRecord {
        last_sync: watermarks.last_sync,
        change_stamp: watermarks.change_stamp.unwrap_or(UNDEFINED_CHANGE_STAMP),
    };
    let body = serde_json::to_vec_pretty(&record)?;
    let partial = partial_path(path);
    fs::write(&partial, body).map_err(|source| PersistError::Io {
        path: partial.clone(),
        source,
    })?;
    fs::rename(&partial, path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}
