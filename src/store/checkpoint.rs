//! Checkpoint persistence for the folded ledger state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

/// The folded state at a known journal position.
///
/// On open, only journal lines after `offset` need to be applied. `hash`
/// is the xxh64 of the last line folded in and guards against a journal
/// that was rewritten underneath the checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Checkpoint<S> {
    pub state: S,
    pub offset: u64,
    pub hash: String,
}

impl<S> Checkpoint<S> {
    pub(crate) fn new(state: S, offset: u64, hash: String) -> Self {
        Checkpoint {
            state,
            offset,
            hash,
        }
    }
}

/// Serialize into a sibling `.json.tmp`, sync it, then rename over `path`
/// so a reader sees either the old checkpoint or the new one.
pub(crate) fn save<S: Serialize>(path: &Path, checkpoint: &Checkpoint<S>) -> io::Result<()> {
    let staging = path.with_extension("json.tmp");
    let mut writer = BufWriter::new(File::create(&staging)?);
    serde_json::to_writer(&mut writer, checkpoint)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(&staging, path)
}

/// `Ok(None)` when missing or unparsable; either way the caller rebuilds
/// from the journal. Read failures other than a missing file are errors.
pub(crate) fn load<S: DeserializeOwned>(path: &Path) -> io::Result<Option<Checkpoint<S>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(checkpoint) => Ok(Some(checkpoint)),
        Err(e) if e.is_io() => Err(e.into()),
        Err(e) => {
            log::warn!("ignoring unreadable checkpoint {}: {e}", path.display());
            Ok(None)
        }
    }
}
