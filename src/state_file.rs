//! Tracked-state persistence.
//!
//! One JSON file holding the [`StateSnapshot`] of the last pass. A missing
//! file is an empty state, not an error, so the first apply needs no setup.

use std::fs;
use std::path::Path;

use tracing::debug;

use strata_core::{Error, Result};
use strata_reconciler::StateSnapshot;

/// Load tracked state, or an empty snapshot if the file does not exist.
///
/// # Errors
///
/// [`Error::FileReadFailed`] or [`Error::JsonParseFailed`].
pub fn load(path: &Path) -> Result<StateSnapshot> {
    if !path.exists() {
        debug!(path = %path.display(), "No state file; starting empty");
        return Ok(StateSnapshot::default());
    }
    let raw =
        fs::read_to_string(path).map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    let snapshot: StateSnapshot =
        serde_json::from_str(&raw).map_err(|e| Error::json_parse_failed(path, e.to_string()))?;
    debug!(path = %path.display(), records = snapshot.records.len(), "State loaded");
    Ok(snapshot)
}

/// Persist tracked state.
///
/// # Errors
///
/// [`Error::FileWriteFailed`].
pub fn save(path: &Path, snapshot: &StateSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::file_write_failed(path, e.to_string()))?;
    fs::write(path, json).map_err(|e| Error::file_write_failed(path, e.to_string()))?;
    debug!(path = %path.display(), records = snapshot.records.len(), "State saved");
    Ok(())
}
