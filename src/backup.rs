// 💾 Pre-migration backup
//
// Before any schema change the database file is copied to a sibling path
// (`<db>.bak` unless configured otherwise). The copy lands in a temp file
// first, is checked against the source with SHA-256, and only then replaces
// the previous backup. One backup is kept; each run overwrites it.

use crate::db::Store;
use crate::error::{LedgerError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `ledger.db` -> `ledger.db.bak`
pub fn default_backup_path(database: &Path) -> PathBuf {
    let mut name = database
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger.db".into());
    name.push(".bak");
    database.with_file_name(name)
}

/// Copy the store's database file to `target` (or the default sibling path).
///
/// Returns the backup location, or `None` when there is nothing on disk to
/// protect (in-memory store, file not created yet).
pub fn backup_database(store: &Store, target: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(database) = store.path() else {
        debug!("in-memory store, no backup needed");
        return Ok(None);
    };
    if !database.exists() {
        debug!(path = %database.display(), "database file not on disk yet, no backup needed");
        return Ok(None);
    }

    let backup = target
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_backup_path(database));
    let failed = |source: io::Error| LedgerError::Backup {
        database: database.to_path_buf(),
        backup: backup.clone(),
        source,
    };

    // Pull WAL pages into the main file so the copy is complete
    store
        .checkpoint()
        .map_err(|e| failed(io::Error::other(e.to_string())))?;

    copy_verified(database, &backup).map_err(failed)?;

    info!(backup = %backup.display(), "database backed up");
    Ok(Some(backup))
}

fn copy_verified(source: &Path, target: &Path) -> io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    let staging = target.with_file_name(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    fs::copy(source, &staging)?;

    let expected = sha256_file(source)?;
    let actual = sha256_file(&staging)?;
    if expected != actual {
        let _ = fs::remove_file(&staging);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("backup digest mismatch: expected {}, got {}", expected, actual),
        ));
    }

    fs::rename(&staging, target)
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
