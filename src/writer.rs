use crate::error::{Error, Result};
use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::debug;

/// Persists completion responses over their source files.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Writer {
    backup_existing: bool,
}

impl Writer {
    pub(crate) const fn new(backup_existing: bool) -> Self {
        Self { backup_existing }
    }

    /// Replaces `path` with `content` atomically.
    ///
    /// A symlink is followed and its target is replaced, so the link itself
    /// survives.
    ///
    /// # Process
    ///
    /// 1. Copies the current file to a timestamped backup if enabled
    /// 2. Writes content to a sibling temporary file with the same permissions
    /// 3. Syncs the temporary file to disk
    /// 4. Renames it over the target
    pub(crate) fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let target = resolve_symlink(path)?;
        let path = target.as_path();

        let existing = fs::metadata(path).ok();

        if existing.is_some() && self.backup_existing {
            self.backup_file(path)?;
        }

        let temp_path = sibling(path, ".vamp.tmp")?;
        let mut temp_file =
            fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        let written = temp_file
            .write_all(content)
            .and_then(|()| temp_file.sync_all())
            .and_then(|()| match &existing {
                Some(meta) => fs::set_permissions(&temp_path, meta.permissions()),
                None => Ok(()),
            });

        drop(temp_file);

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(path, e));
        }

        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(&self, path: &Path) -> Result<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|e| Error::config(format!("system clock before epoch: {e}")))?
            .as_nanos();

        let backup_path = sibling(path, &format!(".backup.{timestamp}"))?;

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }
}

/// Returns the file a symlink points to, or `path` itself for anything else.
fn resolve_symlink(path: &Path) -> Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
            debug!("Writing through {} to {}", path.display(), target.display());
            Ok(target)
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("not a file path: {}", path.display())))?;

    let mut sibling_name = OsString::from(name);
    sibling_name.push(suffix);
    Ok(path.with_file_name(sibling_name))
}
