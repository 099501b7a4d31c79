//! Atomic file writes for generated configuration.
//!
//! Every on-disk mutation performed by this crate goes through these helpers:
//! content is staged into a temp file in the destination directory, then
//! renamed over the target. A reader (the overlay daemon, or another process
//! inspecting the config) never observes a partially written file, and a
//! failed write leaves any previous file untouched.

use std::fs;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};
use tempfile::NamedTempFile;

/// Errors staging or committing an atomic write.
#[derive(Debug, Snafu)]
pub enum WriteError {
    #[snafu(display("destination {} has no parent directory", path.display()))]
    NoParent { path: PathBuf },

    #[snafu(display("failed to create directory {}: {source}", path.display()))]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to stage temp file for {}: {source}", path.display()))]
    Stage { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to write staged content for {}: {source}", path.display()))]
    WriteStaged { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to rename staged file into {}: {source}", path.display()))]
    Commit { path: PathBuf, source: std::io::Error },
}

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    write_atomic_with_mode(path, contents, None)
}

/// Atomically replace `path` with `contents` and mark it executable (0o755).
pub fn write_atomic_executable(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    write_atomic_with_mode(path, contents, Some(0o755))
}

fn write_atomic_with_mode(path: &Path, contents: &[u8], mode: Option<u32>) -> Result<(), WriteError> {
    use std::io::Write;

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| WriteError::NoParent {
        path: path.to_path_buf(),
    })?;
    fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;

    let mut staged = NamedTempFile::new_in(parent).context(StageSnafu { path })?;
    staged.write_all(contents).context(WriteStagedSnafu { path })?;
    staged.flush().context(WriteStagedSnafu { path })?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(mode);
        staged.as_file().set_permissions(perms).context(WriteStagedSnafu { path })?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    staged.persist(path).map_err(|e| WriteError::Commit {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}
