//! Resolution of the directory a release binary is installed into.

use crate::error::{AcquireError, Result};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix for install directories created on the caller's behalf.
const CREATED_DIR_PREFIX: &str = "tfexec";

/// Directory receiving the extracted executable, tagged with who owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallDirectory {
    /// Supplied by the caller. Never removed.
    Caller(PathBuf),
    /// Created by this call. It outlives a successful acquisition, but is
    /// removed if the acquisition fails.
    Created(PathBuf),
}

impl InstallDirectory {
    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Caller(path) | Self::Created(path) => path,
        }
    }

    /// Whether the directory was created by this call.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// Remove a created directory after a failed acquisition. Caller
    /// directories are left untouched.
    pub(crate) fn discard(&self) {
        if let Self::Created(path) = self {
            if let Err(err) = fs::remove_dir_all(path) {
                warn!("failed to remove install directory {}: {err}", path.display());
            }
        }
    }
}

/// Resolve the install directory for one acquisition.
///
/// With no path, a fresh uniquely named temporary directory is created and
/// kept after return. A supplied path must already exist and be a
/// directory; it is never created.
///
/// # Errors
///
/// Returns [`AcquireError::DirectoryUnavailable`] when the supplied path
/// cannot be accessed or is not a directory, or when a temporary directory
/// cannot be created.
///
/// # Examples
///
/// ```
/// use tfinstall::install_dir::resolve_install_dir;
///
/// let dir = resolve_install_dir(None).expect("temporary directory");
/// assert!(dir.is_created());
/// assert!(dir.path().is_dir());
/// # std::fs::remove_dir_all(dir.path()).expect("cleanup");
/// ```
pub fn resolve_install_dir(requested: Option<&Path>) -> Result<InstallDirectory> {
    let Some(path) = requested else {
        let created = tempfile::Builder::new()
            .prefix(CREATED_DIR_PREFIX)
            .tempdir()
            .map_err(|source| AcquireError::DirectoryUnavailable {
                path: std::env::temp_dir(),
                source,
            })?
            .keep();
        debug!("created install directory {}", created.display());
        return Ok(InstallDirectory::Created(created));
    };

    let metadata = fs::metadata(path).map_err(|source| AcquireError::DirectoryUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(AcquireError::DirectoryUnavailable {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        });
    }
    Ok(InstallDirectory::Caller(path.to_path_buf()))
}
