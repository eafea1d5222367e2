//! On-disk cache of acquired executables for test harnesses.
//!
//! Suites that run against several releases map a key (a version such as
//! `1.0.7`, or a git ref such as `refs/heads/main`) to a cached executable:
//!
//! - `{root}/versions/{version}/terraform`
//! - `{root}/refs/{sanitised ref}/terraform`
//!
//! Versions are acquired on a miss. Git refs are lookup-only: something
//! else must have placed a build there. Acquisitions of the same key are
//! serialised across processes with an exclusive lock file.

use crate::acquire::Installer;
use crate::cancel::CancellationToken;
use crate::error::AcquireError;
use crate::version::Version;
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const REF_PREFIX: &str = "refs/";
const LOCK_FILE: &str = ".tfinstall.lock";

/// Errors arising from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key cannot name a cache entry.
    #[error("invalid cache key \"{key}\": {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The key is not cached and cannot be acquired on demand.
    #[error("{key} is not cached")]
    NotCached {
        /// The missing key.
        key: CacheKey,
    },

    /// Cache directory or lock file I/O failed.
    #[error("cache I/O failed at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Acquiring a missing version failed.
    #[error(transparent)]
    Acquire(#[from] AcquireError),
}

/// Identifies one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A published release version.
    Version(Version),
    /// A git ref such as `refs/heads/main`.
    GitRef(String),
}

impl CacheKey {
    /// Parse a key: strings starting with `refs/` are git refs, anything
    /// else must be a valid version.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] for an empty ref or an invalid
    /// version.
    ///
    /// # Examples
    ///
    /// ```
    /// use tfinstall::cache::CacheKey;
    ///
    /// assert!(matches!(CacheKey::parse("1.0.7"), Ok(CacheKey::Version(_))));
    /// assert!(matches!(CacheKey::parse("refs/heads/main"), Ok(CacheKey::GitRef(_))));
    /// ```
    pub fn parse(raw: &str) -> Result<Self, CacheError> {
        if raw.starts_with(REF_PREFIX) {
            let key = Self::GitRef(raw.to_owned());
            key.directory_name()?;
            return Ok(key);
        }
        Version::try_from(raw)
            .map(Self::Version)
            .map_err(|err| CacheError::InvalidKey {
                key: raw.to_owned(),
                reason: err.reason,
            })
    }

    /// Path of this entry relative to the cache root.
    fn relative_dir(&self) -> Result<PathBuf, CacheError> {
        Ok(match self {
            Self::Version(version) => Path::new("versions").join(version.as_str()),
            Self::GitRef(_) => Path::new("refs").join(self.directory_name()?),
        })
    }

    /// Single path component naming this entry.
    fn directory_name(&self) -> Result<String, CacheError> {
        match self {
            Self::Version(version) => Ok(version.as_str().to_owned()),
            Self::GitRef(raw) => {
                let name: String = raw
                    .strip_prefix(REF_PREFIX)
                    .unwrap_or(raw)
                    .chars()
                    .map(|c| {
                        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                            c
                        } else {
                            '_'
                        }
                    })
                    .collect();
                if name.is_empty() || name.chars().all(|c| c == '.') {
                    return Err(CacheError::InvalidKey {
                        key: raw.clone(),
                        reason: "ref does not name a branch, tag or commit".to_owned(),
                    });
                }
                Ok(name)
            }
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(version) => write!(f, "version {version}"),
            Self::GitRef(raw) => write!(f, "git ref {raw}"),
        }
    }
}

/// Cache of executables keyed by [`CacheKey`].
pub struct ExecutableCache {
    root: PathBuf,
    installer: Installer,
}

impl ExecutableCache {
    /// A cache rooted at `root`, acquiring misses with `installer`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, installer: Installer) -> Self {
        Self {
            root: root.into(),
            installer,
        }
    }

    /// The platform cache directory for this crate, if the platform has
    /// one.
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        directories_next::ProjectDirs::from("io", "tfinstall", "tfinstall")
            .map(|dirs| dirs.cache_dir().to_path_buf())
    }

    /// The cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the cached executable for `key` without acquiring anything.
    #[must_use]
    pub fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let executable = self
            .root
            .join(key.relative_dir().ok()?)
            .join(self.installer.platform().executable_name());
        executable.is_file().then_some(executable)
    }

    /// Return the cached executable for `key`, acquiring a missing version.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotCached`] for a missing git ref,
    /// [`CacheError::Io`] when the entry or its lock cannot be created, and
    /// [`CacheError::Acquire`] when acquisition fails.
    pub fn get(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        self.get_with_cancel(key, &CancellationToken::new())
    }

    /// As [`Self::get`], passing `cancel` to the acquisition.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub fn get_with_cancel(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, CacheError> {
        if let Some(executable) = self.lookup(key) {
            debug!("cache hit for {key}: {}", executable.display());
            return Ok(executable);
        }
        let CacheKey::Version(version) = key else {
            return Err(CacheError::NotCached { key: key.clone() });
        };

        let entry = self.root.join(key.relative_dir()?);
        create_dir(&entry)?;
        let lock_path = entry.join(LOCK_FILE);
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| CacheError::Io {
                path: lock_path.clone(),
                source,
            })?;
        fs2::FileExt::lock_exclusive(&lock).map_err(|source| CacheError::Io {
            path: lock_path.clone(),
            source,
        })?;

        // Another process may have finished while we waited for the lock.
        if let Some(executable) = self.lookup(key) {
            return Ok(executable);
        }
        info!("cache miss for {key}; acquiring into {}", entry.display());
        let executable = self
            .installer
            .acquire_with_cancel(version.as_str(), Some(&entry), cancel)?;
        Ok(executable)
    }
}

fn create_dir(path: &Path) -> Result<(), CacheError> {
    fs::create_dir_all(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerConfig;
    use crate::fetch::FetchClient;
    use crate::test_utils::{EXECUTABLE_CONTENTS, MemoryTransport, ReleaseFixture};
    use rstest::rstest;

    const BASE_URL: &str = "https://mirror.test/terraform";

    fn cache_with(
        transport: &MemoryTransport,
        fixture: &ReleaseFixture,
        root: &Path,
    ) -> ExecutableCache {
        let config = InstallerConfig {
            base_url: BASE_URL.to_owned(),
            ..InstallerConfig::default()
        };
        let installer = Installer::with_parts(
            config,
            fixture.platform().clone(),
            FetchClient::new().with_transport(transport.clone()),
            fixture.verifier(),
        );
        ExecutableCache::new(root, installer)
    }

    #[rstest]
    #[case::heads("refs/heads/main", "heads_main")]
    #[case::tags("refs/tags/v1.0.7", "tags_v1.0.7")]
    #[case::odd_characters("refs/pull/12/head:x", "pull_12_head_x")]
    fn git_refs_map_to_single_directory(#[case] raw: &str, #[case] expected: &str) {
        let key = CacheKey::parse(raw).expect("valid ref");
        assert_eq!(
            key.relative_dir().expect("dir"),
            Path::new("refs").join(expected)
        );
    }

    #[rstest]
    #[case::bare_prefix("refs/")]
    #[case::dot_dot("refs/..")]
    #[case::bad_version("1.0.7/../x")]
    #[case::empty("")]
    fn rejects_unusable_keys(#[case] raw: &str) {
        assert!(matches!(
            CacheKey::parse(raw),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn version_miss_is_acquired_then_served_from_disk() {
        let fixture = ReleaseFixture::new("1.0.7", "linux", "amd64");
        let transport = MemoryTransport::new();
        fixture.serve(&transport, BASE_URL);
        let root = tempfile::tempdir().expect("cache root");
        let cache = cache_with(&transport, &fixture, root.path());
        let key = CacheKey::parse("1.0.7").expect("key");

        let first = cache.get(&key).expect("acquire");
        let requests_after_first = transport.request_count();
        let second = cache.get(&key).expect("cached");

        assert_eq!(first, root.path().join("versions/1.0.7/terraform"));
        assert_eq!(first, second);
        assert_eq!(fs::read(&first).expect("read"), EXECUTABLE_CONTENTS);
        assert_eq!(transport.request_count(), requests_after_first);
    }

    #[test]
    fn missing_git_ref_is_not_cached() {
        let fixture = ReleaseFixture::new("1.0.7", "linux", "amd64");
        let transport = MemoryTransport::new();
        let root = tempfile::tempdir().expect("cache root");
        let cache = cache_with(&transport, &fixture, root.path());
        let key = CacheKey::parse("refs/heads/main").expect("key");

        assert!(matches!(
            cache.get(&key),
            Err(CacheError::NotCached { .. })
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn prebuilt_git_ref_is_found() {
        let fixture = ReleaseFixture::new("1.0.7", "linux", "amd64");
        let transport = MemoryTransport::new();
        let root = tempfile::tempdir().expect("cache root");
        let built = root.path().join("refs/heads_main/terraform");
        fs::create_dir_all(built.parent().expect("parent")).expect("mkdir");
        fs::write(&built, b"built").expect("write");
        let cache = cache_with(&transport, &fixture, root.path());

        let key = CacheKey::parse("refs/heads/main").expect("key");
        assert_eq!(cache.get(&key).expect("hit"), built);
    }

    #[test]
    fn failed_acquisition_leaves_no_executable() {
        let fixture = ReleaseFixture::new("1.0.7", "linux", "amd64");
        let transport = MemoryTransport::new();
        let root = tempfile::tempdir().expect("cache root");
        let cache = cache_with(&transport, &fixture, root.path());
        let key = CacheKey::parse("1.0.7").expect("key");

        assert!(matches!(cache.get(&key), Err(CacheError::Acquire(_))));
        assert!(cache.lookup(&key).is_none());
    }
}
