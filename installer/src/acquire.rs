//! Acquisition orchestrator.
//!
//! Runs the pipeline that turns a version string into the path of a
//! verified executable:
//!
//! 1. resolve the install directory;
//! 2. create a scratch directory;
//! 3. fetch the checksum manifest into scratch;
//! 4. fetch its detached signature into scratch;
//! 5. verify the signature against the trust anchor;
//! 6. build the artifact locator, pinned to the verified manifest;
//! 7. fetch and extract the archive into the install directory;
//! 8. return the executable's path.
//!
//! The ordering is the security property. Nothing is fetched for the
//! artifact until the manifest has verified, and the artifact's checksum is
//! taken from those same verified bytes. The scratch directory is dropped on
//! every exit path.

use crate::cancel::CancellationToken;
use crate::config::InstallerConfig;
use crate::error::{AcquireError, FetchStep, Result};
use crate::fetch::locator::{ChecksumRef, Locator};
use crate::fetch::client::MANIFEST_LIMIT;
use crate::fetch::{FetchClient, FetchError, Fetcher};
use crate::install_dir::{InstallDirectory, resolve_install_dir};
use crate::platform::Platform;
use crate::release::Release;
use crate::verify::ManifestVerifier;
use crate::version::Version;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix for per-call scratch directories.
const SCRATCH_PREFIX: &str = "tfinstall";

/// Acquires verified release binaries for one platform.
///
/// An `Installer` holds no mutable state and may be shared between threads;
/// concurrent acquisitions are independent as long as each uses its own
/// install directory.
pub struct Installer {
    config: InstallerConfig,
    platform: Platform,
    fetcher: Box<dyn Fetcher>,
    verifier: ManifestVerifier,
}

impl Installer {
    /// Build an installer for the running host using HTTPS and the embedded
    /// trust anchor.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::UnsupportedPlatform`] when no release is
    /// published for the host.
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let platform = Platform::current()?;
        let fetcher = FetchClient::https(&config);
        Ok(Self::with_parts(
            config,
            platform,
            fetcher,
            ManifestVerifier::release(),
        ))
    }

    /// Build an installer from explicit collaborators.
    ///
    /// This constructor exists so tests and embedders can inject a fetcher,
    /// a verifier, or a platform other than the host's.
    #[must_use]
    pub fn with_parts(
        config: InstallerConfig,
        platform: Platform,
        fetcher: impl Fetcher + 'static,
        verifier: ManifestVerifier,
    ) -> Self {
        Self {
            config,
            platform,
            fetcher: Box::new(fetcher),
            verifier,
        }
    }

    /// The platform releases are acquired for.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Acquire `version` into `install_dir`, or into a fresh temporary
    /// directory when `None`, and return the path of the executable.
    ///
    /// # Errors
    ///
    /// See [`AcquireError`]. On failure no executable is left behind in a
    /// directory this call created, and the scratch directory is removed.
    pub fn acquire(&self, version: &str, install_dir: Option<&Path>) -> Result<PathBuf> {
        self.acquire_with_cancel(version, install_dir, &CancellationToken::new())
    }

    /// As [`Self::acquire`], observing `cancel` before each step and while
    /// streaming.
    ///
    /// # Errors
    ///
    /// As for [`Self::acquire`]. Cancellation surfaces as
    /// [`AcquireError::FetchFailed`] wrapping [`FetchError::Cancelled`].
    pub fn acquire_with_cancel(
        &self,
        version: &str,
        install_dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let version = Version::try_from(version)?;
        let target = resolve_install_dir(install_dir)?;
        info!(
            "acquiring terraform {version} for {} into {}",
            self.platform,
            target.path().display()
        );

        match self.run(&version, &target, cancel) {
            Ok(executable) => {
                info!("installed {}", executable.display());
                Ok(executable)
            }
            Err(err) => {
                warn!("acquisition of terraform {version} failed: {err}");
                target.discard();
                Err(err)
            }
        }
    }

    fn run(
        &self,
        version: &Version,
        target: &InstallDirectory,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let release = Release::new(&self.config.base_url, version.clone());
        let scratch = self.scratch_dir()?;

        let sums_url = release.sums_url();
        let sums_path = scratch.path().join(release.sums_filename());
        self.fetch_to_scratch(FetchStep::Manifest, &sums_url, &sums_path, cancel)?;

        let signature_url = release.signature_url();
        let signature_path = scratch.path().join(release.signature_filename());
        self.fetch_to_scratch(FetchStep::Signature, &signature_url, &signature_path, cancel)?;

        let manifest = read_scratch(&sums_path)?;
        let signature = read_scratch(&signature_path)?;
        let verified = self
            .verifier
            .verify_manifest(&sums_url, manifest, &signature)
            .map_err(AcquireError::SignatureInvalid)?;
        debug!("verified {sums_url}");

        let locator = release
            .artifact_locator(&self.platform)
            .with_checksum(ChecksumRef::verified(verified));
        checkpoint(FetchStep::Artifact, locator.url(), cancel)?;
        let extracted = self
            .fetcher
            .fetch_and_extract(&locator, target.path(), cancel)
            .map_err(|err| {
                AcquireError::from_fetch(FetchStep::Artifact, locator.to_string(), err)
            })?;
        debug!("extracted {extracted:?}");

        let executable = target.path().join(self.platform.executable_name());
        if !executable.is_file() {
            return Err(AcquireError::ExecutableMissing { path: executable });
        }
        Ok(executable)
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| AcquireError::Scratch { source })?;
        debug!("using scratch directory {}", scratch.path().display());
        Ok(scratch)
    }

    fn fetch_to_scratch(
        &self,
        step: FetchStep,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        checkpoint(step, url, cancel)?;
        let locator = Locator::new(url).with_size_limit(MANIFEST_LIMIT);
        let written = self
            .fetcher
            .fetch_file(&locator, dest, cancel)
            .map_err(|err| AcquireError::from_fetch(step, url, err))?;
        debug!("fetched {step} ({written} bytes) from {url}");
        Ok(())
    }
}

/// Acquire `version` for the running host with default configuration.
///
/// # Errors
///
/// See [`Installer::acquire`].
pub fn acquire(version: &str, install_dir: Option<&Path>) -> Result<PathBuf> {
    Installer::new(InstallerConfig::default())?.acquire(version, install_dir)
}

fn checkpoint(step: FetchStep, url: &str, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AcquireError::FetchFailed {
            step,
            locator: url.to_owned(),
            source: FetchError::Cancelled {
                locator: url.to_owned(),
            },
        });
    }
    Ok(())
}

fn read_scratch(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| AcquireError::Scratch { source })
}

#[cfg(test)]
#[path = "acquire_tests.rs"]
mod tests;
