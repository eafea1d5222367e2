//! Error types for the acquisition pipeline.
//!
//! [`AcquireError`] is the single error surfaced by
//! [`Installer::acquire`](crate::acquire::Installer::acquire). Each variant
//! names the stage that failed and carries the path or URL involved, so a
//! caller can tell a tampered release from a flaky network.

use crate::fetch::FetchError;
use crate::fetch::checksum::Sha256Digest;
use crate::platform::PlatformError;
use crate::verify::VerifyError;
use crate::version::VersionError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline fetch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    /// The checksum manifest.
    Manifest,
    /// The manifest's detached signature.
    Signature,
    /// The release archive.
    Artifact,
}

impl fmt::Display for FetchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manifest => "manifest",
            Self::Signature => "signature",
            Self::Artifact => "artifact",
        })
    }
}

/// Errors that can occur while acquiring a release binary.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The install directory does not exist or is not a usable directory.
    #[error("install directory {path} is unavailable: {source}")]
    DirectoryUnavailable {
        /// The directory that was requested.
        path: PathBuf,
        /// Why it could not be used.
        #[source]
        source: std::io::Error,
    },

    /// The scratch directory holding the manifest and signature could not
    /// be created or read back.
    #[error("scratch directory I/O failed: {source}")]
    Scratch {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A download failed for a reason other than an integrity check.
    #[error("{step} fetch failed for {locator}")]
    FetchFailed {
        /// Which pipeline fetch failed.
        step: FetchStep,
        /// The locator that was requested.
        locator: String,
        /// The underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// The manifest signature did not verify against the trust anchor.
    #[error("manifest signature is invalid: {0}")]
    SignatureInvalid(#[source] VerifyError),

    /// The archive digest does not match its verified manifest entry.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The archive filename.
        filename: String,
        /// Digest recorded in the verified manifest.
        expected: Sha256Digest,
        /// Digest of the downloaded bytes.
        actual: Sha256Digest,
    },

    /// The verified manifest has no entry for the archive.
    #[error("verified manifest has no checksum entry for {filename}")]
    ChecksumMissing {
        /// The archive filename.
        filename: String,
    },

    /// The archive unpacked cleanly but did not contain the executable.
    #[error("archive did not contain the executable at {path}")]
    ExecutableMissing {
        /// Where the executable was expected.
        path: PathBuf,
    },

    /// The running host has no published build.
    #[error(transparent)]
    UnsupportedPlatform(#[from] PlatformError),

    /// The requested version cannot be used to build release URLs.
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),
}

impl AcquireError {
    /// Wrap a fetch failure for `step`, lifting integrity failures into their
    /// own variants.
    #[must_use]
    pub fn from_fetch(step: FetchStep, locator: impl Into<String>, source: FetchError) -> Self {
        match source {
            FetchError::ChecksumMismatch {
                filename,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                filename,
                expected,
                actual,
            },
            FetchError::ChecksumMissing { filename, .. } => Self::ChecksumMissing { filename },
            source => Self::FetchFailed {
                step,
                locator: locator.into(),
                source,
            },
        }
    }

    /// Return whether this error means the release failed a signature or
    /// checksum check, rather than being unreachable.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            Self::SignatureInvalid(_)
            | Self::ChecksumMismatch { .. }
            | Self::ChecksumMissing { .. } => true,
            Self::FetchFailed { source, .. } => source.is_integrity_failure(),
            _ => false,
        }
    }

    /// Return whether this error was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed {
                source: FetchError::Cancelled { .. },
                ..
            }
        )
    }
}

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, AcquireError>;
