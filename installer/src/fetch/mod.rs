//! Content retrieval with checksum enforcement.
//!
//! This module provides the fetch capability used by the acquisition
//! pipeline: a [`Fetcher`] trait with two retrieval modes, and the
//! [`FetchClient`](client::FetchClient) implementation that dispatches on
//! URL scheme to pluggable [`Transport`](transport::Transport)s.
//!
//! # Sub-modules
//!
//! - [`checksum`]: SHA-256 digest newtype and manifest entry lookup.
//! - [`client`]: scheme-dispatching fetch client.
//! - [`credentials`]: `.netrc` basic-auth credentials for mirrors.
//! - [`extraction`]: zip extraction with path traversal protection.
//! - [`locator`]: URLs with embedded checksum constraints.
//! - [`transport`]: HTTPS and local-mirror transports.

pub mod checksum;
pub mod client;
pub mod credentials;
pub mod extraction;
pub mod locator;
pub mod transport;

use crate::cancel::CancellationToken;
use checksum::Sha256Digest;
use extraction::ExtractionError;
use locator::Locator;
use std::path::Path;

/// Retrieval capability consumed by the acquisition orchestrator.
///
/// Implementations must enforce a locator's checksum constraint before
/// reporting success and must not leave a partial file at the destination
/// when they fail. They never retry.
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher: Send + Sync {
    /// Fetch a single file to `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing the transport, checksum or I/O
    /// failure, or [`FetchError::Cancelled`] once `cancel` fires.
    fn fetch_file(
        &self,
        locator: &Locator,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError>;

    /// Fetch an archive and unpack it into `dest_dir`, returning the names
    /// of the extracted files.
    ///
    /// # Errors
    ///
    /// As for [`Self::fetch_file`], plus [`FetchError::Extraction`] when the
    /// archive cannot be unpacked.
    fn fetch_and_extract(
        &self,
        locator: &Locator,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, FetchError>;
}

/// Errors arising from fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The locator could not be interpreted.
    #[error("invalid locator {locator}: {reason}")]
    InvalidLocator {
        /// The rejected locator.
        locator: String,
        /// Description of the problem.
        reason: String,
    },

    /// No transport is registered for the locator's scheme.
    #[error("no transport for scheme \"{scheme}\" in {locator}")]
    UnsupportedScheme {
        /// The requested locator.
        locator: String,
        /// The unrecognised scheme.
        scheme: String,
    },

    /// The transport failed (DNS, TLS, HTTP status, timeout, ...).
    #[error("download failed for {locator}: {reason}")]
    Transport {
        /// The URL that was requested.
        locator: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The response body exceeded the locator's size limit.
    #[error("response from {locator} exceeds {limit} bytes")]
    TooLarge {
        /// The URL that was requested.
        locator: String,
        /// The size limit in bytes.
        limit: u64,
    },

    /// The requested resource does not exist.
    #[error("not found: {locator}")]
    NotFound {
        /// The URL that was requested.
        locator: String,
    },

    /// Cancellation was observed before the fetch completed.
    #[error("fetch of {locator} cancelled")]
    Cancelled {
        /// The URL being fetched when cancellation was observed.
        locator: String,
    },

    /// The fetched bytes do not match the expected digest.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Name of the file whose checksum was checked.
        filename: String,
        /// Digest demanded by the checksum constraint.
        expected: Sha256Digest,
        /// Digest of the bytes actually received.
        actual: Sha256Digest,
    },

    /// The checksum manifest has no usable entry for the file.
    #[error("no checksum entry for {filename} in {manifest}")]
    ChecksumMissing {
        /// Name of the file being fetched.
        filename: String,
        /// Location of the manifest that was searched.
        manifest: String,
    },

    /// Local I/O failed while staging or writing the download.
    #[error("I/O error while fetching {locator}: {source}")]
    Io {
        /// The URL being fetched.
        locator: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The fetched archive could not be unpacked.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

impl FetchError {
    /// Return whether this error signals that fetched content failed an
    /// integrity check, as opposed to a transport or local failure.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::ChecksumMissing { .. }
        )
    }
}

pub use client::FetchClient;
