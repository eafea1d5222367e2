//! Scheme-dispatching fetch client.
//!
//! Every body is streamed in fixed-size chunks into a temporary file while
//! being hashed. The cancellation token is polled between chunks. Only once
//! the digest satisfies the locator's checksum constraint is the temporary
//! file renamed to its destination (exact-file mode) or handed to the
//! archive extractor (directory mode). On any failure the temporary file is
//! dropped, so nothing partial is left behind.

use super::checksum::{self, Sha256Digest};
use super::credentials::NetrcCredentials;
use super::extraction::{ArchiveExtractor, ZipExtractor};
use super::locator::{ChecksumRef, Locator};
use super::transport::{HttpsTransport, Transport};
use super::{FetchError, Fetcher};
use crate::cancel::CancellationToken;
use crate::config::InstallerConfig;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// Size of each read from a response body.
const CHUNK_SIZE: usize = 8192;

/// Upper bound on a checksum manifest or its signature.
pub const MANIFEST_LIMIT: u64 = 1024 * 1024;

/// Digest a fetched file must match.
struct Expected {
    filename: String,
    digest: Sha256Digest,
}

/// Fetch client that routes each locator to the transport registered for
/// its URL scheme.
///
/// # Examples
///
/// ```
/// use tfinstall::config::InstallerConfig;
/// use tfinstall::fetch::FetchClient;
///
/// let client = FetchClient::https(&InstallerConfig::default());
/// // Use client.fetch_file(...) / client.fetch_and_extract(...) in production
/// ```
pub struct FetchClient {
    transports: Vec<Box<dyn Transport>>,
    extractor: Box<dyn ArchiveExtractor>,
}

impl FetchClient {
    /// A client with no transports and the zip extractor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
            extractor: Box::new(ZipExtractor),
        }
    }

    /// A client serving `https` URLs with the configured timeout and
    /// `User-Agent`, plus any `.netrc` credentials.
    ///
    /// A `.netrc` file that cannot be read is logged and ignored.
    #[must_use]
    pub fn https(config: &InstallerConfig) -> Self {
        let mut transport = HttpsTransport::new(config.timeout(), &config.user_agent);
        if let Some(credentials) = load_credentials(config) {
            transport = transport.with_credentials(credentials);
        }
        Self::new().with_transport(transport)
    }

    /// Register a transport. A later transport for the same scheme shadows
    /// an earlier one.
    #[must_use]
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.insert(0, Box::new(transport));
        self
    }

    /// Replace the archive extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    fn transport_for(&self, url: &str) -> Result<&dyn Transport, FetchError> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| FetchError::InvalidLocator {
                locator: url.to_owned(),
                reason: "missing URL scheme".to_owned(),
            })?;
        self.transports
            .iter()
            .find(|transport| transport.scheme() == scheme)
            .map(|transport| transport.as_ref())
            .ok_or_else(|| FetchError::UnsupportedScheme {
                locator: url.to_owned(),
                scheme: scheme.to_owned(),
            })
    }

    /// Stream the body at `url` into `sink`, returning its length and digest.
    fn stream(
        &self,
        url: &str,
        sink: &mut dyn Write,
        cancel: &CancellationToken,
        limit: Option<u64>,
    ) -> Result<(u64, Sha256Digest), FetchError> {
        ensure_active(url, cancel)?;
        let transport = self.transport_for(url)?;
        let mut body = transport.open(url, cancel)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut total: u64 = 0;

        loop {
            ensure_active(url, cancel)?;
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    ensure_active(url, cancel)?;
                    return Err(FetchError::Transport {
                        locator: url.to_owned(),
                        reason: err.to_string(),
                    });
                }
            };
            total += read as u64;
            if let Some(limit) = limit.filter(|limit| total > *limit) {
                return Err(FetchError::TooLarge {
                    locator: url.to_owned(),
                    limit,
                });
            }
            let chunk = &buffer[..read];
            hasher.update(chunk);
            sink.write_all(chunk).map_err(|source| FetchError::Io {
                locator: url.to_owned(),
                source,
            })?;
        }
        sink.flush().map_err(|source| FetchError::Io {
            locator: url.to_owned(),
            source,
        })?;

        debug!("fetched {total} bytes from {url}");
        Ok((total, Sha256Digest::from_hasher(hasher)))
    }

    /// Resolve the digest demanded by the locator's checksum constraint.
    fn expected_digest(
        &self,
        locator: &Locator,
        cancel: &CancellationToken,
    ) -> Result<Option<Expected>, FetchError> {
        let Some(constraint) = locator.checksum() else {
            return Ok(None);
        };
        match constraint {
            ChecksumRef::Sha256(digest) => Ok(Some(Expected {
                filename: locator.filename().unwrap_or(locator.url()).to_owned(),
                digest: digest.clone(),
            })),
            ChecksumRef::File { url, verified } => {
                let filename = locator
                    .filename()
                    .ok_or_else(|| FetchError::InvalidLocator {
                        locator: locator.to_string(),
                        reason: "locator has no file name to look up".to_owned(),
                    })?
                    .to_owned();
                let fetched;
                let manifest = match verified {
                    Some(manifest) => manifest.bytes(),
                    None => {
                        let mut buffer = Vec::new();
                        self.stream(url, &mut buffer, cancel, Some(MANIFEST_LIMIT))?;
                        fetched = buffer;
                        fetched.as_slice()
                    }
                };
                let missing = || FetchError::ChecksumMissing {
                    filename: filename.clone(),
                    manifest: url.clone(),
                };
                let digest = match checksum::find_entry(manifest, &filename) {
                    Ok(Some(digest)) => digest,
                    Ok(None) => return Err(missing()),
                    Err(err) => {
                        warn!("malformed checksum entry for {filename} in {url}: {err}");
                        return Err(missing());
                    }
                };
                Ok(Some(Expected { filename, digest }))
            }
        }
    }

    /// Download `locator` into `sink` and enforce the expected digest.
    fn download(
        &self,
        locator: &Locator,
        sink: &mut dyn Write,
        expected: Option<&Expected>,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        let (written, actual) = self.stream(locator.url(), sink, cancel, locator.size_limit())?;
        if let Some(expected) = expected {
            if expected.digest != actual {
                return Err(FetchError::ChecksumMismatch {
                    filename: expected.filename.clone(),
                    expected: expected.digest.clone(),
                    actual,
                });
            }
            debug!("checksum verified for {}", expected.filename);
        }
        Ok(written)
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for FetchClient {
    fn fetch_file(
        &self,
        locator: &Locator,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        let expected = self.expected_digest(locator, cancel)?;
        let io_error = |source| FetchError::Io {
            locator: locator.to_string(),
            source,
        };
        let parent = dest
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
        let written = self.download(locator, staged.as_file_mut(), expected.as_ref(), cancel)?;
        staged.persist(dest).map_err(|err| io_error(err.error))?;
        Ok(written)
    }

    fn fetch_and_extract(
        &self,
        locator: &Locator,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, FetchError> {
        let expected = self.expected_digest(locator, cancel)?;
        let mut staged = tempfile::Builder::new()
            .prefix("tfinstall-archive")
            .tempfile()
            .map_err(|source| FetchError::Io {
                locator: locator.to_string(),
                source,
            })?;
        self.download(locator, staged.as_file_mut(), expected.as_ref(), cancel)?;
        ensure_active(locator.url(), cancel)?;
        let extracted = self.extractor.extract(staged.path(), dest_dir)?;
        debug!(
            "extracted {} file(s) from {} into {}",
            extracted.len(),
            locator.url(),
            dest_dir.display()
        );
        Ok(extracted)
    }
}

/// Credentials from the configured `.netrc`, falling back to `$NETRC` and
/// `~/.netrc`.
fn load_credentials(config: &InstallerConfig) -> Option<NetrcCredentials> {
    let path = config.netrc.clone().or_else(NetrcCredentials::default_path)?;
    match NetrcCredentials::load(&path) {
        Ok(credentials) => credentials.filter(|credentials| !credentials.is_empty()),
        Err(err) => {
            warn!("ignoring netrc credentials: {err}");
            None
        }
    }
}

fn ensure_active(url: &str, cancel: &CancellationToken) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled {
            locator: url.to_owned(),
        });
    }
    Ok(())
}
