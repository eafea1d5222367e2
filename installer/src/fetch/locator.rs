//! Source locators with embedded checksum constraints.
//!
//! A locator is a URL that may carry a `checksum` query parameter, in the
//! form understood by the release tooling:
//!
//! - `checksum=sha256:<hex>` pins the digest directly;
//! - `checksum=file:<url>` names a checksum manifest whose entry for the
//!   located file's name must match.
//!
//! The parameter is stripped from the URL that is actually requested.

use super::FetchError;
use super::checksum::Sha256Digest;
use crate::verify::VerifiedManifest;
use std::fmt;

const CHECKSUM_PARAM: &str = "checksum=";

/// Checksum constraint attached to a [`Locator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumRef {
    /// The fetched bytes must hash to this digest.
    Sha256(Sha256Digest),
    /// The fetched bytes must hash to the entry for the located filename in
    /// the manifest at `url`.
    File {
        /// Location of the checksum manifest.
        url: String,
        /// Manifest bytes that already passed signature verification. When
        /// present the manifest is not fetched again.
        verified: Option<VerifiedManifest>,
    },
}

impl ChecksumRef {
    /// Reference an unverified manifest by URL; it is fetched on use.
    #[must_use]
    pub fn file(url: impl Into<String>) -> Self {
        Self::File {
            url: url.into(),
            verified: None,
        }
    }

    /// Reference a manifest that passed signature verification.
    #[must_use]
    pub fn verified(manifest: VerifiedManifest) -> Self {
        Self::File {
            url: manifest.source().to_owned(),
            verified: Some(manifest),
        }
    }

    fn parse(locator: &str, value: &str) -> Result<Self, FetchError> {
        let invalid = |reason: String| FetchError::InvalidLocator {
            locator: locator.to_owned(),
            reason,
        };
        let (kind, rest) = value
            .split_once(':')
            .ok_or_else(|| invalid(format!("checksum \"{value}\" has no type prefix")))?;
        match kind {
            "sha256" => Sha256Digest::try_from(rest.to_ascii_lowercase())
                .map(Self::Sha256)
                .map_err(|err| invalid(err.to_string())),
            "file" if !rest.is_empty() => Ok(Self::file(rest)),
            "file" => Err(invalid("checksum file URL is empty".to_owned())),
            other => Err(invalid(format!("unsupported checksum type \"{other}\""))),
        }
    }
}

impl fmt::Display for ChecksumRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256(digest) => write!(f, "sha256:{digest}"),
            Self::File { url, .. } => write!(f, "file:{url}"),
        }
    }
}

/// A fetchable source plus an optional checksum constraint and size limit.
///
/// The size limit is local policy and is not part of the textual form.
///
/// # Examples
///
/// ```
/// use tfinstall::fetch::locator::{ChecksumRef, Locator};
///
/// let raw = "https://example.test/1.0.7/tool.zip?checksum=file:https://example.test/1.0.7/SUMS";
/// let locator = Locator::parse(raw).expect("valid locator");
/// assert_eq!(locator.url(), "https://example.test/1.0.7/tool.zip");
/// assert_eq!(locator.filename(), Some("tool.zip"));
/// assert!(matches!(locator.checksum(), Some(ChecksumRef::File { .. })));
/// assert_eq!(locator.to_string(), raw);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    url: String,
    checksum: Option<ChecksumRef>,
    size_limit: Option<u64>,
}

impl Locator {
    /// A locator with no checksum constraint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            checksum: None,
            size_limit: None,
        }
    }

    /// Parse a locator, extracting any `checksum` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidLocator`] when the URL has no scheme or
    /// the checksum parameter is malformed.
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        if !raw.contains("://") {
            return Err(FetchError::InvalidLocator {
                locator: raw.to_owned(),
                reason: "missing URL scheme".to_owned(),
            });
        }
        let Some((base, query)) = raw.split_once('?') else {
            return Ok(Self::new(raw));
        };

        let mut checksum = None;
        let mut kept = Vec::new();
        for param in query.split('&') {
            match param.strip_prefix(CHECKSUM_PARAM) {
                Some(value) => checksum = Some(ChecksumRef::parse(raw, value)?),
                None => kept.push(param),
            }
        }
        let url = if kept.is_empty() {
            base.to_owned()
        } else {
            format!("{base}?{}", kept.join("&"))
        };
        Ok(Self {
            url,
            checksum,
            size_limit: None,
        })
    }

    /// Attach a checksum constraint, replacing any existing one.
    #[must_use]
    pub fn with_checksum(mut self, checksum: ChecksumRef) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Refuse bodies longer than `limit` bytes.
    #[must_use]
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// The largest acceptable body in bytes, if limited.
    #[must_use]
    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    /// The URL to request, without the checksum parameter.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The checksum constraint, if any.
    #[must_use]
    pub fn checksum(&self) -> Option<&ChecksumRef> {
        self.checksum.as_ref()
    }

    /// URL scheme such as `https`.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.url.split_once("://").map(|(scheme, _)| scheme)
    }

    /// Last path segment of the URL, used as the checksum manifest key.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or(self.url.as_str());
        path.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)?;
        if let Some(checksum) = &self.checksum {
            let separator = if self.url.contains('?') { '&' } else { '?' };
            write!(f, "{separator}{CHECKSUM_PARAM}{checksum}")?;
        }
        Ok(())
    }
}
