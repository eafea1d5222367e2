//! SHA-256 digests and checksum manifest lookup.
//!
//! A checksum manifest (`SHA256SUMS`) holds one `<hex>  <filename>` entry
//! per line, as written by `sha256sum`. Only the entry for the file being
//! fetched is ever read; the rest of the manifest stays opaque.

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A SHA-256 digest is not a valid 64-character hex string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid SHA-256 digest: {reason}")]
pub struct DigestError {
    /// Description of the validation failure.
    pub reason: String,
}

/// A validated hex-encoded SHA-256 digest string.
///
/// # Examples
///
/// ```
/// use tfinstall::fetch::checksum::Sha256Digest;
///
/// let hex = "a".repeat(64);
/// let digest: Sha256Digest = hex.as_str().try_into().unwrap();
/// assert_eq!(digest.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Compute the digest of an in-memory buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use tfinstall::fetch::checksum::Sha256Digest;
    ///
    /// let digest = Sha256Digest::of_bytes(b"");
    /// assert!(digest.as_str().starts_with("e3b0c442"));
    /// ```
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(bytes))
    }

    /// Finish a running hash.
    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        // sha2 always produces valid 64-char lowercase hex.
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_sha256(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_sha256(&value)?;
        Ok(Self(value))
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate that `value` is a well-formed hex-encoded SHA-256 digest.
fn validate_sha256(value: &str) -> Result<(), DigestError> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(DigestError {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(DigestError {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(DigestError {
            reason: "digest must be lowercase".to_owned(),
        });
    }
    Ok(())
}

/// Find the digest recorded for `filename` in a checksum manifest.
///
/// Entries may mark binary mode with a leading `*` and may prefix the
/// filename with `./`. Hex digits are compared case-insensitively. Lines
/// for other files are not validated.
///
/// # Errors
///
/// Returns [`DigestError`] when the entry for `filename` exists but its
/// digest is malformed.
///
/// # Examples
///
/// ```
/// use tfinstall::fetch::checksum::find_entry;
///
/// let hex = "b".repeat(64);
/// let manifest = format!("{hex}  terraform_1.0.7_linux_amd64.zip\n");
/// let digest = find_entry(manifest.as_bytes(), "terraform_1.0.7_linux_amd64.zip")
///     .unwrap()
///     .expect("entry present");
/// assert_eq!(digest.as_str(), hex);
/// ```
pub fn find_entry(manifest: &[u8], filename: &str) -> Result<Option<Sha256Digest>, DigestError> {
    let text = String::from_utf8_lossy(manifest);
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(hex), Some(name), None) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        let name = name.trim_start_matches('*');
        let name = name.strip_prefix("./").unwrap_or(name);
        if name == filename {
            return Sha256Digest::try_from(hex.to_ascii_lowercase()).map(Some);
        }
    }
    Ok(None)
}
