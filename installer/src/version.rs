//! Release version newtype.
//!
//! A version is opaque to the installer: it is never parsed as a semantic
//! version, only spliced into distribution URLs and cache directory names.
//! Construction therefore rejects anything that could change the shape of
//! a URL path or escape a directory.

use std::fmt;
use thiserror::Error;

/// Characters that would alter URL or filesystem structure.
const FORBIDDEN: &[char] = &['/', '\\', '?', '#', '&', '%'];

/// Errors arising from an unusable version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version \"{value}\": {reason}")]
pub struct VersionError {
    /// The rejected version string.
    pub value: String,
    /// Description of the validation failure.
    pub reason: String,
}

/// An opaque release identifier such as `1.0.7` or `0.15.0-beta2`.
///
/// # Examples
///
/// ```
/// use tfinstall::version::Version;
///
/// let version: Version = "1.0.7".try_into().expect("valid version");
/// assert_eq!(version.as_str(), "1.0.7");
/// assert!(Version::try_from("../1.0.7").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    /// Return the version as a string slice.
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

impl TryFrom<&str> for Version {
    type Error = VersionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_version(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_version(&value)?;
        Ok(Self(value))
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_version(value: &str) -> Result<(), VersionError> {
    let reject = |reason: &str| VersionError {
        value: value.to_owned(),
        reason: reason.to_owned(),
    };
    if value.is_empty() {
        return Err(reject("version must not be empty"));
    }
    if value == "." || value == ".." {
        return Err(reject("version must not be a relative path component"));
    }
    if let Some(bad) = value.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(VersionError {
            value: value.to_owned(),
            reason: format!("forbidden character '{bad}'"),
        });
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(reject("version must not contain whitespace"));
    }
    Ok(())
}
