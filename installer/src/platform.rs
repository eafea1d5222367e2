//! Target platform naming for release artifacts.
//!
//! Release archives are keyed by operating system and CPU architecture
//! using the distribution's own vocabulary (`darwin`, `amd64`, ...), not
//! Rust's. The host platform is translated at runtime from
//! [`std::env::consts`].

use std::fmt;
use thiserror::Error;

/// Host operating systems with published release archives, as
/// `(rust name, distribution name)` pairs.
const OS_NAMES: &[(&str, &str)] = &[
    ("linux", "linux"),
    ("macos", "darwin"),
    ("windows", "windows"),
    ("freebsd", "freebsd"),
    ("openbsd", "openbsd"),
    ("solaris", "solaris"),
];

/// Host architectures with published release archives.
const ARCH_NAMES: &[(&str, &str)] = &[
    ("x86_64", "amd64"),
    ("aarch64", "arm64"),
    ("x86", "386"),
    ("arm", "arm"),
];

/// Error returned when the host has no published release archive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported platform {os}/{arch}")]
pub struct PlatformError {
    /// Host operating system as reported by Rust.
    pub os: String,
    /// Host architecture as reported by Rust.
    pub arch: String,
}

/// An (operating system, architecture) pair in distribution naming.
///
/// # Examples
///
/// ```
/// use tfinstall::platform::Platform;
///
/// let platform = Platform::new("linux", "amd64");
/// assert_eq!(platform.to_string(), "linux_amd64");
/// assert_eq!(platform.executable_name(), "terraform");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Build a platform from distribution names, e.g. `("darwin", "arm64")`.
    ///
    /// No validation is applied so that artifacts for other hosts can be
    /// fetched.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Resolve the platform of the running process.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the host operating system or
    /// architecture has no release archive.
    pub fn current() -> Result<Self, PlatformError> {
        Self::from_rust_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Translate Rust target names into distribution names.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] for unknown names.
    pub fn from_rust_names(os: &str, arch: &str) -> Result<Self, PlatformError> {
        let unsupported = || PlatformError {
            os: os.to_owned(),
            arch: arch.to_owned(),
        };
        let dist_os = lookup(OS_NAMES, os).ok_or_else(unsupported)?;
        let dist_arch = lookup(ARCH_NAMES, arch).ok_or_else(unsupported)?;
        Ok(Self::new(dist_os, dist_arch))
    }

    /// Operating system in distribution naming.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Architecture in distribution naming.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// File name of the executable inside the release archive.
    #[must_use]
    pub fn executable_name(&self) -> &'static str {
        if self.os == "windows" {
            "terraform.exe"
        } else {
            "terraform"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

fn lookup(table: &[(&str, &'static str)], rust_name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == rust_name)
        .map(|(_, dist)| *dist)
}
