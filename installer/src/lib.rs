//! Verified acquisition of signed Terraform release binaries.
//!
//! Given a version string, this crate fetches the release's checksum
//! manifest and its detached signature, verifies the signature against an
//! embedded trust anchor, then downloads the platform archive, checks it
//! against the verified manifest and extracts the executable into an
//! install directory. Nothing reaches the install directory before both
//! checks pass.
//!
//! ```no_run
//! let terraform = tfinstall::acquire("1.0.7", None).expect("acquire terraform");
//! println!("installed {}", terraform.display());
//! ```
//!
//! # Modules
//!
//! - [`acquire`] - Acquisition orchestrator
//! - [`cache`] - Executable cache for test harnesses
//! - [`cancel`] - Cooperative cancellation token
//! - [`config`] - Installer configuration (TOML and environment)
//! - [`error`] - Acquisition error taxonomy
//! - [`fetch`] - Fetch client, transports, locators and extraction
//! - [`install_dir`] - Install directory resolution
//! - [`platform`] - Target platform naming
//! - [`release`] - Distribution URL layout
//! - [`verify`] - Manifest signature verification
//! - [`version`] - Release version newtype

pub mod acquire;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fetch;
pub mod install_dir;
pub mod platform;
pub mod release;
pub mod verify;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use acquire::{Installer, acquire};
pub use error::{AcquireError, Result};
