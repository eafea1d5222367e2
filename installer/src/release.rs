//! Distribution URL layout for a release.
//!
//! Every release lives under `{base}/{version}/` and carries a checksum
//! manifest, its detached signature, and one zip archive per platform.

use crate::fetch::locator::{ChecksumRef, Locator};
use crate::platform::Platform;
use crate::version::Version;

/// Product name used in every release filename.
pub const PRODUCT: &str = "terraform";

/// A single release on a distribution point.
///
/// # Examples
///
/// ```
/// use tfinstall::release::Release;
/// use tfinstall::version::Version;
///
/// let version = Version::try_from("1.0.7").expect("valid version");
/// let release = Release::new("https://releases.example.test/terraform/", version);
/// assert_eq!(
///     release.sums_url(),
///     "https://releases.example.test/terraform/1.0.7/terraform_1.0.7_SHA256SUMS"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    base_url: String,
    version: Version,
}

impl Release {
    /// Describe `version` as published under `base_url`.
    ///
    /// Trailing slashes on `base_url` are ignored.
    #[must_use]
    pub fn new(base_url: &str, version: Version) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            version,
        }
    }

    /// The release version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Directory URL holding every file of this release.
    #[must_use]
    pub fn directory_url(&self) -> String {
        format!("{}/{}", self.base_url, self.version)
    }

    /// Filename of the checksum manifest.
    #[must_use]
    pub fn sums_filename(&self) -> String {
        format!("{PRODUCT}_{}_SHA256SUMS", self.version)
    }

    /// Filename of the manifest's detached signature.
    #[must_use]
    pub fn signature_filename(&self) -> String {
        format!("{}.sig", self.sums_filename())
    }

    /// URL of the checksum manifest.
    #[must_use]
    pub fn sums_url(&self) -> String {
        format!("{}/{}", self.directory_url(), self.sums_filename())
    }

    /// URL of the manifest's detached signature.
    #[must_use]
    pub fn signature_url(&self) -> String {
        format!("{}/{}", self.directory_url(), self.signature_filename())
    }

    /// Filename of the archive for `platform`.
    #[must_use]
    pub fn artifact_filename(&self, platform: &Platform) -> String {
        format!("{PRODUCT}_{}_{platform}.zip", self.version)
    }

    /// Locator for the archive for `platform`, constrained by the entry in
    /// this release's checksum manifest.
    #[must_use]
    pub fn artifact_locator(&self, platform: &Platform) -> Locator {
        let url = format!(
            "{}/{}",
            self.directory_url(),
            self.artifact_filename(platform)
        );
        Locator::new(url).with_checksum(ChecksumRef::file(self.sums_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const BASE: &str = "https://releases.hashicorp.com/terraform";

    #[fixture]
    fn release() -> Release {
        Release::new(BASE, Version::try_from("1.0.7").expect("valid version"))
    }

    #[rstest]
    fn manifest_urls_are_bit_exact(release: Release) {
        assert_eq!(
            release.sums_url(),
            "https://releases.hashicorp.com/terraform/1.0.7/terraform_1.0.7_SHA256SUMS"
        );
        assert_eq!(
            release.signature_url(),
            "https://releases.hashicorp.com/terraform/1.0.7/terraform_1.0.7_SHA256SUMS.sig"
        );
    }

    #[rstest]
    fn artifact_locator_is_bit_exact(release: Release) {
        let platform = Platform::new("linux", "amd64");
        let base = "https://releases.hashicorp.com/terraform/1.0.7";
        assert_eq!(
            release.artifact_locator(&platform).to_string(),
            format!(
                "{base}/terraform_1.0.7_linux_amd64.zip\
                 ?checksum=file:{base}/terraform_1.0.7_SHA256SUMS"
            )
        );
        assert_eq!(
            release.artifact_filename(&platform),
            "terraform_1.0.7_linux_amd64.zip"
        );
    }

    #[rstest]
    #[case::one_slash("https://mirror.test/tf/")]
    #[case::many_slashes("https://mirror.test/tf///")]
    fn trailing_slashes_are_trimmed(#[case] base: &str) {
        let release = Release::new(base, Version::try_from("0.15.0").expect("valid"));
        assert_eq!(
            release.sums_url(),
            "https://mirror.test/tf/0.15.0/terraform_0.15.0_SHA256SUMS"
        );
    }

    #[rstest]
    fn artifact_locator_round_trips_through_parse(release: Release) {
        let locator = release.artifact_locator(&Platform::new("darwin", "arm64"));
        let parsed = Locator::parse(&locator.to_string()).expect("parse");
        assert_eq!(parsed, locator);
        assert_eq!(parsed.filename(), Some("terraform_1.0.7_darwin_arm64.zip"));
    }
}
