//! Manifest signature verification against the embedded trust anchor.
//!
//! The release signing key is compiled into the binary as an ASCII-armoured
//! OpenPGP public key and cannot be replaced at runtime. A checksum manifest
//! is only trusted once a detached OpenPGP signature over its exact bytes
//! verifies against the primary key or a subkey of one of the anchor's
//! certificates.

use log::debug;
use pgp::composed::{Deserializable, DetachedSignature, SignedPublicKey};
use pgp::ser::Serialize;
use pgp::types::{KeyDetails, VerifyingKey};
use std::borrow::Cow;
use std::sync::Arc;

/// HashiCorp's release signing key
/// (`C874 011F 0AB4 0511 0D02  1055 3436 5D94 72D7 468F`).
pub const RELEASE_SIGNING_KEY: &str = include_str!("../keys/hashicorp-release.asc");

const ARMOR_BEGIN: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const ARMOR_END: &str = "-----END PGP PUBLIC KEY BLOCK-----";

/// Errors arising from manifest verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The trust anchor could not be parsed.
    #[error("malformed trust anchor: {reason}")]
    MalformedAnchor {
        /// Description of the parse failure.
        reason: String,
    },

    /// The detached signature is not a well-formed OpenPGP signature.
    #[error("malformed signature: {reason}")]
    MalformedSignature {
        /// Description of the parse failure.
        reason: String,
    },

    /// No key in the trust anchor accepts the signature.
    #[error("signature does not match any of {keys} trusted key(s)")]
    NoMatchingSigner {
        /// Number of primary keys and subkeys that were tried.
        keys: usize,
    },
}

/// ASCII-armoured set of trusted OpenPGP certificates.
///
/// Holds one or more `PGP PUBLIC KEY BLOCK`s so the signing key can be
/// rotated by shipping the old and new certificates side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    armor: Cow<'static, str>,
}

impl TrustAnchor {
    /// The embedded production anchor.
    #[must_use]
    pub const fn release() -> Self {
        Self {
            armor: Cow::Borrowed(RELEASE_SIGNING_KEY),
        }
    }

    /// An anchor built from arbitrary armoured text, for tests only.
    #[cfg(any(test, feature = "test-support"))]
    #[must_use]
    pub fn from_armor(armor: impl Into<String>) -> Self {
        Self {
            armor: Cow::Owned(armor.into()),
        }
    }

    /// Parse every certificate in the anchor.
    fn certificates(&self) -> Result<Vec<SignedPublicKey>, VerifyError> {
        let mut certificates = Vec::new();
        let mut rest = self.armor.as_ref();
        while let Some(start) = rest.find(ARMOR_BEGIN) {
            let block = &rest[start..];
            let end = block
                .find(ARMOR_END)
                .ok_or_else(|| VerifyError::MalformedAnchor {
                    reason: "unterminated PGP PUBLIC KEY BLOCK".to_owned(),
                })?
                + ARMOR_END.len();
            let (certificate, _headers) =
                SignedPublicKey::from_string(&block[..end]).map_err(|err| {
                    VerifyError::MalformedAnchor {
                        reason: err.to_string(),
                    }
                })?;
            certificates.push(certificate);
            rest = &block[end..];
        }
        if certificates.is_empty() {
            return Err(VerifyError::MalformedAnchor {
                reason: "no PGP PUBLIC KEY BLOCK found".to_owned(),
            });
        }
        Ok(certificates)
    }
}

impl Default for TrustAnchor {
    fn default() -> Self {
        Self::release()
    }
}

/// Manifest bytes that passed signature verification.
///
/// Only [`ManifestVerifier::verify_manifest`] can construct one, so holding a
/// value proves the bytes were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedManifest {
    source: String,
    bytes: Arc<[u8]>,
}

impl VerifiedManifest {
    /// Where the manifest was fetched from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The verified manifest bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Checks detached manifest signatures against a [`TrustAnchor`].
///
/// Signatures are binary OpenPGP signature packets, as published next to
/// `SHA256SUMS`.
///
/// # Examples
///
/// ```
/// use tfinstall::verify::ManifestVerifier;
///
/// let verifier = ManifestVerifier::release();
/// assert!(verifier.verify(b"manifest", &[0u8; 64]).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManifestVerifier {
    anchor: TrustAnchor,
}

impl ManifestVerifier {
    /// A verifier for the given anchor.
    #[must_use]
    pub const fn new(anchor: TrustAnchor) -> Self {
        Self { anchor }
    }

    /// A verifier for the embedded production anchor.
    #[must_use]
    pub const fn release() -> Self {
        Self::new(TrustAnchor::release())
    }

    /// Verify `signature` over the exact `manifest` bytes.
    ///
    /// The anchor is parsed afresh on every call. The signature must name
    /// its issuer by key ID, and every issuer hint it carries, hashed or
    /// not, must name the key that verifies it.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MalformedAnchor`] when the anchor cannot be
    /// parsed, [`VerifyError::MalformedSignature`] when the signature is not
    /// a canonically encoded OpenPGP signature packet, and
    /// [`VerifyError::NoMatchingSigner`] when no trusted key accepts it.
    pub fn verify(&self, manifest: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
        let certificates = self.anchor.certificates()?;
        let signature = parse_signature(signature)?;

        let mut tried = 0;
        for certificate in &certificates {
            tried += 1;
            if accepts(&certificate.primary_key, &signature, manifest) {
                debug!(
                    "manifest signed by primary key {:X}",
                    certificate.primary_key.fingerprint()
                );
                return Ok(());
            }
            for subkey in &certificate.public_subkeys {
                tried += 1;
                if accepts(&subkey.key, &signature, manifest) {
                    debug!("manifest signed by subkey {:X}", subkey.key.fingerprint());
                    return Ok(());
                }
            }
        }
        Err(VerifyError::NoMatchingSigner { keys: tried })
    }

    /// Verify `manifest` and wrap it in a [`VerifiedManifest`] tagged with
    /// its `source` URL.
    ///
    /// # Errors
    ///
    /// As for [`Self::verify`].
    pub fn verify_manifest(
        &self,
        source: &str,
        manifest: Vec<u8>,
        signature: &[u8],
    ) -> Result<VerifiedManifest, VerifyError> {
        self.verify(&manifest, signature)?;
        Ok(VerifiedManifest {
            source: source.to_owned(),
            bytes: manifest.into(),
        })
    }
}

/// Parse a binary detached signature, rejecting any encoding that does not
/// re-serialize to the exact input bytes.
fn parse_signature(bytes: &[u8]) -> Result<DetachedSignature, VerifyError> {
    let malformed = |reason: String| VerifyError::MalformedSignature { reason };
    if bytes.is_empty() {
        return Err(malformed("signature is empty".to_owned()));
    }
    let signature =
        DetachedSignature::from_bytes(bytes).map_err(|err| malformed(err.to_string()))?;
    let body = signature
        .signature
        .to_bytes()
        .map_err(|err| malformed(err.to_string()))?;
    if !bytes.ends_with(&body) {
        return Err(malformed("non-canonical signature packet".to_owned()));
    }
    let critical_unhashed = signature
        .signature
        .config()
        .is_some_and(|config| config.unhashed_subpackets().any(|sp| sp.is_critical));
    if critical_unhashed {
        return Err(malformed("critical subpacket in unhashed area".to_owned()));
    }
    Ok(signature)
}

/// Whether `key` is the named issuer of `signature` and verifies it over
/// `manifest`.
fn accepts<K>(key: &K, signature: &DetachedSignature, manifest: &[u8]) -> bool
where
    K: VerifyingKey + KeyDetails,
{
    let key_ids = signature.signature.issuer_key_id();
    if key_ids.is_empty() {
        return false;
    }
    let key_id = key.legacy_key_id();
    let fingerprint = key.fingerprint();
    let issued_by_key = key_ids.iter().all(|issuer| **issuer == key_id)
        && signature
            .signature
            .issuer_fingerprint()
            .iter()
            .all(|issuer| **issuer == fingerprint);
    issued_by_key && signature.verify(key, manifest).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ReleaseFixture;
    use rstest::{fixture, rstest};

    #[fixture]
    fn fixture() -> ReleaseFixture {
        ReleaseFixture::new("1.0.7", "linux", "amd64")
    }

    #[rstest]
    fn accepts_signature_from_anchor_key(fixture: ReleaseFixture) {
        let verifier = ManifestVerifier::new(fixture.trust_anchor());
        verifier
            .verify(fixture.sums(), fixture.signature())
            .expect("signature should verify");
    }

    #[rstest]
    fn every_single_bit_flip_in_signature_is_rejected(fixture: ReleaseFixture) {
        let verifier = ManifestVerifier::new(fixture.trust_anchor());
        let original = fixture.signature().to_vec();

        for byte in 0..original.len() {
            for bit in 0..8 {
                let mut signature = original.clone();
                signature[byte] ^= 1 << bit;
                assert!(
                    verifier.verify(fixture.sums(), &signature).is_err(),
                    "flip of bit {bit} in byte {byte} was accepted"
                );
            }
        }
    }

    #[rstest]
    fn single_bit_flip_in_manifest_is_rejected(fixture: ReleaseFixture) {
        let verifier = ManifestVerifier::new(fixture.trust_anchor());
        let mut manifest = fixture.sums().to_vec();
        manifest[0] ^= 0x01;

        assert!(matches!(
            verifier.verify(&manifest, fixture.signature()),
            Err(VerifyError::NoMatchingSigner { .. })
        ));
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::not_a_packet(&[0u8; 64])]
    #[case::truncated_packet(&[0xc2, 0x40, 0x04])]
    fn malformed_signature_is_rejected(fixture: ReleaseFixture, #[case] signature: &[u8]) {
        let verifier = ManifestVerifier::new(fixture.trust_anchor());
        let err = verifier
            .verify(fixture.sums(), signature)
            .expect_err("malformed");
        assert!(matches!(err, VerifyError::MalformedSignature { .. }), "{err}");
    }

    #[rstest]
    fn production_anchor_rejects_fixture_signature(fixture: ReleaseFixture) {
        let err = ManifestVerifier::release()
            .verify(fixture.sums(), fixture.signature())
            .expect_err("foreign signer");
        assert!(matches!(err, VerifyError::NoMatchingSigner { .. }), "{err}");
    }

    #[test]
    fn production_anchor_is_the_hashicorp_release_key() {
        let certificates = TrustAnchor::release().certificates().expect("anchor");
        assert_eq!(certificates.len(), 1);
        let primary = &certificates[0].primary_key;
        assert_eq!(
            format!("{:X}", primary.fingerprint()),
            "C874011F0AB405110D02105534365D9472D7468F"
        );
        assert!(!certificates[0].public_subkeys.is_empty());
    }

    #[rstest]
    fn any_certificate_in_ring_may_sign(fixture: ReleaseFixture) {
        let ring = format!("{RELEASE_SIGNING_KEY}\n{}", fixture.anchor_armor());
        let verifier = ManifestVerifier::new(TrustAnchor::from_armor(ring));
        verifier
            .verify(fixture.sums(), fixture.signature())
            .expect("second certificate verifies");
    }

    #[rstest]
    fn key_from_another_fixture_is_not_trusted(fixture: ReleaseFixture) {
        let stranger = ReleaseFixture::new("1.0.7", "linux", "amd64");
        let verifier = ManifestVerifier::new(stranger.trust_anchor());
        assert!(matches!(
            verifier.verify(fixture.sums(), fixture.signature()),
            Err(VerifyError::NoMatchingSigner { keys: 1 })
        ));
    }

    #[rstest]
    #[case::empty("")]
    #[case::no_block("not a key")]
    #[case::unterminated("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQINBGB9\n")]
    #[case::garbage_body(
        "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n!!!!\n-----END PGP PUBLIC KEY BLOCK-----\n"
    )]
    fn malformed_anchor_fails_closed(fixture: ReleaseFixture, #[case] armor: &str) {
        let verifier = ManifestVerifier::new(TrustAnchor::from_armor(armor));
        assert!(matches!(
            verifier.verify(fixture.sums(), fixture.signature()),
            Err(VerifyError::MalformedAnchor { .. })
        ));
    }

    #[rstest]
    fn verified_manifest_keeps_source_and_bytes(fixture: ReleaseFixture) {
        let verifier = ManifestVerifier::new(fixture.trust_anchor());
        let manifest = verifier
            .verify_manifest(
                "https://mirror.test/SUMS",
                fixture.sums().to_vec(),
                fixture.signature(),
            )
            .expect("verified");
        assert_eq!(manifest.source(), "https://mirror.test/SUMS");
        assert_eq!(manifest.bytes(), fixture.sums());
    }
}
