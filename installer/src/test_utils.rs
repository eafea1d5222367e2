//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to
//! integration tests. Nothing here touches the network.

use crate::cancel::CancellationToken;
use crate::fetch::FetchError;
use crate::fetch::checksum::Sha256Digest;
use crate::fetch::transport::Transport;
use crate::platform::Platform;
use crate::release::Release;
use crate::verify::{ManifestVerifier, TrustAnchor};
use crate::version::Version;
use pgp::composed::{
    ArmorOptions, DetachedSignature, KeyType, SecretKeyParamsBuilder, SignedSecretKey,
};
use pgp::crypto::hash::HashAlgorithm;
use pgp::ser::Serialize;
use pgp::types::Password;
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

/// Contents of the executable inside fixture archives.
pub const EXECUTABLE_CONTENTS: &[u8] = b"#!/bin/sh\necho fixture\n";

/// Build an in-memory zip archive from `(name, contents)` pairs.
///
/// Every entry is marked executable.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, contents) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    writer.finish().expect("finish zip archive").into_inner()
}

#[derive(Default)]
struct MemoryState {
    responses: HashMap<String, Vec<u8>>,
    requests: Vec<String>,
}

/// `https` transport serving canned bodies from memory.
///
/// Clones share state, so a test can keep one handle for assertions after
/// moving another into a fetch client.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// An empty transport; every URL is `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`.
    pub fn insert(&self, url: impl Into<String>, body: Vec<u8>) {
        self.lock().responses.insert(url.into(), body);
    }

    /// Stop serving `url`.
    pub fn remove(&self, url: &str) {
        self.lock().responses.remove(url);
    }

    /// Every URL opened so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Number of URLs opened so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory transport lock")
    }
}

impl Transport for MemoryTransport {
    fn scheme(&self) -> &str {
        "https"
    }

    fn open(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn Read + '_>, FetchError> {
        let mut state = self.lock();
        state.requests.push(url.to_owned());
        match state.responses.get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(FetchError::NotFound {
                locator: url.to_owned(),
            }),
        }
    }
}

/// Wraps a transport and cancels the caller's token part way through the
/// body of one URL.
///
/// The body yields `after` bytes, then the token is cancelled and the next
/// read fails with [`io::ErrorKind::TimedOut`], as a blocking read cut short
/// by the token's deadline would.
pub struct CancellingTransport<T> {
    inner: T,
    url: String,
    after: usize,
}

impl<T: Transport> CancellingTransport<T> {
    /// Cancel while reading the body at `url`, after `after` bytes.
    pub fn new(inner: T, url: impl Into<String>, after: usize) -> Self {
        Self {
            inner,
            url: url.into(),
            after,
        }
    }
}

impl<T: Transport> Transport for CancellingTransport<T> {
    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    fn open(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Read + '_>, FetchError> {
        let body = self.inner.open(url, cancel)?;
        if url != self.url {
            return Ok(body);
        }
        Ok(Box::new(CancellingReader {
            inner: body,
            cancel: cancel.clone(),
            remaining: self.after,
        }))
    }
}

struct CancellingReader<R> {
    inner: R,
    cancel: CancellationToken,
    remaining: usize,
}

impl<R: Read> Read for CancellingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            self.cancel.cancel();
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        let len = buf.len().min(self.remaining);
        let read = self.inner.read(&mut buf[..len])?;
        self.remaining -= read;
        Ok(read)
    }
}

/// Generate a throwaway Ed25519 OpenPGP signing key.
fn generate_signing_key() -> SignedSecretKey {
    let mut params = SecretKeyParamsBuilder::default();
    params
        .key_type(KeyType::Ed25519Legacy)
        .can_certify(true)
        .can_sign(true)
        .primary_user_id("Release Fixture <fixture@example.test>".to_owned());
    params
        .build()
        .expect("fixture key parameters")
        .generate(rand::thread_rng())
        .expect("generate fixture key")
}

/// A complete signed release for one platform, signed with a throwaway key
/// generated per fixture.
#[derive(Debug, Clone)]
pub struct ReleaseFixture {
    version: Version,
    platform: Platform,
    anchor_armor: String,
    archive: Vec<u8>,
    sums: Vec<u8>,
    signature: Vec<u8>,
}

impl ReleaseFixture {
    /// Build and sign a release of `version` for `(os, arch)`.
    pub fn new(version: &str, os: &str, arch: &str) -> Self {
        let version = Version::try_from(version).expect("fixture version");
        let platform = Platform::new(os, arch);
        let archive = zip_archive(&[
            (platform.executable_name(), EXECUTABLE_CONTENTS),
            ("LICENSE.txt", b"fixture licence\n"),
        ]);
        let signing_key = generate_signing_key();
        let anchor_armor = signing_key
            .to_public_key()
            .to_armored_string(ArmorOptions::default())
            .expect("armor fixture key");
        let mut fixture = Self {
            version,
            platform,
            anchor_armor,
            archive,
            sums: Vec::new(),
            signature: Vec::new(),
        };
        fixture.sums = fixture.manifest_for(&fixture.archive);
        fixture.signature = DetachedSignature::sign_binary_data(
            rand::thread_rng(),
            &signing_key.primary_key,
            &Password::empty(),
            HashAlgorithm::Sha256,
            fixture.sums.as_slice(),
        )
        .expect("sign fixture manifest")
        .to_bytes()
        .expect("serialize fixture signature");
        fixture
    }

    /// Replace the archive without re-signing, as a tampered mirror would.
    #[must_use]
    pub fn with_archive(mut self, archive: Vec<u8>) -> Self {
        self.archive = archive;
        self
    }

    /// Replace the signature bytes.
    #[must_use]
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Flip one bit of the signature.
    #[must_use]
    pub fn with_flipped_signature_bit(mut self, byte: usize, bit: u8) -> Self {
        self.signature[byte] ^= 1 << bit;
        self
    }

    /// The release version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The platform the archive was built for.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The release as published under `base_url`.
    pub fn release(&self, base_url: &str) -> Release {
        Release::new(base_url, self.version.clone())
    }

    /// Filename of the platform archive.
    pub fn archive_name(&self) -> String {
        self.release("https://unused.test").artifact_filename(&self.platform)
    }

    /// Archive bytes.
    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    /// Checksum manifest bytes.
    pub fn sums(&self) -> &[u8] {
        &self.sums
    }

    /// Binary OpenPGP detached signature over [`Self::sums`].
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// ASCII-armoured fixture public key.
    pub fn anchor_armor(&self) -> &str {
        &self.anchor_armor
    }

    /// Trust anchor holding the fixture public key.
    pub fn trust_anchor(&self) -> TrustAnchor {
        TrustAnchor::from_armor(self.anchor_armor.clone())
    }

    /// Verifier trusting the fixture key.
    pub fn verifier(&self) -> ManifestVerifier {
        ManifestVerifier::new(self.trust_anchor())
    }

    /// Publish the manifest, signature and archive on `transport` under
    /// `base_url`.
    pub fn serve(&self, transport: &MemoryTransport, base_url: &str) {
        let release = self.release(base_url);
        transport.insert(release.sums_url(), self.sums.clone());
        transport.insert(release.signature_url(), self.signature.clone());
        let artifact = release.artifact_locator(&self.platform);
        transport.insert(artifact.url(), self.archive.clone());
    }

    fn manifest_for(&self, archive: &[u8]) -> Vec<u8> {
        let release = self.release("https://unused.test");
        let other = Platform::new("plan9", "mips");
        format!(
            "{}  {}\n{}  {}\n",
            Sha256Digest::of_bytes(b"another platform"),
            release.artifact_filename(&other),
            Sha256Digest::of_bytes(archive),
            release.artifact_filename(&self.platform),
        )
        .into_bytes()
    }
}
