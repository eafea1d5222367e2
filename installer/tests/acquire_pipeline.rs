//! End-to-end tests of the acquisition pipeline over in-memory and
//! local-directory mirrors.

use rstest::{fixture, rstest};
use std::fs;
use std::path::Path;
use tfinstall::AcquireError;
use tfinstall::acquire::Installer;
use tfinstall::config::InstallerConfig;
use tfinstall::fetch::FetchClient;
use tfinstall::fetch::transport::FileTransport;
use tfinstall::test_utils::{EXECUTABLE_CONTENTS, MemoryTransport, ReleaseFixture};

const BASE_URL: &str = "https://releases.hashicorp.com/terraform";

fn installer_for(
    release: &ReleaseFixture,
    client: FetchClient,
    base_url: &str,
    scratch: &Path,
) -> Installer {
    let config = InstallerConfig {
        base_url: base_url.to_owned(),
        scratch_root: Some(scratch.to_path_buf()),
        ..InstallerConfig::default()
    };
    Installer::with_parts(
        config,
        release.platform().clone(),
        client,
        release.verifier(),
    )
}

fn served(release: &ReleaseFixture) -> MemoryTransport {
    let transport = MemoryTransport::new();
    release.serve(&transport, BASE_URL);
    transport
}

#[fixture]
fn release() -> ReleaseFixture {
    ReleaseFixture::new("1.0.7", "linux", "amd64")
}

#[rstest]
fn requests_the_published_urls_in_order(release: ReleaseFixture) {
    let transport = served(&release);
    let scratch = tempfile::tempdir().expect("scratch");
    let install = tempfile::tempdir().expect("install");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport.clone()),
        BASE_URL,
        scratch.path(),
    );

    let path = installer
        .acquire("1.0.7", Some(install.path()))
        .expect("acquire");

    assert_eq!(
        transport.requests(),
        vec![
            "https://releases.hashicorp.com/terraform/1.0.7/terraform_1.0.7_SHA256SUMS",
            "https://releases.hashicorp.com/terraform/1.0.7/terraform_1.0.7_SHA256SUMS.sig",
            "https://releases.hashicorp.com/terraform/1.0.7/terraform_1.0.7_linux_amd64.zip",
        ]
    );
    assert_eq!(path, install.path().join("terraform"));
    assert_eq!(fs::read(&path).expect("read"), EXECUTABLE_CONTENTS);
    assert_eq!(fs::read_dir(scratch.path()).expect("scratch").count(), 0);
}

#[cfg(unix)]
#[rstest]
fn installed_executable_is_executable(release: ReleaseFixture) {
    use std::os::unix::fs::PermissionsExt;

    let transport = served(&release);
    let scratch = tempfile::tempdir().expect("scratch");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport),
        BASE_URL,
        scratch.path(),
    );

    let path = installer.acquire("1.0.7", None).expect("acquire");
    let mode = fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o111, 0o111, "mode was {mode:o}");
    fs::remove_dir_all(path.parent().expect("install dir")).expect("cleanup");
}

#[rstest]
#[case::first_byte(0, 0)]
#[case::middle_byte(31, 5)]
#[case::late_byte(63, 7)]
fn any_signature_bit_flip_blocks_the_archive(
    release: ReleaseFixture,
    #[case] byte: usize,
    #[case] bit: u8,
) {
    let release = release.with_flipped_signature_bit(byte, bit);
    let transport = served(&release);
    let scratch = tempfile::tempdir().expect("scratch");
    let install = tempfile::tempdir().expect("install");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport.clone()),
        BASE_URL,
        scratch.path(),
    );

    let err = installer
        .acquire("1.0.7", Some(install.path()))
        .expect_err("signature must fail");

    assert!(matches!(err, AcquireError::SignatureInvalid(_)), "{err}");
    assert_eq!(transport.request_count(), 2);
    assert_eq!(fs::read_dir(install.path()).expect("install").count(), 0);
    assert_eq!(fs::read_dir(scratch.path()).expect("scratch").count(), 0);
}

#[rstest]
fn corrupted_archive_leaves_nothing_behind(release: ReleaseFixture) {
    let mut archive = release.archive().to_vec();
    let last = archive.len() - 1;
    archive[last] ^= 0xff;
    let release = release.with_archive(archive);
    let transport = served(&release);
    let scratch = tempfile::tempdir().expect("scratch");
    let install = tempfile::tempdir().expect("install");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport),
        BASE_URL,
        scratch.path(),
    );

    let err = installer
        .acquire("1.0.7", Some(install.path()))
        .expect_err("checksum must fail");

    assert!(
        matches!(
            err,
            AcquireError::ChecksumMismatch { ref filename, .. }
                if filename == "terraform_1.0.7_linux_amd64.zip"
        ),
        "{err}"
    );
    assert!(err.is_integrity_failure());
    assert_eq!(fs::read_dir(install.path()).expect("install").count(), 0);
    assert_eq!(fs::read_dir(scratch.path()).expect("scratch").count(), 0);
}

#[rstest]
fn platform_missing_from_manifest_is_rejected(release: ReleaseFixture) {
    let transport = served(&release);
    let other = ReleaseFixture::new("1.0.7", "darwin", "arm64");
    let scratch = tempfile::tempdir().expect("scratch");
    let install = tempfile::tempdir().expect("install");
    transport.insert(
        format!("{BASE_URL}/1.0.7/{}", other.archive_name()),
        other.archive().to_vec(),
    );
    let installer = installer_for(
        &other,
        FetchClient::new().with_transport(transport.clone()),
        BASE_URL,
        scratch.path(),
    );

    let err = installer
        .acquire("1.0.7", Some(install.path()))
        .expect_err("no entry for darwin");

    assert!(matches!(err, AcquireError::ChecksumMissing { .. }), "{err}");
    assert_eq!(transport.request_count(), 2);
}

#[rstest]
fn missing_signature_is_a_fetch_failure(release: ReleaseFixture) {
    let transport = served(&release);
    transport.remove(&format!(
        "{BASE_URL}/1.0.7/terraform_1.0.7_SHA256SUMS.sig"
    ));
    let scratch = tempfile::tempdir().expect("scratch");
    let install = tempfile::tempdir().expect("install");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport),
        BASE_URL,
        scratch.path(),
    );

    let err = installer
        .acquire("1.0.7", Some(install.path()))
        .expect_err("signature missing");

    assert!(
        matches!(
            err,
            AcquireError::FetchFailed {
                step: tfinstall::error::FetchStep::Signature,
                ..
            }
        ),
        "{err}"
    );
    assert!(!err.is_integrity_failure());
    assert_eq!(fs::read_dir(scratch.path()).expect("scratch").count(), 0);
}

#[rstest]
fn unavailable_directory_makes_no_requests(release: ReleaseFixture) {
    let transport = served(&release);
    let scratch = tempfile::tempdir().expect("scratch");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport.clone()),
        BASE_URL,
        scratch.path(),
    );
    let missing = scratch.path().join("no-such-dir");

    let err = installer
        .acquire("1.0.7", Some(&missing))
        .expect_err("directory missing");

    assert!(matches!(err, AcquireError::DirectoryUnavailable { .. }), "{err}");
    assert_eq!(transport.request_count(), 0);
}

#[rstest]
fn acquisition_is_repeatable_into_fresh_directories(release: ReleaseFixture) {
    let transport = served(&release);
    let scratch = tempfile::tempdir().expect("scratch");
    let first = tempfile::tempdir().expect("first");
    let second = tempfile::tempdir().expect("second");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(transport),
        BASE_URL,
        scratch.path(),
    );

    let a = installer.acquire("1.0.7", Some(first.path())).expect("first");
    let b = installer.acquire("1.0.7", Some(second.path())).expect("second");

    assert_ne!(a, b);
    assert_eq!(
        fs::read(&a).expect("read first"),
        fs::read(&b).expect("read second")
    );
}

#[cfg(unix)]
#[rstest]
fn local_directory_mirror_is_supported(release: ReleaseFixture) {
    let mirror = tempfile::tempdir().expect("mirror");
    let version_dir = mirror.path().join("1.0.7");
    fs::create_dir_all(&version_dir).expect("mkdir");
    fs::write(version_dir.join("terraform_1.0.7_SHA256SUMS"), release.sums()).expect("sums");
    fs::write(
        version_dir.join("terraform_1.0.7_SHA256SUMS.sig"),
        release.signature(),
    )
    .expect("sig");
    fs::write(version_dir.join(release.archive_name()), release.archive()).expect("archive");
    let base_url = format!("file://{}", mirror.path().display());
    let scratch = tempfile::tempdir().expect("scratch");
    let install = tempfile::tempdir().expect("install");
    let installer = installer_for(
        &release,
        FetchClient::new().with_transport(FileTransport),
        &base_url,
        scratch.path(),
    );

    let path = installer
        .acquire("1.0.7", Some(install.path()))
        .expect("acquire from local mirror");
    assert_eq!(fs::read(&path).expect("read"), EXECUTABLE_CONTENTS);
}
