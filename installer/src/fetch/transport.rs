//! Byte transports keyed by URL scheme.
//!
//! A transport only knows how to open a readable stream for a URL. Checksum
//! enforcement, staging and extraction live in the fetch client so that
//! every transport gets them for free.

use super::FetchError;
use super::credentials::NetrcCredentials;
use crate::cancel::CancellationToken;
use log::debug;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Opens byte streams for URLs of one scheme.
pub trait Transport: Send + Sync {
    /// The URL scheme served by this transport, e.g. `https`.
    fn scheme(&self) -> &str;

    /// Open a stream over the body located at `url`.
    ///
    /// Blocking work, including reads from the returned stream, must not
    /// outlive the deadline of `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] when the resource does not exist,
    /// [`FetchError::Cancelled`] when `cancel` fired while connecting, and
    /// [`FetchError::Transport`] for any other failure to connect.
    fn open(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Read + '_>, FetchError>;
}

/// HTTPS transport backed by a `ureq` agent.
///
/// The agent refuses plain `http` URLs and sends a fixed `User-Agent`. Each
/// request gets one timeout covering connect, TLS and body: the configured
/// timeout, shortened to whatever is left of the cancellation deadline.
/// Hosts listed in the `.netrc` credentials get an `Authorization` header.
pub struct HttpsTransport {
    agent: ureq::Agent,
    timeout: Duration,
    credentials: Option<NetrcCredentials>,
}

impl HttpsTransport {
    /// Create a transport with the given timeout and `User-Agent` value.
    #[must_use]
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .https_only(true)
            .user_agent(user_agent)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            timeout,
            credentials: None,
        }
    }

    /// Send basic-auth credentials to the hosts listed in `credentials`.
    #[must_use]
    pub fn with_credentials(mut self, credentials: NetrcCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The `Authorization` header value for `url`, if its host has
    /// credentials.
    fn authorization(&self, url: &str) -> Option<String> {
        let credentials = self.credentials.as_ref()?;
        let uri = url.parse::<ureq::http::Uri>().ok()?;
        credentials.authorization(uri.host()?)
    }
}

impl Transport for HttpsTransport {
    fn scheme(&self) -> &str {
        "https"
    }

    fn open(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Read + '_>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                locator: url.to_owned(),
            });
        }
        let timeout = cancel.clamp(self.timeout);
        let mut request = self
            .agent
            .get(url)
            .config()
            .timeout_global(Some(timeout))
            .build();
        if let Some(authorization) = self.authorization(url) {
            debug!("sending netrc credentials for {url}");
            request = request.header("Authorization", authorization);
        }
        let response = request
            .call()
            .map_err(|err| map_ureq_error(url, &err, cancel))?;
        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Map a ureq error to a [`FetchError`].
///
/// Any failure once `cancel` has fired is reported as cancellation.
fn map_ureq_error(url: &str, err: &ureq::Error, cancel: &CancellationToken) -> FetchError {
    match err {
        _ if cancel.is_cancelled() => FetchError::Cancelled {
            locator: url.to_owned(),
        },
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            locator: url.to_owned(),
        },
        other => FetchError::Transport {
            locator: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Transport for `file://` URLs, serving a local mirror directory tree.
pub struct FileTransport;

impl Transport for FileTransport {
    fn scheme(&self) -> &str {
        "file"
    }

    fn open(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn Read + '_>, FetchError> {
        let path = url
            .strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| FetchError::InvalidLocator {
                locator: url.to_owned(),
                reason: "expected a file:// URL".to_owned(),
            })?;
        match std::fs::File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                locator: url.to_owned(),
            }),
            Err(err) => Err(FetchError::Transport {
                locator: url.to_owned(),
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const SUMS_URL: &str = "https://example.test/SHA256SUMS";

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let err = ureq::Error::StatusCode(404);
        let mapped = map_ureq_error(SUMS_URL, &err, &CancellationToken::new());
        assert!(matches!(mapped, FetchError::NotFound { .. }));
    }

    #[test]
    fn map_ureq_error_maps_other_status_to_transport_error() {
        let err = ureq::Error::StatusCode(500);
        let mapped = map_ureq_error(SUMS_URL, &err, &CancellationToken::new());
        assert!(
            matches!(mapped, FetchError::Transport { ref locator, .. } if locator == SUMS_URL),
            "{mapped}"
        );
    }

    #[test]
    fn timeout_after_deadline_is_cancellation() {
        let err = ureq::Error::Timeout(ureq::Timeout::Global);
        let cancel = CancellationToken::with_deadline(Instant::now());
        let mapped = map_ureq_error(SUMS_URL, &err, &cancel);
        assert!(
            matches!(mapped, FetchError::Cancelled { ref locator } if locator == SUMS_URL),
            "{mapped}"
        );
    }

    #[test]
    fn timeout_before_deadline_is_a_transport_error() {
        let err = ureq::Error::Timeout(ureq::Timeout::Global);
        let cancel = CancellationToken::with_timeout(Duration::from_secs(3600));
        let mapped = map_ureq_error(SUMS_URL, &err, &cancel);
        assert!(matches!(mapped, FetchError::Transport { .. }), "{mapped}");
    }

    #[test]
    fn https_transport_refuses_plain_http() {
        let transport = HttpsTransport::new(Duration::from_secs(1), "tfinstall-test");
        let result = transport.open("http://127.0.0.1:9/SHA256SUMS", &CancellationToken::new());
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }

    #[test]
    fn expired_deadline_cancels_the_request() {
        let transport = HttpsTransport::new(Duration::from_secs(30), "tfinstall-test");
        let cancel = CancellationToken::with_deadline(Instant::now());
        let result = transport.open("https://127.0.0.1:9/SHA256SUMS", &cancel);
        assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    }

    #[test]
    fn credentials_are_only_offered_to_listed_hosts() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("netrc");
        std::fs::write(&path, "machine mirror.test login ci password s3cret\n").expect("write");
        let credentials = NetrcCredentials::load(&path)
            .expect("load")
            .expect("file present");
        let transport = HttpsTransport::new(Duration::from_secs(1), "tfinstall-test")
            .with_credentials(credentials);

        assert_eq!(
            transport
                .authorization("https://mirror.test:8443/1.0.7/SHA256SUMS")
                .as_deref(),
            Some("Basic Y2k6czNjcmV0")
        );
        assert_eq!(
            transport.authorization("https://releases.hashicorp.com/terraform/1.0.7/SHA256SUMS"),
            None
        );
        assert_eq!(transport.authorization("not a url"), None);
    }

    #[test]
    fn transport_without_credentials_sends_none() {
        let transport = HttpsTransport::new(Duration::from_secs(1), "tfinstall-test");
        assert_eq!(transport.authorization("https://mirror.test/SHA256SUMS"), None);
    }

    #[test]
    fn file_transport_reads_local_files() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("SHA256SUMS");
        std::fs::write(&path, b"contents").expect("write");

        let url = format!("file://{}", path.display());
        let mut body = String::new();
        FileTransport
            .open(&url, &CancellationToken::new())
            .expect("open")
            .read_to_string(&mut body)
            .expect("read");
        assert_eq!(body, "contents");
    }

    #[test]
    fn file_transport_maps_missing_files_to_not_found() {
        let temp = tempfile::tempdir().expect("temp dir");
        let url = format!("file://{}", temp.path().join("absent").display());
        assert!(matches!(
            FileTransport.open(&url, &CancellationToken::new()),
            Err(FetchError::NotFound { .. })
        ));
    }
}
