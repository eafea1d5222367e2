//! Mirror credentials read from a `.netrc` file.
//!
//! Private mirrors commonly sit behind HTTP basic authentication. The
//! `.netrc` file is located through the `NETRC` environment variable, then
//! `~/.netrc`. Entries are matched on the request's host name; the
//! `default` entry, when present, applies to every other host.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Environment variable naming the `.netrc` file to read.
pub const NETRC_ENV: &str = "NETRC";

/// Errors arising from reading a `.netrc` file.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid `.netrc` syntax.
    #[error("malformed netrc at line {line}: {reason}")]
    Parse {
        /// Line at which parsing stopped.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

impl From<netrc::Error> for CredentialsError {
    fn from(err: netrc::Error) -> Self {
        match err {
            netrc::Error::Io(source) => Self::Io {
                path: PathBuf::new(),
                source,
            },
            netrc::Error::Parse(reason, line) => Self::Parse { line, reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Login {
    user: String,
    password: String,
}

impl Login {
    fn from_machine(machine: netrc::Machine) -> Self {
        Self {
            user: machine.login,
            password: machine.password.unwrap_or_default(),
        }
    }

    fn basic(&self) -> String {
        let pair = format!("{}:{}", self.user, self.password);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

/// Host-keyed basic-auth credentials.
///
/// # Examples
///
/// ```
/// use tfinstall::fetch::credentials::NetrcCredentials;
///
/// let netrc = "machine mirror.test login ci password s3cret\n";
/// let credentials = NetrcCredentials::parse(netrc.as_bytes()).expect("valid netrc");
/// assert_eq!(
///     credentials.authorization("mirror.test").as_deref(),
///     Some("Basic Y2k6czNjcmV0")
/// );
/// assert_eq!(credentials.authorization("releases.hashicorp.com"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetrcCredentials {
    hosts: Vec<(String, Login)>,
    default: Option<Login>,
}

impl NetrcCredentials {
    /// Parse `.netrc` text.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Parse`] for malformed input.
    pub fn parse(source: impl BufRead) -> Result<Self, CredentialsError> {
        let parsed = netrc::Netrc::parse(source)?;
        Ok(Self {
            hosts: parsed
                .hosts
                .into_iter()
                .map(|(host, machine)| (host.to_ascii_lowercase(), Login::from_machine(machine)))
                .collect(),
            default: parsed.default.map(Login::from_machine),
        })
    }

    /// Read credentials from `path`. A missing file yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Io`] when the file exists but cannot be
    /// read, and [`CredentialsError::Parse`] when it is malformed.
    pub fn load(path: &Path) -> Result<Option<Self>, CredentialsError> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let credentials = Self::parse(std::io::BufReader::new(file)).map_err(|err| match err {
            CredentialsError::Io { source, .. } => CredentialsError::Io {
                path: path.to_path_buf(),
                source,
            },
            parse @ CredentialsError::Parse { .. } => parse,
        })?;
        debug!("loaded mirror credentials from {}", path.display());
        Ok(Some(credentials))
    }

    /// The `.netrc` file to consult: `$NETRC` when set and non-blank,
    /// otherwise `.netrc` in the home directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(NETRC_ENV).filter(|path| !path.is_empty()) {
            return Some(PathBuf::from(path));
        }
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().join(".netrc"))
    }

    /// The `Authorization` header value for `host`, if any entry applies.
    #[must_use]
    pub fn authorization(&self, host: &str) -> Option<String> {
        self.hosts
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(host))
            .map(|(_, login)| login)
            .or(self.default.as_ref())
            .map(Login::basic)
    }

    /// Whether no entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.default.is_none()
    }
}
