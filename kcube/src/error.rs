use std::fmt;
use std::path::PathBuf;

/// The result type returned from every fallible operation in this crate.
pub type CResult<T> = Result<T, Error>;

/// Every error kind the vault engine, sync protocol, and daemon can raise.
///
/// Variants map directly onto the error kinds in the spec's error-handling
/// section: callers (the CLI, the daemon, the UI this crate doesn't own)
/// match on `kind()`-shaped groups of these rather than on exact variants,
/// so new wrapping variants (`Io`, `Json`) can be added without breaking
/// the kind taxonomy.
#[derive(Debug)]
pub enum Error {
    /// Wraps a filesystem I/O failure.
    Io(std::io::Error),
    /// Wraps a JSON (de)serialization failure.
    Json(serde_json::Error),
    /// An engine-internal fault that doesn't fit another variant.
    Internal(String),

    NotAVault,
    AlreadyAVault(PathBuf),
    AmbiguousVersion(String),
    UnknownVersion(String),
    PathOutsideVault(PathBuf),
    MissingFileInVersion { version: String, path: String },
    CorruptStore(String),
    EmptyStagingCommit,
    ValidationFailed(String),

    Auth(String),
    NotFound(String),
    Conflict(String),
    Server { status: u16, body: String },
    Network(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
            Error::NotAVault => write!(f, "not a K-Cube vault (no .kcube found in any parent directory)"),
            Error::AlreadyAVault(p) => write!(f, "'{}' is already inside a K-Cube vault", p.display()),
            Error::AmbiguousVersion(p) => write!(f, "version prefix '{p}' matches more than one version"),
            Error::UnknownVersion(p) => write!(f, "no version matches prefix '{p}'"),
            Error::PathOutsideVault(p) => write!(f, "path '{}' is outside the vault", p.display()),
            Error::MissingFileInVersion { version, path } => {
                write!(f, "version {version} has no file '{path}'")
            }
            Error::CorruptStore(msg) => write!(f, "corrupt object store: {msg}"),
            Error::EmptyStagingCommit => write!(f, "nothing staged; commit aborted"),
            Error::ValidationFailed(msg) => write!(f, "vault validation failed: {msg}"),
            Error::Auth(msg) => write!(f, "authentication error: {msg}"),
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::Conflict(msg) => write!(f, "conflict: {msg}"),
            Error::Server { status, body } => write!(f, "server error ({status}): {body}"),
            Error::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

/// Whether this error should be treated as fatal to a worker's syncing step
/// (per spec §7: only `auth` errors and validation failures are fatal; every
/// other error is surfaced as a non-fatal `sync_error` event).
impl Error {
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}
