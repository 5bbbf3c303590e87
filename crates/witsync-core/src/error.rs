use std::fmt;
use std::io;
use std::path::PathBuf;

/// Machine-readable error codes for operator-friendly reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingSetting,
    ConfigParseError,
    InvalidConfig,
    WorkItemNotFound,
    TransportFailed,
    HttpStatus,
    MalformedResponse,
    Unsupported,
    AttachmentIo,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingSetting => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidConfig => "E1003",
            Self::WorkItemNotFound => "E2001",
            Self::TransportFailed => "E4001",
            Self::HttpStatus => "E4002",
            Self::MalformedResponse => "E4003",
            Self::Unsupported => "E4004",
            Self::AttachmentIo => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingSetting => "Required connection setting missing",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidConfig => "Invalid configuration value",
            Self::WorkItemNotFound => "Work item not found",
            Self::TransportFailed => "Network transport failure",
            Self::HttpStatus => "Service returned an error status",
            Self::MalformedResponse => "Malformed service response",
            Self::Unsupported => "Operation not supported by service",
            Self::AttachmentIo => "Attachment file I/O failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::MissingSetting => {
                Some("Pass the flag, export the environment variable, or set it in config.toml.")
            }
            Self::ConfigParseError => Some("Fix syntax in the witsync config.toml and retry."),
            Self::InvalidConfig => Some("Check the value against `witsync --help`."),
            Self::WorkItemNotFound => None,
            Self::TransportFailed => Some("Check network access to the organization URL."),
            Self::HttpStatus => {
                Some("Check the PAT scopes (Work Items: Read & Write) and the project name.")
            }
            Self::MalformedResponse => Some("Verify the organization URL points at Azure DevOps."),
            Self::Unsupported => None,
            Self::AttachmentIo => Some("Check disk space and permissions on the attachments dir."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures of a single remote call. Never retried by the engine.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The service answered with a non-2xx status.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The operation is not available for this item or service configuration.
    #[error("{0} is not supported")]
    Unsupported(String),

    /// The work item does not exist.
    #[error("work item #{0} not found")]
    NotFound(u64),
}

impl ServiceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } => ErrorCode::TransportFailed,
            Self::Status { .. } => ErrorCode::HttpStatus,
            Self::Decode { .. } => ErrorCode::MalformedResponse,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::NotFound(_) => ErrorCode::WorkItemNotFound,
        }
    }
}

/// Errors surfaced by the replication engine and its configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A required connection parameter was not supplied by any layer.
    #[error("missing required setting `{name}` (use {flag} or set {env})")]
    MissingSetting {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse config {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("attachment I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Service(err) => err.code(),
            Self::MissingSetting { .. } => ErrorCode::MissingSetting,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Self::Io { .. } => ErrorCode::AttachmentIo,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
