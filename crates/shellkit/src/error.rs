//! Error types for session and filesystem operations.
//!
//! Errors are categorized so the session can decide what to retry and so
//! callers can render a useful message without inspecting raw stderr. OS
//! errors and shell failures are folded into the same variants, which means
//! a missing path looks the same whether it came from `std::fs` or from a
//! remote `rm`.

use serde::Serialize;
use std::io;
use thiserror::Error;

/// Categories of errors, used for retry decisions and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Path does not exist
    Missing,
    /// File where a directory was expected, or the reverse
    WrongType,
    /// Permission denied
    Permission,
    /// Service name not known to the init system
    Service,
    /// Pid file unreadable or missing
    PidFile,
    /// Authentication failure or lost connection
    Transport,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Missing => "No such file or directory",
            Self::WrongType => "Wrong file type",
            Self::Permission => "Permission denied",
            Self::Service => "Unrecognized service",
            Self::PidFile => "Inaccessible pid file",
            Self::Transport => "Connection problem",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors produced by sessions, transports and adapters.
///
/// Every variant is cloneable so it can travel inside a
/// [`CommandResult`](crate::CommandResult) and be replayed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Error {
    /// ENOENT
    #[error("no such file or directory: {path}")]
    NotFound {
        /// Path that does not exist
        path: String,
    },

    /// EISDIR
    #[error("is a directory: {path}")]
    IsDirectory {
        /// Path that is a directory
        path: String,
    },

    /// ENOTDIR
    #[error("not a directory: {path}")]
    NotDirectory {
        /// Path that is not a directory
        path: String,
    },

    /// EACCES / EPERM
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// Path or command that was refused
        path: String,
    },

    /// Init system does not know the service
    #[error("unrecognized service: {name}")]
    UnrecognizedService {
        /// Service name
        name: String,
    },

    /// Pid file could not be read
    #[error("inaccessible pid file: {path}")]
    InaccessiblePidFile {
        /// Pid file path
        path: String,
    },

    /// Remote login was refused
    #[error("authentication failed for {host}: {message}")]
    AuthenticationFailed {
        /// Host that refused the login
        host: String,
        /// Transport diagnostic
        message: String,
    },

    /// Connection dropped or could not be established
    #[error("disconnected from {host}: {message}")]
    Disconnected {
        /// Host that went away
        host: String,
        /// Transport diagnostic
        message: String,
    },

    /// Command exited non-zero for an unclassified reason
    #[error("command failed with status {status}: {stderr}")]
    CommandFailed {
        /// The command that was run
        command: String,
        /// Exit status
        status: i32,
        /// Trimmed standard error
        stderr: String,
    },

    /// Mutation ran but the target did not end up in the desired state
    #[error("{operation} did not reach the desired state")]
    VerificationFailed {
        /// Operation name
        operation: String,
    },

    /// Output could not be parsed
    #[error("could not parse {what}: {message}")]
    Parse {
        /// What was being parsed
        what: String,
        /// Why it failed
        message: String,
    },

    /// IO error without a more specific classification
    #[error("IO error: {message}")]
    Io {
        /// Rendered io::Error
        message: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::Missing,
            Error::IsDirectory { .. } | Error::NotDirectory { .. } => ErrorCategory::WrongType,
            Error::PermissionDenied { .. } => ErrorCategory::Permission,
            Error::UnrecognizedService { .. } => ErrorCategory::Service,
            Error::InaccessiblePidFile { .. } => ErrorCategory::PidFile,
            Error::AuthenticationFailed { .. } | Error::Disconnected { .. } => {
                ErrorCategory::Transport
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Whether the error came from the transport rather than the command.
    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    /// Classify an `io::Error` raised while touching `path`.
    pub fn from_io(err: &io::Error, path: &str) -> Self {
        let path = path.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path },
            io::ErrorKind::PermissionDenied => Error::PermissionDenied { path },
            io::ErrorKind::IsADirectory => Error::IsDirectory { path },
            io::ErrorKind::NotADirectory => Error::NotDirectory { path },
            _ => Error::Io {
                message: format!("{path}: {err}"),
            },
        }
    }

    /// Create an error from the stderr of a failed shell command.
    ///
    /// `subject` names the path or service the command was about; it ends up
    /// in the typed variant. Unrecognized output becomes `CommandFailed`.
    pub fn from_stderr(stderr: &str, subject: &str, command: &str, status: i32) -> Self {
        let lower = stderr.to_lowercase();
        let subject = subject.to_string();

        if lower.contains("pid file") || lower.contains("pidfile") {
            return Error::InaccessiblePidFile { path: subject };
        }

        if lower.contains("unrecognized service") || lower.contains("could not be found") {
            return Error::UnrecognizedService { name: subject };
        }

        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return Error::PermissionDenied { path: subject };
        }

        if lower.contains("is a directory") {
            return Error::IsDirectory { path: subject };
        }

        if lower.contains("not a directory") {
            return Error::NotDirectory { path: subject };
        }

        if lower.contains("no such file")
            || lower.contains("can't cd to")
            || lower.contains("does not exist")
        {
            return Error::NotFound { path: subject };
        }

        Error::CommandFailed {
            command: command.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
