//! The outcome of one command, whatever produced it.

use crate::error::Error;
use serde::Serialize;

/// Exit status reported when the transport failed before the command ran.
pub const TRANSPORT_FAILURE: i32 = 255;

/// Exit status reported when the local shell could not be spawned.
pub const SPAWN_FAILURE: i32 = 127;

/// Exit status used for errors raised without a process exit code.
pub const GENERIC_FAILURE: i32 = 1;

/// Payload of a [`CommandResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Value {
    /// Nothing interesting to return
    Unit,
    /// Answer to a yes/no query
    Bool(bool),
    /// Text produced by the command
    Text(String),
    /// The command failed with this error
    Error(Error),
}

/// How a command ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The command ran and succeeded
    Applied,
    /// The command was skipped because nothing needed to change
    NoChange,
    /// The command ran and failed
    Failed,
}

/// Result of a single command: value, exit status and captured output.
///
/// `failed()` is the only success switch consumers need; the typed error in
/// `value` is there for richer diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    value: Value,
    exit_status: i32,
    stdout: String,
    stderr: String,
    status: Status,
}

impl CommandResult {
    /// A successful result with captured output.
    pub fn success(value: Value, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            value,
            exit_status: 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            status: Status::Applied,
        }
    }

    /// A successful result without output.
    pub fn applied(value: Value) -> Self {
        Self::success(value, String::new(), String::new())
    }

    /// A result for a command that was not run because nothing needed to change.
    pub fn no_change() -> Self {
        Self {
            value: Value::Unit,
            exit_status: 0,
            stdout: String::new(),
            stderr: String::new(),
            status: Status::NoChange,
        }
    }

    /// A failed result carrying `error` and the captured output.
    ///
    /// A zero `exit_status` is bumped to [`GENERIC_FAILURE`] so that a failed
    /// result can never read as success.
    pub fn failure(
        error: Error,
        exit_status: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            value: Value::Error(error),
            exit_status: if exit_status == 0 {
                GENERIC_FAILURE
            } else {
                exit_status
            },
            stdout: stdout.into(),
            stderr: stderr.into(),
            status: Status::Failed,
        }
    }

    /// A failed result for an error that never reached a process.
    pub fn from_error(error: Error) -> Self {
        let exit_status = if error.is_transport() {
            TRANSPORT_FAILURE
        } else {
            GENERIC_FAILURE
        };
        let stderr = error.to_string();
        Self::failure(error, exit_status, String::new(), stderr)
    }

    /// Replace a successful result with a failure, keeping its output.
    pub fn into_failure(self, error: Error) -> Self {
        Self::failure(error, GENERIC_FAILURE, self.stdout, self.stderr)
    }

    /// The payload.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Process exit status (0 for success and skips).
    pub fn exit_status(&self) -> i32 {
        self.exit_status
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Applied, skipped or failed.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the command failed (exit status non-zero).
    pub fn failed(&self) -> bool {
        self.exit_status != 0
    }

    /// Whether the value is an error object.
    pub fn is_exception(&self) -> bool {
        matches!(self.value, Value::Error(_))
    }

    /// Whether the command was skipped.
    pub fn is_no_change(&self) -> bool {
        self.status == Status::NoChange
    }

    /// The error carried by a failed result.
    pub fn error(&self) -> Option<&Error> {
        match &self.value {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Text payload, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Convert to a `Result`, turning failures into their error.
    pub fn into_result(self) -> crate::Result<Value> {
        if !self.failed() {
            return Ok(self.value);
        }
        match self.value {
            Value::Error(err) => Err(err),
            _ => Err(Error::CommandFailed {
                command: String::new(),
                status: self.exit_status,
                stderr: self.stderr.trim().to_string(),
            }),
        }
    }

    /// Field name → value projection for audit serialization.
    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_change_is_not_failed() {
        let result = CommandResult::no_change();
        assert!(!result.failed());
        assert!(result.is_no_change());
        assert_eq!(result.exit_status(), 0);
        assert_eq!(result.status(), Status::NoChange);
    }

    #[test]
    fn test_failure_never_zero() {
        let result = CommandResult::failure(Error::Other("x".to_string()), 0, "", "");
        assert!(result.failed());
        assert!(result.is_exception());
        assert_eq!(result.exit_status(), GENERIC_FAILURE);
    }

    #[test]
    fn test_transport_error_exit_status() {
        let result = CommandResult::from_error(Error::AuthenticationFailed {
            host: "web1".to_string(),
            message: "Permission denied (publickey)".to_string(),
        });
        assert_eq!(result.exit_status(), TRANSPORT_FAILURE);
        assert!(matches!(
            result.error(),
            Some(Error::AuthenticationFailed { .. })
        ));
    }

    #[test]
    fn test_into_failure_keeps_output() {
        let result = CommandResult::success(Value::Unit, "out", "err").into_failure(
            Error::VerificationFailed {
                operation: "chmod".to_string(),
            },
        );
        assert!(result.failed());
        assert_eq!(result.stdout(), "out");
        assert_eq!(result.status(), Status::Failed);
    }

    #[test]
    fn test_attributes_projection() {
        let result = CommandResult::success(Value::Text("hi".to_string()), "hi\n", "");
        let attrs = result.attributes();
        assert_eq!(attrs["exit_status"], serde_json::json!(0));
        assert_eq!(attrs["status"], serde_json::json!("applied"));
        assert_eq!(attrs["stdout"], serde_json::json!("hi\n"));
    }

    #[test]
    fn test_into_result() {
        let ok = CommandResult::applied(Value::Bool(true)).into_result();
        assert_eq!(ok, Ok(Value::Bool(true)));

        let err = CommandResult::from_error(Error::NotFound {
            path: "/x".to_string(),
        })
        .into_result();
        assert!(matches!(err, Err(Error::NotFound { .. })));
    }
}
