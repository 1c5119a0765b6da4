//! Command transports.
//!
//! A transport runs one shell line and hands back its output. It keeps no
//! shell state between calls: working directory and privilege are the
//! session's business, composed into every line before it gets here.

pub mod local;
mod process;
pub mod scripted;
pub mod ssh;

use crate::error::Result;
use std::path::Path;

pub use local::LocalTransport;
pub use process::{PromptDetector, SUDO_PROMPT};
pub use scripted::{ScriptJournal, ScriptedTransport};
pub use ssh::{SshOptions, SshTransport};

/// Where commands end up running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Spawned on this machine
    Local,
    /// Sent over a remote shell connection
    Remote,
}

/// Raw output of one shell line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Output with an explicit exit status and stderr.
    pub fn status(exit_status: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Callback answering interactive prompts seen on stderr.
///
/// Receives the prompt text; returns the line to send back, or `None` to
/// close stdin instead.
pub type Responder<'a> = dyn FnMut(&str) -> Option<String> + 'a;

/// A stateless command channel to one host.
pub trait Transport: Send {
    /// Local or remote.
    fn kind(&self) -> TransportKind;

    /// Host name used in diagnostics.
    fn host(&self) -> &str;

    /// Run a composed shell line.
    ///
    /// When `interactive` is set, stdin stays open and password prompts on
    /// stderr are answered through `responder`. Returns `Err` only for
    /// transport failures; a command that ran and failed is `Ok` with a
    /// non-zero exit status.
    fn exec(
        &mut self,
        line: &str,
        interactive: bool,
        responder: &mut Responder<'_>,
    ) -> Result<RawOutput>;

    /// Copy a local file to `dest` on the host, as the login user.
    fn upload(&mut self, source: &Path, dest: &str) -> Result<()>;

    /// Use `credential` for subsequent logins.
    fn authenticate(&mut self, _credential: &str) -> Result<()> {
        Ok(())
    }

    /// Drop the current connection so the next call opens a fresh one.
    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}
