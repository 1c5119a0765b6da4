//! Shellkit - stateful command sessions for local and remote hosts
//!
//! This crate runs shell commands on one host at a time and reports every
//! outcome as a [`CommandResult`]. A [`Session`] tracks the working
//! directory and sudo escalation that a stateless transport cannot
//! remember, and retries once when a login is refused or a connection drops.
//!
//! # Example
//!
//! ```no_run
//! use shellkit::Session;
//!
//! let mut session = Session::local();
//! session.cd("/tmp");
//! let result = session.execute("ls");
//! if !result.failed() {
//!     print!("{}", result.stdout());
//! }
//! ```

pub mod error;
pub mod prompt;
pub mod quote;
pub mod result;
pub mod session;
pub mod transport;

pub use error::{Error, ErrorCategory, Result};
pub use prompt::{CredentialPrompt, FixedPrompt, NoPrompt};
pub use result::{CommandResult, Status, Value};
pub use session::{Escalation, HistoryEntry, Privilege, Session};
pub use transport::{
    LocalTransport, RawOutput, ScriptedTransport, SshOptions, SshTransport, Transport,
    TransportKind,
};
