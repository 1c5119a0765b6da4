//! Hostfs - one filesystem API for local and remote hosts
//!
//! Provides the [`Adapter`](adapter::Adapter) primitive set (stat, chmod,
//! chown, delete, rename, read, write, predicates), a typed [`Stat`]
//! snapshot, and parsers that normalize GNU and BSD `stat` output.
//!
//! # Example
//!
//! ```no_run
//! use hostfs::adapter;
//! use shellkit::Session;
//!
//! let mut session = Session::local();
//! let mut fs = adapter::select(session.is_local());
//! let stat = fs.stat(&mut session, "/etc/hosts")?;
//! println!("{} {}", stat.mode_string(), stat.owner_label());
//! # Ok::<(), shellkit::Error>(())
//! ```

pub mod adapter;
pub mod parser;
pub mod stat;

pub use adapter::{Adapter, LocalAdapter, RemoteAdapter};
pub use parser::{BsdStat, GnuStat, StatParser};
pub use stat::{FileKind, Stat, mode_string, parse_mode_string};
