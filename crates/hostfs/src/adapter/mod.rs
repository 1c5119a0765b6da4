//! Filesystem primitives with interchangeable backends.
//!
//! Resources talk to an [`Adapter`] and never care whether the host is this
//! machine or one across an SSH connection. Queries return `Result`;
//! mutations return a [`CommandResult`] so that a failure looks the same
//! whether it came from a syscall or from a remote shell.

mod ids;
pub mod local;
pub mod remote;
pub mod shell;

use crate::stat::Stat;
use shellkit::{CommandResult, Error, Result, Session};

/// Same limit as Linux `MAXSYMLINKS`.
const MAX_LINK_HOPS: usize = 40;

pub use local::LocalAdapter;
pub use remote::RemoteAdapter;

/// Uniform set of filesystem primitives.
///
/// Every call receives the session of the host it operates on. Paths are
/// expected to be absolute.
pub trait Adapter: Send {
    /// Name for logs ("local" or "remote").
    fn name(&self) -> &'static str;

    /// Metadata for `path`, not following symlinks.
    fn stat(&mut self, session: &mut Session, path: &str) -> Result<Stat>;

    /// Permission bits of whatever `path` finally points at.
    ///
    /// `chmod` follows symlinks, so this is the mode it changes.
    fn mode(&mut self, session: &mut Session, path: &str) -> Result<u32> {
        let mut current = path.to_string();
        for _ in 0..MAX_LINK_HOPS {
            let stat = self.stat(session, &current)?;
            if !stat.is_symlink() {
                return Ok(stat.mode);
            }
            let target = self.read_link(session, &current)?;
            current = follow(&current, &target);
        }
        Err(Error::Other(format!("too many levels of symbolic links: {path}")))
    }

    /// Whether anything (including a dangling symlink) exists at `path`.
    fn exists(&mut self, session: &mut Session, path: &str) -> Result<bool>;

    /// Whether `path` is a directory, following symlinks.
    fn is_directory(&mut self, session: &mut Session, path: &str) -> Result<bool>;

    /// Whether `path` is a regular file, following symlinks.
    fn is_file(&mut self, session: &mut Session, path: &str) -> Result<bool>;

    fn is_symlink(&mut self, session: &mut Session, path: &str) -> Result<bool>;

    fn read(&mut self, session: &mut Session, path: &str) -> Result<String>;

    fn read_link(&mut self, session: &mut Session, path: &str) -> Result<String>;

    /// Entry names in `path`, sorted, without `.` and `..`.
    fn list(&mut self, session: &mut Session, path: &str) -> Result<Vec<String>>;

    fn chmod(&mut self, session: &mut Session, path: &str, mode: u32) -> CommandResult;

    /// Change owner and/or group. Names or numeric ids are accepted.
    fn chown(
        &mut self,
        session: &mut Session,
        path: &str,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> CommandResult;

    /// Remove `path`. Directories need `recursive`.
    fn delete(&mut self, session: &mut Session, path: &str, recursive: bool) -> CommandResult;

    fn rename(&mut self, session: &mut Session, from: &str, to: &str) -> CommandResult;

    /// Replace the contents of `path`, creating it if needed.
    fn write(&mut self, session: &mut Session, path: &str, content: &str) -> CommandResult;

    /// Create `path` and any missing parents.
    fn mkdir(&mut self, session: &mut Session, path: &str) -> CommandResult;

    /// Point the symlink at `link` to `target`, replacing an existing link or file.
    fn symlink(&mut self, session: &mut Session, target: &str, link: &str) -> CommandResult;
}

/// Where a link at `link` pointing to `target` leads.
fn follow(link: &str, target: &str) -> String {
    if target.starts_with('/') {
        return target.to_string();
    }
    match link.rsplit_once('/') {
        Some(("", _)) => format!("/{target}"),
        Some((parent, _)) => format!("{parent}/{target}"),
        None => target.to_string(),
    }
}

/// Pick the adapter for a host.
pub fn select(local: bool) -> Box<dyn Adapter> {
    if local {
        Box::new(LocalAdapter::new())
    } else {
        Box::new(RemoteAdapter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_select() {
        assert_eq!(select(true).name(), "local");
        assert_eq!(select(false).name(), "remote");
    }

    /// The shell adapter pointed at this machine must agree with native calls.
    #[test]
    fn test_predicate_parity() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        let link = dir.path().join("link");
        let dangling = dir.path().join("dangling");
        fs::write(&file, "x").unwrap();
        std::os::unix::fs::symlink(&file, &link).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), &dangling).unwrap();

        let mut session = Session::local();
        let mut local = LocalAdapter::new();
        let mut remote = RemoteAdapter::with_parser(crate::parser::native());

        let paths = [
            dir.path().to_path_buf(),
            file,
            link,
            dangling,
            dir.path().join("missing"),
        ];
        for path in &paths {
            let path = path.to_str().unwrap();
            assert_eq!(
                local.exists(&mut session, path).unwrap(),
                remote.exists(&mut session, path).unwrap(),
                "exists {path}"
            );
            assert_eq!(
                local.is_directory(&mut session, path).unwrap(),
                remote.is_directory(&mut session, path).unwrap(),
                "is_directory {path}"
            );
            assert_eq!(
                local.is_file(&mut session, path).unwrap(),
                remote.is_file(&mut session, path).unwrap(),
                "is_file {path}"
            );
            assert_eq!(
                local.is_symlink(&mut session, path).unwrap(),
                remote.is_symlink(&mut session, path).unwrap(),
                "is_symlink {path}"
            );
        }
    }

    #[test]
    fn test_follow() {
        assert_eq!(follow("/srv/current", "/srv/releases/2"), "/srv/releases/2");
        assert_eq!(follow("/srv/current", "releases/2"), "/srv/releases/2");
        assert_eq!(follow("/current", "srv"), "/srv");
    }

    #[test]
    fn test_mode_follows_links() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        let hop = dir.path().join("hop");
        let link = dir.path().join("link");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();
        std::os::unix::fs::symlink("file", &hop).unwrap();
        std::os::unix::fs::symlink(&hop, &link).unwrap();

        let mut session = Session::local();
        let link = link.to_str().unwrap();
        assert_eq!(LocalAdapter::new().mode(&mut session, link).unwrap(), 0o640);
        assert_eq!(
            RemoteAdapter::with_parser(crate::parser::native())
                .mode(&mut session, link)
                .unwrap(),
            0o640
        );
    }

    #[test]
    fn test_mode_of_link_loop_fails() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::os::unix::fs::symlink(&b, &a).unwrap();
        std::os::unix::fs::symlink(&a, &b).unwrap();

        let mut session = Session::local();
        assert!(LocalAdapter::new().mode(&mut session, a.to_str().unwrap()).is_err());
    }

    /// Neither adapter replaces a real directory with a link, nor nests a
    /// link inside it.
    #[test]
    fn test_symlink_over_directory_parity() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::local();
        let mut adapters: [Box<dyn Adapter>; 2] = [
            Box::new(LocalAdapter::new()),
            Box::new(RemoteAdapter::with_parser(crate::parser::native())),
        ];

        for adapter in &mut adapters {
            let occupied = dir.path().join(adapter.name());
            fs::create_dir(&occupied).unwrap();
            let path = occupied.to_str().unwrap();

            let result = adapter.symlink(&mut session, "/srv/releases/2", path);

            assert!(result.failed(), "{}", adapter.name());
            assert!(
                matches!(result.error(), Some(Error::IsDirectory { .. })),
                "{}: {:?}",
                adapter.name(),
                result.error()
            );
            assert!(fs::read_dir(&occupied).unwrap().next().is_none());
        }
    }

    #[test]
    fn test_stat_parity() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "hello").unwrap();
        let path = file.to_str().unwrap();

        let mut session = Session::local();
        let native = LocalAdapter::new().stat(&mut session, path).unwrap();
        let shelled = RemoteAdapter::with_parser(crate::parser::native())
            .stat(&mut session, path)
            .unwrap();

        assert_eq!(native.kind, shelled.kind);
        assert_eq!(native.mode, shelled.mode);
        assert_eq!(native.uid, shelled.uid);
        assert_eq!(native.size, shelled.size);
        assert_eq!(native.modified.timestamp(), shelled.modified.timestamp());
    }
}
