//! Adapter backed by native filesystem calls.

use super::{Adapter, RemoteAdapter, ids, shell};
use crate::parser;
use crate::stat::{FileKind, Stat};
use chrono::{DateTime, Utc};
use shellkit::{CommandResult, Error, Result, Session};
use std::fs::{self, Permissions};
use std::os::unix::fs::{MetadataExt, PermissionsExt};

/// Native adapter for the local machine.
///
/// Syscalls run with the privileges of this process. While the session is
/// escalated, every primitive goes through the session's sudo shell
/// instead, using the same commands a remote host would get.
#[derive(Debug)]
pub struct LocalAdapter {
    escalated: RemoteAdapter,
}

impl Default for LocalAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAdapter {
    pub fn new() -> Self {
        Self {
            escalated: RemoteAdapter::with_parser(parser::native()),
        }
    }

    fn escalated(&mut self, session: &Session) -> Option<&mut RemoteAdapter> {
        session.is_privileged().then_some(&mut self.escalated)
    }
}

fn io_error(path: &str) -> impl Fn(std::io::Error) -> Error + '_ {
    move |err| Error::from_io(&err, path)
}

fn timestamp(secs: i64, nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, nanos.clamp(0, 999_999_999) as u32).unwrap_or_default()
}

impl Adapter for LocalAdapter {
    fn name(&self) -> &'static str {
        "local"
    }

    fn stat(&mut self, session: &mut Session, path: &str) -> Result<Stat> {
        if let Some(shell) = self.escalated(session) {
            return shell.stat(session, path);
        }
        let meta = fs::symlink_metadata(path).map_err(io_error(path))?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        Ok(Stat {
            path: path.to_string(),
            kind,
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
            owner: ids::user_name(meta.uid()),
            group: ids::group_name(meta.gid()),
            size: meta.size(),
            accessed: timestamp(meta.atime(), meta.atime_nsec()),
            modified: timestamp(meta.mtime(), meta.mtime_nsec()),
            changed: timestamp(meta.ctime(), meta.ctime_nsec()),
        })
    }

    fn exists(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        if let Some(shell) = self.escalated(session) {
            return shell.exists(session, path);
        }
        Ok(fs::symlink_metadata(path).is_ok())
    }

    fn is_directory(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        if let Some(shell) = self.escalated(session) {
            return shell.is_directory(session, path);
        }
        Ok(fs::metadata(path).is_ok_and(|meta| meta.is_dir()))
    }

    fn is_file(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        if let Some(shell) = self.escalated(session) {
            return shell.is_file(session, path);
        }
        Ok(fs::metadata(path).is_ok_and(|meta| meta.is_file()))
    }

    fn is_symlink(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        if let Some(shell) = self.escalated(session) {
            return shell.is_symlink(session, path);
        }
        Ok(fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink()))
    }

    fn read(&mut self, session: &mut Session, path: &str) -> Result<String> {
        if let Some(shell) = self.escalated(session) {
            return shell.read(session, path);
        }
        fs::read_to_string(path).map_err(io_error(path))
    }

    fn read_link(&mut self, session: &mut Session, path: &str) -> Result<String> {
        if let Some(shell) = self.escalated(session) {
            return shell.read_link(session, path);
        }
        fs::read_link(path)
            .map(|target| target.display().to_string())
            .map_err(io_error(path))
    }

    fn list(&mut self, session: &mut Session, path: &str) -> Result<Vec<String>> {
        if let Some(shell) = self.escalated(session) {
            return shell.list(session, path);
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(path).map_err(io_error(path))? {
            let entry = entry.map_err(io_error(path))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn chmod(&mut self, session: &mut Session, path: &str, mode: u32) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.chmod(session, path, mode);
        }
        log::debug!("chmod {mode:o} {path}");
        shell::outcome(fs::set_permissions(path, Permissions::from_mode(mode)).map_err(io_error(path)))
    }

    fn chown(
        &mut self,
        session: &mut Session,
        path: &str,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.chown(session, path, owner, group);
        }
        if owner.is_none() && group.is_none() {
            return CommandResult::no_change();
        }
        let lookup = || -> Result<(Option<u32>, Option<u32>)> {
            let uid = owner
                .map(|name| {
                    ids::user_id(name).ok_or_else(|| Error::Other(format!("unknown user: {name}")))
                })
                .transpose()?;
            let gid = group
                .map(|name| {
                    ids::group_id(name).ok_or_else(|| Error::Other(format!("unknown group: {name}")))
                })
                .transpose()?;
            Ok((uid, gid))
        };
        shell::outcome(lookup().and_then(|(uid, gid)| {
            log::debug!("chown {uid:?}:{gid:?} {path}");
            std::os::unix::fs::chown(path, uid, gid).map_err(io_error(path))
        }))
    }

    fn delete(&mut self, session: &mut Session, path: &str, recursive: bool) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.delete(session, path, recursive);
        }
        let removal = fs::symlink_metadata(path)
            .map_err(io_error(path))
            .and_then(|meta| match (meta.is_dir(), recursive) {
                (true, true) => fs::remove_dir_all(path).map_err(io_error(path)),
                (true, false) => Err(Error::IsDirectory {
                    path: path.to_string(),
                }),
                (false, _) => fs::remove_file(path).map_err(io_error(path)),
            });
        shell::outcome(removal)
    }

    fn rename(&mut self, session: &mut Session, from: &str, to: &str) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.rename(session, from, to);
        }
        shell::outcome(fs::rename(from, to).map_err(io_error(from)))
    }

    fn write(&mut self, session: &mut Session, path: &str, content: &str) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.write(session, path, content);
        }
        shell::outcome(fs::write(path, content).map_err(io_error(path)))
    }

    fn mkdir(&mut self, session: &mut Session, path: &str) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.mkdir(session, path);
        }
        shell::outcome(fs::create_dir_all(path).map_err(io_error(path)))
    }

    fn symlink(&mut self, session: &mut Session, target: &str, link: &str) -> CommandResult {
        if let Some(shell) = self.escalated(session) {
            return shell.symlink(session, target, link);
        }
        let replace = match fs::symlink_metadata(link) {
            Ok(meta) if meta.is_dir() => Err(Error::IsDirectory {
                path: link.to_string(),
            }),
            Ok(_) => fs::remove_file(link).map_err(io_error(link)),
            Err(_) => Ok(()),
        };
        shell::outcome(replace.and_then(|()| {
            std::os::unix::fs::symlink(target, link).map_err(io_error(link))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellkit::ScriptedTransport;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Session, LocalAdapter) {
        (TempDir::new().unwrap(), Session::local(), LocalAdapter::new())
    }

    fn path_in(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_str().unwrap().to_string()
    }

    #[test]
    fn test_chmod_then_stat() {
        let (dir, mut session, mut adapter) = fixture();
        let file = path_in(&dir, "f");
        fs::write(&file, "data").unwrap();

        assert!(!adapter.chmod(&mut session, &file, 0o640).failed());
        let stat = adapter.stat(&mut session, &file).unwrap();
        assert_eq!(stat.mode, 0o640);
        assert_eq!(stat.kind, FileKind::File);
        assert_eq!(stat.size, 4);
        assert_eq!(stat.mode_string(), "-rw-r-----");
    }

    #[test]
    fn test_chown_to_self_succeeds() {
        let (dir, mut session, mut adapter) = fixture();
        let file = path_in(&dir, "f");
        fs::write(&file, "").unwrap();
        let uid = fs::metadata(&file).unwrap().uid().to_string();

        assert!(!adapter.chown(&mut session, &file, Some(&uid), None).failed());
        assert!(adapter.chown(&mut session, &file, None, None).is_no_change());
    }

    #[test]
    fn test_chown_unknown_user() {
        let (dir, mut session, mut adapter) = fixture();
        let file = path_in(&dir, "f");
        fs::write(&file, "").unwrap();

        let result = adapter.chown(&mut session, &file, Some("no-such-user-rigger"), None);
        assert!(result.failed());
    }

    #[test]
    fn test_stat_missing_is_not_found() {
        let (dir, mut session, mut adapter) = fixture();
        let err = adapter.stat(&mut session, &path_in(&dir, "nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_delete_directory_needs_recursive() {
        let (dir, mut session, mut adapter) = fixture();
        let sub = path_in(&dir, "sub");
        fs::create_dir(&sub).unwrap();
        fs::write(dir.path().join("sub/inner"), "x").unwrap();

        let refused = adapter.delete(&mut session, &sub, false);
        assert!(matches!(refused.error(), Some(Error::IsDirectory { .. })));
        assert_eq!(refused.exit_status(), 1);

        assert!(!adapter.delete(&mut session, &sub, true).failed());
        assert!(!adapter.exists(&mut session, &sub).unwrap());
    }

    #[test]
    fn test_delete_missing() {
        let (dir, mut session, mut adapter) = fixture();
        let result = adapter.delete(&mut session, &path_in(&dir, "nope"), false);
        assert!(matches!(result.error(), Some(Error::NotFound { .. })));
    }

    #[test]
    fn test_write_read_rename() {
        let (dir, mut session, mut adapter) = fixture();
        let from = path_in(&dir, "a");
        let to = path_in(&dir, "b");

        assert!(!adapter.write(&mut session, &from, "hello").failed());
        assert!(!adapter.rename(&mut session, &from, &to).failed());
        assert_eq!(adapter.read(&mut session, &to).unwrap(), "hello");
        assert!(!adapter.exists(&mut session, &from).unwrap());
    }

    #[test]
    fn test_mkdir_and_list() {
        let (dir, mut session, mut adapter) = fixture();
        let nested = path_in(&dir, "x/y");

        assert!(!adapter.mkdir(&mut session, &nested).failed());
        fs::write(dir.path().join("x/b"), "").unwrap();
        assert_eq!(
            adapter.list(&mut session, &path_in(&dir, "x")).unwrap(),
            ["b", "y"]
        );
    }

    #[test]
    fn test_symlink_replaces_link() {
        let (dir, mut session, mut adapter) = fixture();
        let link = path_in(&dir, "current");

        assert!(!adapter.symlink(&mut session, "/releases/1", &link).failed());
        assert!(!adapter.symlink(&mut session, "/releases/2", &link).failed());
        assert_eq!(adapter.read_link(&mut session, &link).unwrap(), "/releases/2");
        assert!(adapter.is_symlink(&mut session, &link).unwrap());
        assert!(adapter.exists(&mut session, &link).unwrap());
    }

    #[test]
    fn test_symlink_refuses_directory() {
        let (dir, mut session, mut adapter) = fixture();
        let result = adapter.symlink(&mut session, "/x", dir.path().to_str().unwrap());
        assert!(matches!(result.error(), Some(Error::IsDirectory { .. })));
    }

    #[test]
    fn test_privileged_calls_use_shell() {
        let transport = ScriptedTransport::local();
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));
        let mut adapter = LocalAdapter::new();

        let result = session.su(None, |s| adapter.chmod(s, "/etc/motd", 0o644));

        assert!(!result.failed());
        let line = journal.last_line().unwrap();
        assert!(line.starts_with("sudo "));
        assert!(line.contains("chmod 644 /etc/motd"));
    }
}
