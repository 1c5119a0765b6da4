//! Adapter that drives a host entirely through shell commands.

use super::{Adapter, shell};
use crate::parser::{self, StatParser};
use crate::stat::Stat;
use shellkit::{CommandResult, Error, Result, Session};

/// Shell-backed adapter for remote hosts.
///
/// The `stat` flavor is detected from `uname -s` the first time metadata is
/// needed and kept for the adapter's lifetime.
pub struct RemoteAdapter {
    parser: Option<Box<dyn StatParser>>,
}

impl std::fmt::Debug for RemoteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAdapter")
            .field("parser", &self.parser.as_ref().map(|p| p.flavor()))
            .finish()
    }
}

impl Default for RemoteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteAdapter {
    /// Adapter that detects the platform on first use.
    pub fn new() -> Self {
        Self { parser: None }
    }

    /// Adapter with a known `stat` flavor.
    pub fn with_parser(parser: Box<dyn StatParser>) -> Self {
        Self {
            parser: Some(parser),
        }
    }

    fn parser(&mut self, session: &mut Session) -> Result<&dyn StatParser> {
        if self.parser.is_none() {
            let uname = shell::output(session.execute("uname -s"))?;
            let detected = parser::for_uname(&uname);
            log::debug!(
                "{} reports {}, using {} stat",
                session.host(),
                uname.trim(),
                detected.flavor()
            );
            self.parser = Some(detected);
        }
        self.parser
            .as_deref()
            .ok_or_else(|| Error::Other("stat parser unavailable".to_string()))
    }
}

impl Adapter for RemoteAdapter {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn stat(&mut self, session: &mut Session, path: &str) -> Result<Stat> {
        let parser = self.parser(session)?;
        let output = shell::output(session.execute_about(&parser.command(path), path))?;
        parser.parse(path, &output)
    }

    fn exists(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        shell::exists(session, path)
    }

    fn is_directory(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        shell::is_directory(session, path)
    }

    fn is_file(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        shell::is_file(session, path)
    }

    fn is_symlink(&mut self, session: &mut Session, path: &str) -> Result<bool> {
        shell::is_symlink(session, path)
    }

    fn read(&mut self, session: &mut Session, path: &str) -> Result<String> {
        shell::read(session, path)
    }

    fn read_link(&mut self, session: &mut Session, path: &str) -> Result<String> {
        shell::read_link(session, path)
    }

    fn list(&mut self, session: &mut Session, path: &str) -> Result<Vec<String>> {
        shell::list(session, path)
    }

    fn chmod(&mut self, session: &mut Session, path: &str, mode: u32) -> CommandResult {
        shell::chmod(session, path, mode)
    }

    fn chown(
        &mut self,
        session: &mut Session,
        path: &str,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> CommandResult {
        shell::chown(session, path, owner, group)
    }

    fn delete(&mut self, session: &mut Session, path: &str, recursive: bool) -> CommandResult {
        shell::delete(session, path, recursive)
    }

    fn rename(&mut self, session: &mut Session, from: &str, to: &str) -> CommandResult {
        shell::rename(session, from, to)
    }

    fn write(&mut self, session: &mut Session, path: &str, content: &str) -> CommandResult {
        shell::write(session, path, content)
    }

    fn mkdir(&mut self, session: &mut Session, path: &str) -> CommandResult {
        shell::mkdir(session, path)
    }

    fn symlink(&mut self, session: &mut Session, target: &str, link: &str) -> CommandResult {
        shell::symlink(session, target, link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::FileKind;
    use shellkit::{RawOutput, ScriptedTransport};

    const GNU_FILE: &str = "regular file|644|1000|1000|deploy|deploy|5|1700000000|1700000000|1700000000\n";
    const BSD_DIR: &str = "Directory|0755|501|20|alice|staff|64|1700000000|1700000000|1700000000\n";

    #[test]
    fn test_platform_detected_once() {
        let transport = ScriptedTransport::remote("web1")
            .expect("uname -s", RawOutput::ok("Linux\n"))
            .always("stat -c", RawOutput::ok(GNU_FILE));
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));
        let mut adapter = RemoteAdapter::new();

        let first = adapter.stat(&mut session, "/srv/app.conf").unwrap();
        adapter.stat(&mut session, "/srv/app.conf").unwrap();

        assert_eq!(first.mode, 0o644);
        assert_eq!(first.owner.as_deref(), Some("deploy"));
        let unames = journal
            .lines()
            .iter()
            .filter(|line| line.contains("uname"))
            .count();
        assert_eq!(unames, 1);
    }

    #[test]
    fn test_darwin_uses_bsd_stat() {
        let transport = ScriptedTransport::remote("mac1")
            .expect("uname -s", RawOutput::ok("Darwin\n"))
            .expect("stat -f", RawOutput::ok(BSD_DIR));
        let mut session = Session::new(Box::new(transport));

        let stat = RemoteAdapter::new().stat(&mut session, "/Users/alice").unwrap();
        assert_eq!(stat.kind, FileKind::Directory);
        assert_eq!(stat.group.as_deref(), Some("staff"));
    }

    #[test]
    fn test_stat_missing_path() {
        let transport = ScriptedTransport::remote("web1").expect(
            "stat -c",
            RawOutput::status(1, "stat: cannot statx '/nope': No such file or directory\n"),
        );
        let mut session = Session::new(Box::new(transport));
        let mut adapter = RemoteAdapter::with_parser(Box::new(crate::parser::GnuStat));

        let err = adapter.stat(&mut session, "/nope").unwrap_err();
        assert_eq!(
            err,
            Error::NotFound {
                path: "/nope".to_string()
            }
        );
    }

    #[test]
    fn test_predicates() {
        let transport = ScriptedTransport::remote("web1")
            .expect("test -d", RawOutput::status(1, ""))
            .expect("test -f", RawOutput::ok(""));
        let mut session = Session::new(Box::new(transport));
        let mut adapter = RemoteAdapter::new();

        assert!(!adapter.is_directory(&mut session, "/etc/hosts").unwrap());
        assert!(adapter.is_file(&mut session, "/etc/hosts").unwrap());
    }

    #[test]
    fn test_delete_directory_without_recursive() {
        let transport = ScriptedTransport::remote("web1").expect(
            "rm",
            RawOutput::status(1, "rm: cannot remove '/srv/data': Is a directory\n"),
        );
        let mut session = Session::new(Box::new(transport));

        let result = RemoteAdapter::new().delete(&mut session, "/srv/data", false);
        assert!(result.failed());
        assert!(matches!(result.error(), Some(Error::IsDirectory { .. })));
    }
}
