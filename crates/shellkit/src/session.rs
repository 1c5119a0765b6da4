//! Stateful command sessions.
//!
//! A [`Session`] pretends to be a long-lived shell on one host. The
//! transport underneath forgets everything between calls, so the session
//! keeps the working directory and privilege level itself and bakes them
//! into every command line it sends.

use crate::error::{Error, Result};
use crate::prompt::{CredentialPrompt, NoPrompt};
use crate::quote::{join, quote};
use crate::result::{CommandResult, Value};
use crate::transport::{
    LocalTransport, RawOutput, SUDO_PROMPT, SshOptions, SshTransport, Transport, TransportKind,
};
use chrono::{DateTime, Utc};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Active privilege escalation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Privilege {
    /// Target user; `None` means root
    pub user: Option<String>,
}

/// One executed command, as recorded in the session history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub command: String,
    pub args: Vec<String>,
    pub result: CommandResult,
    pub at: DateTime<Utc>,
}

/// Command-execution channel to one host.
pub struct Session {
    transport: Box<dyn Transport>,
    prompt: Box<dyn CredentialPrompt>,
    cwd: Option<String>,
    privilege: Option<Privilege>,
    sudo_password: Option<String>,
    history: Vec<HistoryEntry>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.transport.host())
            .field("cwd", &self.cwd)
            .field("privilege", &self.privilege)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session over an arbitrary transport, with no known cwd.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            prompt: Box::new(NoPrompt),
            cwd: None,
            privilege: None,
            sudo_password: None,
            history: Vec::new(),
        }
    }

    /// Session on this machine, starting in the process working directory.
    pub fn local() -> Self {
        let mut session = Self::new(Box::new(LocalTransport::new()));
        session.cwd = std::env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string());
        session
    }

    /// Session on `host` over OpenSSH. The cwd is resolved on first use.
    pub fn remote(host: impl Into<String>, options: SshOptions) -> Self {
        Self::new(Box::new(SshTransport::new(host, options)))
    }

    /// Use `prompt` for login retries and sudo passwords.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Box<dyn CredentialPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Pre-seed the sudo password.
    #[must_use]
    pub fn with_sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(password.into());
        self
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn is_local(&self) -> bool {
        self.kind() == TransportKind::Local
    }

    /// Tracked working directory, if resolved.
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    pub fn privilege(&self) -> Option<&Privilege> {
        self.privilege.as_ref()
    }

    pub fn is_privileged(&self) -> bool {
        self.privilege.is_some()
    }

    /// Replace the privilege level, returning the previous one.
    pub fn set_privilege(&mut self, privilege: Option<Privilege>) -> Option<Privilege> {
        std::mem::replace(&mut self.privilege, privilege)
    }

    /// Every command run so far, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Run a raw shell command.
    pub fn execute(&mut self, command: &str) -> CommandResult {
        self.execute_about(command, command)
    }

    /// Run a raw shell command whose failures concern `subject`.
    ///
    /// `subject` (usually a path) is what typed errors classified from
    /// stderr will name.
    pub fn execute_about(&mut self, command: &str, subject: &str) -> CommandResult {
        let line = self.compose(command);
        let result = self.run_line(&line, subject);
        self.record(command, Vec::new(), &result);
        result
    }

    /// Run `program` with shell-quoted `args`.
    pub fn run<S: AsRef<str>>(&mut self, program: &str, args: &[S]) -> CommandResult {
        let mut words = vec![program];
        words.extend(args.iter().map(|arg| arg.as_ref()));
        let line = self.compose(&join(&words));
        let subject = args.last().map_or(program, |arg| arg.as_ref()).to_string();
        let result = self.run_line(&line, &subject);
        self.record(
            program,
            args.iter().map(|a| a.as_ref().to_string()).collect(),
            &result,
        );
        result
    }

    /// Change the tracked working directory.
    ///
    /// Runs `cd <path> && pwd` from the current directory and adopts the
    /// printed path. On failure the cwd stays where it was.
    pub fn cd(&mut self, path: &str) -> CommandResult {
        let line = self.compose(&format!("cd {} && pwd", quote(path)));
        let mut result = self.run_line(&line, path);

        if !result.failed() {
            let dir = result.stdout().trim().to_string();
            if dir.starts_with('/') {
                log::debug!("cwd on {} is now {dir}", self.host());
                result = CommandResult::success(
                    Value::Text(dir.clone()),
                    result.stdout(),
                    result.stderr(),
                );
                self.cwd = Some(dir);
            } else {
                result = result.into_failure(Error::Parse {
                    what: "pwd output".to_string(),
                    message: format!("not an absolute path: {dir:?}"),
                });
            }
        }

        self.record("cd", vec![path.to_string()], &result);
        result
    }

    /// Escalate privileges until the returned guard is dropped.
    pub fn escalate(&mut self, user: Option<&str>) -> Escalation<'_> {
        let previous = self.set_privilege(Some(Privilege {
            user: user.map(str::to_string),
        }));
        Escalation {
            session: self,
            previous,
        }
    }

    /// Run `f` with privileges escalated to `user` (root when `None`).
    pub fn su<R>(&mut self, user: Option<&str>, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.escalate(user);
        f(&mut *guard)
    }

    /// Make `path` absolute against the tracked cwd, resolving it first if needed.
    pub fn resolve(&mut self, path: &str) -> Result<String> {
        if path.starts_with('/') {
            return Ok(path.to_string());
        }
        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => self.discover_cwd()?,
        };
        let base = cwd.trim_end_matches('/');
        let relative = path.trim_start_matches("./");
        if relative.is_empty() || relative == "." {
            return Ok(if base.is_empty() { "/".to_string() } else { base.to_string() });
        }
        Ok(format!("{base}/{relative}"))
    }

    /// Copy a local file to `dest` on the host.
    ///
    /// While privileged, the file is staged somewhere the login user can
    /// write, copied into place with an escalated `cp`, and the staging
    /// copy is removed whether or not the copy worked.
    pub fn upload(&mut self, source: &Path, dest: &str) -> CommandResult {
        let args = vec![source.display().to_string(), dest.to_string()];
        let result = match self.resolve(dest) {
            Err(err) => CommandResult::from_error(err),
            Ok(dest) if self.privilege.is_none() => {
                match self.recover(|session| session.transport.upload(source, &dest)) {
                    Ok(()) => CommandResult::applied(Value::Unit),
                    Err(err) => CommandResult::from_error(err),
                }
            }
            Ok(dest) => self.staged_upload(source, &dest),
        };
        self.record("upload", args, &result);
        result
    }

    fn staged_upload(&mut self, source: &Path, dest: &str) -> CommandResult {
        let staging = self.staging_path();
        if let Err(err) = self.recover(|session| session.transport.upload(source, &staging)) {
            return CommandResult::from_error(err);
        }

        let copy = self.compose(&format!("cp {} {}", quote(&staging), quote(dest)));
        let result = self.run_line(&copy, dest);

        let cleanup = self.compose(&format!("rm -f {}", quote(&staging)));
        let removed = self.run_line(&cleanup, &staging);
        if removed.failed() {
            log::warn!("Could not remove staging file {staging} on {}", self.host());
        }
        result
    }

    fn staging_path(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let name = format!(".rigger-upload-{}-{nanos}", std::process::id());
        let dir = if self.is_local() {
            std::env::temp_dir()
        } else {
            PathBuf::from("/tmp")
        };
        dir.join(name).display().to_string()
    }

    fn discover_cwd(&mut self) -> Result<String> {
        let output = self.recover(|session| session.exec_once("pwd"))?;
        let dir = output.stdout.trim().to_string();
        if output.exit_status != 0 || !dir.starts_with('/') {
            return Err(Error::Parse {
                what: "pwd output".to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        self.cwd = Some(dir.clone());
        Ok(dir)
    }

    /// Prefix the cwd and wrap in sudo as the session state requires.
    fn compose(&self, command: &str) -> String {
        let line = match &self.cwd {
            Some(cwd) => format!("cd {} && {command}", quote(cwd)),
            None => command.to_string(),
        };
        let Some(privilege) = &self.privilege else {
            return line;
        };

        let mut sudo = format!("sudo -S -p {}", quote(SUDO_PROMPT));
        if let Some(user) = &privilege.user {
            sudo.push_str(" -u ");
            sudo.push_str(&quote(user));
        }
        if self.is_local() {
            format!("{sudo} sh -c {}", quote(&line))
        } else {
            format!("{sudo} -s -- sh -c {}", quote(&line))
        }
    }

    fn run_line(&mut self, line: &str, subject: &str) -> CommandResult {
        match self.recover(|session| session.exec_once(line)) {
            Ok(output) => settle(output, line, subject),
            Err(err) => CommandResult::from_error(err),
        }
    }

    /// Run `attempt`, retrying once after a refused login and once after a
    /// dropped connection.
    fn recover<T>(&mut self, mut attempt: impl FnMut(&mut Self) -> Result<T>) -> Result<T> {
        let mut reauthenticated = false;
        let mut reconnected = false;
        loop {
            let err = match attempt(self) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let host = self.host().to_string();
            match err {
                Error::AuthenticationFailed { .. } if !reauthenticated => {
                    reauthenticated = true;
                    let Some(credential) = self.prompt.ask(&format!("Password for {host}: "))
                    else {
                        log::warn!("Authentication failed on {host} and no credential is available");
                        return Err(err);
                    };
                    log::warn!("Authentication failed on {host}, retrying once");
                    self.transport.authenticate(&credential)?;
                }
                Error::Disconnected { .. } if !reconnected => {
                    reconnected = true;
                    log::warn!("Lost connection to {host}, reconnecting once");
                    self.transport.reconnect()?;
                }
                err => {
                    if err.is_transport() {
                        log::warn!("Giving up on {host}: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// One transport call, answering at most one sudo prompt.
    fn exec_once(&mut self, line: &str) -> Result<RawOutput> {
        let interactive = self.privilege.is_some();
        let host = self.transport.host().to_string();
        let cache = &mut self.sudo_password;
        let prompt = &mut self.prompt;
        let mut answered = false;
        let mut responder = |_: &str| {
            if answered {
                return None;
            }
            answered = true;
            if cache.is_none() {
                *cache = prompt.ask(&format!("[sudo] password on {host}: "));
            }
            cache.clone()
        };

        let output = self.transport.exec(line, interactive, &mut responder)?;
        if answered && rejected_password(&output.stderr) {
            log::warn!("sudo rejected the password on {host}");
            self.sudo_password = None;
        }
        Ok(output)
    }

    fn record(&mut self, command: &str, args: Vec<String>, result: &CommandResult) {
        self.history.push(HistoryEntry {
            command: command.to_string(),
            args,
            result: result.clone(),
            at: Utc::now(),
        });
    }
}

/// Privilege escalation that ends when dropped.
pub struct Escalation<'a> {
    session: &'a mut Session,
    previous: Option<Privilege>,
}

impl Deref for Escalation<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for Escalation<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for Escalation<'_> {
    fn drop(&mut self) {
        self.session.privilege = self.previous.take();
    }
}

fn rejected_password(stderr: &str) -> bool {
    stderr.contains("incorrect password") || stderr.contains("Sorry, try again")
}

fn settle(output: RawOutput, line: &str, subject: &str) -> CommandResult {
    if output.exit_status == 0 {
        return CommandResult::success(
            Value::Text(output.stdout.clone()),
            output.stdout,
            output.stderr,
        );
    }
    let error = Error::from_stderr(&output.stderr, subject, line, output.exit_status);
    CommandResult::failure(error, output.exit_status, output.stdout, output.stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::FixedPrompt;
    use crate::result::TRANSPORT_FAILURE;
    use crate::transport::{RawOutput, ScriptedTransport};
    use tempfile::NamedTempFile;

    fn auth_failure() -> Error {
        Error::AuthenticationFailed {
            host: "web1".to_string(),
            message: "Permission denied (password)".to_string(),
        }
    }

    fn disconnect() -> Error {
        Error::Disconnected {
            host: "web1".to_string(),
            message: "Broken pipe".to_string(),
        }
    }

    #[test]
    fn test_auth_failure_retried_exactly_once() {
        let second = Error::AuthenticationFailed {
            host: "web1".to_string(),
            message: "second".to_string(),
        };
        let transport = ScriptedTransport::remote("web1")
            .expect("touch", auth_failure())
            .expect("touch", second.clone())
            .always("touch", RawOutput::ok(""));
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport))
            .with_prompt(Box::new(FixedPrompt::new(["pw1", "pw2"])));

        let result = session.execute("touch /x");

        assert!(result.failed());
        assert_eq!(result.exit_status(), TRANSPORT_FAILURE);
        assert_eq!(result.error(), Some(&second));
        assert_eq!(journal.lines().len(), 2);
        assert_eq!(journal.credentials(), ["pw1"]);
    }

    #[test]
    fn test_auth_failure_without_credential_is_not_retried() {
        let transport = ScriptedTransport::remote("web1").always("touch", auth_failure());
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        let result = session.execute("touch /x");

        assert!(result.failed());
        assert_eq!(journal.lines().len(), 1);
    }

    #[test]
    fn test_disconnect_reconnects_once() {
        let transport = ScriptedTransport::remote("web1")
            .expect("uptime", disconnect())
            .expect("uptime", RawOutput::ok("up 3 days\n"));
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        let result = session.execute("uptime");

        assert!(!result.failed());
        assert_eq!(result.text(), Some("up 3 days\n"));
        assert_eq!(journal.reconnects(), 1);
    }

    #[test]
    fn test_second_disconnect_is_terminal() {
        let transport = ScriptedTransport::remote("web1").always("uptime", disconnect());
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        let result = session.execute("uptime");

        assert!(matches!(result.error(), Some(Error::Disconnected { .. })));
        assert_eq!(journal.lines().len(), 2);
        assert_eq!(journal.reconnects(), 1);
    }

    #[test]
    fn test_cd_missing_directory() {
        let transport = ScriptedTransport::remote("web1").expect(
            "cd missing",
            RawOutput::status(1, "bash: line 1: cd: missing: No such file or directory\n"),
        );
        let mut session = Session::new(Box::new(transport));

        let result = session.cd("missing");

        assert!(result.failed());
        assert_eq!(result.exit_status(), 1);
        assert_eq!(
            result.error(),
            Some(&Error::NotFound {
                path: "missing".to_string()
            })
        );
        assert_eq!(session.cwd(), None);
    }

    #[test]
    fn test_cd_tracks_cwd_for_later_commands() {
        let transport = ScriptedTransport::remote("web1")
            .expect("cd /srv", RawOutput::ok("/srv\n"))
            .expect("cd app", RawOutput::ok("/srv/app\n"));
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        assert!(!session.cd("/srv").failed());
        let result = session.cd("app");
        assert_eq!(result.text(), Some("/srv/app"));
        session.execute("ls");

        assert_eq!(session.cwd(), Some("/srv/app"));
        assert_eq!(journal.lines()[1], "cd /srv && cd app && pwd");
        assert_eq!(journal.last_line().unwrap(), "cd /srv/app && ls");
    }

    #[test]
    fn test_resolve_relative_paths() {
        let transport = ScriptedTransport::remote("web1").expect("pwd", RawOutput::ok("/home/deploy\n"));
        let mut session = Session::new(Box::new(transport));

        assert_eq!(session.resolve("/etc/hosts").unwrap(), "/etc/hosts");
        assert_eq!(session.resolve("notes.txt").unwrap(), "/home/deploy/notes.txt");
        assert_eq!(session.resolve("./a/b").unwrap(), "/home/deploy/a/b");
        assert_eq!(session.cwd(), Some("/home/deploy"));
    }

    #[test]
    fn test_su_wraps_and_restores() {
        let transport = ScriptedTransport::remote("web1");
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        session.su(Some("postgres"), |s| {
            assert!(s.is_privileged());
            s.execute("whoami");
        });
        session.execute("whoami");

        let lines = journal.lines();
        assert!(lines[0].starts_with("sudo -S -p "));
        assert!(lines[0].contains(" -u postgres -s -- sh -c "));
        assert_eq!(lines[1], "whoami");
        assert!(!session.is_privileged());
    }

    #[test]
    fn test_local_sudo_has_no_shell_flag() {
        let transport = ScriptedTransport::local();
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        session.su(None, |s| s.execute("id -u"));

        let line = journal.last_line().unwrap();
        assert!(line.starts_with("sudo -S -p "));
        assert!(!line.contains(" -s --"));
        let words = shlex::split(&line).unwrap();
        assert_eq!(&words[words.len() - 3..], ["sh", "-c", "id -u"]);
    }

    #[test]
    fn test_sudo_password_asked_once_and_cached() {
        let transport = ScriptedTransport::remote("web1").with_sudo_password("s3cret");
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport))
            .with_prompt(Box::new(FixedPrompt::new(["s3cret"])));

        let first = session.su(None, |s| s.execute("true"));
        let second = session.su(None, |s| s.execute("true"));

        assert!(!first.failed());
        assert!(!second.failed());
        assert_eq!(journal.prompts(), 2);
    }

    #[test]
    fn test_wrong_sudo_password_is_forgotten() {
        let transport = ScriptedTransport::remote("web1").with_sudo_password("right");
        let mut session = Session::new(Box::new(transport))
            .with_sudo_password("wrong")
            .with_prompt(Box::new(FixedPrompt::new(["right"])));

        let first = session.su(None, |s| s.execute("true"));
        let second = session.su(None, |s| s.execute("true"));

        assert!(first.failed());
        assert!(!second.failed());
    }

    #[test]
    fn test_privileged_upload_is_staged() {
        let mut source = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut source, b"listen 80;").unwrap();

        let transport = ScriptedTransport::remote("web1").with_sudo_password("pw");
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport)).with_sudo_password("pw");

        let result = session.su(None, |s| s.upload(source.path(), "/etc/nginx/site.conf"));

        assert!(!result.failed());
        let uploads = journal.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].dest.starts_with("/tmp/.rigger-upload-"));
        assert_eq!(uploads[0].contents, "listen 80;");

        let lines = journal.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("cp /tmp/.rigger-upload-"));
        assert!(lines[0].contains("/etc/nginx/site.conf"));
        assert!(lines[1].contains("rm -f /tmp/.rigger-upload-"));
    }

    #[test]
    fn test_staging_removed_when_copy_fails() {
        let source = NamedTempFile::new().unwrap();
        let transport = ScriptedTransport::remote("web1")
            .expect("cp ", RawOutput::status(1, "cp: cannot create regular file: Read-only file system"));
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        let result = session.su(None, |s| s.upload(source.path(), "/etc/x"));

        assert!(result.failed());
        assert!(journal.last_line().unwrap().contains("rm -f"));
    }

    #[test]
    fn test_plain_upload_goes_direct() {
        let source = NamedTempFile::new().unwrap();
        let transport = ScriptedTransport::remote("web1");
        let journal = transport.journal();
        let mut session = Session::new(Box::new(transport));

        assert!(!session.upload(source.path(), "/srv/x").failed());
        assert_eq!(journal.uploads()[0].dest, "/srv/x");
        assert!(journal.lines().is_empty());
    }

    #[test]
    fn test_history_records_commands() {
        let mut session = Session::new(Box::new(ScriptedTransport::remote("web1")));
        session.run("chmod", &["755", "/srv/run.sh"]);
        session.execute("uptime");

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].command, "chmod");
        assert_eq!(history[0].args, ["755", "/srv/run.sh"]);
        assert_eq!(history[1].command, "uptime");
    }

    #[test]
    fn test_failed_command_classified_against_subject() {
        let transport = ScriptedTransport::remote("web1").expect(
            "rm",
            RawOutput::status(1, "rm: cannot remove '/srv/x': Permission denied"),
        );
        let mut session = Session::new(Box::new(transport));

        let result = session.run("rm", &["/srv/x"]);

        assert_eq!(
            result.error(),
            Some(&Error::PermissionDenied {
                path: "/srv/x".to_string()
            })
        );
    }

    #[test]
    fn test_local_session_runs_commands() {
        let mut session = Session::local();
        let result = session.execute("echo hi");
        assert_eq!(result.text(), Some("hi\n"));
        assert!(session.cwd().is_some());
    }
}
