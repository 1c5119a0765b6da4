//! Remote transport built on the system OpenSSH client.
//!
//! Each exec is a fresh `ssh` invocation multiplexed over a control master,
//! so the TCP connection and login are paid once per host. Passwords are
//! handed to `sshpass` through the environment, never on the command line.

use super::process::{self, Failure, PromptDetector};
use super::{RawOutput, Responder, Transport, TransportKind};
use crate::error::{Error, Result};
use crate::result::TRANSPORT_FAILURE;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// `sshpass` exit status for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// How long an idle control master stays around.
const CONTROL_PERSIST: &str = "60s";

/// Connection settings for [`SshTransport`].
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    /// Login user; defaults to whatever ssh picks
    pub user: Option<String>,
    /// Port; defaults to 22 via ssh config
    pub port: Option<u16>,
    /// Private key file
    pub identity_file: Option<PathBuf>,
    /// Login password, used through `sshpass`
    pub password: Option<String>,
    /// Seconds to wait for the TCP connection
    pub connect_timeout: Option<u32>,
    /// Directory for control sockets; defaults to the temp dir
    pub control_dir: Option<PathBuf>,
    /// Extra raw `-o` style arguments
    pub extra_args: Vec<String>,
}

/// Runs shell lines on a remote host through `ssh`.
#[derive(Debug)]
pub struct SshTransport {
    host: String,
    options: SshOptions,
    control_path: PathBuf,
    detector: PromptDetector,
}

impl SshTransport {
    /// Create a transport for `host`. No connection is made until the first exec.
    pub fn new(host: impl Into<String>, options: SshOptions) -> Self {
        let host = host.into();
        let dir = options
            .control_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let control_path = dir.join(format!("rigger-{}-{}.sock", std::process::id(), sanitize(&host)));
        Self {
            host,
            options,
            control_path,
            detector: PromptDetector::default(),
        }
    }

    /// `user@host` or plain `host`.
    fn destination(&self) -> String {
        match &self.options.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Common `-o` options shared by ssh and scp.
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "-o".to_string(),
            format!("ControlPersist={CONTROL_PERSIST}"),
        ];
        if self.options.password.is_none() {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        if let Some(timeout) = self.options.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={timeout}"));
        }
        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.extend(self.options.extra_args.iter().cloned());
        args
    }

    /// Start a command for `program`, wrapped in `sshpass` when a password is set.
    fn command(&self, program: &str) -> Command {
        match &self.options.password {
            Some(password) => {
                let mut command = Command::new("sshpass");
                command.arg("-e").arg(program).env("SSHPASS", password);
                command
            }
            None => Command::new(program),
        }
    }

    /// Build the ssh invocation for `line`.
    pub fn ssh_command(&self, line: &str) -> Command {
        let mut command = self.command("ssh");
        command.args(self.common_args());
        if let Some(port) = self.options.port {
            command.arg("-p").arg(port.to_string());
        }
        command.arg(self.destination()).arg("--").arg(line);
        command
    }

    /// Build the scp invocation copying `source` to `dest`.
    pub fn scp_command(&self, source: &Path, dest: &str) -> Command {
        let mut command = self.command("scp");
        command.arg("-q").args(self.common_args());
        if let Some(port) = self.options.port {
            command.arg("-P").arg(port.to_string());
        }
        command
            .arg(source)
            .arg(format!("{}:{dest}", self.destination()));
        command
    }

    /// Ask the control master to exit. Errors are ignored: there may be none.
    fn close_master(&self) {
        let status = Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-O")
            .arg("exit")
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Ok(status) = status
            && status.success()
        {
            log::debug!("Closed control master for {}", self.host);
        }
    }

    fn spawn_error(&self, err: &io::Error) -> Error {
        Error::Disconnected {
            host: self.host.clone(),
            message: format!("could not start ssh: {err}"),
        }
    }
}

impl Transport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Remote
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn exec(
        &mut self,
        line: &str,
        interactive: bool,
        responder: &mut Responder<'_>,
    ) -> Result<RawOutput> {
        log::debug!("Running on {}: {line}", self.host);
        let command = self.ssh_command(line);
        let output = match process::run(command, interactive, &self.detector, responder) {
            Ok(output) => output,
            Err(Failure::Spawn(err)) => return Err(self.spawn_error(&err)),
            // The command may have run: not a reason to reconnect and retry.
            Err(Failure::Io(err)) => {
                return Err(Error::Io {
                    message: format!("lost contact with ssh on {}: {err}", self.host),
                });
            }
        };

        match classify_ssh_failure(&self.host, output.exit_status, &output.stderr) {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }

    fn upload(&mut self, source: &Path, dest: &str) -> Result<()> {
        log::debug!("Uploading {} to {}:{dest}", source.display(), self.host);
        let output = self
            .scp_command(source, dest)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| self.spawn_error(&err))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = output.status.code().unwrap_or(TRANSPORT_FAILURE);
        if output.status.success() {
            return Ok(());
        }
        if let Some(err) = classify_ssh_failure(&self.host, status, &stderr) {
            return Err(err);
        }
        Err(Error::from_stderr(&stderr, dest, "scp", status))
    }

    fn authenticate(&mut self, credential: &str) -> Result<()> {
        self.options.password = Some(credential.to_string());
        self.close_master();
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        log::info!("Reconnecting to {}", self.host);
        self.close_master();
        Ok(())
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        self.close_master();
    }
}

/// Turn an ssh-level failure into a transport error.
///
/// Returns `None` when the exit status belongs to the remote command.
pub fn classify_ssh_failure(host: &str, exit_status: i32, stderr: &str) -> Option<Error> {
    if exit_status != TRANSPORT_FAILURE && exit_status != SSHPASS_BAD_PASSWORD {
        return None;
    }

    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if exit_status == SSHPASS_BAD_PASSWORD
        || lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
    {
        return Some(Error::AuthenticationFailed {
            host: host.to_string(),
            message,
        });
    }

    let dropped = [
        "connection closed",
        "connection reset",
        "connection refused",
        "connection timed out",
        "broken pipe",
        "could not resolve hostname",
        "no route to host",
    ];
    if dropped.iter().any(|needle| lower.contains(needle))
        || (lower.contains("connection to") && lower.contains("closed"))
    {
        return Some(Error::Disconnected {
            host: host.to_string(),
            message,
        });
    }

    None
}

/// Keep only characters safe for a socket file name.
fn sanitize(host: &str) -> String {
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_classify_auth_failure() {
        let err = classify_ssh_failure("web1", 255, "alice@web1: Permission denied (publickey).\n");
        assert!(matches!(err, Some(Error::AuthenticationFailed { .. })));
    }

    #[test]
    fn test_classify_sshpass_rejection() {
        let err = classify_ssh_failure("web1", 5, "");
        assert!(matches!(err, Some(Error::AuthenticationFailed { .. })));
    }

    #[test]
    fn test_classify_disconnect() {
        let err = classify_ssh_failure("web1", 255, "Connection to web1 closed by remote host.");
        assert!(matches!(err, Some(Error::Disconnected { .. })));

        let err = classify_ssh_failure("web1", 255, "ssh: connect to host web1 port 22: Connection refused");
        assert!(matches!(err, Some(Error::Disconnected { .. })));
    }

    #[test]
    fn test_remote_permission_denied_is_not_transport() {
        // rm failing with EACCES on the far side exits 1, not 255
        let err = classify_ssh_failure("web1", 1, "rm: cannot remove 'x': Permission denied");
        assert!(err.is_none());
    }

    #[test]
    fn test_ssh_command_batch_mode_without_password() {
        let transport = SshTransport::new(
            "web1",
            SshOptions {
                user: Some("deploy".to_string()),
                port: Some(2222),
                ..SshOptions::default()
            },
        );
        let command = transport.ssh_command("uptime");
        assert_eq!(command.get_program(), "ssh");
        let args = args(&command);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert_eq!(&args[args.len() - 3..], ["deploy@web1", "--", "uptime"]);
    }

    #[test]
    fn test_password_uses_sshpass_env() {
        let transport = SshTransport::new(
            "web1",
            SshOptions {
                password: Some("secret".to_string()),
                ..SshOptions::default()
            },
        );
        let command = transport.ssh_command("true");
        assert_eq!(command.get_program(), "sshpass");
        let args = args(&command);
        assert!(!args.iter().any(|a| a.contains("secret")));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert!(
            command
                .get_envs()
                .any(|(k, v)| k == "SSHPASS" && v.is_some_and(|v| v == "secret"))
        );
    }

    #[test]
    fn test_scp_uses_capital_port() {
        let transport = SshTransport::new(
            "web1",
            SshOptions {
                port: Some(2222),
                ..SshOptions::default()
            },
        );
        let command = transport.scp_command(Path::new("/tmp/a"), "/etc/a");
        let args = args(&command);
        assert!(args.windows(2).any(|w| w == ["-P", "2222"]));
        assert_eq!(args.last().map(String::as_str), Some("web1:/etc/a"));
    }

    #[test]
    fn test_sanitize_host() {
        assert_eq!(sanitize("db-1.example.com"), "db-1.example.com");
        assert_eq!(sanitize("fe80::1%eth0"), "fe80__1_eth0");
    }
}
