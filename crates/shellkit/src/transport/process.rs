//! Child-process plumbing shared by the local and OpenSSH transports.

use super::{RawOutput, Responder};
use regex::Regex;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::thread;

/// Prompt passed to `sudo -p` so the prompt is recognizable on stderr.
pub const SUDO_PROMPT: &str = "[rigger-sudo] password: ";

/// Exit status reported for a child killed by a signal.
const SIGNALLED: i32 = -1;

static DEFAULT_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\[rigger-sudo\] password: |\[sudo\] password for [^:\n]*: ?|^password: ?)$")
        .unwrap_or_else(|_| unreachable!("static prompt pattern is valid"))
});

/// Recognizes password prompts in the unterminated tail of stderr.
#[derive(Debug, Clone)]
pub struct PromptDetector {
    pattern: Regex,
}

impl Default for PromptDetector {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PROMPT.clone(),
        }
    }
}

impl PromptDetector {
    /// Detector using a custom pattern.
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }

    /// Whether `tail` (text after the last newline) is a prompt.
    pub fn is_prompt(&self, tail: &str) -> bool {
        self.pattern.is_match(tail)
    }
}

/// Why a child did not run to completion.
#[derive(Debug)]
pub(crate) enum Failure {
    /// The program could not be started
    Spawn(io::Error),
    /// Talking to a started child failed. The child has been killed and
    /// reaped, but it may already have done some of its work.
    Io(io::Error),
}

/// Run `command`, capturing output and answering prompts while it runs.
///
/// Stdout is drained on a helper thread; stderr is read here so prompts can
/// be spotted before the child blocks waiting for an answer. Prompt text is
/// not kept in the captured stderr.
pub(crate) fn run(
    mut command: Command,
    interactive: bool,
    detector: &PromptDetector,
    responder: &mut Responder<'_>,
) -> Result<RawOutput, Failure> {
    command
        .stdin(if interactive {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(Failure::Spawn)?;
    communicate(&mut child, detector, responder).map_err(|err| {
        reap(&mut child);
        Failure::Io(err)
    })
}

/// Kill and wait for a child we stopped talking to.
fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        log::debug!("Could not kill child {}: {err}", child.id());
    }
    if let Err(err) = child.wait() {
        log::warn!("Could not reap child {}: {err}", child.id());
    }
}

fn communicate(
    child: &mut Child,
    detector: &PromptDetector,
    responder: &mut Responder<'_>,
) -> io::Result<RawOutput> {
    let mut stdin = child.stdin.take();
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let reader = thread::spawn(move || -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf)?;
        Ok(buf)
    });

    let mut stderr = Vec::new();
    let mut line_start = 0;
    let mut chunk = [0u8; 1024];
    loop {
        let n = stderr_pipe.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        stderr.extend_from_slice(&chunk[..n]);

        if let Some(pipe) = stdin.as_mut() {
            let tail = String::from_utf8_lossy(&stderr[line_start..]).into_owned();
            if detector.is_prompt(&tail) {
                stderr.truncate(line_start);
                let answered = match responder(tail.trim()) {
                    Some(answer) => {
                        writeln!(pipe, "{answer}")?;
                        pipe.flush()?;
                        true
                    }
                    None => false,
                };
                if !answered {
                    log::debug!("No answer for prompt, closing stdin");
                    stdin = None;
                }
                continue;
            }
        }

        if let Some(pos) = stderr[line_start..].iter().rposition(|b| *b == b'\n') {
            line_start += pos + 1;
        }
    }

    drop(stdin);
    let stdout = reader
        .join()
        .map_err(|_| io::Error::other("stdout reader panicked"))??;
    let status = child.wait()?;

    Ok(RawOutput {
        exit_status: status.code().unwrap_or(SIGNALLED),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
