//! A transport that answers from a script instead of running anything.
//!
//! Used by tests across the workspace to drive sessions and adapters
//! without a shell or a network. Replies are matched by substring against
//! the composed command line, in the order they were added.

use super::{RawOutput, Responder, SUDO_PROMPT, Transport, TransportKind};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// What a scripted rule answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The command ran with this output
    Output(RawOutput),
    /// The transport failed
    Fail(Error),
}

impl From<RawOutput> for Reply {
    fn from(output: RawOutput) -> Self {
        Reply::Output(output)
    }
}

impl From<Error> for Reply {
    fn from(err: Error) -> Self {
        Reply::Fail(err)
    }
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: Reply,
    persistent: bool,
}

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub source: PathBuf,
    pub dest: String,
    pub contents: String,
}

#[derive(Debug, Default)]
struct Journal {
    lines: Vec<String>,
    uploads: Vec<Upload>,
    credentials: Vec<String>,
    reconnects: usize,
    prompts: usize,
}

/// Shared view of everything a [`ScriptedTransport`] was asked to do.
///
/// Clone it before handing the transport to a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptJournal {
    inner: Arc<Mutex<Journal>>,
}

impl ScriptJournal {
    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Command lines in execution order.
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    /// Last command line, if any.
    pub fn last_line(&self) -> Option<String> {
        self.lock().lines.last().cloned()
    }

    /// Uploads in order.
    pub fn uploads(&self) -> Vec<Upload> {
        self.lock().uploads.clone()
    }

    /// Credentials passed to `authenticate`.
    pub fn credentials(&self) -> Vec<String> {
        self.lock().credentials.clone()
    }

    /// Number of reconnects.
    pub fn reconnects(&self) -> usize {
        self.lock().reconnects
    }

    /// Number of password prompts raised.
    pub fn prompts(&self) -> usize {
        self.lock().prompts
    }
}

/// Transport replaying scripted replies.
#[derive(Debug)]
pub struct ScriptedTransport {
    kind: TransportKind,
    host: String,
    rules: Vec<Rule>,
    sudo_password: Option<String>,
    upload_error: Option<Error>,
    journal: ScriptJournal,
}

impl ScriptedTransport {
    /// A scripted remote host.
    pub fn remote(host: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Remote,
            host: host.into(),
            rules: Vec::new(),
            sudo_password: None,
            upload_error: None,
            journal: ScriptJournal::default(),
        }
    }

    /// A scripted local machine.
    pub fn local() -> Self {
        Self {
            kind: TransportKind::Local,
            ..Self::remote("localhost")
        }
    }

    /// Answer the next line containing `needle` once.
    #[must_use]
    pub fn expect(mut self, needle: impl Into<String>, reply: impl Into<Reply>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: reply.into(),
            persistent: false,
        });
        self
    }

    /// Answer every line containing `needle`.
    #[must_use]
    pub fn always(mut self, needle: impl Into<String>, reply: impl Into<Reply>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: reply.into(),
            persistent: true,
        });
        self
    }

    /// Raise a sudo prompt for escalated lines and require `password`.
    #[must_use]
    pub fn with_sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(password.into());
        self
    }

    /// Make every upload fail with `err`.
    #[must_use]
    pub fn failing_uploads(mut self, err: Error) -> Self {
        self.upload_error = Some(err);
        self
    }

    /// Handle on the journal.
    pub fn journal(&self) -> ScriptJournal {
        self.journal.clone()
    }

    fn reply_for(&mut self, line: &str) -> Reply {
        let Some(index) = self.rules.iter().position(|rule| line.contains(&rule.needle)) else {
            return Reply::Output(RawOutput::default());
        };
        if self.rules[index].persistent {
            self.rules[index].reply.clone()
        } else {
            self.rules.remove(index).reply
        }
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
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
        self.journal.lock().lines.push(line.to_string());

        if let Some(expected) = &self.sudo_password
            && line.contains("sudo -S")
        {
            let answer = if interactive {
                self.journal.lock().prompts += 1;
                responder(SUDO_PROMPT.trim())
            } else {
                None
            };
            if answer.as_deref() != Some(expected.as_str()) {
                return Ok(RawOutput::status(
                    1,
                    "Sorry, try again.\nsudo: 1 incorrect password attempt\n",
                ));
            }
        }

        match self.reply_for(line) {
            Reply::Output(output) => Ok(output),
            Reply::Fail(err) => Err(err),
        }
    }

    fn upload(&mut self, source: &Path, dest: &str) -> Result<()> {
        if let Some(err) = &self.upload_error {
            return Err(err.clone());
        }
        let contents = fs::read_to_string(source).map_err(|err| Error::from_io(&err, &source.display().to_string()))?;
        self.journal.lock().uploads.push(Upload {
            source: source.to_path_buf(),
            dest: dest.to_string(),
            contents,
        });
        Ok(())
    }

    fn authenticate(&mut self, credential: &str) -> Result<()> {
        self.journal.lock().credentials.push(credential.to_string());
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        self.journal.lock().reconnects += 1;
        Ok(())
    }
}
