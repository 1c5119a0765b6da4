//! A machine to converge: its session plus the engine that guards and
//! reports every mutation made on it.

use crate::resource::{Directory, File, Link};
use converge::{Bus, Command, Engine, Policy};
use shellkit::{CommandResult, CredentialPrompt, Privilege, Session, SshOptions};
use std::ops::{Deref, DerefMut};
use std::path::Path;

pub struct Host {
    name: String,
    session: Session,
    engine: Engine,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("session", &self.session)
            .field("policy", self.engine.policy())
            .finish()
    }
}

impl Host {
    /// This machine.
    pub fn local(policy: Policy) -> Self {
        Self::with_session("localhost", Session::local(), policy)
    }

    /// A machine reached over SSH at `address`, known as `name`.
    pub fn remote(name: &str, address: &str, options: SshOptions, policy: Policy) -> Self {
        Self::with_session(name, Session::remote(address, options), policy)
    }

    pub fn with_session(name: impl Into<String>, session: Session, policy: Policy) -> Self {
        Self {
            name: name.into(),
            session,
            engine: Engine::new(policy),
        }
    }

    /// Ask `prompt` for login retries and sudo passwords.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Box<dyn CredentialPrompt>) -> Self {
        self.session = self.session.with_prompt(prompt);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_local(&self) -> bool {
        self.session.is_local()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn bus(&self) -> &Bus {
        self.engine.bus()
    }

    /// Borrow the session mutably and the engine shared at the same time.
    pub fn split(&mut self) -> (&mut Session, &Engine) {
        (&mut self.session, &self.engine)
    }

    /// Run a raw shell command. Never skipped: there is nothing to compare.
    pub fn run(&mut self, command: &str) -> CommandResult {
        let (session, engine) = self.split();
        Command::new("execute")
            .arg(command)
            .run(engine, session, |session| session.execute(command))
    }

    /// Change the session's working directory.
    pub fn cd(&mut self, path: &str) -> CommandResult {
        let (session, engine) = self.split();
        Command::new("cd")
            .arg(path)
            .run(engine, session, |session| session.cd(path))
    }

    /// Escalate to `user` (root when `None`) until the guard is dropped.
    pub fn escalate(&mut self, user: Option<&str>) -> Escalated<'_> {
        let previous = self.session.set_privilege(Some(Privilege {
            user: user.map(str::to_string),
        }));
        Escalated {
            host: self,
            previous,
        }
    }

    /// Run `f` as `user` (root when `None`); the previous privilege is
    /// restored afterwards, even if `f` panics.
    pub fn su<R>(&mut self, user: Option<&str>, f: impl FnOnce(&mut Self) -> R) -> R {
        let mut guard = self.escalate(user);
        f(&mut *guard)
    }

    /// Copy a local file to `dest` on this host.
    pub fn upload(&mut self, source: &Path, dest: &str) -> CommandResult {
        let (session, engine) = self.split();
        Command::new("upload")
            .arg(source.display())
            .arg(dest)
            .run(engine, session, |session| session.upload(source, dest))
    }

    pub fn file(&mut self, path: &str) -> shellkit::Result<File> {
        let path = self.session.resolve(path)?;
        Ok(File::new(&self.name, path))
    }

    pub fn directory(&mut self, path: &str) -> shellkit::Result<Directory> {
        let path = self.session.resolve(path)?;
        Ok(Directory::new(&self.name, path))
    }

    pub fn link(&mut self, path: &str) -> shellkit::Result<Link> {
        let path = self.session.resolve(path)?;
        Ok(Link::new(&self.name, path))
    }
}

/// A host running as another user; dropping it restores the privilege it
/// had before.
pub struct Escalated<'h> {
    host: &'h mut Host,
    previous: Option<Privilege>,
}

impl Deref for Escalated<'_> {
    type Target = Host;

    fn deref(&self) -> &Host {
        self.host
    }
}

impl DerefMut for Escalated<'_> {
    fn deref_mut(&mut self) -> &mut Host {
        self.host
    }
}

impl Drop for Escalated<'_> {
    fn drop(&mut self) {
        self.host.session.set_privilege(self.previous.take());
    }
}
