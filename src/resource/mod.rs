//! Files, directories and links on a host
//!
//! Every resource is built the same way:
//! - Read the current state through the host's adapter
//! - Run the mutation as a guarded [`Command`], skipped when nothing differs
//! - Record the attribute transition on the resource's state machine
//!
//! A resource does not hold its host. Each call receives the [`Host`] it
//! operates on, and the adapter is picked from that host on first use.

pub mod directory;
pub mod file;
pub mod link;

#[cfg(test)]
pub(crate) mod testing;

pub use directory::Directory;
pub use file::File;
pub use link::Link;

use crate::host::Host;
use converge::{Command, Criteria, Engine, Notice, ResourceRef, State, StateMachine, Transition};
use hostfs::{Adapter, Stat, adapter};
use shellkit::{CommandResult, Session};

/// What resource commands run against.
pub struct Target<'s> {
    pub session: &'s mut Session,
    pub fs: &'s mut dyn Adapter,
}

/// A command on `operation` whose context is a [`Target`].
pub(crate) fn command<'a, 's>(operation: &str) -> Command<'a, Target<'s>> {
    Command::new(operation)
}

/// State shared by every resource type.
pub struct Entry {
    path: String,
    adapter: Option<Box<dyn Adapter>>,
    machine: StateMachine,
    batching: bool,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("adapter", &self.adapter.as_ref().map(|a| a.name()))
            .field("machine", &self.machine)
            .field("batching", &self.batching)
            .finish()
    }
}

/// Borrowed pieces of an entry and its host for one operation.
pub(crate) struct Parts<'e> {
    pub target: Target<'e>,
    pub engine: &'e Engine,
    machine: &'e mut StateMachine,
    batching: bool,
}

impl Parts<'_> {
    /// Record `transitions` caused by `result`.
    ///
    /// Outside a batch they are published right away; inside one they wait
    /// for the batch to end.
    pub fn settle(&mut self, result: &CommandResult, mut transitions: Vec<Transition>) {
        if self.batching {
            for transition in transitions {
                self.machine.update(result, transition);
            }
            return;
        }
        let last = transitions.pop();
        for transition in transitions {
            self.machine.update(result, transition);
        }
        self.machine.persist(result, last, self.engine.bus());
    }

    pub fn privileged(&self) -> bool {
        self.target.session.is_privileged()
    }
}

impl Entry {
    pub fn new(host: &str, kind: &str, path: String) -> Self {
        Self {
            machine: StateMachine::new(ResourceRef::new(host, kind, path.clone())),
            path,
            adapter: None,
            batching: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> State {
        self.machine.state()
    }

    pub fn resource(&self) -> &ResourceRef {
        self.machine.resource()
    }

    /// Events recorded inside an unfinished batch.
    #[cfg(test)]
    pub fn pending(&self) -> &[converge::Event] {
        self.machine.pending()
    }

    /// Use `adapter` instead of picking one from the host.
    #[cfg(test)]
    pub fn set_adapter(&mut self, adapter: Box<dyn Adapter>) {
        self.adapter = Some(adapter);
    }

    pub(crate) fn parts<'e>(&'e mut self, host: &'e mut Host) -> Parts<'e> {
        let local = host.is_local();
        let (session, engine) = host.split();
        let fs = self.adapter.get_or_insert_with(|| {
            let adapter = adapter::select(local);
            log::debug!("{} uses the {} adapter", self.machine.resource(), adapter.name());
            adapter
        });
        Parts {
            target: Target {
                session,
                fs: fs.as_mut(),
            },
            engine,
            machine: &mut self.machine,
            batching: self.batching,
        }
    }

    pub fn stat(&mut self, host: &mut Host) -> shellkit::Result<Stat> {
        let path = self.path.clone();
        let Parts { target, .. } = self.parts(host);
        target.fs.stat(target.session, &path)
    }

    pub fn exists(&mut self, host: &mut Host) -> shellkit::Result<bool> {
        let path = self.path.clone();
        let Parts { target, .. } = self.parts(host);
        target.fs.exists(target.session, &path)
    }

    /// Set permission bits; `mode` is masked to `0o7777`.
    ///
    /// On a link this is the mode of what it points at.
    pub fn chmod(&mut self, host: &mut Host, mode: u32) -> CommandResult {
        let mode = mode & 0o7777;
        let path = self.path.clone();
        let mut parts = self.parts(host);
        let before = parts.target.fs.mode(parts.target.session, &path).ok();

        let result = command("chmod")
            .arg(format!("{mode:o}"))
            .arg(&path)
            .change_if(Criteria::flag(before != Some(mode)))
            .succeeds_if(|t, _| t.fs.mode(t.session, &path).is_ok_and(|now| now == mode))
            .run(parts.engine, &mut parts.target, |t| t.fs.chmod(t.session, &path, mode));

        let privileged = parts.privileged();
        parts.settle(
            &result,
            vec![
                Transition::new(
                    "mode",
                    before.map(|mode| format!("{mode:o}")),
                    Some(format!("{mode:o}")),
                )
                .privileged(privileged),
            ],
        );
        result
    }

    /// Set owner and/or group, by name or numeric id.
    ///
    /// Both attributes land in one commit.
    pub fn chown(
        &mut self,
        host: &mut Host,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> CommandResult {
        let path = self.path.clone();
        let mut parts = self.parts(host);
        let before = parts.target.fs.stat(parts.target.session, &path).ok();

        let owner_differs = owner.is_some_and(|owner| {
            before
                .as_ref()
                .is_none_or(|stat| !names(owner, stat.owner.as_deref(), stat.uid))
        });
        let group_differs = group.is_some_and(|group| {
            before
                .as_ref()
                .is_none_or(|stat| !names(group, stat.group.as_deref(), stat.gid))
        });

        let result = command("chown")
            .arg(format!("{}:{}", owner.unwrap_or(""), group.unwrap_or("")))
            .arg(&path)
            .change_if(Criteria::flag(owner_differs || group_differs))
            .succeeds_if(|t, _| {
                t.fs.stat(t.session, &path).is_ok_and(|stat| {
                    owner.is_none_or(|o| names(o, stat.owner.as_deref(), stat.uid))
                        && group.is_none_or(|g| names(g, stat.group.as_deref(), stat.gid))
                })
            })
            .run(parts.engine, &mut parts.target, |t| {
                t.fs.chown(t.session, &path, owner, group)
            });

        if result.failed() || result.is_no_change() {
            return result;
        }
        let after = parts.target.fs.stat(parts.target.session, &path).ok();
        let privileged = parts.privileged();
        let label = |stat: &Option<Stat>, owner: bool| {
            stat.as_ref().map(|stat| {
                if owner {
                    stat.owner_label()
                } else {
                    stat.group_label()
                }
            })
        };
        let mut transitions = Vec::new();
        if owner.is_some() {
            transitions.push(
                Transition::new("owner", label(&before, true), label(&after, true))
                    .privileged(privileged),
            );
        }
        if group.is_some() {
            transitions.push(
                Transition::new("group", label(&before, false), label(&after, false))
                    .privileged(privileged),
            );
        }
        parts.settle(&result, transitions);
        result
    }

    /// Remove the entry. The `exists` event goes out at once, even in a batch.
    pub fn delete(&mut self, host: &mut Host, recursive: bool) -> CommandResult {
        let path = self.path.clone();
        let parts = self.parts(host);
        let Parts {
            mut target,
            engine,
            machine,
            ..
        } = parts;
        let existed = target.fs.exists(target.session, &path).unwrap_or(true);
        let privileged = target.session.is_privileged();

        let result = command("delete")
            .arg(&path)
            .change_if(Criteria::flag(existed))
            .succeeds_if(|t, _| t.fs.exists(t.session, &path).is_ok_and(|exists| !exists))
            .run(engine, &mut target, |t| t.fs.delete(t.session, &path, recursive));

        if !result.is_no_change() {
            let transition = Transition::new(
                "exists",
                Some(existed.to_string()),
                Some("false".to_string()),
            )
            .privileged(privileged);
            machine.delete(&result, Some(transition), engine.bus());
        }
        result
    }

    /// Move the entry to `to`; on success the resource follows it.
    pub fn rename(&mut self, host: &mut Host, to: &str) -> CommandResult {
        let to = match host.session_mut().resolve(to) {
            Ok(to) => to,
            Err(err) => return CommandResult::from_error(err),
        };
        let from = self.path.clone();
        let host_name = host.name().to_string();
        let kind = self.resource().kind.clone();

        let Parts {
            mut target,
            engine,
            machine,
            ..
        } = self.parts(host);
        let source = target.fs.exists(target.session, &from).unwrap_or(true);
        let dest = target.fs.exists(target.session, &to).unwrap_or(false);
        let notice = Notice::new(
            machine.resource().clone(),
            "path",
            Some(from.clone()),
            Some(to.clone()),
        )
        .privileged(target.session.is_privileged());

        let (result, moved) = engine.bus().notify_about_if(
            notice,
            |result: &CommandResult| !result.failed() && !result.is_no_change(),
            || {
                command("rename")
                    .arg(&from)
                    .arg(&to)
                    .change_if(Criteria::flag(from != to && (source || !dest)))
                    .succeeds_if(|t, _| t.fs.exists(t.session, &to).unwrap_or(false))
                    .run(engine, &mut target, |t| t.fs.rename(t.session, &from, &to))
            },
        );

        if moved {
            machine.rebind(ResourceRef::new(host_name, kind, to.clone()));
            self.path = to;
        }
        result
    }

    fn begin_batch(&mut self) {
        self.batching = true;
    }

    fn end_batch(&mut self, host: &Host) -> usize {
        self.batching = false;
        if self.machine.state() == State::Dirtied {
            self.machine.commit(host.bus())
        } else {
            0
        }
    }
}

/// Whether `wanted` names the account `name` with id `id`.
fn names(wanted: &str, name: Option<&str>, id: u32) -> bool {
    name == Some(wanted) || wanted.parse::<u32>().is_ok_and(|wanted| wanted == id)
}

/// Parse an octal mode such as `755`, `0640` or `0o600`.
pub fn parse_mode(text: &str) -> Option<u32> {
    let digits = text.strip_prefix("0o").unwrap_or(text);
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
}

/// Split `owner`, `owner:group` or `:group`. Empty halves are `None`.
pub fn parse_owner(spec: &str) -> (Option<&str>, Option<&str>) {
    fn some(s: &str) -> Option<&str> {
        (!s.is_empty()).then_some(s)
    }
    let (owner, group) = spec.split_once(':').unwrap_or((spec, ""));
    (some(owner), some(group))
}

/// Operations every resource type supports.
pub trait Resource {
    /// Whether deleting removes contents too.
    const RECURSIVE_DELETE: bool = false;

    fn entry(&self) -> &Entry;

    fn entry_mut(&mut self) -> &mut Entry;

    fn path(&self) -> &str {
        self.entry().path()
    }

    fn state(&self) -> State {
        self.entry().state()
    }

    fn stat(&mut self, host: &mut Host) -> shellkit::Result<Stat> {
        self.entry_mut().stat(host)
    }

    fn exists(&mut self, host: &mut Host) -> shellkit::Result<bool> {
        self.entry_mut().exists(host)
    }

    fn chmod(&mut self, host: &mut Host, mode: u32) -> CommandResult {
        self.entry_mut().chmod(host, mode)
    }

    fn chown(&mut self, host: &mut Host, owner: Option<&str>, group: Option<&str>) -> CommandResult {
        self.entry_mut().chown(host, owner, group)
    }

    fn delete(&mut self, host: &mut Host) -> CommandResult {
        self.entry_mut().delete(host, Self::RECURSIVE_DELETE)
    }

    fn rename(&mut self, host: &mut Host, to: &str) -> CommandResult {
        self.entry_mut().rename(host, to)
    }

    /// Run several mutations and publish their events as one commit.
    ///
    /// Deletions still announce themselves immediately.
    fn batch<R>(&mut self, host: &mut Host, f: impl FnOnce(&mut Self, &mut Host) -> R) -> R
    where
        Self: Sized,
    {
        self.entry_mut().begin_batch();
        let output = f(self, host);
        let published = self.entry_mut().end_batch(host);
        log::debug!(
            "{} committed {published} events, now {:?}",
            self.entry().resource(),
            self.state()
        );
        output
    }
}
