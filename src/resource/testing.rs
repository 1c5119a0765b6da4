//! In-memory adapter that records every mutating call.

use crate::host::Host;
use chrono::Utc;
use converge::Policy;
use hostfs::{Adapter, FileKind, Stat};
use shellkit::{CommandResult, Error, Result, ScriptedTransport, Session, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A remote host whose transport answers nothing in particular.
pub fn scripted_host(policy: Policy) -> Host {
    Host::with_session(
        "web1",
        Session::new(Box::new(ScriptedTransport::remote("web1"))),
        policy,
    )
}

#[derive(Debug, Clone)]
struct Node {
    kind: FileKind,
    mode: u32,
    owner: String,
    group: String,
    content: String,
    target: String,
}

impl Node {
    fn new(kind: FileKind, mode: u32) -> Self {
        Self {
            kind,
            mode,
            owner: "root".to_string(),
            group: "root".to_string(),
            content: String::new(),
            target: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Fs {
    nodes: BTreeMap<String, Node>,
    calls: Vec<String>,
    inert: bool,
}

/// Filesystem double. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingAdapter {
    inner: Arc<Mutex<Fs>>,
}

fn id_of(name: &str) -> u32 {
    match name {
        "root" => 0,
        other => other.parse().unwrap_or(1000),
    }
}

fn applied() -> CommandResult {
    CommandResult::applied(Value::Unit)
}

fn missing(path: &str) -> CommandResult {
    CommandResult::from_error(Error::NotFound {
        path: path.to_string(),
    })
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Fs> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_file(self, path: &str, mode: u32, content: &str) -> Self {
        let mut node = Node::new(FileKind::File, mode);
        node.content = content.to_string();
        self.lock().nodes.insert(path.to_string(), node);
        self
    }

    pub fn with_directory(self, path: &str) -> Self {
        self.lock()
            .nodes
            .insert(path.to_string(), Node::new(FileKind::Directory, 0o755));
        self
    }

    pub fn with_link(self, path: &str, target: &str) -> Self {
        let mut node = Node::new(FileKind::Symlink, 0o777);
        node.target = target.to_string();
        self.lock().nodes.insert(path.to_string(), node);
        self
    }

    /// Report success for mutations without performing them.
    pub fn inert(self) -> Self {
        self.lock().inert = true;
        self
    }

    /// Mutating calls in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.lock().nodes.get(path).map(|node| node.content.clone())
    }

    /// Log `call`, then apply `change` unless inert.
    fn mutate(
        &self,
        call: String,
        change: impl FnOnce(&mut BTreeMap<String, Node>) -> CommandResult,
    ) -> CommandResult {
        let mut fs = self.lock();
        fs.calls.push(call);
        if fs.inert {
            return applied();
        }
        change(&mut fs.nodes)
    }

    fn node(&self, path: &str) -> Result<Node> {
        self.lock().nodes.get(path).cloned().ok_or_else(|| Error::NotFound {
            path: path.to_string(),
        })
    }
}

impl Adapter for RecordingAdapter {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn stat(&mut self, _session: &mut Session, path: &str) -> Result<Stat> {
        let node = self.node(path)?;
        let now = Utc::now();
        Ok(Stat {
            path: path.to_string(),
            kind: node.kind,
            mode: node.mode,
            uid: id_of(&node.owner),
            gid: id_of(&node.group),
            owner: Some(node.owner),
            group: Some(node.group),
            size: node.content.len() as u64,
            accessed: now,
            modified: now,
            changed: now,
        })
    }

    fn exists(&mut self, _session: &mut Session, path: &str) -> Result<bool> {
        Ok(self.contains(path))
    }

    fn is_directory(&mut self, _session: &mut Session, path: &str) -> Result<bool> {
        Ok(self.node(path).is_ok_and(|node| node.kind == FileKind::Directory))
    }

    fn is_file(&mut self, _session: &mut Session, path: &str) -> Result<bool> {
        Ok(self.node(path).is_ok_and(|node| node.kind == FileKind::File))
    }

    fn is_symlink(&mut self, _session: &mut Session, path: &str) -> Result<bool> {
        Ok(self.node(path).is_ok_and(|node| node.kind == FileKind::Symlink))
    }

    fn read(&mut self, _session: &mut Session, path: &str) -> Result<String> {
        let node = self.node(path)?;
        if node.kind == FileKind::Directory {
            return Err(Error::IsDirectory {
                path: path.to_string(),
            });
        }
        Ok(node.content)
    }

    fn read_link(&mut self, _session: &mut Session, path: &str) -> Result<String> {
        let node = self.node(path)?;
        if node.kind != FileKind::Symlink {
            return Err(Error::Other(format!("{path} is not a symlink")));
        }
        Ok(node.target)
    }

    fn list(&mut self, _session: &mut Session, path: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .lock()
            .nodes
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn chmod(&mut self, _session: &mut Session, path: &str, mode: u32) -> CommandResult {
        self.mutate(format!("chmod {path} {mode:o}"), |nodes| match nodes.get_mut(path) {
            Some(node) => {
                node.mode = mode;
                applied()
            }
            None => missing(path),
        })
    }

    fn chown(
        &mut self,
        _session: &mut Session,
        path: &str,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> CommandResult {
        let call = format!(
            "chown {path} {}:{}",
            owner.unwrap_or(""),
            group.unwrap_or("")
        );
        self.mutate(call, |nodes| match nodes.get_mut(path) {
            Some(node) => {
                if let Some(owner) = owner {
                    node.owner = owner.to_string();
                }
                if let Some(group) = group {
                    node.group = group.to_string();
                }
                applied()
            }
            None => missing(path),
        })
    }

    fn delete(&mut self, _session: &mut Session, path: &str, recursive: bool) -> CommandResult {
        self.mutate(format!("delete {path}"), |nodes| {
            let Some(node) = nodes.get(path) else {
                return missing(path);
            };
            if node.kind == FileKind::Directory && !recursive {
                return CommandResult::from_error(Error::IsDirectory {
                    path: path.to_string(),
                });
            }
            let prefix = format!("{path}/");
            nodes.retain(|key, _| key != path && !key.starts_with(&prefix));
            applied()
        })
    }

    fn rename(&mut self, _session: &mut Session, from: &str, to: &str) -> CommandResult {
        self.mutate(format!("rename {from} {to}"), |nodes| match nodes.remove(from) {
            Some(node) => {
                nodes.insert(to.to_string(), node);
                applied()
            }
            None => missing(from),
        })
    }

    fn write(&mut self, _session: &mut Session, path: &str, content: &str) -> CommandResult {
        self.mutate(format!("write {path}"), |nodes| {
            nodes
                .entry(path.to_string())
                .or_insert_with(|| Node::new(FileKind::File, 0o644))
                .content = content.to_string();
            applied()
        })
    }

    fn mkdir(&mut self, _session: &mut Session, path: &str) -> CommandResult {
        self.mutate(format!("mkdir {path}"), |nodes| {
            nodes
                .entry(path.to_string())
                .or_insert_with(|| Node::new(FileKind::Directory, 0o755));
            applied()
        })
    }

    fn symlink(&mut self, _session: &mut Session, target: &str, link: &str) -> CommandResult {
        self.mutate(format!("symlink {link} {target}"), |nodes| {
            let mut node = Node::new(FileKind::Symlink, 0o777);
            node.target = target.to_string();
            nodes.insert(link.to_string(), node);
            applied()
        })
    }
}
