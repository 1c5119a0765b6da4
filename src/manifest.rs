//! Declarative manifests: the directories, files and links a host should have.
//!
//! ```toml
//! [[directory]]
//! path = "/srv/app"
//! mode = "755"
//! owner = "deploy"
//!
//! [[file]]
//! path = "/srv/app/.env"
//! content = "PORT=8080\n"
//! mode = 0o600
//!
//! [[link]]
//! path = "/srv/current"
//! target = "/srv/app"
//! ```
//!
//! Entries converge in that order: directories first so files and links have
//! somewhere to land.

use crate::host::Host;
use crate::resource::{Resource, parse_mode};
use anyhow::{Context, Result, bail};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use shellkit::{CommandResult, Status};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Mode, owner and group shared by files and directories.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attributes {
    #[serde(default, deserialize_with = "octal")]
    pub mode: Option<u32>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

impl Attributes {
    fn describe(&self) -> String {
        let mut out = String::new();
        if let Some(mode) = self.mode {
            out.push_str(&format!(" mode {mode:o}"));
        }
        if let Some(owner) = &self.owner {
            out.push_str(&format!(" owner {owner}"));
        }
        if let Some(group) = &self.group {
            out.push_str(&format!(" group {group}"));
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySpec {
    pub path: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub path: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Exact contents; when omitted the file is only created if missing
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSpec {
    pub path: String,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "directory")]
    pub directories: Vec<DirectorySpec>,
    #[serde(default, rename = "file")]
    pub files: Vec<FileSpec>,
    #[serde(default, rename = "link")]
    pub links: Vec<LinkSpec>,
}

/// Accepts `"0644"`-style strings as well as TOML octal integers.
fn octal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u32),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(mode)) if mode <= 0o7777 => Ok(Some(mode)),
        Some(Raw::Number(mode)) => Err(D::Error::custom(format!("mode {mode:o} out of range"))),
        Some(Raw::Text(text)) => parse_mode(&text)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid mode {text:?}"))),
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for link in &self.links {
            if link.ensure == Ensure::Present && link.target.is_none() {
                bail!("link {} has no target", link.path);
            }
        }
        let paths = self
            .directories
            .iter()
            .map(|d| &d.path)
            .chain(self.files.iter().map(|f| &f.path))
            .chain(self.links.iter().map(|l| &l.path));
        for path in paths {
            if path.is_empty() {
                bail!("entry with an empty path");
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.directories.len() + self.files.len() + self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per entry, in the order they converge.
    pub fn plan(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.len());
        for dir in &self.directories {
            lines.push(match dir.ensure {
                Ensure::Absent => format!("remove directory {}", dir.path),
                Ensure::Present => format!("directory {}{}", dir.path, dir.attributes.describe()),
            });
        }
        for file in &self.files {
            lines.push(match (file.ensure, &file.content) {
                (Ensure::Absent, _) => format!("remove file {}", file.path),
                (Ensure::Present, Some(content)) => format!(
                    "file {} ({} bytes){}",
                    file.path,
                    content.len(),
                    file.attributes.describe()
                ),
                (Ensure::Present, None) => {
                    format!("file {}{}", file.path, file.attributes.describe())
                }
            });
        }
        for link in &self.links {
            lines.push(match (link.ensure, &link.target) {
                (Ensure::Present, Some(target)) => format!("link {} → {target}", link.path),
                _ => format!("remove link {}", link.path),
            });
        }
        lines
    }
}

/// Counts of command outcomes while applying a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub applied: usize,
    pub no_change: usize,
    pub failed: usize,
}

impl Summary {
    pub fn add(&mut self, result: &CommandResult) {
        match result.status() {
            Status::Applied => self.applied += 1,
            Status::NoChange => self.no_change += 1,
            Status::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.no_change += other.no_change;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.applied + self.no_change + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Converge every entry in `manifest` on `host`.
///
/// A failing entry does not stop the rest.
pub fn apply(host: &mut Host, manifest: &Manifest) -> Summary {
    let mut summary = Summary::default();
    for spec in &manifest.directories {
        summary.merge(directory(host, spec));
    }
    for spec in &manifest.files {
        summary.merge(file(host, spec));
    }
    for spec in &manifest.links {
        summary.merge(link(host, spec));
    }
    log::info!(
        "{}: {} applied, {} unchanged, {} failed",
        host.name(),
        summary.applied,
        summary.no_change,
        summary.failed
    );
    summary
}

/// Counts an entry whose path could not be resolved as one failure.
fn unresolved(path: &str, error: &shellkit::Error) -> Summary {
    log::warn!("Skipping {path}: {error}");
    Summary {
        failed: 1,
        ..Summary::default()
    }
}

fn attributes<R: Resource>(
    resource: &mut R,
    host: &mut Host,
    attributes: &Attributes,
    summary: &mut Summary,
) {
    if let Some(mode) = attributes.mode {
        summary.add(&resource.chmod(host, mode));
    }
    if attributes.owner.is_some() || attributes.group.is_some() {
        summary.add(&resource.chown(
            host,
            attributes.owner.as_deref(),
            attributes.group.as_deref(),
        ));
    }
}

fn directory(host: &mut Host, spec: &DirectorySpec) -> Summary {
    let mut dir = match host.directory(&spec.path) {
        Ok(dir) => dir,
        Err(e) => return unresolved(&spec.path, &e),
    };
    let mut summary = Summary::default();
    if spec.ensure == Ensure::Absent {
        summary.add(&dir.delete(host));
        return summary;
    }
    dir.batch(host, |dir, host| {
        let created = dir.create(host);
        summary.add(&created);
        if !created.failed() {
            attributes(dir, host, &spec.attributes, &mut summary);
        }
    });
    summary
}

fn file(host: &mut Host, spec: &FileSpec) -> Summary {
    let mut file = match host.file(&spec.path) {
        Ok(file) => file,
        Err(e) => return unresolved(&spec.path, &e),
    };
    let mut summary = Summary::default();
    if spec.ensure == Ensure::Absent {
        summary.add(&file.delete(host));
        return summary;
    }
    file.batch(host, |file, host| {
        let written = match &spec.content {
            Some(content) => file.write(host, content),
            None => file.touch(host),
        };
        summary.add(&written);
        if !written.failed() {
            attributes(file, host, &spec.attributes, &mut summary);
        }
    });
    summary
}

fn link(host: &mut Host, spec: &LinkSpec) -> Summary {
    let mut link = match host.link(&spec.path) {
        Ok(link) => link,
        Err(e) => return unresolved(&spec.path, &e),
    };
    let mut summary = Summary::default();
    match (spec.ensure, &spec.target) {
        (Ensure::Present, Some(target)) => summary.add(&link.create(host, target)),
        _ => summary.add(&link.delete(host)),
    }
    summary
}

// ============================================================================
// Tests
// ============================================================================
