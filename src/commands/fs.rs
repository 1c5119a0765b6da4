//! Single-resource commands.

use super::{Connection, Options};
use crate::Context;
use crate::host::Host;
use crate::resource::{Resource, parse_mode, parse_owner};
use crate::ui;
use anyhow::{Context as _, Result, bail};
use hostfs::{FileKind, Stat};
use std::io::Read;

/// The resource type that matches what is at `path`.
enum Any {
    File(crate::resource::File),
    Directory(crate::resource::Directory),
    Link(crate::resource::Link),
}

impl Any {
    fn open(host: &mut Host, path: &str) -> Result<(Self, Option<Stat>)> {
        let mut file = host.file(path)?;
        let stat = file.stat(host).ok();
        let any = match stat.as_ref().map(|stat| stat.kind) {
            Some(FileKind::Directory) => Self::Directory(host.directory(path)?),
            Some(FileKind::Symlink) => Self::Link(host.link(path)?),
            _ => Self::File(file),
        };
        Ok((any, stat))
    }

    fn as_resource(&mut self) -> &mut dyn Mutate {
        match self {
            Self::File(file) => file,
            Self::Directory(dir) => dir,
            Self::Link(link) => link,
        }
    }
}

/// Object-safe slice of [`Resource`] for commands that do not care about
/// the kind.
trait Mutate {
    fn chmod(&mut self, host: &mut Host, mode: u32) -> shellkit::CommandResult;
    fn chown(
        &mut self,
        host: &mut Host,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> shellkit::CommandResult;
    fn delete(&mut self, host: &mut Host) -> shellkit::CommandResult;
    fn rename(&mut self, host: &mut Host, to: &str) -> shellkit::CommandResult;
}

impl<R: Resource> Mutate for R {
    fn chmod(&mut self, host: &mut Host, mode: u32) -> shellkit::CommandResult {
        Resource::chmod(self, host, mode)
    }

    fn chown(
        &mut self,
        host: &mut Host,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> shellkit::CommandResult {
        Resource::chown(self, host, owner, group)
    }

    fn delete(&mut self, host: &mut Host) -> shellkit::CommandResult {
        Resource::delete(self, host)
    }

    fn rename(&mut self, host: &mut Host, to: &str) -> shellkit::CommandResult {
        Resource::rename(self, host, to)
    }
}

pub fn stat(ctx: &Context, options: &Options, path: &str, json: bool) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    let (stat, target) = connection.on_host(|host| -> Result<_> {
        let mut file = host.file(path)?;
        if !file.exists(host)? {
            bail!("Nothing at {path}");
        }
        let stat = file.stat(host)?;
        let target = match stat.kind {
            FileKind::Symlink => Some(host.link(path)?.target(host)?),
            _ => None,
        };
        Ok((stat, target))
    })?;

    if json {
        let mut value = serde_json::to_value(&stat)?;
        if let (Some(map), Some(target)) = (value.as_object_mut(), target) {
            map.insert("target".to_string(), target.into());
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    ui::header(&stat.path);
    ui::kv("type", &format!("{:?}", stat.kind).to_lowercase());
    if let Some(target) = &target {
        ui::kv("target", target);
    }
    ui::kv("mode", &format!("{} ({})", stat.mode_string(), stat.octal_mode()));
    ui::kv("owner", &stat.owner_label());
    ui::kv("group", &stat.group_label());
    ui::kv("size", &stat.size.to_string());
    ui::kv("modified", &stat.modified.to_rfc3339());
    Ok(())
}

/// Print a file's contents.
pub fn cat(ctx: &Context, options: &Options, path: &str) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    let content = connection.on_host(|host| -> Result<_> {
        Ok(host.file(path)?.read(host)?)
    })?;
    print!("{content}");
    Ok(())
}

/// List a directory, one name per line.
pub fn ls(ctx: &Context, options: &Options, path: &str) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    let mut names = connection.on_host(|host| -> Result<_> {
        Ok(host.directory(path)?.entries(host)?)
    })?;
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}

pub fn chmod(ctx: &Context, options: &Options, mode: &str, path: &str) -> Result<()> {
    let Some(mode) = parse_mode(mode) else {
        bail!("Invalid mode {mode:?}: expected octal such as 755 or 0640");
    };
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        let (mut any, _) = Any::open(host, path)?;
        any.as_resource().chmod(host, mode);
        Ok(())
    })?;
    connection.finish(ctx)
}

pub fn chown(ctx: &Context, options: &Options, spec: &str, path: &str) -> Result<()> {
    let (owner, group) = parse_owner(spec);
    if owner.is_none() && group.is_none() {
        bail!("Nothing to change in {spec:?}: expected OWNER, OWNER:GROUP or :GROUP");
    }
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        let (mut any, _) = Any::open(host, path)?;
        any.as_resource().chown(host, owner, group);
        Ok(())
    })?;
    connection.finish(ctx)
}

pub fn rm(ctx: &Context, options: &Options, path: &str, recursive: bool) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        let (mut any, stat) = Any::open(host, path)?;
        if stat.is_some_and(|stat| stat.is_directory()) && !recursive {
            bail!("{path} is a directory; pass --recursive to remove it");
        }
        any.as_resource().delete(host);
        Ok(())
    })?;
    connection.finish(ctx)
}

pub fn mv(ctx: &Context, options: &Options, from: &str, to: &str) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        let (mut any, _) = Any::open(host, from)?;
        any.as_resource().rename(host, to);
        Ok(())
    })?;
    connection.finish(ctx)
}

pub fn write(ctx: &Context, options: &Options, path: &str, content: Option<&str>) -> Result<()> {
    let content = match content {
        Some(content) => content.to_string(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Could not read stdin")?;
            buffer
        }
    };
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        host.file(path)?.write(host, &content);
        Ok(())
    })?;
    connection.finish(ctx)
}

pub fn mkdir(ctx: &Context, options: &Options, path: &str) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        host.directory(path)?.create(host);
        Ok(())
    })?;
    connection.finish(ctx)
}

pub fn ln(ctx: &Context, options: &Options, target: &str, link: &str) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| -> Result<()> {
        host.link(link)?.create(host, target);
        Ok(())
    })?;
    connection.finish(ctx)
}
