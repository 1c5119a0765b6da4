//! Shell command lines for each primitive, run through a [`Session`].
//!
//! These are POSIX tools only (`test`, `chmod`, `rm`, `mv`, `ln`, ...) so
//! the same lines work against GNU and BSD userlands.

use shellkit::quote::quote;
use shellkit::{CommandResult, Error, Result, Session, Value};

pub fn chmod(session: &mut Session, path: &str, mode: u32) -> CommandResult {
    session.run("chmod", &[format!("{mode:o}"), path.to_string()])
}

/// `chown owner[:group]`, or `chown :group` when only the group changes.
pub fn chown(
    session: &mut Session,
    path: &str,
    owner: Option<&str>,
    group: Option<&str>,
) -> CommandResult {
    let spec = match (owner, group) {
        (Some(owner), Some(group)) => format!("{owner}:{group}"),
        (Some(owner), None) => owner.to_string(),
        (None, Some(group)) => format!(":{group}"),
        (None, None) => return CommandResult::no_change(),
    };
    session.run("chown", &[spec.as_str(), path])
}

pub fn delete(session: &mut Session, path: &str, recursive: bool) -> CommandResult {
    if recursive {
        session.run("rm", &["-r", "--", path])
    } else {
        session.run("rm", &["--", path])
    }
}

pub fn rename(session: &mut Session, from: &str, to: &str) -> CommandResult {
    session.execute_about(&format!("mv -- {} {}", quote(from), quote(to)), from)
}

pub fn write(session: &mut Session, path: &str, content: &str) -> CommandResult {
    session.execute_about(
        &format!("printf '%s' {} > {}", quote(content), quote(path)),
        path,
    )
}

pub fn mkdir(session: &mut Session, path: &str) -> CommandResult {
    session.run("mkdir", &["-p", "--", path])
}

/// `ln -sfn`, refusing a real directory at `link`: `ln` would otherwise
/// put the new link inside it.
pub fn symlink(session: &mut Session, target: &str, link: &str) -> CommandResult {
    let l = quote(link);
    session.execute_about(
        &format!(
            "if [ -d {l} ] && [ ! -L {l} ]; then echo 'Is a directory' >&2; exit 1; fi; \
             ln -sfn -- {} {l}",
            quote(target)
        ),
        link,
    )
}

pub fn read(session: &mut Session, path: &str) -> Result<String> {
    output(session.run("cat", &["--", path]))
}

pub fn read_link(session: &mut Session, path: &str) -> Result<String> {
    output(session.run("readlink", &["--", path])).map(|target| target.trim_end().to_string())
}

pub fn list(session: &mut Session, path: &str) -> Result<Vec<String>> {
    let listing = output(session.run("ls", &["-1A", "--", path]))?;
    let mut names: Vec<String> = listing
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

pub fn exists(session: &mut Session, path: &str) -> Result<bool> {
    let q = quote(path);
    predicate(session.execute_about(&format!("test -e {q} || test -L {q}"), path))
}

pub fn is_directory(session: &mut Session, path: &str) -> Result<bool> {
    predicate(session.execute_about(&format!("test -d {}", quote(path)), path))
}

pub fn is_file(session: &mut Session, path: &str) -> Result<bool> {
    predicate(session.execute_about(&format!("test -f {}", quote(path)), path))
}

pub fn is_symlink(session: &mut Session, path: &str) -> Result<bool> {
    predicate(session.execute_about(&format!("test -L {}", quote(path)), path))
}

/// Stdout of a successful command, or its error.
pub fn output(result: CommandResult) -> Result<String> {
    if result.failed() {
        return Err(error_of(result));
    }
    Ok(result.stdout().to_string())
}

/// `test` semantics: exit 0 is true, a quiet exit 1 is false, anything else failed.
pub fn predicate(result: CommandResult) -> Result<bool> {
    match result.exit_status() {
        0 => Ok(true),
        1 if result.stderr().trim().is_empty() => Ok(false),
        _ => Err(error_of(result)),
    }
}

/// Turn the outcome of a native call into a command result.
pub fn outcome(result: Result<()>) -> CommandResult {
    match result {
        Ok(()) => CommandResult::applied(Value::Unit),
        Err(err) => CommandResult::from_error(err),
    }
}

fn error_of(result: CommandResult) -> Error {
    match result.into_result() {
        Err(err) => err,
        Ok(_) => Error::Other("command reported failure without an error".to_string()),
    }
}
