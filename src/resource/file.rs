//! Regular files.

use super::{Entry, Resource, command};
use crate::host::Host;
use converge::{Criteria, Transition};
use shellkit::{CommandResult, Value};

/// Content digest used for change detection and events.
pub fn digest(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[derive(Debug)]
pub struct File {
    entry: Entry,
}

impl File {
    pub fn new(host: &str, path: String) -> Self {
        Self {
            entry: Entry::new(host, "file", path),
        }
    }

    pub fn read(&mut self, host: &mut Host) -> shellkit::Result<String> {
        let path = self.path().to_string();
        let parts = self.entry.parts(host);
        parts.target.fs.read(parts.target.session, &path)
    }

    /// Replace the contents. Skipped when the digests already match.
    pub fn write(&mut self, host: &mut Host, content: &str) -> CommandResult {
        let path = self.path().to_string();
        let wanted = digest(content);
        let mut parts = self.entry.parts(host);
        let current = parts
            .target
            .fs
            .read(parts.target.session, &path)
            .ok()
            .map(|text| digest(&text));

        let result = command("write")
            .arg(&path)
            .arg(format!("{} bytes", content.len()))
            .change_if(Criteria::flag(current.as_deref() != Some(wanted.as_str())))
            .succeeds_if(|t, _| {
                t.fs.read(t.session, &path)
                    .is_ok_and(|text| digest(&text) == wanted)
            })
            .run(parts.engine, &mut parts.target, |t| {
                t.fs.write(t.session, &path, content)
            });

        let privileged = parts.privileged();
        parts.settle(
            &result,
            vec![Transition::new("content", current, Some(wanted.clone())).privileged(privileged)],
        );
        result
    }

    /// Create an empty file if nothing is there. Existing contents are kept.
    pub fn touch(&mut self, host: &mut Host) -> CommandResult {
        let path = self.path().to_string();
        let mut parts = self.entry.parts(host);
        let existed = parts
            .target
            .fs
            .exists(parts.target.session, &path)
            .unwrap_or(false);

        let result = command("touch")
            .arg(&path)
            .change_if(Criteria::flag(!existed))
            .succeeds_if(|t, _| t.fs.is_file(t.session, &path).unwrap_or(false))
            .run(parts.engine, &mut parts.target, |t| {
                match t.fs.exists(t.session, &path) {
                    Ok(true) => CommandResult::applied(Value::Unit),
                    _ => t.fs.write(t.session, &path, ""),
                }
            });

        let privileged = parts.privileged();
        parts.settle(
            &result,
            vec![
                Transition::new(
                    "exists",
                    Some(existed.to_string()),
                    Some("true".to_string()),
                )
                .privileged(privileged),
            ],
        );
        result
    }
}

impl Resource for File {
    fn entry(&self) -> &Entry {
        &self.entry
    }

    fn entry_mut(&mut self) -> &mut Entry {
        &mut self.entry
    }
}
