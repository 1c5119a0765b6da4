//! Symbolic links.

use super::{Entry, Resource, command};
use crate::host::Host;
use converge::{Criteria, Transition};
use shellkit::CommandResult;

#[derive(Debug)]
pub struct Link {
    entry: Entry,
}

impl Link {
    pub fn new(host: &str, path: String) -> Self {
        Self {
            entry: Entry::new(host, "link", path),
        }
    }

    /// Where the link points.
    pub fn target(&mut self, host: &mut Host) -> shellkit::Result<String> {
        let path = self.path().to_string();
        let parts = self.entry.parts(host);
        parts.target.fs.read_link(parts.target.session, &path)
    }

    /// Point the link at `target`, replacing whatever link or file is there.
    pub fn create(&mut self, host: &mut Host, target: &str) -> CommandResult {
        let path = self.path().to_string();
        let mut parts = self.entry.parts(host);
        let current = parts.target.fs.read_link(parts.target.session, &path).ok();

        let result = command("symlink")
            .arg(target)
            .arg(&path)
            .change_if(Criteria::flag(current.as_deref() != Some(target)))
            .succeeds_if(|t, _| {
                t.fs.read_link(t.session, &path)
                    .is_ok_and(|points_to| points_to == target)
            })
            .run(parts.engine, &mut parts.target, |t| {
                t.fs.symlink(t.session, target, &path)
            });

        let privileged = parts.privileged();
        parts.settle(
            &result,
            vec![
                Transition::new("target", current, Some(target.to_string()))
                    .privileged(privileged),
            ],
        );
        result
    }
}

impl Resource for Link {
    fn entry(&self) -> &Entry {
        &self.entry
    }

    fn entry_mut(&mut self) -> &mut Entry {
        &mut self.entry
    }
}
