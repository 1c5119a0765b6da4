use super::{Entry, Resource, command};
use crate::host::Host;
use converge::{Criteria, Transition};
use shellkit::CommandResult;

#[derive(Debug)]
pub struct Directory {
    entry: Entry,
}

impl Directory {
    pub fn new(host: &str, path: String) -> Self {
        Self {
            entry: Entry::new(host, "directory", path),
        }
    }

    /// Create the directory and missing parents unless it already exists.
    pub fn create(&mut self, host: &mut Host) -> CommandResult {
        let path = self.path().to_string();
        let mut parts = self.entry.parts(host);
        let existed = parts
            .target
            .fs
            .is_directory(parts.target.session, &path)
            .unwrap_or(false);

        let result = command("mkdir")
            .arg(&path)
            .change_if(Criteria::flag(!existed))
            .succeeds_if(|t, _| t.fs.is_directory(t.session, &path).unwrap_or(false))
            .run(parts.engine, &mut parts.target, |t| t.fs.mkdir(t.session, &path));

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

    /// Entry names, sorted.
    pub fn entries(&mut self, host: &mut Host) -> shellkit::Result<Vec<String>> {
        let path = self.path().to_string();
        let parts = self.entry.parts(host);
        parts.target.fs.list(parts.target.session, &path)
    }
}

impl Resource for Directory {
    const RECURSIVE_DELETE: bool = true;

    fn entry(&self) -> &Entry {
        &self.entry
    }

    fn entry_mut(&mut self) -> &mut Entry {
        &mut self.entry
    }
}
