//! Transport that runs commands on this machine through `sh -c`.

use super::process::{self, Failure, PromptDetector};
use super::{RawOutput, Responder, Transport, TransportKind};
use crate::error::{Error, Result};
use crate::result::SPAWN_FAILURE;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

/// Runs shell lines locally.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    detector: PromptDetector,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn host(&self) -> &str {
        "localhost"
    }

    fn exec(
        &mut self,
        line: &str,
        interactive: bool,
        responder: &mut Responder<'_>,
    ) -> Result<RawOutput> {
        log::debug!("Running locally: {line}");
        let mut command = Command::new("sh");
        command.arg("-c").arg(line);

        match process::run(command, interactive, &self.detector, responder) {
            Ok(output) => Ok(output),
            // The shell itself is missing: report it the way a shell would.
            Err(Failure::Spawn(err)) if err.kind() == io::ErrorKind::NotFound => Ok(
                RawOutput::status(SPAWN_FAILURE, format!("sh: {err}")),
            ),
            Err(Failure::Spawn(err) | Failure::Io(err)) => Err(Error::from(err)),
        }
    }

    fn upload(&mut self, source: &Path, dest: &str) -> Result<()> {
        fs::copy(source, dest)
            .map(|_| ())
            .map_err(|err| Error::from_io(&err, dest))
    }
}
