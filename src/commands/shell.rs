use super::{Connection, Options};
use crate::Context;
use anyhow::{Result, bail};
use std::path::Path;

/// Run a command line on the host and echo its output.
pub fn run(ctx: &Context, options: &Options, chdir: Option<&str>, words: &[String]) -> Result<()> {
    let mut connection = Connection::open(ctx, options)?;
    if let Some(dir) = chdir
        && connection.on_host(|host| host.cd(dir)).failed()
    {
        connection.report(ctx);
        bail!("Could not change to {dir}");
    }
    log::debug!(
        "Running in {}",
        connection.host.session().cwd().unwrap_or("the login directory")
    );
    let line = words.join(" ");
    let result = connection.on_host(|host| host.run(&line));

    print!("{}", result.stdout());
    eprint!("{}", result.stderr());
    if connection.report(ctx) {
        Ok(())
    } else {
        bail!("exit status {}", result.exit_status())
    }
}

pub fn upload(ctx: &Context, options: &Options, source: &Path, dest: &str) -> Result<()> {
    if !source.is_file() {
        bail!("Not a file: {}", source.display());
    }
    let mut connection = Connection::open(ctx, options)?;
    connection.on_host(|host| host.upload(source, dest));
    connection.finish(ctx)
}
