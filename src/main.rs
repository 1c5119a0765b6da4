mod cli;
mod commands;
mod config;
mod host;
mod manifest;
mod paths;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::Options;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    log::trace!("verbosity {}", ctx.verbose);

    let options = Options {
        host: cli.host,
        sudo: cli.sudo,
        no_idempotent: cli.no_idempotent,
        no_check_state: cli.no_check_state,
    };

    match cli.command {
        Command::Run { chdir, command } => {
            commands::shell::run(&ctx, &options, chdir.as_deref(), &command)
        }
        Command::Stat { path, json } => commands::fs::stat(&ctx, &options, &path, json),
        Command::Cat { path } => commands::fs::cat(&ctx, &options, &path),
        Command::Ls { path } => commands::fs::ls(&ctx, &options, &path),
        Command::Chmod { mode, path } => commands::fs::chmod(&ctx, &options, &mode, &path),
        Command::Chown { spec, path } => commands::fs::chown(&ctx, &options, &spec, &path),
        Command::Rm { path, recursive } => commands::fs::rm(&ctx, &options, &path, recursive),
        Command::Mv { from, to } => commands::fs::mv(&ctx, &options, &from, &to),
        Command::Write { path, content } => {
            commands::fs::write(&ctx, &options, &path, content.as_deref())
        }
        Command::Mkdir { path } => commands::fs::mkdir(&ctx, &options, &path),
        Command::Ln { target, link } => commands::fs::ln(&ctx, &options, &target, &link),
        Command::Upload { source, dest } => {
            commands::shell::upload(&ctx, &options, &source, &dest)
        }
        Command::Apply(args) => commands::apply::run(&ctx, &options, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "rigger", &mut io::stdout());
            Ok(())
        }
    }
}
