use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge files, directories and links on local and remote hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Host to operate on: an alias from config.toml, a hostname, or user@host
    #[arg(short = 'H', long, global = true, env = "RIGGER_HOST")]
    pub host: Option<String>,

    /// Run mutations through sudo, optionally as USER
    #[arg(
        long,
        global = true,
        value_name = "USER",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "root"
    )]
    pub sudo: Option<String>,

    /// Run every mutation, even when nothing differs
    #[arg(long, global = true)]
    pub no_idempotent: bool,

    /// Skip state checks before mutating
    #[arg(long, global = true)]
    pub no_check_state: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a shell command
    Run {
        /// Change to this directory first
        #[arg(short = 'C', long, value_name = "DIR")]
        chdir: Option<String>,

        /// Command line, passed to sh
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show metadata for a path
    Stat {
        path: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a file's contents
    Cat { path: String },

    /// List a directory
    Ls { path: String },

    /// Change permission bits
    Chmod {
        /// Octal mode, e.g. 755 or 0640
        mode: String,
        path: String,
    },

    /// Change owner and/or group
    Chown {
        /// OWNER, OWNER:GROUP or :GROUP
        spec: String,
        path: String,
    },

    /// Remove a file, link or directory
    Rm {
        path: String,

        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },

    /// Move a path
    Mv { from: String, to: String },

    /// Replace the contents of a file
    Write {
        path: String,

        /// New contents; read from stdin when omitted
        content: Option<String>,
    },

    /// Create a directory and missing parents
    Mkdir { path: String },

    /// Point a symlink at a target
    Ln { target: String, link: String },

    /// Copy a local file to the host
    Upload { source: PathBuf, dest: String },

    /// Converge everything declared in a manifest
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Manifest file (TOML)
    pub manifest: PathBuf,

    /// Show what would be checked without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["rigger", "--sudo", "chmod", "755", "/srv/app", "-H", "web1"]);
        assert_eq!(cli.host.as_deref(), Some("web1"));
        assert_eq!(cli.sudo.as_deref(), Some("root"));
        assert!(matches!(cli.command, Command::Chmod { ref mode, .. } if mode == "755"));
    }

    #[test]
    fn test_sudo_user() {
        let cli = Cli::parse_from(["rigger", "--sudo=postgres", "run", "psql", "-l"]);
        assert_eq!(cli.sudo.as_deref(), Some("postgres"));
        match cli.command {
            Command::Run { chdir, command } => {
                assert_eq!(chdir, None);
                assert_eq!(command, ["psql", "-l"]);
            }
            _ => panic!("expected run"),
        }
    }
}
