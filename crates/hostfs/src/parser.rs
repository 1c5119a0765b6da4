//! Per-platform parsers for `stat` output.
//!
//! GNU coreutils and the BSD/Darwin `stat` take different flags and print
//! fields in different notations. Each flavor asks for the same ten fields,
//! `|`-separated, and normalizes them into a [`Stat`].

use crate::stat::{FileKind, Stat};
use chrono::{DateTime, Utc};
use shellkit::quote::quote;
use shellkit::{Error, Result};

const FIELDS: usize = 10;

/// Builds a `stat` command line and parses what it prints.
pub trait StatParser: Send + Sync {
    /// Short name for logs.
    fn flavor(&self) -> &'static str;

    /// Shell command printing metadata for `path`.
    fn command(&self, path: &str) -> String;

    /// Parse the command's stdout.
    fn parse(&self, path: &str, output: &str) -> Result<Stat>;
}

/// GNU coreutils `stat -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GnuStat;

/// BSD and Darwin `stat -f`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsdStat;

impl GnuStat {
    const FORMAT: &'static str = "%F|%a|%u|%g|%U|%G|%s|%X|%Y|%Z";
}

impl BsdStat {
    const FORMAT: &'static str = "%HT|%Mp%Lp|%u|%g|%Su|%Sg|%z|%a|%m|%c";
}

impl StatParser for GnuStat {
    fn flavor(&self) -> &'static str {
        "gnu"
    }

    fn command(&self, path: &str) -> String {
        format!("stat -c {} -- {}", quote(Self::FORMAT), quote(path))
    }

    fn parse(&self, path: &str, output: &str) -> Result<Stat> {
        let fields = split_fields(output)?;
        let kind = match fields[0] {
            "regular file" | "regular empty file" => FileKind::File,
            "directory" => FileKind::Directory,
            "symbolic link" => FileKind::Symlink,
            _ => FileKind::Other,
        };
        build(path, kind, &fields)
    }
}

impl StatParser for BsdStat {
    fn flavor(&self) -> &'static str {
        "bsd"
    }

    fn command(&self, path: &str) -> String {
        format!("stat -f {} -- {}", quote(Self::FORMAT), quote(path))
    }

    fn parse(&self, path: &str, output: &str) -> Result<Stat> {
        let fields = split_fields(output)?;
        let kind = match fields[0] {
            "Regular File" => FileKind::File,
            "Directory" => FileKind::Directory,
            "Symbolic Link" => FileKind::Symlink,
            _ => FileKind::Other,
        };
        build(path, kind, &fields)
    }
}

/// Pick a parser from `uname -s` output.
pub fn for_uname(uname: &str) -> Box<dyn StatParser> {
    match uname.trim() {
        "Darwin" | "FreeBSD" | "OpenBSD" | "NetBSD" | "DragonFly" => Box::new(BsdStat),
        _ => Box::new(GnuStat),
    }
}

/// Parser matching the `stat` of the machine we are running on.
pub fn native() -> Box<dyn StatParser> {
    if cfg!(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )) {
        Box::new(BsdStat)
    } else {
        Box::new(GnuStat)
    }
}

fn parse_error(message: impl Into<String>) -> Error {
    Error::Parse {
        what: "stat output".to_string(),
        message: message.into(),
    }
}

fn split_fields(output: &str) -> Result<Vec<&str>> {
    let line = output.lines().next().unwrap_or_default();
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != FIELDS {
        return Err(parse_error(format!(
            "expected {FIELDS} fields, got {}: {line:?}",
            fields.len()
        )));
    }
    Ok(fields)
}

fn number<T: std::str::FromStr>(field: &str, name: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| parse_error(format!("bad {name}: {field:?}")))
}

fn timestamp(field: &str, name: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = number(field, name)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| parse_error(format!("{name} out of range: {secs}")))
}

/// A name column is unknown when the tool printed `UNKNOWN` or fell back to the id.
fn name(field: &str, id: u32) -> Option<String> {
    let field = field.trim();
    if field.is_empty() || field == "UNKNOWN" || field == id.to_string() {
        None
    } else {
        Some(field.to_string())
    }
}

fn build(path: &str, kind: FileKind, fields: &[&str]) -> Result<Stat> {
    let mode = u32::from_str_radix(fields[1].trim(), 8)
        .map_err(|_| parse_error(format!("bad mode: {:?}", fields[1])))?;
    let uid = number(fields[2], "uid")?;
    let gid = number(fields[3], "gid")?;

    Ok(Stat {
        path: path.to_string(),
        kind,
        mode: mode & 0o7777,
        uid,
        gid,
        owner: name(fields[4], uid),
        group: name(fields[5], gid),
        size: number(fields[6], "size")?,
        accessed: timestamp(fields[7], "atime")?,
        modified: timestamp(fields[8], "mtime")?,
        changed: timestamp(fields[9], "ctime")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GNU_FILE: &str = "regular file|644|1000|1000|alice|alice|12|1700000000|1700000100|1700000200\n";
    const GNU_EMPTY: &str = "regular empty file|600|0|0|root|root|0|1700000000|1700000000|1700000000\n";
    const GNU_DIR: &str = "directory|1777|0|0|root|root|4096|1700000000|1700000000|1700000000\n";
    const GNU_ORPHAN: &str = "symbolic link|777|4242|4242|UNKNOWN|UNKNOWN|11|1700000000|1700000000|1700000000\n";

    const BSD_FILE: &str = "Regular File|0644|501|20|alice|staff|12|1700000000|1700000100|1700000200\n";
    const BSD_SETUID: &str = "Regular File|4755|0|0|root|wheel|51200|1700000000|1700000000|1700000000\n";
    const BSD_LINK: &str = "Symbolic Link|0755|501|20|501|20|7|1700000000|1700000000|1700000000\n";

    #[test]
    fn test_gnu_regular_file() {
        let stat = GnuStat.parse("/tmp/f", GNU_FILE).unwrap();
        assert_eq!(stat.kind, FileKind::File);
        assert_eq!(stat.mode, 0o644);
        assert_eq!(stat.owner.as_deref(), Some("alice"));
        assert_eq!(stat.size, 12);
        assert_eq!(stat.modified.timestamp(), 1_700_000_100);
        assert_eq!(stat.mode_string(), "-rw-r--r--");
    }

    #[test]
    fn test_gnu_empty_file_and_sticky_dir() {
        assert!(GnuStat.parse("/x", GNU_EMPTY).unwrap().is_file());

        let dir = GnuStat.parse("/tmp", GNU_DIR).unwrap();
        assert!(dir.is_directory());
        assert_eq!(dir.mode, 0o1777);
        assert_eq!(dir.mode_string(), "drwxrwxrwt");
    }

    #[test]
    fn test_gnu_unknown_owner() {
        let stat = GnuStat.parse("/l", GNU_ORPHAN).unwrap();
        assert!(stat.is_symlink());
        assert_eq!(stat.owner, None);
        assert_eq!(stat.owner_label(), "4242");
    }

    #[test]
    fn test_bsd_regular_file_matches_gnu() {
        let bsd = BsdStat.parse("/tmp/f", BSD_FILE).unwrap();
        let gnu = GnuStat.parse("/tmp/f", GNU_FILE).unwrap();
        assert_eq!(bsd.kind, gnu.kind);
        assert_eq!(bsd.mode, gnu.mode);
        assert_eq!(bsd.size, gnu.size);
        assert_eq!(bsd.modified, gnu.modified);
        assert_eq!(bsd.group.as_deref(), Some("staff"));
    }

    #[test]
    fn test_bsd_setuid_and_numeric_names() {
        assert_eq!(BsdStat.parse("/bin/x", BSD_SETUID).unwrap().mode, 0o4755);

        let link = BsdStat.parse("/l", BSD_LINK).unwrap();
        assert!(link.is_symlink());
        assert_eq!(link.owner, None);
        assert_eq!(link.group, None);
    }

    #[test]
    fn test_malformed_output() {
        assert!(GnuStat.parse("/x", "").is_err());
        assert!(GnuStat.parse("/x", "regular file|644|1000").is_err());
        assert!(BsdStat.parse("/x", "Regular File|rw|0|0|a|b|1|2|3|4").is_err());
    }

    #[test]
    fn test_commands() {
        let gnu = GnuStat.command("/tmp/f");
        assert!(gnu.starts_with("stat -c "));
        assert!(gnu.contains("%F|%a|%u|%g|%U|%G|%s|%X|%Y|%Z"));
        assert!(gnu.ends_with(" -- /tmp/f"));

        let bsd = BsdStat.command("/tmp/f");
        assert!(bsd.starts_with("stat -f "));
        assert!(bsd.contains("%HT|%Mp%Lp"));
    }

    #[test]
    fn test_for_uname() {
        assert_eq!(for_uname("Linux\n").flavor(), "gnu");
        assert_eq!(for_uname("Darwin\n").flavor(), "bsd");
        assert_eq!(for_uname("FreeBSD").flavor(), "bsd");
    }
}
