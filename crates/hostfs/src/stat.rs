//! Point-in-time file metadata.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shellkit::{Error, Result};

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    /// Sockets, fifos, device nodes
    Other,
}

impl FileKind {
    /// Leading character of an `ls -l` mode string.
    pub fn type_char(self) -> char {
        match self {
            Self::File => '-',
            Self::Directory => 'd',
            Self::Symlink => 'l',
            Self::Other => '?',
        }
    }

    fn from_type_char(c: char) -> Self {
        match c {
            '-' => Self::File,
            'd' => Self::Directory,
            'l' => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// Metadata snapshot for one path, however it was obtained.
///
/// Symlinks are not followed: a link reports itself, not its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub path: String,
    pub kind: FileKind,
    /// Permission bits including setuid, setgid and sticky (`0o7777`)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Owner name, when the id maps to one
    pub owner: Option<String>,
    /// Group name, when the id maps to one
    pub group: Option<String>,
    pub size: u64,
    pub accessed: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub changed: DateTime<Utc>,
}

impl Stat {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Permission bits as octal text without a leading zero, e.g. `644`.
    pub fn octal_mode(&self) -> String {
        format!("{:o}", self.mode)
    }

    /// `ls -l` style mode text, e.g. `-rwxr-xr-x`.
    pub fn mode_string(&self) -> String {
        mode_string(self.kind, self.mode)
    }

    /// Owner name, falling back to the numeric id.
    pub fn owner_label(&self) -> String {
        self.owner.clone().unwrap_or_else(|| self.uid.to_string())
    }

    /// Group name, falling back to the numeric id.
    pub fn group_label(&self) -> String {
        self.group.clone().unwrap_or_else(|| self.gid.to_string())
    }
}

const SETUID: u32 = 0o4000;
const SETGID: u32 = 0o2000;
const STICKY: u32 = 0o1000;

/// Render `kind` and `mode` the way `ls -l` does.
pub fn mode_string(kind: FileKind, mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(kind.type_char());

    for (shift, special, special_char) in [(6, SETUID, 's'), (3, SETGID, 's'), (0, STICKY, 't')] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (mode & special != 0, exec) {
            (true, true) => special_char,
            (true, false) => special_char.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// Parse `ls -l` style mode text back into kind and permission bits.
///
/// A trailing ACL/xattr marker (`+`, `@`, `.`) is ignored.
pub fn parse_mode_string(text: &str) -> Result<(FileKind, u32)> {
    let invalid = || Error::Parse {
        what: "mode string".to_string(),
        message: format!("{text:?}"),
    };

    let chars: Vec<char> = text.trim().chars().collect();
    let chars = match chars.len() {
        10 => &chars[..],
        11 if matches!(chars[10], '+' | '@' | '.') => &chars[..10],
        _ => return Err(invalid()),
    };

    let kind = FileKind::from_type_char(chars[0]);
    let mut mode = 0;
    for (index, (shift, special, special_char)) in
        [(6, SETUID, 's'), (3, SETGID, 's'), (0, STICKY, 't')].into_iter().enumerate()
    {
        let triad = &chars[1 + index * 3..4 + index * 3];
        let mut bits = 0;
        match triad[0] {
            'r' => bits |= 0o4,
            '-' => {}
            _ => return Err(invalid()),
        }
        match triad[1] {
            'w' => bits |= 0o2,
            '-' => {}
            _ => return Err(invalid()),
        }
        match triad[2] {
            'x' => bits |= 0o1,
            '-' => {}
            c if c == special_char => {
                bits |= 0o1;
                mode |= special;
            }
            c if c == special_char.to_ascii_uppercase() => mode |= special,
            _ => return Err(invalid()),
        }
        mode |= bits << shift;
    }
    Ok((kind, mode))
}
