//! File-backed user list.
//!
//! Entries are `<level>,<name>,<password>|`, level `0`..=`3`. Names and levels
//! are cached when the store is opened; passwords never are. Each password
//! lookup re-reads the file and zeroes the read buffer before returning.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::auth::UserLevel;
use crate::error::Result;

/// Longest accepted user name, in bytes.
pub const MAX_USER_LEN: usize = 31;
/// Longest accepted password, in bytes.
pub const MAX_PASSWORD_LEN: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub level: UserLevel,
}

#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Vec<User>,
}

struct Entry<'a> {
    level: UserLevel,
    name: &'a [u8],
    password: &'a [u8],
}

/// Split the file into entries. Malformed entries are skipped, an empty
/// one ends the list.
fn entries(buf: &[u8]) -> impl Iterator<Item = Entry<'_>> {
    buf.split(|&b| b == b'|')
        .map(|raw| {
            let start = raw
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(raw.len());
            &raw[start..]
        })
        .take_while(|raw| !raw.is_empty())
        .filter_map(parse_entry)
}

fn parse_entry(raw: &[u8]) -> Option<Entry<'_>> {
    let mut fields = raw.splitn(3, |&b| b == b',');
    let level = match fields.next()? {
        [d] => UserLevel::from_digit(*d)?,
        _ => return None,
    };
    let name = fields.next()?;
    let password = fields.next()?;
    let password = password
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .map_or(password, |end| &password[..end]);

    if name.is_empty() || name.len() > MAX_USER_LEN || password.len() > MAX_PASSWORD_LEN {
        return None;
    }
    Some(Entry {
        level,
        name,
        password,
    })
}

impl UserStore {
    /// Open the user file and cache names and levels.
    ///
    /// A missing file yields an empty store: nobody can authenticate, but
    /// anonymous methods still work.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut buf = match std::fs::read(&path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "user file not found, no users loaded");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let users = entries(&buf)
            .filter_map(|e| {
                let name = std::str::from_utf8(e.name).ok()?;
                Some(User {
                    name: name.to_string(),
                    level: e.level,
                })
            })
            .collect::<Vec<_>>();
        buf.fill(0);

        tracing::info!(count = users.len(), "loaded users");
        Ok(UserStore { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn find(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Run `f` on the stored password of `name`.
    ///
    /// Returns `None` when the file cannot be read or holds no entry for the
    /// user. The file contents are zeroed before this returns.
    pub fn with_password<R>(&self, name: &str, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut buf = std::fs::read(&self.path).ok()?;
        let out = entries(&buf)
            .find(|e| e.name == name.as_bytes())
            .map(|e| f(e.password));
        buf.fill(0);
        out
    }
}
