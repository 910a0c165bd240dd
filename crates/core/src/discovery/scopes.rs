//! Discovery scopes.
//!
//! Four fixed scopes come from the configuration. Up to
//! [`MAX_DYN_SCOPES`] dynamic ones are set by clients and persisted as
//! `scope|scope|` in the scopes file. Every mutation rewrites the file
//! while the list lock is held, and only takes effect once the write
//! succeeded.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

/// Most dynamic scopes kept at once.
pub const MAX_DYN_SCOPES: usize = 10;

/// Rejected scope mutation.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("scope list would exceed {MAX_DYN_SCOPES} entries")]
    TooMany,
    #[error("scope is fixed: {0}")]
    FixedScope(String),
    #[error("no such scope: {0}")]
    NoScope(String),
    #[error("failed to persist scopes: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a scope may be changed by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Fixed,
    Configurable,
}

impl ScopeKind {
    /// `tt:ScopeDefinition` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Fixed => "Fixed",
            ScopeKind::Configurable => "Configurable",
        }
    }
}

#[derive(Debug)]
pub struct ScopeStore {
    path: PathBuf,
    fixed: [String; 4],
    dynamic: Mutex<Vec<String>>,
}

impl ScopeStore {
    /// Load the dynamic scopes from `path`. A missing file means no
    /// dynamic scopes.
    pub fn open(path: impl Into<PathBuf>, fixed: [String; 4]) -> Result<Self> {
        let path = path.into();
        let dynamic = match std::fs::read_to_string(&path) {
            Ok(text) => parse(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), count = dynamic.len(), "loaded dynamic scopes");
        Ok(ScopeStore {
            path,
            fixed,
            dynamic: Mutex::new(dynamic),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fixed(&self) -> &[String] {
        &self.fixed
    }

    pub fn dynamic(&self) -> Vec<String> {
        self.dynamic.lock().clone()
    }

    /// Fixed scopes first, then dynamic ones.
    pub fn all(&self) -> Vec<(ScopeKind, String)> {
        let dynamic = self.dynamic.lock();
        self.fixed
            .iter()
            .map(|s| (ScopeKind::Fixed, s.clone()))
            .chain(dynamic.iter().map(|s| (ScopeKind::Configurable, s.clone())))
            .collect()
    }

    /// Probe filter check. Tokens are space separated; the filter matches
    /// when any token is a prefix of a known scope. An empty filter always
    /// matches.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        let mut tokens = filter
            .unwrap_or("")
            .split(' ')
            .filter(|t| !t.is_empty())
            .peekable();
        if tokens.peek().is_none() {
            return true;
        }
        let dynamic = self.dynamic.lock();
        tokens.any(|token| {
            self.fixed
                .iter()
                .chain(dynamic.iter())
                .any(|scope| scope.starts_with(token))
        })
    }

    /// Replace every dynamic scope.
    pub fn set(&self, scopes: Vec<String>) -> std::result::Result<(), ScopeError> {
        if scopes.len() > MAX_DYN_SCOPES {
            return Err(ScopeError::TooMany);
        }
        let mut dynamic = self.dynamic.lock();
        self.persist(&scopes)?;
        *dynamic = scopes;
        Ok(())
    }

    pub fn add(&self, scopes: Vec<String>) -> std::result::Result<(), ScopeError> {
        let mut dynamic = self.dynamic.lock();
        if dynamic.len() + scopes.len() > MAX_DYN_SCOPES {
            return Err(ScopeError::TooMany);
        }
        let mut next = dynamic.clone();
        next.extend(scopes);
        self.persist(&next)?;
        *dynamic = next;
        Ok(())
    }

    /// Remove the given dynamic scopes. Nothing is removed unless every item
    /// is removable: a fixed scope or an unknown one rejects the whole call.
    pub fn remove(&self, scopes: &[String]) -> std::result::Result<(), ScopeError> {
        let mut dynamic = self.dynamic.lock();
        for item in scopes {
            if self.fixed.iter().any(|f| f.starts_with(item.as_str())) {
                return Err(ScopeError::FixedScope(item.clone()));
            }
            if !dynamic.iter().any(|d| d.starts_with(item.as_str())) {
                return Err(ScopeError::NoScope(item.clone()));
            }
        }
        let next: Vec<String> = dynamic
            .iter()
            .filter(|d| !scopes.contains(d))
            .cloned()
            .collect();
        self.persist(&next)?;
        *dynamic = next;
        Ok(())
    }

    /// The `d:Scopes` value: every scope followed by a space.
    pub fn discovery_value(&self) -> String {
        let dynamic = self.dynamic.lock();
        self.fixed
            .iter()
            .chain(dynamic.iter())
            .fold(String::new(), |mut out, s| {
                out.push_str(s);
                out.push(' ');
                out
            })
    }

    fn persist(&self, dynamic: &[String]) -> std::result::Result<(), ScopeError> {
        let mut text = String::new();
        for s in dynamic {
            text.push_str(s);
            text.push('|');
        }
        std::fs::write(&self.path, text)?;
        tracing::info!(count = dynamic.len(), "dynamic scopes saved");
        Ok(())
    }
}

fn parse(text: &str) -> Vec<String> {
    text.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_DYN_SCOPES)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> [String; 4] {
        [
            "onvif://www.onvif.org/manufacturer/acme".to_string(),
            "onvif://www.onvif.org/hardware/door".to_string(),
            "onvif://www.onvif.org/name/front".to_string(),
            "onvif://www.onvif.org/Profile/Streaming".to_string(),
        ]
    }

    fn store(contents: Option<&str>) -> (tempfile::TempDir, ScopeStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes");
        if let Some(c) = contents {
            std::fs::write(&path, c).unwrap();
        }
        let s = ScopeStore::open(path, fixed()).unwrap();
        (dir, s)
    }

    #[test]
    fn loads_persisted_scopes() {
        let (_dir, s) = store(Some("onvif://www.onvif.org/location/hall|custom/a|"));
        assert_eq!(s.dynamic(), vec!["onvif://www.onvif.org/location/hall", "custom/a"]);
        let all = s.all();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].0, ScopeKind::Fixed);
        assert_eq!(all[4], (ScopeKind::Configurable, "onvif://www.onvif.org/location/hall".to_string()));
    }

    #[test]
    fn filter_matching() {
        let (_dir, s) = store(Some("custom/a|"));
        assert!(s.matches(None));
        assert!(s.matches(Some("  ")));
        assert!(s.matches(Some("onvif://www.onvif.org/name/front")));
        assert!(s.matches(Some("unrelated onvif://www.onvif.org/Profile")));
        assert!(s.matches(Some("custom/a")));
        assert!(!s.matches(Some("onvif://www.onvif.org/name/back other")));
    }

    #[test]
    fn set_add_and_limit() {
        let (dir, s) = store(None);
        s.set(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("scopes")).unwrap(), "a|b|");

        let eight: Vec<String> = (0..8).map(|i| format!("x{i}")).collect();
        s.add(eight).unwrap();
        assert_eq!(s.dynamic().len(), 10);
        assert!(matches!(s.add(vec!["y".into()]), Err(ScopeError::TooMany)));

        let eleven: Vec<String> = (0..11).map(|i| format!("z{i}")).collect();
        assert!(matches!(s.set(eleven), Err(ScopeError::TooMany)));
        assert_eq!(s.dynamic().len(), 10);
    }

    #[test]
    fn remove_rejects_fixed_and_unknown() {
        let (dir, s) = store(Some("a|b|"));
        assert!(matches!(
            s.remove(&["onvif://www.onvif.org/name/front".into()]),
            Err(ScopeError::FixedScope(_))
        ));
        assert!(matches!(s.remove(&["c".into()]), Err(ScopeError::NoScope(_))));
        assert!(matches!(
            s.remove(&["a".into(), "c".into()]),
            Err(ScopeError::NoScope(_))
        ));
        assert_eq!(s.dynamic(), vec!["a", "b"]);

        s.remove(&["a".into()]).unwrap();
        assert_eq!(s.dynamic(), vec!["b"]);
        assert_eq!(std::fs::read_to_string(dir.path().join("scopes")).unwrap(), "b|");
    }

    #[test]
    fn discovery_value_is_space_terminated() {
        let (_dir, s) = store(Some("a|"));
        let v = s.discovery_value();
        assert!(v.starts_with("onvif://www.onvif.org/manufacturer/acme "));
        assert!(v.ends_with("Streaming a "));
    }

    #[test]
    fn failed_save_keeps_previous_scopes() {
        let (dir, s) = store(Some("a|"));
        let path = dir.path().join("scopes");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(s.set(vec!["onvif://www.onvif.org/location/x".into()]), Err(ScopeError::Io(_))));
        assert!(matches!(s.add(vec!["b".into()]), Err(ScopeError::Io(_))));
        assert!(matches!(s.remove(&["a".into()]), Err(ScopeError::Io(_))));

        assert_eq!(s.dynamic(), vec!["a"]);
        assert!(!s.matches(Some("onvif://www.onvif.org/location/x")));
    }
}
