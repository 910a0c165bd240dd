//! Authentication: WS-Security UsernameToken for SOAP, Digest for RTSP.
//!
//! Every failure, whatever its cause, resolves to [`UserLevel::Anonymous`].

pub mod digest;
pub mod users;
pub mod wss;

pub use digest::{DigestChallenge, DigestResponse, digest_auth, random_token};
pub use users::{User, UserStore};
pub use wss::wss_auth;

/// Privilege level, most privileged first.
///
/// A caller at level `a` may invoke a method requiring level `r` when
/// `a <= r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserLevel {
    Admin = 0,
    Operator = 1,
    User = 2,
    Anonymous = 3,
}

impl UserLevel {
    pub fn from_digit(d: u8) -> Option<Self> {
        match d {
            b'0' => Some(UserLevel::Admin),
            b'1' => Some(UserLevel::Operator),
            b'2' => Some(UserLevel::User),
            b'3' => Some(UserLevel::Anonymous),
            _ => None,
        }
    }

    /// `tt:UserLevel` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Admin => "Administrator",
            UserLevel::Operator => "Operator",
            UserLevel::User => "User",
            UserLevel::Anonymous => "Anonymous",
        }
    }

    pub fn permits(&self, required: UserLevel) -> bool {
        *self <= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_privilege() {
        assert!(UserLevel::Admin.permits(UserLevel::Operator));
        assert!(UserLevel::User.permits(UserLevel::User));
        assert!(!UserLevel::User.permits(UserLevel::Operator));
        assert!(!UserLevel::Anonymous.permits(UserLevel::Admin));
        assert!(UserLevel::Anonymous.permits(UserLevel::Anonymous));
    }
}
