//! RTSP Digest authentication (RFC 2617).
//!
//! The server nonce is `hex(SHA1(random32 || gmtime || peer_ip || random32))`.
//! `HA1` is computed per request from the stored password, which is not
//! kept beyond the hash.

use std::collections::HashMap;
use std::net::IpAddr;

use sha1::{Digest, Sha1};

use crate::auth::{UserLevel, UserStore};

pub const REALM: &str = "stream";
pub const QOP: &str = "auth";
pub const ALGORITHM: &str = "MD5-Sess";

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random alphanumeric string of `len` characters.
pub fn random_token(len: usize) -> String {
    (0..len)
        .map(|_| TOKEN_ALPHABET[rand::random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// A fresh challenge for one `401 Unauthorized` reply.
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub nonce: String,
    pub opaque: String,
}

impl DigestChallenge {
    pub fn new(peer: IpAddr) -> Self {
        let head: [u8; 32] = rand::random();
        let tail: [u8; 32] = rand::random();
        let timestamp = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        let mut sha = Sha1::new();
        sha.update(head);
        sha.update(timestamp.as_bytes());
        sha.update(peer.to_string().as_bytes());
        sha.update(tail);

        DigestChallenge {
            nonce: hex::encode(sha.finalize()),
            opaque: random_token(64),
        }
    }

    /// `WWW-Authenticate` header value, in the [`realm`] of `local`.
    pub fn header_value(&self, local: IpAddr) -> String {
        format!(
            "Digest realm=\"{}\",nonce=\"{}\",opaque=\"{}\",algorithm=\"{ALGORITHM}\",qop=\"{QOP}\"",
            realm(local),
            self.nonce,
            self.opaque
        )
    }
}

/// Realm scoped to the local address, `"<laddr>/stream"`.
pub fn realm(local: IpAddr) -> String {
    format!("{local}/{REALM}")
}

/// Parsed `Authorization: Digest ...` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestResponse {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl DigestResponse {
    /// Parse the header value. `None` unless the scheme is `Digest` and the
    /// mandatory fields are present.
    ///
    /// ```
    /// use onvif::auth::DigestResponse;
    ///
    /// let r = DigestResponse::parse(
    ///     r#"Digest username="admin", realm="10.0.0.1/stream", nonce="abc", uri="rtsp://10.0.0.1/stream", response="0123""#,
    /// ).unwrap();
    /// assert_eq!(r.username, "admin");
    /// assert_eq!(r.qop, None);
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let rest = header.trim().strip_prefix("Digest")?.trim_start();
        let fields = split_params(rest);
        let get = |k: &str| fields.get(k).cloned();

        Some(DigestResponse {
            username: get("username")?,
            realm: get("realm")?,
            nonce: get("nonce")?,
            uri: get("uri")?,
            response: get("response")?,
            qop: get("qop"),
            nc: get("nc"),
            cnonce: get("cnonce"),
        })
    }

    /// Expected `response` for the given `HA1` and request method.
    pub fn expected(&self, ha1: &str, method: &str) -> String {
        let ha2 = format!("{:x}", md5::compute(format!("{method}:{}", self.uri)));
        let source = match (&self.qop, &self.nc, &self.cnonce) {
            (Some(qop), Some(nc), Some(cnonce)) => {
                format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", self.nonce)
            }
            _ => format!("{ha1}:{}:{ha2}", self.nonce),
        };
        format!("{:x}", md5::compute(source))
    }
}

/// `k=v, k2="v, 2"` into a map, quotes removed.
fn split_params(s: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut in_quotes = false;
    let mut start = 0;

    let mut push = |part: &str| {
        if let Some((k, v)) = part.split_once('=') {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(v);
            out.insert(k.trim().to_ascii_lowercase(), v.to_string());
        }
    };

    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&s[start..]);
    out
}

/// `MD5(user:realm:password)` in lower-case hex.
pub fn ha1(username: &str, realm: &str, password: &[u8]) -> String {
    let mut ctx = md5::Context::new();
    ctx.consume(username.as_bytes());
    ctx.consume(b":");
    ctx.consume(realm.as_bytes());
    ctx.consume(b":");
    ctx.consume(password);
    format!("{:x}", ctx.compute())
}

/// Verify an `Authorization` header for `method`.
///
/// The response must name `realm` and one of the `issued` nonces. Missing
/// or malformed headers, foreign realms or nonces, unknown users and wrong
/// responses all yield [`UserLevel::Anonymous`].
pub fn digest_auth(
    authorization: Option<&str>,
    method: &str,
    realm: &str,
    issued: &[String],
    users: &UserStore,
) -> UserLevel {
    let Some(resp) = authorization.and_then(DigestResponse::parse) else {
        return UserLevel::Anonymous;
    };
    if resp.realm != realm || !issued.contains(&resp.nonce) {
        tracing::warn!(username = %resp.username, realm = %resp.realm, "digest response for a stale nonce or foreign realm");
        return UserLevel::Anonymous;
    }
    let Some(user) = users.find(&resp.username) else {
        tracing::warn!(username = %resp.username, "digest auth for unknown user");
        return UserLevel::Anonymous;
    };
    let Some(ha1) = users.with_password(&user.name, |pw| ha1(&user.name, &resp.realm, pw)) else {
        return UserLevel::Anonymous;
    };

    if resp.expected(&ha1, method).eq_ignore_ascii_case(&resp.response) {
        user.level
    } else {
        tracing::warn!(username = %resp.username, "digest response mismatch");
        UserLevel::Anonymous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_REALM: &str = "127.0.0.1/stream";

    fn issued() -> Vec<String> {
        vec!["deadbeef".to_string()]
    }

    fn users() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users");
        std::fs::write(&path, "0,admin,secret|2,viewer,view|").unwrap();
        let store = UserStore::open(path).unwrap();
        (dir, store)
    }

    fn authorization(user: &str, password: &str, method: &str) -> String {
        let realm = TEST_REALM;
        let uri = "rtsp://127.0.0.1:554/stream";
        let partial = DigestResponse {
            username: user.to_string(),
            realm: realm.to_string(),
            nonce: "deadbeef".to_string(),
            uri: uri.to_string(),
            qop: Some("auth".to_string()),
            nc: Some("00000001".to_string()),
            cnonce: Some("c0ffee".to_string()),
            ..Default::default()
        };
        let response = partial.expected(&ha1(user, realm, password.as_bytes()), method);
        format!(
            r#"Digest username="{user}", realm="{realm}", nonce="deadbeef", uri="{uri}", response="{response}", qop=auth, nc=00000001, cnonce="c0ffee""#
        )
    }

    #[test]
    fn challenge_format() {
        let c = DigestChallenge::new("10.0.0.9".parse().unwrap());
        assert_eq!(c.nonce.len(), 40);
        assert_eq!(c.opaque.len(), 64);
        let h = c.header_value("10.0.0.1".parse().unwrap());
        assert!(h.starts_with("Digest realm=\"10.0.0.1/stream\",nonce=\""));
        assert!(h.ends_with(",algorithm=\"MD5-Sess\",qop=\"auth\""));
        assert_ne!(c.nonce, DigestChallenge::new("10.0.0.9".parse().unwrap()).nonce);
    }

    #[test]
    fn ha1_matches_reference() {
        assert_eq!(
            ha1("admin", "r", b"secret"),
            format!("{:x}", md5::compute("admin:r:secret"))
        );
    }

    #[test]
    fn valid_response_yields_level() {
        let (_dir, store) = users();
        let header = authorization("viewer", "view", "DESCRIBE");
        assert_eq!(digest_auth(Some(&header), "DESCRIBE", TEST_REALM, &issued(), &store), UserLevel::User);
    }

    #[test]
    fn wrong_password_method_or_user_is_anonymous() {
        let (_dir, store) = users();
        let bad_pw = authorization("admin", "secreT", "SETUP");
        assert_eq!(digest_auth(Some(&bad_pw), "SETUP", TEST_REALM, &issued(), &store), UserLevel::Anonymous);

        let good = authorization("admin", "secret", "SETUP");
        assert_eq!(digest_auth(Some(&good), "PLAY", TEST_REALM, &issued(), &store), UserLevel::Anonymous);
        assert_eq!(digest_auth(Some(&good), "SETUP", TEST_REALM, &issued(), &store), UserLevel::Admin);

        let unknown = authorization("ghost", "secret", "SETUP");
        assert_eq!(digest_auth(Some(&unknown), "SETUP", TEST_REALM, &issued(), &store), UserLevel::Anonymous);
        assert_eq!(digest_auth(None, "SETUP", TEST_REALM, &issued(), &store), UserLevel::Anonymous);
        assert_eq!(digest_auth(Some("Basic YWRtaW4="), "SETUP", TEST_REALM, &issued(), &store), UserLevel::Anonymous);
    }

    #[test]
    fn foreign_nonce_or_realm_is_anonymous() {
        let (_dir, store) = users();
        let header = authorization("admin", "secret", "PLAY");
        assert_eq!(digest_auth(Some(&header), "PLAY", TEST_REALM, &[], &store), UserLevel::Anonymous);
        assert_eq!(
            digest_auth(Some(&header), "PLAY", TEST_REALM, &["cafe".to_string()], &store),
            UserLevel::Anonymous
        );
        assert_eq!(
            digest_auth(Some(&header), "PLAY", "10.9.9.9/stream", &issued(), &store),
            UserLevel::Anonymous
        );
        assert_eq!(realm("127.0.0.1".parse().unwrap()), TEST_REALM);
    }

    #[test]
    fn response_without_qop() {
        let r = DigestResponse::parse(
            r#"Digest username="a", realm="r", nonce="n", uri="u", response="x""#,
        )
        .unwrap();
        let ha1 = ha1("a", "r", b"p");
        let ha2 = format!("{:x}", md5::compute("GET:u"));
        let reference = format!("{:x}", md5::compute(format!("{ha1}:n:{ha2}")));
        assert_eq!(r.expected(&ha1, "GET"), reference);
    }
}
