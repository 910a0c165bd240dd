//! WS-Security UsernameToken verification.
//!
//! ```text
//! Password = Base64(SHA1(Base64Decode(Nonce) || Created || password))
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use crate::auth::{UserLevel, UserStore};
use crate::soap::Message;
use crate::soap::names::WSS_PASSWORD_DIGEST;

/// `Base64(SHA1(nonce || created || password))`.
pub fn password_digest(nonce: &[u8], created: &str, password: &[u8]) -> String {
    let mut sha = Sha1::new();
    sha.update(nonce);
    sha.update(created.as_bytes());
    sha.update(password);
    BASE64.encode(sha.finalize())
}

/// Level of the user named in the message's UsernameToken, or
/// [`UserLevel::Anonymous`] if the token is absent, malformed, names an
/// unknown user or carries a wrong digest.
pub fn wss_auth(msg: &Message, users: &UserStore) -> UserLevel {
    match verify(msg, users) {
        Some(level) => level,
        None => UserLevel::Anonymous,
    }
}

fn verify(msg: &Message, users: &UserStore) -> Option<UserLevel> {
    let token = msg.find_path(msg.header()?, &["Security", "UsernameToken"])?;
    let username = msg.child_value(token, "Username")?;
    let password = msg.find_child(token, None, "Password")?;
    let nonce = msg.child_value(token, "Nonce")?;
    let created = msg.child_value(token, "Created")?;

    if msg.find_parameter(password, "Type")?.value != WSS_PASSWORD_DIGEST {
        tracing::debug!(username, "UsernameToken without PasswordDigest");
        return None;
    }
    let received = msg.value(password)?;

    let user = users.find(username)?;
    let nonce = BASE64.decode(nonce).ok()?;
    let expected = users.with_password(&user.name, |pw| password_digest(&nonce, created, pw))?;

    if expected != received {
        tracing::warn!(username, "WS-Security digest mismatch");
        return None;
    }
    Some(user.level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::decode;

    const NONCE: &[u8] = b"0123456789abcdef";
    const CREATED: &str = "2024-01-01T00:00:00Z";

    fn request(user: &str, digest: &str, pw_type: &str) -> Message {
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:wsse="urn:wsse" xmlns:wsu="urn:wsu">
<s:Header><wsse:Security><wsse:UsernameToken>
<wsse:Username>{user}</wsse:Username>
<wsse:Password Type="{pw_type}">{digest}</wsse:Password>
<wsse:Nonce>{nonce}</wsse:Nonce>
<wsu:Created>{CREATED}</wsu:Created>
</wsse:UsernameToken></wsse:Security></s:Header>
<s:Body/></s:Envelope>"#,
            nonce = BASE64.encode(NONCE),
        );
        decode(xml.as_bytes()).unwrap()
    }

    fn users() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users");
        std::fs::write(&path, "0,admin,secret|2,viewer,view|").unwrap();
        let store = UserStore::open(path).unwrap();
        (dir, store)
    }

    #[test]
    fn digest_matches_reference() {
        let mut sha = Sha1::new();
        sha.update(b"0123456789abcdef2024-01-01T00:00:00Zsecret");
        let reference = BASE64.encode(sha.finalize());
        assert_eq!(password_digest(NONCE, CREATED, b"secret"), reference);
        assert_ne!(password_digest(NONCE, CREATED, b"secreu"), reference);
    }

    #[test]
    fn valid_token_yields_user_level() {
        let (_dir, store) = users();
        let digest = password_digest(NONCE, CREATED, b"view");
        let msg = request("viewer", &digest, WSS_PASSWORD_DIGEST);
        assert_eq!(wss_auth(&msg, &store), UserLevel::User);
    }

    #[test]
    fn failures_are_anonymous() {
        let (_dir, store) = users();
        let good = password_digest(NONCE, CREATED, b"secret");
        let wrong = password_digest(NONCE, CREATED, b"secreT");

        assert_eq!(wss_auth(&request("admin", &wrong, WSS_PASSWORD_DIGEST), &store), UserLevel::Anonymous);
        assert_eq!(wss_auth(&request("nobody", &good, WSS_PASSWORD_DIGEST), &store), UserLevel::Anonymous);
        assert_eq!(wss_auth(&request("admin", &good, "PasswordText"), &store), UserLevel::Anonymous);

        let bare = decode(br#"<s:Envelope xmlns:s="urn:s"><s:Body/></s:Envelope>"#).unwrap();
        assert_eq!(wss_auth(&bare, &store), UserLevel::Anonymous);
    }
}
