/// An RTSP (RFC 2326 §7) or HTTP/1.1 response.
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// Server: onvif-rs/0.1\r\n
/// CSeq: 1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
#[must_use]
pub struct Response {
    pub version: &'static str,
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// Server identification string included in every response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = "onvif-rs/0.1";

const RTSP_VERSION: &str = "RTSP/1.0";
const HTTP_VERSION: &str = "HTTP/1.1";

impl Response {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Response {
            version: RTSP_VERSION,
            status_code,
            status_text: status_text.to_string(),
            headers: vec![("Server".to_string(), SERVER_AGENT.to_string())],
            body: None,
        }
    }

    /// An HTTP/1.1 status line instead of RTSP/1.0.
    pub fn http(status_code: u16, status_text: &str) -> Self {
        Response {
            version: HTTP_VERSION,
            ..Self::new(status_code, status_text)
        }
    }

    /// 200 OK: success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 404 Not Found: the requested resource does not exist.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// 400 Bad Request: malformed or missing required header.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 401 Unauthorized carrying a `WWW-Authenticate` challenge.
    pub fn unauthorized(challenge: &str) -> Self {
        Self::new(401, "Unauthorized").add_header("WWW-Authenticate", challenge)
    }

    /// 454 Session Not Found (RFC 2326 §11.3.9).
    pub fn session_not_found() -> Self {
        Self::new(454, "Session Not Found")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// `Date` in RFC 1123 format (RFC 2326 §12.18).
    pub fn with_date(self) -> Self {
        let now = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        self.add_header("Date", &now)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize to the text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> Vec<u8> {
        let mut response = format!("{} {} {}\r\n", self.version, self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        match &self.body {
            Some(body) => {
                response.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
                let mut out = response.into_bytes();
                out.extend_from_slice(body);
                out
            }
            None => {
                response.push_str("\r\n");
                response.into_bytes()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(resp: &Response) -> String {
        String::from_utf8(resp.serialize()).unwrap()
    }

    #[test]
    fn serialize_no_body() {
        let resp = Response::ok()
            .add_header("CSeq", "1")
            .add_header("Public", "OPTIONS");
        let s = text(&resp);
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains("Server: onvif-rs/0.1\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("Public: OPTIONS\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn serialize_with_body() {
        let resp = Response::ok()
            .add_header("CSeq", "2")
            .with_body("v=0\r\n");
        let s = text(&resp);
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn http_status_line() {
        let s = text(&Response::http(400, "Bad Request").with_body("<x/>"));
        assert!(s.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(s.contains("Content-Length: 4\r\n"));
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let resp = Response::unauthorized("Digest realm=\"x\"").add_header("CSeq", "5");
        assert_eq!(resp.status_code, 401);
        let s = text(&resp);
        assert!(s.starts_with("RTSP/1.0 401 Unauthorized\r\n"));
        assert!(s.contains("WWW-Authenticate: Digest realm=\"x\"\r\n"));
    }

    #[test]
    fn date_header_is_gmt() {
        let s = text(&Response::ok().with_date());
        let date = s.lines().find(|l| l.starts_with("Date: ")).unwrap();
        assert!(date.ends_with(" GMT"));
    }
}
