use crate::error::{OnvifError, ParseErrorKind};

/// Largest body accepted on either listener.
pub const MAX_BODY_LEN: usize = 64 * 1024;
/// Longest accepted request line plus headers.
pub const MAX_HEAD_LEN: usize = 16 * 1024;

/// A parsed RTSP (RFC 2326 §6) or HTTP/1.1 request.
///
/// Both protocols share the syntax:
///
/// ```text
/// Method SP Request-URI SP Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. [`parse`](Self::parse)
/// reads the head only; the transport reads [`content_length`](Self::content_length)
/// bytes after the blank line into [`body`](Self::body).
#[derive(Debug)]
pub struct Request {
    /// Method (OPTIONS, DESCRIBE, SETUP, ... or POST).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/trackID=1`).
    pub uri: String,
    /// Protocol version (`RTSP/1.0`, `RTSP/2.0`, `HTTP/1.1`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Parse the request line and headers.
    ///
    /// Expects the head up to and including the blank line. Returns
    /// [`OnvifError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(OnvifError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(OnvifError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        let mut headers = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(OnvifError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();

            headers.push((name, value));
        }

        Ok(Request {
            method,
            uri,
            version,
            headers,
            body: Vec::new(),
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the CSeq header value, which numbers and orders RTSP
    /// request/response pairs (RFC 2326 §12.17).
    ///
    /// Every RTSP request must include a CSeq, and the response must echo it.
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Declared body length; zero without the header.
    pub fn content_length(&self) -> crate::error::Result<usize> {
        let Some(value) = self.get_header("Content-Length") else {
            return Ok(0);
        };
        match value.parse::<usize>() {
            Ok(len) if len <= MAX_BODY_LEN => Ok(len),
            _ => Err(OnvifError::Parse {
                kind: ParseErrorKind::InvalidContentLength,
            }),
        }
    }

    /// Does the `Content-Type` header name `mime`, ignoring parameters?
    pub fn has_content_type(&self, mime: &str) -> bool {
        self.get_header("Content-Type")
            .and_then(|v| v.split(';').next())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(mime))
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
