//! Error types for the ONVIF device library.

use std::fmt;

/// Errors that can occur in the ONVIF device library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **SOAP**: [`Decode`](Self::Decode), [`InvalidNamespace`](Self::InvalidNamespace),
///   [`MessageTooLarge`](Self::MessageTooLarge), [`MissingElement`](Self::MissingElement).
/// - **Framing**: [`Parse`](Self::Parse) for malformed RTSP and HTTP requests.
/// - **Transport**: [`Io`](Self::Io) for socket and file failures.
/// - **RTSP**: [`SessionNotFound`](Self::SessionNotFound),
///   [`ChannelsExhausted`](Self::ChannelsExhausted).
/// - **Server**: [`AlreadyRunning`](Self::AlreadyRunning),
///   [`Config`](Self::Config).
///
/// SOAP faults are not represented here; see [`crate::service::HandlerError`].
#[derive(Debug, thiserror::Error)]
pub enum OnvifError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The SOAP decoder rejected the input.
    #[error("SOAP decode error: {kind}")]
    Decode { kind: DecodeErrorKind },

    /// A namespace prefix was used before being registered on the message.
    #[error("namespace prefix not registered: {0}")]
    InvalidNamespace(String),

    /// The encoded message would exceed [`SOAP_MAX_MSG_SIZE`](crate::soap::SOAP_MAX_MSG_SIZE).
    #[error("encoded message too large: {size} bytes")]
    MessageTooLarge { size: usize },

    /// Failed to parse an RTSP or HTTP request.
    #[error("request parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Configuration or persisted state could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// No RTSP session with the given ID exists in the
    /// [`SessionManager`](crate::session::SessionManager).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No free interleaved channel pair is left.
    #[error("interleaved channel range exhausted")]
    ChannelsExhausted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// A request lacked a child element the handler requires.
    #[error("missing element: {0}")]
    MissingElement(&'static str),
}

impl OnvifError {
    pub(crate) fn decode(kind: DecodeErrorKind) -> Self {
        OnvifError::Decode { kind }
    }
}

/// Specific kind of SOAP decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The `<?xml ... ?>` prolog was not terminated.
    Prolog,
    /// Input ended inside a tag, attribute or open element.
    UnexpectedEof,
    /// A tag had no name.
    EmptyElement,
    /// A token could not be classified (stray text, mismatched close tag, DTD).
    InvalidToken,
    /// Nesting exceeded [`SOAP_MAX_STACKSIZE`](crate::soap::SOAP_MAX_STACKSIZE).
    StackOverflow,
    /// A close tag without an open element, or open elements left at EOF.
    UnbalancedStack,
    /// The root element resolved to no namespace.
    MissingNamespace,
    /// A prefix was used that no `xmlns:` declaration introduced.
    UnknownPrefix,
    /// An attribute prefix exceeded the supported length.
    PrefixTooLong,
    /// An attribute was not of the form `name="value"`.
    InvalidAttribute,
    /// The input was not valid UTF-8.
    NotUtf8,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prolog => write!(f, "unterminated prolog"),
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::EmptyElement => write!(f, "element without name"),
            Self::InvalidToken => write!(f, "invalid token"),
            Self::StackOverflow => write!(f, "nesting too deep"),
            Self::UnbalancedStack => write!(f, "unbalanced elements"),
            Self::MissingNamespace => write!(f, "element without namespace"),
            Self::UnknownPrefix => write!(f, "unknown namespace prefix"),
            Self::PrefixTooLong => write!(f, "namespace prefix too long"),
            Self::InvalidAttribute => write!(f, "invalid attribute"),
            Self::NotUtf8 => write!(f, "input is not UTF-8"),
        }
    }
}

/// Specific kind of RTSP/HTTP request parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was not a number or exceeded the accepted size.
    InvalidContentLength,
    /// An interleaved frame was cut short.
    TruncatedFrame,
    /// The request line and headers exceeded the accepted size.
    HeadTooLong,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid content length"),
            Self::TruncatedFrame => write!(f, "truncated interleaved frame"),
            Self::HeadTooLong => write!(f, "request head too long"),
        }
    }
}

/// Convenience alias for `Result<T, OnvifError>`.
pub type Result<T> = std::result::Result<T, OnvifError>;
