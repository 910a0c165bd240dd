//! RTSP protocol implementation (RFC 2326), plus the request/response
//! framing the SOAP-over-HTTP listener shares with it.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | SDP with audio, backchannel and optional video |
//! | ANNOUNCE | §10.3 | Accepts an audio offer |
//! | SETUP | §10.4 | Negotiate UDP ports or interleaved channels |
//! | PLAY | §10.5 | Start the session's pipelines |
//! | PAUSE | §10.6 | Stop them, keeping the session |
//! | TEARDOWN | §10.7 | Destroy session |
//! | GET_PARAMETER | §10.8 | Keepalive |
//!
//! `SET_PARAMETER`, `REDIRECT` and `RECORD` are answered 200 without effect.
//! With authentication on, every request must carry a valid Digest
//! `Authorization` of at least user level.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::MethodHandler;
pub use request::Request;
pub use response::Response;
