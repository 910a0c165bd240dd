use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::UserLevel;
use crate::auth::digest::{DigestChallenge, digest_auth, realm};
use crate::error::OnvifError;
use crate::media::{InterleavedSink, StreamKind};
use crate::protocol::request::Request;
use crate::protocol::response::Response;
use crate::protocol::sdp;
use crate::service::Context;
use crate::session::transport::TransportHeader;
use crate::session::{SessionManager, session_id};

const PUBLIC_V1: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER, SET_PARAMETER, REDIRECT, ANNOUNCE, RECORD";
/// Challenges a connection keeps answerable at once.
const MAX_ISSUED_NONCES: usize = 8;
const PUBLIC_V2: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER, SET_PARAMETER, REDIRECT, PLAY_NOTIFY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V1,
    V2,
}

/// Handles RTSP method requests for a single TCP connection.
///
/// Tracks which sessions were created on this connection so they
/// can be cleaned up when the connection drops.
pub struct MethodHandler {
    ctx: Arc<Context>,
    session_manager: SessionManager,
    client_addr: SocketAddr,
    /// The connection itself, for interleaved streams started by PLAY.
    sink: Arc<dyn InterleavedSink>,
    /// Session IDs created during this connection, for cleanup on disconnect.
    session_ids: Vec<String>,
    /// Nonces of the Digest challenges sent on this connection, oldest first.
    nonces: Vec<String>,
}

impl MethodHandler {
    pub fn new(
        ctx: Arc<Context>,
        session_manager: SessionManager,
        client_addr: SocketAddr,
        sink: Arc<dyn InterleavedSink>,
    ) -> Self {
        MethodHandler {
            ctx,
            session_manager,
            client_addr,
            sink,
            session_ids: Vec::new(),
            nonces: Vec::new(),
        }
    }

    /// Returns session IDs owned by this connection (for cleanup on disconnect).
    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }

    pub fn handle(&mut self, request: &Request) -> Response {
        let cseq = request.cseq().unwrap_or("0");

        let version = match request.version.as_str() {
            "RTSP/1.0" => Version::V1,
            "RTSP/2.0" => Version::V2,
            other => {
                tracing::warn!(version = other, %cseq, "unsupported RTSP version");
                return Response::new(505, "RTSP Version Not Supported").add_header("CSeq", cseq);
            }
        };

        if self.ctx.config.auth_enabled {
            let local_ip = self.ctx.config.local_ip;
            let level = digest_auth(
                request.get_header("Authorization"),
                &request.method,
                &realm(local_ip),
                &self.nonces,
                &self.ctx.users,
            );
            if !level.permits(UserLevel::User) {
                tracing::debug!(peer = %self.client_addr, method = %request.method, "digest challenge");
                let challenge = DigestChallenge::new(self.client_addr.ip());
                if self.nonces.len() == MAX_ISSUED_NONCES {
                    self.nonces.remove(0);
                }
                self.nonces.push(challenge.nonce.clone());
                return Response::unauthorized(&challenge.header_value(local_ip))
                    .add_header("CSeq", cseq);
            }
        }

        if let Some(id) = request.get_header("Session") {
            self.session_manager.touch(session_id(id));
        }

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(cseq, version),
            "DESCRIBE" => self.handle_describe(cseq, request),
            "ANNOUNCE" => self.handle_announce(cseq, request),
            "SETUP" => self.handle_setup(cseq, request),
            "PLAY" => self.handle_play(cseq, request),
            "PAUSE" => self.handle_pause(cseq, request),
            "TEARDOWN" => self.handle_teardown(cseq, request),
            "GET_PARAMETER" => self.handle_get_parameter(cseq, request),
            "SET_PARAMETER" | "REDIRECT" | "RECORD" | "PLAY_NOTIFY" => {
                tracing::debug!(method = %request.method, %cseq, "accepted without effect");
                Response::ok().add_header("CSeq", cseq)
            }
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                Response::new(501, "Not Implemented").add_header("CSeq", cseq)
            }
        }
    }

    fn handle_options(&self, cseq: &str, version: Version) -> Response {
        tracing::debug!(%cseq, "OPTIONS");
        let public = match version {
            Version::V1 => PUBLIC_V1,
            Version::V2 => PUBLIC_V2,
        };
        Response::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", public)
    }

    fn handle_describe(&self, cseq: &str, request: &Request) -> Response {
        tracing::debug!(%cseq, uri = %request.uri, "DESCRIBE");

        if let Some(accept) = request.get_header("Accept")
            && !accept.contains("application/sdp")
        {
            tracing::warn!(accept, "DESCRIBE without application/sdp in Accept");
            return Response::new(406, "Not Acceptable").add_header("CSeq", cseq);
        }

        let config = &self.ctx.config;
        let now = chrono::Utc::now().timestamp() as u64;
        let sdp = sdp::generate_sdp(config.local_ip, now, now, config.fake_video);

        Response::ok()
            .add_header("CSeq", cseq)
            .with_date()
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", &request.uri)
            .with_body(sdp)
    }

    fn handle_announce(&self, cseq: &str, request: &Request) -> Response {
        if !request.has_content_type("application/sdp") {
            tracing::warn!(%cseq, "ANNOUNCE without application/sdp body");
            return Response::bad_request().add_header("CSeq", cseq);
        }
        if request.body_str().is_some_and(sdp::announces_backchannel) {
            Response::ok().add_header("CSeq", cseq)
        } else {
            tracing::warn!(%cseq, "ANNOUNCE offers no supported media");
            Response::not_found().add_header("CSeq", cseq)
        }
    }

    fn handle_setup(&mut self, cseq: &str, request: &Request) -> Response {
        let kind = match StreamKind::from_uri(&request.uri) {
            Some(StreamKind::Video) if !self.ctx.config.fake_video => None,
            other => other,
        };
        let Some(kind) = kind else {
            tracing::warn!(uri = %request.uri, "SETUP for unknown track");
            return Response::not_found().add_header("CSeq", cseq);
        };

        let transport_header = match request.get_header("Transport") {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, "SETUP missing Transport header");
                return Response::bad_request().add_header("CSeq", cseq);
            }
        };

        let client_transport = match TransportHeader::parse(transport_header) {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, transport_header, "SETUP unsupported Transport header");
                return Response::new(461, "Unsupported Transport").add_header("CSeq", cseq);
            }
        };

        let requested = request.get_header("Session").map(session_id);
        let setup = match self.session_manager.setup(
            requested,
            kind,
            &client_transport,
            self.client_addr.ip(),
        ) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "stream setup failed");
                return Response::new(500, "Internal Server Error").add_header("CSeq", cseq);
            }
        };

        if !self.session_ids.contains(&setup.session_id) {
            self.session_ids.push(setup.session_id.clone());
        }

        tracing::info!(
            session_id = %setup.session_id,
            ?kind,
            uri = %request.uri,
            peer = %self.client_addr,
            rtp = setup.rtp,
            "stream created via SETUP"
        );

        Response::ok()
            .add_header("CSeq", cseq)
            .with_date()
            .add_header("Session", &setup.session_header_value())
            .add_header("Transport", &setup.transport_header_value())
    }

    fn handle_play(&mut self, cseq: &str, request: &Request) -> Response {
        let Some(id) = request.get_header("Session").map(session_id) else {
            tracing::warn!(%cseq, "PLAY missing Session header");
            return Response::session_not_found().add_header("CSeq", cseq);
        };

        match self.session_manager.play(id, &self.sink) {
            Ok(()) => Response::ok()
                .add_header("CSeq", cseq)
                .with_date()
                .add_header("Session", id)
                .add_header("Range", "npt=0.000-"),
            Err(e) => session_error(cseq, "PLAY", id, e),
        }
    }

    fn handle_pause(&mut self, cseq: &str, request: &Request) -> Response {
        let Some(id) = request.get_header("Session").map(session_id) else {
            tracing::warn!(%cseq, "PAUSE missing Session header");
            return Response::session_not_found().add_header("CSeq", cseq);
        };

        match self.session_manager.pause(id) {
            Ok(()) => Response::ok()
                .add_header("CSeq", cseq)
                .with_date()
                .add_header("Session", id),
            Err(e) => session_error(cseq, "PAUSE", id, e),
        }
    }

    fn handle_teardown(&mut self, cseq: &str, request: &Request) -> Response {
        let Some(id) = request.get_header("Session").map(session_id) else {
            tracing::warn!(%cseq, "TEARDOWN missing Session header");
            return Response::session_not_found().add_header("CSeq", cseq);
        };

        match self.session_manager.teardown(id) {
            Ok(()) => {
                self.session_ids.retain(|s| s != id);
                Response::ok().add_header("CSeq", cseq).with_date()
            }
            Err(e) => session_error(cseq, "TEARDOWN", id, e),
        }
    }

    /// GET_PARAMETER is used by clients (e.g. VLC) as a keepalive (RFC 2326 §10.8).
    /// The renewal itself already happened in [`handle`](Self::handle).
    fn handle_get_parameter(&self, cseq: &str, request: &Request) -> Response {
        tracing::trace!(%cseq, "GET_PARAMETER keepalive");

        let resp = Response::ok().add_header("CSeq", cseq).with_date();
        match request.get_header("Session").map(session_id) {
            Some(id) if self.session_manager.contains(id) => resp.add_header("Session", id),
            Some(id) => {
                tracing::warn!(session_id = id, "GET_PARAMETER for unknown session");
                Response::session_not_found().add_header("CSeq", cseq)
            }
            None => resp,
        }
    }
}

fn session_error(cseq: &str, method: &str, id: &str, e: OnvifError) -> Response {
    match e {
        OnvifError::SessionNotFound(_) => {
            tracing::warn!(session_id = id, method, "unknown session");
            Response::session_not_found().add_header("CSeq", cseq)
        }
        e => {
            tracing::error!(session_id = id, method, error = %e, "session operation failed");
            Response::new(500, "Internal Server Error").add_header("CSeq", cseq)
        }
    }
}
