//! RTSP session management (RFC 2326 §3, §12.37).
//!
//! An RTSP session is created by the first SETUP and grows one stream per
//! further SETUP that carries its `Session` header. It tracks:
//!
//! - A random session ID, returned in the `Session` header.
//! - The playback state: Ready -> Playing <-> Paused.
//! - Per stream: the track, the transport mode, the RTP/RTCP port or
//!   channel pair and the media pipeline handle.
//! - A keep-alive deadline. Every request naming the session pushes it
//!   `timeout` seconds out; [`SessionManager::expire`] destroys sessions
//!   whose deadline passed.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! SETUP          -> Ready      (pipelines allocated)
//! PLAY           -> Playing    (pipelines started)
//! PAUSE          -> Paused     (pipelines stopped)
//! PLAY           -> Playing    (from Paused)
//! TEARDOWN       -> (removed, pipelines released)
//! expiry         -> (removed, pipelines released)
//! TCP disconnect -> (removed, via cleanup)
//! ```
//!
//! Pairs are collision free: interleaved channels across all sessions,
//! UDP ports per client address. A taken pair is probed upward by 2.

pub mod transport;

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::auth::digest::random_token;
use crate::error::{OnvifError, Result};
use crate::media::{InterleavedSink, MediaBackend, MediaHandle, StreamKind, Target};
pub use transport::{TransportHeader, TransportMode};

const SESSION_ID_LEN: usize = 16;

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// RTSP session state machine (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Streams set up, nothing flowing.
    Ready,
    /// Pipelines started.
    Playing,
    /// Pipelines stopped; PLAY resumes.
    Paused,
}

/// One negotiated track of a session.
#[derive(Debug)]
pub struct RtspStream {
    pub kind: StreamKind,
    pub mode: TransportMode,
    /// RTP port or channel.
    pub rtp: u16,
    /// RTCP port or channel.
    pub rtcp: u16,
    /// Client address the stream was set up from.
    pub peer: IpAddr,
    handle: MediaHandle,
    running: bool,
}

impl RtspStream {
    fn target(&self, sink: &Arc<dyn InterleavedSink>) -> Option<Target> {
        match self.mode {
            TransportMode::Udp => {
                // The backchannel listens locally on the negotiated port.
                let ip = match self.kind {
                    StreamKind::AudioBackchannel => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    _ => self.peer,
                };
                Some(Target::Udp {
                    rtp: SocketAddr::new(ip, self.rtp),
                    rtcp: SocketAddr::new(ip, self.rtcp),
                })
            }
            TransportMode::Interleaved => Some(Target::Interleaved {
                rtp_channel: u8::try_from(self.rtp).ok()?,
                rtcp_channel: u8::try_from(self.rtcp).ok()?,
                sink: sink.clone(),
            }),
        }
    }
}

/// A single RTSP session (RFC 2326 §3).
#[derive(Debug)]
pub struct RtspSession {
    pub id: String,
    pub timeout_secs: u64,
    state: SessionState,
    streams: Vec<RtspStream>,
    deadline: Instant,
}

impl RtspSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn streams(&self) -> &[RtspStream] {
        &self.streams
    }

    /// Format the `Session` response header value per RFC 2326 §12.37.
    ///
    /// Example: `"k3Jd9a0QpLm2xZt7;timeout=60"`
    pub fn session_header_value(&self) -> String {
        format!("{};timeout={}", self.id, self.timeout_secs)
    }
}

/// Outcome of a successful SETUP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    pub session_id: String,
    pub timeout_secs: u64,
    pub mode: TransportMode,
    pub rtp: u16,
    pub rtcp: u16,
}

impl Setup {
    pub fn session_header_value(&self) -> String {
        format!("{};timeout={}", self.session_id, self.timeout_secs)
    }

    pub fn transport_header_value(&self) -> String {
        TransportHeader::reply(self.mode, self.rtp, self.rtcp)
    }
}

/// Where an interleaved channel leads.
#[derive(Debug, Clone)]
struct Route {
    session: String,
    kind: StreamKind,
    handle: MediaHandle,
    is_rtp: bool,
}

#[derive(Debug, Default)]
struct Index {
    sessions: HashMap<String, RtspSession>,
    channels: HashMap<u8, Route>,
    udp_ports: HashMap<(IpAddr, u16), String>,
}

impl Index {
    fn pair_free(&self, mode: TransportMode, peer: IpAddr, rtp: u16, rtcp: u16) -> bool {
        match mode {
            TransportMode::Interleaved => [rtp, rtcp]
                .iter()
                .all(|c| u8::try_from(*c).is_ok_and(|c| !self.channels.contains_key(&c))),
            TransportMode::Udp => [rtp, rtcp]
                .iter()
                .all(|p| !self.udp_ports.contains_key(&(peer, *p))),
        }
    }

    /// First free pair at or above the requested one, stepping by 2.
    fn allocate_pair(&self, req: &TransportHeader, peer: IpAddr) -> Result<(u16, u16)> {
        let limit = match req.mode {
            TransportMode::Interleaved => u8::MAX as u16,
            TransportMode::Udp => u16::MAX,
        };
        let gap = req.rtcp.wrapping_sub(req.rtp);
        let mut rtp = req.rtp;
        loop {
            let rtcp = rtp.checked_add(gap).ok_or(OnvifError::ChannelsExhausted)?;
            if rtp > limit || rtcp > limit {
                return Err(OnvifError::ChannelsExhausted);
            }
            if self.pair_free(req.mode, peer, rtp, rtcp) {
                return Ok((rtp, rtcp));
            }
            rtp = rtp.checked_add(2).ok_or(OnvifError::ChannelsExhausted)?;
        }
    }

    fn claim(&mut self, session: &str, stream: &RtspStream) {
        match stream.mode {
            TransportMode::Interleaved => {
                for (ch, is_rtp) in [(stream.rtp, true), (stream.rtcp, false)] {
                    if let Ok(ch) = u8::try_from(ch) {
                        self.channels.insert(
                            ch,
                            Route {
                                session: session.to_string(),
                                kind: stream.kind,
                                handle: stream.handle,
                                is_rtp,
                            },
                        );
                    }
                }
            }
            TransportMode::Udp => {
                for port in [stream.rtp, stream.rtcp] {
                    self.udp_ports.insert((stream.peer, port), session.to_string());
                }
            }
        }
    }

    fn unclaim(&mut self, stream: &RtspStream) {
        match stream.mode {
            TransportMode::Interleaved => {
                for ch in [stream.rtp, stream.rtcp] {
                    if let Ok(ch) = u8::try_from(ch) {
                        self.channels.remove(&ch);
                    }
                }
            }
            TransportMode::Udp => {
                for port in [stream.rtp, stream.rtcp] {
                    self.udp_ports.remove(&(stream.peer, port));
                }
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<RtspSession> {
        let session = self.sessions.remove(id)?;
        for stream in &session.streams {
            self.unclaim(stream);
        }
        Some(session)
    }
}

/// Thread-safe registry of active sessions.
///
/// Owns the [`MediaBackend`]: every pipeline it allocates is released when
/// its session goes away, whichever way that happens.
#[derive(Clone)]
pub struct SessionManager {
    index: Arc<RwLock<Index>>,
    backend: Arc<dyn MediaBackend>,
    timeout: Duration,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionManager {
    pub fn new(backend: Arc<dyn MediaBackend>, timeout_secs: u64) -> Self {
        SessionManager {
            index: Arc::new(RwLock::new(Index::default())),
            backend,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn len(&self) -> usize {
        self.index.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.read().sessions.contains_key(id)
    }

    /// Run `f` on a session, if it exists.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&RtspSession) -> R) -> Option<R> {
        self.index.read().sessions.get(id).map(f)
    }

    /// Add a stream to session `id`, or to a new session when `id` is
    /// absent or unknown.
    pub fn setup(
        &self,
        id: Option<&str>,
        kind: StreamKind,
        transport: &TransportHeader,
        peer: IpAddr,
    ) -> Result<Setup> {
        let mut index = self.index.write();
        let (rtp, rtcp) = index.allocate_pair(transport, peer)?;
        let handle = self.backend.allocate(kind)?;
        let stream = RtspStream {
            kind,
            mode: transport.mode,
            rtp,
            rtcp,
            peer,
            handle,
            running: false,
        };

        let existing = id.filter(|id| index.sessions.contains_key(*id));
        let session_id = match existing {
            Some(id) => id.to_string(),
            None => {
                let mut new_id = random_token(SESSION_ID_LEN);
                while index.sessions.contains_key(&new_id) {
                    new_id = random_token(SESSION_ID_LEN);
                }
                index.sessions.insert(
                    new_id.clone(),
                    RtspSession {
                        id: new_id.clone(),
                        timeout_secs: self.timeout.as_secs(),
                        state: SessionState::Ready,
                        streams: Vec::new(),
                        deadline: Instant::now() + self.timeout,
                    },
                );
                tracing::info!(session_id = %new_id, %peer, "session created");
                new_id
            }
        };

        index.claim(&session_id, &stream);
        let Some(session) = index.sessions.get_mut(&session_id) else {
            return Err(OnvifError::SessionNotFound(session_id));
        };
        session.deadline = Instant::now() + self.timeout;
        session.streams.push(stream);

        tracing::debug!(
            session_id,
            ?kind,
            mode = ?transport.mode,
            rtp,
            rtcp,
            %handle,
            "stream set up"
        );

        Ok(Setup {
            session_id,
            timeout_secs: self.timeout.as_secs(),
            mode: transport.mode,
            rtp,
            rtcp,
        })
    }

    /// Start every stream. Interleaved streams write through `sink`.
    pub fn play(&self, id: &str, sink: &Arc<dyn InterleavedSink>) -> Result<()> {
        let mut index = self.index.write();
        let session = index
            .sessions
            .get_mut(id)
            .ok_or_else(|| OnvifError::SessionNotFound(id.to_string()))?;

        for stream in session.streams.iter_mut().filter(|s| !s.running) {
            let Some(target) = stream.target(sink) else {
                tracing::warn!(session_id = %id, rtp = stream.rtp, "channel out of range");
                continue;
            };
            self.backend.start(stream.handle, &target)?;
            stream.running = true;
        }
        session.state = SessionState::Playing;
        tracing::info!(session_id = %id, streams = session.streams.len(), "session playing");
        Ok(())
    }

    /// Stop every stream, keeping the session.
    pub fn pause(&self, id: &str) -> Result<()> {
        let mut index = self.index.write();
        let session = index
            .sessions
            .get_mut(id)
            .ok_or_else(|| OnvifError::SessionNotFound(id.to_string()))?;

        for stream in session.streams.iter_mut().filter(|s| s.running) {
            self.backend.stop(stream.handle);
            stream.running = false;
        }
        session.state = SessionState::Paused;
        tracing::info!(session_id = %id, "session paused");
        Ok(())
    }

    /// Destroy a session and release its pipelines.
    pub fn teardown(&self, id: &str) -> Result<()> {
        let session = self
            .index
            .write()
            .remove(id)
            .ok_or_else(|| OnvifError::SessionNotFound(id.to_string()))?;
        self.release(&session);
        tracing::info!(session_id = %id, "session terminated");
        Ok(())
    }

    /// Remove multiple sessions at once (used during TCP disconnect cleanup).
    pub fn remove_sessions(&self, ids: &[String]) -> usize {
        let removed: Vec<RtspSession> = {
            let mut index = self.index.write();
            ids.iter().filter_map(|id| index.remove(id)).collect()
        };
        for session in &removed {
            self.release(session);
        }
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), remaining = self.len(), "batch session cleanup");
        }
        removed.len()
    }

    /// Push the session's deadline out. `false` if it does not exist.
    pub fn touch(&self, id: &str) -> bool {
        match self.index.write().sessions.get_mut(id) {
            Some(session) => {
                session.deadline = Instant::now() + self.timeout;
                tracing::trace!(session_id = %id, "session renewed");
                true
            }
            None => false,
        }
    }

    /// Destroy every session whose deadline is at or before `now`.
    pub fn expire(&self, now: Instant) -> usize {
        let expired: Vec<RtspSession> = {
            let mut index = self.index.write();
            let ids: Vec<String> = index
                .sessions
                .values()
                .filter(|s| s.deadline <= now)
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| index.remove(id)).collect()
        };
        for session in &expired {
            self.release(session);
            tracing::info!(session_id = %session.id, "session expired");
        }
        expired.len()
    }

    /// Route an interleaved frame by channel. RTP on a backchannel goes to
    /// the pipeline; RTCP is accepted and dropped.
    pub fn deliver(&self, channel: u8, payload: &[u8]) -> Result<()> {
        let index = self.index.read();
        let route = index
            .channels
            .get(&channel)
            .ok_or_else(|| OnvifError::SessionNotFound(format!("channel {channel}")))?;

        tracing::trace!(channel, session_id = %route.session, rtp = route.is_rtp, len = payload.len(), "interleaved frame");
        if route.is_rtp && route.kind == StreamKind::AudioBackchannel {
            self.backend.receive(route.handle, payload);
        }
        Ok(())
    }

    fn release(&self, session: &RtspSession) {
        for stream in &session.streams {
            if stream.running {
                self.backend.stop(stream.handle);
            }
            self.backend.release(stream.handle);
        }
    }
}

/// The session ID of a `Session` header, without `;timeout=`.
pub fn session_id(header: &str) -> &str {
    header.split(';').next().unwrap_or(header).trim()
}
