//! Media pipelines behind the RTSP control plane.
//!
//! The session state machine never touches audio or video data itself. It
//! drives a [`MediaBackend`] through the stream lifecycle:
//!
//! ```text
//! SETUP     -> allocate(kind)
//! PLAY      -> start(handle, target)
//! PAUSE     -> stop(handle)
//! TEARDOWN  -> stop(handle), release(handle)
//! $-frame   -> receive(handle, rtp)      (backchannel only)
//! ```
//!
//! Streams carry fixed formats: video is JPEG (payload type 26, 90 kHz),
//! audio and the backchannel are PCMU (payload type 0, 8 kHz).
//!
//! [`LoggingBackend`] is the default: it tracks handles and logs every call.

pub mod rtp;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::Result;

/// Which track a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// `trackID=0`, JPEG from the device.
    Video,
    /// `trackID=1`, PCMU from the device.
    Audio,
    /// `backchannel`, PCMU from the client.
    AudioBackchannel,
}

impl StreamKind {
    /// Resolve the track from a SETUP request URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        if uri.contains("trackID=1") {
            Some(StreamKind::Audio)
        } else if uri.contains("trackID=0") {
            Some(StreamKind::Video)
        } else if uri.contains("backchannel") {
            Some(StreamKind::AudioBackchannel)
        } else {
            None
        }
    }

    /// `a=control` attribute of the track.
    pub fn control(&self) -> &'static str {
        match self {
            StreamKind::Video => "trackID=0",
            StreamKind::Audio => "trackID=1",
            StreamKind::AudioBackchannel => "backchannel",
        }
    }

    pub fn payload_type(&self) -> u8 {
        match self {
            StreamKind::Video => 26,
            StreamKind::Audio | StreamKind::AudioBackchannel => 0,
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            StreamKind::Video => "JPEG",
            StreamKind::Audio | StreamKind::AudioBackchannel => "PCMU",
        }
    }

    pub fn clock_rate(&self) -> u32 {
        match self {
            StreamKind::Video => 90_000,
            StreamKind::Audio | StreamKind::AudioBackchannel => 8_000,
        }
    }
}

/// Opaque pipeline handle returned by [`MediaBackend::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub u64);

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Writes `$`-framed packets onto an RTSP control connection.
pub trait InterleavedSink: Send + Sync {
    fn send_frame(&self, channel: u8, payload: &[u8]) -> io::Result<()>;
}

/// Where a started stream sends (or expects) RTP.
#[derive(Clone)]
pub enum Target {
    /// Plain UDP to the client's `client_port` pair.
    Udp { rtp: SocketAddr, rtcp: SocketAddr },
    /// Interleaved on the control connection.
    Interleaved {
        rtp_channel: u8,
        rtcp_channel: u8,
        sink: Arc<dyn InterleavedSink>,
    },
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Udp { rtp, rtcp } => f
                .debug_struct("Udp")
                .field("rtp", rtp)
                .field("rtcp", rtcp)
                .finish(),
            Target::Interleaved {
                rtp_channel,
                rtcp_channel,
                ..
            } => f
                .debug_struct("Interleaved")
                .field("rtp_channel", rtp_channel)
                .field("rtcp_channel", rtcp_channel)
                .finish(),
        }
    }
}

/// Audio and video pipelines driven by RTSP stream state.
///
/// Calls arrive while the session index is locked; implementations must
/// not call back into the [`SessionManager`](crate::session::SessionManager).
pub trait MediaBackend: Send + Sync {
    /// Prepare a pipeline for `kind` without moving any data yet.
    fn allocate(&self, kind: StreamKind) -> Result<MediaHandle>;

    /// Begin sending (or accepting, for the backchannel) on `target`.
    fn start(&self, handle: MediaHandle, target: &Target) -> Result<()>;

    /// Stop the data path. The handle stays valid for a later `start`.
    fn stop(&self, handle: MediaHandle);

    /// Free the pipeline. The handle is never used again.
    fn release(&self, handle: MediaHandle);

    /// An RTP packet arrived on a backchannel's interleaved channel.
    fn receive(&self, handle: MediaHandle, rtp: &[u8]);
}

#[derive(Debug)]
struct Pipeline {
    kind: StreamKind,
    running: bool,
    received: u64,
}

/// Backend that moves no media. Useful headless and in tests.
#[derive(Debug, Default)]
pub struct LoggingBackend {
    next: AtomicU64,
    pipelines: Mutex<HashMap<MediaHandle, Pipeline>>,
}

impl LoggingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles allocated and not yet released.
    pub fn allocated(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// Handles currently started.
    pub fn running(&self) -> usize {
        self.pipelines.lock().values().filter(|p| p.running).count()
    }

    /// RTP packets received on `handle`, if it is still allocated.
    pub fn received(&self, handle: MediaHandle) -> Option<u64> {
        self.pipelines.lock().get(&handle).map(|p| p.received)
    }
}

impl MediaBackend for LoggingBackend {
    fn allocate(&self, kind: StreamKind) -> Result<MediaHandle> {
        let handle = MediaHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.pipelines.lock().insert(
            handle,
            Pipeline {
                kind,
                running: false,
                received: 0,
            },
        );
        tracing::debug!(%handle, ?kind, encoding = kind.encoding(), "pipeline allocated");
        Ok(handle)
    }

    fn start(&self, handle: MediaHandle, target: &Target) -> Result<()> {
        if let Some(p) = self.pipelines.lock().get_mut(&handle) {
            p.running = true;
            tracing::info!(%handle, kind = ?p.kind, ?target, "pipeline started");
        }
        Ok(())
    }

    fn stop(&self, handle: MediaHandle) {
        if let Some(p) = self.pipelines.lock().get_mut(&handle) {
            if p.running {
                tracing::info!(%handle, kind = ?p.kind, "pipeline stopped");
            }
            p.running = false;
        }
    }

    fn release(&self, handle: MediaHandle) {
        if let Some(p) = self.pipelines.lock().remove(&handle) {
            tracing::debug!(%handle, kind = ?p.kind, received = p.received, "pipeline released");
        }
    }

    fn receive(&self, handle: MediaHandle, rtp: &[u8]) {
        let Some(packet) = rtp::RtpPacket::parse(rtp) else {
            tracing::warn!(%handle, len = rtp.len(), "dropping malformed backchannel RTP");
            return;
        };
        if let Some(p) = self.pipelines.lock().get_mut(&handle) {
            p.received += 1;
            tracing::trace!(
                %handle,
                seq = packet.sequence,
                pt = packet.payload_type,
                len = packet.payload.len(),
                "backchannel RTP"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_resolve_from_uri() {
        assert_eq!(
            StreamKind::from_uri("rtsp://10.0.0.5:554/stream/trackID=0"),
            Some(StreamKind::Video)
        );
        assert_eq!(
            StreamKind::from_uri("rtsp://10.0.0.5/stream/trackID=1"),
            Some(StreamKind::Audio)
        );
        assert_eq!(
            StreamKind::from_uri("rtsp://10.0.0.5/stream/backchannel"),
            Some(StreamKind::AudioBackchannel)
        );
        assert_eq!(StreamKind::from_uri("rtsp://10.0.0.5/stream"), None);
    }

    #[test]
    fn logging_backend_lifecycle() {
        let backend = LoggingBackend::new();
        let a = backend.allocate(StreamKind::Audio).unwrap();
        let b = backend.allocate(StreamKind::AudioBackchannel).unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.allocated(), 2);

        let target = Target::Udp {
            rtp: "10.0.0.9:5000".parse().unwrap(),
            rtcp: "10.0.0.9:5001".parse().unwrap(),
        };
        backend.start(a, &target).unwrap();
        assert_eq!(backend.running(), 1);
        backend.stop(a);
        assert_eq!(backend.running(), 0);

        backend.release(a);
        backend.release(b);
        assert_eq!(backend.allocated(), 0);
    }

    #[test]
    fn backchannel_counts_valid_rtp_only() {
        let backend = LoggingBackend::new();
        let h = backend.allocate(StreamKind::AudioBackchannel).unwrap();
        let mut packet = vec![0x80, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1];
        packet.extend_from_slice(&[0xff; 160]);
        backend.receive(h, &packet);
        backend.receive(h, &[0x80, 0x00]);
        assert_eq!(backend.received(h), Some(1));
    }
}
