//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the SDP body returned by DESCRIBE responses. The format:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- <sess-id> <sess-ver> IN IP4 <addr>       ← origin
//! s=-                                          ← session name
//! c=IN IP4 <addr>                              ← connection address
//! t=0 0                                        ← timing (live stream)
//! m=video 0 RTP/AVP 26                         ← only with fake video on
//! a=recvonly
//! a=control:trackID=0
//! a=rtpmap:26 JPEG/90000
//! m=audio 0 RTP/AVP 0                          ← device audio
//! a=recvonly
//! a=control:trackID=1
//! a=rtpmap:0 PCMU/8000
//! m=audio 0 RTP/AVP 0                          ← ONVIF backchannel
//! a=sendonly
//! a=control:backchannel
//! a=rtpmap:0 PCMU/8000
//! ```
//!
//! Directions follow the ONVIF streaming convention: the backchannel is
//! `sendonly`, the device's own tracks `recvonly`.

use std::net::IpAddr;

use crate::media::StreamKind;

/// Generate the session description.
///
/// `session_id` and `session_version` fill the origin line (RFC 4566 §5.2).
pub fn generate_sdp(ip: IpAddr, session_id: u64, session_version: u64, fake_video: bool) -> String {
    let family = match ip {
        IpAddr::V4(_) => "IP4",
        IpAddr::V6(_) => "IP6",
    };

    let mut sdp: Vec<String> = vec![
        "v=0".to_string(),
        format!("o=- {session_id} {session_version} IN {family} {ip}"),
        "s=-".to_string(),
        format!("c=IN {family} {ip}"),
        "t=0 0".to_string(),
    ];

    let mut tracks = vec![StreamKind::Audio, StreamKind::AudioBackchannel];
    if fake_video {
        tracks.insert(0, StreamKind::Video);
    }
    for kind in tracks {
        media_section(&mut sdp, kind);
    }

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

fn media_section(sdp: &mut Vec<String>, kind: StreamKind) {
    let (media, direction) = match kind {
        StreamKind::Video => ("video", "recvonly"),
        StreamKind::Audio => ("audio", "recvonly"),
        StreamKind::AudioBackchannel => ("audio", "sendonly"),
    };
    let pt = kind.payload_type();
    sdp.push(format!("m={media} 0 RTP/AVP {pt}"));
    sdp.push(format!("a={direction}"));
    sdp.push(format!("a=control:{}", kind.control()));
    sdp.push(format!("a=rtpmap:{pt} {}/{}", kind.encoding(), kind.clock_rate()));
}

/// Does an ANNOUNCE body offer a receive-side audio stream?
///
/// The first `m=` line must be `audio` with port 0 over `RTP/AVP`.
pub fn announces_backchannel(sdp: &str) -> bool {
    let Some(media) = sdp.lines().find_map(|l| l.trim().strip_prefix("m=")) else {
        return false;
    };
    let mut fields = media.split_whitespace();
    fields.next() == Some("audio")
        && fields.next() == Some("0")
        && fields.next().is_some_and(|proto| proto.starts_with("RTP/AVP"))
}
