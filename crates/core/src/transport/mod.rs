//! Network listeners.
//!
//! - **TCP** ([`tcp`]): RTSP signaling, one thread per connection, with
//!   interleaved RTP (RFC 2326 §10.12) demultiplexed by [`interleaved`].
//! - **HTTP** ([`http`]): SOAP requests for the device, media, deviceIO
//!   and PTZ services, on the same accept loop as RTSP.
//! - **UDP** ([`udp`]): WS-Discovery on the multicast group, plus the
//!   Hello/Bye announcements.

pub mod http;
pub mod interleaved;
pub mod tcp;
pub mod udp;

pub use udp::DiscoverySocket;
