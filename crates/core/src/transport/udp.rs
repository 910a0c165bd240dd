use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::discovery::MULTICAST_ADDR;
use crate::error::Result;
use crate::service::{Context, Reply, dispatch_discovery};
use crate::soap::{Message, decode, encode};

const MAX_DATAGRAM: usize = 64 * 1024;
const POLL: Duration = Duration::from_millis(50);

/// UDP transport for WS-Discovery (SOAP over UDP).
///
/// One socket serves both directions: it joins `239.255.255.250` to hear
/// Probe and Resolve, answers unicast to the sender, and multicasts Hello
/// and Bye to [`MULTICAST_ADDR`].
///
/// This layer only moves datagrams. Deciding whether to answer belongs to
/// [`dispatch_discovery`].
pub struct DiscoverySocket {
    socket: Arc<UdpSocket>,
}

impl DiscoverySocket {
    /// Bind `addr:port` with address reuse and join the discovery group.
    /// Failing to join is logged, not fatal: unicast probes still work.
    pub fn bind(addr: IpAddr, port: u16) -> Result<Self> {
        let local = SocketAddr::new(addr, port);
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&local.into())?;
        let socket: UdpSocket = socket.into();

        let interface = match addr {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };
        if let Err(e) = socket.join_multicast_v4(MULTICAST_ADDR.ip(), &interface) {
            tracing::warn!(error = %e, group = %MULTICAST_ADDR, "could not join discovery group");
        }
        socket.set_read_timeout(Some(POLL))?;

        tracing::info!(%local, "WS-Discovery listening");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Multicast an announcement to [`MULTICAST_ADDR`].
    pub fn announce(&self, msg: &Message) -> Result<()> {
        let bytes = encode(msg)?;
        self.socket.send_to(&bytes, SocketAddr::from(MULTICAST_ADDR))?;
        Ok(())
    }

    /// Receive and answer datagrams until `running` is cleared.
    pub fn serve(&self, ctx: &Context, running: &AtomicBool) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        while running.load(Ordering::SeqCst) {
            let (len, src) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(ref e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        tracing::warn!(error = %e, "discovery receive error");
                    }
                    continue;
                }
            };

            tracing::trace!(%src, len, "discovery datagram");
            let Some(reply) = answer(ctx, &buf[..len]) else {
                continue;
            };
            if let Err(e) = self.socket.send_to(&reply, src) {
                tracing::warn!(%src, error = %e, "discovery reply failed");
            }
        }
        tracing::debug!("discovery loop exited");
    }
}

impl Clone for DiscoverySocket {
    fn clone(&self) -> Self {
        Self {
            socket: self.socket.clone(),
        }
    }
}

/// Encoded reply for one datagram. Only Probe and Resolve can be answered;
/// ONVIF service requests, malformed input and faults get silence.
pub fn answer(ctx: &Context, datagram: &[u8]) -> Option<Vec<u8>> {
    let msg = match decode(datagram) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "dropping undecodable datagram");
            return None;
        }
    };
    match dispatch_discovery(ctx, &msg) {
        Ok(Reply::Message(resp)) => match encode(&resp) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "discovery reply did not encode");
                None
            }
        },
        Ok(Reply::Fault(_)) => {
            tracing::debug!("fault over UDP suppressed");
            None
        }
        Ok(Reply::None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "discovery dispatch failed");
            None
        }
    }
}
