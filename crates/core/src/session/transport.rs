/// How a stream's RTP travels (RFC 2326 §10.12, §12.39).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// `RTP/AVP;unicast;client_port=a-b`
    Udp,
    /// `RTP/AVP/TCP;unicast;interleaved=a-b`
    Interleaved,
}

/// Client-side transport request from the RTSP `Transport` header.
///
/// ## Wire format examples
///
/// ```text
/// Transport: RTP/AVP;unicast;client_port=8000-8001
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// ```
///
/// `rtp`/`rtcp` are client ports for [`TransportMode::Udp`] and channel
/// ids for [`TransportMode::Interleaved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub mode: TransportMode,
    pub rtp: u16,
    pub rtcp: u16,
}

impl TransportHeader {
    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// The header may list alternatives separated by commas; the first
    /// one carrying `interleaved=` or `client_port=` wins, interleaved
    /// preferred within one alternative. A single port implies
    /// `rtcp = rtp + 1`.
    ///
    /// ## Examples
    ///
    /// ```
    /// use onvif::session::transport::{TransportHeader, TransportMode};
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(th.mode, TransportMode::Udp);
    /// assert_eq!((th.rtp, th.rtcp), (8000, 8001));
    ///
    /// let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert_eq!(th.mode, TransportMode::Interleaved);
    /// assert_eq!((th.rtp, th.rtcp), (2, 3));
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        header.split(',').find_map(Self::parse_one)
    }

    fn parse_one(spec: &str) -> Option<Self> {
        let params = || spec.split(';').map(str::trim);

        if let Some(ports) = params().find_map(|p| p.strip_prefix("interleaved=")) {
            return Self::ports(TransportMode::Interleaved, ports);
        }
        if let Some(ports) = params().find_map(|p| p.strip_prefix("client_port=")) {
            return Self::ports(TransportMode::Udp, ports);
        }
        None
    }

    fn ports(mode: TransportMode, ports: &str) -> Option<Self> {
        let (rtp, rtcp) = match ports.split_once('-') {
            Some((a, b)) => {
                let rtp: u16 = a.trim().parse().ok()?;
                (rtp, b.trim().parse().ok()?)
            }
            None => {
                let rtp: u16 = ports.trim().parse().ok()?;
                (rtp, rtp.checked_add(1)?)
            }
        };
        Some(TransportHeader { mode, rtp, rtcp })
    }

    /// Value of the `Transport` reply header for the negotiated pair.
    pub fn reply(mode: TransportMode, rtp: u16, rtcp: u16) -> String {
        match mode {
            TransportMode::Udp => format!("RTP/AVP;unicast;client_port={rtp}-{rtcp}"),
            TransportMode::Interleaved => format!("RTP/AVP/TCP;unicast;interleaved={rtp}-{rtcp}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_transport() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(th.mode, TransportMode::Udp);
        assert_eq!(th.rtp, 5000);
        assert_eq!(th.rtcp, 5001);
    }

    #[test]
    fn parse_no_client_port() {
        assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
        assert!(TransportHeader::parse("RTP/AVP;unicast;client_port=x-1").is_none());
    }

    #[test]
    fn single_channel_implies_pair() {
        let th = TransportHeader::parse("RTP/AVP/TCP;interleaved=4").unwrap();
        assert_eq!((th.rtp, th.rtcp), (4, 5));
    }

    #[test]
    fn first_usable_alternative_wins() {
        let th = TransportHeader::parse(
            "RTP/AVP;multicast, RTP/AVP/TCP;unicast;interleaved=0-1, RTP/AVP;unicast;client_port=6000-6001",
        )
        .unwrap();
        assert_eq!(th.mode, TransportMode::Interleaved);
    }

    #[test]
    fn reply_formats() {
        assert_eq!(
            TransportHeader::reply(TransportMode::Interleaved, 2, 3),
            "RTP/AVP/TCP;unicast;interleaved=2-3"
        );
        assert_eq!(
            TransportHeader::reply(TransportMode::Udp, 7000, 7001),
            "RTP/AVP;unicast;client_port=7000-7001"
        );
    }
}
