//! WS-Discovery presence: Hello/Bye announcements and Probe/Resolve
//! matches.
//!
//! Announcements are multicast to [`MULTICAST_ADDR`]; matches are sent back
//! to the prober. When the device is not discoverable nothing is sent at
//! all.

pub mod scopes;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub use scopes::{MAX_DYN_SCOPES, ScopeError, ScopeKind, ScopeStore};

use crate::config::Config;
use crate::error::{OnvifError, Result};
use crate::service::paths;
use crate::soap::Message;
use crate::soap::model::ElementId;
use crate::soap::names::{DEVICE, DISCOVERY, DISCOVERY_ADDRESSING, ENVELOPE, NETWORK, SCHEMA};

/// `239.255.255.250:3702`
pub const MULTICAST_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

const ACTION_URL: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01";
const TO_DISCOVERY: &str = "urn:docs-oasis-org:ws-dd:ns:discovery:2009:01";
const ROLE_ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";
const TYPE_NVT: &str = "NetworkVideoTransmitter";
const TYPE_DEVICE: &str = "Device";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announcement {
    Hello,
    Bye,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Probe,
    Resolve,
}

/// Discovery state shared by the UDP listener and the scope handlers.
#[derive(Debug)]
pub struct Discovery {
    device_uuid: String,
    xaddr: String,
    instance_id: u32,
    metadata_version: u32,
    message_number: AtomicU32,
    discoverable: AtomicBool,
}

impl Discovery {
    /// The instance id is the startup time in seconds; the metadata version
    /// starts at the same value.
    pub fn new(config: &Config, device_uuid: impl Into<String>) -> Self {
        let instance_id = chrono::Utc::now().timestamp() as u32;
        Discovery {
            device_uuid: device_uuid.into(),
            xaddr: config.xaddr(paths::DEVICE),
            instance_id,
            metadata_version: instance_id,
            message_number: AtomicU32::new(0),
            discoverable: AtomicBool::new(config.discoverable),
        }
    }

    pub fn device_uuid(&self) -> &str {
        &self.device_uuid
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn is_discoverable(&self) -> bool {
        self.discoverable.load(Ordering::Relaxed)
    }

    pub fn set_discoverable(&self, on: bool) {
        self.discoverable.store(on, Ordering::Relaxed);
        tracing::info!(discoverable = on, "discovery mode changed");
    }

    /// Multicast `Hello`, or `None` when not discoverable.
    pub fn hello(&self, scopes: &ScopeStore) -> Result<Option<Message>> {
        self.announcement(Announcement::Hello, scopes)
    }

    /// Multicast `Bye`, or `None` when not discoverable.
    pub fn bye(&self, scopes: &ScopeStore) -> Result<Option<Message>> {
        self.announcement(Announcement::Bye, scopes)
    }

    /// Answer a `Probe`. `None` means stay silent: not discoverable, a
    /// `Types` filter naming another device type, or a `Scopes` filter no
    /// scope satisfies.
    pub fn probe_matches(&self, req: &Message, scopes: &ScopeStore) -> Result<Option<Message>> {
        if !self.is_discoverable() {
            return Ok(None);
        }
        let probe = req.body().and_then(|b| req.find_child(b, None, "Probe"));
        if let Some(probe) = probe {
            if let Some(types) = req.child_value(probe, "Types") {
                if !types_match(types) {
                    tracing::debug!(types, "probe for other device type");
                    return Ok(None);
                }
            }
            if !scopes.matches(req.child_value(probe, "Scopes")) {
                tracing::debug!("probe scope filter did not match");
                return Ok(None);
            }
        }
        self.matches(Match::Probe, req, scopes)
    }

    /// Answer a `Resolve`, or `None` when not discoverable.
    pub fn resolve_matches(&self, req: &Message, scopes: &ScopeStore) -> Result<Option<Message>> {
        if !self.is_discoverable() {
            return Ok(None);
        }
        self.matches(Match::Resolve, req, scopes)
    }

    fn announcement(&self, kind: Announcement, scopes: &ScopeStore) -> Result<Option<Message>> {
        if !self.is_discoverable() {
            return Ok(None);
        }
        let (action, body_key) = match kind {
            Announcement::Hello => ("Hello", "Hello"),
            Announcement::Bye => ("Bye", "Bye"),
        };

        let mut msg = Message::new();
        for ns in [DEVICE, NETWORK, DISCOVERY_ADDRESSING, DISCOVERY] {
            msg.add_ns_param(ns);
        }
        let env = msg.envelope();
        let header = msg.add_child(env, ENVELOPE.prefix, "Header")?;
        let body = msg.add_child(env, ENVELOPE.prefix, "Body")?;

        let wsa = DISCOVERY_ADDRESSING.prefix;
        msg.add_leaf(header, wsa, "Action", format_args!("{ACTION_URL}/{action}"))?;
        msg.add_leaf(header, wsa, "MessageID", format_args!("uuid:{}", uuid::Uuid::new_v4()))?;
        msg.add_leaf(header, wsa, "To", TO_DISCOVERY)?;
        self.app_sequence(&mut msg, header)?;

        let node = msg.add_child(body, DISCOVERY.prefix, body_key)?;
        self.endpoint(&mut msg, node, scopes)?;
        Ok(Some(msg))
    }

    fn matches(&self, kind: Match, req: &Message, scopes: &ScopeStore) -> Result<Option<Message>> {
        let header = req.header();
        let Some(message_id) = header.and_then(|h| req.child_value(h, "MessageID")) else {
            tracing::warn!(?kind, "discovery request without MessageID");
            return Ok(None);
        };
        let reply_to = header
            .and_then(|h| req.find_path(h, &["ReplyTo", "Address"]))
            .and_then(|a| req.value(a));

        let (action, outer, inner) = match kind {
            Match::Probe => ("ProbeMatches", "ProbeMatches", "ProbeMatch"),
            Match::Resolve => ("ResolveMatches", "ResolveMatches", "ResolveMatch"),
        };

        let mut msg = Message::new();
        for ns in [DEVICE, DISCOVERY_ADDRESSING, DISCOVERY, NETWORK, SCHEMA] {
            msg.add_ns_param(ns);
        }
        let env = msg.envelope();
        let h = msg.add_child(env, ENVELOPE.prefix, "Header")?;
        let body = msg.add_child(env, ENVELOPE.prefix, "Body")?;

        let wsa = DISCOVERY_ADDRESSING.prefix;
        msg.add_leaf(h, wsa, "Action", format_args!("{ACTION_URL}/{action}"))?;
        msg.add_leaf(h, wsa, "MessageID", format_args!("uuid:{}", uuid::Uuid::new_v4()))?;
        msg.add_leaf(h, wsa, "RelatesTo", message_id)?;
        if reply_to.is_none_or(|addr| addr == ROLE_ANONYMOUS) {
            msg.add_leaf(h, wsa, "To", ROLE_ANONYMOUS)?;
        }
        self.app_sequence(&mut msg, h)?;

        let list = msg.add_child(body, DISCOVERY.prefix, outer)?;
        let node = msg.add_child(list, DISCOVERY.prefix, inner)?;
        self.endpoint(&mut msg, node, scopes)?;
        Ok(Some(msg))
    }

    fn app_sequence(&self, msg: &mut Message, header: ElementId) -> Result<()> {
        let seq = msg.add_child(header, DISCOVERY.prefix, "AppSequence")?;
        msg.add_parameter(seq, "InstanceId", self.instance_id);
        msg.add_parameter(
            seq,
            "MessageNumber",
            self.message_number.fetch_add(1, Ordering::Relaxed),
        );
        Ok(())
    }

    /// EndpointReference, Types, Scopes, XAddrs and MetadataVersion.
    fn endpoint(&self, msg: &mut Message, node: ElementId, scopes: &ScopeStore) -> Result<()> {
        let d = DISCOVERY.prefix;
        let epr = msg.add_child(node, DISCOVERY_ADDRESSING.prefix, "EndpointReference")?;
        msg.add_leaf(
            epr,
            DISCOVERY_ADDRESSING.prefix,
            "Address",
            format_args!("urn:uuid:{}", self.device_uuid),
        )?;
        msg.add_leaf(
            node,
            d,
            "Types",
            format_args!("{}:{TYPE_NVT} {}:{TYPE_DEVICE}", NETWORK.prefix, DEVICE.prefix),
        )?;
        let value = scopes.discovery_value();
        if value.is_empty() {
            return Err(OnvifError::MissingElement("Scopes"));
        }
        msg.add_leaf(node, d, "Scopes", value)?;
        msg.add_leaf(node, d, "XAddrs", &self.xaddr)?;
        msg.add_leaf(node, d, "MetadataVersion", self.metadata_version)?;
        Ok(())
    }
}

/// A `Types` filter passes when any of its `prefix:Name` tokens names a
/// network video transmitter or a device.
fn types_match(types: &str) -> bool {
    types
        .split_whitespace()
        .filter_map(|t| t.split_once(':').map(|(_, name)| name))
        .any(|name| name == TYPE_NVT || name == TYPE_DEVICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{decode, encode};

    fn setup(discoverable: bool) -> (tempfile::TempDir, Discovery, ScopeStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::from_toml("local_ip = \"10.0.0.7\"\nhttp_port = 8080\n").unwrap();
        cfg.discoverable = discoverable;
        let scopes = ScopeStore::open(dir.path().join("scopes"), cfg.fixed_scopes()).unwrap();
        let d = Discovery::new(&cfg, "1234-abcd");
        (dir, d, scopes)
    }

    fn probe(types: Option<&str>, scopes: Option<&str>, reply_to: Option<&str>) -> Message {
        let types = types.map(|t| format!("<d:Types>{t}</d:Types>")).unwrap_or_default();
        let scopes = scopes.map(|s| format!("<d:Scopes>{s}</d:Scopes>")).unwrap_or_default();
        let reply = reply_to
            .map(|r| format!("<a:ReplyTo><a:Address>{r}</a:Address></a:ReplyTo>"))
            .unwrap_or_default();
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
<s:Header><a:MessageID>uuid:req-1</a:MessageID>{reply}</s:Header>
<s:Body><d:Probe>{types}{scopes}</d:Probe></s:Body></s:Envelope>"#
        );
        decode(xml.as_bytes()).unwrap()
    }

    fn text(msg: &Message) -> String {
        String::from_utf8(encode(msg).unwrap()).unwrap()
    }

    #[test]
    fn hello_layout() {
        let (_dir, d, scopes) = setup(true);
        let hello = d.hello(&scopes).unwrap().unwrap();
        let t = text(&hello);
        assert!(t.contains("<wsa:Action>http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Hello</wsa:Action>"));
        assert!(t.contains("<wsa:To>urn:docs-oasis-org:ws-dd:ns:discovery:2009:01</wsa:To>"));
        assert!(t.contains("<wsa:Address>urn:uuid:1234-abcd</wsa:Address>"));
        assert!(t.contains("<d:Types>dn:NetworkVideoTransmitter tds:Device</d:Types>"));
        assert!(t.contains("<d:XAddrs>http://10.0.0.7:8080/onvif/device_service</d:XAddrs>"));
        assert!(t.contains(&format!(r#"InstanceId="{}" MessageNumber="0""#, d.instance_id())));

        let bye = d.bye(&scopes).unwrap().unwrap();
        assert!(text(&bye).contains(r#"MessageNumber="1""#));
        assert!(bye.find_path(bye.envelope(), &["Body", "Bye", "Scopes"]).is_some());
    }

    #[test]
    fn probe_match_relates_to_request() {
        let (_dir, d, scopes) = setup(true);
        let resp = d.probe_matches(&probe(None, None, None), &scopes).unwrap().unwrap();
        let h = resp.header().unwrap();
        assert_eq!(resp.child_value(h, "RelatesTo"), Some("uuid:req-1"));
        assert_eq!(resp.child_value(h, "To"), Some(ROLE_ANONYMOUS));
        let m = resp
            .find_path(resp.envelope(), &["Body", "ProbeMatches", "ProbeMatch"])
            .unwrap();
        assert_eq!(resp.child_value(m, "MetadataVersion"), Some(d.instance_id().to_string().as_str()));
    }

    #[test]
    fn reply_to_other_address_omits_to() {
        let (_dir, d, scopes) = setup(true);
        let resp = d
            .probe_matches(&probe(None, None, Some("http://client/endpoint")), &scopes)
            .unwrap()
            .unwrap();
        assert!(resp.find_child(resp.header().unwrap(), None, "To").is_none());
    }

    #[test]
    fn probe_filters() {
        let (_dir, d, scopes) = setup(true);
        let ok = |m: Message| d.probe_matches(&m, &scopes).unwrap().is_some();
        assert!(ok(probe(Some("dn:NetworkVideoTransmitter"), None, None)));
        assert!(ok(probe(Some("tds:Device"), None, None)));
        assert!(!ok(probe(Some("dp0:Printer"), None, None)));
        assert!(ok(probe(None, Some("onvif://www.onvif.org/Profile/Streaming"), None)));
        assert!(!ok(probe(None, Some("onvif://www.onvif.org/location/mars"), None)));
    }

    #[test]
    fn silent_when_not_discoverable() {
        let (_dir, d, scopes) = setup(false);
        assert!(d.hello(&scopes).unwrap().is_none());
        assert!(d.probe_matches(&probe(None, None, None), &scopes).unwrap().is_none());
        assert!(d.resolve_matches(&probe(None, None, None), &scopes).unwrap().is_none());

        d.set_discoverable(true);
        assert!(d.resolve_matches(&probe(None, None, None), &scopes).unwrap().is_some());
    }

    #[test]
    fn missing_message_id_is_silent() {
        let (_dir, d, scopes) = setup(true);
        let req = decode(
            br#"<s:Envelope xmlns:s="urn:s" xmlns:d="urn:d"><s:Body><d:Resolve/></s:Body></s:Envelope>"#,
        )
        .unwrap();
        assert!(d.resolve_matches(&req, &scopes).unwrap().is_none());
    }
}
