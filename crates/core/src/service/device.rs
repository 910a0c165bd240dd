//! Device management service: device information, capabilities, network
//! facts, users and reboot.

use std::fmt::Display;

use chrono::{Datelike, Timelike};

use crate::auth::users::{MAX_PASSWORD_LEN, MAX_USER_LEN};
use crate::service::{Context, HandlerResult, ServerEvent, paths, respond};
use crate::soap::fault::reason;
use crate::soap::model::ElementId;
use crate::soap::names::{ADDRESSING, DEVICE, DEVICE_IO, ENVELOPE, EVENTS, MEDIA, Ns, PTZ, SCHEMA};
use crate::soap::{Fault, FaultCode, FaultSubcode, Message};

const WSDL_URL: &str = "http://www.onvif.org/Documents/Specifications.aspx";
const EVENTS_CAPABILITIES_ACTION: &str =
    "http://www.onvif.org/ver10/events/wsdl/EventPortType/GetServiceCapabilities";
const REBOOT_MESSAGE: &str = "System Reboots in 3 s\n";

const MAX_USERS: u32 = 5;
const MAX_PROFILES: u32 = 10;
const VERSION: (u32, u32) = (2, 2);

/// The services advertised by GetServices and GetCapabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Service {
    Device,
    Media,
    Events,
    Ptz,
    DeviceIo,
}

impl Service {
    const ALL: [Service; 5] = [
        Service::Device,
        Service::Media,
        Service::Events,
        Service::Ptz,
        Service::DeviceIo,
    ];

    fn ns(self) -> Ns {
        match self {
            Service::Device => DEVICE,
            Service::Media => MEDIA,
            Service::Events => EVENTS,
            Service::Ptz => PTZ,
            Service::DeviceIo => DEVICE_IO,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Service::Device => paths::DEVICE,
            Service::Media => paths::MEDIA,
            Service::Events => paths::EVENTS,
            Service::Ptz => paths::PTZ,
            Service::DeviceIo => paths::DEVICE_IO,
        }
    }

    fn from_uri(uri: &str) -> Option<Self> {
        Service::ALL.into_iter().find(|s| s.ns().uri == uri)
    }
}

/// Namespaces of the service listing responses.
const SERVICE_NAMESPACES: [Ns; 7] = [DEVICE, MEDIA, EVENTS, DEVICE_IO, PTZ, ADDRESSING, SCHEMA];

fn attrs(msg: &mut Message, id: ElementId, pairs: &[(&str, &dyn Display)]) {
    for (key, value) in pairs {
        msg.add_parameter(id, key, value);
    }
}

/// Envelope with an empty header followed by the body.
fn with_header(namespaces: &[Ns]) -> crate::error::Result<(Message, ElementId)> {
    let mut msg = Message::new();
    for ns in namespaces {
        msg.add_ns_param(*ns);
    }
    let env = msg.envelope();
    msg.add_child(env, ENVELOPE.prefix, "Header")?;
    let body = msg.add_child(env, ENVELOPE.prefix, "Body")?;
    Ok((msg, body))
}

/// `<svc>:Capabilities` with the service capabilities as attributes.
fn service_capabilities(msg: &mut Message, parent: ElementId, service: Service) -> crate::error::Result<()> {
    let prefix = service.ns().prefix;
    let caps = msg.add_child(parent, prefix, "Capabilities")?;
    match service {
        Service::Device => {
            let network = msg.add_child(caps, prefix, "Network")?;
            attrs(msg, network, &[
                ("IPFilter", &false),
                ("ZeroConfiguration", &false),
                ("IPVersion6", &false),
                ("DynDNS", &false),
                ("Dot11Configuration", &false),
                ("Dot1XConfigurations", &0),
                ("HostnameFromDHCP", &false),
                ("NTP", &0),
                ("DHCPv6", &false),
            ]);
            let security = msg.add_child(caps, prefix, "Security")?;
            attrs(msg, security, &[
                ("TLS1.0", &true),
                ("TLS1.1", &true),
                ("TLS1.2", &true),
                ("OnboardKeyGeneration", &true),
                ("AccessPolicyConfig", &false),
                ("DefaultAccessPolicy", &false),
                ("Dot1X", &false),
                ("RemoteUserHandling", &false),
                ("X.509Token", &false),
                ("SAMLToken", &false),
                ("KerberosToken", &false),
                ("UsernameToken", &true),
                ("HttpDigest", &false),
                ("RELToken", &false),
                ("SupportedEAPMethods", &""),
                ("MaxUsers", &MAX_USERS),
                ("MaxUserNameLength", &MAX_USER_LEN),
                ("MaxPasswordLength", &MAX_PASSWORD_LEN),
            ]);
            let system = msg.add_child(caps, prefix, "System")?;
            attrs(msg, system, &[
                ("DiscoveryResolve", &true),
                ("DiscoveryBye", &true),
                ("RemoteDiscovery", &false),
                ("SystemBackup", &false),
                ("SystemLogging", &false),
                ("FirmwareUpgrade", &false),
                ("HttpFirmwareUpgrade", &false),
                ("HttpSystemBackup", &true),
                ("HttpSystemLogging", &true),
                ("HttpSupportInformation", &false),
                ("StorageConfiguration", &false),
                ("GeoLocationEntries", &0),
                ("AutoGeo", &""),
                ("StorageTypesSupported", &""),
            ]);
            let misc = msg.add_child(caps, prefix, "Misc")?;
            attrs(msg, misc, &[("AuxilaryCommands", &"")]);
        }
        Service::Media => {
            attrs(msg, caps, &[
                ("SnapshotUri", &true),
                ("Rotation", &false),
                ("VideoSourceMode", &false),
                ("OSD", &false),
                ("TemporaryOSDText", &false),
                ("EXICompression", &false),
            ]);
            let profiles = msg.add_child(caps, prefix, "ProfileCapabilities")?;
            attrs(msg, profiles, &[("MaximumNumberOfProfiles", &MAX_PROFILES)]);
            let streaming = msg.add_child(caps, prefix, "StreamingCapabilities")?;
            attrs(msg, streaming, &[
                ("RTPMulticast", &false),
                ("RTP_TCP", &false),
                ("RTP_RTSP_TCP", &true),
                ("NonAggregateControl", &false),
                ("NoRTSPStreaming", &false),
            ]);
        }
        Service::Events => {
            attrs(msg, caps, &[
                ("WSSubscriptionPolicySupport", &true),
                ("WSPullPointSupport", &true),
                ("WSPausableSubscriptionManagerInterfaceSupport", &false),
                ("MaxNotificationProducers", &0),
                ("MaxPullPoints", &0),
                ("PersistentNotificationStorage", &false),
            ]);
        }
        Service::Ptz => {
            attrs(msg, caps, &[
                ("EFlip", &false),
                ("Reverse", &false),
                ("GetCompatibleConfigurations", &false),
                ("MoveStatus", &false),
                ("StatusPosition", &false),
            ]);
        }
        Service::DeviceIo => {
            attrs(msg, caps, &[
                ("VideoSources", &1),
                ("VideoOutputs", &0),
                ("AudioSources", &1),
                ("AudioOutputs", &1),
                ("RelayOutputs", &0),
                ("SerialPorts", &0),
                ("DigitalInputs", &0),
                ("DigitalInputOptions", &false),
            ]);
        }
    }
    Ok(())
}

/// GetServices, with capabilities only when `IncludeCapability` is `true`.
pub fn get_services(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let include = req.child_value(method, "IncludeCapability") == Some("true");
    let (mut msg, body) = with_header(&SERVICE_NAMESPACES)?;
    let resp = msg.add_child(body, DEVICE.prefix, "GetServicesResponse")?;

    for service in Service::ALL {
        let node = msg.add_child(resp, DEVICE.prefix, "Service")?;
        msg.add_leaf(node, DEVICE.prefix, "Namespace", service.ns().uri)?;
        msg.add_leaf(node, DEVICE.prefix, "XAddr", ctx.config.xaddr(service.path()))?;
        if include {
            let caps = msg.add_child(node, DEVICE.prefix, "Capabilities")?;
            service_capabilities(&mut msg, caps, service)?;
        }
        let version = msg.add_child(node, DEVICE.prefix, "Version")?;
        msg.add_leaf(version, SCHEMA.prefix, "Major", VERSION.0)?;
        msg.add_leaf(version, SCHEMA.prefix, "Minor", VERSION.1)?;
    }
    Ok(msg)
}

/// Capabilities of the service whose namespace the request method uses.
pub fn get_service_capabilities(_ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let uri = &req.namespace(req[method].ns()).uri;
    let Some(service) = Service::from_uri(uri) else {
        return Err(Fault::nested(
            FaultCode::Receiver,
            FaultSubcode::ActionNotSupported,
            FaultSubcode::NoSuchService,
            reason::WSDL_NOT_SUPPORTED,
        )
        .into());
    };

    let (mut msg, body) = with_header(&SERVICE_NAMESPACES)?;
    if service == Service::Events {
        if let Some(header) = msg.header() {
            msg.add_leaf(header, ADDRESSING.prefix, "Action", EVENTS_CAPABILITIES_ACTION)?;
        }
    }
    let resp = msg.add_child(body, service.ns().prefix, "GetServiceCapabilitiesResponse")?;
    service_capabilities(&mut msg, resp, service)?;
    Ok(msg)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    All,
    Device,
    Media,
    Events,
    Ptz,
    DeviceIo,
}

impl Category {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "All" => Category::All,
            "Device" => Category::Device,
            "Media" => Category::Media,
            "Events" => Category::Events,
            "PTZ" => Category::Ptz,
            "DeviceIO" => Category::DeviceIo,
            _ => return None,
        })
    }

    fn includes(self, other: Category) -> bool {
        self == Category::All || self == other
    }
}

pub fn get_capabilities(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let category = match req.child_value(method, "Category") {
        None => Category::All,
        Some(v) => Category::parse(v).ok_or_else(|| {
            tracing::debug!(category = v, "capability category not supported");
            Fault::nested(
                FaultCode::Receiver,
                FaultSubcode::ActionNotSupported,
                FaultSubcode::NoSuchService,
                reason::WSDL_NOT_SUPPORTED,
            )
        })?,
    };

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetCapabilitiesResponse")?;
    let caps = msg.add_child(resp, DEVICE.prefix, "Capabilities")?;
    let tt = SCHEMA.prefix;

    if category.includes(Category::Device) {
        let device = msg.add_child(caps, tt, "Device")?;
        msg.add_leaf(device, tt, "XAddr", ctx.config.xaddr(paths::DEVICE))?;

        let network = msg.add_child(device, tt, "Network")?;
        for key in ["IPFilter", "ZeroConfiguration", "IPVersion6", "DynDNS"] {
            msg.add_leaf(network, tt, key, false)?;
        }
        let ext = msg.add_child(network, tt, "Extension")?;
        msg.add_leaf(ext, tt, "Dot11Configuration", false)?;

        let system = msg.add_child(device, tt, "System")?;
        msg.add_leaf(system, tt, "DiscoveryResolve", true)?;
        msg.add_leaf(system, tt, "DiscoveryBye", true)?;
        for key in ["RemoteDiscovery", "SystemBackup", "SystemLogging", "FirmwareUpgrade"] {
            msg.add_leaf(system, tt, key, false)?;
        }
        let versions = msg.add_child(system, tt, "SupportedVersions")?;
        msg.add_leaf(versions, tt, "Major", VERSION.0)?;
        msg.add_leaf(versions, tt, "Minor", VERSION.1)?;
        let ext = msg.add_child(system, tt, "Extension")?;
        msg.add_leaf(ext, tt, "HttpFirmwareUpgrade", false)?;
        msg.add_leaf(ext, tt, "HttpSystemBackup", true)?;
        msg.add_leaf(ext, tt, "HttpSystemLogging", true)?;
        msg.add_leaf(ext, tt, "HttpSupportInformation", false)?;

        let io = msg.add_child(device, tt, "IO")?;
        msg.add_leaf(io, tt, "InputConnectors", 0)?;
        msg.add_leaf(io, tt, "RelayOutputs", 0)?;
        let ext = msg.add_child(io, tt, "Extension")?;
        msg.add_leaf(ext, tt, "Auxiliary", false)?;
        msg.add_leaf(ext, tt, "AuxiliaryCommands", "")?;
        msg.add_child(ext, tt, "Extension")?;

        let security = msg.add_child(device, tt, "Security")?;
        msg.add_leaf(security, tt, "TLS1.1", true)?;
        msg.add_leaf(security, tt, "TLS1.2", true)?;
        msg.add_leaf(security, tt, "OnboardKeyGeneration", true)?;
        for key in ["AccessPolicyConfig", "X.509Token", "SAMLToken", "KerberosToken", "RELToken"] {
            msg.add_leaf(security, tt, key, false)?;
        }
        let ext = msg.add_child(security, tt, "Extension")?;
        msg.add_leaf(ext, tt, "TLS1.0", true)?;
        let ext2 = msg.add_child(ext, tt, "Extension")?;
        msg.add_leaf(ext2, tt, "Dot1X", false)?;
        msg.add_leaf(ext2, tt, "RemoteUserHandling", false)?;
    }

    if category.includes(Category::Events) {
        let events = msg.add_child(caps, tt, "Events")?;
        msg.add_leaf(events, tt, "XAddr", ctx.config.xaddr(paths::EVENTS))?;
        msg.add_leaf(events, tt, "WSSubscriptionPolicySupport", true)?;
        msg.add_leaf(events, tt, "WSPullPointSupport", true)?;
        msg.add_leaf(events, tt, "WSPausableSubscriptionManagerInterfaceSupport", false)?;
    }

    if category.includes(Category::Media) {
        let media = msg.add_child(caps, tt, "Media")?;
        msg.add_leaf(media, tt, "XAddr", ctx.config.xaddr(paths::MEDIA))?;
        let streaming = msg.add_child(media, tt, "StreamingCapabilities")?;
        msg.add_leaf(streaming, tt, "RTPMulticast", false)?;
        msg.add_leaf(streaming, tt, "RTP_TCP", false)?;
        msg.add_leaf(streaming, tt, "RTP_RTSP_TCP", true)?;
        let ext = msg.add_child(media, tt, "Extension")?;
        let profiles = msg.add_child(ext, tt, "ProfileCapabilities")?;
        msg.add_leaf(profiles, tt, "MaximumNumberOfProfiles", MAX_PROFILES)?;
    }

    if category.includes(Category::Ptz) {
        let ptz = msg.add_child(caps, tt, "PTZ")?;
        msg.add_leaf(ptz, tt, "XAddr", ctx.config.xaddr(paths::PTZ))?;
    }

    if category.includes(Category::DeviceIo) {
        let ext = msg.add_child(caps, tt, "Extension")?;
        let io = msg.add_child(ext, tt, "DeviceIO")?;
        msg.add_leaf(io, tt, "XAddr", ctx.config.xaddr(paths::DEVICE_IO))?;
        msg.add_leaf(io, tt, "VideoSources", 1)?;
        msg.add_leaf(io, tt, "VideoOutputs", 0)?;
        msg.add_leaf(io, tt, "AudioSources", 1)?;
        msg.add_leaf(io, tt, "AudioOutputs", 1)?;
        msg.add_leaf(io, tt, "RelayOutputs", 0)?;
    }

    Ok(msg)
}

/// `aa:bb:cc:dd:ee:ff` as `AA-BB-CC-DD-EE-FF`.
fn hardware_id(mac: &str) -> String {
    mac.replace(':', "-").to_ascii_uppercase()
}

pub fn get_device_information(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let info = &ctx.config.device;
    let hw = if info.hardware_id.is_empty() {
        hardware_id(&ctx.config.network.mac)
    } else {
        info.hardware_id.clone()
    };

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetDeviceInformationResponse")?;
    let tds = DEVICE.prefix;
    msg.add_leaf(resp, tds, "Manufacturer", info.manufacturer.replace('-', " "))?;
    msg.add_leaf(resp, tds, "Model", &info.model)?;
    msg.add_leaf(resp, tds, "FirmwareVersion", &info.firmware_version)?;
    msg.add_leaf(resp, tds, "SerialNumber", &info.serial_number)?;
    msg.add_leaf(resp, tds, "HardwareId", hw)?;
    Ok(msg)
}

fn date_time<T: Datelike + Timelike>(msg: &mut Message, parent: ElementId, key: &str, t: &T) -> crate::error::Result<()> {
    let tt = SCHEMA.prefix;
    let node = msg.add_child(parent, tt, key)?;
    let time = msg.add_child(node, tt, "Time")?;
    msg.add_leaf(time, tt, "Hour", t.hour())?;
    msg.add_leaf(time, tt, "Minute", t.minute())?;
    msg.add_leaf(time, tt, "Second", t.second())?;
    let date = msg.add_child(node, tt, "Date")?;
    msg.add_leaf(date, tt, "Year", t.year())?;
    msg.add_leaf(date, tt, "Month", t.month())?;
    msg.add_leaf(date, tt, "Day", t.day())?;
    Ok(())
}

pub fn get_system_date_and_time(_ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let utc = chrono::Utc::now();
    let local = utc.with_timezone(&chrono::Local);

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetSystemDateAndTimeResponse")?;
    let sdt = msg.add_child(resp, DEVICE.prefix, "SystemDateAndTime")?;
    msg.add_leaf(sdt, SCHEMA.prefix, "DateTimeType", "Manual")?;
    msg.add_leaf(sdt, SCHEMA.prefix, "DaylightSavings", false)?;
    date_time(&mut msg, sdt, "UTCDateTime", &utc)?;
    date_time(&mut msg, sdt, "LocalDateTime", &local)?;
    Ok(msg)
}

pub fn get_hostname(_ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let name = hostname::get()
        .map_err(crate::error::OnvifError::from)?
        .to_string_lossy()
        .into_owned();

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetHostnameResponse")?;
    let info = msg.add_child(resp, DEVICE.prefix, "HostnameInformation")?;
    msg.add_leaf(info, SCHEMA.prefix, "FromDHCP", false)?;
    msg.add_leaf(info, SCHEMA.prefix, "Name", name)?;
    Ok(msg)
}

pub fn get_wsdl_url(_ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetWsdlUrlResponse")?;
    msg.add_leaf(resp, DEVICE.prefix, "WsdlUrl", WSDL_URL)?;
    Ok(msg)
}

pub fn get_network_interfaces(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let net = &ctx.config.network;
    let tt = SCHEMA.prefix;

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetNetworkInterfacesResponse")?;
    let iface = msg.add_child(resp, DEVICE.prefix, "NetworkInterfaces")?;
    msg.add_parameter(iface, "token", &net.interface);
    msg.add_leaf(iface, tt, "Enabled", true)?;

    let info = msg.add_child(iface, tt, "Info")?;
    msg.add_leaf(info, tt, "Name", &net.interface)?;
    msg.add_leaf(info, tt, "HwAddress", &net.mac)?;

    let ipv4 = msg.add_child(iface, tt, "IPv4")?;
    msg.add_leaf(ipv4, tt, "Enabled", true)?;
    let config = msg.add_child(ipv4, tt, "Config")?;
    let addr = msg.add_child(config, tt, if net.dhcp { "FromDHCP" } else { "Manual" })?;
    msg.add_leaf(addr, tt, "Address", ctx.config.local_ip)?;
    msg.add_leaf(addr, tt, "PrefixLength", net.prefix_length)?;
    msg.add_leaf(config, tt, "DHCP", net.dhcp)?;
    Ok(msg)
}

pub fn get_network_default_gateway(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetNetworkDefaultGatewayResponse")?;
    let gw = msg.add_child(resp, DEVICE.prefix, "NetworkGateway")?;
    msg.add_leaf(gw, SCHEMA.prefix, "IPv4Address", ctx.config.network.gateway)?;
    Ok(msg)
}

pub fn get_network_protocols(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let protocols: [(&str, bool, u16); 3] = [
        ("HTTP", true, ctx.config.http_port),
        ("HTTPS", false, 0),
        ("RTSP", true, ctx.config.rtsp_port),
    ];

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetNetworkProtocolsResponse")?;
    for (name, enabled, port) in protocols {
        let node = msg.add_child(resp, DEVICE.prefix, "NetworkProtocols")?;
        msg.add_leaf(node, SCHEMA.prefix, "Name", name)?;
        msg.add_leaf(node, SCHEMA.prefix, "Enabled", enabled)?;
        msg.add_leaf(node, SCHEMA.prefix, "Port", port)?;
    }
    Ok(msg)
}

pub fn get_users(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetUsersResponse")?;
    for user in ctx.users.users() {
        let node = msg.add_child(resp, DEVICE.prefix, "User")?;
        msg.add_leaf(node, SCHEMA.prefix, "Username", &user.name)?;
        msg.add_leaf(node, SCHEMA.prefix, "UserLevel", user.level.as_str())?;
    }
    Ok(msg)
}

/// Replies, then asks the server to shut down.
pub fn system_reboot(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "SystemRebootResponse")?;
    msg.add_leaf(resp, DEVICE.prefix, "Message", REBOOT_MESSAGE)?;
    tracing::info!("system reboot requested");
    ctx.notify(ServerEvent::Reboot);
    Ok(msg)
}
