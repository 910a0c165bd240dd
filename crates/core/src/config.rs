//! Device configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file, or
//! no file at all, yields a working device bound to the standard ports.
//!
//! ```toml
//! config_path = "/etc/onvif"
//! http_port = 8080
//! rtsp_port = 8554
//! local_ip = "192.168.1.20"
//!
//! [device]
//! manufacturer = "ACME-Cameras"
//! model = "Doorcam"
//!
//! [scopes]
//! name = "door"
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{OnvifError, Result};

/// Top-level device configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `users` and `scopes` files.
    pub config_path: PathBuf,
    /// SOAP-over-HTTP listener port.
    pub http_port: u16,
    /// RTSP listener port.
    pub rtsp_port: u16,
    /// WS-Discovery UDP port, joined on the multicast group.
    pub discovery_port: u16,
    /// Address the listeners bind to.
    pub bind_addr: IpAddr,
    /// Address advertised in XAddrs, stream URIs and SDP.
    pub local_ip: IpAddr,
    /// Require WS-Security on SOAP and Digest on RTSP.
    #[serde(alias = "rtsp_AuthEnabled")]
    pub auth_enabled: bool,
    /// Answer WS-Discovery probes and announce Hello/Bye.
    #[serde(alias = "onvif_DiscoveryEnabled")]
    pub discoverable: bool,
    /// RTSP session keep-alive window in seconds.
    #[serde(alias = "rtsp_SessTimeout")]
    pub session_timeout: u64,
    /// Offer a video track in DESCRIBE.
    #[serde(alias = "onvif_FakeVideoEnabled")]
    pub fake_video: bool,
    /// WS-Discovery endpoint UUID. Generated at startup when absent.
    pub device_uuid: Option<String>,
    pub device: DeviceInfo,
    pub scopes: FixedScopes,
    pub network: NetworkInfo,
}

/// Answers for GetDeviceInformation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    #[serde(alias = "onvif_Manufacturer")]
    pub manufacturer: String,
    #[serde(alias = "onvif_Model")]
    pub model: String,
    #[serde(alias = "onvif_FirmwareVersion")]
    pub firmware_version: String,
    #[serde(alias = "onvif_SerialNumber")]
    pub serial_number: String,
    /// Reported as is when set, otherwise derived from the MAC address.
    #[serde(alias = "onvif_HardwareId")]
    pub hardware_id: String,
}

/// The four fixed discovery scopes. Each value is expanded to
/// `onvif://www.onvif.org/<kind>/<value>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixedScopes {
    #[serde(alias = "onvif_s_manufacturer")]
    pub manufacturer: String,
    #[serde(alias = "onvif_s_hardware")]
    pub hardware: String,
    #[serde(alias = "onvif_s_name")]
    pub name: String,
    #[serde(alias = "onvif_s_Profile")]
    pub profile: String,
}

/// Network facts reported by the device service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkInfo {
    pub interface: String,
    /// MAC address, `:` or `-` separated.
    pub mac: String,
    pub prefix_length: u8,
    pub gateway: IpAddr,
    pub dhcp: bool,
}

pub const SCOPE_PREFIX: &str = "onvif://www.onvif.org/";

impl Default for Config {
    fn default() -> Self {
        Config {
            config_path: PathBuf::from("."),
            http_port: 80,
            rtsp_port: 554,
            discovery_port: 3702,
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            local_ip: IpAddr::from([127, 0, 0, 1]),
            auth_enabled: true,
            discoverable: true,
            session_timeout: 60,
            fake_video: false,
            device_uuid: None,
            device: DeviceInfo::default(),
            scopes: FixedScopes::default(),
            network: NetworkInfo::default(),
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        DeviceInfo {
            manufacturer: "onvif-rs".to_string(),
            model: "Intercom".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            serial_number: "0000000001".to_string(),
            hardware_id: String::new(),
        }
    }
}

impl Default for FixedScopes {
    fn default() -> Self {
        FixedScopes {
            manufacturer: "onvif-rs".to_string(),
            hardware: "Intercom".to_string(),
            name: "onvif-device".to_string(),
            profile: "Streaming".to_string(),
        }
    }
}

impl Default for NetworkInfo {
    fn default() -> Self {
        NetworkInfo {
            interface: "eth0".to_string(),
            mac: "00:00:00:00:00:00".to_string(),
            prefix_length: 24,
            gateway: IpAddr::from([0, 0, 0, 0]),
            dhcp: false,
        }
    }
}

impl Config {
    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| OnvifError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OnvifError::Config(e.to_string()))
    }

    pub fn users_path(&self) -> PathBuf {
        self.config_path.join("users")
    }

    pub fn scopes_path(&self) -> PathBuf {
        self.config_path.join("scopes")
    }

    /// The fixed scopes in announcement order.
    pub fn fixed_scopes(&self) -> [String; 4] {
        let s = &self.scopes;
        [
            format!("{SCOPE_PREFIX}manufacturer/{}", s.manufacturer),
            format!("{SCOPE_PREFIX}hardware/{}", s.hardware),
            format!("{SCOPE_PREFIX}name/{}", s.name),
            format!("{SCOPE_PREFIX}Profile/{}", s.profile),
        ]
    }

    /// `http://{local_ip}:{http_port}{path}`
    pub fn xaddr(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.local_ip, self.http_port, path)
    }

    pub fn stream_uri(&self) -> String {
        format!("rtsp://{}:{}/stream", self.local_ip, self.rtsp_port)
    }
}
