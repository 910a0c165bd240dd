//! Namespace prefixes and URIs used across the ONVIF services.

/// A well-known `(prefix, uri)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ns {
    pub prefix: &'static str,
    pub uri: &'static str,
}

pub const ENVELOPE: Ns = Ns {
    prefix: "soapenv",
    uri: "http://www.w3.org/2003/05/soap-envelope",
};
pub const SCHEMA: Ns = Ns {
    prefix: "tt",
    uri: "http://www.onvif.org/ver10/schema",
};
pub const DEVICE: Ns = Ns {
    prefix: "tds",
    uri: "http://www.onvif.org/ver10/device/wsdl",
};
pub const MEDIA: Ns = Ns {
    prefix: "trt",
    uri: "http://www.onvif.org/ver10/media/wsdl",
};
pub const MEDIA2: Ns = Ns {
    prefix: "tr2",
    uri: "http://www.onvif.org/ver20/media/wsdl",
};
pub const EVENTS: Ns = Ns {
    prefix: "tev",
    uri: "http://www.onvif.org/ver10/events/wsdl",
};
pub const ERROR: Ns = Ns {
    prefix: "ter",
    uri: "http://www.onvif.org/ver10/error",
};
pub const NETWORK: Ns = Ns {
    prefix: "dn",
    uri: "http://www.onvif.org/ver10/network/wsdl",
};
pub const PTZ: Ns = Ns {
    prefix: "tptz",
    uri: "http://www.onvif.org/ver20/ptz/wsdl",
};
pub const DEVICE_IO: Ns = Ns {
    prefix: "tmd",
    uri: "http://www.onvif.org/ver10/deviceIO/wsdl",
};
pub const XML_SCHEMA: Ns = Ns {
    prefix: "xs",
    uri: "http://www.w3.org/2001/XMLSchema",
};
/// WS-Addressing 1.0, used in service response headers.
pub const ADDRESSING: Ns = Ns {
    prefix: "wsa",
    uri: "http://www.w3.org/2005/08/addressing",
};
/// WS-Addressing as used by WS-Discovery (2004/08 draft).
pub const DISCOVERY_ADDRESSING: Ns = Ns {
    prefix: "wsa",
    uri: "http://schemas.xmlsoap.org/ws/2004/08/addressing",
};
pub const DISCOVERY: Ns = Ns {
    prefix: "d",
    uri: "http://schemas.xmlsoap.org/ws/2005/04/discovery",
};

/// Implicit namespace of the reserved `xml` prefix.
pub const XML: Ns = Ns {
    prefix: "xml",
    uri: "http://www.w3.org/XML/1998/namespace",
};

pub const PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const HTTP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";

pub const WSS_PASSWORD_DIGEST: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
