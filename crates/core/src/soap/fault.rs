//! SOAP 1.2 faults with ONVIF subcodes.

use std::fmt;

use crate::error::Result;
use crate::soap::model::Message;
use crate::soap::names::{ENVELOPE, ERROR, SCHEMA};

/// Top-level `soapenv:Code/Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    VersionMismatch,
    MustUnderstand,
    DataEncodingUnknown,
    Sender,
    Receiver,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::VersionMismatch => "VersionMismatch",
            FaultCode::MustUnderstand => "MustUnderstand",
            FaultCode::DataEncodingUnknown => "DataEncodingUnknown",
            FaultCode::Sender => "Sender",
            FaultCode::Receiver => "Receiver",
        }
    }
}

/// `ter:` subcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSubcode {
    WellFormed,
    TagMismatch,
    Tag,
    Namespace,
    MissingAttr,
    ProhibAttr,
    InvalidArgs,
    InvalidArgVal,
    UnknownAction,
    OperationProhibited,
    NotAuthorized,
    ActionNotSupported,
    Action,
    OutofMemory,
    CriticalError,
    NoProfile,
    NoSuchService,
    AudioNotSupported,
    AudioOutputNotSupported,
    InvalidStreamSetup,
    NoConfig,
    ConfigModify,
    NoVideoSource,
    EmptyScope,
    TooManyScopes,
    ProfileExists,
    MaxNVTProfiles,
    DeletionOfFixedProfile,
    FixedScope,
    NoScope,
}

impl FaultSubcode {
    pub fn as_str(&self) -> &'static str {
        use FaultSubcode::*;
        match self {
            WellFormed => "WellFormed",
            TagMismatch => "TagMismatch",
            Tag => "Tag",
            Namespace => "Namespace",
            MissingAttr => "MissingAttr",
            ProhibAttr => "ProhibAttr",
            InvalidArgs => "InvalidArgs",
            InvalidArgVal => "InvalidArgVal",
            UnknownAction => "UnknownAction",
            OperationProhibited => "OperationProhibited",
            NotAuthorized => "NotAuthorized",
            ActionNotSupported => "ActionNotSupported",
            Action => "Action",
            OutofMemory => "OutofMemory",
            CriticalError => "CriticalError",
            NoProfile => "NoProfile",
            NoSuchService => "NoSuchService",
            AudioNotSupported => "AudioNotSupported",
            AudioOutputNotSupported => "AudioOutputNotSupported",
            InvalidStreamSetup => "InvalidStreamSetup",
            NoConfig => "NoConfig",
            ConfigModify => "ConfigModify",
            NoVideoSource => "NoVideoSource",
            EmptyScope => "EmptyScope",
            TooManyScopes => "TooManyScopes",
            ProfileExists => "ProfileExists",
            MaxNVTProfiles => "MaxNVTProfiles",
            DeletionOfFixedProfile => "DeletionOfFixedProfile",
            FixedScope => "FixedScope",
            NoScope => "NoScope",
        }
    }
}

pub mod reason {
    pub const NO_PROFILE: &str = "Requested profile token does not exist";
    pub const AUDIO_NOT_SUPPORTED: &str = "The device does not support audio";
    pub const AUDIO_OUTPUT_NOT_SUPPORTED: &str = "Audio Outputs are not supported";
    pub const STREAM_SETUP_NOT_SUPPORTED: &str =
        "Specification of StreamType of Transport part is not supported";
    pub const WSDL_NOT_SUPPORTED: &str = "Requested WSDL service not supported";
    pub const NO_CONFIG: &str = "Requested config token does not exist";
    pub const CONFIG_PARAM_NOT_SET: &str = "Configuration parameter are not possible to set";
    pub const VIDEO_SOURCE_NOT_EXIST: &str = "The requested Videosource does not exist";
    pub const AUDIO_SOURCE_NOT_EXIST: &str = "The requested Audiosource does not exist";
    pub const SCOPE_EMPTY: &str = "Scope list is empty";
    pub const TOO_MANY_SCOPES: &str =
        "The Requested scope list exceeds the supported number of scopes";
    pub const PROFILE_EXISTS: &str = "A profile with the given ProfileToken already exists";
    pub const MAX_PROFILES: &str =
        "The max number of supported profiles by the device has been reached";
    pub const DELETE_FIXED_PROFILE: &str = "The fixed Profile cannot be deleted";
    pub const DELETE_FIXED_SCOPE: &str =
        "Trying to Remove a fixed scope parameter, command rejected";
    pub const NO_SCOPE: &str = "Trying to Remove scope which does not exist";
    pub const UNKNOWN_METHOD: &str = "Requested method not implementetd";
    pub const NOT_AUTHORIZED: &str = "Sender not Authorized";
    pub const WELL_FORMED: &str = "The message is not well formed";
}

/// A structured application error, turned into a fault envelope by the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: FaultCode,
    pub subcode: FaultSubcode,
    pub detail: Option<FaultSubcode>,
    pub reason: &'static str,
}

impl Fault {
    pub fn new(code: FaultCode, subcode: FaultSubcode, reason: &'static str) -> Self {
        Fault {
            code,
            subcode,
            detail: None,
            reason,
        }
    }

    /// Fault with a second, nested subcode.
    pub fn nested(
        code: FaultCode,
        subcode: FaultSubcode,
        detail: FaultSubcode,
        reason: &'static str,
    ) -> Self {
        Fault {
            code,
            subcode,
            detail: Some(detail),
            reason,
        }
    }

    pub fn no_profile() -> Self {
        Fault::nested(
            FaultCode::Sender,
            FaultSubcode::InvalidArgVal,
            FaultSubcode::NoProfile,
            reason::NO_PROFILE,
        )
    }

    pub fn no_config() -> Self {
        Fault::nested(
            FaultCode::Sender,
            FaultSubcode::InvalidArgVal,
            FaultSubcode::NoConfig,
            reason::NO_CONFIG,
        )
    }

    pub fn config_modify() -> Self {
        Fault::nested(
            FaultCode::Sender,
            FaultSubcode::InvalidArgVal,
            FaultSubcode::ConfigModify,
            reason::CONFIG_PARAM_NOT_SET,
        )
    }

    pub fn not_authorized() -> Self {
        Fault::new(
            FaultCode::Sender,
            FaultSubcode::NotAuthorized,
            reason::NOT_AUTHORIZED,
        )
    }

    pub fn unknown_action() -> Self {
        Fault::new(
            FaultCode::Sender,
            FaultSubcode::UnknownAction,
            reason::UNKNOWN_METHOD,
        )
    }

    pub fn well_formed() -> Self {
        Fault::new(FaultCode::Sender, FaultSubcode::WellFormed, reason::WELL_FORMED)
    }

    /// Build the fault envelope:
    ///
    /// ```text
    /// Body/Fault/Code/Value            soapenv:<code>
    ///               /Subcode/Value     ter:<subcode>
    ///                       /Subcode/Value ter:<detail>
    ///           /Reason/Text xml:lang="en"
    /// ```
    pub fn to_message(&self) -> Result<Message> {
        let (mut msg, body) = Message::with_body(&[ERROR, SCHEMA])?;
        let env = ENVELOPE.prefix;

        let fault = msg.add_child(body, env, "Fault")?;
        let code = msg.add_child(fault, env, "Code")?;
        msg.add_leaf(code, env, "Value", format_args!("{env}:{}", self.code.as_str()))?;

        let sub = msg.add_child(code, env, "Subcode")?;
        msg.add_leaf(sub, env, "Value", format_args!("{}:{}", ERROR.prefix, self.subcode.as_str()))?;
        if let Some(detail) = self.detail {
            let sub2 = msg.add_child(sub, env, "Subcode")?;
            msg.add_leaf(sub2, env, "Value", format_args!("{}:{}", ERROR.prefix, detail.as_str()))?;
        }

        let reason = msg.add_child(fault, env, "Reason")?;
        let text = msg.add_leaf(reason, env, "Text", self.reason)?;
        msg.add_parameter(text, "xml:lang", "en");
        Ok(msg)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.code.as_str(), self.subcode.as_str())?;
        if let Some(detail) = self.detail {
            write!(f, "/{}", detail.as_str())?;
        }
        write!(f, ": {}", self.reason)
    }
}
