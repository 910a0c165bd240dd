//! ONVIF services: the shared device context, the request dispatcher and
//! the device, scope, media and PTZ handlers.
//!
//! Handlers build a complete response [`Message`] or fail with a
//! [`HandlerError`]. Only [`dispatch`] turns failures into fault envelopes
//! or silence.

pub mod device;
pub mod dispatch;
pub mod media;
pub mod ptz;
pub mod scopes;

use std::sync::Arc;
use std::sync::mpsc::Sender;

use parking_lot::Mutex;

pub use dispatch::{Reply, dispatch, dispatch_discovery};
pub use media::MediaStore;

use crate::auth::UserStore;
use crate::config::Config;
use crate::discovery::{Discovery, ScopeError, ScopeStore};
use crate::error::{OnvifError, Result};
use crate::soap::model::ElementId;
use crate::soap::names::Ns;
use crate::soap::{Fault, FaultCode, FaultSubcode, Message};

/// HTTP paths of the service endpoints.
pub mod paths {
    pub const DEVICE: &str = "/onvif/device_service";
    pub const MEDIA: &str = "/onvif/media_service";
    pub const MEDIA2: &str = "/onvif/media2_service";
    pub const DEVICE_IO: &str = "/onvif/deviceio_service";
    pub const EVENTS: &str = "/onvif/event_service";
    pub const PTZ: &str = "/onvif/ptz_service";
}

/// Side effects a handler asks the server to carry out after replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// The scope list changed; announce a fresh Hello.
    ScopesChanged,
    /// SystemReboot was accepted; shut down after a short delay.
    Reboot,
}

/// Why a handler produced no response message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Reported to the client as a SOAP fault.
    #[error("fault: {0}")]
    Fault(Fault),
    /// Reported to the client without a SOAP body.
    #[error(transparent)]
    Internal(#[from] OnvifError),
}

impl From<Fault> for HandlerError {
    fn from(f: Fault) -> Self {
        HandlerError::Fault(f)
    }
}

impl From<ScopeError> for HandlerError {
    fn from(e: ScopeError) -> Self {
        use crate::soap::fault::reason;
        match e {
            ScopeError::TooMany => Fault::nested(
                FaultCode::Receiver,
                FaultSubcode::Action,
                FaultSubcode::TooManyScopes,
                reason::TOO_MANY_SCOPES,
            )
            .into(),
            ScopeError::FixedScope(_) => Fault::nested(
                FaultCode::Sender,
                FaultSubcode::OperationProhibited,
                FaultSubcode::FixedScope,
                reason::DELETE_FIXED_SCOPE,
            )
            .into(),
            ScopeError::NoScope(_) => Fault::nested(
                FaultCode::Sender,
                FaultSubcode::InvalidArgVal,
                FaultSubcode::NoScope,
                reason::NO_SCOPE,
            )
            .into(),
            ScopeError::Io(e) => HandlerError::Internal(e.into()),
        }
    }
}

pub type HandlerResult = std::result::Result<Message, HandlerError>;

/// Everything the handlers share: configuration, users, scopes, discovery
/// state and the media store.
#[derive(Debug)]
pub struct Context {
    pub config: Arc<Config>,
    pub users: UserStore,
    pub scopes: ScopeStore,
    pub discovery: Discovery,
    pub media: MediaStore,
    events: Mutex<Option<Sender<ServerEvent>>>,
}

impl Context {
    /// Open the user and scope files under `config.config_path`.
    pub fn open(config: Arc<Config>, device_uuid: &str) -> Result<Self> {
        let users = UserStore::open(config.users_path())?;
        let scopes = ScopeStore::open(config.scopes_path(), config.fixed_scopes())?;
        let discovery = Discovery::new(&config, device_uuid);
        Ok(Context {
            config,
            users,
            scopes,
            discovery,
            media: MediaStore::new(),
            events: Mutex::new(None),
        })
    }

    /// Route [`ServerEvent`]s to `tx`. Without a subscriber they are dropped.
    pub fn subscribe(&self, tx: Sender<ServerEvent>) {
        *self.events.lock() = Some(tx);
    }

    pub fn unsubscribe(&self) {
        self.events.lock().take();
    }

    pub(crate) fn notify(&self, event: ServerEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            if tx.send(event).is_err() {
                tracing::debug!(?event, "server event dropped, no receiver");
            }
        }
    }
}

/// Response skeleton with the `namespaces` declared and an empty method
/// element `prefix:key` in the body.
pub(crate) fn respond(namespaces: &[Ns], prefix: &str, key: &str) -> Result<(Message, ElementId)> {
    let (mut msg, body) = Message::with_body(namespaces)?;
    let method = msg.add_child(body, prefix, key)?;
    Ok((msg, method))
}

/// Value of the request child `key`, or [`OnvifError::MissingElement`].
pub(crate) fn required<'a>(req: &'a Message, parent: ElementId, key: &'static str) -> std::result::Result<&'a str, HandlerError> {
    req.child_value(parent, key)
        .ok_or(HandlerError::Internal(OnvifError::MissingElement(key)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::soap::names::{DEVICE, ENVELOPE, MEDIA, SCHEMA};
    use crate::soap::{decode, encode};

    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub ctx: Context,
    }

    /// Context over a temp dir holding an admin, an operator and a user.
    pub fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    pub fn fixture_with(tweak: impl FnOnce(&mut Config)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users"),
            "0,admin,admin|1,operator,operator|2,user,user|",
        )
        .unwrap();
        let mut config = Config {
            config_path: dir.path().to_path_buf(),
            local_ip: "10.0.0.5".parse().unwrap(),
            http_port: 8080,
            rtsp_port: 8554,
            ..Config::default()
        };
        tweak(&mut config);
        let ctx = Context::open(Arc::new(config), "5a9c1e7e-0000-4000-8000-000000000001").unwrap();
        Fixture { dir, ctx }
    }

    /// Decoded request whose body holds `inner`, with the usual namespaces.
    pub fn request(inner: &str) -> Message {
        let text = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="{}" xmlns:tds="{}" xmlns:trt="{}" xmlns:tt="{}"><s:Body>{inner}</s:Body></s:Envelope>"#,
            ENVELOPE.uri, DEVICE.uri, MEDIA.uri, SCHEMA.uri
        );
        decode(text.as_bytes()).unwrap()
    }

    /// The method element of a request built by [`request`].
    pub fn method(req: &Message) -> ElementId {
        let body = req.body().unwrap();
        req.children(body)[0]
    }

    pub fn text(msg: &Message) -> String {
        String::from_utf8(encode(msg).unwrap()).unwrap()
    }

    pub fn fault(err: HandlerError) -> Fault {
        match err {
            HandlerError::Fault(f) => f,
            HandlerError::Internal(e) => panic!("expected fault, got {e}"),
        }
    }
}
