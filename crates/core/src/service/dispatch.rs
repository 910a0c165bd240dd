//! Request dispatch: one ordered method table, first match wins.
//!
//! WS-Discovery messages are answered before the table is consulted and
//! never authenticated. Everything else is matched by the name of a Body
//! child; a few names exist in more than one service and are told apart by
//! the namespaces the request declares.

use crate::auth::UserLevel::{Admin, Anonymous, Operator, User};
use crate::auth::{UserLevel, wss_auth};
use crate::error::Result;
use crate::service::media::ConfigKind::{
    AudioDecoder as AD, AudioEncoder as AE, AudioOutput as AO, AudioSource as AS, VideoEncoder as VE,
    VideoSource as VS,
};
use crate::service::media::{self, ConfigKind};
use crate::service::{Context, HandlerError, HandlerResult, device, ptz, scopes};
use crate::soap::model::ElementId;
use crate::soap::names::{DEVICE_IO, DISCOVERY, MEDIA};
use crate::soap::{Fault, Message};

/// What to send back for one request.
#[derive(Debug)]
pub enum Reply {
    Message(Message),
    /// A fault envelope; HTTP answers it with 400.
    Fault(Message),
    /// Nothing at all.
    None,
}

type PlainFn = fn(&Context, &Message, ElementId) -> HandlerResult;
type KindFn = fn(&Context, &Message, ElementId, ConfigKind) -> HandlerResult;

#[derive(Clone, Copy)]
enum Handler {
    Plain(PlainFn),
    Kind(KindFn, ConfigKind),
}

struct Method {
    name: &'static str,
    /// Only matches requests declaring this namespace URI.
    ns: Option<&'static str>,
    level: UserLevel,
    handler: Handler,
}

const fn plain(name: &'static str, level: UserLevel, f: PlainFn) -> Method {
    Method {
        name,
        ns: None,
        level,
        handler: Handler::Plain(f),
    }
}

const fn scoped(name: &'static str, ns: &'static str, level: UserLevel, f: PlainFn) -> Method {
    Method {
        name,
        ns: Some(ns),
        level,
        handler: Handler::Plain(f),
    }
}

const fn per_kind(name: &'static str, level: UserLevel, f: KindFn, kind: ConfigKind) -> Method {
    Method {
        name,
        ns: None,
        level,
        handler: Handler::Kind(f, kind),
    }
}

static METHODS: &[Method] = &[
    // Admin
    plain("GetUsers", Admin, device::get_users),
    plain("SetScopes", Admin, scopes::set_scopes),
    plain("AddScopes", Admin, scopes::add_scopes),
    plain("RemoveScopes", Admin, scopes::remove_scopes),
    plain("SetDiscoveryMode", Admin, scopes::set_discovery_mode),
    plain("SystemReboot", Admin, device::system_reboot),
    // Operator
    plain("CreateProfile", Operator, media::create_profile),
    per_kind("AddVideoSourceConfiguration", Operator, media::add_configuration, VS),
    per_kind("AddVideoEncoderConfiguration", Operator, media::add_configuration, VE),
    per_kind("AddAudioSourceConfiguration", Operator, media::add_configuration, AS),
    per_kind("AddAudioEncoderConfiguration", Operator, media::add_configuration, AE),
    per_kind("AddAudioOutputConfiguration", Operator, media::add_configuration, AO),
    per_kind("AddAudioDecoderConfiguration", Operator, media::add_configuration, AD),
    per_kind("RemoveVideoSourceConfiguration", Operator, media::remove_configuration, VS),
    per_kind("RemoveVideoEncoderConfiguration", Operator, media::remove_configuration, VE),
    per_kind("RemoveAudioSourceConfiguration", Operator, media::remove_configuration, AS),
    per_kind("RemoveAudioEncoderConfiguration", Operator, media::remove_configuration, AE),
    per_kind("RemoveAudioOutputConfiguration", Operator, media::remove_configuration, AO),
    per_kind("RemoveAudioDecoderConfiguration", Operator, media::remove_configuration, AD),
    plain("DeleteProfile", Operator, media::delete_profile),
    per_kind("SetVideoSourceConfiguration", Operator, media::set_configuration, VS),
    per_kind("SetVideoEncoderConfiguration", Operator, media::set_configuration, VE),
    per_kind("SetAudioSourceConfiguration", Operator, media::set_configuration, AS),
    per_kind("SetAudioEncoderConfiguration", Operator, media::set_configuration, AE),
    per_kind("SetAudioOutputConfiguration", Operator, media::set_configuration, AO),
    // User
    plain("GetNetworkInterfaces", User, device::get_network_interfaces),
    plain("GetNetworkDefaultGateway", User, device::get_network_default_gateway),
    plain("GetNetworkProtocols", User, device::get_network_protocols),
    plain("GetDeviceInformation", User, device::get_device_information),
    plain("GetScopes", User, scopes::get_scopes),
    plain("GetDiscoveryMode", User, scopes::get_discovery_mode),
    scoped("GetVideoSources", DEVICE_IO.uri, User, media::io_video_sources),
    scoped("GetAudioOutputs", DEVICE_IO.uri, User, media::io_audio_outputs),
    scoped("GetAudioSources", DEVICE_IO.uri, User, media::io_audio_sources),
    plain("GetProfiles", User, media::get_profiles),
    plain("GetProfile", User, media::get_profile),
    scoped("GetVideoSources", MEDIA.uri, User, media::get_video_sources),
    per_kind("GetVideoSourceConfigurations", User, media::get_configurations, VS),
    per_kind("GetVideoSourceConfiguration", User, media::get_configuration, VS),
    per_kind("GetCompatibleVideoSourceConfigurations", User, media::get_compatible_configurations, VS),
    per_kind("GetVideoSourceConfigurationOptions", User, media::get_configuration_options, VS),
    per_kind("GetVideoEncoderConfigurations", User, media::get_configurations, VE),
    per_kind("GetVideoEncoderConfiguration", User, media::get_configuration, VE),
    per_kind("GetCompatibleVideoEncoderConfigurations", User, media::get_compatible_configurations, VE),
    per_kind("GetVideoEncoderConfigurationOptions", User, media::get_configuration_options, VE),
    plain(
        "GetGuaranteedNumberOfVideoEncoderInstances",
        User,
        media::get_guaranteed_encoder_instances,
    ),
    scoped("GetAudioSources", MEDIA.uri, User, media::get_audio_sources),
    per_kind("GetAudioSourceConfigurations", User, media::get_configurations, AS),
    per_kind("GetAudioSourceConfiguration", User, media::get_configuration, AS),
    per_kind("GetCompatibleAudioSourceConfigurations", User, media::get_compatible_configurations, AS),
    per_kind("GetAudioSourceConfigurationOptions", User, media::get_configuration_options, AS),
    per_kind("GetAudioEncoderConfigurations", User, media::get_configurations, AE),
    per_kind("GetAudioEncoderConfiguration", User, media::get_configuration, AE),
    per_kind("GetCompatibleAudioEncoderConfigurations", User, media::get_compatible_configurations, AE),
    per_kind("GetAudioEncoderConfigurationOptions", User, media::get_configuration_options, AE),
    plain("GetMetadataConfigurations", User, media::get_metadata_configurations),
    scoped("GetAudioOutputs", MEDIA.uri, User, media::get_audio_outputs),
    per_kind("GetAudioOutputConfigurations", User, media::get_configurations, AO),
    per_kind("GetAudioOutputConfiguration", User, media::get_configuration, AO),
    per_kind("GetCompatibleAudioOutputConfigurations", User, media::get_compatible_configurations, AO),
    per_kind("GetAudioOutputConfigurationOptions", User, media::get_configuration_options, AO),
    per_kind("GetAudioDecoderConfigurations", User, media::get_configurations, AD),
    per_kind("GetAudioDecoderConfiguration", User, media::get_configuration, AD),
    per_kind("GetCompatibleAudioDecoderConfigurations", User, media::get_compatible_configurations, AD),
    per_kind("GetAudioDecoderConfigurationOptions", User, media::get_configuration_options, AD),
    plain("GetStreamUri", User, media::get_stream_uri),
    plain("GetNodes", User, ptz::get_nodes),
    plain("GetConfigurations", User, ptz::get_configurations),
    // Anonymous
    plain("GetWsdlUrl", Anonymous, device::get_wsdl_url),
    plain("GetServices", Anonymous, device::get_services),
    plain("GetServiceCapabilities", Anonymous, device::get_service_capabilities),
    plain("GetCapabilities", Anonymous, device::get_capabilities),
    plain("GetHostname", Anonymous, device::get_hostname),
    plain("GetSystemDateAndTime", Anonymous, device::get_system_date_and_time),
];

/// Turn a decoded request into a [`Reply`].
///
/// Faults become fault envelopes. An `Err` means the request could not be
/// answered at all.
pub fn dispatch(ctx: &Context, req: &Message) -> Result<Reply> {
    let Some(body) = req.body() else {
        tracing::warn!("request without Body");
        return fault(Fault::unknown_action());
    };
    let has = |name: &str| req.find_child(body, None, name).is_some();

    if has("Probe") {
        let reply = ctx.discovery.probe_matches(req, &ctx.scopes)?;
        return Ok(reply.map_or(Reply::None, Reply::Message));
    }
    if has("Resolve") {
        let reply = ctx.discovery.resolve_matches(req, &ctx.scopes)?;
        return Ok(reply.map_or(Reply::None, Reply::Message));
    }
    if has("Hello") || has("Bye") {
        return Ok(Reply::None);
    }

    let level = if ctx.config.auth_enabled {
        wss_auth(req, &ctx.users)
    } else {
        UserLevel::Admin
    };

    let found = METHODS.iter().find_map(|m| {
        let node = req.find_child(body, None, m.name)?;
        match m.ns {
            Some(uri) if !req.has_ns_uri(uri) => None,
            _ => Some((m, node)),
        }
    });
    let Some((method, node)) = found else {
        let name = req.children(body).first().map(|&c| req[c].key().to_string());
        tracing::warn!(method = ?name, "unknown method");
        return fault(Fault::unknown_action());
    };

    if !level.permits(method.level) {
        tracing::warn!(
            method = method.name,
            level = level.as_str(),
            required = method.level.as_str(),
            "not authorized"
        );
        return fault(Fault::not_authorized());
    }

    tracing::debug!(method = method.name, level = level.as_str(), "dispatching");
    let result = match method.handler {
        Handler::Plain(f) => f(ctx, req, node),
        Handler::Kind(f, kind) => f(ctx, req, node, kind),
    };
    match result {
        Ok(msg) => Ok(Reply::Message(msg)),
        Err(HandlerError::Fault(f)) => {
            tracing::debug!(method = method.name, fault = %f, "handler fault");
            fault(f)
        }
        Err(HandlerError::Internal(e)) => {
            tracing::warn!(method = method.name, error = %e, "handler failed");
            Err(e)
        }
    }
}

/// Answer a WS-Discovery datagram.
///
/// Only a Probe or Resolve in the discovery namespace is looked at; any
/// other body, ONVIF methods included, yields [`Reply::None`].
pub fn dispatch_discovery(ctx: &Context, req: &Message) -> Result<Reply> {
    let Some(&method) = req.body().and_then(|body| req.children(body).first()) else {
        tracing::trace!("datagram without a body method dropped");
        return Ok(Reply::None);
    };
    let element = &req[method];
    if req.namespace(element.ns()).uri != DISCOVERY.uri {
        tracing::trace!(method = element.key(), "non-discovery datagram dropped");
        return Ok(Reply::None);
    }
    let reply = match element.key() {
        "Probe" => ctx.discovery.probe_matches(req, &ctx.scopes)?,
        "Resolve" => ctx.discovery.resolve_matches(req, &ctx.scopes)?,
        other => {
            tracing::trace!(method = other, "unanswered discovery message");
            None
        }
    };
    Ok(reply.map_or(Reply::None, Reply::Message))
}

fn fault(f: Fault) -> Result<Reply> {
    Ok(Reply::Fault(f.to_message()?))
}
