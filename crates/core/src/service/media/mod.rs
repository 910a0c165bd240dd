//! Media service: profiles, configurations, sources and stream URIs.
//!
//! Most operations exist once per [`ConfigKind`]; the dispatcher passes the
//! kind along with the request.

pub mod store;

use std::str::FromStr;

pub use store::{ConfigKind, Media, MediaConfig, MediaError, MediaStore, Profile, Settings};
use store::{Bounds, Multicast, SendPrimacy, VideoEncoderSettings, AudioEncoderSettings, AudioOutputSettings};

use crate::error::{OnvifError, Result};
use crate::service::{Context, HandlerError, HandlerResult, required, respond};
use crate::soap::fault::reason;
use crate::soap::model::ElementId;
use crate::soap::names::{DEVICE_IO, MEDIA, SCHEMA};
use crate::soap::{Fault, FaultCode, FaultSubcode, Message};

const TT: &str = SCHEMA.prefix;
const TRT: &str = MEDIA.prefix;

impl From<MediaError> for HandlerError {
    fn from(e: MediaError) -> Self {
        let fault = match e {
            MediaError::NoProfile => Fault::no_profile(),
            MediaError::NoConfig => Fault::no_config(),
            MediaError::ProfileExists => Fault::nested(
                FaultCode::Sender,
                FaultSubcode::InvalidArgVal,
                FaultSubcode::ProfileExists,
                reason::PROFILE_EXISTS,
            ),
            MediaError::MaxProfiles => Fault::nested(
                FaultCode::Receiver,
                FaultSubcode::Action,
                FaultSubcode::MaxNVTProfiles,
                reason::MAX_PROFILES,
            ),
            MediaError::FixedProfile => Fault::nested(
                FaultCode::Sender,
                FaultSubcode::Action,
                FaultSubcode::DeletionOfFixedProfile,
                reason::DELETE_FIXED_PROFILE,
            ),
        };
        HandlerError::Fault(fault)
    }
}

/// Where a configuration is written: inside a profile, in a list response
/// or as the single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Place {
    Profile,
    List,
    Single,
}

fn write_multicast(msg: &mut Message, parent: ElementId, m: &Multicast) -> Result<()> {
    let node = msg.add_child(parent, TT, "Multicast")?;
    let addr = msg.add_child(node, TT, "Address")?;
    msg.add_leaf(addr, TT, "Type", "IPv4")?;
    msg.add_leaf(addr, TT, "IPv4Address", m.address)?;
    msg.add_leaf(node, TT, "Port", m.port)?;
    msg.add_leaf(node, TT, "TTL", m.ttl)?;
    msg.add_leaf(node, TT, "AutoStart", m.auto_start)?;
    Ok(())
}

fn write_config(msg: &mut Message, parent: ElementId, cfg: &MediaConfig, place: Place) -> Result<()> {
    let node = match place {
        Place::Profile => msg.add_child(parent, TT, cfg.settings.kind().element())?,
        Place::List => msg.add_child(parent, TRT, "Configurations")?,
        Place::Single => msg.add_child(parent, TRT, "Configuration")?,
    };
    msg.add_parameter(node, "token", &cfg.token);
    msg.add_leaf(node, TT, "Name", &cfg.name)?;
    msg.add_leaf(node, TT, "UseCount", cfg.use_count)?;

    match &cfg.settings {
        Settings::VideoSource(s) => {
            msg.add_leaf(node, TT, "SourceToken", &s.source_token)?;
            let b = msg.add_child(node, TT, "Bounds")?;
            msg.add_parameter(b, "height", s.bounds.height);
            msg.add_parameter(b, "width", s.bounds.width);
            msg.add_parameter(b, "y", s.bounds.y);
            msg.add_parameter(b, "x", s.bounds.x);
        }
        Settings::AudioSource(s) => {
            msg.add_leaf(node, TT, "SourceToken", &s.source_token)?;
        }
        Settings::VideoEncoder(s) => {
            msg.add_leaf(node, TT, "Encoding", VideoEncoderSettings::ENCODING)?;
            let res = msg.add_child(node, TT, "Resolution")?;
            msg.add_leaf(res, TT, "Width", s.width)?;
            msg.add_leaf(res, TT, "Height", s.height)?;
            msg.add_leaf(node, TT, "Quality", s.quality)?;
            let rc = msg.add_child(node, TT, "RateControl")?;
            msg.add_leaf(rc, TT, "FrameRateLimit", s.frame_rate_limit)?;
            msg.add_leaf(rc, TT, "EncodingInterval", s.encoding_interval)?;
            msg.add_leaf(rc, TT, "BitrateLimit", s.bitrate_limit)?;
            write_multicast(msg, node, &s.multicast)?;
            msg.add_leaf(node, TT, "SessionTimeout", format_args!("PT{}S", s.session_timeout))?;
        }
        Settings::AudioEncoder(s) => {
            msg.add_leaf(node, TT, "Encoding", AudioEncoderSettings::ENCODING)?;
            msg.add_leaf(node, TT, "Bitrate", s.bitrate)?;
            msg.add_leaf(node, TT, "SampleRate", s.sample_rate)?;
            write_multicast(msg, node, &s.multicast)?;
            msg.add_leaf(node, TT, "SessionTimeout", format_args!("PT{}S", s.session_timeout))?;
        }
        Settings::AudioOutput(s) => {
            msg.add_leaf(node, TT, "OutputToken", &s.output_token)?;
            msg.add_leaf(node, TT, "SendPrimacy", s.send_primacy.uri())?;
            msg.add_leaf(node, TT, "OutputLevel", s.output_level)?;
        }
        Settings::AudioDecoder(_) => {}
    }
    Ok(())
}

fn write_profile(msg: &mut Message, parent: ElementId, media: &Media, p: &Profile, single: bool) -> Result<()> {
    let node = msg.add_child(parent, TRT, if single { "Profile" } else { "Profiles" })?;
    msg.add_parameter(node, "fixed", p.fixed);
    msg.add_parameter(node, "token", &p.token);
    msg.add_leaf(node, TT, "Name", &p.name)?;

    for kind in [
        ConfigKind::VideoSource,
        ConfigKind::AudioSource,
        ConfigKind::VideoEncoder,
        ConfigKind::AudioEncoder,
    ] {
        if let Some(cfg) = media.profile_config(p, kind) {
            write_config(msg, node, cfg, Place::Profile)?;
        }
    }
    let ext = msg.add_child(node, TT, "Extension")?;
    for kind in [ConfigKind::AudioOutput, ConfigKind::AudioDecoder] {
        if let Some(cfg) = media.profile_config(p, kind) {
            write_config(msg, ext, cfg, Place::Profile)?;
        }
    }
    Ok(())
}

fn range(msg: &mut Message, parent: ElementId, key: &str, min: impl std::fmt::Display, max: impl std::fmt::Display) -> Result<()> {
    let node = msg.add_child(parent, TT, key)?;
    msg.add_leaf(node, TT, "Min", min)?;
    msg.add_leaf(node, TT, "Max", max)?;
    Ok(())
}

/// Options offered for `cfg`: the current values are the only choice.
fn write_options(msg: &mut Message, parent: ElementId, cfg: &MediaConfig) -> Result<()> {
    let opts = msg.add_child(parent, TRT, "Options")?;
    match &cfg.settings {
        Settings::VideoSource(s) => {
            msg.add_parameter(opts, "MaximumNumberOfProfiles", s.max_profiles);
            let br = msg.add_child(opts, TT, "BoundsRange")?;
            range(msg, br, "XRange", s.bounds.x, s.bounds.x)?;
            range(msg, br, "YRange", s.bounds.y, s.bounds.y)?;
            range(msg, br, "WidthRange", s.bounds.width, s.bounds.width)?;
            range(msg, br, "HeightRange", s.bounds.height, s.bounds.height)?;
            msg.add_leaf(opts, TT, "VideoSourceTokensAvailable", &s.source_token)?;
        }
        Settings::AudioSource(s) => {
            msg.add_leaf(opts, TT, "InputTokensAvailable", &s.source_token)?;
        }
        Settings::VideoEncoder(s) => {
            msg.add_parameter(opts, "GuaranteedFrameRateSupported", false);
            range(msg, opts, "QualityRange", s.quality, s.quality)?;
            let jpeg = msg.add_child(opts, TT, "JPEG")?;
            jpeg_options(msg, jpeg, s, false)?;
            let ext = msg.add_child(opts, TT, "Extension")?;
            let jpeg = msg.add_child(ext, TT, "JPEG")?;
            jpeg_options(msg, jpeg, s, true)?;
        }
        Settings::AudioEncoder(s) => {
            let inner = msg.add_child(opts, TT, "Options")?;
            msg.add_leaf(inner, TT, "Encoding", AudioEncoderSettings::ENCODING)?;
            let list = msg.add_child(inner, TT, "BitrateList")?;
            msg.add_leaf(list, TT, "Items", s.bitrate)?;
            let list = msg.add_child(inner, TT, "SampleRateList")?;
            msg.add_leaf(list, TT, "Items", s.sample_rate)?;
        }
        Settings::AudioOutput(s) => {
            msg.add_leaf(opts, TT, "OutputTokensAvailable", &s.output_token)?;
            msg.add_leaf(opts, TT, "SendPrimacyOptions", s.send_primacy.uri())?;
            range(msg, opts, "OutputLevelRange", 0, AudioOutputSettings::MAX_LEVEL)?;
        }
        Settings::AudioDecoder(s) => {
            let g711 = msg.add_child(opts, TT, "G711DecOptions")?;
            let list = msg.add_child(g711, TT, "Bitrate")?;
            msg.add_leaf(list, TT, "Items", s.bitrate)?;
            let list = msg.add_child(g711, TT, "SampleRateRange")?;
            msg.add_leaf(list, TT, "Items", s.sample_rate)?;
        }
    }
    Ok(())
}

fn jpeg_options(msg: &mut Message, jpeg: ElementId, s: &VideoEncoderSettings, bitrate: bool) -> Result<()> {
    let res = msg.add_child(jpeg, TT, "ResolutionsAvailable")?;
    msg.add_leaf(res, TT, "Width", s.width)?;
    msg.add_leaf(res, TT, "Height", s.height)?;
    range(msg, jpeg, "FrameRateRange", s.frame_rate_limit, s.frame_rate_limit)?;
    range(msg, jpeg, "EncodingIntervalRange", s.encoding_interval, s.encoding_interval)?;
    if bitrate {
        range(msg, jpeg, "BitrateRange", s.bitrate_limit, s.bitrate_limit)?;
    }
    Ok(())
}

pub fn get_profiles(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "GetProfilesResponse")?;
    ctx.media.read(|m| {
        m.profiles()
            .iter()
            .try_for_each(|p| write_profile(&mut msg, resp, m, p, false))
    })?;
    Ok(msg)
}

pub fn get_profile(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let token = req.child_value(method, "ProfileToken").unwrap_or_default();
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "GetProfileResponse")?;
    ctx.media.read(|m| {
        let p = m.profile(token).ok_or(MediaError::NoProfile)?;
        write_profile(&mut msg, resp, m, p, true)?;
        Ok::<_, HandlerError>(())
    })?;
    Ok(msg)
}

pub fn create_profile(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let name = required(req, method, "Name")?;
    let token = req.child_value(method, "Token");
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "CreateProfileResponse")?;
    ctx.media.write(|m| {
        let token = m.create_profile(name, token)?.token.clone();
        if let Some(p) = m.profile(&token) {
            write_profile(&mut msg, resp, m, p, true)?;
        }
        Ok::<_, HandlerError>(())
    })?;
    Ok(msg)
}

pub fn delete_profile(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let token = required(req, method, "ProfileToken")?;
    ctx.media.write(|m| m.delete_profile(token))?;
    let (msg, _) = respond(&[MEDIA, SCHEMA], TRT, "DeleteProfileResponse")?;
    Ok(msg)
}

pub fn get_configurations(ctx: &Context, _req: &Message, _method: ElementId, kind: ConfigKind) -> HandlerResult {
    let key = format!("Get{}sResponse", kind.element());
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, &key)?;
    ctx.media.read(|m| {
        m.configs(kind)
            .iter()
            .try_for_each(|c| write_config(&mut msg, resp, c, Place::List))
    })?;
    Ok(msg)
}

pub fn get_configuration(ctx: &Context, req: &Message, method: ElementId, kind: ConfigKind) -> HandlerResult {
    let token = req.child_value(method, "ConfigurationToken").unwrap_or_default();
    let key = format!("Get{}Response", kind.element());
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, &key)?;
    ctx.media.read(|m| {
        let cfg = m.config(kind, token).ok_or(MediaError::NoConfig)?;
        write_config(&mut msg, resp, cfg, Place::Single)?;
        Ok::<_, HandlerError>(())
    })?;
    Ok(msg)
}

/// Every configuration of `kind` fits every profile.
pub fn get_compatible_configurations(
    ctx: &Context,
    req: &Message,
    method: ElementId,
    kind: ConfigKind,
) -> HandlerResult {
    let token = req.child_value(method, "ProfileToken").unwrap_or_default();
    let key = format!("GetCompatible{}sResponse", kind.element());
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, &key)?;
    ctx.media.read(|m| {
        m.profile(token).ok_or(MediaError::NoProfile)?;
        for cfg in m.configs(kind) {
            write_config(&mut msg, resp, cfg, Place::List)?;
        }
        Ok::<_, HandlerError>(())
    })?;
    Ok(msg)
}

/// Options for the configuration named by `ConfigurationToken`, else for
/// the one used by `ProfileToken`, else for every configuration of `kind`.
pub fn get_configuration_options(
    ctx: &Context,
    req: &Message,
    method: ElementId,
    kind: ConfigKind,
) -> HandlerResult {
    let config_token = req.child_value(method, "ConfigurationToken");
    let profile_token = req.child_value(method, "ProfileToken");
    let key = format!("Get{}OptionsResponse", kind.element());
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, &key)?;

    ctx.media.read(|m| {
        let profile = match profile_token {
            Some(t) => Some(m.profile(t).ok_or(MediaError::NoProfile)?),
            None => None,
        };
        let config = match config_token {
            Some(t) => Some(m.config(kind, t).ok_or(MediaError::NoConfig)?),
            None => profile.and_then(|p| m.profile_config(p, kind)),
        };

        match (profile, config) {
            (_, Some(cfg)) => write_options(&mut msg, resp, cfg)?,
            (Some(_), None) => {
                if let Some(cfg) = m.configs(kind).first() {
                    write_options(&mut msg, resp, cfg)?;
                }
            }
            (None, None) => {
                for cfg in m.configs(kind) {
                    write_options(&mut msg, resp, cfg)?;
                }
            }
        }
        Ok::<_, HandlerError>(())
    })?;
    Ok(msg)
}

pub fn add_configuration(ctx: &Context, req: &Message, method: ElementId, kind: ConfigKind) -> HandlerResult {
    let profile = required(req, method, "ProfileToken")?;
    let config = required(req, method, "ConfigurationToken")?;
    ctx.media.write(|m| m.add_config(profile, kind, config))?;
    let (msg, _) = respond(&[MEDIA, SCHEMA], TRT, &format!("Add{}Response", kind.element()))?;
    Ok(msg)
}

pub fn remove_configuration(ctx: &Context, req: &Message, method: ElementId, kind: ConfigKind) -> HandlerResult {
    let profile = required(req, method, "ProfileToken")?;
    ctx.media.write(|m| m.remove_config(profile, kind))?;
    let (msg, _) = respond(&[MEDIA, SCHEMA], TRT, &format!("Remove{}Response", kind.element()))?;
    Ok(msg)
}

fn missing(key: &'static str) -> HandlerError {
    HandlerError::Internal(OnvifError::MissingElement(key))
}

fn modify() -> HandlerError {
    Fault::config_modify().into()
}

/// Numeric child `key`; unparsable values cannot be applied.
fn number<T: FromStr>(req: &Message, parent: ElementId, key: &'static str) -> std::result::Result<T, HandlerError> {
    required(req, parent, key)?.parse().map_err(|_| modify())
}

/// `PT60S` as seconds.
fn duration_secs(s: &str) -> Option<u64> {
    s.strip_prefix("PT")?.strip_suffix('S')?.parse().ok()
}

pub fn set_configuration(ctx: &Context, req: &Message, method: ElementId, kind: ConfigKind) -> HandlerResult {
    let node = req
        .find_child(method, None, "Configuration")
        .ok_or_else(|| missing("Configuration"))?;
    let token = req
        .find_parameter(node, "token")
        .map(|p| p.value.as_str())
        .unwrap_or_default();

    ctx.media.write(|m| -> SetResult {
        m.config(kind, token).ok_or(MediaError::NoConfig)?;
        match kind {
            ConfigKind::VideoSource => set_video_source(m, req, node, token),
            ConfigKind::AudioSource => set_audio_source(m, req, node, token),
            ConfigKind::VideoEncoder => set_video_encoder(m, req, node, token),
            ConfigKind::AudioEncoder => set_audio_encoder(m, req, node, token),
            ConfigKind::AudioOutput => set_audio_output(m, req, node, token),
            ConfigKind::AudioDecoder => Err(modify()),
        }
    })?;
    tracing::info!(?kind, token, "configuration changed");

    let (msg, _) = respond(&[MEDIA, SCHEMA], TRT, &format!("Set{}Response", kind.element()))?;
    Ok(msg)
}

type SetResult = std::result::Result<(), HandlerError>;

fn set_video_source(m: &mut Media, req: &Message, node: ElementId, token: &str) -> SetResult {
    let name = required(req, node, "Name")?;
    let source = required(req, node, "SourceToken")?;
    let b = req.find_child(node, None, "Bounds").ok_or_else(|| missing("Bounds"))?;
    let attr = |key: &'static str| -> std::result::Result<u32, HandlerError> {
        req.find_parameter(b, key)
            .ok_or_else(|| missing(key))?
            .value
            .parse()
            .map_err(|_| modify())
    };
    let bounds = Bounds {
        x: attr("x")?,
        y: attr("y")?,
        width: attr("width")?,
        height: attr("height")?,
    };

    let known_source = m.configs(ConfigKind::VideoSource).iter().any(|c| {
        matches!(&c.settings, Settings::VideoSource(s) if s.source_token == source)
    });
    let Some(MediaConfig {
        name: cfg_name,
        settings: Settings::VideoSource(s),
        ..
    }) = m.config_mut(ConfigKind::VideoSource, token)
    else {
        return Err(MediaError::NoConfig.into());
    };
    let cur = s.bounds;
    if bounds.x > cur.x || bounds.y > cur.y || bounds.width > cur.width || bounds.height > cur.height || !known_source {
        return Err(modify());
    }
    *cfg_name = name.to_string();
    s.source_token = source.to_string();
    s.bounds = bounds;
    Ok(())
}

fn set_audio_source(m: &mut Media, req: &Message, node: ElementId, token: &str) -> SetResult {
    let name = required(req, node, "Name")?;
    let source = required(req, node, "SourceToken")?;
    let known_source = m.configs(ConfigKind::AudioSource).iter().any(|c| {
        matches!(&c.settings, Settings::AudioSource(s) if s.source_token == source)
    });
    if !known_source {
        return Err(modify());
    }
    let Some(MediaConfig {
        name: cfg_name,
        settings: Settings::AudioSource(s),
        ..
    }) = m.config_mut(ConfigKind::AudioSource, token)
    else {
        return Err(MediaError::NoConfig.into());
    };
    *cfg_name = name.to_string();
    s.source_token = source.to_string();
    Ok(())
}

fn set_audio_output(m: &mut Media, req: &Message, node: ElementId, token: &str) -> SetResult {
    let name = required(req, node, "Name")?;
    let output = required(req, node, "OutputToken")?;
    let level: u32 = number(req, node, "OutputLevel")?;
    let primacy = SendPrimacy::from_uri(required(req, node, "SendPrimacy")?).ok_or_else(modify)?;

    let known_output = m.configs(ConfigKind::AudioOutput).iter().any(|c| {
        matches!(&c.settings, Settings::AudioOutput(s) if s.output_token == output)
    });
    if !known_output || level > AudioOutputSettings::MAX_LEVEL {
        return Err(modify());
    }
    let Some(MediaConfig {
        name: cfg_name,
        settings: Settings::AudioOutput(s),
        ..
    }) = m.config_mut(ConfigKind::AudioOutput, token)
    else {
        return Err(MediaError::NoConfig.into());
    };
    *cfg_name = name.to_string();
    s.output_token = output.to_string();
    s.output_level = level;
    s.send_primacy = primacy;
    Ok(())
}

fn set_video_encoder(m: &mut Media, req: &Message, node: ElementId, token: &str) -> SetResult {
    let name = required(req, node, "Name")?;
    let encoding = required(req, node, "Encoding")?;
    let res = req.find_child(node, None, "Resolution").ok_or_else(|| missing("Resolution"))?;
    let width: u32 = number(req, res, "Width")?;
    let height: u32 = number(req, res, "Height")?;
    let quality: f64 = number(req, node, "Quality")?;
    let rc = req.find_child(node, None, "RateControl").ok_or_else(|| missing("RateControl"))?;
    let frl: u32 = number(req, rc, "FrameRateLimit")?;
    let ei: u32 = number(req, rc, "EncodingInterval")?;
    let brl: u32 = number(req, rc, "BitrateLimit")?;
    let timeout = duration_secs(required(req, node, "SessionTimeout")?).ok_or_else(modify)?;
    let guaranteed = req.child_value(node, "GuaranteedFrameRate") == Some("true");

    let Some(MediaConfig {
        name: cfg_name,
        settings: Settings::VideoEncoder(s),
        ..
    }) = m.config_mut(ConfigKind::VideoEncoder, token)
    else {
        return Err(MediaError::NoConfig.into());
    };
    if encoding != VideoEncoderSettings::ENCODING
        || width > s.width
        || height > s.height
        || !quality.is_finite()
        || quality < 0.0
        || quality > f64::from(s.quality)
        || frl > s.frame_rate_limit
        || ei > s.encoding_interval
    {
        return Err(modify());
    }
    *cfg_name = name.to_string();
    s.width = width;
    s.height = height;
    s.quality = quality.round() as u32;
    s.frame_rate_limit = frl;
    s.encoding_interval = ei;
    s.bitrate_limit = brl;
    s.session_timeout = timeout;
    s.guaranteed_frame_rate = guaranteed;
    Ok(())
}

fn set_audio_encoder(m: &mut Media, req: &Message, node: ElementId, token: &str) -> SetResult {
    let name = required(req, node, "Name")?;
    let encoding = required(req, node, "Encoding")?;
    let bitrate: u32 = number(req, node, "Bitrate")?;
    let sample_rate: u32 = number(req, node, "SampleRate")?;
    let timeout = duration_secs(required(req, node, "SessionTimeout")?).ok_or_else(modify)?;

    let Some(MediaConfig {
        name: cfg_name,
        settings: Settings::AudioEncoder(s),
        ..
    }) = m.config_mut(ConfigKind::AudioEncoder, token)
    else {
        return Err(MediaError::NoConfig.into());
    };
    if !matches!(encoding, "PCMU" | "G711") || bitrate > s.bitrate || sample_rate > s.sample_rate {
        return Err(modify());
    }
    *cfg_name = name.to_string();
    s.bitrate = bitrate;
    s.sample_rate = sample_rate;
    s.session_timeout = timeout;
    Ok(())
}

pub fn get_video_sources(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "GetVideoSourcesResponse")?;
    ctx.media.read(|m| {
        for cfg in m.configs(ConfigKind::VideoSource) {
            let Settings::VideoSource(s) = &cfg.settings else {
                continue;
            };
            let node = msg.add_child(resp, TRT, "VideoSources")?;
            msg.add_parameter(node, "token", &s.source_token);
            msg.add_leaf(node, TT, "Framerate", s.framerate)?;
            let res = msg.add_child(node, TT, "Resolution")?;
            msg.add_leaf(res, TT, "Width", s.bounds.width)?;
            msg.add_leaf(res, TT, "Height", s.bounds.height)?;
        }
        Ok::<_, OnvifError>(())
    })?;
    Ok(msg)
}

pub fn get_audio_sources(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "GetAudioSourcesResponse")?;
    ctx.media.read(|m| -> std::result::Result<(), HandlerError> {
        let sources = m.configs(ConfigKind::AudioSource);
        if sources.is_empty() {
            return Err(HandlerError::Fault(Fault::nested(
                FaultCode::Receiver,
                FaultSubcode::ActionNotSupported,
                FaultSubcode::AudioNotSupported,
                reason::AUDIO_NOT_SUPPORTED,
            )));
        }
        for cfg in sources {
            let Settings::AudioSource(s) = &cfg.settings else {
                continue;
            };
            let node = msg.add_child(resp, TRT, "AudioSources")?;
            msg.add_parameter(node, "token", &s.source_token);
            msg.add_leaf(node, TT, "Channels", s.channels)?;
        }
        Ok(())
    })?;
    Ok(msg)
}

pub fn get_audio_outputs(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "GetAudioOutputsResponse")?;
    ctx.media.read(|m| -> std::result::Result<(), HandlerError> {
        let outputs = m.configs(ConfigKind::AudioOutput);
        if outputs.is_empty() {
            return Err(HandlerError::Fault(Fault::nested(
                FaultCode::Receiver,
                FaultSubcode::ActionNotSupported,
                FaultSubcode::AudioOutputNotSupported,
                reason::AUDIO_OUTPUT_NOT_SUPPORTED,
            )));
        }
        for cfg in outputs {
            if let Settings::AudioOutput(s) = &cfg.settings {
                let node = msg.add_child(resp, TRT, "AudioOutputs")?;
                msg.add_parameter(node, "token", &s.output_token);
            }
        }
        Ok(())
    })?;
    Ok(msg)
}

/// DeviceIO flavour of the source listings: one `tmd:Token` per entry.
fn io_tokens(ctx: &Context, key: &str, kind: ConfigKind) -> HandlerResult {
    let (mut msg, resp) = respond(&[DEVICE_IO, SCHEMA], DEVICE_IO.prefix, key)?;
    let tokens: Vec<String> = ctx.media.read(|m| {
        m.configs(kind)
            .iter()
            .filter_map(|c| match &c.settings {
                Settings::VideoSource(s) => Some(s.source_token.clone()),
                Settings::AudioSource(s) => Some(s.source_token.clone()),
                Settings::AudioOutput(s) => Some(s.output_token.clone()),
                _ => None,
            })
            .collect()
    });
    for token in tokens {
        msg.add_leaf(resp, DEVICE_IO.prefix, "Token", token)?;
    }
    Ok(msg)
}

pub fn io_video_sources(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    io_tokens(ctx, "GetVideoSourcesResponse", ConfigKind::VideoSource)
}

pub fn io_audio_sources(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    io_tokens(ctx, "GetAudioSourcesResponse", ConfigKind::AudioSource)
}

pub fn io_audio_outputs(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    io_tokens(ctx, "GetAudioOutputsResponse", ConfigKind::AudioOutput)
}

pub fn get_guaranteed_encoder_instances(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let token = req.child_value(method, "ConfigurationToken").unwrap_or_default();
    let instances = ctx.media.read(|m| match m.config(ConfigKind::VideoSource, token) {
        Some(MediaConfig {
            settings: Settings::VideoSource(s),
            ..
        }) => Some(s.instances),
        _ => None,
    });
    let instances = instances.ok_or(MediaError::NoConfig)?;

    let (mut msg, resp) = respond(
        &[MEDIA, SCHEMA],
        TRT,
        "GetGuaranteedNumberOfVideoEncoderInstancesResponse",
    )?;
    msg.add_leaf(resp, TRT, "TotalNumber", instances.total())?;
    for (key, n) in [
        ("JPEG", instances.jpeg),
        ("H264", instances.h264),
        ("MPEG4", instances.mpeg4),
    ] {
        if n > 0 {
            msg.add_leaf(resp, TRT, key, n)?;
        }
    }
    Ok(msg)
}

/// No metadata streams exist.
pub fn get_metadata_configurations(_ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (msg, _) = respond(&[MEDIA, SCHEMA], TRT, "GetMetadataConfigurationsResponse")?;
    Ok(msg)
}

/// `rtsp://{ip}:{port}/stream`. Only unicast RTP over UDP or RTSP is
/// offered; multicast, TCP and HTTP setups are rejected.
pub fn get_stream_uri(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let token = req.child_value(method, "ProfileToken").unwrap_or_default();
    let setup = req.find_child(method, None, "StreamSetup");
    let stream = setup.and_then(|s| req.child_value(s, "Stream"));
    let protocol = setup
        .and_then(|s| req.find_path(s, &["Transport", "Protocol"]))
        .and_then(|p| req.value(p));

    let timeout = ctx.media.read(|m| {
        let p = m.profile(token).ok_or(MediaError::NoProfile)?;
        let from = |kind| match m.profile_config(p, kind).map(|c| &c.settings) {
            Some(Settings::AudioEncoder(s)) => Some(s.session_timeout),
            Some(Settings::VideoEncoder(s)) => Some(s.session_timeout),
            _ => None,
        };
        Ok::<_, MediaError>(
            from(ConfigKind::AudioEncoder)
                .or_else(|| from(ConfigKind::VideoEncoder))
                .unwrap_or(ctx.config.session_timeout),
        )
    })?;

    if stream == Some("RTP-Multicast") || matches!(protocol, Some("TCP" | "HTTP")) {
        tracing::debug!(?stream, ?protocol, "unsupported stream setup");
        return Err(Fault::nested(
            FaultCode::Sender,
            FaultSubcode::InvalidArgVal,
            FaultSubcode::InvalidStreamSetup,
            reason::STREAM_SETUP_NOT_SUPPORTED,
        )
        .into());
    }

    let (mut msg, resp) = respond(&[MEDIA, SCHEMA], TRT, "GetStreamUriResponse")?;
    let uri = msg.add_child(resp, TRT, "MediaUri")?;
    msg.add_leaf(uri, TT, "Uri", ctx.config.stream_uri())?;
    msg.add_leaf(uri, TT, "InvalidAfterConnect", false)?;
    msg.add_leaf(uri, TT, "InvalidAfterReboot", false)?;
    msg.add_leaf(uri, TT, "Timeout", format_args!("PT{timeout}S"))?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{fault, fixture, method, request, text};
    use store::FIXED_PROFILE_TOKEN;

    #[test]
    fn profiles_listing() {
        let f = fixture();
        let req = request("<trt:GetProfiles/>");
        let out = text(&get_profiles(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(r#"<trt:Profiles fixed="true" token="p0"><tt:Name>standard_profile</tt:Name>"#));
        assert!(out.contains(
            r#"<tt:VideoSourceConfiguration token="vs_config0"><tt:Name>standard_video_source0</tt:Name><tt:UseCount>1</tt:UseCount><tt:SourceToken>vs0</tt:SourceToken><tt:Bounds height="128" width="128" y="1" x="1"/>"#
        ));
        assert!(out.contains("<tt:Extension><tt:AudioOutputConfiguration token=\"ao_config0\">"));
        assert!(out.contains("<tt:SessionTimeout>PT60S</tt:SessionTimeout>"));
    }

    #[test]
    fn get_profile_faults_on_unknown_token() {
        let f = fixture();
        let req = request("<trt:GetProfile><trt:ProfileToken>p9</trt:ProfileToken></trt:GetProfile>");
        let err = fault(get_profile(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::NoProfile));

        let req = request("<trt:GetProfile><trt:ProfileToken>p0</trt:ProfileToken></trt:GetProfile>");
        let out = text(&get_profile(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(r#"<trt:Profile fixed="true" token="p0">"#));
    }

    #[test]
    fn profile_lifecycle_through_handlers() {
        let f = fixture();
        let req = request("<trt:CreateProfile><trt:Name>night</trt:Name><trt:Token>n1</trt:Token></trt:CreateProfile>");
        let out = text(&create_profile(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(r#"<trt:Profile fixed="false" token="n1"><tt:Name>night</tt:Name><tt:Extension/></trt:Profile>"#));

        let err = fault(create_profile(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::ProfileExists));

        let req = request(
            "<trt:AddVideoEncoderConfiguration><trt:ProfileToken>n1</trt:ProfileToken><trt:ConfigurationToken>ve_config0</trt:ConfigurationToken></trt:AddVideoEncoderConfiguration>",
        );
        let out = text(&add_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).unwrap());
        assert!(out.contains("<trt:AddVideoEncoderConfigurationResponse/>"));
        f.ctx.media.read(|m| {
            assert_eq!(m.config(ConfigKind::VideoEncoder, "ve_config0").unwrap().use_count, 2);
        });

        let req = request("<trt:DeleteProfile><trt:ProfileToken>p0</trt:ProfileToken></trt:DeleteProfile>");
        let err = fault(delete_profile(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::DeletionOfFixedProfile));

        let req = request("<trt:DeleteProfile><trt:ProfileToken>n1</trt:ProfileToken></trt:DeleteProfile>");
        delete_profile(&f.ctx, &req, method(&req)).unwrap();
        f.ctx.media.read(|m| {
            assert_eq!(m.profiles().len(), 1);
            assert_eq!(m.config(ConfigKind::VideoEncoder, "ve_config0").unwrap().use_count, 1);
        });
    }

    #[test]
    fn remove_configuration_clears_slot() {
        let f = fixture();
        let req = request("<trt:RemoveAudioEncoderConfiguration><trt:ProfileToken>p0</trt:ProfileToken></trt:RemoveAudioEncoderConfiguration>");
        remove_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioEncoder).unwrap();
        f.ctx.media.read(|m| {
            let p = m.profile(FIXED_PROFILE_TOKEN).unwrap();
            assert!(p.config(ConfigKind::AudioEncoder).is_none());
            assert_eq!(m.config(ConfigKind::AudioEncoder, "ae_config0").unwrap().use_count, 0);
        });
    }

    #[test]
    fn single_configuration_and_lists() {
        let f = fixture();
        let req = request("<trt:GetAudioOutputConfiguration><trt:ConfigurationToken>ao_config0</trt:ConfigurationToken></trt:GetAudioOutputConfiguration>");
        let out = text(&get_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioOutput).unwrap());
        assert!(out.contains(r#"<trt:Configuration token="ao_config0">"#));
        assert!(out.contains("<tt:SendPrimacy>www.onvif.org/ver20/HalfDuplex/Auto</tt:SendPrimacy><tt:OutputLevel>8</tt:OutputLevel>"));

        let req = request("<trt:GetAudioOutputConfiguration><trt:ConfigurationToken>x</trt:ConfigurationToken></trt:GetAudioOutputConfiguration>");
        let err = fault(get_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioOutput).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::NoConfig));

        let req = request("<trt:GetAudioEncoderConfigurations/>");
        let out = text(&get_configurations(&f.ctx, &req, method(&req), ConfigKind::AudioEncoder).unwrap());
        assert!(out.contains("<trt:GetAudioEncoderConfigurationsResponse><trt:Configurations token=\"ae_config0\">"));
        assert!(out.contains("<tt:Encoding>PCMU</tt:Encoding><tt:Bitrate>64</tt:Bitrate><tt:SampleRate>8</tt:SampleRate>"));

        let req = request("<trt:GetCompatibleVideoSourceConfigurations><trt:ProfileToken>zz</trt:ProfileToken></trt:GetCompatibleVideoSourceConfigurations>");
        let err = fault(
            get_compatible_configurations(&f.ctx, &req, method(&req), ConfigKind::VideoSource).unwrap_err(),
        );
        assert_eq!(err.detail, Some(FaultSubcode::NoProfile));
    }

    #[test]
    fn options_selection() {
        let f = fixture();
        let req = request("<trt:GetVideoEncoderConfigurationOptions/>");
        let out = text(&get_configuration_options(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).unwrap());
        assert!(out.contains(r#"<trt:Options GuaranteedFrameRateSupported="false"><tt:QualityRange><tt:Min>8</tt:Min><tt:Max>8</tt:Max></tt:QualityRange>"#));
        assert!(out.contains("<tt:BitrateRange><tt:Min>2048</tt:Min><tt:Max>2048</tt:Max></tt:BitrateRange>"));

        let req = request("<trt:GetAudioOutputConfigurationOptions><trt:ProfileToken>p0</trt:ProfileToken></trt:GetAudioOutputConfigurationOptions>");
        let out = text(&get_configuration_options(&f.ctx, &req, method(&req), ConfigKind::AudioOutput).unwrap());
        assert!(out.contains("<tt:OutputLevelRange><tt:Min>0</tt:Min><tt:Max>10</tt:Max></tt:OutputLevelRange>"));

        let req = request("<trt:GetVideoSourceConfigurationOptions><trt:ConfigurationToken>bad</trt:ConfigurationToken></trt:GetVideoSourceConfigurationOptions>");
        let err = fault(get_configuration_options(&f.ctx, &req, method(&req), ConfigKind::VideoSource).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::NoConfig));
    }

    #[test]
    fn set_video_source_bounds() {
        let f = fixture();
        let body = |w: u32, src: &str| {
            format!(
                r#"<trt:SetVideoSourceConfiguration><trt:Configuration token="vs_config0"><tt:Name>renamed</tt:Name><tt:UseCount>1</tt:UseCount><tt:SourceToken>{src}</tt:SourceToken><tt:Bounds x="0" y="1" width="{w}" height="64"/></trt:Configuration></trt:SetVideoSourceConfiguration>"#
            )
        };

        let req = request(&body(256, "vs0"));
        let err = fault(set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoSource).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::ConfigModify));

        let req = request(&body(64, "vs7"));
        assert!(set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoSource).is_err());

        let req = request(&body(64, "vs0"));
        let out = text(&set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoSource).unwrap());
        assert!(out.contains("<trt:SetVideoSourceConfigurationResponse/>"));
        f.ctx.media.read(|m| {
            let cfg = m.config(ConfigKind::VideoSource, "vs_config0").unwrap();
            assert_eq!(cfg.name, "renamed");
            let Settings::VideoSource(s) = &cfg.settings else { panic!() };
            assert_eq!(s.bounds, Bounds { x: 0, y: 1, width: 64, height: 64 });
        });
    }

    #[test]
    fn set_video_encoder_rules() {
        let f = fixture();
        let body = |enc: &str, q: &str, timeout: &str| {
            format!(
                "<trt:SetVideoEncoderConfiguration><trt:Configuration token=\"ve_config0\"><tt:Name>ve</tt:Name><tt:Encoding>{enc}</tt:Encoding>\
                 <tt:Resolution><tt:Width>64</tt:Width><tt:Height>64</tt:Height></tt:Resolution><tt:Quality>{q}</tt:Quality>\
                 <tt:RateControl><tt:FrameRateLimit>1</tt:FrameRateLimit><tt:EncodingInterval>1</tt:EncodingInterval><tt:BitrateLimit>1024</tt:BitrateLimit></tt:RateControl>\
                 <tt:SessionTimeout>{timeout}</tt:SessionTimeout></trt:Configuration></trt:SetVideoEncoderConfiguration>"
            )
        };

        let req = request(&body("H264", "5", "PT30S"));
        assert!(set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).is_err());
        let req = request(&body("JPEG", "9", "PT30S"));
        assert!(set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).is_err());

        for q in ["NaN", "inf", "-0.5"] {
            let req = request(&body("JPEG", q, "PT30S"));
            assert!(set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).is_err());
        }

        let req = request(&body("JPEG", "4.6", "PT30S"));
        set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).unwrap();
        let quality = |f: &crate::service::testing::Fixture| {
            f.ctx.media.read(|m| {
                let cfg = m.config(ConfigKind::VideoEncoder, "ve_config0").unwrap();
                let Settings::VideoEncoder(s) = &cfg.settings else { panic!() };
                s.quality
            })
        };
        assert_eq!(quality(&f), 5);

        let req = request(&body("JPEG", "5", "PT30S"));
        set_configuration(&f.ctx, &req, method(&req), ConfigKind::VideoEncoder).unwrap();

        let req = request("<trt:GetStreamUri><trt:ProfileToken>p0</trt:ProfileToken></trt:GetStreamUri>");
        let out = text(&get_stream_uri(&f.ctx, &req, method(&req)).unwrap());
        // The audio encoder timeout wins while the profile has one.
        assert!(out.contains("<tt:Timeout>PT60S</tt:Timeout>"));

        let req = request("<trt:RemoveAudioEncoderConfiguration><trt:ProfileToken>p0</trt:ProfileToken></trt:RemoveAudioEncoderConfiguration>");
        remove_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioEncoder).unwrap();
        let req = request("<trt:GetStreamUri><trt:ProfileToken>p0</trt:ProfileToken></trt:GetStreamUri>");
        let out = text(&get_stream_uri(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<tt:Timeout>PT30S</tt:Timeout>"));
    }

    #[test]
    fn set_audio_output_rules() {
        let f = fixture();
        let body = |level: &str, primacy: &str| {
            format!(
                "<trt:SetAudioOutputConfiguration><trt:Configuration token=\"ao_config0\"><tt:Name>ao</tt:Name><tt:OutputToken>ao0</tt:OutputToken>\
                 <tt:SendPrimacy>{primacy}</tt:SendPrimacy><tt:OutputLevel>{level}</tt:OutputLevel></trt:Configuration></trt:SetAudioOutputConfiguration>"
            )
        };
        for (level, primacy) in [
            ("11", "www.onvif.org/ver20/HalfDuplex/Server"),
            ("-1", "www.onvif.org/ver20/HalfDuplex/Server"),
            ("5", "www.onvif.org/ver20/HalfDuplex/Never"),
        ] {
            let req = request(&body(level, primacy));
            let err = fault(set_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioOutput).unwrap_err());
            assert_eq!(err.detail, Some(FaultSubcode::ConfigModify));
        }

        let req = request(&body("3", "www.onvif.org/ver20/HalfDuplex/Server"));
        set_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioOutput).unwrap();
        f.ctx.media.read(|m| {
            let Settings::AudioOutput(s) = &m.config(ConfigKind::AudioOutput, "ao_config0").unwrap().settings else {
                panic!()
            };
            assert_eq!(s.output_level, 3);
            assert_eq!(s.send_primacy, SendPrimacy::Server);
        });
    }

    #[test]
    fn set_unknown_token_is_no_config() {
        let f = fixture();
        let req = request("<trt:SetAudioSourceConfiguration><trt:Configuration token=\"x\"><tt:Name>a</tt:Name><tt:SourceToken>as0</tt:SourceToken></trt:Configuration></trt:SetAudioSourceConfiguration>");
        let err = fault(set_configuration(&f.ctx, &req, method(&req), ConfigKind::AudioSource).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::NoConfig));
    }

    #[test]
    fn stream_uri_rejects_unsupported_setups() {
        let f = fixture();
        let req = request("<trt:GetStreamUri><trt:ProfileToken>p0</trt:ProfileToken></trt:GetStreamUri>");
        let out = text(&get_stream_uri(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<tt:Uri>rtsp://10.0.0.5:8554/stream</tt:Uri>"));
        assert!(out.contains("<tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>"));

        let req = request(
            "<trt:GetStreamUri><trt:StreamSetup><tt:Stream>RTP-Multicast</tt:Stream><tt:Transport><tt:Protocol>UDP</tt:Protocol></tt:Transport></trt:StreamSetup><trt:ProfileToken>p0</trt:ProfileToken></trt:GetStreamUri>",
        );
        let err = fault(get_stream_uri(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::InvalidStreamSetup));

        let req = request(
            "<trt:GetStreamUri><trt:StreamSetup><tt:Stream>RTP-Unicast</tt:Stream><tt:Transport><tt:Protocol>TCP</tt:Protocol></tt:Transport></trt:StreamSetup><trt:ProfileToken>p0</trt:ProfileToken></trt:GetStreamUri>",
        );
        assert!(get_stream_uri(&f.ctx, &req, method(&req)).is_err());

        let req = request("<trt:GetStreamUri><trt:ProfileToken>none</trt:ProfileToken></trt:GetStreamUri>");
        let err = fault(get_stream_uri(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::NoProfile));
    }

    #[test]
    fn sources_and_instances() {
        let f = fixture();
        let req = request("<trt:GetVideoSources/>");
        let out = text(&get_video_sources(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(r#"<trt:VideoSources token="vs0"><tt:Framerate>1</tt:Framerate><tt:Resolution><tt:Width>128</tt:Width><tt:Height>128</tt:Height></tt:Resolution></trt:VideoSources>"#));

        let out = text(&get_audio_sources(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(r#"<trt:AudioSources token="as0"><tt:Channels>1</tt:Channels></trt:AudioSources>"#));

        let out = text(&get_audio_outputs(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(r#"<trt:AudioOutputs token="ao0"/>"#));

        let out = text(&io_audio_outputs(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<tmd:GetAudioOutputsResponse><tmd:Token>ao0</tmd:Token></tmd:GetAudioOutputsResponse>"));

        let req = request("<trt:GetGuaranteedNumberOfVideoEncoderInstances><trt:ConfigurationToken>vs_config0</trt:ConfigurationToken></trt:GetGuaranteedNumberOfVideoEncoderInstances>");
        let out = text(&get_guaranteed_encoder_instances(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<trt:TotalNumber>1</trt:TotalNumber><trt:JPEG>1</trt:JPEG></trt:GetGuaranteedNumberOfVideoEncoderInstancesResponse>"));

        let out = text(&get_metadata_configurations(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<trt:GetMetadataConfigurationsResponse/>"));
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(duration_secs("PT60S"), Some(60));
        assert_eq!(duration_secs("PT1M"), None);
        assert_eq!(duration_secs("60"), None);
    }
}
