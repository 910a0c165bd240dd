//! Media profiles and the configurations they reference.
//!
//! Profiles refer to configurations by token. A configuration's use count is
//! the number of profiles referencing it; every profile mutation keeps the
//! counts in step.

use std::net::Ipv4Addr;

use parking_lot::Mutex;

use crate::auth::random_token;

/// Most profiles the device holds, the fixed one included.
pub const MAX_PROFILES: usize = 10;
pub const FIXED_PROFILE_TOKEN: &str = "p0";
const FIXED_PROFILE_NAME: &str = "standard_profile";
const PROFILE_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("no such profile")]
    NoProfile,
    #[error("no such configuration")]
    NoConfig,
    #[error("profile token already in use")]
    ProfileExists,
    #[error("profile limit of {MAX_PROFILES} reached")]
    MaxProfiles,
    #[error("the fixed profile cannot be deleted")]
    FixedProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    VideoSource,
    AudioSource,
    VideoEncoder,
    AudioEncoder,
    AudioOutput,
    AudioDecoder,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 6] = [
        ConfigKind::VideoSource,
        ConfigKind::AudioSource,
        ConfigKind::VideoEncoder,
        ConfigKind::AudioEncoder,
        ConfigKind::AudioOutput,
        ConfigKind::AudioDecoder,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Element name of one configuration of this kind.
    pub fn element(self) -> &'static str {
        match self {
            ConfigKind::VideoSource => "VideoSourceConfiguration",
            ConfigKind::AudioSource => "AudioSourceConfiguration",
            ConfigKind::VideoEncoder => "VideoEncoderConfiguration",
            ConfigKind::AudioEncoder => "AudioEncoderConfiguration",
            ConfigKind::AudioOutput => "AudioOutputConfiguration",
            ConfigKind::AudioDecoder => "AudioDecoderConfiguration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Guaranteed encoder instances per codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInstances {
    pub jpeg: u32,
    pub h264: u32,
    pub mpeg4: u32,
}

impl EncoderInstances {
    pub fn total(&self) -> u32 {
        self.jpeg + self.h264 + self.mpeg4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multicast {
    pub address: Ipv4Addr,
    pub port: u16,
    pub ttl: u32,
    pub auto_start: bool,
}

impl Default for Multicast {
    fn default() -> Self {
        Multicast {
            address: Ipv4Addr::UNSPECIFIED,
            port: 0,
            ttl: 0,
            auto_start: false,
        }
    }
}

/// Half-duplex audio output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPrimacy {
    Server,
    Client,
    Auto,
}

impl SendPrimacy {
    pub const ALL: [SendPrimacy; 3] = [SendPrimacy::Server, SendPrimacy::Client, SendPrimacy::Auto];

    pub fn uri(self) -> &'static str {
        match self {
            SendPrimacy::Server => "www.onvif.org/ver20/HalfDuplex/Server",
            SendPrimacy::Client => "www.onvif.org/ver20/HalfDuplex/Client",
            SendPrimacy::Auto => "www.onvif.org/ver20/HalfDuplex/Auto",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        SendPrimacy::ALL.into_iter().find(|p| p.uri() == uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSourceSettings {
    pub source_token: String,
    pub max_profiles: u32,
    pub bounds: Bounds,
    pub framerate: u32,
    pub instances: EncoderInstances,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSourceSettings {
    pub source_token: String,
    pub channels: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderSettings {
    pub width: u32,
    pub height: u32,
    pub quality: u32,
    pub frame_rate_limit: u32,
    pub encoding_interval: u32,
    pub bitrate_limit: u32,
    pub multicast: Multicast,
    /// Seconds.
    pub session_timeout: u64,
    pub guaranteed_frame_rate: bool,
}

impl VideoEncoderSettings {
    /// JPEG is the only video encoding.
    pub const ENCODING: &'static str = "JPEG";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderSettings {
    /// kbit/s
    pub bitrate: u32,
    /// kHz
    pub sample_rate: u32,
    pub multicast: Multicast,
    pub session_timeout: u64,
}

impl AudioEncoderSettings {
    /// G.711 mu-law is the only audio encoding.
    pub const ENCODING: &'static str = "PCMU";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOutputSettings {
    pub output_token: String,
    pub send_primacy: SendPrimacy,
    pub output_level: u32,
}

impl AudioOutputSettings {
    pub const MAX_LEVEL: u32 = 10;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDecoderSettings {
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settings {
    VideoSource(VideoSourceSettings),
    AudioSource(AudioSourceSettings),
    VideoEncoder(VideoEncoderSettings),
    AudioEncoder(AudioEncoderSettings),
    AudioOutput(AudioOutputSettings),
    AudioDecoder(AudioDecoderSettings),
}

impl Settings {
    pub fn kind(&self) -> ConfigKind {
        match self {
            Settings::VideoSource(_) => ConfigKind::VideoSource,
            Settings::AudioSource(_) => ConfigKind::AudioSource,
            Settings::VideoEncoder(_) => ConfigKind::VideoEncoder,
            Settings::AudioEncoder(_) => ConfigKind::AudioEncoder,
            Settings::AudioOutput(_) => ConfigKind::AudioOutput,
            Settings::AudioDecoder(_) => ConfigKind::AudioDecoder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConfig {
    pub token: String,
    pub name: String,
    pub use_count: u32,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub token: String,
    pub name: String,
    pub fixed: bool,
    configs: [Option<String>; 6],
}

impl Profile {
    /// Token of the configuration of `kind` this profile uses.
    pub fn config(&self, kind: ConfigKind) -> Option<&str> {
        self.configs[kind.index()].as_deref()
    }
}

/// Profiles and configuration lists.
#[derive(Debug)]
pub struct Media {
    profiles: Vec<Profile>,
    configs: [Vec<MediaConfig>; 6],
}

impl Media {
    /// The standard configuration of each kind and the fixed profile using
    /// all of them.
    fn standard() -> Self {
        let multicast = Multicast::default();
        let entries = [
            (
                "vs_config0",
                "standard_video_source0",
                Settings::VideoSource(VideoSourceSettings {
                    source_token: "vs0".to_string(),
                    max_profiles: 12,
                    bounds: Bounds {
                        x: 1,
                        y: 1,
                        width: 128,
                        height: 128,
                    },
                    framerate: 1,
                    instances: EncoderInstances {
                        jpeg: 1,
                        h264: 0,
                        mpeg4: 0,
                    },
                }),
            ),
            (
                "as_config0",
                "standard_audio_source0",
                Settings::AudioSource(AudioSourceSettings {
                    source_token: "as0".to_string(),
                    channels: 1,
                }),
            ),
            (
                "ve_config0",
                "standard_video_encoder0",
                Settings::VideoEncoder(VideoEncoderSettings {
                    width: 128,
                    height: 128,
                    quality: 8,
                    frame_rate_limit: 1,
                    encoding_interval: 1,
                    bitrate_limit: 2048,
                    multicast,
                    session_timeout: 60,
                    guaranteed_frame_rate: false,
                }),
            ),
            (
                "ae_config0",
                "standard_audio_encoder0",
                Settings::AudioEncoder(AudioEncoderSettings {
                    bitrate: 64,
                    sample_rate: 8,
                    multicast,
                    session_timeout: 60,
                }),
            ),
            (
                "ao_config0",
                "standard_audio_output0",
                Settings::AudioOutput(AudioOutputSettings {
                    output_token: "ao0".to_string(),
                    send_primacy: SendPrimacy::Auto,
                    output_level: 8,
                }),
            ),
            (
                "ad_config0",
                "standard_audio_decoder0",
                Settings::AudioDecoder(AudioDecoderSettings {
                    bitrate: 64,
                    sample_rate: 8,
                    channels: 1,
                }),
            ),
        ];

        let mut media = Media {
            profiles: Vec::new(),
            configs: Default::default(),
        };
        let mut fixed = Profile {
            token: FIXED_PROFILE_TOKEN.to_string(),
            name: FIXED_PROFILE_NAME.to_string(),
            fixed: true,
            configs: Default::default(),
        };
        for (token, name, settings) in entries {
            let kind = settings.kind();
            fixed.configs[kind.index()] = Some(token.to_string());
            media.configs[kind.index()].push(MediaConfig {
                token: token.to_string(),
                name: name.to_string(),
                use_count: 1,
                settings,
            });
        }
        media.profiles.push(fixed);
        media
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, token: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.token == token)
    }

    pub fn configs(&self, kind: ConfigKind) -> &[MediaConfig] {
        &self.configs[kind.index()]
    }

    pub fn config(&self, kind: ConfigKind, token: &str) -> Option<&MediaConfig> {
        self.configs[kind.index()].iter().find(|c| c.token == token)
    }

    pub fn config_mut(&mut self, kind: ConfigKind, token: &str) -> Option<&mut MediaConfig> {
        self.configs[kind.index()].iter_mut().find(|c| c.token == token)
    }

    /// The configuration of `kind` used by `profile`.
    pub fn profile_config(&self, profile: &Profile, kind: ConfigKind) -> Option<&MediaConfig> {
        profile.config(kind).and_then(|t| self.config(kind, t))
    }

    /// Create an empty profile. A random token is drawn when none is given.
    pub fn create_profile(&mut self, name: &str, token: Option<&str>) -> Result<&Profile, MediaError> {
        if token.is_some_and(|t| self.profile(t).is_some()) {
            return Err(MediaError::ProfileExists);
        }
        if self.profiles.len() >= MAX_PROFILES {
            return Err(MediaError::MaxProfiles);
        }
        let token = match token {
            Some(t) => t.to_string(),
            None => random_token(PROFILE_TOKEN_LEN),
        };
        tracing::info!(token = %token, name, "profile created");
        self.profiles.push(Profile {
            token,
            name: name.to_string(),
            fixed: false,
            configs: Default::default(),
        });
        let idx = self.profiles.len() - 1;
        Ok(&self.profiles[idx])
    }

    pub fn delete_profile(&mut self, token: &str) -> Result<(), MediaError> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.token == token)
            .ok_or(MediaError::NoProfile)?;
        if self.profiles[idx].fixed {
            return Err(MediaError::FixedProfile);
        }
        let profile = self.profiles.remove(idx);
        for kind in ConfigKind::ALL {
            if let Some(t) = profile.config(kind) {
                self.release(kind, t);
            }
        }
        tracing::info!(token, "profile deleted");
        Ok(())
    }

    /// Point `profile` at configuration `config` of `kind`.
    pub fn add_config(&mut self, profile: &str, kind: ConfigKind, config: &str) -> Result<(), MediaError> {
        let p = self
            .profiles
            .iter()
            .position(|p| p.token == profile)
            .ok_or(MediaError::NoProfile)?;
        if self.config(kind, config).is_none() {
            return Err(MediaError::NoConfig);
        }
        if self.profiles[p].config(kind) == Some(config) {
            return Ok(());
        }
        if let Some(c) = self.config_mut(kind, config) {
            c.use_count += 1;
        }
        let previous = self.profiles[p].configs[kind.index()].replace(config.to_string());
        if let Some(previous) = previous {
            self.release(kind, &previous);
        }
        Ok(())
    }

    /// Drop the configuration of `kind` from `profile`, if it has one.
    pub fn remove_config(&mut self, profile: &str, kind: ConfigKind) -> Result<(), MediaError> {
        let p = self
            .profiles
            .iter_mut()
            .find(|p| p.token == profile)
            .ok_or(MediaError::NoProfile)?;
        if let Some(previous) = p.configs[kind.index()].take() {
            self.release(kind, &previous);
        }
        Ok(())
    }

    fn release(&mut self, kind: ConfigKind, token: &str) {
        if let Some(c) = self.config_mut(kind, token) {
            c.use_count = c.use_count.saturating_sub(1);
        }
    }
}

/// Shared handle to the media state.
#[derive(Debug)]
pub struct MediaStore {
    inner: Mutex<Media>,
}

impl Default for MediaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaStore {
    pub fn new() -> Self {
        MediaStore {
            inner: Mutex::new(Media::standard()),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&Media) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Media) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
