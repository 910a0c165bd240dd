pub mod auth;
pub mod buf;
pub mod config;
pub mod discovery;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod service;
pub mod session;
pub mod soap;
pub mod transport;

pub use config::Config;
pub use error::{OnvifError, Result};
pub use media::{LoggingBackend, MediaBackend};
pub use server::Server;
