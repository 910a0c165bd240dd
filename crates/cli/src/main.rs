use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use onvif::{Config, Server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "onvif-server",
    version,
    about = "ONVIF device server: SOAP services, WS-Discovery and RTSP"
)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Directory holding the users and scopes files
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Address to bind every listener on
    #[arg(long, short)]
    bind: Option<IpAddr>,

    /// Address advertised in XAddrs and stream URIs
    #[arg(long)]
    local_ip: Option<IpAddr>,

    #[arg(long)]
    http_port: Option<u16>,

    #[arg(long)]
    rtsp_port: Option<u16>,

    /// Accept unauthenticated SOAP and RTSP requests
    #[arg(long)]
    no_auth: bool,

    /// Do not answer probes or send Hello/Bye
    #[arg(long)]
    hidden: bool,

    /// Offer the synthetic video track alongside audio
    #[arg(long)]
    fake_video: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(dir) = self.config_dir {
            config.config_path = dir;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(ip) = self.local_ip {
            config.local_ip = ip;
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if let Some(port) = self.rtsp_port {
            config.rtsp_port = port;
        }
        if self.no_auth {
            config.auth_enabled = false;
        }
        if self.hidden {
            config.discoverable = false;
        }
        if self.fake_video {
            config.fake_video = true;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;
    let (http, rtsp) = (config.xaddr("/onvif/device_service"), config.stream_uri());

    let mut server = Server::new(config).context("opening device state")?;
    server.start().context("starting server")?;

    println!("ONVIF device at {http}, stream at {rtsp}. Press Enter to stop");

    // Enter or EOF on stdin.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut input = String::new();
        let _ = io::stdin().read_line(&mut input);
        let _ = tx.send(());
    });

    while server.is_running() {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    if !server.is_running() {
        tracing::info!("device rebooted, exiting");
    }
    server.stop();
    Ok(())
}
