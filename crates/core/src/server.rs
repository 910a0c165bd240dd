use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{OnvifError, Result};
use crate::media::{LoggingBackend, MediaBackend};
use crate::service::{Context, ServerEvent};
use crate::session::SessionManager;
use crate::transport::{DiscoverySocket, http, tcp};

const POLL: Duration = Duration::from_millis(50);
const REAP_INTERVAL: Duration = Duration::from_secs(1);
const REBOOT_DELAY: Duration = Duration::from_secs(3);

/// High-level ONVIF device orchestrator.
///
/// Owns the shared [`Context`] and the RTSP [`SessionManager`], and runs
/// five threads while started:
///
/// - SOAP over HTTP on `bind_addr:http_port` ([`http`]).
/// - RTSP on `bind_addr:rtsp_port` ([`tcp`]).
/// - WS-Discovery on `bind_addr:discovery_port` ([`DiscoverySocket`]).
/// - A reaper expiring idle RTSP sessions.
/// - An event loop turning [`ServerEvent`]s into Hello announcements or a
///   delayed shutdown.
///
/// Hello is multicast on start, Bye on stop.
pub struct Server {
    ctx: Arc<Context>,
    session_manager: SessionManager,
    running: Arc<AtomicBool>,
    discovery: Option<DiscoverySocket>,
    threads: Vec<JoinHandle<()>>,
}

impl Server {
    /// Create a server whose media pipelines only log.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(LoggingBackend::new()))
    }

    /// Create a server driving `backend` from RTSP stream state.
    pub fn with_backend(config: Config, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        let uuid = match &config.device_uuid {
            Some(uuid) => uuid.clone(),
            None => {
                let uuid = uuid::Uuid::new_v4().to_string();
                tracing::info!(device_uuid = %uuid, "generated device UUID");
                uuid
            }
        };
        let session_manager = SessionManager::new(backend, config.session_timeout);
        let ctx = Context::open(Arc::new(config), &uuid)?;

        Ok(Self {
            ctx: Arc::new(ctx),
            session_manager,
            running: Arc::new(AtomicBool::new(false)),
            discovery: None,
            threads: Vec::new(),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(OnvifError::AlreadyRunning);
        }
        // Threads left over from a reboot-triggered shutdown.
        self.join_threads();

        let config = self.ctx.config.clone();
        let http_addr = SocketAddr::new(config.bind_addr, config.http_port);
        let rtsp_addr = SocketAddr::new(config.bind_addr, config.rtsp_port);

        let http_listener = TcpListener::bind(http_addr)?;
        http_listener.set_nonblocking(true)?;
        let rtsp_listener = TcpListener::bind(rtsp_addr)?;
        rtsp_listener.set_nonblocking(true)?;
        let discovery = DiscoverySocket::bind(config.bind_addr, config.discovery_port)?;

        self.running.store(true, Ordering::SeqCst);

        tracing::info!(addr = %http_addr, "SOAP server listening");
        tracing::info!(addr = %rtsp_addr, "RTSP server listening");

        {
            let (ctx, running) = (self.ctx.clone(), self.running.clone());
            self.threads.push(thread::spawn(move || {
                http::serve_http(http_listener, ctx, running);
            }));
        }
        {
            let (ctx, sessions, running) = (
                self.ctx.clone(),
                self.session_manager.clone(),
                self.running.clone(),
            );
            self.threads.push(thread::spawn(move || {
                tcp::serve_rtsp(rtsp_listener, ctx, sessions, running);
            }));
        }
        {
            let (socket, ctx, running) = (discovery.clone(), self.ctx.clone(), self.running.clone());
            self.threads.push(thread::spawn(move || socket.serve(&ctx, &running)));
        }
        {
            let (sessions, running) = (self.session_manager.clone(), self.running.clone());
            self.threads.push(thread::spawn(move || reap(&sessions, &running)));
        }
        {
            let (tx, rx) = mpsc::channel();
            self.ctx.subscribe(tx);
            let (socket, ctx, running) = (discovery.clone(), self.ctx.clone(), self.running.clone());
            self.threads.push(thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(POLL) {
                        Ok(ServerEvent::ScopesChanged) => announce(&ctx, &socket, Announcement::Hello),
                        Ok(ServerEvent::Reboot) => {
                            tracing::info!(delay = ?REBOOT_DELAY, "reboot requested");
                            thread::sleep(REBOOT_DELAY);
                            if running.swap(false, Ordering::SeqCst) {
                                announce(&ctx, &socket, Announcement::Bye);
                                tracing::info!("server stopped for reboot");
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }));
        }

        announce(&self.ctx, &discovery, Announcement::Hello);
        self.discovery = Some(discovery);
        Ok(())
    }

    /// Announce Bye, stop every listener and wait for them to exit.
    /// Established RTSP connections end at their next request.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("server stopping");
            if let Some(socket) = &self.discovery {
                announce(&self.ctx, socket, Announcement::Bye);
            }
        }
        self.ctx.unsubscribe();
        self.join_threads();
        self.discovery = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    fn join_threads(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("server thread panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy)]
enum Announcement {
    Hello,
    Bye,
}

fn announce(ctx: &Context, socket: &DiscoverySocket, kind: Announcement) {
    let msg = match kind {
        Announcement::Hello => ctx.discovery.hello(&ctx.scopes),
        Announcement::Bye => ctx.discovery.bye(&ctx.scopes),
    };
    match msg {
        Ok(Some(msg)) => match socket.announce(&msg) {
            Ok(()) => tracing::debug!(?kind, "announced"),
            Err(e) => tracing::warn!(?kind, error = %e, "announcement failed"),
        },
        Ok(None) => tracing::debug!(?kind, "not discoverable, announcement skipped"),
        Err(e) => tracing::warn!(?kind, error = %e, "announcement not built"),
    }
}

fn reap(sessions: &SessionManager, running: &AtomicBool) {
    let mut last = Instant::now();
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL);
        if last.elapsed() >= REAP_INTERVAL {
            last = Instant::now();
            let expired = sessions.expire(last);
            if expired > 0 {
                tracing::debug!(expired, remaining = sessions.len(), "reaped idle sessions");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir, base: u16) -> Config {
        Config {
            config_path: dir.path().to_path_buf(),
            bind_addr: "127.0.0.1".parse().unwrap(),
            http_port: base,
            rtsp_port: base + 1,
            discovery_port: base + 2,
            discoverable: false,
            device_uuid: Some("5a9c1e7e-0000-4000-8000-0000000000aa".into()),
            ..Config::default()
        }
    }

    #[test]
    fn start_twice_fails_and_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::new(config(&dir, 18710)).unwrap();
        server.start().unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start(), Err(OnvifError::AlreadyRunning)));

        server.stop();
        assert!(!server.is_running());
        server.stop();
    }

    #[test]
    fn reboot_event_stops_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::new(config(&dir, 18720)).unwrap();
        server.start().unwrap();
        server.context().notify(ServerEvent::Reboot);

        let deadline = Instant::now() + REBOOT_DELAY + Duration::from_secs(2);
        while server.is_running() && Instant::now() < deadline {
            thread::sleep(POLL);
        }
        assert!(!server.is_running());
        server.stop();
    }
}
