use std::io::{BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{OnvifError, ParseErrorKind, Result};
use crate::protocol::request::MAX_HEAD_LEN;
use crate::protocol::{MethodHandler, Request};
use crate::service::Context;
use crate::session::SessionManager;
use crate::transport::interleaved::{FRAME_MAGIC, SharedWriter, read_frame};

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// `on_connection` runs on a fresh thread per client.
pub fn accept_loop<F>(listener: TcpListener, running: Arc<AtomicBool>, on_connection: F)
where
    F: Fn(TcpStream, Arc<AtomicBool>) + Clone + Send + 'static,
{
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let r = running.clone();
                let handle = on_connection.clone();
                thread::spawn(move || handle(stream, r));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Read one request head (through the blank line) and its body.
/// `Ok(None)` when the peer closed the connection. A head longer than
/// [`MAX_HEAD_LEN`] is rejected without being buffered whole.
pub(crate) fn read_request(reader: &mut impl BufRead) -> Result<Option<Request>> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        let budget = (MAX_HEAD_LEN - head.len()) as u64 + 1;
        if reader.by_ref().take(budget).read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if head.len() + line.len() > MAX_HEAD_LEN {
            return Err(OnvifError::Parse {
                kind: ParseErrorKind::HeadTooLong,
            });
        }
        if line == "\r\n" || line == "\n" {
            if head.is_empty() {
                continue;
            }
            break;
        }
        head.push_str(&line);
    }

    let mut request = Request::parse(&head)?;
    let len = request.content_length()?;
    if len > 0 {
        request.body = vec![0u8; len];
        reader.read_exact(&mut request.body)?;
    }
    Ok(Some(request))
}

/// A single RTSP client connection with its own lifecycle.
///
/// Text requests and `$`-framed interleaved data share the stream; the
/// first byte of each message tells them apart.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: SharedWriter,
    handler: MethodHandler,
    session_manager: SessionManager,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        ctx: Arc<Context>,
        session_manager: SessionManager,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "RTSP client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let writer = SharedWriter::new(stream);
        let handler = MethodHandler::new(
            ctx,
            session_manager.clone(),
            peer_addr,
            Arc::new(writer.clone()),
        );

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer,
            handler,
            session_manager,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.cleanup();

        tracing::info!(%peer_addr, reason, "RTSP client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let first = match self.reader.fill_buf() {
                Ok([]) => return "connection closed by client",
                Ok(buf) => buf[0],
                Err(_) => return "read error",
            };

            if first == FRAME_MAGIC {
                self.reader.consume(1);
                match read_frame(&mut self.reader) {
                    Ok((channel, payload)) => {
                        if let Err(e) = self.session_manager.deliver(channel, &payload) {
                            tracing::warn!(peer = %self.peer_addr, channel, error = %e, "unroutable interleaved frame");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(peer = %self.peer_addr, error = %e, "interleaved read failed");
                        return "read error";
                    }
                }
                continue;
            }

            let request = match read_request(&mut self.reader) {
                Ok(Some(request)) => request,
                Ok(None) => return "connection closed by client",
                Err(OnvifError::Parse {
                    kind: ParseErrorKind::HeadTooLong,
                }) => return "request head too long",
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    continue;
                }
            };

            tracing::debug!(
                peer = %self.peer_addr,
                method = %request.method,
                uri = %request.uri,
                version = %request.version,
                "request"
            );

            let response = self.handler.handle(&request);

            tracing::debug!(
                peer = %self.peer_addr,
                status = response.status_code,
                "response"
            );

            if self.writer.write_all(&response.serialize()).is_err() {
                return "write error";
            }
        }

        "server shutting down"
    }

    /// Tear down sessions created on this connection.
    fn cleanup(&self) {
        let orphaned = self.handler.session_ids().to_vec();
        if !orphaned.is_empty() {
            let removed = self.session_manager.remove_sessions(&orphaned);
            tracing::info!(peer = %self.peer_addr, removed, "cleaned up sessions on disconnect");
        }
    }
}

/// Serve RTSP on `listener` until `running` is cleared.
pub fn serve_rtsp(
    listener: TcpListener,
    ctx: Arc<Context>,
    session_manager: SessionManager,
    running: Arc<AtomicBool>,
) {
    accept_loop(listener, running, move |stream, running| {
        Connection::handle(stream, ctx.clone(), session_manager.clone(), running);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_head_and_body() {
        let raw = b"\r\nANNOUNCE rtsp://h/stream RTSP/1.0\r\nCSeq: 1\r\nContent-Length: 4\r\n\r\nv=0\nOPTIONS rtsp://h RTSP/1.0\r\nCSeq: 2\r\n\r\n";
        let mut reader = Cursor::new(&raw[..]);

        let first = read_request(&mut reader).unwrap().unwrap();
        assert_eq!(first.method, "ANNOUNCE");
        assert_eq!(first.body, b"v=0\n");

        let second = read_request(&mut reader).unwrap().unwrap();
        assert_eq!(second.cseq(), Some("2"));
        assert!(read_request(&mut reader).unwrap().is_none());
    }

    #[test]
    fn endless_header_line_is_cut_off() {
        let mut raw = b"OPTIONS rtsp://h RTSP/1.0\r\nX-Filler: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_LEN * 4));
        let err = read_request(&mut Cursor::new(raw)).unwrap_err();
        assert!(matches!(
            err,
            OnvifError::Parse {
                kind: ParseErrorKind::HeadTooLong
            }
        ));

        let mut many = b"OPTIONS rtsp://h RTSP/1.0\r\n".to_vec();
        for i in 0..MAX_HEAD_LEN / 16 {
            many.extend(format!("X-{i:05}: value\r\n").as_bytes());
        }
        many.extend(b"\r\n");
        assert!(read_request(&mut Cursor::new(many)).is_err());
    }

    #[test]
    fn short_body_is_an_error() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(read_request(&mut Cursor::new(&raw[..])).is_err());
    }
}
