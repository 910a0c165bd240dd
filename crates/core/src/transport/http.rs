//! SOAP over HTTP/1.1.
//!
//! Every POST body is decoded and handed to the dispatcher:
//!
//! | Outcome | HTTP |
//! |---------|------|
//! | response message | 200 with the envelope |
//! | SOAP fault | 400 with the fault envelope |
//! | body does not decode | 400 with a `WellFormed` fault |
//! | nothing to say (Hello, Bye) | connection closed |
//! | internal failure | connection closed |

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::OnvifError;
use crate::protocol::{Request, Response};
use crate::service::{Context, Reply, dispatch};
use crate::soap::names::HTTP_CONTENT_TYPE;
use crate::soap::{Fault, Message, decode, encode};
use crate::transport::tcp::{accept_loop, read_request};

/// Answer one HTTP request. `None` closes the connection unanswered.
pub(crate) fn respond(ctx: &Context, request: &Request) -> Option<Response> {
    if request.method != "POST" {
        tracing::warn!(method = %request.method, uri = %request.uri, "non-POST SOAP request");
        return Some(Response::http(405, "Method Not Allowed").add_header("Allow", "POST"));
    }

    let msg = match decode(&request.body) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(uri = %request.uri, error = %e, "malformed SOAP request");
            return match Fault::well_formed().to_message() {
                Ok(fault) => soap(400, "Bad Request", &fault),
                Err(e) => internal(e),
            };
        }
    };

    match dispatch(ctx, &msg) {
        Ok(Reply::Message(resp)) => soap(200, "OK", &resp),
        Ok(Reply::Fault(fault)) => soap(400, "Bad Request", &fault),
        Ok(Reply::None) => None,
        Err(e) => internal(e),
    }
}

fn soap(status: u16, text: &str, msg: &Message) -> Option<Response> {
    match encode(msg) {
        Ok(body) => Some(
            Response::http(status, text)
                .add_header("Content-Type", HTTP_CONTENT_TYPE)
                .with_body(body),
        ),
        Err(e) => internal(e),
    }
}

fn internal(e: OnvifError) -> Option<Response> {
    tracing::error!(error = %e, "SOAP request failed, closing unanswered");
    None
}

fn serve_connection(stream: TcpStream, ctx: Arc<Context>, running: Arc<AtomicBool>) {
    let peer: SocketAddr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };
    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(_) => return,
    };
    let mut writer = stream;

    while running.load(Ordering::SeqCst) {
        let request = match read_request(&mut reader) {
            Ok(Some(r)) => r,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "bad HTTP request");
                let resp = Response::http(400, "Bad Request").with_body(Vec::new());
                let _ = writer.write_all(&resp.serialize());
                break;
            }
        };

        tracing::debug!(%peer, uri = %request.uri, len = request.body.len(), "SOAP request");
        let Some(response) = respond(&ctx, &request) else {
            break;
        };
        tracing::debug!(%peer, status = response.status_code, "SOAP response");

        if writer.write_all(&response.serialize()).is_err() {
            break;
        }
        if request
            .get_header("Connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
        {
            break;
        }
    }
    tracing::trace!(%peer, "HTTP connection closed");
}

/// Serve SOAP on `listener` until `running` is cleared.
pub fn serve_http(listener: TcpListener, ctx: Arc<Context>, running: Arc<AtomicBool>) {
    accept_loop(listener, running, move |stream, running| {
        serve_connection(stream, ctx.clone(), running);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::fixture_with;

    fn post(body: &str) -> Request {
        let mut req = Request::parse(&format!(
            "POST /onvif/device_service HTTP/1.1\r\nContent-Type: {HTTP_CONTENT_TYPE}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        ))
        .unwrap();
        req.body = body.as_bytes().to_vec();
        req
    }

    fn envelope(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:trt="http://www.onvif.org/ver10/media/wsdl"><s:Body>{inner}</s:Body></s:Envelope>"#
        )
    }

    fn body(resp: &Response) -> String {
        String::from_utf8(resp.body.clone().unwrap_or_default()).unwrap()
    }

    #[test]
    fn answers_with_200() {
        let f = fixture_with(|c| c.auth_enabled = false);
        let resp = respond(&f.ctx, &post(&envelope("<tds:GetHostname/>"))).unwrap();
        assert_eq!(resp.status_code, 200);
        assert!(body(&resp).contains("GetHostnameResponse"));
        assert!(
            resp.headers
                .iter()
                .any(|(k, v)| k == "Content-Type" && v == HTTP_CONTENT_TYPE)
        );
    }

    #[test]
    fn faults_are_400() {
        let f = fixture_with(|c| c.auth_enabled = false);
        let resp = respond(&f.ctx, &post(&envelope("<tds:Frobnicate/>"))).unwrap();
        assert_eq!(resp.status_code, 400);
        assert!(body(&resp).contains("UnknownAction"));

        let resp = respond(&f.ctx, &post("<not xml")).unwrap();
        assert_eq!(resp.status_code, 400);
        assert!(body(&resp).contains("WellFormed"));
    }

    #[test]
    fn internal_failures_close_unanswered() {
        let f = fixture_with(|c| c.auth_enabled = false);
        assert!(respond(&f.ctx, &post(&envelope("<trt:DeleteProfile/>"))).is_none());
    }

    #[test]
    fn connection_closes_without_a_response() {
        use std::io::Read;
        use std::time::Duration;

        let f = fixture_with(|c| c.auth_enabled = false);
        let ctx = Arc::new(f.ctx);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let worker = {
            let (ctx, running) = (ctx.clone(), running.clone());
            std::thread::spawn(move || serve_http(listener, ctx, running))
        };

        let body = envelope("<trt:DeleteProfile/>");
        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        client
            .write_all(
                format!(
                    "POST /onvif/media_service HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                )
                .as_bytes(),
            )
            .unwrap();
        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();
        assert!(received.is_empty());

        running.store(false, Ordering::SeqCst);
        worker.join().unwrap();
    }

    #[test]
    fn only_post() {
        let f = fixture_with(|_| {});
        let req = Request::parse("GET /onvif/device_service HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(respond(&f.ctx, &req).unwrap().status_code, 405);
    }
}
