//! SOAP encoder.
//!
//! Two passes over the same writer code: the first only counts bytes, the
//! second writes into a buffer allocated with exactly that capacity.

use crate::error::{OnvifError, Result};
use crate::soap::model::{ElementId, Message, ParamNs};

/// Hard ceiling for an encoded message.
pub const SOAP_MAX_MSG_SIZE: usize = 10240;

trait Sink {
    fn put(&mut self, s: &str);
}

struct Counter(usize);

impl Sink for Counter {
    fn put(&mut self, s: &str) {
        self.0 += s.len();
    }
}

impl Sink for Vec<u8> {
    fn put(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
    }
}

/// Exact size of the encoded message in bytes.
pub fn encoded_len(msg: &Message) -> usize {
    let mut counter = Counter(0);
    write_message(msg, &mut counter);
    counter.0
}

/// Serialize a message. Fails with [`OnvifError::MessageTooLarge`] when the
/// output would reach [`SOAP_MAX_MSG_SIZE`].
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    let size = encoded_len(msg);
    if size >= SOAP_MAX_MSG_SIZE {
        return Err(OnvifError::MessageTooLarge { size });
    }

    let mut out = Vec::with_capacity(size);
    write_message(msg, &mut out);
    debug_assert_eq!(out.len(), size);
    Ok(out)
}

fn write_message<S: Sink>(msg: &Message, sink: &mut S) {
    sink.put(msg.prolog());
    write_element(msg, msg.envelope(), sink);
}

fn write_element<S: Sink>(msg: &Message, id: ElementId, sink: &mut S) {
    let el = &msg[id];
    let prefix = &msg.namespace(el.ns()).prefix;

    sink.put("<");
    sink.put(prefix);
    sink.put(":");
    sink.put(el.key());

    for param in el.params() {
        sink.put(" ");
        match param.ns {
            ParamNs::Plain => {}
            ParamNs::Qualified(ns) => {
                sink.put(&msg.namespace(ns).prefix);
                sink.put(":");
            }
            ParamNs::Declaration if param.key.is_empty() => sink.put("xmlns"),
            ParamNs::Declaration => sink.put("xmlns:"),
        }
        sink.put(&param.key);
        sink.put("=\"");
        escape(&param.value, true, sink);
        sink.put("\"");
    }

    if el.children().is_empty() && el.value().is_none() {
        sink.put("/>");
        return;
    }
    sink.put(">");

    if let Some(value) = el.value() {
        escape(value, false, sink);
    }
    for &child in el.children() {
        write_element(msg, child, sink);
    }

    sink.put("</");
    sink.put(prefix);
    sink.put(":");
    sink.put(el.key());
    sink.put(">");
}

fn escape<S: Sink>(s: &str, attribute: bool, sink: &mut S) {
    let mut last = 0;
    for (i, c) in s.char_indices() {
        let entity = match c {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' if attribute => "&quot;",
            _ => continue,
        };
        sink.put(&s[last..i]);
        sink.put(entity);
        last = i + c.len_utf8();
    }
    sink.put(&s[last..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::decode::decode;
    use crate::soap::names::{DEVICE, SCHEMA};

    fn hostname_response() -> Message {
        let (mut msg, body) = Message::with_body(&[DEVICE, SCHEMA]).unwrap();
        let resp = msg.add_child(body, "tds", "GetHostnameResponse").unwrap();
        let info = msg.add_child(resp, "tds", "HostnameInformation").unwrap();
        msg.add_leaf(info, "tt", "FromDHCP", false).unwrap();
        msg.add_leaf(info, "tt", "Name", "cam<1>&co").unwrap();
        msg.add_parameter(info, "note", "a \"quoted\" value");
        msg
    }

    #[test]
    fn writes_self_closing_and_qualified_names() {
        let (mut msg, body) = Message::with_body(&[DEVICE]).unwrap();
        msg.add_child(body, "tds", "SystemRebootResponse").unwrap();
        let out = String::from_utf8(encode(&msg).unwrap()).unwrap();
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="#));
        assert!(out.contains("<soapenv:Body><tds:SystemRebootResponse/></soapenv:Body>"));
        assert!(out.ends_with("</soapenv:Envelope>"));
    }

    #[test]
    fn size_pass_matches_output_with_escapes() {
        let msg = hostname_response();
        let out = encode(&msg).unwrap();
        assert_eq!(out.len(), encoded_len(&msg));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<tt:Name>cam&lt;1&gt;&amp;co</tt:Name>"));
        assert!(text.contains(r#"note="a &quot;quoted&quot; value""#));
    }

    #[test]
    fn decode_of_encode_preserves_structure() {
        let msg = hostname_response();
        let back = decode(&encode(&msg).unwrap()).unwrap();

        assert_eq!(back.element_count(), msg.element_count());
        assert_eq!(back.namespaces().len(), msg.namespaces().len());
        let info = back
            .find_path(back.envelope(), &["Body", "GetHostnameResponse", "HostnameInformation"])
            .unwrap();
        assert_eq!(back.child_value(info, "FromDHCP"), Some("false"));
        assert_eq!(back.child_value(info, "Name"), Some("cam<1>&co"));
        assert_eq!(back.find_parameter(info, "note").unwrap().value, "a \"quoted\" value");
        assert_eq!(back.qualified_name(info), "tds:HostnameInformation");
    }

    #[test]
    fn decoded_default_namespace_reencodes_with_generated_prefix() {
        let xml = r#"<s:Envelope xmlns:s="urn:s"><s:Body><Probe xmlns="urn:d"/></s:Body></s:Envelope>"#;
        let msg = decode(xml.as_bytes()).unwrap();
        let again = decode(&encode(&msg).unwrap()).unwrap();
        let probe = again.find_path(again.envelope(), &["Body", "Probe"]).unwrap();
        assert_eq!(again.namespace(again[probe].ns()).uri, "urn:d");
    }

    #[test]
    fn oversized_message_is_rejected() {
        let (mut msg, body) = Message::with_body(&[SCHEMA]).unwrap();
        msg.add_leaf(body, "tt", "Blob", "x".repeat(SOAP_MAX_MSG_SIZE)).unwrap();
        let err = encode(&msg).unwrap_err();
        assert!(matches!(err, OnvifError::MessageTooLarge { size } if size > SOAP_MAX_MSG_SIZE));
    }
}
