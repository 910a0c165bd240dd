//! SOAP decoder.
//!
//! Turns raw bytes into a [`Message`]. The parser is iterative: open
//! elements are tracked on an explicit stack bounded by
//! [`SOAP_MAX_STACKSIZE`], so attacker-controlled nesting fails with
//! [`DecodeErrorKind::StackOverflow`] instead of growing without limit.
//!
//! Each tag is classified as one of five tokens (open, open with
//! attributes, close, self-close, self-close with attributes). Attributes
//! are decoded before the element name so that an `xmlns` declaration on
//! the element itself can resolve its prefix.

use crate::buf::Cursor;
use crate::error::{DecodeErrorKind, OnvifError, Result};
use crate::soap::model::{ElementId, Message, NsId, ParamNs, Parameter};
use crate::soap::names;

/// Maximum element nesting depth, envelope included.
pub const SOAP_MAX_STACKSIZE: usize = 10;

/// Longest accepted prefix on a namespace-qualified attribute.
const MAX_ATTR_PREFIX_LEN: usize = 10;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open { name: &'a str },
    OpenAttrs { name: &'a str, attrs: &'a str },
    Close { name: &'a str },
    SelfClose { name: &'a str },
    SelfCloseAttrs { name: &'a str, attrs: &'a str },
}

struct OpenElement<'a> {
    id: ElementId,
    name: &'a str,
    /// Length of `bindings` before this element's declarations.
    scope: usize,
}

struct Decoder<'a> {
    text: &'a str,
    cur: Cursor<'a>,
    msg: Message,
    /// Prefix bindings in scope, innermost last.
    bindings: Vec<(&'a str, NsId)>,
    stack: Vec<OpenElement<'a>>,
    root_closed: bool,
}

fn err(kind: DecodeErrorKind) -> OnvifError {
    OnvifError::decode(kind)
}

/// Decode a complete SOAP document.
///
/// Any malformed token, unresolved prefix or unbalanced nesting fails the
/// whole decode; no partial tree is returned.
pub fn decode(input: &[u8]) -> Result<Message> {
    let text = std::str::from_utf8(input).map_err(|_| err(DecodeErrorKind::NotUtf8))?;

    let mut cur = Cursor::new(text.as_bytes());
    cur.eat(UTF8_BOM);
    cur.skip_whitespace();

    let prolog = if cur.starts_with(b"<?") {
        let start = cur.pos();
        cur.advance(2);
        cur.take_through(b"?>")
            .ok_or(err(DecodeErrorKind::Prolog))?;
        text.get(start..cur.pos())
            .ok_or(err(DecodeErrorKind::Prolog))?
            .to_string()
    } else {
        String::new()
    };

    let mut decoder = Decoder {
        text,
        cur,
        msg: Message::for_decode(input.to_vec(), prolog),
        bindings: Vec::new(),
        stack: Vec::with_capacity(SOAP_MAX_STACKSIZE),
        root_closed: false,
    };
    decoder.run()?;
    Ok(decoder.msg)
}

impl<'a> Decoder<'a> {
    fn run(&mut self) -> Result<()> {
        loop {
            self.skip_misc()?;
            if self.cur.is_at_end() {
                break;
            }
            if self.cur.peek() != Some(b'<') {
                return Err(err(DecodeErrorKind::InvalidToken));
            }
            self.cur.advance(1);
            let inner = self.read_tag()?;

            match classify(inner)? {
                Token::Close { name } => self.close(name)?,
                Token::Open { name } => self.open(name, "", false)?,
                Token::OpenAttrs { name, attrs } => self.open(name, attrs, false)?,
                Token::SelfClose { name } => self.open(name, "", true)?,
                Token::SelfCloseAttrs { name, attrs } => self.open(name, attrs, true)?,
            }
        }

        if !self.stack.is_empty() {
            return Err(err(DecodeErrorKind::UnbalancedStack));
        }
        if !self.root_closed {
            return Err(err(DecodeErrorKind::UnexpectedEof));
        }
        Ok(())
    }

    /// Skip whitespace and `<!-- comments -->` between tokens.
    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.cur.skip_whitespace();
            if !self.cur.eat(b"<!--") {
                return Ok(());
            }
            self.cur
                .take_through(b"-->")
                .ok_or(err(DecodeErrorKind::UnexpectedEof))?;
        }
    }

    /// Text between `<` and the matching `>`, honouring quoted values.
    fn read_tag(&mut self) -> Result<&'a str> {
        let start = self.cur.pos();
        let mut quote: Option<u8> = None;
        loop {
            let b = self
                .cur
                .next_byte()
                .ok_or(err(DecodeErrorKind::UnexpectedEof))?;
            match (quote, b) {
                (None, b'"' | b'\'') => quote = Some(b),
                (Some(q), _) if q == b => quote = None,
                (None, b'>') => break,
                (None, b'<') => return Err(err(DecodeErrorKind::InvalidToken)),
                _ => {}
            }
        }
        self.text
            .get(start..self.cur.pos() - 1)
            .ok_or(err(DecodeErrorKind::InvalidToken))
    }

    fn open(&mut self, name: &'a str, attrs: &'a str, self_closing: bool) -> Result<()> {
        if self.root_closed {
            return Err(err(DecodeErrorKind::InvalidToken));
        }
        if self.stack.len() >= SOAP_MAX_STACKSIZE {
            return Err(err(DecodeErrorKind::StackOverflow));
        }

        let (prefix, key) = match name.split_once(':') {
            Some((p, k)) => (Some(p), k),
            None => (None, name),
        };
        if key.is_empty() || prefix.is_some_and(str::is_empty) {
            return Err(err(DecodeErrorKind::EmptyElement));
        }

        let scope = self.bindings.len();
        let attributes = parse_attributes(attrs)?;
        let (default_ns, params) = self.decode_attributes(&attributes)?;

        let parent = self.stack.last().map(|o| o.id);
        let ns = match prefix {
            Some(p) => self.resolve(p)?,
            None => default_ns
                .or_else(|| parent.map(|p| self.msg[p].ns()))
                .ok_or(err(DecodeErrorKind::MissingNamespace))?,
        };

        let id = self.msg.push_element(parent, ns, key);
        for param in params {
            self.msg.push_parameter(id, param);
        }

        if self_closing {
            self.bindings.truncate(scope);
            if parent.is_none() {
                self.root_closed = true;
            }
            return Ok(());
        }

        let span = self.cur.take_while_not(|b| b == b'<');
        let raw = span
            .as_str(self.text)
            .ok_or(err(DecodeErrorKind::InvalidToken))?
            .trim();
        if !raw.is_empty() {
            self.msg.set_value(id, unescape(raw));
        }

        self.stack.push(OpenElement { id, name, scope });
        Ok(())
    }

    fn close(&mut self, name: &'a str) -> Result<()> {
        let open = self
            .stack
            .pop()
            .ok_or(err(DecodeErrorKind::UnbalancedStack))?;
        if open.name != name {
            tracing::debug!(expected = open.name, found = name, "mismatched close tag");
            return Err(err(DecodeErrorKind::InvalidToken));
        }
        self.bindings.truncate(open.scope);
        if self.stack.is_empty() {
            self.root_closed = true;
        }
        Ok(())
    }

    /// Two passes: declarations first, so qualified attributes on the same
    /// element may use a prefix declared after them.
    fn decode_attributes(
        &mut self,
        attributes: &[(&'a str, String)],
    ) -> Result<(Option<NsId>, Vec<Parameter>)> {
        let mut default_ns = None;
        let mut params = Vec::with_capacity(attributes.len());

        for (name, value) in attributes {
            let declared = if *name == "xmlns" {
                let ns = self.msg.register_ns("", value);
                default_ns = Some(ns);
                ns
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                if prefix.is_empty() {
                    return Err(err(DecodeErrorKind::InvalidAttribute));
                }
                let ns = self.msg.register_ns(prefix, value);
                self.bindings.push((prefix, ns));
                ns
            } else {
                continue;
            };

            let canonical = self.msg.namespace(declared).prefix.clone();
            if !params
                .iter()
                .any(|p: &Parameter| p.ns == ParamNs::Declaration && p.key == canonical)
            {
                params.push(Parameter {
                    ns: ParamNs::Declaration,
                    key: canonical,
                    value: value.clone(),
                });
            }
        }

        for (name, value) in attributes {
            if *name == "xmlns" || name.starts_with("xmlns:") {
                continue;
            }
            let param = match name.split_once(':') {
                Some((prefix, local)) => {
                    if prefix.len() > MAX_ATTR_PREFIX_LEN {
                        return Err(err(DecodeErrorKind::PrefixTooLong));
                    }
                    if prefix.is_empty() || local.is_empty() {
                        return Err(err(DecodeErrorKind::InvalidAttribute));
                    }
                    Parameter {
                        ns: ParamNs::Qualified(self.resolve(prefix)?),
                        key: local.to_string(),
                        value: value.clone(),
                    }
                }
                None => Parameter {
                    ns: ParamNs::Plain,
                    key: name.to_string(),
                    value: value.clone(),
                },
            };
            params.push(param);
        }

        Ok((default_ns, params))
    }

    fn resolve(&mut self, prefix: &str) -> Result<NsId> {
        if let Some((_, ns)) = self.bindings.iter().rev().find(|(p, _)| *p == prefix) {
            return Ok(*ns);
        }
        if prefix == names::XML.prefix {
            return Ok(self.msg.register_ns(names::XML.prefix, names::XML.uri));
        }
        Err(err(DecodeErrorKind::UnknownPrefix))
    }
}

fn classify(inner: &str) -> Result<Token<'_>> {
    if let Some(rest) = inner.strip_prefix('/') {
        let name = rest.trim_end();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(err(DecodeErrorKind::EmptyElement));
        }
        return Ok(Token::Close { name });
    }
    if inner.starts_with('!') || inner.starts_with('?') {
        return Err(err(DecodeErrorKind::InvalidToken));
    }

    let (body, self_closing) = match inner.strip_suffix('/') {
        Some(b) => (b, true),
        None => (inner, false),
    };

    let name_end = body.find(|c: char| c.is_ascii_whitespace()).unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() {
        return Err(err(DecodeErrorKind::EmptyElement));
    }
    let attrs = body[name_end..].trim();

    Ok(match (self_closing, attrs.is_empty()) {
        (false, true) => Token::Open { name },
        (false, false) => Token::OpenAttrs { name, attrs },
        (true, true) => Token::SelfClose { name },
        (true, false) => Token::SelfCloseAttrs { name, attrs },
    })
}

/// Split `a="1" b:c='2'` into `(name, unescaped value)` pairs.
fn parse_attributes(attrs: &str) -> Result<Vec<(&str, String)>> {
    let mut out = Vec::new();
    let mut cur = Cursor::new(attrs.as_bytes());

    loop {
        cur.skip_whitespace();
        if cur.is_at_end() {
            break;
        }
        let name_span = cur.take_while_not(|b| b == b'=' || b.is_ascii_whitespace());
        let name = name_span
            .as_str(attrs)
            .filter(|n| !n.is_empty())
            .ok_or(err(DecodeErrorKind::InvalidAttribute))?;

        cur.skip_whitespace();
        if !cur.eat(b"=") {
            return Err(err(DecodeErrorKind::InvalidAttribute));
        }
        cur.skip_whitespace();

        let quote = match cur.next_byte() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(err(DecodeErrorKind::InvalidAttribute)),
        };
        let value_span = cur
            .take_until(quote)
            .ok_or(err(DecodeErrorKind::InvalidAttribute))?;
        cur.advance(1);
        let value = value_span
            .as_str(attrs)
            .ok_or(err(DecodeErrorKind::InvalidAttribute))?;

        out.push((name, unescape(value)));
    }

    Ok(out)
}

/// Replace the predefined XML entities and numeric character references.
/// Unknown entities are kept verbatim.
pub fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let replacement = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };

        match replacement {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::names::{DEVICE, ENVELOPE};

    const GET_HOSTNAME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <GetHostname xmlns="http://www.onvif.org/ver10/device/wsdl"/>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn decodes_envelope_body_and_method() {
        let msg = decode(GET_HOSTNAME.as_bytes()).unwrap();
        assert_eq!(msg.prolog(), r#"<?xml version="1.0" encoding="UTF-8"?>"#);

        let env = msg.envelope();
        assert_eq!(msg[env].key(), "Envelope");
        assert_eq!(msg.namespace(msg[env].ns()).uri, ENVELOPE.uri);

        let body = msg.body().unwrap();
        let method = msg.find_child(body, None, "GetHostname").unwrap();
        assert_eq!(msg.namespace(msg[method].ns()).uri, DEVICE.uri);
        assert!(msg.has_ns_uri(DEVICE.uri));
        assert_eq!(msg.value(method), None);
    }

    #[test]
    fn unprefixed_child_inherits_parent_namespace() {
        let xml = r#"<s:Envelope xmlns:s="urn:s"><s:Body><Inner>1</Inner></s:Body></s:Envelope>"#;
        let msg = decode(xml.as_bytes()).unwrap();
        let inner = msg.find_path(msg.envelope(), &["Body", "Inner"]).unwrap();
        assert_eq!(msg.namespace(msg[inner].ns()).uri, "urn:s");
        assert_eq!(msg.value(inner), Some("1"));
    }

    #[test]
    fn attributes_plain_and_qualified() {
        let xml = r#"<e:Envelope xmlns:e="urn:e" xmlns:wsse="urn:wsse"><e:Body><e:Pw Type="digest" wsse:x='1' xml:lang="en">abc</e:Pw></e:Body></e:Envelope>"#;
        let msg = decode(xml.as_bytes()).unwrap();
        let pw = msg.find_path(msg.envelope(), &["Body", "Pw"]).unwrap();
        assert_eq!(msg.find_parameter(pw, "Type").unwrap().value, "digest");
        assert!(matches!(
            msg.find_parameter(pw, "x").unwrap().ns,
            ParamNs::Qualified(_)
        ));
        assert!(msg.has_ns_uri(names::XML.uri));
    }

    #[test]
    fn whitespace_only_value_is_none_and_entities_unescape() {
        let xml = "<a:E xmlns:a=\"urn:a\"><a:V>  \n </a:V><a:T> x &amp; y &lt;z&gt; &#65;&#x42; </a:T></a:E>";
        let msg = decode(xml.as_bytes()).unwrap();
        let env = msg.envelope();
        let v = msg.find_child(env, None, "V").unwrap();
        let t = msg.find_child(env, None, "T").unwrap();
        assert_eq!(msg.value(v), None);
        assert_eq!(msg.value(t), Some("x & y <z> AB"));
    }

    #[test]
    fn comments_are_skipped() {
        let xml = "<!-- lead --><a:E xmlns:a=\"urn:a\"><!-- inner --><a:V>1</a:V></a:E><!-- tail -->";
        let msg = decode(xml.as_bytes()).unwrap();
        assert_eq!(msg.child_value(msg.envelope(), "V"), Some("1"));
    }

    #[test]
    fn unknown_prefix_fails() {
        let xml = r#"<a:E xmlns:a="urn:a"><b:X/></a:E>"#;
        let e = decode(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            e,
            OnvifError::Decode {
                kind: DecodeErrorKind::UnknownPrefix
            }
        ));
    }

    #[test]
    fn prefixes_do_not_leak_to_siblings() {
        let nested = r#"<a:E xmlns:a="urn:a"><a:P xmlns:b="urn:b"><b:X/></a:P></a:E>"#;
        assert!(decode(nested.as_bytes()).is_ok());

        for xml in [
            r#"<a:E xmlns:a="urn:a"><a:P xmlns:b="urn:b"></a:P><b:X/></a:E>"#,
            r#"<a:E xmlns:a="urn:a"><a:P xmlns:b="urn:b"/><b:X/></a:E>"#,
        ] {
            let e = decode(xml.as_bytes()).unwrap_err();
            assert!(matches!(
                e,
                OnvifError::Decode {
                    kind: DecodeErrorKind::UnknownPrefix
                }
            ));
        }
    }

    #[test]
    fn root_without_namespace_fails() {
        let e = decode(b"<Envelope/>").unwrap_err();
        assert!(matches!(
            e,
            OnvifError::Decode {
                kind: DecodeErrorKind::MissingNamespace
            }
        ));
    }

    #[test]
    fn long_attribute_prefix_fails() {
        let xml = r#"<a:E xmlns:a="urn:a" xmlns:abcdefghijk="urn:b" abcdefghijk:x="1"/>"#;
        let e = decode(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            e,
            OnvifError::Decode {
                kind: DecodeErrorKind::PrefixTooLong
            }
        ));
    }

    #[test]
    fn nesting_beyond_limit_overflows() {
        let depth = SOAP_MAX_STACKSIZE + 1;
        let mut xml = String::from(r#"<a:L0 xmlns:a="urn:a">"#);
        for i in 1..depth {
            xml.push_str(&format!("<a:L{i}>"));
        }
        for i in (0..depth).rev() {
            xml.push_str(&format!("</a:L{i}>"));
        }
        let e = decode(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            e,
            OnvifError::Decode {
                kind: DecodeErrorKind::StackOverflow
            }
        ));
    }

    #[test]
    fn nesting_at_limit_decodes() {
        let mut xml = String::from(r#"<a:L0 xmlns:a="urn:a">"#);
        for i in 1..SOAP_MAX_STACKSIZE {
            xml.push_str(&format!("<a:L{i}>"));
        }
        for i in (0..SOAP_MAX_STACKSIZE).rev() {
            xml.push_str(&format!("</a:L{i}>"));
        }
        assert!(decode(xml.as_bytes()).is_ok());
    }

    #[test]
    fn unbalanced_and_mismatched_documents_fail() {
        assert!(decode(br#"<a:E xmlns:a="urn:a"><a:B>"#).is_err());
        assert!(decode(br#"<a:E xmlns:a="urn:a"></a:B>"#).is_err());
        assert!(decode(br#"<a:E xmlns:a="urn:a"/></a:E>"#).is_err());
        assert!(decode(br#"<a:E xmlns:a="urn:a"/><a:E/>"#).is_err());
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        let full = GET_HOSTNAME.as_bytes();
        for cut in [0, 10, 45, 100, full.len() - 1] {
            assert!(decode(&full[..cut]).is_err(), "cut at {cut}");
        }
        assert!(decode(b"<?xml version=\"1.0\"").is_err());
        assert!(decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn stray_text_and_doctype_are_rejected() {
        assert!(decode(br#"junk<a:E xmlns:a="urn:a"/>"#).is_err());
        assert!(decode(br#"<!DOCTYPE x><a:E xmlns:a="urn:a"/>"#).is_err());
        assert!(decode(br#"<a:E xmlns:a="urn:a" broken/>"#).is_err());
    }
}
