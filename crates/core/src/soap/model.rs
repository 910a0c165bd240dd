//! SOAP document model.
//!
//! A [`Message`] owns every element, parameter and namespace of one SOAP
//! document. Elements live in an arena and refer to each other by
//! [`ElementId`]; namespaces are pooled per message and referenced by
//! [`NsId`]. Child and parameter order is insertion order, which is also the
//! order the encoder writes them in.

use std::fmt;
use std::ops::Index;

use crate::error::{OnvifError, Result};
use crate::soap::names::{self, Ns};

/// Handle to an element of one [`Message`].
///
/// Only meaningful for the message that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

/// Handle to a namespace registered on one [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NsId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

/// Namespace role of a [`Parameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamNs {
    /// `key="value"`
    Plain,
    /// `prefix:key="value"`
    Qualified(NsId),
    /// `xmlns:key="uri"`, or `xmlns="uri"` when the key is empty.
    Declaration,
}

/// An attribute of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub ns: ParamNs,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    ns: NsId,
    key: String,
    value: Option<String>,
    params: Vec<Parameter>,
    children: Vec<ElementId>,
    parent: Option<ElementId>,
}

impl Element {
    pub fn ns(&self) -> NsId {
        self.ns
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }
}

/// One SOAP document: prolog, namespace pool and element tree.
///
/// Exactly one element, the envelope, has no parent.
#[derive(Debug, Clone)]
pub struct Message {
    buffer: Vec<u8>,
    prolog: String,
    namespaces: Vec<Namespace>,
    elements: Vec<Element>,
    envelope: ElementId,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// An empty response skeleton: prolog plus `<soapenv:Envelope>` carrying
    /// its own namespace declaration.
    pub fn new() -> Self {
        let mut msg = Message {
            buffer: Vec::new(),
            prolog: names::PROLOG.to_string(),
            namespaces: Vec::new(),
            elements: Vec::new(),
            envelope: ElementId(0),
        };
        let ns = msg.register_ns(names::ENVELOPE.prefix, names::ENVELOPE.uri);
        msg.envelope = msg.push_element(None, ns, "Envelope");
        msg.push_declaration(msg.envelope, names::ENVELOPE.prefix, names::ENVELOPE.uri);
        msg
    }

    /// Decoder entry: the first element pushed becomes the envelope.
    pub(crate) fn for_decode(buffer: Vec<u8>, prolog: String) -> Self {
        Message {
            buffer,
            prolog,
            namespaces: Vec::new(),
            elements: Vec::new(),
            envelope: ElementId(0),
        }
    }

    /// The raw bytes this message was decoded from. Empty for built messages.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn prolog(&self) -> &str {
        &self.prolog
    }

    pub fn envelope(&self) -> ElementId {
        self.envelope
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn namespace(&self, id: NsId) -> &Namespace {
        &self.namespaces[id.0]
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Register a namespace, unique by URI.
    ///
    /// Re-registering a known URI returns the existing entry and keeps its
    /// original prefix. An empty prefix, or one already bound to another
    /// URI, is replaced by a generated `ns<N>`.
    pub fn register_ns(&mut self, prefix: &str, uri: &str) -> NsId {
        if let Some(pos) = self.namespaces.iter().position(|n| n.uri == uri) {
            return NsId(pos);
        }
        let prefix = if prefix.is_empty() || self.has_ns_prefix(prefix) {
            self.generated_prefix()
        } else {
            prefix.to_string()
        };
        self.namespaces.push(Namespace {
            prefix,
            uri: uri.to_string(),
        });
        NsId(self.namespaces.len() - 1)
    }

    fn generated_prefix(&self) -> String {
        let mut n = self.namespaces.len();
        loop {
            let candidate = format!("ns{n}");
            if self.ns_by_prefix(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Register `ns` and declare it on the envelope (`xmlns:prefix="uri"`).
    pub fn add_ns_param(&mut self, ns: Ns) -> NsId {
        let id = self.register_ns(ns.prefix, ns.uri);
        let prefix = self.namespaces[id.0].prefix.clone();
        let declared = self.elements[self.envelope.0]
            .params
            .iter()
            .any(|p| p.ns == ParamNs::Declaration && p.key == prefix);
        if !declared {
            self.push_declaration(self.envelope, &prefix, ns.uri);
        }
        id
    }

    pub fn ns_by_prefix(&self, prefix: &str) -> Option<NsId> {
        self.namespaces
            .iter()
            .position(|n| n.prefix == prefix)
            .map(NsId)
    }

    pub fn ns_by_uri(&self, uri: &str) -> Option<NsId> {
        self.namespaces.iter().position(|n| n.uri == uri).map(NsId)
    }

    pub fn has_ns_uri(&self, uri: &str) -> bool {
        self.ns_by_uri(uri).is_some()
    }

    pub fn has_ns_prefix(&self, prefix: &str) -> bool {
        self.ns_by_prefix(prefix).is_some()
    }

    /// Append a child element in the namespace registered under `prefix`.
    pub fn add_child(&mut self, parent: ElementId, prefix: &str, key: &str) -> Result<ElementId> {
        let ns = self
            .ns_by_prefix(prefix)
            .ok_or_else(|| OnvifError::InvalidNamespace(prefix.to_string()))?;
        Ok(self.push_element(Some(parent), ns, key))
    }

    /// [`add_child`](Self::add_child) followed by [`set_value`](Self::set_value).
    pub fn add_leaf(
        &mut self,
        parent: ElementId,
        prefix: &str,
        key: &str,
        value: impl fmt::Display,
    ) -> Result<ElementId> {
        let id = self.add_child(parent, prefix, key)?;
        self.set_value(id, value.to_string());
        Ok(id)
    }

    pub(crate) fn push_element(&mut self, parent: Option<ElementId>, ns: NsId, key: &str) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            ns,
            key: key.to_string(),
            value: None,
            params: Vec::new(),
            children: Vec::new(),
            parent,
        });
        if let Some(parent) = parent {
            self.elements[parent.0].children.push(id);
        }
        id
    }


    pub(crate) fn push_declaration(&mut self, id: ElementId, prefix: &str, uri: &str) {
        self.elements[id.0].params.push(Parameter {
            ns: ParamNs::Declaration,
            key: prefix.to_string(),
            value: uri.to_string(),
        });
    }

    pub(crate) fn push_parameter(&mut self, id: ElementId, param: Parameter) {
        self.elements[id.0].params.push(param);
    }

    /// First direct child of `parent` named `key`, or the first one after
    /// `after` when given.
    pub fn find_child(&self, parent: ElementId, after: Option<ElementId>, key: &str) -> Option<ElementId> {
        let children = &self.elements.get(parent.0)?.children;
        let start = match after {
            Some(prev) => children.iter().position(|&c| c == prev)? + 1,
            None => 0,
        };
        children
            .get(start..)?
            .iter()
            .copied()
            .find(|&c| self.elements[c.0].key == key)
    }

    /// All direct children of `parent` named `key`, in document order.
    pub fn find_children<'a>(&'a self, parent: ElementId, key: &'a str) -> impl Iterator<Item = ElementId> + 'a {
        self.elements[parent.0]
            .children
            .iter()
            .copied()
            .filter(move |&c| self.elements[c.0].key == key)
    }

    /// Follow `keys` from `start`, one [`find_child`](Self::find_child) per step.
    pub fn find_path(&self, start: ElementId, keys: &[&str]) -> Option<ElementId> {
        keys.iter()
            .try_fold(start, |cur, key| self.find_child(cur, None, key))
    }

    pub fn find_parameter(&self, id: ElementId, key: &str) -> Option<&Parameter> {
        self.elements
            .get(id.0)?
            .params
            .iter()
            .find(|p| p.ns != ParamNs::Declaration && p.key == key)
    }

    pub fn set_value(&mut self, id: ElementId, value: impl Into<String>) {
        self.elements[id.0].value = Some(value.into());
    }

    pub fn value(&self, id: ElementId) -> Option<&str> {
        self.elements.get(id.0)?.value.as_deref()
    }

    /// Value of the child `key` of `parent`.
    pub fn child_value(&self, parent: ElementId, key: &str) -> Option<&str> {
        self.find_child(parent, None, key).and_then(|c| self.value(c))
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        &self.elements[id.0].children
    }

    pub fn add_parameter(&mut self, id: ElementId, key: &str, value: impl fmt::Display) {
        self.elements[id.0].params.push(Parameter {
            ns: ParamNs::Plain,
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn add_qualified_parameter(
        &mut self,
        id: ElementId,
        prefix: &str,
        key: &str,
        value: impl fmt::Display,
    ) -> Result<()> {
        let ns = self
            .ns_by_prefix(prefix)
            .ok_or_else(|| OnvifError::InvalidNamespace(prefix.to_string()))?;
        self.elements[id.0].params.push(Parameter {
            ns: ParamNs::Qualified(ns),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    /// `prefix:Key` as written by the encoder.
    pub fn qualified_name(&self, id: ElementId) -> String {
        let el = &self.elements[id.0];
        format!("{}:{}", self.namespaces[el.ns.0].prefix, el.key)
    }

    pub fn header(&self) -> Option<ElementId> {
        self.find_child(self.envelope, None, "Header")
    }

    pub fn body(&self) -> Option<ElementId> {
        self.find_child(self.envelope, None, "Body")
    }

    /// Envelope with an empty `soapenv:Body`, returned alongside the body id.
    pub fn with_body(namespaces: &[Ns]) -> Result<(Self, ElementId)> {
        let mut msg = Message::new();
        for ns in namespaces {
            msg.add_ns_param(*ns);
        }
        let body = msg.add_child(msg.envelope, names::ENVELOPE.prefix, "Body")?;
        Ok((msg, body))
    }
}

impl Index<ElementId> for Message {
    type Output = Element;

    fn index(&self, id: ElementId) -> &Element {
        self.element(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::names::{DEVICE, SCHEMA};

    #[test]
    fn new_message_has_envelope_and_declaration() {
        let msg = Message::new();
        let env = msg.envelope();
        assert_eq!(msg.qualified_name(env), "soapenv:Envelope");
        assert_eq!(msg[env].parent(), None);
        assert_eq!(msg[env].params()[0].ns, ParamNs::Declaration);
        assert_eq!(msg[env].params()[0].key, "soapenv");
    }

    #[test]
    fn register_ns_is_unique_by_uri() {
        let mut msg = Message::new();
        let a = msg.register_ns("tt", SCHEMA.uri);
        let b = msg.register_ns("other", SCHEMA.uri);
        let c = msg.register_ns("tds", DEVICE.uri);
        let d = msg.register_ns("tt", SCHEMA.uri);
        assert_eq!(a, b);
        assert_eq!(a, d);
        assert_ne!(a, c);
        // soapenv + tt + tds
        assert_eq!(msg.namespaces().len(), 3);
        assert_eq!(msg.namespace(a).prefix, "tt");
    }

    #[test]
    fn empty_prefix_gets_generated_name() {
        let mut msg = Message::new();
        let id = msg.register_ns("", "urn:example");
        assert!(msg.namespace(id).prefix.starts_with("ns"));
        assert_eq!(msg.ns_by_prefix(&msg.namespace(id).prefix.clone()), Some(id));
    }

    #[test]
    fn add_child_requires_registered_prefix() {
        let mut msg = Message::new();
        let env = msg.envelope();
        let err = msg.add_child(env, "tds", "GetHostname").unwrap_err();
        assert!(matches!(err, OnvifError::InvalidNamespace(p) if p == "tds"));

        msg.add_ns_param(DEVICE);
        assert!(msg.add_child(env, "tds", "GetHostname").is_ok());
    }

    #[test]
    fn add_ns_param_declares_once() {
        let mut msg = Message::new();
        msg.add_ns_param(SCHEMA);
        msg.add_ns_param(SCHEMA);
        let decls = msg[msg.envelope()]
            .params()
            .iter()
            .filter(|p| p.key == "tt")
            .count();
        assert_eq!(decls, 1);
    }

    #[test]
    fn find_child_walks_siblings_in_order() {
        let (mut msg, body) = Message::with_body(&[SCHEMA]).unwrap();
        let a = msg.add_leaf(body, "tt", "Item", "a").unwrap();
        msg.add_leaf(body, "tt", "Other", "x").unwrap();
        let b = msg.add_leaf(body, "tt", "Item", "b").unwrap();

        assert_eq!(msg.find_child(body, None, "Item"), Some(a));
        assert_eq!(msg.find_child(body, Some(a), "Item"), Some(b));
        assert_eq!(msg.find_child(body, Some(b), "Item"), None);
        assert_eq!(msg.find_children(body, "Item").count(), 2);
        assert_eq!(msg.value(b), Some("b"));
    }

    #[test]
    fn find_path_and_parameters() {
        let (mut msg, body) = Message::with_body(&[SCHEMA]).unwrap();
        let outer = msg.add_child(body, "tt", "Bounds").unwrap();
        msg.add_parameter(outer, "width", 128);
        msg.add_qualified_parameter(outer, "tt", "x", 1).unwrap();

        let env = msg.envelope();
        assert_eq!(msg.find_path(env, &["Body", "Bounds"]), Some(outer));
        assert_eq!(msg.find_path(env, &["Body", "Missing"]), None);
        assert_eq!(msg.find_parameter(outer, "width").unwrap().value, "128");
        assert!(matches!(
            msg.find_parameter(outer, "x").unwrap().ns,
            ParamNs::Qualified(_)
        ));
        assert!(msg.find_parameter(outer, "height").is_none());
    }
}
