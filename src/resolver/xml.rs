// Copyright (c) 2025 - Cowboy AI, Inc.
//! XML to object-tree conversion
//!
//! Produces the tree shape configuration consumers already expect:
//!
//! - the root element is kept as the single top-level key
//! - an element holding only text becomes a string (`""` when empty)
//! - attributes are collected under `"$"`, text next to children or
//!   attributes under `"_"`
//! - text is kept untrimmed; whitespace-only text between child elements is
//!   dropped
//! - repeated sibling elements become an array, in document order

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::errors::{ProvisioningError, ProvisioningResult};

const ATTRIBUTE_KEY: &str = "$";
const TEXT_KEY: &str = "_";

struct Frame {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> ProvisioningResult<Self> {
        let name = utf8(start.name().as_ref())?;
        let mut attributes = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| xml_error(e.to_string()))?;
            let key = utf8(attribute.key.as_ref())?;
            let value = attribute.unescape_value()?;
            attributes.insert(key, Value::String(value.into_owned()));
        }

        Ok(Self {
            name,
            attributes,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }

    fn close(self) -> (String, Value) {
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, Value::String(self.text));
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTE_KEY.to_string(), Value::Object(self.attributes));
        }
        if !self.text.trim().is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        object.extend(self.children);
        (self.name, Value::Object(object))
    }
}

fn utf8(bytes: &[u8]) -> ProvisioningResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| xml_error(e.to_string()))
}

fn xml_error(msg: impl Into<String>) -> ProvisioningError {
    ProvisioningError::XmlParse(msg.into())
}

/// Parse an XML document into a nested object tree
pub fn parse_document(xml: &str) -> ProvisioningResult<Value> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let finished = match reader.read_event()? {
            Event::Start(start) => {
                if stack.is_empty() && root.is_some() {
                    return Err(xml_error("document has more than one root element"));
                }
                stack.push(Frame::open(&start)?);
                None
            }
            Event::Empty(start) => {
                if stack.is_empty() && root.is_some() {
                    return Err(xml_error("document has more than one root element"));
                }
                Some(Frame::open(&start)?.close())
            }
            Event::End(_) => stack.pop().map(Frame::close),
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(xml_error("text outside the root element")),
                }
                None
            }
            Event::CData(data) => {
                let data = utf8(&data.into_inner())?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&data),
                    None => return Err(xml_error("CDATA outside the root element")),
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };

        if let Some((name, value)) = finished {
            match stack.last_mut() {
                Some(parent) => parent.add_child(name, value),
                None => root = Some((name, value)),
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(xml_error(format!("element <{}> is not closed", open.name)));
    }

    let (name, value) = root.ok_or_else(|| xml_error("document has no root element"))?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}
