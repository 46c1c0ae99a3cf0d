//! Minimal XML tree reader and tag writer backing the canonical record form.
//!
//! # Invariants
//! - Text is never trimmed; leaf values round-trip byte for byte.
//! - Exactly one root element is accepted per document.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fmt::Display;

/// Parsed element: tag name, concatenated text content, child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// First child called `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// Parses `text` into a single-rooted element tree.
pub(crate) fn parse_document(text: &str) -> Result<XmlNode, String> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("at byte {}: {err}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => {
                ensure_single_root(&root, &stack)?;
                stack.push(XmlNode::named(tag_name(start.name().as_ref())?));
            }
            Event::Empty(start) => {
                ensure_single_root(&root, &stack)?;
                let node = XmlNode::named(tag_name(start.name().as_ref())?);
                attach(node, &mut stack, &mut root);
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| "closing tag without matching opening tag".to_string())?;
                attach(node, &mut stack, &mut root);
            }
            Event::Text(raw) => {
                let value = raw.unescape().map_err(|err| err.to_string())?;
                match stack.last_mut() {
                    Some(node) => node.text.push_str(&value),
                    None if value.trim().is_empty() => {}
                    None => return Err("text outside of the root element".to_string()),
                }
            }
            Event::CData(raw) => {
                let bytes = raw.into_inner();
                let value = std::str::from_utf8(&bytes).map_err(|err| err.to_string())?;
                match stack.last_mut() {
                    Some(node) => node.text.push_str(value),
                    None => return Err("CDATA outside of the root element".to_string()),
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element `{}`", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn ensure_single_root(root: &Option<XmlNode>, stack: &[XmlNode]) -> Result<(), String> {
    if root.is_some() && stack.is_empty() {
        return Err("document has more than one root element".to_string());
    }
    Ok(())
}

fn attach(node: XmlNode, stack: &mut [XmlNode], root: &mut Option<XmlNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn tag_name(raw: &[u8]) -> Result<String, String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|err| format!("tag name is not UTF-8: {err}"))
}

/// Appends escaped tag-delimited fields to an output buffer.
#[derive(Debug, Default)]
pub(crate) struct TagWriter {
    out: String,
}

impl TagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, tag: &str) -> &mut Self {
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    pub fn close(&mut self, tag: &str) -> &mut Self {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    /// Writes `<TAG>value</TAG>` with the value XML-escaped.
    pub fn field(&mut self, tag: &str, value: impl Display) -> &mut Self {
        let value = value.to_string();
        self.open(tag);
        self.out.push_str(&escape(value.as_str()));
        self.close(tag)
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_document, TagWriter};

    #[test]
    fn writer_escapes_and_reader_restores_text() {
        let mut writer = TagWriter::new();
        writer
            .open("ROOT")
            .field("A", "x < y & \"z\"")
            .field("B", "  padded  ")
            .field("C", "")
            .close("ROOT");
        let text = writer.finish();
        assert!(text.contains("&lt;"));

        let root = parse_document(&text).unwrap();
        assert_eq!(root.name, "ROOT");
        assert_eq!(root.child("A").unwrap().text, "x < y & \"z\"");
        assert_eq!(root.child("B").unwrap().text, "  padded  ");
        assert_eq!(root.child("C").unwrap().text, "");
        assert!(root.child("D").is_none());
    }

    #[test]
    fn reader_accepts_declaration_cdata_and_empty_tags() {
        let root =
            parse_document("<?xml version=\"1.0\"?>\n<R><A><![CDATA[a<b]]></A><B/></R>\n").unwrap();
        assert_eq!(root.child("A").unwrap().text, "a<b");
        assert!(root.child("B").unwrap().children.is_empty());
    }

    #[test]
    fn reader_rejects_broken_documents() {
        for text in ["", "<A>", "<A></B>", "<A></A><B></B>", "junk<A></A>"] {
            assert!(parse_document(text).is_err(), "`{text}` should fail");
        }
    }
}
