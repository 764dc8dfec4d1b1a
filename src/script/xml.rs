//! A minimal element tree on top of quick-xml's pull parser.
//!
//! Scripts are small and read once, so they are materialized into [`Element`]s before
//! interpretation. Text content, comments, processing instructions and the declaration
//! are dropped; only elements and their attributes matter.

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::{Error, Result};

/// An XML element with its attributes and child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<Element>,
    /// Byte offset of the start tag
    pub offset: u64,
}

impl Element {
    /// Returns an attribute value; names compare case-insensitively.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first child with the given tag name (case-insensitive).
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    /// Iterates the children with the given tag name (case-insensitive).
    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a Element> + use<'a, 'b> {
        self.children
            .iter()
            .filter(move |child| child.name.eq_ignore_ascii_case(name))
    }

    /// Returns `true` if the tag name equals `name` (case-insensitive).
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

fn element(start: &BytesStart<'_>, offset: u64) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::Xml(format!("<{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| Error::Xml(format!("<{name} {key}>: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        offset,
    })
}

fn attach(open: &mut [Element], root: &mut Option<Element>, finished: Element) -> Result<()> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(finished);
        return Ok(());
    }
    if root.is_some() {
        return Err(Error::Xml(format!(
            "second root element <{}> at offset {}",
            finished.name, finished.offset
        )));
    }
    *root = Some(finished);
    Ok(())
}

/// Parses a document and returns its root element.
///
/// # Errors
///
/// Returns [`Error::Xml`] for malformed documents, mismatched tags, several root
/// elements or an empty document.
pub fn parse_document(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut open: Vec<Element> = Vec::new();
    let mut root = None;
    loop {
        let offset = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| Error::Xml(format!("{e} (near offset {offset})")))?;
        match event {
            Event::Start(start) => open.push(element(&start, offset)?),
            Event::Empty(start) => {
                let finished = element(&start, offset)?;
                attach(&mut open, &mut root, finished)?;
            }
            Event::End(_) => {
                let finished = open
                    .pop()
                    .ok_or_else(|| Error::Xml(format!("unexpected end tag near offset {offset}")))?;
                attach(&mut open, &mut root, finished)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(Error::Xml(format!("<{}> is never closed", unclosed.name)));
    }
    root.ok_or_else(|| Error::Xml("the document has no root element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree() {
        let root = parse_document(
            r#"<?xml version="1.0"?>
            <patches>
                <!-- ignored -->
                <hook Name="A &amp; B"><method/></hook>
                <hook name="C">text</hook>
            </patches>"#,
        )
        .unwrap();

        assert!(root.is("Patches"));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].attribute("name"), Some("A & B"));
        assert!(root.children[0].child("METHOD").is_some());
        assert_eq!(root.children_named("hook").count(), 2);
        assert!(root.children[1].children.is_empty());
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(parse_document("<a><b></a>"), Err(Error::Xml(_))));
        assert!(matches!(parse_document("<a>"), Err(Error::Xml(_))));
        assert!(matches!(parse_document("<a/><b/>"), Err(Error::Xml(_))));
        assert!(matches!(parse_document("   "), Err(Error::Xml(_))));
        assert!(matches!(parse_document(r#"<a x="1" x="2"/>"#), Err(Error::Xml(_))));
    }
}
