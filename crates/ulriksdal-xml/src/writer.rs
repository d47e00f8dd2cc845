#![forbid(unsafe_code)]

//! XML fragment writer over `quick_xml::Writer`.
//!
//! Signature templates and property elements are produced as compact
//! fragments (no indentation) so that inserting them never adds
//! whitespace text nodes to signed content.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use ulriksdal_core::Error;

/// A compact XML writer.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(Event::Start(start))
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(Event::Empty(start))
    }

    /// End the current element.
    pub fn end_element(&mut self, name: &str) -> Result<(), Error> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        self.write(Event::Text(BytesText::new(text)))
    }

    /// `<name attrs>text</name>`; an empty `text` still yields a start/end pair.
    pub fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), Error> {
        self.start_element(name, attrs)?;
        if !text.is_empty() {
            self.write_text(text)?;
        }
        self.end_element(name)
    }

    /// Append an already serialized fragment verbatim.
    pub fn write_raw(&mut self, fragment: &str) -> Result<(), Error> {
        self.writer
            .get_mut()
            .extend_from_slice(fragment.as_bytes());
        Ok(())
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::XmlStructure(format!("XML write error: {e}")))
    }

    /// Finish writing and return the XML bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.into_bytes())
            .map_err(|e| Error::XmlStructure(format!("writer produced invalid UTF-8: {e}")))
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape character data for insertion as element content.
pub fn escape_text(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}
