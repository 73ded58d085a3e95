//! XML utilities shared by the spreadsheet readers and the workbook writer.
//! Reading wraps quick-xml's pull parser; writing wraps its event writer.

use crate::error::RosterError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesDecl;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// XML reader wrapper configured for spreadsheet parts
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Wraps a buffered reader; empty elements expand into start and end events
    /// and whitespace text is kept, since `<t xml:space="preserve">` depends on it.
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event, `None` at end of document
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, RosterError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(RosterError::XmlError(error)),
        }
    }
}

/// Convenient value extraction for XML attributes
pub(crate) trait XmlAttributeHelper<'a> {
    /// Returns the attribute value with XML escapes resolved
    fn get_value(&self) -> Result<Cow<'a, str>, RosterError>;

    /// Parses the unescaped value; the raw value is reported on failure
    fn parse_value<T: FromStr>(&self) -> Result<T, RosterError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, RosterError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, RosterError> {
        self.get_value()?
            .parse()
            .map_err(|_| match std::str::from_utf8(&self.value) {
                Ok(value) => RosterError::XmlHelperError(XmlError::ParseAttributeValueError(value.to_string())),
                Err(error) => RosterError::StringEncodingError(error),
            })
    }
}

/// Attribute lookup on start tags
pub(crate) trait XmlNodeHelper<'a> {
    /// Looks up an attribute by qualified name and returns its unescaped value, if present
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RosterError>;

    /// Looks up an attribute by qualified name and parses its value, if present
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, RosterError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RosterError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, RosterError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }
}

/// Accumulates text content from XML events into a `String`
pub(crate) trait XmlTextContextHelper {
    /// Appends a text event as-is; entities arrive separately as references
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), RosterError>;

    /// Handles both named entities and numeric character references
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), RosterError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), RosterError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), RosterError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

/// In-memory XML document writer for workbook parts.
pub(crate) struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Starts a standalone UTF-8 document.
    pub(crate) fn new() -> Result<Self, RosterError> {
        let mut writer = Writer::new(Vec::with_capacity(4096));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(XmlWriter { writer })
    }

    /// Writes an opening tag; attribute values are escaped and stripped like text.
    pub(crate) fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), RosterError> {
        self.writer.write_event(Event::Start(Self::tag(name, attributes)))?;
        Ok(())
    }

    pub(crate) fn end(&mut self, name: &str) -> Result<(), RosterError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Writes a self-closing element.
    pub(crate) fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), RosterError> {
        self.writer.write_event(Event::Empty(Self::tag(name, attributes)))?;
        Ok(())
    }

    fn tag<'a>(name: &'a str, attributes: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut tag = BytesStart::new(name);
        for (key, value) in attributes {
            tag.push_attribute((*key, strip_invalid_xml_chars(value).as_ref()));
        }
        tag
    }

    /// Writes escaped character data; characters not allowed in XML 1.0 are dropped.
    pub(crate) fn text(&mut self, text: &str) -> Result<(), RosterError> {
        let text = strip_invalid_xml_chars(text);
        self.writer.write_event(Event::Text(BytesText::new(&text)))?;
        Ok(())
    }

    /// Writes `<name attributes>text</name>`.
    pub(crate) fn element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<(), RosterError> {
        self.start(name, attributes)?;
        self.text(text)?;
        self.end(name)
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

/// Removes control characters that XML 1.0 cannot represent.
pub(crate) fn strip_invalid_xml_chars(text: &str) -> Cow<'_, str> {
    let is_valid = |c: char| !c.is_control() || matches!(c, '\t' | '\n' | '\r') || ('\u{7F}'..='\u{9F}').contains(&c);
    if text.chars().all(is_valid) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| is_valid(*c)).collect())
    }
}
