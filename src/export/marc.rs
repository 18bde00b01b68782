//! MARCXML to flat columns
//!
//! Control fields become a column named by their tag (`001`). Data field subfields
//! become `{tag}_{code}` (`245_a`). Repeated fields keep every value in document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

/// Flattened fields of one bibliographic record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarcRecord {
    fields: BTreeMap<String, Vec<String>>,
}

impl MarcRecord {
    /// Values for `column`, in document order
    pub fn values(&self, column: &str) -> Option<&[String]> {
        self.fields.get(column).map(Vec::as_slice)
    }

    /// Column names present in this record, sorted
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Cell text for `column`, repeated values joined with `separator`
    pub fn cell(&self, column: &str, separator: &str) -> String {
        self.values(column)
            .map(|v| v.join(separator))
            .unwrap_or_default()
    }

    fn push(&mut self, column: String, value: String) {
        self.fields.entry(column).or_default().push(value);
    }
}

enum Capture {
    None,
    Control(String),
    Subfield(String),
}

/// Parse one MARCXML document
///
/// Accepts a bare `<record>` or a `<collection>` wrapper, with or without a namespace
/// prefix. All fields in the document land in one record.
pub fn parse_marcxml(xml: &str) -> Result<MarcRecord, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut record = MarcRecord::default();
    let mut datafield: Option<String> = None;
    let mut capture = Capture::None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"controlfield" => {
                    capture = Capture::Control(required_attr(e, "tag")?);
                    text.clear();
                }
                b"datafield" => datafield = Some(required_attr(e, "tag")?),
                b"subfield" if datafield.is_some() => {
                    capture = Capture::Subfield(required_attr(e, "code")?);
                    text.clear();
                }
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"controlfield" => record.push(required_attr(e, "tag")?, String::new()),
                b"subfield" => {
                    if let Some(tag) = &datafield {
                        let code = required_attr(e, "code")?;
                        record.push(format!("{}_{}", tag, code), String::new());
                    }
                }
                _ => {}
            },
            Event::Text(e) => {
                if !matches!(capture, Capture::None) {
                    let unescaped = e.unescape().map_err(|e| e.to_string())?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(e) => {
                if !matches!(capture, Capture::None) {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"controlfield" | b"subfield" => {
                    match std::mem::replace(&mut capture, Capture::None) {
                        Capture::Control(tag) => record.push(tag, text.trim().to_string()),
                        Capture::Subfield(code) => {
                            if let Some(tag) = &datafield {
                                record.push(format!("{}_{}", tag, code), text.trim().to_string());
                            }
                        }
                        Capture::None => {}
                    }
                    text.clear();
                }
                b"datafield" => datafield = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if record.fields.is_empty() {
        return Err("document contains no MARC fields".to_string());
    }
    Ok(record)
}

fn required_attr(e: &BytesStart<'_>, name: &str) -> Result<String, String> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| {
            format!(
                "<{}> without '{}' attribute",
                String::from_utf8_lossy(e.local_name().as_ref()),
                name
            )
        })?;
    attr.unescape_value()
        .map(|v| v.trim().to_string())
        .map_err(|err| err.to_string())
}
