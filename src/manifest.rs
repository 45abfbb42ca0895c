//! Annotation manifest parsing.
//!
//! The manifest is an XML file with one child element per annotated sample.
//! Each entry carries the sample filename as its first attribute and five
//! ordered numeric fields: position-x, position-y, angle (radians), width,
//! height. Numbers use a comma as the fractional separator and are
//! normalized before parsing.

use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::ManifestError;
use crate::models::{ManifestEntry, Point, Size};

const FIELD_NAMES: [&str; 5] = ["position-x", "position-y", "angle", "width", "height"];

/// Load and parse a manifest file.
///
/// An empty manifest (root element with no children) is not an error and
/// yields an empty list.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let xml = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest_str(&xml)
}

/// Parse a manifest from an XML string.
pub fn parse_manifest_str(xml: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut depth = 0usize;
    // Fields of the entry currently being read, in document order.
    let mut sample: Option<String> = None;
    let mut fields: Vec<String> = Vec::new();
    let mut index = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                if depth == 2 {
                    sample = Some(sample_name(e, index)?);
                    fields.clear();
                }
            }
            Ok(Event::Text(ref t)) => {
                if depth == 3 {
                    let text = t
                        .unescape()
                        .map_err(|e| ManifestError::Xml(e.to_string()))?;
                    fields.push(text.into_owned());
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    let name = sample.take().unwrap_or_default();
                    entries.push(build_entry(name, &fields)?);
                    index += 1;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 1 {
                    // Self-closing entry: it has a name but no fields.
                    let name = sample_name(e, index)?;
                    entries.push(build_entry(name, &[])?);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ManifestError::Xml(e.to_string())),
        }
    }

    Ok(entries)
}

/// Normalize a locale-formatted decimal (comma separator) to dot form.
///
/// Applied uniformly to every numeric field; this is the only place the
/// comma convention is handled.
pub fn normalize_decimal(raw: &str) -> String {
    raw.trim().replace(',', ".")
}

fn sample_name(
    element: &quick_xml::events::BytesStart<'_>,
    index: usize,
) -> Result<String, ManifestError> {
    let attr = element
        .attributes()
        .next()
        .ok_or(ManifestError::MissingSampleName { index })?
        .map_err(|e| ManifestError::Xml(e.to_string()))?;
    let value = attr
        .unescape_value()
        .map_err(|e| ManifestError::Xml(e.to_string()))?;
    Ok(value.into_owned())
}

fn build_entry(sample: String, fields: &[String]) -> Result<ManifestEntry, ManifestError> {
    let mut values = [0f64; 5];
    for (i, name) in FIELD_NAMES.iter().copied().enumerate() {
        let raw = fields.get(i).ok_or_else(|| ManifestError::MissingField {
            sample: sample.clone(),
            field: name,
        })?;
        values[i] = parse_field(&sample, name, raw)?;
    }

    Ok(ManifestEntry {
        sample,
        position: Point::new(values[0], values[1]),
        angle: values[2],
        size: Size::new(values[3], values[4]),
    })
}

fn parse_field(sample: &str, field: &'static str, raw: &str) -> Result<f64, ManifestError> {
    normalize_decimal(raw)
        .parse()
        .map_err(|_| ManifestError::InvalidNumber {
            sample: sample.to_string(),
            field,
            value: raw.to_string(),
        })
}
