//! Parsing of the `<root status_code="200" …><Tag>value</Tag>…</root>` XML
//! shape every host response uses (§6). Event-based rather than a full
//! serde-derived schema: the wire format is a flat bag of optional tags
//! plus a handful of repeated sections (`DisplayMode`, `App`), and numeric
//! fields must default safely on parse error rather than aborting the
//! whole response.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{GfeResponseError, ProtocolError};

/// A loosely-typed view over one `<root>` response: top-level scalar tags
/// plus any repeated sections, keyed by tag name.
pub struct XmlResponse {
    pub status_code: i32,
    pub status_message: String,
    fields: HashMap<String, String>,
    pub repeated: HashMap<String, Vec<HashMap<String, String>>>,
}

impl XmlResponse {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn field_or_default(&self, key: &str) -> String {
        self.field(key).unwrap_or_default().to_string()
    }

    /// Parse a numeric field, defaulting safely (per §4.B) rather than
    /// failing the whole response on a malformed value.
    pub fn field_parsed<T: std::str::FromStr + Default>(&self, key: &str) -> T {
        self.field(key)
            .and_then(|v| v.trim().parse::<T>().ok())
            .unwrap_or_default()
    }
}

/// Parse a `<root>` document, validating `status_code` (§6, §7). Any
/// non-`200` code raises a typed [`GfeResponseError`], with the `-1`
/// "Invalid" case remapped to `418` inside [`GfeResponseError::new`].
pub fn parse_root(xml: &str) -> Result<XmlResponse, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut status_code: Option<i32> = None;
    let mut status_message = String::new();
    let mut fields = HashMap::new();
    let mut repeated: HashMap<String, Vec<HashMap<String, String>>> = HashMap::new();

    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();
    let mut current_section: Option<HashMap<String, String>> = None;
    let mut section_name: Option<String> = None;

    loop {
        match reader
            .read_event()
            .map_err(|e| ProtocolError::XmlParse(e.to_string()))?
        {
            Event::Eof => break,
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "root" {
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = attr
                            .unescape_value()
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        if key == "status_code" {
                            status_code = value.parse().ok();
                        } else if key == "status_message" {
                            status_message = value;
                        }
                    }
                } else if path.is_empty() {
                    // A direct child of <root> that itself has children is
                    // a repeated-section wrapper (e.g. <App>…</App>).
                    section_name = Some(name.clone());
                    current_section = Some(HashMap::new());
                }
                path.push(name);
                current_text.clear();
            }
            Event::Text(t) => {
                current_text.push_str(&t.unescape().unwrap_or_default());
            }
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                let text = std::mem::take(&mut current_text);
                if path.is_empty() {
                    // Closing a direct child of <root>.
                    if let Some(section) = current_section.take() {
                        if !section.is_empty() {
                            repeated.entry(name).or_default().push(section);
                        } else if !text.trim().is_empty() {
                            fields.insert(name, text);
                        }
                    } else if !text.trim().is_empty() || !fields.contains_key(&name) {
                        fields.insert(name, text);
                    }
                    section_name = None;
                } else if path.len() == 1 {
                    // A field inside the current repeated section.
                    if let Some(section) = current_section.as_mut() {
                        section.insert(name, text);
                    }
                }
                let _ = &section_name;
            }
            _ => {}
        }
    }

    let status_code = status_code.unwrap_or(200);
    if status_code != 200 {
        return Err(GfeResponseError::new(status_code, status_message).into());
    }

    Ok(XmlResponse {
        status_code,
        status_message,
        fields,
        repeated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_200_status() {
        let xml = r#"<root status_code="401" status_message="unauthorized"></root>"#;
        let err = parse_root(xml).unwrap_err();
        match err {
            ProtocolError::Gfe(e) => assert_eq!(e.code, 401),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn remaps_invalid_minus_one_to_418() {
        let xml = r#"<root status_code="-1" status_message="Invalid"></root>"#;
        let err = parse_root(xml).unwrap_err();
        match err {
            ProtocolError::Gfe(e) => assert_eq!(e.code, 418),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parses_flat_fields() {
        let xml = r#"<root status_code="200"><hostname>Living Room PC</hostname><currentgame>0</currentgame></root>"#;
        let resp = parse_root(xml).unwrap();
        assert_eq!(resp.field("hostname"), Some("Living Room PC"));
        assert_eq!(resp.field_parsed::<i32>("currentgame"), 0);
    }

    #[test]
    fn malformed_numeric_field_defaults_safely() {
        let xml = r#"<root status_code="200"><currentgame>not-a-number</currentgame></root>"#;
        let resp = parse_root(xml).unwrap();
        assert_eq!(resp.field_parsed::<i32>("currentgame"), 0);
    }

    #[test]
    fn parses_repeated_sections() {
        let xml = r#"<root status_code="200">
            <DisplayMode><Width>1920</Width><Height>1080</Height><RefreshRate>60</RefreshRate></DisplayMode>
            <DisplayMode><Width>3840</Width><Height>2160</Height><RefreshRate>120</RefreshRate></DisplayMode>
        </root>"#;
        let resp = parse_root(xml).unwrap();
        let modes = resp.repeated.get("DisplayMode").unwrap();
        assert_eq!(modes.len(), 2);
        assert_eq!(modes[1].get("Width").unwrap(), "3840");
    }
}
