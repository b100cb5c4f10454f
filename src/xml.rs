//! Event-level XML helpers for the action pipeline and static archives.
//!
//! Documents are owned strings; copies are taken from the raw source span
//! so payload formatting survives untouched. Namespace declarations that
//! were in scope on an ancestor are re-declared on the copied root, so a
//! copied subtree is always a self-contained document.

use std::collections::HashSet;

use anyhow::Context;
use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};

/// An element copied out of a larger document.
pub(crate) struct CopiedElement {
    pub document: String,
    pub attributes: Vec<(String, String)>,
}

/// Copy every element with the given local name, regardless of namespace.
/// Matches outermost occurrences; nested same-named elements stay inside
/// their parent copy.
pub(crate) fn copy_elements(doc: &str, target: &str) -> anyhow::Result<Vec<CopiedElement>> {
    let mut reader = Reader::from_str(doc);
    let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
    let mut out = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) => {
                let decls = xmlns_decls(&e)?;
                if e.local_name().as_ref() == target.as_bytes() {
                    let e = e.into_owned();
                    reader
                        .read_to_end(e.name())
                        .with_context(|| format!("unclosed <{}> element", target))?;
                    let end = reader.buffer_position() as usize;
                    out.push(CopiedElement {
                        document: redeclare_namespaces(&doc[start..end], &e, &decls, &scopes),
                        attributes: plain_attributes(&e)?,
                    });
                } else {
                    scopes.push(decls);
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == target.as_bytes() {
                    let end = reader.buffer_position() as usize;
                    let decls = xmlns_decls(&e)?;
                    out.push(CopiedElement {
                        document: redeclare_namespaces(&doc[start..end], &e, &decls, &scopes),
                        attributes: plain_attributes(&e)?,
                    });
                }
            }
            Event::End(_) => {
                scopes.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// Text of `header/identifier` directly under the record root.
pub(crate) fn extract_identifier(record: &str) -> anyhow::Result<Option<String>> {
    let mut reader = Reader::from_str(record);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut capture = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(e.local_name().as_ref().to_vec());
                capture = path.len() == 3
                    && path[1] == b"header"
                    && path[2] == b"identifier";
            }
            Event::Text(t) if capture => {
                let text = unescape(&t.decode()?)?.trim().to_string();
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
            Event::End(_) => {
                path.pop();
                capture = false;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(None)
}

/// Unwrap a single-record document to the payload element inside
/// `metadata`. Deleted records and other envelope shapes without a
/// payload are structural errors.
pub(crate) fn strip_envelope(record: &str) -> anyhow::Result<String> {
    let mut reader = Reader::from_str(record);
    let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
    let mut depth = 0usize;
    let mut inside_metadata = false;

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) => {
                let decls = xmlns_decls(&e)?;
                if inside_metadata {
                    let e = e.into_owned();
                    reader.read_to_end(e.name()).context("unclosed payload element")?;
                    let end = reader.buffer_position() as usize;
                    return Ok(redeclare_namespaces(&record[start..end], &e, &decls, &scopes));
                }
                if depth == 1 && e.local_name().as_ref() == b"metadata" {
                    inside_metadata = true;
                }
                scopes.push(decls);
                depth += 1;
            }
            Event::Empty(e) => {
                if inside_metadata {
                    let end = reader.buffer_position() as usize;
                    let decls = xmlns_decls(&e)?;
                    return Ok(redeclare_namespaces(&record[start..end], &e, &decls, &scopes));
                }
            }
            Event::End(_) => {
                if inside_metadata {
                    anyhow::bail!("metadata element has no payload");
                }
                scopes.pop();
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    anyhow::bail!("record has no metadata payload")
}

fn xmlns_decls(e: &BytesStart) -> anyhow::Result<Vec<(String, String)>> {
    let mut decls = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" {
            decls.push((String::new(), attr.unescape_value()?.into_owned()));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            decls.push((
                String::from_utf8_lossy(prefix).into_owned(),
                attr.unescape_value()?.into_owned(),
            ));
        }
    }
    Ok(decls)
}

fn plain_attributes(e: &BytesStart) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key != b"xmlns" && !key.starts_with(b"xmlns:") {
            attrs.push((
                String::from_utf8_lossy(key).into_owned(),
                attr.unescape_value()?.into_owned(),
            ));
        }
    }
    Ok(attrs)
}

/// Splice ancestor namespace declarations into the root tag of a copied
/// span. Declarations already on the element itself win.
fn redeclare_namespaces(
    raw: &str,
    elem: &BytesStart,
    own_decls: &[(String, String)],
    scopes: &[Vec<(String, String)>],
) -> String {
    let mut seen: HashSet<&str> = own_decls.iter().map(|(p, _)| p.as_str()).collect();
    let mut inherited: Vec<(&str, &str)> = Vec::new();
    // innermost scope shadows outer ones
    for scope in scopes.iter().rev() {
        for (prefix, uri) in scope {
            if seen.insert(prefix.as_str()) {
                inherited.push((prefix.as_str(), uri.as_str()));
            }
        }
    }
    if inherited.is_empty() {
        return raw.to_string();
    }
    inherited.reverse();

    let insert_at = 1 + elem.name().as_ref().len();
    let mut decls = String::new();
    for (prefix, uri) in inherited {
        if prefix.is_empty() {
            decls.push_str(&format!(" xmlns=\"{}\"", escape(uri)));
        } else {
            decls.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(uri)));
        }
    }
    format!("{}{}{}", &raw[..insert_at], decls, &raw[insert_at..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<?xml version="1.0"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <responseDate>2024-05-01T00:00:00Z</responseDate>
  <ListRecords>
    <record>
      <header><identifier>oai:x:a</identifier><datestamp>2024-01-01</datestamp></header>
      <metadata><dc:title>A</dc:title></metadata>
    </record>
    <record>
      <header><identifier>oai:x:b</identifier><datestamp>2024-01-02</datestamp></header>
      <metadata><dc:title>B</dc:title></metadata>
    </record>
  </ListRecords>
</OAI-PMH>"#;

    #[test]
    fn copies_all_records_in_order() {
        let records = copy_elements(ENVELOPE, "record").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].document.contains("oai:x:a"));
        assert!(records[1].document.contains("oai:x:b"));
    }

    #[test]
    fn copies_inherit_ancestor_namespaces() {
        let records = copy_elements(ENVELOPE, "record").unwrap();
        assert!(
            records[0]
                .document
                .starts_with(r#"<record xmlns="http://www.openarchives.org/OAI/2.0/""#)
        );
        assert!(records[0].document.contains("xmlns:dc="));
    }

    #[test]
    fn no_matches_yields_empty() {
        let records = copy_elements("<root><other/></root>", "record").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn extracts_identifier_from_record() {
        let records = copy_elements(ENVELOPE, "record").unwrap();
        let id = extract_identifier(&records[0].document).unwrap();
        assert_eq!(id.as_deref(), Some("oai:x:a"));
    }

    #[test]
    fn identifier_missing_is_none() {
        let id = extract_identifier("<record><header/></record>").unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn strip_returns_metadata_payload() {
        let records = copy_elements(ENVELOPE, "record").unwrap();
        let payload = strip_envelope(&records[0].document).unwrap();
        assert!(payload.starts_with("<dc:title"));
        assert!(payload.contains("xmlns:dc="));
        assert!(payload.ends_with("</dc:title>"));
    }

    #[test]
    fn strip_fails_without_metadata() {
        let deleted = r#"<record><header status="deleted"><identifier>oai:x:gone</identifier></header></record>"#;
        assert!(strip_envelope(deleted).is_err());
    }

    #[test]
    fn copied_records_are_independent_documents() {
        let records = copy_elements(ENVELOPE, "record").unwrap();
        // each copy parses on its own
        for record in &records {
            let id = extract_identifier(&record.document).unwrap();
            assert!(id.is_some());
        }
    }
}
