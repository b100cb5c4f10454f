//! OAI static-repository archives.
//!
//! A static provider is a single XML file in the static-repository layout:
//! a `Repository` root wrapping an `Identify` section, a
//! `ListMetadataFormats` section and one `ListRecords` section per
//! metadata prefix. The same queries a live endpoint answers over HTTP are
//! answered here from the parsed file, so the harvesting pipeline does not
//! distinguish the two.

use std::path::Path;

use anyhow::Context;

use crate::oai::response::{ListMetadataFormats, MetadataFormat};
use crate::xml;

#[derive(Debug)]
pub struct StaticArchive {
    formats: Vec<MetadataFormat>,
    /// (metadata prefix, raw ListRecords section).
    sections: Vec<(String, String)>,
}

impl StaticArchive {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read static archive {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("malformed static archive {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut formats = Vec::new();
        for section in xml::copy_elements(content, "ListMetadataFormats")? {
            let parsed: ListMetadataFormats = quick_xml::de::from_str(&section.document)
                .map_err(|e| anyhow::anyhow!("bad ListMetadataFormats section: {e}"))?;
            formats.extend(parsed.formats);
        }

        let mut sections = Vec::new();
        for section in xml::copy_elements(content, "ListRecords")? {
            let prefix = section
                .attributes
                .iter()
                .find(|(key, _)| key == "metadataPrefix")
                .map(|(_, value)| value.clone())
                .context("ListRecords section without metadataPrefix")?;
            sections.push((prefix, section.document));
        }

        if formats.is_empty() && sections.is_empty() {
            anyhow::bail!("no ListMetadataFormats or ListRecords sections found");
        }

        // archives may omit the format list; recover it from the sections
        if formats.is_empty() {
            formats = sections
                .iter()
                .map(|(prefix, _)| MetadataFormat {
                    prefix: prefix.clone(),
                    schema: None,
                    namespace: None,
                })
                .collect();
        }

        Ok(Self { formats, sections })
    }

    pub fn formats(&self) -> &[MetadataFormat] {
        &self.formats
    }

    /// Raw ListRecords envelope for a prefix, ready for the Split action.
    pub fn records_envelope(&self, prefix: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, doc)| doc.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHIVE: &str = r#"<?xml version="1.0"?>
<Repository xmlns="http://www.openarchives.org/OAI/2.0/static-repository"
            xmlns:oai="http://www.openarchives.org/OAI/2.0/">
  <Identify>
    <oai:repositoryName>Static Example</oai:repositoryName>
  </Identify>
  <ListMetadataFormats>
    <metadataFormat>
      <metadataPrefix>oai_dc</metadataPrefix>
    </metadataFormat>
  </ListMetadataFormats>
  <ListRecords metadataPrefix="oai_dc">
    <oai:record>
      <oai:header><oai:identifier>oai:static:1</oai:identifier><oai:datestamp>2024-01-01</oai:datestamp></oai:header>
      <oai:metadata><payload>one</payload></oai:metadata>
    </oai:record>
  </ListRecords>
</Repository>"#;

    #[test]
    fn parses_formats_and_sections() {
        let archive = StaticArchive::parse(ARCHIVE).unwrap();
        assert_eq!(archive.formats().len(), 1);
        assert_eq!(archive.formats()[0].prefix, "oai_dc");
        assert!(archive.records_envelope("oai_dc").is_some());
        assert!(archive.records_envelope("cmdi").is_none());
    }

    #[test]
    fn section_is_splittable() {
        let archive = StaticArchive::parse(ARCHIVE).unwrap();
        let envelope = archive.records_envelope("oai_dc").unwrap();
        let records = crate::xml::copy_elements(envelope, "record").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].document.contains("oai:static:1"));
    }

    #[test]
    fn rejects_unrecognised_content() {
        assert!(StaticArchive::parse("<notarepository/>").is_err());
    }
}
