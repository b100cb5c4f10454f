use std::path::PathBuf;

/// A metadata record moving through the action pipeline.
///
/// Expected flag transitions:
/// - `ListRecords` page: `is_envelope=true, is_list=true` until Split
/// - Split output / `GetRecord` result: both false, `id` non-empty
///
/// Once both flags are false the document holds exactly one `record`
/// element and the record is eligible for Strip/Transform/Save.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    pub id: String,
    pub prefix: String,
    /// Owned, self-contained XML document.
    pub document: String,
    /// Name of the originating provider.
    pub origin: String,
    pub is_envelope: bool,
    pub is_list: bool,
}

impl MetadataRecord {
    pub fn single(
        id: String,
        prefix: String,
        document: String,
        origin: String,
    ) -> Self {
        Self {
            id,
            prefix,
            document,
            origin,
            is_envelope: false,
            is_list: false,
        }
    }

    /// Wrap a raw list response page, still carrying the OAI envelope.
    pub fn envelope(prefix: String, document: String, origin: String) -> Self {
        Self {
            id: String::new(),
            prefix,
            document,
            origin,
            is_envelope: true,
            is_list: true,
        }
    }

    pub fn is_finalised(&self) -> bool {
        !self.is_envelope && !self.is_list && !self.id.is_empty()
    }

    /// Relative output path: `<provider>/<prefix>/<id>.xml`.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(sanitize_component(&self.origin))
            .join(sanitize_component(&self.prefix))
            .join(format!("{}.xml", sanitize_component(&self.id)))
    }
}

/// OAI identifiers routinely contain `:` and `/`; flatten them so an
/// identifier always maps to a single file name.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
