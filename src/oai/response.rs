//! Serde models for OAI-PMH responses.
//!
//! List pages that feed the action pipeline are kept as raw XML; only the
//! envelope bookkeeping (error codes, resumption token, headers) is
//! deserialized here. See
//! https://www.openarchives.org/OAI/2.0/openarchivesprotocol.htm

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct OaiResponse {
    #[serde(rename = "responseDate")]
    pub response_date: String,
    #[serde(default, rename = "error")]
    pub errors: Vec<OaiError>,
    #[serde(rename = "Identify")]
    pub identify: Option<Identify>,
    #[serde(rename = "ListMetadataFormats")]
    pub list_metadata_formats: Option<ListMetadataFormats>,
    #[serde(rename = "ListIdentifiers")]
    pub list_identifiers: Option<ListIdentifiers>,
    #[serde(rename = "ListRecords")]
    pub list_records: Option<ListRecords>,
}

#[derive(Debug, Deserialize)]
pub struct OaiError {
    #[serde(rename = "@code")]
    pub code: String,
    #[serde(rename = "$value")]
    pub message: Option<String>,
}

impl OaiError {
    /// `noRecordsMatch` on a selective harvest means "up to date", not
    /// failure.
    pub fn is_no_records_match(&self) -> bool {
        self.code == "noRecordsMatch"
    }
}

#[derive(Debug, Deserialize)]
pub struct Identify {
    #[serde(rename = "repositoryName")]
    pub repository_name: Option<String>,
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListMetadataFormats {
    #[serde(default, rename = "metadataFormat")]
    pub formats: Vec<MetadataFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataFormat {
    #[serde(rename = "metadataPrefix")]
    pub prefix: String,
    pub schema: Option<String>,
    #[serde(rename = "metadataNamespace")]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListIdentifiers {
    #[serde(default, rename = "header")]
    pub headers: Vec<Header>,
    #[serde(rename = "resumptionToken")]
    pub resumption_token: Option<ResumptionToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub identifier: String,
    pub datestamp: String,
    #[serde(rename = "@status")]
    pub status: Option<String>,
    #[serde(default, rename = "setSpec")]
    pub sets: Vec<String>,
}

impl Header {
    pub fn is_deleted(&self) -> bool {
        self.status.as_deref() == Some("deleted")
    }
}

/// Record contents stay raw; only the token is read from a ListRecords
/// page.
#[derive(Debug, Deserialize)]
pub struct ListRecords {
    #[serde(rename = "resumptionToken")]
    pub resumption_token: Option<ResumptionToken>,
}

#[derive(Debug, Deserialize)]
pub struct ResumptionToken {
    #[serde(rename = "@completeListSize")]
    pub complete_list_size: Option<u64>,
    #[serde(rename = "$value")]
    pub value: Option<String>,
}

impl ResumptionToken {
    /// An empty token element closes the list.
    pub fn into_value(self) -> Option<String> {
        self.value.filter(|v| !v.trim().is_empty())
    }
}

/// Parse a response envelope and surface OAI error codes.
///
/// `noRecordsMatch` is mapped to a benign empty response. All other error
/// codes abort the current prefix.
pub fn parse(body: &str) -> anyhow::Result<OaiResponse> {
    let response: OaiResponse =
        quick_xml::de::from_str(body).map_err(|e| anyhow::anyhow!("malformed OAI response: {e}"))?;

    let fatal: Vec<&OaiError> = response
        .errors
        .iter()
        .filter(|e| !e.is_no_records_match())
        .collect();
    if !fatal.is_empty() {
        let codes: Vec<String> = fatal
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.code,
                    e.message.clone().unwrap_or_default().trim()
                )
            })
            .collect();
        anyhow::bail!("OAI error response: {}", codes.join("; "));
    }

    Ok(response)
}
