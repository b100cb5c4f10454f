use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};

/// Raw-page OAI-PMH client for one endpoint.
///
/// Verb methods return the response body untouched; parsing belongs to the
/// harvesting strategies so a failed page can be attributed to the right
/// prefix.
#[derive(Debug)]
pub struct OaiClient {
    http: reqwest::Client,
    base_url: String,
}

impl OaiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn identify(&self) -> anyhow::Result<String> {
        self.fetch(&[("verb", "Identify")]).await
    }

    pub async fn list_metadata_formats(&self) -> anyhow::Result<String> {
        self.fetch(&[("verb", "ListMetadataFormats")]).await
    }

    pub async fn list_identifiers(
        &self,
        prefix: &str,
        from: Option<DateTime<Utc>>,
        token: Option<&str>,
    ) -> anyhow::Result<String> {
        self.fetch_list("ListIdentifiers", prefix, from, token).await
    }

    pub async fn list_records(
        &self,
        prefix: &str,
        from: Option<DateTime<Utc>>,
        token: Option<&str>,
    ) -> anyhow::Result<String> {
        self.fetch_list("ListRecords", prefix, from, token).await
    }

    pub async fn get_record(&self, identifier: &str, prefix: &str) -> anyhow::Result<String> {
        self.fetch(&[
            ("verb", "GetRecord"),
            ("identifier", identifier),
            ("metadataPrefix", prefix),
        ])
        .await
    }

    /// Exclusive arguments per the protocol: a resumption token replaces
    /// every other selective argument.
    async fn fetch_list(
        &self,
        verb: &str,
        prefix: &str,
        from: Option<DateTime<Utc>>,
        token: Option<&str>,
    ) -> anyhow::Result<String> {
        match token {
            Some(token) => {
                self.fetch(&[("verb", verb), ("resumptionToken", token)])
                    .await
            }
            None => match from {
                Some(from) => {
                    let from = format_datestamp(from);
                    self.fetch(&[
                        ("verb", verb),
                        ("metadataPrefix", prefix),
                        ("from", &from),
                    ])
                    .await
                }
                None => {
                    self.fetch(&[("verb", verb), ("metadataPrefix", prefix)])
                        .await
                }
            },
        }
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> anyhow::Result<String> {
        let response = self
            .http
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.base_url))?
            .error_for_status()
            .with_context(|| format!("request to {} was rejected", self.base_url))?;

        response
            .text()
            .await
            .with_context(|| format!("failed to read response body from {}", self.base_url))
    }
}

/// OAI datestamps at second granularity, UTC.
pub fn format_datestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
