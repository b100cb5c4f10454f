use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::harvest::{Harvesting, RecordHarvesting, StrategyState};
use crate::oai::{OaiClient, response};
use crate::record::MetadataRecord;
use crate::xml;

/// `ListIdentifiers` pagination followed by one `GetRecord` per
/// identifier.
///
/// Listing pages are exhausted depth-first before any record is fetched.
/// A failed listing page aborts the prefix; a failed `GetRecord` skips
/// that record and keeps going.
pub struct IdentifierListHarvesting {
    client: Arc<OaiClient>,
    prefix: String,
    origin: String,
    from: Option<DateTime<Utc>>,
    listing: bool,
    token: Option<String>,
    pending: VecDeque<String>,
    current: Option<String>,
    body: Option<String>,
    records: Vec<MetadataRecord>,
    state: StrategyState,
}

impl IdentifierListHarvesting {
    pub fn new(
        client: Arc<OaiClient>,
        prefix: String,
        origin: String,
        from: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            client,
            prefix,
            origin,
            from,
            listing: true,
            token: None,
            pending: VecDeque::new(),
            current: None,
            body: None,
            records: Vec::new(),
            state: StrategyState::Ready,
        }
    }

    fn parse_listing_page(&mut self, body: &str) -> bool {
        match response::parse(body) {
            Ok(parsed) => {
                let mut token = None;
                if let Some(list) = parsed.list_identifiers {
                    for header in list.headers {
                        if header.is_deleted() {
                            debug!("skipping deleted record {}", header.identifier);
                            continue;
                        }
                        self.pending.push_back(header.identifier);
                    }
                    token = list.resumption_token.and_then(|t| t.into_value());
                }
                info!(
                    "ListIdentifiers page for {} ({}): {} pending, token {:?}",
                    self.origin,
                    self.prefix,
                    self.pending.len(),
                    token.as_deref()
                );
                self.token = token;
                if self.token.is_none() {
                    self.listing = false;
                    if self.pending.is_empty() {
                        self.state = StrategyState::Done;
                        return true;
                    }
                }
                self.state = StrategyState::HasMore;
                true
            }
            Err(error) => {
                error!(
                    "bad ListIdentifiers response from {}: {error:#}",
                    self.client.base_url()
                );
                self.state = StrategyState::Failed;
                false
            }
        }
    }

    fn parse_record_page(&mut self, identifier: String, body: Option<String>) -> bool {
        if let Some(body) = body {
            match Self::record_from_response(&body) {
                Ok(Some((id, document))) => {
                    let id = if id.is_empty() { identifier } else { id };
                    self.records.push(MetadataRecord::single(
                        id,
                        self.prefix.clone(),
                        document,
                        self.origin.clone(),
                    ));
                }
                Ok(None) => {
                    warn!("GetRecord for {identifier} returned no record content, skipping");
                }
                Err(error) => {
                    warn!("GetRecord for {identifier} failed: {error:#}, skipping");
                }
            }
        }
        self.state = if self.pending.is_empty() {
            StrategyState::Done
        } else {
            StrategyState::HasMore
        };
        true
    }

    fn record_from_response(body: &str) -> anyhow::Result<Option<(String, String)>> {
        response::parse(body)?;
        let mut parts = xml::copy_elements(body, "record")?;
        if parts.is_empty() {
            return Ok(None);
        }
        let part = parts.remove(0);
        let id = xml::extract_identifier(&part.document)?.unwrap_or_default();
        Ok(Some((id, part.document)))
    }
}

impl Harvesting for IdentifierListHarvesting {
    fn request(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.state.is_terminal() {
                return false;
            }
            self.state = StrategyState::Requesting;
            if self.listing {
                match self
                    .client
                    .list_identifiers(&self.prefix, self.from, self.token.as_deref())
                    .await
                {
                    Ok(body) => {
                        self.body = Some(body);
                        true
                    }
                    Err(error) => {
                        warn!(
                            "ListIdentifiers failed for {}: {error:#}",
                            self.client.base_url()
                        );
                        self.state = StrategyState::Failed;
                        false
                    }
                }
            } else {
                let Some(identifier) = self.pending.pop_front() else {
                    self.state = StrategyState::Done;
                    return false;
                };
                match self.client.get_record(&identifier, &self.prefix).await {
                    Ok(body) => self.body = Some(body),
                    Err(error) => {
                        // record-scoped failure; the rest of the queue is
                        // still worth fetching
                        warn!("GetRecord for {identifier} failed: {error:#}, skipping");
                        self.body = None;
                    }
                }
                self.current = Some(identifier);
                true
            }
        })
    }

    fn process_response(&mut self) -> bool {
        self.state = StrategyState::Parsing;
        if self.listing {
            let Some(body) = self.body.take() else {
                self.state = StrategyState::Failed;
                return false;
            };
            self.parse_listing_page(&body)
        } else {
            let Some(identifier) = self.current.take() else {
                self.state = StrategyState::Failed;
                return false;
            };
            let body = self.body.take();
            self.parse_record_page(identifier, body)
        }
    }

    fn fully_parsed(&self) -> bool {
        self.state.is_terminal()
    }

    fn resumption_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn state(&self) -> StrategyState {
        self.state
    }
}

impl RecordHarvesting for IdentifierListHarvesting {
    fn take_records(&mut self) -> Vec<MetadataRecord> {
        std::mem::take(&mut self.records)
    }
}
