use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tracing::{error, info, warn};

use crate::harvest::{Harvesting, RecordHarvesting, StrategyState};
use crate::oai::{OaiClient, response};
use crate::record::MetadataRecord;

/// `ListRecords` pagination; every page becomes one envelope record for
/// the Split action.
pub struct RecordListHarvesting {
    client: Arc<OaiClient>,
    prefix: String,
    origin: String,
    from: Option<DateTime<Utc>>,
    token: Option<String>,
    body: Option<String>,
    records: Vec<MetadataRecord>,
    state: StrategyState,
}

impl RecordListHarvesting {
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
            token: None,
            body: None,
            records: Vec::new(),
            state: StrategyState::Ready,
        }
    }
}

impl Harvesting for RecordListHarvesting {
    fn request(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.state.is_terminal() {
                return false;
            }
            self.state = StrategyState::Requesting;
            match self
                .client
                .list_records(&self.prefix, self.from, self.token.as_deref())
                .await
            {
                Ok(body) => {
                    self.body = Some(body);
                    true
                }
                Err(error) => {
                    warn!("ListRecords failed for {}: {error:#}", self.client.base_url());
                    self.state = StrategyState::Failed;
                    false
                }
            }
        })
    }

    fn process_response(&mut self) -> bool {
        let Some(body) = self.body.take() else {
            self.state = StrategyState::Failed;
            return false;
        };
        self.state = StrategyState::Parsing;
        match response::parse(&body) {
            Ok(parsed) => {
                match parsed.list_records {
                    Some(list) => {
                        self.token = list.resumption_token.and_then(|t| t.into_value());
                        info!(
                            "ListRecords page for {} ({}), token {:?}",
                            self.origin,
                            self.prefix,
                            self.token.as_deref()
                        );
                        self.records.push(MetadataRecord::envelope(
                            self.prefix.clone(),
                            body,
                            self.origin.clone(),
                        ));
                    }
                    // noRecordsMatch: nothing new since the request date
                    None => {
                        info!("no records match for {} ({})", self.origin, self.prefix);
                        self.token = None;
                    }
                }
                self.state = if self.token.is_some() {
                    StrategyState::HasMore
                } else {
                    StrategyState::Done
                };
                true
            }
            Err(error) => {
                error!("bad ListRecords response from {}: {error:#}", self.client.base_url());
                self.state = StrategyState::Failed;
                false
            }
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

impl RecordHarvesting for RecordListHarvesting {
    fn take_records(&mut self) -> Vec<MetadataRecord> {
        std::mem::take(&mut self.records)
    }
}
