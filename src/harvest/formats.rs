use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::harvest::{Harvesting, PrefixHarvesting, StrategyState};
use crate::oai::{OaiClient, response};

/// One `ListMetadataFormats` call, yielding the advertised prefixes.
pub struct FormatHarvesting {
    client: Arc<OaiClient>,
    body: Option<String>,
    prefixes: Vec<String>,
    state: StrategyState,
}

impl FormatHarvesting {
    pub fn new(client: Arc<OaiClient>) -> Self {
        Self {
            client,
            body: None,
            prefixes: Vec::new(),
            state: StrategyState::Ready,
        }
    }
}

impl Harvesting for FormatHarvesting {
    fn request(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.state.is_terminal() {
                return false;
            }
            self.state = StrategyState::Requesting;
            match self.client.list_metadata_formats().await {
                Ok(body) => {
                    self.body = Some(body);
                    true
                }
                Err(error) => {
                    warn!("ListMetadataFormats failed for {}: {error:#}", self.client.base_url());
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
                self.prefixes = parsed
                    .list_metadata_formats
                    .map(|list| list.formats.into_iter().map(|f| f.prefix).collect())
                    .unwrap_or_default();
                self.state = StrategyState::Done;
                true
            }
            Err(error) => {
                error!("bad ListMetadataFormats response from {}: {error:#}", self.client.base_url());
                self.state = StrategyState::Failed;
                false
            }
        }
    }

    fn fully_parsed(&self) -> bool {
        self.state.is_terminal()
    }

    fn resumption_token(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> StrategyState {
        self.state
    }
}

impl PrefixHarvesting for FormatHarvesting {
    fn take_prefixes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.prefixes)
    }
}
