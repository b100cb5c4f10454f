//! Harvesting strategies: stateful iterators over one provider that
//! produce metadata prefixes or records.

mod formats;
mod identifiers;
mod records;
mod statics;

pub use formats::FormatHarvesting;
pub use identifiers::IdentifierListHarvesting;
pub use records::RecordListHarvesting;
pub use statics::{StaticPrefixHarvesting, StaticRecordListHarvesting};

use futures::future::BoxFuture;

use crate::record::MetadataRecord;

/// Per-strategy lifecycle.
///
/// Expected transitions:
/// - `Ready -> Requesting -> Parsing -> HasMore` while pages remain
/// - `Parsing -> Done` once the last page is parsed
/// - any state `-> Failed` on a transport or protocol error
///
/// `Done` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Ready,
    Requesting,
    Parsing,
    HasMore,
    Done,
    Failed,
}

impl StrategyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StrategyState::Done | StrategyState::Failed)
    }
}

pub trait Harvesting: Send {
    /// Perform the next protocol call and capture the response.
    /// `false` means the page failed and the strategy will not advance.
    fn request(&mut self) -> BoxFuture<'_, bool>;

    /// Parse the captured response into output items.
    fn process_response(&mut self) -> bool;

    fn fully_parsed(&self) -> bool;

    fn resumption_token(&self) -> Option<&str>;

    fn state(&self) -> StrategyState;
}

/// Strategies yielding metadata prefixes.
pub trait PrefixHarvesting: Harvesting {
    fn take_prefixes(&mut self) -> Vec<String>;
}

/// Strategies yielding metadata records.
pub trait RecordHarvesting: Harvesting {
    fn take_records(&mut self) -> Vec<MetadataRecord>;
}

/// Drive a strategy through one request/parse step.
/// `false` when the strategy is exhausted or the step failed.
pub async fn advance(strategy: &mut (dyn RecordHarvesting + '_)) -> bool {
    if strategy.fully_parsed() {
        return false;
    }
    if !strategy.request().await {
        return false;
    }
    strategy.process_response()
}
