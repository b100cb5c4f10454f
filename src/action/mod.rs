//! The action pipeline: declarative specs from the configuration file,
//! instantiated per worker into runtime actions that own their parser and
//! transformer state.

mod save;
mod split;
mod strip;
mod transform;

use std::path::PathBuf;
use std::time::Duration;

pub use save::SaveAction;
pub use split::SplitAction;
pub use strip::StripAction;
pub use transform::{Transformer, TransformAction, XsltprocTransformer};

use crate::record::MetadataRecord;

/// Configured action value. Value-equal per variant and parameters; Split
/// and Strip carry none, so all Splits (and all Strips) compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSpec {
    Split,
    Strip,
    Transform { stylesheet: PathBuf },
    Save { output_root: PathBuf },
}

impl ActionSpec {
    /// Build a fresh runtime action. Each worker instantiates its own so
    /// parser and transformer state is never shared.
    pub fn instantiate(&self, transform_timeout: Duration) -> Action {
        match self {
            ActionSpec::Split => Action::Split(SplitAction::new()),
            ActionSpec::Strip => Action::Strip(StripAction::new()),
            ActionSpec::Transform { stylesheet } => Action::Transform(TransformAction::new(
                Box::new(XsltprocTransformer::new(stylesheet.clone(), transform_timeout)),
            )),
            ActionSpec::Save { output_root } => {
                Action::Save(SaveAction::new(output_root.clone()))
            }
        }
    }
}

pub enum Action {
    Split(SplitAction),
    Strip(StripAction),
    Transform(TransformAction),
    Save(SaveAction),
}

impl Action {
    /// Mutate the batch in place; an error aborts the batch.
    pub async fn perform(&mut self, batch: &mut Vec<MetadataRecord>) -> anyhow::Result<()> {
        match self {
            Action::Split(action) => action.perform(batch),
            Action::Strip(action) => action.perform(batch),
            Action::Transform(action) => action.perform(batch).await,
            Action::Save(action) => action.perform(batch).await,
        }
    }
}

/// Declared input format of an action sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFormat {
    pub prefix: String,
    pub schema: Option<String>,
    pub namespace: Option<String>,
}

/// An ordered chain of actions bound to an input format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSequence {
    pub input_format: InputFormat,
    pub actions: Vec<ActionSpec>,
}

impl ActionSequence {
    /// Adjacent actions must be type-compatible: Split first (it consumes
    /// the list envelope), Strip before Transform, Save last.
    pub fn validate(&self) -> Result<(), String> {
        if self.actions.is_empty() {
            return Err("action sequence is empty".to_string());
        }
        let last = self.actions.len() - 1;
        let mut seen_transform = false;
        for (index, action) in self.actions.iter().enumerate() {
            match action {
                ActionSpec::Split if index != 0 => {
                    return Err("split must be the first action".to_string());
                }
                ActionSpec::Save { .. } if index != last => {
                    return Err("save must be the last action".to_string());
                }
                ActionSpec::Strip if seen_transform => {
                    return Err("strip must precede transform".to_string());
                }
                ActionSpec::Transform { .. } => seen_transform = true,
                _ => {}
            }
        }
        if !matches!(self.actions[last], ActionSpec::Save { .. }) {
            return Err("action sequence must end with save".to_string());
        }
        Ok(())
    }

    /// ListRecords scenarios hand the pipeline raw envelopes; only a
    /// sequence opening with Split can consume them.
    pub fn starts_with_split(&self) -> bool {
        matches!(self.actions.first(), Some(ActionSpec::Split))
    }

    pub fn instantiate(&self, transform_timeout: Duration) -> Vec<Action> {
        self.actions
            .iter()
            .map(|spec| spec.instantiate(transform_timeout))
            .collect()
    }
}

/// Run one batch through the pipeline. Returns the number of records that
/// reached the final Save without error.
pub async fn run_pipeline(
    actions: &mut [Action],
    mut batch: Vec<MetadataRecord>,
) -> anyhow::Result<usize> {
    for action in actions.iter_mut() {
        action.perform(&mut batch).await?;
    }
    Ok(batch.len())
}
