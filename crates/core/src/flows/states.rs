use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::slot::Slot;

/// Which multi-step input a caller started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeKind {
    RegisterProvider,
    AddService,
    BusyBlock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntakeState {
    Idle,
    CollectingProviderName,
    CollectingServiceName,
    CollectingBusyDate,
    CollectingBusyTime { date: NaiveDate },
}

impl IntakeState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl Default for IntakeState {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeEvent {
    Begin(IntakeKind),
    Input(String),
    Cancel,
}

/// Validated tuple handed to the booking core once a flow completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeResult {
    ProviderName { name: String },
    ServiceName { name: String },
    BusyBlock { slot: Slot },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum IntakeAction {
    Prompt(String),
    /// Input was rejected; the state is unchanged.
    Reprompt(String),
    Complete(IntakeResult),
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: IntakeState,
    pub to: IntakeState,
    pub action: IntakeAction,
}

impl TransitionOutcome {
    pub fn completed(&self) -> Option<&IntakeResult> {
        match &self.action {
            IntakeAction::Complete(result) => Some(result),
            _ => None,
        }
    }
}
