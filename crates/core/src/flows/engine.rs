use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::domain::provider::normalize_name;
use crate::domain::slot::{parse_date, Slot, SlotTime};
use crate::flows::states::{
    IntakeAction, IntakeEvent, IntakeKind, IntakeResult, IntakeState, TransitionOutcome,
};

pub const DEFAULT_INTAKE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntakeTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: IntakeState, event: IntakeEvent },
    #[error("intake session store is unavailable")]
    SessionsUnavailable,
}

/// Pure transition table of the intake flow.
pub fn transition(
    current: &IntakeState,
    event: &IntakeEvent,
) -> Result<TransitionOutcome, IntakeTransitionError> {
    use IntakeState::{
        CollectingBusyDate, CollectingBusyTime, CollectingProviderName, CollectingServiceName, Idle,
    };

    let (to, action) = match (current, event) {
        (_, IntakeEvent::Cancel) => (Idle, IntakeAction::Cancelled),
        (_, IntakeEvent::Begin(kind)) => begin(*kind),
        (Idle, IntakeEvent::Input(_)) => {
            return Err(IntakeTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
        (CollectingProviderName, IntakeEvent::Input(text)) => match normalize_name(text) {
            Some(name) => (Idle, IntakeAction::Complete(IntakeResult::ProviderName { name })),
            None => (
                current.clone(),
                IntakeAction::Reprompt("The name must not be empty. Please send it again.".into()),
            ),
        },
        (CollectingServiceName, IntakeEvent::Input(text)) => match normalize_name(text) {
            Some(name) => (Idle, IntakeAction::Complete(IntakeResult::ServiceName { name })),
            None => (
                current.clone(),
                IntakeAction::Reprompt(
                    "The service name must not be empty. Please send it again.".into(),
                ),
            ),
        },
        (CollectingBusyDate, IntakeEvent::Input(text)) => match parse_date(text) {
            Ok(date) => (
                CollectingBusyTime { date },
                IntakeAction::Prompt("Which time do you want to block? (HH:MM)".into()),
            ),
            Err(_) => (
                current.clone(),
                IntakeAction::Reprompt(
                    "The date format is wrong. Send it like 2025-08-25.".into(),
                ),
            ),
        },
        (CollectingBusyTime { date }, IntakeEvent::Input(text)) => {
            match text.parse::<SlotTime>() {
                Ok(time) => (
                    Idle,
                    IntakeAction::Complete(IntakeResult::BusyBlock {
                        slot: Slot::new(*date, time),
                    }),
                ),
                Err(_) => (
                    current.clone(),
                    IntakeAction::Reprompt(
                        "The time format is wrong. Send it like 10:00.".into(),
                    ),
                ),
            }
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, action })
}

fn begin(kind: IntakeKind) -> (IntakeState, IntakeAction) {
    match kind {
        IntakeKind::RegisterProvider => (
            IntakeState::CollectingProviderName,
            IntakeAction::Prompt("Send the name of your salon or workshop.".into()),
        ),
        IntakeKind::AddService => (
            IntakeState::CollectingServiceName,
            IntakeAction::Prompt("Send the name of the new service.".into()),
        ),
        IntakeKind::BusyBlock => (
            IntakeState::CollectingBusyDate,
            IntakeAction::Prompt("Which date do you want to block? (YYYY-MM-DD)".into()),
        ),
    }
}

#[derive(Clone, Debug)]
struct Session {
    state: IntakeState,
    touched: Instant,
}

/// Per-caller intake state with an idle timeout back to `Idle`.
#[derive(Debug)]
pub struct IntakeSessions {
    timeout: Duration,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl Default for IntakeSessions {
    fn default() -> Self {
        Self::new(DEFAULT_INTAKE_TIMEOUT)
    }
}

impl IntakeSessions {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn state(&self, caller: i64) -> IntakeState {
        self.state_at(caller, Instant::now())
    }

    pub fn state_at(&self, caller: i64, now: Instant) -> IntakeState {
        let Ok(sessions) = self.sessions.lock() else {
            return IntakeState::Idle;
        };
        match sessions.get(&caller) {
            Some(session) if !self.expired(session, now) => session.state.clone(),
            _ => IntakeState::Idle,
        }
    }

    pub fn apply(
        &self,
        caller: i64,
        event: IntakeEvent,
    ) -> Result<TransitionOutcome, IntakeTransitionError> {
        self.apply_at(caller, event, Instant::now())
    }

    pub fn apply_at(
        &self,
        caller: i64,
        event: IntakeEvent,
        now: Instant,
    ) -> Result<TransitionOutcome, IntakeTransitionError> {
        let mut sessions =
            self.sessions.lock().map_err(|_| IntakeTransitionError::SessionsUnavailable)?;

        let current = match sessions.get(&caller) {
            Some(session) if self.expired(session, now) => {
                debug!(event_name = "intake.session.expired", caller, "intake session timed out");
                IntakeState::Idle
            }
            Some(session) => session.state.clone(),
            None => IntakeState::Idle,
        };

        let outcome = transition(&current, &event)?;
        if outcome.to.is_idle() {
            sessions.remove(&caller);
        } else {
            sessions.insert(caller, Session { state: outcome.to.clone(), touched: now });
        }
        Ok(outcome)
    }

    /// Drops every timed-out session; returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|_, session| !self.expired(session, now));
        before - sessions.len()
    }

    fn expired(&self, session: &Session, now: Instant) -> bool {
        now.saturating_duration_since(session.touched) > self.timeout
    }
}
