//! Outbound client/provider messages.
//!
//! Delivery is best effort: callers log a failed delivery and carry on, the
//! queue mutation that triggered it is never rolled back.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::queue::ClientId;
use crate::domain::slot::Slot;

/// Chat identity a message is addressed to (client or provider owner).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A walk-in client was called.
    TurnReached { service_name: String },
    /// A scheduled client was called.
    AppointmentDue { service_name: String, slot: Slot },
    /// Tells the provider owner about a fresh booking.
    NewBooking { client_id: ClientId, service_name: String, slot: Slot },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(recipient: Recipient, kind: NotificationKind) -> Self {
        Self { recipient, kind }
    }

    pub fn event_name(&self) -> &'static str {
        match self.kind {
            NotificationKind::TurnReached { .. } => "notify.turn_reached",
            NotificationKind::AppointmentDue { .. } => "notify.appointment_due",
            NotificationKind::NewBooking { .. } => "notify.new_booking",
        }
    }

    pub fn text(&self) -> String {
        match &self.kind {
            NotificationKind::TurnReached { service_name } => {
                format!("It's your turn! Service: {service_name}")
            }
            NotificationKind::AppointmentDue { service_name, slot } => {
                format!("Your booked time has come! Service: {service_name}, time: {slot}")
            }
            NotificationKind::NewBooking { client_id, service_name, slot } => {
                format!("New booking: client {client_id} - {service_name} ({slot})")
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("recipient {0:?} is unreachable")]
    Unreachable(Recipient),
    #[error("transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Delivers and logs; returns whether the message went out.
pub async fn deliver_best_effort<N>(notifier: &N, notification: &Notification) -> bool
where
    N: Notifier + ?Sized,
{
    match notifier.deliver(notification).await {
        Ok(()) => {
            tracing::debug!(
                event_name = notification.event_name(),
                recipient = notification.recipient.0,
                "notification delivered"
            );
            true
        }
        Err(error) => {
            tracing::warn!(
                event_name = "notify.delivery_failed",
                notification = notification.event_name(),
                recipient = notification.recipient.0,
                error = %error,
                "notification delivery failed"
            );
            false
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn deliver(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Records deliveries; recipients listed in `unreachable` fail.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    delivered: Mutex<Vec<Notification>>,
    unreachable: Mutex<Vec<Recipient>>,
}

impl InMemoryNotifier {
    pub fn mark_unreachable(&self, recipient: Recipient) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.push(recipient);
        }
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().map(|delivered| delivered.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let blocked = self
            .unreachable
            .lock()
            .map(|unreachable| unreachable.contains(&notification.recipient))
            .unwrap_or(false);
        if blocked {
            return Err(NotifyError::Unreachable(notification.recipient));
        }

        self.delivered
            .lock()
            .map_err(|_| NotifyError::Transport("recorder lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
