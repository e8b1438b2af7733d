use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::availability::SlotGrid;
use crate::domain::provider::{Provider, ProviderId, ServiceId};
use crate::domain::queue::{ClientId, QueueEntry, QueueLane, QueueListing};
use crate::domain::slot::Slot;
use crate::errors::{ApplicationError, DomainError};
use crate::notify::{deliver_best_effort, Notification, NotificationKind, Notifier, Recipient};
use crate::store::{DirectoryStore, QueueStore, UNKNOWN_SERVICE};

/// Result of a committed scheduled booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub entry: QueueEntry,
    pub service_name: String,
    pub provider_notified: bool,
}

/// Insert/list/clear operations over a provider's two queue lanes.
pub struct QueueBook<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    grid: SlotGrid,
}

impl<S, N> QueueBook<S, N>
where
    S: DirectoryStore + QueueStore,
    N: Notifier,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self::with_grid(store, notifier, SlotGrid::standard())
    }

    pub fn with_grid(store: Arc<S>, notifier: Arc<N>, grid: SlotGrid) -> Self {
        Self { store, notifier, grid }
    }

    /// Returns the assigned position.
    pub async fn enqueue_walk_in(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
    ) -> Result<u32, ApplicationError> {
        let entry = self.store.append_walk_in(provider_id, client_id, service_id).await?;
        let position = entry.mode.position().ok_or_else(|| {
            ApplicationError::Persistence("walk-in entry stored without a position".to_string())
        })?;

        info!(
            event_name = "booking.walk_in.enqueued",
            provider_id = provider_id.0,
            client_id = client_id.0,
            position,
            "walk-in added to queue"
        );
        Ok(position)
    }

    /// Books `slot`; the conflict check runs again inside the store's write unit.
    pub async fn enqueue_scheduled(
        &self,
        provider: &Provider,
        client_id: ClientId,
        service_id: ServiceId,
        slot: Slot,
    ) -> Result<Booking, ApplicationError> {
        if !self.grid.contains(slot.time) {
            return Err(DomainError::SlotOutsideGrid { time: slot.time }.into());
        }

        let entry = self.store.insert_scheduled(provider.id, client_id, service_id, slot).await?;
        info!(
            event_name = "booking.scheduled.committed",
            provider_id = provider.id.0,
            client_id = client_id.0,
            slot = %slot,
            "scheduled booking committed"
        );

        let service_name = self.service_name(service_id).await;
        let notification = Notification::new(
            Recipient(provider.owner_id.0),
            NotificationKind::NewBooking { client_id, service_name: service_name.clone(), slot },
        );
        let provider_notified = deliver_best_effort(self.notifier.as_ref(), &notification).await;

        Ok(Booking { entry, service_name, provider_notified })
    }

    /// Walk-ins only, ascending by position.
    pub async fn list_walk_ins(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<QueueListing>, ApplicationError> {
        self.store.listings(provider_id, Some(QueueLane::WalkIn)).await
    }

    /// All walk-ins by position, then all scheduled entries by (date, time).
    pub async fn list_all(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<QueueListing>, ApplicationError> {
        self.store.listings(provider_id, None).await
    }

    pub async fn clear_queue(&self, provider_id: ProviderId) -> Result<u64, ApplicationError> {
        let removed = self.store.clear(provider_id).await?;
        info!(
            event_name = "booking.queue.cleared",
            provider_id = provider_id.0,
            removed,
            "queue cleared"
        );
        Ok(removed)
    }

    async fn service_name(&self, service_id: ServiceId) -> String {
        match self.store.service_by_id(service_id).await {
            Ok(Some(service)) => service.name,
            _ => UNKNOWN_SERVICE.to_string(),
        }
    }
}
