use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::availability::{Availability, SlotGrid, DEFAULT_HORIZON_DAYS};
use crate::directory::Directory;
use crate::dispatch::{DispatchEngine, DispatchOutcome};
use crate::domain::busy::{BusyBlock, BusyBlockId};
use crate::domain::provider::{OwnerId, Provider, ProviderId, Service, ServiceId};
use crate::domain::queue::{ClientId, QueueListing};
use crate::domain::slot::{Slot, SlotTime};
use crate::errors::ApplicationError;
use crate::notify::Notifier;
use crate::queue::{Booking, QueueBook};
use crate::store::LineupStore;

/// A provider as a client sees it after following a referral link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderCard {
    pub provider: Provider,
    pub services: Vec<Service>,
}

/// Entry point for every call the conversational front end makes.
///
/// Provider-side calls take the caller's `OwnerId` and resolve it through
/// [`Directory::require_provider`]; client-side calls take the `ProviderId`
/// the client picked up from a referral code.
pub struct FrontDesk<S, N> {
    directory: Directory<S>,
    availability: Availability<S>,
    queue: QueueBook<S, N>,
    dispatch: DispatchEngine<S, N>,
}

impl<S, N> FrontDesk<S, N>
where
    S: LineupStore,
    N: Notifier,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self::with_horizon(store, notifier, DEFAULT_HORIZON_DAYS)
    }

    pub fn with_horizon(store: Arc<S>, notifier: Arc<N>, horizon_days: u32) -> Self {
        let grid = SlotGrid::standard();
        Self {
            directory: Directory::new(store.clone()),
            availability: Availability::with_grid(store.clone(), grid, horizon_days),
            queue: QueueBook::with_grid(store.clone(), notifier.clone(), grid),
            dispatch: DispatchEngine::new(store, notifier),
        }
    }

    pub fn directory(&self) -> &Directory<S> {
        &self.directory
    }

    pub async fn register_provider(
        &self,
        owner_id: OwnerId,
        name: &str,
    ) -> Result<Provider, ApplicationError> {
        self.directory.register_provider(owner_id, name).await
    }

    pub async fn unregister(&self, owner_id: OwnerId) -> Result<Provider, ApplicationError> {
        self.directory.unregister(owner_id).await
    }

    pub async fn add_service(
        &self,
        owner_id: OwnerId,
        name: &str,
    ) -> Result<bool, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.directory.add_service(provider.id, name).await
    }

    pub async fn list_services(&self, owner_id: OwnerId) -> Result<Vec<Service>, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.directory.list_services(provider.id).await
    }

    pub async fn referral(&self, referral_code: &str) -> Result<ProviderCard, ApplicationError> {
        let provider = self.directory.resolve_referral(referral_code).await?;
        let services = self.directory.list_services(provider.id).await?;
        Ok(ProviderCard { provider, services })
    }

    pub async fn upcoming_dates(
        &self,
        provider_id: ProviderId,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, ApplicationError> {
        self.directory.resolve_provider(provider_id).await?;
        Ok(self.availability.dates_from(today))
    }

    pub async fn available_slots(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> Result<Vec<SlotTime>, ApplicationError> {
        self.directory.resolve_provider(provider_id).await?;
        self.availability.available_slots(provider_id, date).await
    }

    pub async fn enqueue_walk_in(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
    ) -> Result<u32, ApplicationError> {
        let provider = self.directory.resolve_provider(provider_id).await?;
        self.directory.service_for(provider.id, service_id).await?;
        self.queue.enqueue_walk_in(provider.id, client_id, service_id).await
    }

    pub async fn enqueue_scheduled(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
        slot: Slot,
    ) -> Result<Booking, ApplicationError> {
        let provider = self.directory.resolve_provider(provider_id).await?;
        self.directory.service_for(provider.id, service_id).await?;
        self.queue.enqueue_scheduled(&provider, client_id, service_id, slot).await
    }

    pub async fn queue(
        &self,
        owner_id: OwnerId,
        walk_ins_only: bool,
    ) -> Result<Vec<QueueListing>, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        if walk_ins_only {
            self.queue.list_walk_ins(provider.id).await
        } else {
            self.queue.list_all(provider.id).await
        }
    }

    pub async fn call_next(&self, owner_id: OwnerId) -> Result<DispatchOutcome, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.dispatch.call_next(&provider).await
    }

    pub async fn clear_queue(&self, owner_id: OwnerId) -> Result<u64, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.queue.clear_queue(provider.id).await
    }

    pub async fn add_busy_block(
        &self,
        owner_id: OwnerId,
        slot: Slot,
    ) -> Result<BusyBlock, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.availability.add_busy_block(provider.id, slot).await
    }

    pub async fn remove_busy_block(
        &self,
        owner_id: OwnerId,
        block_id: BusyBlockId,
    ) -> Result<bool, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.availability.remove_busy_block(provider.id, block_id).await
    }

    pub async fn list_busy_blocks(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<BusyBlock>, ApplicationError> {
        let provider = self.directory.require_provider(owner_id).await?;
        self.availability.list_busy_blocks(provider.id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::FrontDesk;
    use crate::dispatch::DispatchOutcome;
    use crate::domain::provider::{OwnerId, ProviderId, ServiceId};
    use crate::domain::queue::ClientId;
    use crate::domain::slot::{Slot, SlotTime};
    use crate::errors::{ApplicationError, DomainError};
    use crate::notify::NoopNotifier;
    use crate::store::InMemoryStore;

    fn desk() -> FrontDesk<InMemoryStore, NoopNotifier> {
        FrontDesk::new(Arc::new(InMemoryStore::default()), Arc::new(NoopNotifier))
    }

    fn time(raw: &str) -> SlotTime {
        raw.parse().expect("valid time")
    }

    #[tokio::test]
    async fn booking_round_trip_excludes_exactly_that_slot() {
        let desk = desk();
        let provider = desk.register_provider(OwnerId(1), "Salon").await.expect("register");
        desk.add_service(OwnerId(1), "Haircut").await.expect("service");
        let card = desk.referral(provider.referral_code.as_str()).await.expect("referral");
        let haircut = card.services[0].id;
        let date = NaiveDate::from_ymd_opt(2025, 8, 25).unwrap();

        desk.enqueue_scheduled(provider.id, ClientId(100), haircut, Slot::new(date, time("10:00")))
            .await
            .expect("client A books");
        let conflict = desk
            .enqueue_scheduled(provider.id, ClientId(200), haircut, Slot::new(date, time("10:00")))
            .await;
        assert!(matches!(
            conflict,
            Err(ApplicationError::Domain(DomainError::SlotConflict { .. }))
        ));

        let available = desk.available_slots(provider.id, date).await.expect("slots");
        assert_eq!(available.len(), 16);
        assert!(!available.contains(&time("10:00")));
        assert!(available.contains(&time("09:00")));
    }

    #[tokio::test]
    async fn provider_side_calls_require_registration() {
        let desk = desk();

        let not_registered =
            ApplicationError::Domain(DomainError::NotRegistered { owner_id: OwnerId(9) });

        assert_eq!(desk.add_service(OwnerId(9), "Haircut").await, Err(not_registered.clone()));
        assert_eq!(desk.call_next(OwnerId(9)).await, Err(not_registered.clone()));
        assert_eq!(desk.clear_queue(OwnerId(9)).await, Err(not_registered));
    }

    #[tokio::test]
    async fn client_side_calls_validate_provider_and_service() {
        let desk = desk();
        let provider = desk.register_provider(OwnerId(1), "Salon").await.expect("register");
        let other = desk.register_provider(OwnerId(2), "Barber").await.expect("register");
        desk.add_service(OwnerId(2), "Shave").await.expect("service");
        let foreign = desk.list_services(OwnerId(2)).await.expect("services")[0].id;

        assert!(matches!(
            desk.enqueue_walk_in(ProviderId(999), ClientId(1), ServiceId(1)).await,
            Err(ApplicationError::Domain(DomainError::ProviderNotFound { .. }))
        ));
        assert!(matches!(
            desk.enqueue_walk_in(provider.id, ClientId(1), foreign).await,
            Err(ApplicationError::Domain(DomainError::ServiceNotFound { .. }))
        ));
        assert_eq!(desk.enqueue_walk_in(other.id, ClientId(1), foreign).await, Ok(1));
    }

    #[tokio::test]
    async fn queue_view_and_busy_blocks_are_scoped_to_owner() {
        let desk = desk();
        let provider = desk.register_provider(OwnerId(1), "Salon").await.expect("register");
        desk.add_service(OwnerId(1), "Haircut").await.expect("service");
        let haircut = desk.list_services(OwnerId(1)).await.expect("services")[0].id;
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();

        desk.enqueue_scheduled(provider.id, ClientId(5), haircut, Slot::new(date, time("11:00")))
            .await
            .expect("booking");
        desk.enqueue_walk_in(provider.id, ClientId(6), haircut).await.expect("walk-in");

        assert_eq!(desk.queue(OwnerId(1), false).await.expect("queue").len(), 2);
        assert_eq!(desk.queue(OwnerId(1), true).await.expect("queue").len(), 1);

        let block =
            desk.add_busy_block(OwnerId(1), Slot::new(date, time("12:00"))).await.expect("block");
        desk.register_provider(OwnerId(2), "Barber").await.expect("register");
        assert!(!desk.remove_busy_block(OwnerId(2), block.id).await.expect("foreign removal"));
        assert_eq!(desk.list_busy_blocks(OwnerId(1)).await.expect("blocks"), vec![block.clone()]);
        assert!(desk.remove_busy_block(OwnerId(1), block.id).await.expect("removal"));

        assert_eq!(desk.clear_queue(OwnerId(1)).await.expect("clear"), 2);
        assert_eq!(desk.call_next(OwnerId(1)).await.expect("call next"), DispatchOutcome::Empty);
    }

    #[tokio::test]
    async fn unregister_removes_everything_queryable() {
        let desk = desk();
        let provider = desk.register_provider(OwnerId(1), "Salon").await.expect("register");
        desk.add_service(OwnerId(1), "Haircut").await.expect("service");
        let haircut = desk.list_services(OwnerId(1)).await.expect("services")[0].id;
        let date = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap();
        desk.enqueue_walk_in(provider.id, ClientId(3), haircut).await.expect("walk-in");
        desk.add_busy_block(OwnerId(1), Slot::new(date, time("09:00"))).await.expect("block");

        desk.unregister(OwnerId(1)).await.expect("unregister");

        assert!(matches!(
            desk.referral(provider.referral_code.as_str()).await,
            Err(ApplicationError::Domain(DomainError::ProviderNotFound { .. }))
        ));
        assert!(matches!(
            desk.available_slots(provider.id, date).await,
            Err(ApplicationError::Domain(DomainError::ProviderNotFound { .. }))
        ));
        assert!(matches!(
            desk.list_busy_blocks(OwnerId(1)).await,
            Err(ApplicationError::Domain(DomainError::NotRegistered { .. }))
        ));
    }
}
