//! "Call next client" workflow.
//!
//! ```text
//! WalkInCheck --found--> Dispatched
//!      |
//!    empty
//!      v
//! ScheduledCheck --found--> Dispatched
//!      |
//!    empty
//!      v
//!    Empty
//! ```
//!
//! Walk-ins always win over scheduled entries. The scheduled lane yields the
//! globally earliest (date, time) entry, including ones whose slot is already
//! in the past. Both lane probes happen inside one store unit
//! ([`QueueStore::pop_next`]); the table is then replayed against the popped
//! entry. The client is only notified after the pop committed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::provider::{Provider, ServiceId};
use crate::domain::queue::{ClientId, EntryMode, QueueEntry, QueueLane};
use crate::errors::ApplicationError;
use crate::notify::{deliver_best_effort, Notification, NotificationKind, Notifier, Recipient};
use crate::store::{DirectoryStore, QueueStore, UNKNOWN_SERVICE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    WalkInCheck,
    ScheduledCheck,
    Dispatched,
    Empty,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Empty)
    }

    /// Lane probed while in this state.
    pub fn lane(&self) -> Option<QueueLane> {
        match self {
            Self::WalkInCheck => Some(QueueLane::WalkIn),
            Self::ScheduledCheck => Some(QueueLane::Scheduled),
            Self::Dispatched | Self::Empty => None,
        }
    }

    /// Walks the table from `WalkInCheck`, where a probe finds something only
    /// if `popped` came from that probe's lane.
    pub fn resolve(popped: Option<&QueueEntry>) -> Self {
        let mut state = Self::WalkInCheck;
        while let Some(lane) = state.lane() {
            state = state.next(popped.is_some_and(|entry| entry.mode.lane() == lane));
        }
        state
    }

    /// Next state given whether the probe in this state found an entry.
    pub fn next(self, found: bool) -> Self {
        match (self, found) {
            (Self::WalkInCheck | Self::ScheduledCheck, true) => Self::Dispatched,
            (Self::WalkInCheck, false) => Self::ScheduledCheck,
            (Self::ScheduledCheck, false) => Self::Empty,
            (terminal, _) => terminal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalledClient {
    pub client_id: ClientId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub mode: EntryMode,
    pub client_notified: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched(CalledClient),
    /// Nothing waiting; a normal outcome.
    Empty,
}

impl DispatchOutcome {
    pub fn called(&self) -> Option<&CalledClient> {
        match self {
            Self::Dispatched(called) => Some(called),
            Self::Empty => None,
        }
    }

    /// One-line summary for the provider.
    pub fn summary(&self) -> String {
        match self {
            Self::Dispatched(CalledClient { mode: EntryMode::WalkIn { position }, .. }) => {
                format!("Next client called (position {position}).")
            }
            Self::Dispatched(CalledClient { mode: EntryMode::Scheduled { slot }, .. }) => {
                format!("Booked client called: {slot}.")
            }
            Self::Empty => "Queue is empty.".to_string(),
        }
    }
}

pub struct DispatchEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S, N> DispatchEngine<S, N>
where
    S: DirectoryStore + QueueStore,
    N: Notifier,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    pub async fn call_next(
        &self,
        provider: &Provider,
    ) -> Result<DispatchOutcome, ApplicationError> {
        let popped = self.store.pop_next(provider.id).await?;
        let state = DispatchState::resolve(popped.as_ref());

        let entry = match (state, popped) {
            (DispatchState::Dispatched, Some(entry)) => entry,
            _ => {
                info!(
                    event_name = "dispatch.queue_empty",
                    provider_id = provider.id.0,
                    "call next found an empty queue"
                );
                return Ok(DispatchOutcome::Empty);
            }
        };

        let service_name = match self.store.service_by_id(entry.service_id).await {
            Ok(Some(service)) => service.name,
            _ => UNKNOWN_SERVICE.to_string(),
        };
        let kind = match entry.mode {
            EntryMode::WalkIn { .. } => {
                NotificationKind::TurnReached { service_name: service_name.clone() }
            }
            EntryMode::Scheduled { slot } => {
                NotificationKind::AppointmentDue { service_name: service_name.clone(), slot }
            }
        };
        let notification = Notification::new(Recipient(entry.client_id.0), kind);
        let client_notified = deliver_best_effort(self.notifier.as_ref(), &notification).await;

        info!(
            event_name = "dispatch.client_called",
            provider_id = provider.id.0,
            client_id = entry.client_id.0,
            walk_in = entry.mode.is_walk_in(),
            client_notified,
            "next client dispatched"
        );

        Ok(DispatchOutcome::Dispatched(CalledClient {
            client_id: entry.client_id,
            service_id: entry.service_id,
            service_name,
            mode: entry.mode,
            client_notified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::{DispatchEngine, DispatchOutcome, DispatchState};
    use crate::domain::provider::{
        OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId,
    };
    use crate::domain::queue::{
        ClientId, EntryMode, QueueEntry, QueueEntryId, QueueLane, QueueListing,
    };
    use crate::domain::slot::{Slot, SlotTime};
    use crate::errors::ApplicationError;
    use crate::notify::{InMemoryNotifier, NotificationKind, Recipient};
    use crate::store::{DirectoryStore, InMemoryStore, QueueStore};

    #[test]
    fn transition_table_matches_walk_in_first_policy() {
        use DispatchState::*;

        assert_eq!(WalkInCheck.next(true), Dispatched);
        assert_eq!(WalkInCheck.next(false), ScheduledCheck);
        assert_eq!(ScheduledCheck.next(true), Dispatched);
        assert_eq!(ScheduledCheck.next(false), Empty);
        assert_eq!(Empty.next(true), Empty);
        assert_eq!(Dispatched.next(false), Dispatched);

        assert_eq!(WalkInCheck.lane(), Some(QueueLane::WalkIn));
        assert_eq!(ScheduledCheck.lane(), Some(QueueLane::Scheduled));
        assert!(Empty.is_terminal() && Dispatched.is_terminal());
    }

    #[test]
    fn resolve_replays_the_table_for_the_popped_lane() {
        let entry = |mode| QueueEntry {
            id: QueueEntryId(1),
            provider_id: ProviderId(1),
            client_id: ClientId(1),
            service_id: ServiceId(1),
            mode,
        };
        let walk_in = entry(EntryMode::WalkIn { position: 1 });
        let slot = Slot::parse("2025-08-20", "09:00").unwrap();
        let booked = entry(EntryMode::Scheduled { slot });

        assert_eq!(DispatchState::resolve(Some(&walk_in)), DispatchState::Dispatched);
        assert_eq!(DispatchState::resolve(Some(&booked)), DispatchState::Dispatched);
        assert_eq!(DispatchState::resolve(None), DispatchState::Empty);
    }

    async fn setup() -> (Arc<InMemoryStore>, Arc<InMemoryNotifier>, Provider, ServiceId) {
        let store = Arc::new(InMemoryStore::default());
        let notifier = Arc::new(InMemoryNotifier::default());
        let provider = store
            .insert_provider(OwnerId(1), "Salon", &ReferralCode("beef0001".to_string()))
            .await
            .expect("provider");
        let service =
            store.insert_service(provider.id, "Haircut").await.expect("insert").expect("new");
        (store, notifier, provider, service.id)
    }

    #[tokio::test]
    async fn walk_ins_are_called_in_arrival_order_then_empty() {
        let (store, notifier, provider, service) = setup().await;
        for client in [11, 12, 13] {
            store.append_walk_in(provider.id, ClientId(client), service).await.expect("walk-in");
        }
        let engine = DispatchEngine::new(store.clone(), notifier.clone());

        let mut called = Vec::new();
        for _ in 0..3 {
            let outcome = engine.call_next(&provider).await.expect("call next");
            called.push(outcome.called().expect("dispatched").client_id.0);
        }
        assert_eq!(called, vec![11, 12, 13]);
        assert_eq!(engine.call_next(&provider).await.expect("call next"), DispatchOutcome::Empty);

        let recipients: Vec<Recipient> =
            notifier.delivered().into_iter().map(|notification| notification.recipient).collect();
        assert_eq!(recipients, vec![Recipient(11), Recipient(12), Recipient(13)]);
    }

    #[tokio::test]
    async fn walk_in_beats_earlier_scheduled_entry() {
        let (store, notifier, provider, service) = setup().await;
        let past = Slot::parse("2020-01-01", "09:00").unwrap();
        store.insert_scheduled(provider.id, ClientId(1), service, past).await.expect("booking");
        store.append_walk_in(provider.id, ClientId(2), service).await.expect("walk-in");
        let engine = DispatchEngine::new(store.clone(), notifier);

        let first = engine.call_next(&provider).await.expect("call next");
        assert_eq!(first.called().map(|c| c.client_id), Some(ClientId(2)));

        let second = engine.call_next(&provider).await.expect("call next");
        assert_eq!(second.called().map(|c| c.mode), Some(EntryMode::Scheduled { slot: past }));
    }

    #[tokio::test]
    async fn scheduled_entry_is_popped_and_removed() {
        let (store, notifier, provider, service) = setup().await;
        let slot = Slot::parse("2025-08-20", "09:00").unwrap();
        store.insert_scheduled(provider.id, ClientId(7), service, slot).await.expect("booking");
        let engine = DispatchEngine::new(store.clone(), notifier.clone());

        let outcome = engine.call_next(&provider).await.expect("call next");
        let called = outcome.called().expect("dispatched");
        assert_eq!(called.client_id, ClientId(7));
        assert_eq!(called.service_name, "Haircut");
        assert_eq!(outcome.summary(), "Booked client called: 2025-08-20 09:00.");
        assert!(matches!(
            notifier.delivered()[0].kind,
            NotificationKind::AppointmentDue { slot: s, .. } if s == slot
        ));

        assert_eq!(engine.call_next(&provider).await.expect("call next"), DispatchOutcome::Empty);
    }

    #[tokio::test]
    async fn unreachable_client_does_not_roll_back_pop() {
        let (store, notifier, provider, service) = setup().await;
        store.append_walk_in(provider.id, ClientId(99), service).await.expect("walk-in");
        notifier.mark_unreachable(Recipient(99));
        let engine = DispatchEngine::new(store.clone(), notifier);

        let outcome = engine.call_next(&provider).await.expect("call next");
        assert_eq!(outcome.called().map(|c| c.client_notified), Some(false));
        assert!(store.listings(provider.id, None).await.expect("list").is_empty());
    }

    /// Appends a walk-in for `late_client` as soon as the first queue pop
    /// returns, standing in for a client who arrives mid-dispatch.
    struct ArrivalDuringDispatch {
        inner: InMemoryStore,
        late_client: ClientId,
        service: ServiceId,
        pops: AtomicUsize,
    }

    #[async_trait]
    impl DirectoryStore for ArrivalDuringDispatch {
        async fn insert_provider(
            &self,
            owner_id: OwnerId,
            name: &str,
            referral_code: &ReferralCode,
        ) -> Result<Provider, ApplicationError> {
            self.inner.insert_provider(owner_id, name, referral_code).await
        }

        async fn provider_by_owner(
            &self,
            owner_id: OwnerId,
        ) -> Result<Option<Provider>, ApplicationError> {
            self.inner.provider_by_owner(owner_id).await
        }

        async fn provider_by_referral(
            &self,
            referral_code: &str,
        ) -> Result<Option<Provider>, ApplicationError> {
            self.inner.provider_by_referral(referral_code).await
        }

        async fn provider_by_id(
            &self,
            id: ProviderId,
        ) -> Result<Option<Provider>, ApplicationError> {
            self.inner.provider_by_id(id).await
        }

        async fn delete_provider(&self, id: ProviderId) -> Result<bool, ApplicationError> {
            self.inner.delete_provider(id).await
        }

        async fn insert_service(
            &self,
            provider_id: ProviderId,
            name: &str,
        ) -> Result<Option<Service>, ApplicationError> {
            self.inner.insert_service(provider_id, name).await
        }

        async fn services(
            &self,
            provider_id: ProviderId,
        ) -> Result<Vec<Service>, ApplicationError> {
            self.inner.services(provider_id).await
        }

        async fn service_by_id(&self, id: ServiceId) -> Result<Option<Service>, ApplicationError> {
            self.inner.service_by_id(id).await
        }
    }

    #[async_trait]
    impl QueueStore for ArrivalDuringDispatch {
        async fn append_walk_in(
            &self,
            provider_id: ProviderId,
            client_id: ClientId,
            service_id: ServiceId,
        ) -> Result<QueueEntry, ApplicationError> {
            self.inner.append_walk_in(provider_id, client_id, service_id).await
        }

        async fn insert_scheduled(
            &self,
            provider_id: ProviderId,
            client_id: ClientId,
            service_id: ServiceId,
            slot: Slot,
        ) -> Result<QueueEntry, ApplicationError> {
            self.inner.insert_scheduled(provider_id, client_id, service_id, slot).await
        }

        async fn booked_times(
            &self,
            provider_id: ProviderId,
            date: NaiveDate,
        ) -> Result<BTreeSet<SlotTime>, ApplicationError> {
            self.inner.booked_times(provider_id, date).await
        }

        async fn listings(
            &self,
            provider_id: ProviderId,
            lane: Option<QueueLane>,
        ) -> Result<Vec<QueueListing>, ApplicationError> {
            self.inner.listings(provider_id, lane).await
        }

        async fn pop_next(
            &self,
            provider_id: ProviderId,
        ) -> Result<Option<QueueEntry>, ApplicationError> {
            let popped = self.inner.pop_next(provider_id).await?;
            if self.pops.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.append_walk_in(provider_id, self.late_client, self.service).await?;
            }
            Ok(popped)
        }

        async fn clear(&self, provider_id: ProviderId) -> Result<u64, ApplicationError> {
            self.inner.clear(provider_id).await
        }
    }

    #[tokio::test]
    async fn walk_in_arriving_mid_dispatch_is_called_next_not_skipped() {
        let inner = InMemoryStore::default();
        let provider = inner
            .insert_provider(OwnerId(1), "Salon", &ReferralCode("beef0002".to_string()))
            .await
            .expect("provider");
        let service =
            inner.insert_service(provider.id, "Haircut").await.expect("insert").expect("new").id;
        let slot = Slot::parse("2025-08-20", "09:00").unwrap();
        inner.insert_scheduled(provider.id, ClientId(7), service, slot).await.expect("booking");
        let store = Arc::new(ArrivalDuringDispatch {
            inner,
            late_client: ClientId(8),
            service,
            pops: AtomicUsize::new(0),
        });
        let engine = DispatchEngine::new(store.clone(), Arc::new(InMemoryNotifier::default()));

        let first = engine.call_next(&provider).await.expect("call next");
        assert_eq!(store.pops.load(Ordering::SeqCst), 1, "one atomic pop per call");
        assert_eq!(first.called().map(|c| c.mode), Some(EntryMode::Scheduled { slot }));

        let second = engine.call_next(&provider).await.expect("call next");
        assert_eq!(second.called().map(|c| c.client_id), Some(ClientId(8)));
        assert_eq!(engine.call_next(&provider).await.expect("call next"), DispatchOutcome::Empty);
    }
}
