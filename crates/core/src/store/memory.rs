use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::domain::busy::{BusyBlock, BusyBlockId};
use crate::domain::provider::{OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId};
use crate::domain::queue::{
    sort_listings, ClientId, EntryMode, QueueEntry, QueueEntryId, QueueLane, QueueListing,
};
use crate::domain::slot::{Slot, SlotTime};
use crate::errors::{ApplicationError, DomainError};

use super::{BusyBlockStore, DirectoryStore, QueueStore, UNKNOWN_SERVICE};

/// Process-local store. One lock guards all state, so every call is serializable.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    providers: BTreeMap<ProviderId, ProviderRecord>,
    services: BTreeMap<ServiceId, Service>,
    entries: BTreeMap<QueueEntryId, QueueEntry>,
    busy_blocks: BTreeMap<BusyBlockId, BusyBlock>,
}

struct ProviderRecord {
    provider: Provider,
    last_walk_in_position: u32,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_provider(&mut self, id: ProviderId) -> Result<&mut ProviderRecord, DomainError> {
        self.providers
            .get_mut(&id)
            .ok_or_else(|| DomainError::ProviderNotFound { reference: id.to_string() })
    }

    fn require_service(&self, provider_id: ProviderId, id: ServiceId) -> Result<(), DomainError> {
        match self.services.get(&id) {
            Some(service) if service.provider_id == provider_id => Ok(()),
            _ => Err(DomainError::ServiceNotFound { service_id: id }),
        }
    }

    fn booked_times(&self, provider_id: ProviderId, date: NaiveDate) -> BTreeSet<SlotTime> {
        let scheduled = self
            .entries
            .values()
            .filter(|entry| entry.provider_id == provider_id)
            .filter_map(|entry| entry.mode.slot())
            .filter(|slot| slot.date == date)
            .map(|slot| slot.time);
        let blocked = self
            .busy_blocks
            .values()
            .filter(|block| block.provider_id == provider_id && block.slot.date == date)
            .map(|block| block.slot.time);
        scheduled.chain(blocked).collect()
    }

    fn service_name(&self, id: ServiceId) -> String {
        self.services
            .get(&id)
            .map(|service| service.name.clone())
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string())
    }
}

fn in_lane(entry: &QueueEntry, lane: QueueLane) -> bool {
    entry.mode.lane() == lane
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn insert_provider(
        &self,
        owner_id: OwnerId,
        name: &str,
        referral_code: &ReferralCode,
    ) -> Result<Provider, ApplicationError> {
        let mut state = self.state.lock().await;
        for record in state.providers.values() {
            if record.provider.owner_id == owner_id {
                return Err(DomainError::AlreadyRegistered { owner_id }.into());
            }
            if &record.provider.referral_code == referral_code {
                return Err(DomainError::ReferralCodeTaken.into());
            }
        }

        let provider = Provider {
            id: ProviderId(state.allocate_id()),
            owner_id,
            name: name.to_string(),
            referral_code: referral_code.clone(),
        };
        state.providers.insert(
            provider.id,
            ProviderRecord { provider: provider.clone(), last_walk_in_position: 0 },
        );
        Ok(provider)
    }

    async fn provider_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<Provider>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state
            .providers
            .values()
            .find(|record| record.provider.owner_id == owner_id)
            .map(|record| record.provider.clone()))
    }

    async fn provider_by_referral(
        &self,
        referral_code: &str,
    ) -> Result<Option<Provider>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state
            .providers
            .values()
            .find(|record| record.provider.referral_code.as_str() == referral_code)
            .map(|record| record.provider.clone()))
    }

    async fn provider_by_id(&self, id: ProviderId) -> Result<Option<Provider>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.providers.get(&id).map(|record| record.provider.clone()))
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<bool, ApplicationError> {
        let mut state = self.state.lock().await;
        if state.providers.remove(&id).is_none() {
            return Ok(false);
        }
        state.services.retain(|_, service| service.provider_id != id);
        state.entries.retain(|_, entry| entry.provider_id != id);
        state.busy_blocks.retain(|_, block| block.provider_id != id);
        Ok(true)
    }

    async fn insert_service(
        &self,
        provider_id: ProviderId,
        name: &str,
    ) -> Result<Option<Service>, ApplicationError> {
        let mut state = self.state.lock().await;
        state.require_provider(provider_id)?;
        let duplicate = state
            .services
            .values()
            .any(|service| service.provider_id == provider_id && service.name == name);
        if duplicate {
            return Ok(None);
        }

        let service =
            Service { id: ServiceId(state.allocate_id()), provider_id, name: name.to_string() };
        state.services.insert(service.id, service.clone());
        Ok(Some(service))
    }

    async fn services(&self, provider_id: ProviderId) -> Result<Vec<Service>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state
            .services
            .values()
            .filter(|service| service.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn service_by_id(&self, id: ServiceId) -> Result<Option<Service>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.services.get(&id).cloned())
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn append_walk_in(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
    ) -> Result<QueueEntry, ApplicationError> {
        let mut state = self.state.lock().await;
        state.require_service(provider_id, service_id)?;

        let current_max = state
            .entries
            .values()
            .filter(|entry| entry.provider_id == provider_id)
            .filter_map(|entry| entry.mode.position())
            .max()
            .unwrap_or(0);
        let record = state.require_provider(provider_id)?;
        let position = record.last_walk_in_position.max(current_max) + 1;
        record.last_walk_in_position = position;

        let entry = QueueEntry {
            id: QueueEntryId(state.allocate_id()),
            provider_id,
            client_id,
            service_id,
            mode: EntryMode::WalkIn { position },
        };
        state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn insert_scheduled(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
        slot: Slot,
    ) -> Result<QueueEntry, ApplicationError> {
        let mut state = self.state.lock().await;
        state.require_provider(provider_id)?;
        state.require_service(provider_id, service_id)?;
        if state.booked_times(provider_id, slot.date).contains(&slot.time) {
            return Err(DomainError::SlotConflict { slot }.into());
        }

        let entry = QueueEntry {
            id: QueueEntryId(state.allocate_id()),
            provider_id,
            client_id,
            service_id,
            mode: EntryMode::Scheduled { slot },
        };
        state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn booked_times(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> Result<BTreeSet<SlotTime>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.booked_times(provider_id, date))
    }

    async fn listings(
        &self,
        provider_id: ProviderId,
        lane: Option<QueueLane>,
    ) -> Result<Vec<QueueListing>, ApplicationError> {
        let state = self.state.lock().await;
        let mut listings: Vec<QueueListing> = state
            .entries
            .values()
            .filter(|entry| entry.provider_id == provider_id)
            .filter(|entry| lane.map_or(true, |lane| in_lane(entry, lane)))
            .map(|entry| QueueListing {
                entry: entry.clone(),
                service_name: state.service_name(entry.service_id),
            })
            .collect();
        sort_listings(&mut listings);
        Ok(listings)
    }

    async fn pop_next(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<QueueEntry>, ApplicationError> {
        let mut state = self.state.lock().await;
        let head = state
            .entries
            .values()
            .filter(|entry| entry.provider_id == provider_id)
            .min_by(|a, b| a.mode.cmp(&b.mode).then(a.id.cmp(&b.id)))
            .map(|entry| entry.id);

        Ok(head.and_then(|id| state.entries.remove(&id)))
    }

    async fn clear(&self, provider_id: ProviderId) -> Result<u64, ApplicationError> {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.provider_id != provider_id);
        Ok((before - state.entries.len()) as u64)
    }
}

#[async_trait]
impl BusyBlockStore for InMemoryStore {
    async fn insert_busy_block(
        &self,
        provider_id: ProviderId,
        slot: Slot,
    ) -> Result<BusyBlock, ApplicationError> {
        let mut state = self.state.lock().await;
        state.require_provider(provider_id)?;
        let existing = state
            .busy_blocks
            .values()
            .find(|block| block.provider_id == provider_id && block.slot == slot)
            .cloned();
        if let Some(block) = existing {
            return Ok(block);
        }

        let block = BusyBlock { id: BusyBlockId(state.allocate_id()), provider_id, slot };
        state.busy_blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn delete_busy_block(
        &self,
        provider_id: ProviderId,
        id: BusyBlockId,
    ) -> Result<bool, ApplicationError> {
        let mut state = self.state.lock().await;
        let owned =
            state.busy_blocks.get(&id).is_some_and(|block| block.provider_id == provider_id);
        if owned {
            state.busy_blocks.remove(&id);
        }
        Ok(owned)
    }

    async fn busy_blocks(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<BusyBlock>, ApplicationError> {
        let state = self.state.lock().await;
        let mut blocks: Vec<BusyBlock> = state
            .busy_blocks
            .values()
            .filter(|block| block.provider_id == provider_id)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| a.slot.cmp(&b.slot).then(a.id.cmp(&b.id)));
        Ok(blocks)
    }
}
