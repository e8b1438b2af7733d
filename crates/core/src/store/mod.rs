//! Storage ports for the booking engine.
//!
//! Every method is one atomic unit: read-then-write sections (next walk-in
//! position, slot conflict check) must not interleave with another writer for
//! the same provider. SQL backends do this with a write transaction, the
//! in-memory store with a single lock.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::busy::{BusyBlock, BusyBlockId};
use crate::domain::provider::{OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId};
use crate::domain::queue::{ClientId, QueueEntry, QueueLane, QueueListing};
use crate::domain::slot::{Slot, SlotTime};
use crate::errors::ApplicationError;

pub mod memory;

pub use memory::InMemoryStore;

/// Display name used when a service row is gone by the time it is rendered.
pub const UNKNOWN_SERVICE: &str = "service";

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Fails with `AlreadyRegistered` or `ReferralCodeTaken` on uniqueness violations.
    async fn insert_provider(
        &self,
        owner_id: OwnerId,
        name: &str,
        referral_code: &ReferralCode,
    ) -> Result<Provider, ApplicationError>;

    async fn provider_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<Provider>, ApplicationError>;

    async fn provider_by_referral(
        &self,
        referral_code: &str,
    ) -> Result<Option<Provider>, ApplicationError>;

    async fn provider_by_id(&self, id: ProviderId) -> Result<Option<Provider>, ApplicationError>;

    /// Removes the provider together with its services, queue entries and busy blocks.
    async fn delete_provider(&self, id: ProviderId) -> Result<bool, ApplicationError>;

    /// Returns `None` when the provider already has a service with this name.
    async fn insert_service(
        &self,
        provider_id: ProviderId,
        name: &str,
    ) -> Result<Option<Service>, ApplicationError>;

    async fn services(&self, provider_id: ProviderId) -> Result<Vec<Service>, ApplicationError>;

    async fn service_by_id(&self, id: ServiceId) -> Result<Option<Service>, ApplicationError>;
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Appends a walk-in at `1 + max(high-water mark, current max position)`.
    async fn append_walk_in(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
    ) -> Result<QueueEntry, ApplicationError>;

    /// Inserts a scheduled entry, failing with `SlotConflict` when the slot is
    /// booked or blocked at commit time.
    async fn insert_scheduled(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
        slot: Slot,
    ) -> Result<QueueEntry, ApplicationError>;

    /// Union of scheduled entry times and busy block times on `date`.
    async fn booked_times(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> Result<BTreeSet<SlotTime>, ApplicationError>;

    /// Entries in queue view order, optionally restricted to one lane.
    async fn listings(
        &self,
        provider_id: ProviderId,
        lane: Option<QueueLane>,
    ) -> Result<Vec<QueueListing>, ApplicationError>;

    /// Removes and returns the lowest walk-in, or the earliest scheduled entry
    /// when no walk-in is waiting. Both lanes are probed in the same unit.
    async fn pop_next(&self, provider_id: ProviderId)
        -> Result<Option<QueueEntry>, ApplicationError>;

    async fn clear(&self, provider_id: ProviderId) -> Result<u64, ApplicationError>;
}

#[async_trait]
pub trait BusyBlockStore: Send + Sync {
    /// Returns the existing block when `slot` is already blocked.
    async fn insert_busy_block(
        &self,
        provider_id: ProviderId,
        slot: Slot,
    ) -> Result<BusyBlock, ApplicationError>;

    async fn delete_busy_block(
        &self,
        provider_id: ProviderId,
        id: BusyBlockId,
    ) -> Result<bool, ApplicationError>;

    async fn busy_blocks(&self, provider_id: ProviderId)
        -> Result<Vec<BusyBlock>, ApplicationError>;
}

/// Everything the booking engine needs from one backend.
pub trait LineupStore: DirectoryStore + QueueStore + BusyBlockStore {}

impl<T> LineupStore for T where T: DirectoryStore + QueueStore + BusyBlockStore {}
