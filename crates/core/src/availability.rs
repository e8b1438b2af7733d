use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::domain::busy::{BusyBlock, BusyBlockId};
use crate::domain::provider::ProviderId;
use crate::domain::slot::{Slot, SlotTime};
use crate::errors::ApplicationError;
use crate::store::{BusyBlockStore, QueueStore};

pub const DEFAULT_HORIZON_DAYS: u32 = 7;

/// Fixed daily grid of bookable start times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotGrid {
    first_minute: u32,
    end_minute: u32,
    step_minutes: u32,
}

impl SlotGrid {
    /// 09:00 up to but excluding 17:30, every 30 minutes.
    pub const fn standard() -> Self {
        Self { first_minute: 9 * 60, end_minute: 17 * 60 + 30, step_minutes: 30 }
    }

    pub fn slots(&self) -> Vec<SlotTime> {
        (self.first_minute..self.end_minute)
            .step_by(self.step_minutes as usize)
            .filter_map(|minute| SlotTime::from_hm(minute / 60, minute % 60))
            .collect()
    }

    pub fn contains(&self, time: SlotTime) -> bool {
        let minute = time.hour() * 60 + time.minute();
        (self.first_minute..self.end_minute).contains(&minute)
            && (minute - self.first_minute) % self.step_minutes == 0
    }

    /// Grid order minus `booked`.
    pub fn available(&self, booked: &BTreeSet<SlotTime>) -> Vec<SlotTime> {
        self.slots().into_iter().filter(|slot| !booked.contains(slot)).collect()
    }
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self::standard()
    }
}

/// `days` consecutive dates starting with `today`.
pub fn upcoming_dates(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days)).map(|offset| today + Duration::days(offset)).collect()
}

pub struct Availability<S> {
    store: Arc<S>,
    grid: SlotGrid,
    horizon_days: u32,
}

impl<S> Availability<S>
where
    S: QueueStore + BusyBlockStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_grid(store, SlotGrid::standard(), DEFAULT_HORIZON_DAYS)
    }

    pub fn with_grid(store: Arc<S>, grid: SlotGrid, horizon_days: u32) -> Self {
        Self { store, grid, horizon_days }
    }

    pub fn dates_from(&self, today: NaiveDate) -> Vec<NaiveDate> {
        upcoming_dates(today, self.horizon_days)
    }

    pub async fn booked_slots(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> Result<BTreeSet<SlotTime>, ApplicationError> {
        self.store.booked_times(provider_id, date).await
    }

    /// An empty result means the day is fully booked.
    pub async fn available_slots(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> Result<Vec<SlotTime>, ApplicationError> {
        let booked = self.booked_slots(provider_id, date).await?;
        Ok(self.grid.available(&booked))
    }

    pub async fn add_busy_block(
        &self,
        provider_id: ProviderId,
        slot: Slot,
    ) -> Result<BusyBlock, ApplicationError> {
        let block = self.store.insert_busy_block(provider_id, slot).await?;
        info!(
            event_name = "availability.busy_block.added",
            provider_id = provider_id.0,
            busy_block_id = block.id.0,
            slot = %slot,
            "busy block recorded"
        );
        Ok(block)
    }

    pub async fn remove_busy_block(
        &self,
        provider_id: ProviderId,
        id: BusyBlockId,
    ) -> Result<bool, ApplicationError> {
        let removed = self.store.delete_busy_block(provider_id, id).await?;
        info!(
            event_name = "availability.busy_block.removed",
            provider_id = provider_id.0,
            busy_block_id = id.0,
            removed,
            "busy block removal processed"
        );
        Ok(removed)
    }

    pub async fn list_busy_blocks(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<BusyBlock>, ApplicationError> {
        self.store.busy_blocks(provider_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::{upcoming_dates, Availability, SlotGrid};
    use crate::domain::provider::{OwnerId, ReferralCode};
    use crate::domain::queue::ClientId;
    use crate::domain::slot::{Slot, SlotTime};
    use crate::store::{DirectoryStore, InMemoryStore, QueueStore};

    fn time(raw: &str) -> SlotTime {
        raw.parse().expect("valid time")
    }

    #[test]
    fn standard_grid_has_seventeen_half_hour_slots() {
        let slots = SlotGrid::standard().slots();

        assert_eq!(slots.len(), 17);
        assert_eq!(slots.first().map(ToString::to_string), Some("09:00".to_string()));
        assert_eq!(slots.last().map(ToString::to_string), Some("17:00".to_string()));
        assert!(!slots.contains(&time("17:30")));
    }

    #[test]
    fn grid_membership_checks_window_and_step() {
        let grid = SlotGrid::standard();

        assert!(grid.contains(time("09:00")));
        assert!(grid.contains(time("13:30")));
        assert!(!grid.contains(time("08:30")));
        assert!(!grid.contains(time("17:30")));
        assert!(!grid.contains(time("10:15")));
    }

    #[test]
    fn available_preserves_grid_order() {
        let booked: BTreeSet<SlotTime> = [time("09:30"), time("16:00")].into_iter().collect();
        let available = SlotGrid::standard().available(&booked);

        assert_eq!(available.len(), 15);
        assert_eq!(available[0], time("09:00"));
        assert_eq!(available[1], time("10:00"));
        assert!(available.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn upcoming_dates_include_today() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 29).unwrap();
        let dates = upcoming_dates(today, 7);

        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], today);
        assert_eq!(dates[6], NaiveDate::from_ymd_opt(2026, 1, 4).unwrap());
    }

    #[tokio::test]
    async fn booked_slots_union_bookings_and_busy_blocks() {
        let store = Arc::new(InMemoryStore::default());
        let provider = store
            .insert_provider(OwnerId(1), "Salon", &ReferralCode("abcd0001".to_string()))
            .await
            .expect("provider");
        let service =
            store.insert_service(provider.id, "Haircut").await.expect("insert").expect("new");
        let date = NaiveDate::from_ymd_opt(2025, 8, 25).unwrap();
        store
            .insert_scheduled(provider.id, ClientId(7), service.id, Slot::new(date, time("10:00")))
            .await
            .expect("booking");

        let availability = Availability::new(store.clone());
        availability
            .add_busy_block(provider.id, Slot::new(date, time("12:00")))
            .await
            .expect("busy block");

        let booked = availability.booked_slots(provider.id, date).await.expect("booked");
        assert_eq!(booked, [time("10:00"), time("12:00")].into_iter().collect());

        let available = availability.available_slots(provider.id, date).await.expect("available");
        assert_eq!(available.len(), 15);
        assert!(available.contains(&time("09:00")));
        assert!(!available.contains(&time("10:00")));
        assert!(!available.contains(&time("12:00")));

        let other_day = date.succ_opt().unwrap();
        let free = availability.available_slots(provider.id, other_day).await.expect("available");
        assert_eq!(free.len(), 17);
    }

    #[tokio::test]
    async fn fully_blocked_day_yields_empty_availability() {
        let store = Arc::new(InMemoryStore::default());
        let provider = store
            .insert_provider(OwnerId(1), "Salon", &ReferralCode("abcd0002".to_string()))
            .await
            .expect("provider");
        let availability = Availability::new(store.clone());
        let date = NaiveDate::from_ymd_opt(2025, 8, 26).unwrap();

        for slot_time in SlotGrid::standard().slots() {
            availability
                .add_busy_block(provider.id, Slot::new(date, slot_time))
                .await
                .expect("busy block");
        }

        let available = availability.available_slots(provider.id, date).await.expect("available");
        assert!(available.is_empty());
    }
}
