use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use lineup_core::domain::provider::{ProviderId, ServiceId};
use lineup_core::domain::queue::{
    ClientId, EntryMode, QueueEntry, QueueEntryId, QueueLane, QueueListing,
};
use lineup_core::domain::slot::{Slot, SlotTime};
use lineup_core::errors::{ApplicationError, DomainError};
use lineup_core::store::QueueStore;

use super::{
    date_param, entry_from_row, time_param, violation, RepositoryError, SqlLineupRepository,
    Violation,
};

const ENTRY_COLUMNS: &str =
    "q.id, q.provider_id, q.client_id, q.service_id, q.position, q.slot_date, q.slot_time";

/// Walk-ins by position first, then scheduled entries chronologically.
const QUEUE_ORDER: &str =
    "ORDER BY (q.position IS NULL), q.position, q.slot_date, q.slot_time, q.id";

fn lane_filter(lane: Option<QueueLane>) -> &'static str {
    match lane {
        None => "",
        Some(QueueLane::WalkIn) => "AND q.position IS NOT NULL",
        Some(QueueLane::Scheduled) => "AND q.position IS NULL",
    }
}

async fn ensure_provider(
    conn: &mut SqliteConnection,
    provider_id: ProviderId,
) -> Result<(), ApplicationError> {
    let exists = sqlx::query("SELECT 1 FROM providers WHERE id = ?")
        .bind(provider_id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(RepositoryError::from)?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(DomainError::ProviderNotFound { reference: provider_id.to_string() }.into())
    }
}

async fn ensure_service(
    conn: &mut SqliteConnection,
    provider_id: ProviderId,
    service_id: ServiceId,
) -> Result<(), ApplicationError> {
    let owned = sqlx::query("SELECT 1 FROM services WHERE id = ? AND provider_id = ?")
        .bind(service_id.0)
        .bind(provider_id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(RepositoryError::from)?
        .is_some();
    if owned {
        Ok(())
    } else {
        Err(DomainError::ServiceNotFound { service_id }.into())
    }
}

async fn slot_taken(
    conn: &mut SqliteConnection,
    provider_id: ProviderId,
    slot: Slot,
) -> Result<bool, ApplicationError> {
    let taken: i64 = sqlx::query(
        "SELECT EXISTS (
                SELECT 1 FROM queue_entries
                WHERE provider_id = ?1 AND position IS NULL AND slot_date = ?2 AND slot_time = ?3
            ) OR EXISTS (
                SELECT 1 FROM busy_blocks
                WHERE provider_id = ?1 AND block_date = ?2 AND block_time = ?3
            ) AS taken",
    )
    .bind(provider_id.0)
    .bind(date_param(slot.date))
    .bind(time_param(slot.time))
    .fetch_one(&mut *conn)
    .await
    .map_err(RepositoryError::from)?
    .try_get("taken")
    .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(taken != 0)
}

#[async_trait]
impl QueueStore for SqlLineupRepository {
    async fn append_walk_in(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
    ) -> Result<QueueEntry, ApplicationError> {
        let mut tx =
            self.pool().begin_with("BEGIN IMMEDIATE").await.map_err(RepositoryError::from)?;
        ensure_service(&mut tx, provider_id, service_id).await?;

        let row = sqlx::query(
            "SELECT p.last_walk_in_position AS high_water,
                    (SELECT COALESCE(MAX(position), 0) FROM queue_entries
                     WHERE provider_id = p.id AND position IS NOT NULL) AS current_max
             FROM providers p WHERE p.id = ?",
        )
        .bind(provider_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?
        .ok_or_else(|| DomainError::ProviderNotFound { reference: provider_id.to_string() })?;

        let high_water: i64 =
            row.try_get("high_water").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let current_max: i64 =
            row.try_get("current_max").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let next = high_water.max(current_max) + 1;
        let position = u32::try_from(next)
            .map_err(|_| RepositoryError::Decode(format!("walk-in position overflow: {next}")))?;

        sqlx::query("UPDATE providers SET last_walk_in_position = ? WHERE id = ?")
            .bind(next)
            .bind(provider_id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        let done = sqlx::query(
            "INSERT INTO queue_entries (provider_id, client_id, service_id, position)
             VALUES (?, ?, ?, ?)",
        )
        .bind(provider_id.0)
        .bind(client_id.0)
        .bind(service_id.0)
        .bind(next)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(provider_id = provider_id.0, position, "walk-in row committed");

        Ok(QueueEntry {
            id: QueueEntryId(done.last_insert_rowid()),
            provider_id,
            client_id,
            service_id,
            mode: EntryMode::WalkIn { position },
        })
    }

    async fn insert_scheduled(
        &self,
        provider_id: ProviderId,
        client_id: ClientId,
        service_id: ServiceId,
        slot: Slot,
    ) -> Result<QueueEntry, ApplicationError> {
        let mut tx =
            self.pool().begin_with("BEGIN IMMEDIATE").await.map_err(RepositoryError::from)?;
        ensure_provider(&mut tx, provider_id).await?;
        ensure_service(&mut tx, provider_id, service_id).await?;
        if slot_taken(&mut tx, provider_id, slot).await? {
            return Err(DomainError::SlotConflict { slot }.into());
        }

        let inserted = sqlx::query(
            "INSERT INTO queue_entries (provider_id, client_id, service_id, slot_date, slot_time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(provider_id.0)
        .bind(client_id.0)
        .bind(service_id.0)
        .bind(date_param(slot.date))
        .bind(time_param(slot.time))
        .execute(&mut *tx)
        .await;

        let done = match inserted {
            Ok(done) => done,
            Err(error) if matches!(violation(&error), Some(Violation::Unique(_))) => {
                return Err(DomainError::SlotConflict { slot }.into());
            }
            Err(error) => return Err(RepositoryError::from(error).into()),
        };

        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(QueueEntry {
            id: QueueEntryId(done.last_insert_rowid()),
            provider_id,
            client_id,
            service_id,
            mode: EntryMode::Scheduled { slot },
        })
    }

    async fn booked_times(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
    ) -> Result<BTreeSet<SlotTime>, ApplicationError> {
        let rows = sqlx::query(
            "SELECT slot_time AS taken_time FROM queue_entries
             WHERE provider_id = ?1 AND position IS NULL AND slot_date = ?2
             UNION
             SELECT block_time AS taken_time FROM busy_blocks
             WHERE provider_id = ?1 AND block_date = ?2",
        )
        .bind(provider_id.0)
        .bind(date_param(date))
        .fetch_all(self.pool())
        .await
        .map_err(RepositoryError::from)?;

        let mut booked = BTreeSet::new();
        for row in rows {
            let raw: String =
                row.try_get("taken_time").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let time = raw.parse::<SlotTime>().map_err(|e| RepositoryError::Decode(e.to_string()))?;
            booked.insert(time);
        }
        Ok(booked)
    }

    async fn listings(
        &self,
        provider_id: ProviderId,
        lane: Option<QueueLane>,
    ) -> Result<Vec<QueueListing>, ApplicationError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS}, s.name AS service_name
             FROM queue_entries q
             JOIN services s ON s.id = q.service_id
             WHERE q.provider_id = ? {filter}
             {QUEUE_ORDER}",
            filter = lane_filter(lane),
        );
        let rows = sqlx::query(&sql)
            .bind(provider_id.0)
            .fetch_all(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in &rows {
            let service_name: String =
                row.try_get("service_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            listings.push(QueueListing { entry: entry_from_row(row)?, service_name });
        }
        Ok(listings)
    }

    async fn pop_next(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<QueueEntry>, ApplicationError> {
        // QUEUE_ORDER puts every walk-in ahead of every booking, so one
        // ordered probe under the write lock covers both lanes.
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries q
             WHERE q.provider_id = ?
             {QUEUE_ORDER}
             LIMIT 1"
        );

        let mut tx =
            self.pool().begin_with("BEGIN IMMEDIATE").await.map_err(RepositoryError::from)?;
        let row = sqlx::query(&sql)
            .bind(provider_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let entry = entry_from_row(&row)?;

        sqlx::query("DELETE FROM queue_entries WHERE id = ?")
            .bind(entry.id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(provider_id = provider_id.0, lane = entry.mode.lane().as_str(), "queue head popped");

        Ok(Some(entry))
    }

    async fn clear(&self, provider_id: ProviderId) -> Result<u64, ApplicationError> {
        let done = sqlx::query("DELETE FROM queue_entries WHERE provider_id = ?")
            .bind(provider_id.0)
            .execute(self.pool())
            .await
            .map_err(RepositoryError::from)?;
        Ok(done.rows_affected())
    }
}
