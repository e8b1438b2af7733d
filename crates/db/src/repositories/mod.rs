use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use lineup_core::domain::busy::{BusyBlock, BusyBlockId};
use lineup_core::domain::provider::{
    OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId,
};
use lineup_core::domain::queue::{ClientId, EntryMode, QueueEntry, QueueEntryId};
use lineup_core::domain::slot::{format_date, parse_date, Slot, SlotTime};
use lineup_core::errors::ApplicationError;

use crate::DbPool;

pub mod busy;
pub mod directory;
pub mod queue;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// SQLite backend for every booking store port.
///
/// Read-then-write operations run inside `BEGIN IMMEDIATE` transactions so the
/// database write lock is held from the first read; unique indexes back the
/// same invariants at the storage level.
#[derive(Clone)]
pub struct SqlLineupRepository {
    pool: DbPool,
}

impl SqlLineupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Violation {
    Unique(String),
    ForeignKey,
}

/// Classifies constraint failures so callers can raise the matching domain error.
pub(crate) fn violation(error: &sqlx::Error) -> Option<Violation> {
    let sqlx::Error::Database(db_error) = error else {
        return None;
    };
    if db_error.is_unique_violation() {
        return Some(Violation::Unique(db_error.message().to_string()));
    }
    if db_error.is_foreign_key_violation() {
        return Some(Violation::ForeignKey);
    }
    None
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn date_param(date: NaiveDate) -> String {
    format_date(date)
}

pub(crate) fn time_param(time: SlotTime) -> String {
    time.to_string()
}

fn slot_from_columns(date: &str, time: &str) -> Result<Slot, RepositoryError> {
    let date = parse_date(date).map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let time =
        time.parse::<SlotTime>().map_err(|error| RepositoryError::Decode(error.to_string()))?;
    Ok(Slot::new(date, time))
}

pub(crate) fn provider_from_row(row: &SqliteRow) -> Result<Provider, RepositoryError> {
    Ok(Provider {
        id: ProviderId(decode(row.try_get("id"))?),
        owner_id: OwnerId(decode(row.try_get("owner_id"))?),
        name: decode(row.try_get("name"))?,
        referral_code: ReferralCode(decode(row.try_get("ref_code"))?),
    })
}

pub(crate) fn service_from_row(row: &SqliteRow) -> Result<Service, RepositoryError> {
    Ok(Service {
        id: ServiceId(decode(row.try_get("id"))?),
        provider_id: ProviderId(decode(row.try_get("provider_id"))?),
        name: decode(row.try_get("name"))?,
    })
}

pub(crate) fn entry_from_row(row: &SqliteRow) -> Result<QueueEntry, RepositoryError> {
    let position: Option<i64> = decode(row.try_get("position"))?;
    let slot_date: Option<String> = decode(row.try_get("slot_date"))?;
    let slot_time: Option<String> = decode(row.try_get("slot_time"))?;

    let mode = match (position, slot_date, slot_time) {
        (Some(position), None, None) => EntryMode::WalkIn {
            position: u32::try_from(position).map_err(|_| {
                RepositoryError::Decode(format!("walk-in position out of range: {position}"))
            })?,
        },
        (None, Some(date), Some(time)) => {
            EntryMode::Scheduled { slot: slot_from_columns(&date, &time)? }
        }
        _ => {
            return Err(RepositoryError::Decode(
                "queue entry must carry either a position or a slot".to_string(),
            ))
        }
    };

    Ok(QueueEntry {
        id: QueueEntryId(decode(row.try_get("id"))?),
        provider_id: ProviderId(decode(row.try_get("provider_id"))?),
        client_id: ClientId(decode(row.try_get("client_id"))?),
        service_id: ServiceId(decode(row.try_get("service_id"))?),
        mode,
    })
}

pub(crate) fn busy_block_from_row(row: &SqliteRow) -> Result<BusyBlock, RepositoryError> {
    let date: String = decode(row.try_get("block_date"))?;
    let time: String = decode(row.try_get("block_time"))?;
    Ok(BusyBlock {
        id: BusyBlockId(decode(row.try_get("id"))?),
        provider_id: ProviderId(decode(row.try_get("provider_id"))?),
        slot: slot_from_columns(&date, &time)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use lineup_core::domain::provider::{OwnerId, Provider, ReferralCode, ServiceId};
    use lineup_core::store::DirectoryStore;

    use super::SqlLineupRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub async fn provider_with_service(
        repo: &SqlLineupRepository,
        owner: i64,
        code: &str,
    ) -> (Provider, ServiceId) {
        let provider = repo
            .insert_provider(OwnerId(owner), "Salon", &ReferralCode(code.to_string()))
            .await
            .expect("insert provider");
        let service = repo
            .insert_service(provider.id, "Haircut")
            .await
            .expect("insert service")
            .expect("new service");
        (provider, service.id)
    }
}
