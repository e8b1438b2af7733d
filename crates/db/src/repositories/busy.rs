use async_trait::async_trait;

use lineup_core::domain::busy::{BusyBlock, BusyBlockId};
use lineup_core::domain::provider::ProviderId;
use lineup_core::domain::slot::Slot;
use lineup_core::errors::{ApplicationError, DomainError};
use lineup_core::store::BusyBlockStore;

use super::{
    busy_block_from_row, date_param, time_param, violation, RepositoryError, SqlLineupRepository,
    Violation,
};

#[async_trait]
impl BusyBlockStore for SqlLineupRepository {
    async fn insert_busy_block(
        &self,
        provider_id: ProviderId,
        slot: Slot,
    ) -> Result<BusyBlock, ApplicationError> {
        let mut tx =
            self.pool().begin_with("BEGIN IMMEDIATE").await.map_err(RepositoryError::from)?;
        let inserted = sqlx::query(
            "INSERT INTO busy_blocks (provider_id, block_date, block_time) VALUES (?, ?, ?)
             ON CONFLICT (provider_id, block_date, block_time) DO NOTHING",
        )
        .bind(provider_id.0)
        .bind(date_param(slot.date))
        .bind(time_param(slot.time))
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            return match violation(&error) {
                Some(Violation::ForeignKey) => {
                    Err(DomainError::ProviderNotFound { reference: provider_id.to_string() }.into())
                }
                _ => Err(RepositoryError::from(error).into()),
            };
        }

        let row = sqlx::query(
            "SELECT id, provider_id, block_date, block_time FROM busy_blocks
             WHERE provider_id = ? AND block_date = ? AND block_time = ?",
        )
        .bind(provider_id.0)
        .bind(date_param(slot.date))
        .bind(time_param(slot.time))
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;
        let block = busy_block_from_row(&row)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(block)
    }

    async fn delete_busy_block(
        &self,
        provider_id: ProviderId,
        id: BusyBlockId,
    ) -> Result<bool, ApplicationError> {
        let done = sqlx::query("DELETE FROM busy_blocks WHERE id = ? AND provider_id = ?")
            .bind(id.0)
            .bind(provider_id.0)
            .execute(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        Ok(done.rows_affected() > 0)
    }

    async fn busy_blocks(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<BusyBlock>, ApplicationError> {
        let rows = sqlx::query(
            "SELECT id, provider_id, block_date, block_time FROM busy_blocks
             WHERE provider_id = ?
             ORDER BY block_date, block_time",
        )
        .bind(provider_id.0)
        .fetch_all(self.pool())
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(busy_block_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}
