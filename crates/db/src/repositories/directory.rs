use async_trait::async_trait;

use lineup_core::domain::provider::{
    OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId,
};
use lineup_core::errors::{ApplicationError, DomainError};
use lineup_core::store::DirectoryStore;

use super::{
    provider_from_row, service_from_row, violation, RepositoryError, SqlLineupRepository, Violation,
};

const PROVIDER_SELECT: &str = "SELECT id, owner_id, name, ref_code FROM providers";

#[async_trait]
impl DirectoryStore for SqlLineupRepository {
    async fn insert_provider(
        &self,
        owner_id: OwnerId,
        name: &str,
        referral_code: &ReferralCode,
    ) -> Result<Provider, ApplicationError> {
        let result =
            sqlx::query("INSERT INTO providers (owner_id, name, ref_code) VALUES (?, ?, ?)")
                .bind(owner_id.0)
                .bind(name)
                .bind(referral_code.as_str())
                .execute(self.pool())
                .await;

        match result {
            Ok(done) => Ok(Provider {
                id: ProviderId(done.last_insert_rowid()),
                owner_id,
                name: name.to_string(),
                referral_code: referral_code.clone(),
            }),
            Err(error) => match violation(&error) {
                Some(Violation::Unique(message)) if message.contains("ref_code") => {
                    Err(DomainError::ReferralCodeTaken.into())
                }
                Some(Violation::Unique(_)) => {
                    Err(DomainError::AlreadyRegistered { owner_id }.into())
                }
                _ => Err(RepositoryError::from(error).into()),
            },
        }
    }

    async fn provider_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<Provider>, ApplicationError> {
        let row = sqlx::query(&format!("{PROVIDER_SELECT} WHERE owner_id = ?"))
            .bind(owner_id.0)
            .fetch_optional(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(provider_from_row).transpose()?)
    }

    async fn provider_by_referral(
        &self,
        referral_code: &str,
    ) -> Result<Option<Provider>, ApplicationError> {
        let row = sqlx::query(&format!("{PROVIDER_SELECT} WHERE ref_code = ?"))
            .bind(referral_code)
            .fetch_optional(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(provider_from_row).transpose()?)
    }

    async fn provider_by_id(&self, id: ProviderId) -> Result<Option<Provider>, ApplicationError> {
        let row = sqlx::query(&format!("{PROVIDER_SELECT} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(provider_from_row).transpose()?)
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<bool, ApplicationError> {
        let done = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id.0)
            .execute(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        Ok(done.rows_affected() > 0)
    }

    async fn insert_service(
        &self,
        provider_id: ProviderId,
        name: &str,
    ) -> Result<Option<Service>, ApplicationError> {
        let result = sqlx::query("INSERT INTO services (provider_id, name) VALUES (?, ?)")
            .bind(provider_id.0)
            .bind(name)
            .execute(self.pool())
            .await;

        match result {
            Ok(done) => Ok(Some(Service {
                id: ServiceId(done.last_insert_rowid()),
                provider_id,
                name: name.to_string(),
            })),
            Err(error) => match violation(&error) {
                Some(Violation::Unique(_)) => Ok(None),
                Some(Violation::ForeignKey) => {
                    Err(DomainError::ProviderNotFound { reference: provider_id.to_string() }.into())
                }
                None => Err(RepositoryError::from(error).into()),
            },
        }
    }

    async fn services(&self, provider_id: ProviderId) -> Result<Vec<Service>, ApplicationError> {
        let rows = sqlx::query(
            "SELECT id, provider_id, name FROM services WHERE provider_id = ? ORDER BY id",
        )
        .bind(provider_id.0)
        .fetch_all(self.pool())
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(service_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn service_by_id(&self, id: ServiceId) -> Result<Option<Service>, ApplicationError> {
        let row = sqlx::query("SELECT id, provider_id, name FROM services WHERE id = ?")
            .bind(id.0)
            .fetch_optional(self.pool())
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(service_from_row).transpose()?)
    }
}
