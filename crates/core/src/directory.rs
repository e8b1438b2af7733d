use std::sync::Arc;

use tracing::info;

use crate::domain::provider::{
    normalize_name, OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId,
};
use crate::errors::{ApplicationError, DomainError};
use crate::store::DirectoryStore;

/// Maps owners to their provider record and providers to their services.
pub struct Directory<S> {
    store: Arc<S>,
}

impl<S> Directory<S>
where
    S: DirectoryStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates the owner's provider record with a fresh referral code.
    ///
    /// A referral code collision surfaces as `ReferralCodeTaken`; callers retry.
    pub async fn register_provider(
        &self,
        owner_id: OwnerId,
        name: &str,
    ) -> Result<Provider, ApplicationError> {
        let name = normalize_name(name)
            .ok_or_else(|| DomainError::InvalidInput("provider name must not be empty".into()))?;
        if self.store.provider_by_owner(owner_id).await?.is_some() {
            return Err(DomainError::AlreadyRegistered { owner_id }.into());
        }

        let provider =
            self.store.insert_provider(owner_id, &name, &ReferralCode::generate()).await?;
        info!(
            event_name = "directory.provider.registered",
            provider_id = provider.id.0,
            owner_id = owner_id.0,
            "provider registered"
        );
        Ok(provider)
    }

    pub async fn provider_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<Provider>, ApplicationError> {
        self.store.provider_by_owner(owner_id).await
    }

    pub async fn provider_by_referral(
        &self,
        referral_code: &str,
    ) -> Result<Option<Provider>, ApplicationError> {
        self.store.provider_by_referral(referral_code.trim()).await
    }

    /// The caller's own provider, or `NotRegistered`.
    pub async fn require_provider(&self, owner_id: OwnerId) -> Result<Provider, ApplicationError> {
        self.provider_by_owner(owner_id)
            .await?
            .ok_or_else(|| DomainError::NotRegistered { owner_id }.into())
    }

    pub async fn resolve_referral(
        &self,
        referral_code: &str,
    ) -> Result<Provider, ApplicationError> {
        self.provider_by_referral(referral_code).await?.ok_or_else(|| {
            DomainError::ProviderNotFound { reference: referral_code.trim().to_string() }.into()
        })
    }

    pub async fn resolve_provider(&self, id: ProviderId) -> Result<Provider, ApplicationError> {
        self.store
            .provider_by_id(id)
            .await?
            .ok_or_else(|| DomainError::ProviderNotFound { reference: id.to_string() }.into())
    }

    /// Removes the owner's provider and everything it owns.
    pub async fn unregister(&self, owner_id: OwnerId) -> Result<Provider, ApplicationError> {
        let provider = self.require_provider(owner_id).await?;
        self.store.delete_provider(provider.id).await?;
        info!(
            event_name = "directory.provider.unregistered",
            provider_id = provider.id.0,
            owner_id = owner_id.0,
            "provider unregistered"
        );
        Ok(provider)
    }

    /// `false` when the name already exists for this provider.
    pub async fn add_service(
        &self,
        provider_id: ProviderId,
        name: &str,
    ) -> Result<bool, ApplicationError> {
        let name = normalize_name(name)
            .ok_or_else(|| DomainError::InvalidInput("service name must not be empty".into()))?;
        let inserted = self.store.insert_service(provider_id, &name).await?;
        info!(
            event_name = "directory.service.added",
            provider_id = provider_id.0,
            duplicate = inserted.is_none(),
            "service add processed"
        );
        Ok(inserted.is_some())
    }

    pub async fn list_services(
        &self,
        provider_id: ProviderId,
    ) -> Result<Vec<Service>, ApplicationError> {
        self.store.services(provider_id).await
    }

    /// The service, provided it belongs to `provider_id`.
    pub async fn service_for(
        &self,
        provider_id: ProviderId,
        service_id: ServiceId,
    ) -> Result<Service, ApplicationError> {
        match self.store.service_by_id(service_id).await? {
            Some(service) if service.provider_id == provider_id => Ok(service),
            _ => Err(DomainError::ServiceNotFound { service_id }.into()),
        }
    }
}
