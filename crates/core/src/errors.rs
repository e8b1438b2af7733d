use thiserror::Error;

use crate::domain::provider::{OwnerId, ServiceId};
use crate::domain::slot::{Slot, SlotTime};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("owner {owner_id} has no provider record")]
    NotRegistered { owner_id: OwnerId },
    #[error("owner {owner_id} already owns a provider record")]
    AlreadyRegistered { owner_id: OwnerId },
    #[error("provider `{reference}` was not found")]
    ProviderNotFound { reference: String },
    #[error("service {service_id} was not found for this provider")]
    ServiceNotFound { service_id: ServiceId },
    #[error("slot {slot} is already taken")]
    SlotConflict { slot: Slot },
    #[error("time {time} is not on the booking grid")]
    SlotOutsideGrid { time: SlotTime },
    #[error("generated referral code collided with an existing one")]
    ReferralCodeTaken,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl DomainError {
    /// Conditions the caller resolves by re-prompting rather than reporting a fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered { .. }
                | Self::SlotConflict { .. }
                | Self::ReferralCodeTaken
                | Self::InvalidInput(_)
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested provider or service could not be found.",
            Self::Conflict { .. } => "That slot was just taken. Please pick another time.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                let message = error.to_string();
                match error {
                    DomainError::ProviderNotFound { .. } | DomainError::ServiceNotFound { .. } => {
                        Self::NotFound { message, correlation_id }
                    }
                    DomainError::AlreadyRegistered { .. }
                    | DomainError::SlotConflict { .. }
                    | DomainError::ReferralCodeTaken => Self::Conflict { message, correlation_id },
                    DomainError::NotRegistered { .. }
                    | DomainError::SlotOutsideGrid { .. }
                    | DomainError::InvalidInput(_) => Self::BadRequest { message, correlation_id },
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
