//! Service-boundary error model.

use thiserror::Error;

use shopdesk_auth::AuthzError;
use shopdesk_core::DomainError;
use shopdesk_documents::DocumentError;
use shopdesk_events::EnvelopeError;

use crate::config::ConfigError;
use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Everything an application service can fail with.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The access policy denied the operation; nothing was read or written.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The access policy itself failed (not a denial).
    #[error("access policy failure: {0}")]
    Authz(AuthzError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(permission) => ServiceError::PermissionDenied(permission),
            AuthzError::UnknownAccount(account) => {
                ServiceError::PermissionDenied(format!("unknown account {account}"))
            }
            other => ServiceError::Authz(other),
        }
    }
}

impl ServiceError {
    /// Whether the failure is the actor's to fix (shown as a validation
    /// message), as opposed to an infrastructure fault.
    pub fn is_user_facing(&self) -> bool {
        match self {
            ServiceError::PermissionDenied(_) | ServiceError::Domain(_) => true,
            ServiceError::Store(e) => matches!(
                e,
                StoreError::Concurrency(_) | StoreError::Conflict(_) | StoreError::MissingReference(_)
            ),
            ServiceError::Authz(AuthzError::AlreadyAssigned(_)) => true,
            ServiceError::Authz(_)
            | ServiceError::Document(_)
            | ServiceError::Envelope(_)
            | ServiceError::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_core::AccountId;

    #[test]
    fn denials_become_permission_denied() {
        let err: ServiceError = AuthzError::Forbidden("sales.manage".to_string()).into();
        assert!(matches!(err, ServiceError::PermissionDenied(ref p) if p == "sales.manage"));

        let err: ServiceError = AuthzError::UnknownAccount(AccountId::new()).into();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[test]
    fn domain_and_uniqueness_failures_are_user_facing() {
        assert!(ServiceError::from(DomainError::RepairNotFinished).is_user_facing());
        assert!(ServiceError::from(StoreError::Conflict("phone".into())).is_user_facing());
        assert!(!ServiceError::from(StoreError::Database("down".into())).is_user_facing());
        assert!(!ServiceError::from(AuthzError::Unavailable).is_user_facing());
    }
}
