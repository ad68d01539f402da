use thiserror::Error;

use shopdesk_core::AccountId;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("account {0} belongs to no group")]
    UnknownAccount(AccountId),

    #[error("account {0} already belongs to a group")]
    AlreadyAssigned(AccountId),

    #[error("access policy unavailable")]
    Unavailable,
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, Role};

    #[test]
    fn admin_wildcard_grants_everything() {
        let p = Principal::for_role(AccountId::new(), Role::Admin);
        for action in Action::ALL {
            assert!(authorize(&p, &action.required_permission()).is_ok());
        }
    }

    #[test]
    fn employee_runs_point_of_sale_but_not_repairs_or_accounts() {
        let p = Principal::for_role(AccountId::new(), Role::Employee);
        assert!(authorize(&p, &Action::ManageSales.required_permission()).is_ok());
        assert!(authorize(&p, &Action::ManagePurchasing.required_permission()).is_ok());
        assert!(authorize(&p, &Action::PrintDocuments.required_permission()).is_ok());
        assert_eq!(
            authorize(&p, &Action::ManageRepairs.required_permission()),
            Err(AuthzError::Forbidden("repairs.manage".to_string()))
        );
        assert!(authorize(&p, &Action::ManageAccounts.required_permission()).is_err());
    }

    #[test]
    fn repairer_handles_repairs_and_clients_only() {
        let p = Principal::for_role(AccountId::new(), Role::Repairer);
        assert!(authorize(&p, &Action::ManageRepairs.required_permission()).is_ok());
        assert!(authorize(&p, &Action::ManageParties.required_permission()).is_ok());
        assert!(authorize(&p, &Action::ManageSales.required_permission()).is_err());
        assert!(authorize(&p, &Action::ManageEmployees.required_permission()).is_err());
    }
}
