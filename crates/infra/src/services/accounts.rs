//! Accounts and their permission groups.
//!
//! An account is the login side of an employee. Its group always matches the
//! linked employee's role; role changes go through the employee.

use tracing::{info, instrument};

use shopdesk_auth::{Action, Actor, Role};
use shopdesk_core::{AccountId, DomainError};
use shopdesk_parties::EmployeeId;

use super::Services;
use crate::error::ServiceResult;
use crate::store::AccountRecord;

impl Services {
    /// Create the first account as an admin. Only allowed while no account exists;
    /// of several concurrent callers exactly one succeeds.
    #[instrument(skip(self), err)]
    pub async fn bootstrap_admin(&self) -> ServiceResult<AccountId> {
        let account_id = AccountId::new();
        let mut uow = self.store.begin().await?;
        let inserted = uow
            .insert_first_account(AccountRecord {
                account_id,
                employee_id: None,
                role: Role::Admin,
            })
            .await?;
        if !inserted {
            return Err(DomainError::conflict("accounts already exist").into());
        }
        uow.commit().await?;

        self.policy.assign_initial_group(account_id, Role::Admin)?;
        info!(account_id = %account_id, "admin account bootstrapped");
        Ok(account_id)
    }

    /// Open an account for an employee. The account joins the employee's group.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn create_account(&self, actor: &Actor, employee_id: EmployeeId) -> ServiceResult<AccountId> {
        self.authorize(actor, Action::ManageAccounts)?;

        let mut uow = self.store.begin().await?;
        let employee = uow
            .load_employee(employee_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        if uow.account_of_employee(employee_id).await?.is_some() {
            return Err(DomainError::conflict("employee already has an account").into());
        }
        let account_id = AccountId::new();
        let role = employee.role();
        uow.insert_account(AccountRecord {
            account_id,
            employee_id: Some(employee_id),
            role,
        })
        .await?;
        uow.commit().await?;

        self.policy.assign_initial_group(account_id, role)?;
        info!(account_id = %account_id, employee_id = %employee_id, role = %role, "account created");
        Ok(account_id)
    }

    /// Remove an account. The employee record stays.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn delete_account(&self, actor: &Actor, account_id: AccountId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManageAccounts)?;
        if actor.account_id == account_id {
            return Err(DomainError::validation("an account cannot delete itself").into());
        }

        let mut uow = self.store.begin().await?;
        if !uow.delete_account(account_id).await? {
            return Err(DomainError::not_found().into());
        }
        uow.commit().await?;

        self.policy.remove_member(account_id)?;
        info!(account_id = %account_id, "account deleted");
        Ok(())
    }
}
