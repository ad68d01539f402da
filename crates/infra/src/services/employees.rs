//! Employees: staff records that carry the role of their account.

use chrono::Utc;
use tracing::{info, instrument};

use shopdesk_auth::{Action, Actor, Role};
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_parties::{
    ChangeEmployeeRole, ContactInfo, Employee, EmployeeCommand, EmployeeId, RegisterEmployee,
    UpdateEmployee,
};

use super::{Outbox, Services};
use crate::error::ServiceResult;
use crate::store::AccountRecord;

#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub role: Role,
    pub salary: Option<u64>,
}

/// `None` keeps a field; `salary: Some(None)` clears the salary.
#[derive(Debug, Clone, Default)]
pub struct EmployeeChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub salary: Option<Option<u64>>,
}

impl Services {
    #[instrument(skip(self, actor, new), fields(actor = %actor.account_id, role = %new.role), err)]
    pub async fn register_employee(&self, actor: &Actor, new: NewEmployee) -> ServiceResult<Employee> {
        self.authorize(actor, Action::ManageEmployees)?;

        let employee_id = EmployeeId::generate();
        let mut employee = Employee::empty(employee_id);
        let events = employee.execute(&EmployeeCommand::RegisterEmployee(RegisterEmployee {
            employee_id,
            first_name: new.first_name,
            last_name: new.last_name,
            contact: new.contact,
            role: new.role,
            salary: new.salary,
            occurred_at: Utc::now(),
        }))?;

        let mut uow = self.store.begin().await?;
        uow.save_employee(&employee, ExpectedVersion::Exact(0)).await?;
        let mut outbox = Outbox::default();
        outbox.record(employee_id.0, "parties.employee", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(employee)
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.account_id), err)]
    pub async fn update_employee(
        &self,
        actor: &Actor,
        employee_id: EmployeeId,
        changes: EmployeeChanges,
    ) -> ServiceResult<Employee> {
        self.authorize(actor, Action::ManageEmployees)?;

        let mut uow = self.store.begin().await?;
        let mut employee = uow
            .load_employee(employee_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(employee.version());
        let events = employee.execute(&EmployeeCommand::UpdateEmployee(UpdateEmployee {
            employee_id,
            first_name: changes.first_name,
            last_name: changes.last_name,
            contact: changes.contact,
            salary: changes.salary,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(employee);
        }

        uow.save_employee(&employee, expected).await?;
        let mut outbox = Outbox::default();
        outbox.record(employee_id.0, "parties.employee", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(employee)
    }

    pub async fn get_employee(&self, employee_id: EmployeeId) -> ServiceResult<Option<Employee>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.load_employee(employee_id).await?)
    }

    /// Change an employee's role. A linked account moves to the new group.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn change_role(&self, actor: &Actor, employee_id: EmployeeId, role: Role) -> ServiceResult<Employee> {
        self.authorize(actor, Action::ManageEmployees)?;

        let mut uow = self.store.begin().await?;
        let mut employee = uow
            .load_employee(employee_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(employee.version());
        let events = employee.execute(&EmployeeCommand::ChangeEmployeeRole(ChangeEmployeeRole {
            employee_id,
            role,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(employee);
        }

        uow.save_employee(&employee, expected).await?;
        let account = uow.account_of_employee(employee_id).await?;
        if let Some(account) = account {
            uow.save_account(AccountRecord { role, ..account }).await?;
        }
        let mut outbox = Outbox::default();
        outbox.record(employee_id.0, "parties.employee", &events)?;
        uow.commit().await?;

        if let Some(account) = account {
            self.policy.reassign_role(account.account_id, role)?;
        }
        info!(employee_id = %employee_id, role = %role, "employee role changed");
        self.publish(outbox);
        Ok(employee)
    }

    /// Delete an employee together with its account.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn delete_employee(&self, actor: &Actor, employee_id: EmployeeId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManageEmployees)?;

        let mut uow = self.store.begin().await?;
        let employee = uow
            .load_employee(employee_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let account = uow.account_of_employee(employee_id).await?;
        if account.is_some_and(|a| a.account_id == actor.account_id) {
            return Err(DomainError::validation("an account cannot delete its own employee").into());
        }
        uow.delete_employee(employee_id, ExpectedVersion::Exact(employee.version()))
            .await?;
        uow.commit().await?;

        if let Some(account) = account {
            self.policy.remove_member(account.account_id)?;
        }
        info!(employee_id = %employee_id, "employee deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shopdesk_auth::{Action, Role};
    use shopdesk_core::DomainError;

    use super::*;
    use super::super::test_support::*;
    use crate::error::ServiceError;
    use crate::store::StoreError;

    fn karim(contact_no: u32) -> NewEmployee {
        NewEmployee {
            first_name: "Karim".to_string(),
            last_name: "Mansouri".to_string(),
            contact: contact(contact_no),
            role: Role::Employee,
            salary: Some(40_000),
        }
    }

    #[tokio::test]
    async fn employee_phone_numbers_are_unique() {
        let services = services();
        let admin = admin(&services).await;
        services.register_employee(&admin, karim(1)).await.unwrap();

        let mut same_phone = karim(2);
        same_phone.contact.phone = contact(1).phone;
        let err = services.register_employee(&admin, same_phone).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn role_change_moves_the_linked_account_between_groups() {
        let services = services();
        let admin = admin(&services).await;
        let employee = services.register_employee(&admin, karim(1)).await.unwrap();
        let worker = Actor::new(services.create_account(&admin, employee.id_typed()).await.unwrap());
        assert!(services.policy().check(&worker, Action::ManageSales).is_ok());

        let changed = services
            .change_role(&admin, employee.id_typed(), Role::Repairer)
            .await
            .unwrap();

        assert_eq!(changed.role(), Role::Repairer);
        assert_eq!(services.policy().role_of(worker.account_id), Some(Role::Repairer));
        assert!(services.policy().check(&worker, Action::ManageSales).is_err());
        assert!(services.policy().check(&worker, Action::ManageRepairs).is_ok());
    }

    #[tokio::test]
    async fn role_change_without_an_account_only_touches_the_employee() {
        let services = services();
        let admin = admin(&services).await;
        let employee = services.register_employee(&admin, karim(1)).await.unwrap();

        services
            .change_role(&admin, employee.id_typed(), Role::Admin)
            .await
            .unwrap();

        let stored = services.get_employee(employee.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.role(), Role::Admin);
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn deleting_an_employee_revokes_its_account() {
        let services = services();
        let admin = admin(&services).await;
        let employee = services.register_employee(&admin, karim(1)).await.unwrap();
        let worker = Actor::new(services.create_account(&admin, employee.id_typed()).await.unwrap());

        services.delete_employee(&admin, employee.id_typed()).await.unwrap();

        assert!(services.get_employee(employee.id_typed()).await.unwrap().is_none());
        assert_eq!(services.policy().role_of(worker.account_id), None);
        let err = services.delete_employee(&admin, employee.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn salary_updates_keep_the_rest_of_the_record() {
        let services = services();
        let admin = admin(&services).await;
        let employee = services.register_employee(&admin, karim(1)).await.unwrap();

        let updated = services
            .update_employee(
                &admin,
                employee.id_typed(),
                EmployeeChanges {
                    salary: Some(None),
                    ..EmployeeChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.salary(), None);
        assert_eq!(updated.full_name(), "Karim Mansouri");
    }

    #[tokio::test]
    async fn only_admins_manage_employees() {
        let services = services();
        let admin = admin(&services).await;
        let clerk = member(&services, &admin, Role::Employee).await;

        let err = services.register_employee(&clerk, karim(1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }
}
