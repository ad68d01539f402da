use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_auth::Role;
use shopdesk_core::{Aggregate, AggregateRoot, DomainError};
use shopdesk_events::Event;

use crate::contact::ContactInfo;

shopdesk_core::typed_id!(
    /// Employee identifier.
    EmployeeId
);

/// Aggregate root: Employee.
///
/// The role decides which permission group the employee's account sits in.
/// Phone and email are unique across employees; the store enforces that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    id: EmployeeId,
    first_name: String,
    last_name: String,
    contact: ContactInfo,
    role: Role,
    salary: Option<u64>,
    version: u64,
    created: bool,
}

impl Employee {
    pub fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            contact: ContactInfo {
                phone: String::new(),
                email: String::new(),
                address: String::new(),
            },
            role: Role::Employee,
            salary: None,
            version: 0,
            created: false,
        }
    }

    pub fn restore(
        id: EmployeeId,
        first_name: String,
        last_name: String,
        contact: ContactInfo,
        role: Role,
        salary: Option<u64>,
        version: u64,
    ) -> Self {
        Self {
            id,
            first_name,
            last_name,
            contact,
            role,
            salary,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> EmployeeId {
        self.id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn salary(&self) -> Option<u64> {
        self.salary
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEmployee {
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub role: Role,
    pub salary: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateEmployee. `None` keeps a field; `salary: Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmployee {
    pub employee_id: EmployeeId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub salary: Option<Option<u64>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEmployeeRole {
    pub employee_id: EmployeeId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeCommand {
    RegisterEmployee(RegisterEmployee),
    UpdateEmployee(UpdateEmployee),
    ChangeEmployeeRole(ChangeEmployeeRole),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRegistered {
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub role: Role,
    pub salary: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EmployeeUpdated (full new state of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeUpdated {
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub salary: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRoleChanged {
    pub employee_id: EmployeeId,
    pub from: Role,
    pub to: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeEvent {
    EmployeeRegistered(EmployeeRegistered),
    EmployeeUpdated(EmployeeUpdated),
    EmployeeRoleChanged(EmployeeRoleChanged),
}

impl Event for EmployeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::EmployeeRegistered(_) => "parties.employee.registered",
            EmployeeEvent::EmployeeUpdated(_) => "parties.employee.updated",
            EmployeeEvent::EmployeeRoleChanged(_) => "parties.employee.role_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::EmployeeRegistered(e) => e.occurred_at,
            EmployeeEvent::EmployeeUpdated(e) => e.occurred_at,
            EmployeeEvent::EmployeeRoleChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Employee {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EmployeeEvent::EmployeeRegistered(e) => {
                self.id = e.employee_id;
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.contact = e.contact.clone();
                self.role = e.role;
                self.salary = e.salary;
                self.created = true;
            }
            EmployeeEvent::EmployeeUpdated(e) => {
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.contact = e.contact.clone();
                self.salary = e.salary;
            }
            EmployeeEvent::EmployeeRoleChanged(e) => {
                self.role = e.to;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EmployeeCommand::RegisterEmployee(cmd) => self.handle_register(cmd),
            EmployeeCommand::UpdateEmployee(cmd) => self.handle_update(cmd),
            EmployeeCommand::ChangeEmployeeRole(cmd) => self.handle_change_role(cmd),
        }
    }
}

fn ensure_names(first_name: &str, last_name: &str) -> Result<(), DomainError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(DomainError::validation("employee names cannot be empty"));
    }
    Ok(())
}

impl Employee {
    fn ensure_existing(&self, employee_id: EmployeeId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != employee_id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("employee already exists"));
        }
        ensure_names(&cmd.first_name, &cmd.last_name)?;
        cmd.contact.validate()?;

        Ok(vec![EmployeeEvent::EmployeeRegistered(EmployeeRegistered {
            employee_id: cmd.employee_id,
            first_name: cmd.first_name.trim().to_string(),
            last_name: cmd.last_name.trim().to_string(),
            contact: cmd.contact.clone(),
            role: cmd.role,
            salary: cmd.salary,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_existing(cmd.employee_id)?;

        let first_name = cmd.first_name.as_deref().map_or(self.first_name.as_str(), str::trim);
        let last_name = cmd.last_name.as_deref().map_or(self.last_name.as_str(), str::trim);
        let contact = cmd.contact.as_ref().unwrap_or(&self.contact);
        let salary = cmd.salary.unwrap_or(self.salary);
        ensure_names(first_name, last_name)?;
        contact.validate()?;

        if first_name == self.first_name
            && last_name == self.last_name
            && *contact == self.contact
            && salary == self.salary
        {
            return Ok(vec![]);
        }

        Ok(vec![EmployeeEvent::EmployeeUpdated(EmployeeUpdated {
            employee_id: cmd.employee_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            contact: contact.clone(),
            salary,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeEmployeeRole) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_existing(cmd.employee_id)?;
        if self.role == cmd.role {
            return Ok(vec![]);
        }

        Ok(vec![EmployeeEvent::EmployeeRoleChanged(EmployeeRoleChanged {
            employee_id: cmd.employee_id,
            from: self.role,
            to: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }
}
