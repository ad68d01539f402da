use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_core::{Aggregate, AggregateRoot, DomainError};
use shopdesk_events::Event;

use crate::contact::ContactInfo;

shopdesk_core::typed_id!(
    /// Supplier identifier.
    SupplierId
);

/// Aggregate root: Supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    id: SupplierId,
    name: String,
    contact: ContactInfo,
    version: u64,
    created: bool,
}

impl Supplier {
    pub fn empty(id: SupplierId) -> Self {
        Self {
            id,
            name: String::new(),
            contact: ContactInfo {
                phone: String::new(),
                email: String::new(),
                address: String::new(),
            },
            version: 0,
            created: false,
        }
    }

    pub fn restore(id: SupplierId, name: String, contact: ContactInfo, version: u64) -> Self {
        Self {
            id,
            name,
            contact,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSupplier {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSupplier {
    pub supplier_id: SupplierId,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierCommand {
    RegisterSupplier(RegisterSupplier),
    UpdateSupplier(UpdateSupplier),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRegistered {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierUpdated {
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierEvent {
    SupplierRegistered(SupplierRegistered),
    SupplierUpdated(SupplierUpdated),
}

impl Event for SupplierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierEvent::SupplierRegistered(_) => "parties.supplier.registered",
            SupplierEvent::SupplierUpdated(_) => "parties.supplier.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierEvent::SupplierRegistered(e) => e.occurred_at,
            SupplierEvent::SupplierUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Supplier {
    type Command = SupplierCommand;
    type Event = SupplierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierEvent::SupplierRegistered(e) => {
                self.id = e.supplier_id;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.created = true;
            }
            SupplierEvent::SupplierUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierCommand::RegisterSupplier(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("supplier already exists"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                cmd.contact.validate()?;

                Ok(vec![SupplierEvent::SupplierRegistered(SupplierRegistered {
                    supplier_id: cmd.supplier_id,
                    name: cmd.name.trim().to_string(),
                    contact: cmd.contact.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            SupplierCommand::UpdateSupplier(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if cmd.supplier_id != self.id {
                    return Err(DomainError::invariant("supplier_id mismatch"));
                }

                let name = cmd.name.as_deref().map(str::trim).unwrap_or(&self.name);
                let contact = cmd.contact.as_ref().unwrap_or(&self.contact);
                if name.is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                contact.validate()?;

                if name == self.name && *contact == self.contact {
                    return Ok(vec![]);
                }

                Ok(vec![SupplierEvent::SupplierUpdated(SupplierUpdated {
                    supplier_id: cmd.supplier_id,
                    name: name.to_string(),
                    contact: contact.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
