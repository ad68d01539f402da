use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_core::{Aggregate, AggregateRoot, DomainError};
use shopdesk_events::Event;

use crate::contact::ContactInfo;

shopdesk_core::typed_id!(
    /// Client identifier.
    ClientId
);

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    first_name: String,
    last_name: String,
    contact: ContactInfo,
    version: u64,
    created: bool,
}

impl Client {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            contact: ContactInfo {
                phone: String::new(),
                email: String::new(),
                address: String::new(),
            },
            version: 0,
            created: false,
        }
    }

    /// Rebuild a stored client.
    pub fn restore(
        id: ClientId,
        first_name: String,
        last_name: String,
        contact: ContactInfo,
        version: u64,
    ) -> Self {
        Self {
            id,
            first_name,
            last_name,
            contact,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> ClientId {
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

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub client_id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClient {
    pub client_id: ClientId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    UpdateClient(UpdateClient),
}

/// Event: ClientRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub client_id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientUpdated (full new state of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdated {
    pub client_id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientUpdated(ClientUpdated),
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "parties.client.registered",
            ClientEvent::ClientUpdated(_) => "parties.client.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.contact = e.contact.clone();
                self.created = true;
            }
            ClientEvent::ClientUpdated(e) => {
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.contact = e.contact.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::UpdateClient(cmd) => self.handle_update(cmd),
        }
    }
}

fn ensure_names(first_name: &str, last_name: &str) -> Result<(), DomainError> {
    if first_name.trim().is_empty() {
        return Err(DomainError::validation("first name cannot be empty"));
    }
    if last_name.trim().is_empty() {
        return Err(DomainError::validation("last name cannot be empty"));
    }
    Ok(())
}

impl Client {
    fn ensure_client_id(&self, client_id: ClientId) -> Result<(), DomainError> {
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }
        ensure_names(&cmd.first_name, &cmd.last_name)?;
        cmd.contact.validate()?;

        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            client_id: cmd.client_id,
            first_name: cmd.first_name.trim().to_string(),
            last_name: cmd.last_name.trim().to_string(),
            contact: cmd.contact.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClient) -> Result<Vec<ClientEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_client_id(cmd.client_id)?;

        let first_name = cmd
            .first_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.first_name);
        let last_name = cmd
            .last_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.last_name);
        let contact = cmd.contact.as_ref().unwrap_or(&self.contact);
        ensure_names(first_name, last_name)?;
        contact.validate()?;

        if first_name == self.first_name && last_name == self.last_name && *contact == self.contact {
            return Ok(vec![]);
        }

        Ok(vec![ClientEvent::ClientUpdated(ClientUpdated {
            client_id: cmd.client_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            contact: contact.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
