use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_core::{Aggregate, AggregateRoot, DomainError};
use shopdesk_events::Event;
use shopdesk_parties::ClientId;

use crate::hardware::HardwareId;

shopdesk_core::typed_id!(
    /// Repair identifier.
    RepairId
);

/// Title stored when none is given.
pub const DEFAULT_TITLE: &str = "No description";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    InProgress,
    Finished,
    Paid,
}

impl RepairState {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairState::InProgress => "in_progress",
            RepairState::Finished => "finished",
            RepairState::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(RepairState::InProgress),
            "finished" => Some(RepairState::Finished),
            "paid" => Some(RepairState::Paid),
            _ => None,
        }
    }
}

/// Flat, storable form of a [`Repair`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRecord {
    pub id: RepairId,
    pub title: String,
    pub description: String,
    pub hardware_id: HardwareId,
    pub client_id: Option<ClientId>,
    pub prepayment: u64,
    pub repair_price: u64,
    pub state: RepairState,
    pub deposit_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Aggregate root: Repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    id: RepairId,
    title: String,
    description: String,
    hardware_id: Option<HardwareId>,
    client_id: Option<ClientId>,
    prepayment: u64,
    repair_price: u64,
    state: RepairState,
    deposit_date: DateTime<Utc>,
    delivery_date: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Repair {
    /// Create an empty, not-yet-opened aggregate instance.
    pub fn empty(id: RepairId) -> Self {
        Self {
            id,
            title: String::new(),
            description: String::new(),
            hardware_id: None,
            client_id: None,
            prepayment: 0,
            repair_price: 0,
            state: RepairState::InProgress,
            deposit_date: DateTime::<Utc>::default(),
            delivery_date: None,
            version: 0,
            created: false,
        }
    }

    pub fn from_record(record: RepairRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            hardware_id: Some(record.hardware_id),
            client_id: record.client_id,
            prepayment: record.prepayment,
            repair_price: record.repair_price,
            state: record.state,
            deposit_date: record.deposit_date,
            delivery_date: record.delivery_date,
            version: record.version,
            created: true,
        }
    }

    pub fn to_record(&self) -> Option<RepairRecord> {
        let hardware_id = self.hardware_id.filter(|_| self.created)?;
        Some(RepairRecord {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            hardware_id,
            client_id: self.client_id,
            prepayment: self.prepayment,
            repair_price: self.repair_price,
            state: self.state,
            deposit_date: self.deposit_date,
            delivery_date: self.delivery_date,
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> RepairId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn hardware_id(&self) -> Option<HardwareId> {
        self.hardware_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn prepayment(&self) -> u64 {
        self.prepayment
    }

    pub fn repair_price(&self) -> u64 {
        self.repair_price
    }

    /// What the client still owes at pickup.
    pub fn balance_due(&self) -> u64 {
        self.repair_price.saturating_sub(self.prepayment)
    }

    pub fn state(&self) -> RepairState {
        self.state
    }

    pub fn deposit_date(&self) -> DateTime<Utc> {
        self.deposit_date
    }

    /// Set only once the repair is paid.
    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Repair {
    type Id = RepairId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRepair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRepair {
    pub repair_id: RepairId,
    pub hardware_id: HardwareId,
    pub client_id: Option<ClientId>,
    pub title: Option<String>,
    pub description: String,
    pub prepayment: u64,
    pub repair_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Field changes for [`EditRepair`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub hardware_id: Option<HardwareId>,
    pub client_id: Option<Option<ClientId>>,
    pub prepayment: Option<u64>,
    pub repair_price: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRepair {
    pub repair_id: RepairId,
    pub changes: RepairChanges,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRepair {
    pub repair_id: RepairId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PayRepair. `occurred_at` becomes the delivery date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayRepair {
    pub repair_id: RepairId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DetachClient. The client record is going away; the repair keeps
/// its state, paid ones included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachClient {
    pub repair_id: RepairId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairCommand {
    OpenRepair(OpenRepair),
    EditRepair(EditRepair),
    FinishRepair(FinishRepair),
    PayRepair(PayRepair),
    DetachClient(DetachClient),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOpened {
    pub repair_id: RepairId,
    pub hardware_id: HardwareId,
    pub client_id: Option<ClientId>,
    pub title: String,
    pub description: String,
    pub prepayment: u64,
    pub repair_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RepairEdited. `reopened` is set when a finished repair went back to work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairEdited {
    pub repair_id: RepairId,
    pub hardware_id: HardwareId,
    pub client_id: Option<ClientId>,
    pub title: String,
    pub description: String,
    pub prepayment: u64,
    pub repair_price: u64,
    pub reopened: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFinished {
    pub repair_id: RepairId,
    pub hardware_id: HardwareId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPaid {
    pub repair_id: RepairId,
    pub amount_due: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetached {
    pub repair_id: RepairId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairEvent {
    RepairOpened(RepairOpened),
    RepairEdited(RepairEdited),
    RepairFinished(RepairFinished),
    RepairPaid(RepairPaid),
    ClientDetached(ClientDetached),
}

impl Event for RepairEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RepairEvent::RepairOpened(_) => "repairs.repair.opened",
            RepairEvent::RepairEdited(_) => "repairs.repair.edited",
            RepairEvent::RepairFinished(_) => "repairs.repair.finished",
            RepairEvent::RepairPaid(_) => "repairs.repair.paid",
            RepairEvent::ClientDetached(_) => "repairs.repair.client_detached",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RepairEvent::RepairOpened(e) => e.occurred_at,
            RepairEvent::RepairEdited(e) => e.occurred_at,
            RepairEvent::RepairFinished(e) => e.occurred_at,
            RepairEvent::RepairPaid(e) => e.occurred_at,
            RepairEvent::ClientDetached(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Repair {
    type Command = RepairCommand;
    type Event = RepairEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RepairEvent::RepairOpened(e) => {
                self.id = e.repair_id;
                self.hardware_id = Some(e.hardware_id);
                self.client_id = e.client_id;
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.prepayment = e.prepayment;
                self.repair_price = e.repair_price;
                self.state = RepairState::InProgress;
                self.deposit_date = e.occurred_at;
                self.delivery_date = None;
                self.created = true;
            }
            RepairEvent::RepairEdited(e) => {
                self.hardware_id = Some(e.hardware_id);
                self.client_id = e.client_id;
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.prepayment = e.prepayment;
                self.repair_price = e.repair_price;
                if e.reopened {
                    self.state = RepairState::InProgress;
                }
            }
            RepairEvent::RepairFinished(_) => {
                self.state = RepairState::Finished;
            }
            RepairEvent::RepairPaid(e) => {
                self.state = RepairState::Paid;
                self.delivery_date = Some(e.occurred_at);
            }
            RepairEvent::ClientDetached(_) => {
                self.client_id = None;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RepairCommand::OpenRepair(cmd) => self.handle_open(cmd),
            RepairCommand::EditRepair(cmd) => self.handle_edit(cmd),
            RepairCommand::FinishRepair(cmd) => self.handle_finish(cmd),
            RepairCommand::PayRepair(cmd) => self.handle_pay(cmd),
            RepairCommand::DetachClient(cmd) => self.handle_detach_client(cmd),
        }
    }
}

fn ensure_prepayment(prepayment: u64, repair_price: u64) -> Result<(), DomainError> {
    if prepayment > repair_price {
        return Err(DomainError::PrepaymentExceedsPrice {
            prepayment,
            repair_price,
        });
    }
    Ok(())
}

fn normalize_title(title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    }
}

impl Repair {
    fn ensure_existing(&self, repair_id: RepairId) -> Result<HardwareId, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != repair_id {
            return Err(DomainError::invariant("repair_id mismatch"));
        }
        self.hardware_id
            .ok_or_else(|| DomainError::invariant("repair has no hardware"))
    }

    fn handle_open(&self, cmd: &OpenRepair) -> Result<Vec<RepairEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("repair already exists"));
        }
        ensure_prepayment(cmd.prepayment, cmd.repair_price)?;

        Ok(vec![RepairEvent::RepairOpened(RepairOpened {
            repair_id: cmd.repair_id,
            hardware_id: cmd.hardware_id,
            client_id: cmd.client_id,
            title: normalize_title(cmd.title.as_deref()),
            description: cmd.description.clone(),
            prepayment: cmd.prepayment,
            repair_price: cmd.repair_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_detach_client(&self, cmd: &DetachClient) -> Result<Vec<RepairEvent>, DomainError> {
        self.ensure_existing(cmd.repair_id)?;
        let Some(client_id) = self.client_id else {
            return Ok(vec![]);
        };

        Ok(vec![RepairEvent::ClientDetached(ClientDetached {
            repair_id: cmd.repair_id,
            client_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditRepair) -> Result<Vec<RepairEvent>, DomainError> {
        let current_hardware = self.ensure_existing(cmd.repair_id)?;
        if self.state == RepairState::Paid {
            return Err(DomainError::invariant("a paid repair can no longer be edited"));
        }

        let c = &cmd.changes;
        let title = match &c.title {
            Some(t) => normalize_title(Some(t.as_str())),
            None => self.title.clone(),
        };
        let description = c.description.clone().unwrap_or_else(|| self.description.clone());
        let hardware_id = c.hardware_id.unwrap_or(current_hardware);
        let client_id = c.client_id.unwrap_or(self.client_id);
        let prepayment = c.prepayment.unwrap_or(self.prepayment);
        let repair_price = c.repair_price.unwrap_or(self.repair_price);
        ensure_prepayment(prepayment, repair_price)?;

        let changed = title != self.title
            || description != self.description
            || hardware_id != current_hardware
            || client_id != self.client_id
            || prepayment != self.prepayment
            || repair_price != self.repair_price;
        if !changed {
            return Ok(vec![]);
        }

        Ok(vec![RepairEvent::RepairEdited(RepairEdited {
            repair_id: cmd.repair_id,
            hardware_id,
            client_id,
            title,
            description,
            prepayment,
            repair_price,
            reopened: self.state == RepairState::Finished,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finish(&self, cmd: &FinishRepair) -> Result<Vec<RepairEvent>, DomainError> {
        let hardware_id = self.ensure_existing(cmd.repair_id)?;
        if self.state != RepairState::InProgress {
            return Err(DomainError::RepairAlreadyFinished);
        }

        Ok(vec![RepairEvent::RepairFinished(RepairFinished {
            repair_id: cmd.repair_id,
            hardware_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pay(&self, cmd: &PayRepair) -> Result<Vec<RepairEvent>, DomainError> {
        self.ensure_existing(cmd.repair_id)?;
        if self.state != RepairState::Finished {
            return Err(DomainError::RepairNotFinished);
        }

        Ok(vec![RepairEvent::RepairPaid(RepairPaid {
            repair_id: cmd.repair_id,
            amount_due: self.balance_due(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
