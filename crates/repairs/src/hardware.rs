use serde::{Deserialize, Serialize};

use shopdesk_catalog::CategoryId;
use shopdesk_core::{DomainError, DomainResult, Entity};

shopdesk_core::typed_id!(
    /// Identifier of a device brought in for repair.
    HardwareId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareState {
    BeingRepaired,
    RepairFinished,
}

impl HardwareState {
    pub fn as_str(self) -> &'static str {
        match self {
            HardwareState::BeingRepaired => "being_repaired",
            HardwareState::RepairFinished => "repair_finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "being_repaired" => Some(HardwareState::BeingRepaired),
            "repair_finished" => Some(HardwareState::RepairFinished),
            _ => None,
        }
    }
}

/// A client's device held by the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareToRepair {
    id: HardwareId,
    name: String,
    category_id: CategoryId,
    description: String,
    state: HardwareState,
}

impl HardwareToRepair {
    pub fn new(
        id: HardwareId,
        name: impl Into<String>,
        category_id: CategoryId,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("hardware name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            category_id,
            description: description.into(),
            state: HardwareState::BeingRepaired,
        })
    }

    pub fn restore(
        id: HardwareId,
        name: String,
        category_id: CategoryId,
        description: String,
        state: HardwareState,
    ) -> Self {
        Self {
            id,
            name,
            category_id,
            description,
            state,
        }
    }

    pub fn id_typed(&self) -> HardwareId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> HardwareState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: HardwareState) {
        self.state = state;
    }
}

impl Entity for HardwareToRepair {
    type Id = HardwareId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hardware_starts_being_repaired() {
        let hw = HardwareToRepair::new(HardwareId::generate(), "HP EliteBook", CategoryId::generate(), "no boot")
            .unwrap();
        assert_eq!(hw.state(), HardwareState::BeingRepaired);
    }

    #[test]
    fn hardware_requires_a_name() {
        assert!(HardwareToRepair::new(HardwareId::generate(), "", CategoryId::generate(), "").is_err());
    }

    #[test]
    fn state_names_round_trip() {
        for s in [HardwareState::BeingRepaired, HardwareState::RepairFinished] {
            assert_eq!(HardwareState::parse(s.as_str()), Some(s));
        }
    }
}
