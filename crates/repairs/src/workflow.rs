//! Repair workflow: keeps a repair and its hardware consistent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use shopdesk_core::{Aggregate, DomainError, DomainResult};
use shopdesk_parties::ClientId;

use crate::hardware::{HardwareId, HardwareState, HardwareToRepair};
use crate::repair::{
    EditRepair, FinishRepair, OpenRepair, PayRepair, Repair, RepairChanges, RepairCommand,
    RepairEvent, RepairId, RepairState,
};

/// Current hardware → repair links, as held by the store.
pub type HardwareLinks = HashMap<HardwareId, RepairId>;

/// Descriptive fields supplied when a repair is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairDetails {
    pub title: Option<String>,
    pub description: String,
    pub client_id: Option<ClientId>,
    pub prepayment: u64,
    pub repair_price: u64,
}

/// Hardware may be linked to at most one repair. When `editing` is set, that
/// repair's own hardware still counts as available.
pub fn ensure_hardware_available(
    hardware_id: HardwareId,
    links: &HardwareLinks,
    editing: Option<RepairId>,
) -> DomainResult<()> {
    match links.get(&hardware_id) {
        None => Ok(()),
        Some(linked) if Some(*linked) == editing => Ok(()),
        Some(linked) => Err(DomainError::conflict(format!(
            "hardware {hardware_id} is already linked to repair {linked}"
        ))),
    }
}

/// Hardware offered when opening (`editing = None`) or editing a repair.
pub fn selectable_hardware<'a>(
    all: impl IntoIterator<Item = &'a HardwareToRepair>,
    links: &HardwareLinks,
    editing: Option<RepairId>,
) -> Vec<&'a HardwareToRepair> {
    all.into_iter()
        .filter(|hw| ensure_hardware_available(hw.id_typed(), links, editing).is_ok())
        .collect()
}

pub fn open_repair(
    repair_id: RepairId,
    hardware: &mut HardwareToRepair,
    links: &HardwareLinks,
    details: RepairDetails,
    occurred_at: DateTime<Utc>,
) -> DomainResult<(Repair, Vec<RepairEvent>)> {
    ensure_hardware_available(hardware.id_typed(), links, None)?;

    let mut repair = Repair::empty(repair_id);
    let events = repair.execute(&RepairCommand::OpenRepair(OpenRepair {
        repair_id,
        hardware_id: hardware.id_typed(),
        client_id: details.client_id,
        title: details.title,
        description: details.description,
        prepayment: details.prepayment,
        repair_price: details.repair_price,
        occurred_at,
    }))?;
    hardware.set_state(HardwareState::BeingRepaired);

    Ok((repair, events))
}

/// `hardware` is the device linked to the repair.
pub fn finish_repair(
    repair: &mut Repair,
    hardware: &mut HardwareToRepair,
    occurred_at: DateTime<Utc>,
) -> DomainResult<Vec<RepairEvent>> {
    if repair.hardware_id() != Some(hardware.id_typed()) {
        return Err(DomainError::invariant("hardware is not linked to this repair"));
    }

    let events = repair.execute(&RepairCommand::FinishRepair(FinishRepair {
        repair_id: repair.id_typed(),
        occurred_at,
    }))?;
    hardware.set_state(HardwareState::RepairFinished);

    Ok(events)
}

/// Apply field changes. `hardware` is the device the repair is linked to after
/// the edit (the new one when `changes.hardware_id` relinks it).
pub fn edit_repair(
    repair: &mut Repair,
    hardware: &mut HardwareToRepair,
    links: &HardwareLinks,
    changes: RepairChanges,
    occurred_at: DateTime<Utc>,
) -> DomainResult<Vec<RepairEvent>> {
    let target = changes.hardware_id.or(repair.hardware_id());
    if target != Some(hardware.id_typed()) {
        return Err(DomainError::invariant(
            "hardware given does not match the repair's hardware after the edit",
        ));
    }
    if target != repair.hardware_id() {
        ensure_hardware_available(hardware.id_typed(), links, Some(repair.id_typed()))?;
    }

    let events = repair.execute(&RepairCommand::EditRepair(EditRepair {
        repair_id: repair.id_typed(),
        changes,
        occurred_at,
    }))?;
    if !events.is_empty() {
        hardware.set_state(match repair.state() {
            RepairState::InProgress => HardwareState::BeingRepaired,
            RepairState::Finished | RepairState::Paid => HardwareState::RepairFinished,
        });
    }

    Ok(events)
}

pub fn pay_repair(repair: &mut Repair, occurred_at: DateTime<Utc>) -> DomainResult<Vec<RepairEvent>> {
    repair.execute(&RepairCommand::PayRepair(PayRepair {
        repair_id: repair.id_typed(),
        occurred_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_catalog::CategoryId;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn hardware(name: &str) -> HardwareToRepair {
        HardwareToRepair::new(HardwareId::generate(), name, CategoryId::generate(), "").unwrap()
    }

    fn details() -> RepairDetails {
        RepairDetails {
            title: Some("Battery swap".to_string()),
            description: "does not hold charge".to_string(),
            client_id: None,
            prepayment: 0,
            repair_price: 4_000,
        }
    }

    #[test]
    fn finish_and_pay_move_hardware_along() {
        let mut hw = hardware("iPhone 11");
        let links = HardwareLinks::new();
        let (mut repair, _) = open_repair(RepairId::generate(), &mut hw, &links, details(), now()).unwrap();

        finish_repair(&mut repair, &mut hw, now()).unwrap();
        assert_eq!(hw.state(), HardwareState::RepairFinished);

        pay_repair(&mut repair, now()).unwrap();
        assert_eq!(repair.state(), RepairState::Paid);
        assert!(repair.delivery_date().is_some());
    }

    #[test]
    fn linked_hardware_cannot_start_a_second_repair() {
        let mut hw = hardware("Galaxy S10");
        let mut links = HardwareLinks::new();
        let (repair, _) = open_repair(RepairId::generate(), &mut hw, &links, details(), now()).unwrap();
        links.insert(hw.id_typed(), repair.id_typed());

        let err = open_repair(RepairId::generate(), &mut hw, &links, details(), now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn selectable_hardware_includes_own_link_when_editing() {
        let free = hardware("Free laptop");
        let taken = hardware("Taken laptop");
        let mine = hardware("My laptop");
        let other_repair = RepairId::generate();
        let my_repair = RepairId::generate();
        let links = HardwareLinks::from([
            (taken.id_typed(), other_repair),
            (mine.id_typed(), my_repair),
        ]);
        let all = [free.clone(), taken.clone(), mine.clone()];

        let for_new: Vec<_> = selectable_hardware(&all, &links, None)
            .into_iter()
            .map(|h| h.id_typed())
            .collect();
        assert_eq!(for_new, vec![free.id_typed()]);

        let for_edit: Vec<_> = selectable_hardware(&all, &links, Some(my_repair))
            .into_iter()
            .map(|h| h.id_typed())
            .collect();
        assert_eq!(for_edit, vec![free.id_typed(), mine.id_typed()]);
    }

    #[test]
    fn editing_finished_repair_puts_hardware_back_in_repair() {
        let mut hw = hardware("ThinkPad X230");
        let links = HardwareLinks::new();
        let (mut repair, _) = open_repair(RepairId::generate(), &mut hw, &links, details(), now()).unwrap();
        finish_repair(&mut repair, &mut hw, now()).unwrap();

        edit_repair(
            &mut repair,
            &mut hw,
            &links,
            RepairChanges {
                description: Some("also replace keyboard".to_string()),
                ..RepairChanges::default()
            },
            now(),
        )
        .unwrap();

        assert_eq!(repair.state(), RepairState::InProgress);
        assert_eq!(hw.state(), HardwareState::BeingRepaired);
    }

    #[test]
    fn editing_a_paid_repair_is_rejected() {
        let mut hw = hardware("Switch");
        let links = HardwareLinks::new();
        let (mut repair, _) = open_repair(RepairId::generate(), &mut hw, &links, details(), now()).unwrap();
        finish_repair(&mut repair, &mut hw, now()).unwrap();
        pay_repair(&mut repair, now()).unwrap();

        let err = edit_repair(
            &mut repair,
            &mut hw,
            &links,
            RepairChanges {
                title: Some("changed".to_string()),
                ..RepairChanges::default()
            },
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(hw.state(), HardwareState::RepairFinished);
    }

    #[test]
    fn relinking_to_taken_hardware_is_a_conflict() {
        let mut first = hardware("A");
        let mut second = hardware("B");
        let mut links = HardwareLinks::new();
        let (mut repair, _) = open_repair(RepairId::generate(), &mut first, &links, details(), now()).unwrap();
        links.insert(first.id_typed(), repair.id_typed());
        links.insert(second.id_typed(), RepairId::generate());
        let second_id = second.id_typed();

        let err = edit_repair(
            &mut repair,
            &mut second,
            &links,
            RepairChanges {
                hardware_id: Some(second_id),
                ..RepairChanges::default()
            },
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(repair.hardware_id(), Some(first.id_typed()));
    }

    #[test]
    fn finish_with_wrong_hardware_is_rejected() {
        let mut hw = hardware("A");
        let mut stranger = hardware("B");
        let links = HardwareLinks::new();
        let (mut repair, _) = open_repair(RepairId::generate(), &mut hw, &links, details(), now()).unwrap();

        let err = finish_repair(&mut repair, &mut stranger, now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(repair.state(), RepairState::InProgress);
    }
}
