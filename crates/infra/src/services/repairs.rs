//! Repairs: devices brought in, and the repair each one is linked to.

use chrono::Utc;
use tracing::{info, instrument};

use shopdesk_auth::{Action, Actor};
use shopdesk_catalog::CategoryId;
use shopdesk_core::{AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_parties::ClientId;
use shopdesk_repairs::{
    HardwareId, HardwareToRepair, Repair, RepairChanges, RepairDetails, RepairId, edit_repair,
    finish_repair, open_repair, pay_repair, selectable_hardware,
};

use super::{Outbox, Services};
use crate::error::ServiceResult;
use crate::store::UnitOfWork;

async fn ensure_client(uow: &mut Box<dyn UnitOfWork>, client_id: Option<ClientId>) -> ServiceResult<()> {
    if let Some(client_id) = client_id {
        if uow.load_client(client_id).await?.is_none() {
            return Err(DomainError::validation(format!("unknown client {client_id}")).into());
        }
    }
    Ok(())
}

impl Services {
    #[instrument(skip(self, actor, description), fields(actor = %actor.account_id), err)]
    pub async fn register_hardware(
        &self,
        actor: &Actor,
        name: &str,
        category_id: CategoryId,
        description: &str,
    ) -> ServiceResult<HardwareToRepair> {
        self.authorize(actor, Action::ManageRepairs)?;

        let hardware = HardwareToRepair::new(HardwareId::generate(), name, category_id, description)?;
        let mut uow = self.store.begin().await?;
        if uow.load_category(category_id).await?.is_none() {
            return Err(DomainError::validation(format!("unknown category {category_id}")).into());
        }
        uow.insert_hardware(&hardware).await?;
        uow.commit().await?;
        Ok(hardware)
    }

    /// Hardware a repair may be linked to: everything unlinked, plus the
    /// hardware of `editing` itself.
    pub async fn selectable_hardware(&self, editing: Option<RepairId>) -> ServiceResult<Vec<HardwareToRepair>> {
        let mut uow = self.store.begin().await?;
        let all = uow.list_hardware().await?;
        let links = uow.hardware_links().await?;
        Ok(selectable_hardware(&all, &links, editing)
            .into_iter()
            .cloned()
            .collect())
    }

    #[instrument(skip(self, actor, details), fields(actor = %actor.account_id), err)]
    pub async fn open_repair(
        &self,
        actor: &Actor,
        hardware_id: HardwareId,
        details: RepairDetails,
    ) -> ServiceResult<Repair> {
        self.authorize(actor, Action::ManageRepairs)?;

        let mut uow = self.store.begin().await?;
        let mut hardware = uow.load_hardware(hardware_id).await?.ok_or_else(DomainError::not_found)?;
        let links = uow.hardware_links().await?;
        ensure_client(&mut uow, details.client_id).await?;

        let (repair, events) = open_repair(RepairId::generate(), &mut hardware, &links, details, Utc::now())?;
        uow.save_hardware(&hardware).await?;
        uow.save_repair(&repair, ExpectedVersion::Exact(0)).await?;

        let mut outbox = Outbox::default();
        outbox.record(repair.id_typed().0, "repairs.repair", &events)?;
        uow.commit().await?;
        self.publish(outbox);

        info!(repair_id = %repair.id_typed(), hardware_id = %hardware_id, "repair opened");
        Ok(repair)
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.account_id), err)]
    pub async fn edit_repair(
        &self,
        actor: &Actor,
        repair_id: RepairId,
        changes: RepairChanges,
    ) -> ServiceResult<Repair> {
        self.authorize(actor, Action::ManageRepairs)?;

        let mut uow = self.store.begin().await?;
        let mut repair = uow.load_repair(repair_id).await?.ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(repair.version());
        let target = changes
            .hardware_id
            .or(repair.hardware_id())
            .ok_or_else(|| DomainError::invariant("repair has no hardware"))?;
        let mut hardware = uow.load_hardware(target).await?.ok_or_else(DomainError::not_found)?;
        let links = uow.hardware_links().await?;
        if let Some(client_id) = changes.client_id {
            ensure_client(&mut uow, client_id).await?;
        }

        let events = edit_repair(&mut repair, &mut hardware, &links, changes, Utc::now())?;
        if events.is_empty() {
            return Ok(repair);
        }
        uow.save_hardware(&hardware).await?;
        uow.save_repair(&repair, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(repair_id.0, "repairs.repair", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(repair)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn finish_repair(&self, actor: &Actor, repair_id: RepairId) -> ServiceResult<Repair> {
        self.authorize(actor, Action::ManageRepairs)?;

        let mut uow = self.store.begin().await?;
        let mut repair = uow.load_repair(repair_id).await?.ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(repair.version());
        let hardware_id = repair
            .hardware_id()
            .ok_or_else(|| DomainError::invariant("repair has no hardware"))?;
        let mut hardware = uow.load_hardware(hardware_id).await?.ok_or_else(DomainError::not_found)?;

        let events = finish_repair(&mut repair, &mut hardware, Utc::now())?;
        uow.save_hardware(&hardware).await?;
        uow.save_repair(&repair, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(repair_id.0, "repairs.repair", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(repair)
    }

    /// Settle a finished repair; stamps the delivery date.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn pay_repair(&self, actor: &Actor, repair_id: RepairId) -> ServiceResult<Repair> {
        self.authorize(actor, Action::ManageRepairs)?;

        let mut uow = self.store.begin().await?;
        let mut repair = uow.load_repair(repair_id).await?.ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(repair.version());

        let events = pay_repair(&mut repair, Utc::now())?;
        uow.save_repair(&repair, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(repair_id.0, "repairs.repair", &events)?;
        uow.commit().await?;
        self.publish(outbox);

        info!(repair_id = %repair_id, amount_due = repair.balance_due(), "repair paid");
        Ok(repair)
    }

    pub async fn get_repair(&self, repair_id: RepairId) -> ServiceResult<Option<Repair>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.load_repair(repair_id).await?)
    }
}
