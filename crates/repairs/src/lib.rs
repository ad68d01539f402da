//! Repairs domain module.
//!
//! A [`Repair`] tracks a client's device through `InProgress → Finished → Paid`.
//! The device itself is a [`HardwareToRepair`] linked to at most one repair; its
//! state follows the repair's. The functions in [`workflow`] keep both in step.

pub mod hardware;
pub mod repair;
pub mod workflow;

pub use hardware::{HardwareId, HardwareState, HardwareToRepair};
pub use repair::{
    ClientDetached, DEFAULT_TITLE, DetachClient, EditRepair, FinishRepair, OpenRepair, PayRepair,
    Repair, RepairChanges, RepairCommand, RepairEdited, RepairEvent, RepairFinished, RepairId,
    RepairOpened, RepairPaid, RepairRecord, RepairState,
};
pub use workflow::{
    HardwareLinks, RepairDetails, edit_repair, ensure_hardware_available, finish_repair,
    open_repair, pay_repair, selectable_hardware,
};
