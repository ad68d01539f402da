//! Application services.
//!
//! [`Services`] wires the store, the access policy, the document generator and
//! the event bus. Operations are grouped per module in the submodules; each one
//! checks the policy first and runs inside a single unit of work.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use shopdesk_auth::{AccessPolicy, Action, Actor, InMemoryAccessPolicy};
use shopdesk_catalog::ProductId;
use shopdesk_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_documents::{DocumentGenerator, JsonDocumentGenerator};
use shopdesk_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use shopdesk_inventory::{StockEvent, StockLevel, StockMovement};

use crate::config::StoreConfig;
use crate::error::ServiceResult;
use crate::store::{InMemoryStore, PgStore, Store, UnitOfWork};

mod accounts;
mod catalog;
mod documents;
mod employees;
mod parties;
mod purchasing;
mod repairs;
mod sales;

pub use catalog::{NewProduct, ProductChanges, ProductListing};
pub use documents::RenderedDocument;
pub use employees::{EmployeeChanges, NewEmployee};
pub use purchasing::{PurchaseOrderEditRequest, PurchaseOrderLineChange};
pub use sales::{SaleEditRequest, SaleLineChange};

/// Bus carrying every committed domain event as JSON.
pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

#[derive(Clone)]
pub struct Services {
    store: Arc<dyn Store>,
    policy: Arc<dyn AccessPolicy>,
    documents: Arc<dyn DocumentGenerator>,
    bus: Arc<EnvelopeBus>,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<dyn AccessPolicy>,
        documents: Arc<dyn DocumentGenerator>,
        bus: Arc<EnvelopeBus>,
    ) -> Self {
        Self {
            store,
            policy,
            documents,
            bus,
        }
    }

    /// In-memory store, empty policy, JSON documents.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryAccessPolicy::new()),
            Arc::new(JsonDocumentGenerator),
            Arc::new(EnvelopeBus::new()),
        )
    }

    pub fn policy(&self) -> &Arc<dyn AccessPolicy> {
        &self.policy
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.bus.subscribe()
    }

    fn authorize(&self, actor: &Actor, action: Action) -> ServiceResult<()> {
        self.policy.check(actor, action)?;
        Ok(())
    }

    /// Publish after commit. A failed publish does not undo the commit.
    fn publish(&self, outbox: Outbox) {
        for envelope in outbox.envelopes {
            let event_type = envelope.event_type().to_string();
            if let Err(e) = self.bus.publish(envelope) {
                warn!(event_type = %event_type, error = %e, "failed to publish committed event");
            }
        }
    }
}

/// Events produced inside a unit of work, published once it commits.
#[derive(Debug, Default)]
struct Outbox {
    envelopes: Vec<EventEnvelope<JsonValue>>,
}

impl Outbox {
    fn record<E>(&mut self, aggregate_id: AggregateId, aggregate_type: &str, events: &[E]) -> ServiceResult<()>
    where
        E: Event + Serialize,
    {
        for event in events {
            self.envelopes
                .push(EventEnvelope::<JsonValue>::from_event(aggregate_id, aggregate_type, event)?);
        }
        Ok(())
    }

    fn record_movements(&mut self, movements: Vec<StockMovement>) -> ServiceResult<()> {
        for movement in movements {
            let product_id = movement.product_id;
            self.record(product_id.0, "inventory.stock", &[StockEvent::StockAdjusted(movement)])?;
        }
        Ok(())
    }
}

/// Stock levels locked by one unit of work, with the version each had when read.
#[derive(Default)]
struct LockedStocks {
    levels: BTreeMap<ProductId, StockLevel>,
    loaded_at: BTreeMap<ProductId, u64>,
}

impl LockedStocks {
    /// Lock every product in ascending id order, so two units of work touching
    /// the same products always queue on the same first row.
    async fn lock_all(
        uow: &mut Box<dyn UnitOfWork>,
        product_ids: impl IntoIterator<Item = ProductId>,
    ) -> ServiceResult<Self> {
        let mut locked = Self::default();
        let ordered: BTreeSet<ProductId> = product_ids.into_iter().collect();
        for product_id in ordered {
            let level = uow
                .lock_stock(product_id)
                .await?
                .ok_or_else(|| DomainError::validation(format!("unknown product {product_id}")))?;
            locked.loaded_at.insert(product_id, level.version());
            locked.levels.insert(product_id, level);
        }
        Ok(locked)
    }

    fn get_mut(&mut self, product_id: ProductId) -> ServiceResult<&mut StockLevel> {
        Ok(self
            .levels
            .get_mut(&product_id)
            .ok_or_else(|| DomainError::invariant(format!("stock of product {product_id} is not locked")))?)
    }

    /// Write back every level that moved.
    async fn save_changed(&self, uow: &mut Box<dyn UnitOfWork>) -> ServiceResult<()> {
        for (product_id, level) in &self.levels {
            let loaded = self.loaded_at.get(product_id).copied().unwrap_or_default();
            if level.version() != loaded {
                uow.save_stock(level, ExpectedVersion::Exact(loaded)).await?;
            }
        }
        Ok(())
    }
}

/// Build the services for a configuration.
///
/// Group memberships are loaded from the stored accounts into the in-memory
/// access policy.
pub async fn build_services(config: &StoreConfig) -> ServiceResult<Services> {
    let store: Arc<dyn Store> = match config {
        StoreConfig::InMemory => Arc::new(InMemoryStore::new()),
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => Arc::new(PgStore::connect(database_url, *max_connections).await?),
    };

    let mut uow = store.begin().await?;
    let accounts = uow.list_accounts().await?;
    drop(uow);

    info!(
        persistent = config.is_persistent(),
        accounts = accounts.len(),
        "services ready"
    );
    let policy = InMemoryAccessPolicy::with_members(accounts.into_iter().map(|a| (a.account_id, a.role)));

    Ok(Services::new(
        store,
        Arc::new(policy),
        Arc::new(JsonDocumentGenerator),
        Arc::new(EnvelopeBus::new()),
    ))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use shopdesk_auth::Role;
    use shopdesk_catalog::{CategoryId, ProductId};
    use shopdesk_parties::{ContactInfo, EmployeeId};

    static NEXT_STAFF_CONTACT: AtomicU32 = AtomicU32::new(100);

    pub fn services() -> Services {
        Services::in_memory()
    }

    pub async fn admin(services: &Services) -> Actor {
        Actor::new(services.bootstrap_admin().await.unwrap())
    }

    /// Register an employee with a contact no test uses directly.
    pub async fn staff(services: &Services, admin: &Actor, role: Role) -> EmployeeId {
        let n = NEXT_STAFF_CONTACT.fetch_add(1, Ordering::Relaxed);
        services
            .register_employee(
                admin,
                NewEmployee {
                    first_name: "Sam".to_string(),
                    last_name: format!("Staff{n}"),
                    contact: contact(n),
                    role,
                    salary: None,
                },
            )
            .await
            .unwrap()
            .id_typed()
    }

    /// An employee in `role` with an account to act as.
    pub async fn member(services: &Services, admin: &Actor, role: Role) -> Actor {
        let employee_id = staff(services, admin, role).await;
        Actor::new(services.create_account(admin, employee_id).await.unwrap())
    }

    pub fn contact(n: u32) -> ContactInfo {
        ContactInfo::new(format!("555-01{n:02}"), format!("person{n}@example.com"), "1 Main St").unwrap()
    }

    pub async fn category(services: &Services, admin: &Actor) -> CategoryId {
        services.create_category(admin, "Accessories").await.unwrap().id
    }

    pub async fn product(
        services: &Services,
        admin: &Actor,
        category_id: CategoryId,
        name: &str,
        quantity: i64,
    ) -> ProductId {
        services
            .create_product(
                admin,
                NewProduct {
                    name: name.to_string(),
                    category_id,
                    description: None,
                    initial_selling_price: 1_000,
                    initial_quantity: quantity,
                    suppliers: vec![],
                },
            )
            .await
            .unwrap()
            .product
            .id_typed()
    }

    pub async fn quantity(services: &Services, product_id: ProductId) -> i64 {
        services
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.product.id_typed() == product_id)
            .map(|l| l.quantity)
            .unwrap()
    }
}
