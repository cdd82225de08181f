//! Process bootstrap: pick a store, check it, provision the rack and wire the
//! fulfilment services on top.

use std::sync::Arc;

use anyhow::Context;

use asrs_events::InMemoryEventBus;
use asrs_infra::{
    AllocationEngine, AuditLog, AvailabilityQuery, InMemoryWarehouseStore, IntegrityReport,
    ManualOperations, PostgresWarehouseStore, WarehouseConfig, WarehouseStore, check_integrity,
};
use asrs_warehouse::WarehouseNotification;

pub type SharedStore = Arc<dyn WarehouseStore>;
pub type NotificationBus = Arc<InMemoryEventBus<WarehouseNotification>>;

/// Wired services over one store and one notification bus.
pub struct Warehouse {
    backend: &'static str,
    store: SharedStore,
    bus: NotificationBus,
    config: WarehouseConfig,
    integrity: IntegrityReport,
}

impl Warehouse {
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn integrity(&self) -> &IntegrityReport {
        &self.integrity
    }

    pub fn allocation(&self) -> AllocationEngine<SharedStore, NotificationBus> {
        AllocationEngine::new(self.store.clone(), self.bus.clone())
            .with_timeout(self.config.transaction_timeout)
    }

    pub fn operations(&self) -> ManualOperations<SharedStore, NotificationBus> {
        ManualOperations::new(self.store.clone(), self.bus.clone())
    }

    pub fn availability(&self) -> AvailabilityQuery<SharedStore> {
        AvailabilityQuery::new(self.store.clone())
    }

    pub fn audit_log(&self) -> AuditLog<SharedStore> {
        AuditLog::new(self.store.clone())
    }
}

/// Open the configured store and bring it to a consistent, provisioned state.
pub async fn start(config: &WarehouseConfig) -> anyhow::Result<Warehouse> {
    let (backend, store): (&'static str, SharedStore) = match &config.database_url {
        Some(url) => {
            let store = PostgresWarehouseStore::connect(url, config.max_connections)
                .await
                .context("connecting to postgres")?
                .with_lock_timeout(config.transaction_timeout);
            store.migrate().await.context("applying schema")?;
            ("postgres", Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            ("memory", Arc::new(InMemoryWarehouseStore::new()))
        }
    };

    start_with(backend, store, config).await
}

/// Same as [`start`] over an already opened store.
pub async fn start_with(
    backend: &'static str,
    store: SharedStore,
    config: &WarehouseConfig,
) -> anyhow::Result<Warehouse> {
    let integrity = check_integrity(&*store, config.integrity_policy)
        .await
        .context("compartment integrity check")?;

    let created = store
        .provision(&config.topology)
        .await
        .context("provisioning rack topology")?;
    tracing::info!(
        backend,
        created,
        compartments = config.topology.compartment_count(),
        "rack provisioned"
    );

    Ok(Warehouse {
        backend,
        store,
        bus: Arc::new(InMemoryEventBus::new()),
        config: config.clone(),
        integrity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use asrs_core::Money;
    use asrs_events::EventBus;
    use asrs_warehouse::{Customer, IntegrityPolicy, NewItem, OrderLineRequest, PlaceOrder};

    #[tokio::test]
    async fn in_memory_start_provisions_and_serves_orders() {
        let config = WarehouseConfig::default();
        let warehouse = start(&config).await.unwrap();
        assert_eq!(warehouse.backend(), "memory");
        assert!(warehouse.integrity().is_clean());

        let gear = warehouse
            .store()
            .create_item(NewItem::new("Gear", ""))
            .await
            .unwrap();
        let ops = warehouse.operations();
        ops.stock(&"A1a".parse().unwrap(), gear.id).await.unwrap();
        ops.stock(&"A2b".parse().unwrap(), gear.id).await.unwrap();

        let sub = warehouse.bus().subscribe();
        let placed = warehouse
            .allocation()
            .place_order(PlaceOrder::new(
                Customer::new("Grace", "grace@example.com"),
                vec![OrderLineRequest::new(gear.id, 1, Money::from_cents(350))],
            ))
            .await
            .unwrap();

        assert_eq!(placed.summary, "1 x Gear @ 3.50 = 3.50 [A1a]");
        assert_eq!(warehouse.availability().get(gear.id).await.unwrap(), 1);
        assert_eq!(sub.drain().len(), 1);
        assert_eq!(warehouse.audit_log().list_by_item(gear.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn restart_over_the_same_store_adds_no_compartments() {
        let store: SharedStore = Arc::new(InMemoryWarehouseStore::new());
        let config = WarehouseConfig {
            integrity_policy: IntegrityPolicy::Reject,
            ..WarehouseConfig::default()
        };

        start_with("memory", store.clone(), &config).await.unwrap();
        start_with("memory", store.clone(), &config).await.unwrap();

        let rows = store.compartment_rows().await.unwrap();
        assert_eq!(rows.len(), 105);
    }

    #[tokio::test]
    async fn corrupt_rows_block_startup_under_reject() {
        let memory = InMemoryWarehouseStore::new();
        let config = WarehouseConfig {
            integrity_policy: IntegrityPolicy::Reject,
            ..WarehouseConfig::default()
        };
        memory.provision(&config.topology).await.unwrap();
        let first = memory.compartment_rows().await.unwrap()[0].id;
        memory.write_raw(first, "Occupied", None).await.unwrap();

        let err = start_with("memory", Arc::new(memory), &config)
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("corrupt compartment row"));
    }
}
