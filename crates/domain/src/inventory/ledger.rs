use audit::{AuditDispatcher, AuditRecord};
use common::{Actor, InventoryRecord, ProductId};
use serde::{Deserialize, Serialize};
use store::{StockChange, Store, TransactionCoordinator};

use super::primitives;
use crate::error::{LedgerError, Result};

/// One line of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl AvailabilityRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub product_id: ProductId,
    pub requested: u32,
    /// Free-to-reserve stock; zero for unknown products.
    pub available: u32,
    pub sufficient: bool,
}

/// Stock operations that each run in their own transaction.
///
/// Checkout and the order state machine compose the same operations inside
/// their own transactions through [`primitives`].
#[derive(Clone)]
pub struct InventoryLedger<S> {
    coordinator: TransactionCoordinator<S>,
    audit: AuditDispatcher,
}

impl<S: Store> InventoryLedger<S> {
    pub fn new(coordinator: TransactionCoordinator<S>, audit: AuditDispatcher) -> Self {
        Self { coordinator, audit }
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<S> {
        &self.coordinator
    }

    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        self.run_change("inventory.reserve", product_id, StockChange::Reserve(quantity))
            .await
    }

    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        self.run_change("inventory.release", product_id, StockChange::Release(quantity))
            .await
    }

    #[tracing::instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        self.run_change("inventory.confirm", product_id, StockChange::Confirm(quantity))
            .await
    }

    /// Restocks a product.
    #[tracing::instrument(skip(self, product_id, actor), fields(product_id = %product_id, actor = %actor.id))]
    pub async fn increment(
        &self,
        product_id: &ProductId,
        quantity: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord> {
        let change = StockChange::Increment(quantity);
        let record = self
            .run_change("inventory.increment", product_id, change)
            .await?;
        self.audit_adjustment(&record, change, actor);
        Ok(record)
    }

    /// Removes stock outside the order flow, e.g. damaged goods. Fails rather
    /// than eat into units already reserved for orders.
    #[tracing::instrument(skip(self, product_id, actor), fields(product_id = %product_id, actor = %actor.id))]
    pub async fn decrement_direct(
        &self,
        product_id: &ProductId,
        quantity: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord> {
        let change = StockChange::DecrementDirect(quantity);
        let record = self
            .run_change("inventory.decrement_direct", product_id, change)
            .await?;
        self.audit_adjustment(&record, change, actor);
        Ok(record)
    }

    /// Reports whether each requested quantity could be reserved right now.
    /// Reserves nothing.
    pub async fn check_availability(
        &self,
        items: &[AvailabilityRequest],
    ) -> Result<Vec<Availability>> {
        let store = self.coordinator.store();
        let mut lines = Vec::with_capacity(items.len());

        for item in items {
            let available = store
                .inventory(&item.product_id)
                .await?
                .map(|record| record.free_to_reserve())
                .unwrap_or(0);

            lines.push(Availability {
                product_id: item.product_id.clone(),
                requested: item.quantity,
                available,
                sufficient: item.quantity > 0 && available >= item.quantity,
            });
        }

        Ok(lines)
    }

    pub async fn get_record(&self, product_id: &ProductId) -> Result<InventoryRecord> {
        self.coordinator
            .store()
            .inventory(product_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(product_id.clone()).into())
    }

    /// Creates the inventory record for a new product.
    #[tracing::instrument(skip(self, record), fields(product_id = %record.product_id))]
    pub async fn create_record(&self, record: InventoryRecord) -> Result<InventoryRecord> {
        self.coordinator
            .store()
            .insert_inventory(record.clone())
            .await?;
        tracing::info!(
            store_id = %record.store_id,
            available = record.available_stock,
            "Inventory record created"
        );
        Ok(record)
    }

    async fn run_change(
        &self,
        operation: &'static str,
        product_id: &ProductId,
        change: StockChange,
    ) -> Result<InventoryRecord> {
        let product_id = product_id.clone();
        self.coordinator
            .run(operation, move |tx| {
                let product_id = product_id.clone();
                Box::pin(async move { primitives::apply(tx, &product_id, change).await })
            })
            .await
    }

    fn audit_adjustment(&self, record: &InventoryRecord, change: StockChange, actor: &Actor) {
        tracing::info!(
            change = %change,
            available = record.available_stock,
            reserved = record.reserved_stock,
            "Stock adjusted"
        );
        self.audit.emit(AuditRecord::stock_adjusted(
            record,
            change.name(),
            change.quantity(),
            actor,
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use audit::{AuditAction, InMemoryAuditLog};
    use common::ActorRole;
    use store::InMemoryStore;

    use super::*;
    use crate::error::DomainError;

    async fn ledger_with(available: u32) -> InventoryLedger<InMemoryStore> {
        let ledger = InventoryLedger::new(
            TransactionCoordinator::new(InMemoryStore::new()),
            AuditDispatcher::disabled(),
        );
        ledger
            .create_record(InventoryRecord::new("SKU-1", "store-1", available, 1))
            .await
            .unwrap();
        ledger
    }

    fn sku() -> ProductId {
        ProductId::new("SKU-1")
    }

    #[tokio::test]
    async fn reserve_then_confirm() {
        let ledger = ledger_with(10).await;

        ledger.reserve(&sku(), 4).await.unwrap();
        let record = ledger.confirm(&sku(), 4).await.unwrap();

        assert_eq!(record.available_stock, 6);
        assert_eq!(record.reserved_stock, 0);
        assert_eq!(ledger.get_record(&sku()).await.unwrap(), record);
    }

    #[tokio::test]
    async fn failed_reserve_leaves_record_unchanged() {
        let ledger = ledger_with(2).await;

        let err = ledger.reserve(&sku(), 3).await.unwrap_err();

        assert!(matches!(err, DomainError::Ledger(LedgerError::InsufficientStock { .. })));
        let record = ledger.get_record(&sku()).await.unwrap();
        assert_eq!(record.reserved_stock, 0);
    }

    #[tokio::test]
    async fn availability_reports_each_line() {
        let ledger = ledger_with(5).await;
        ledger.reserve(&sku(), 2).await.unwrap();

        let lines = ledger
            .check_availability(&[
                AvailabilityRequest::new("SKU-1", 3),
                AvailabilityRequest::new("SKU-1", 4),
                AvailabilityRequest::new("unknown", 1),
            ])
            .await
            .unwrap();

        assert!(lines[0].sufficient);
        assert_eq!(lines[0].available, 3);
        assert!(!lines[1].sufficient);
        assert!(!lines[2].sufficient);
        assert_eq!(lines[2].available, 0);

        // read only
        assert_eq!(ledger.get_record(&sku()).await.unwrap().reserved_stock, 2);
    }

    #[tokio::test]
    async fn seller_adjustments_are_audited() {
        let log = InMemoryAuditLog::new();
        let (dispatcher, _worker) = AuditDispatcher::spawn(Arc::new(log.clone()), 16);
        let ledger =
            InventoryLedger::new(TransactionCoordinator::new(InMemoryStore::new()), dispatcher);
        ledger
            .create_record(InventoryRecord::new("SKU-1", "store-1", 5, 1))
            .await
            .unwrap();
        let seller = Actor::new("seller-1", ActorRole::Seller);

        ledger.increment(&sku(), 5, &seller).await.unwrap();
        let record = ledger.decrement_direct(&sku(), 3, &seller).await.unwrap();

        assert_eq!(record.available_stock, 7);
        let records = log.wait_for(2, Duration::from_secs(1)).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.action == AuditAction::StockAdjusted));
        assert_eq!(records[1].details["adjustment"], "decrement_direct");
    }

    #[tokio::test]
    async fn duplicate_record_is_a_store_error() {
        let ledger = ledger_with(5).await;

        let err = ledger
            .create_record(InventoryRecord::new("SKU-1", "store-1", 1, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Store(store::StoreError::Duplicate { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_concurrent_reserves_of_three_from_five() {
        let ledger = ledger_with(5).await;

        let (a, b) = tokio::join!(
            {
                let ledger = ledger.clone();
                async move { ledger.reserve(&ProductId::new("SKU-1"), 3).await }
            },
            {
                let ledger = ledger.clone();
                async move { ledger.reserve(&ProductId::new("SKU-1"), 3).await }
            },
        );

        let outcomes = [a, b];
        let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(DomainError::Ledger(LedgerError::InsufficientStock { .. }))
        )));
        assert_eq!(ledger.get_record(&sku()).await.unwrap().reserved_stock, 3);
    }
}
