//! Ledger operations that run inside a caller's transaction.
//!
//! Each one is a single guarded write: the stock check and the update happen
//! together in the store, so concurrent callers can never both pass the
//! check. A failed guard leaves the record untouched and returns an error,
//! which makes the caller's transaction roll back.

use common::{InventoryRecord, ProductId};
use store::{StockChange, StockUpdate, Transaction};

use crate::error::{LedgerError, Result};

/// Holds `quantity` units for an unpaid order.
pub async fn reserve(
    tx: &mut dyn Transaction,
    product_id: &ProductId,
    quantity: u32,
) -> Result<InventoryRecord> {
    apply(tx, product_id, StockChange::Reserve(quantity)).await
}

/// Undoes a reservation. Never touches available stock.
pub async fn release(
    tx: &mut dyn Transaction,
    product_id: &ProductId,
    quantity: u32,
) -> Result<InventoryRecord> {
    apply(tx, product_id, StockChange::Release(quantity)).await
}

/// Turns a reservation into a sale.
pub async fn confirm(
    tx: &mut dyn Transaction,
    product_id: &ProductId,
    quantity: u32,
) -> Result<InventoryRecord> {
    apply(tx, product_id, StockChange::Confirm(quantity)).await
}

pub async fn increment(
    tx: &mut dyn Transaction,
    product_id: &ProductId,
    quantity: u32,
) -> Result<InventoryRecord> {
    apply(tx, product_id, StockChange::Increment(quantity)).await
}

pub async fn decrement_direct(
    tx: &mut dyn Transaction,
    product_id: &ProductId,
    quantity: u32,
) -> Result<InventoryRecord> {
    apply(tx, product_id, StockChange::DecrementDirect(quantity)).await
}

pub async fn apply(
    tx: &mut dyn Transaction,
    product_id: &ProductId,
    change: StockChange,
) -> Result<InventoryRecord> {
    if change.quantity() == 0 {
        return Err(LedgerError::InvalidQuantity.into());
    }

    match tx.apply_stock_change(product_id, change).await? {
        StockUpdate::Applied(record) => {
            tracing::debug!(
                product_id = %product_id,
                change = %change,
                available = record.available_stock,
                reserved = record.reserved_stock,
                "Stock updated"
            );
            if lowers_free_stock(change) && record.is_low_stock() {
                signal_low_stock(&record);
            }
            Ok(record)
        }
        StockUpdate::Rejected(record) => {
            tracing::debug!(product_id = %product_id, change = %change, "Stock change rejected");
            Err(rejection(product_id, change, &record).into())
        }
        StockUpdate::Missing => Err(LedgerError::NotFound(product_id.clone()).into()),
    }
}

fn lowers_free_stock(change: StockChange) -> bool {
    matches!(
        change,
        StockChange::Reserve(_) | StockChange::Confirm(_) | StockChange::DecrementDirect(_)
    )
}

fn signal_low_stock(record: &InventoryRecord) {
    tracing::warn!(
        product_id = %record.product_id,
        store_id = %record.store_id,
        free = record.free_to_reserve(),
        threshold = record.reorder_threshold,
        "Low stock"
    );
    metrics::counter!("inventory_low_stock_total").increment(1);
}

fn rejection(product_id: &ProductId, change: StockChange, record: &InventoryRecord) -> LedgerError {
    match change {
        StockChange::Reserve(requested) => LedgerError::InsufficientStock {
            product_id: product_id.clone(),
            requested,
            available: record.free_to_reserve(),
        },
        _ => LedgerError::InvalidState {
            product_id: product_id.clone(),
            operation: change.name(),
            quantity: change.quantity(),
            available: record.available_stock,
            reserved: record.reserved_stock,
        },
    }
}

#[cfg(test)]
mod tests {
    use store::{InMemoryStore, Store};

    use super::*;
    use crate::error::DomainError;

    async fn store_with(available: u32, reserved: u32) -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut record = InventoryRecord::new("SKU-1", "store-1", available, 1);
        record.reserved_stock = reserved;
        store.insert_inventory(record).await.unwrap();
        store
    }

    fn sku() -> ProductId {
        ProductId::new("SKU-1")
    }

    #[tokio::test]
    async fn confirm_decrements_both_counters() {
        let store = store_with(10, 4).await;
        let mut tx = store.begin().await.unwrap();

        let record = confirm(tx.as_mut(), &sku(), 4).await.unwrap();

        assert_eq!(record.available_stock, 6);
        assert_eq!(record.reserved_stock, 0);
    }

    #[tokio::test]
    async fn release_never_touches_available() {
        let store = store_with(10, 4).await;
        let mut tx = store.begin().await.unwrap();

        let record = release(tx.as_mut(), &sku(), 3).await.unwrap();

        assert_eq!(record.available_stock, 10);
        assert_eq!(record.reserved_stock, 1);
    }

    #[tokio::test]
    async fn reserve_beyond_free_stock_reports_what_is_left() {
        let store = store_with(5, 3).await;
        let mut tx = store.begin().await.unwrap();

        let err = reserve(tx.as_mut(), &sku(), 3).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Ledger(LedgerError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn release_more_than_reserved_is_invalid_state() {
        let store = store_with(5, 1).await;
        let mut tx = store.begin().await.unwrap();

        let err = release(tx.as_mut(), &sku(), 2).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Ledger(LedgerError::InvalidState {
                operation: "release",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn decrement_below_reserved_is_invalid_state() {
        let store = store_with(5, 4).await;
        let mut tx = store.begin().await.unwrap();

        let err = decrement_direct(tx.as_mut(), &sku(), 2).await.unwrap_err();

        assert!(matches!(err, DomainError::Ledger(LedgerError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_touching_the_store() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = increment(tx.as_mut(), &sku(), 0).await.unwrap_err();

        assert!(matches!(err, DomainError::Ledger(LedgerError::InvalidQuantity)));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = reserve(tx.as_mut(), &sku(), 1).await.unwrap_err();

        assert!(matches!(err, DomainError::Ledger(LedgerError::NotFound(_))));
    }
}
