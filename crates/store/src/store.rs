use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartLine, InventoryRecord, Order, OrderId, OrderStatus, OrderStatusHistory, ProductId, UserId,
};

use crate::{Result, StockChange, StockUpdate};

/// A unit of work against the store.
///
/// Every write made through a transaction becomes visible only when
/// [`commit`](Transaction::commit) succeeds. Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait Transaction: Send {
    /// Reads an inventory record as seen by this transaction.
    async fn inventory(&mut self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Applies a guarded write to one inventory record.
    async fn apply_stock_change(
        &mut self,
        product_id: &ProductId,
        change: StockChange,
    ) -> Result<StockUpdate>;

    /// Reads an order as seen by this transaction.
    async fn order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Inserts a new order. Fails with `Duplicate` if the id or order number
    /// is already taken.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Moves an order from `expected` to `next`.
    ///
    /// Returns `false` without writing if the order does not exist or is no
    /// longer in `expected`.
    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn append_status_history(&mut self, entry: &OrderStatusHistory) -> Result<()>;

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Shared handle to a storage backend.
///
/// Implementations must be thread-safe; one handle is cloned into every
/// service and used by many concurrent requests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Reads the committed state of an inventory record.
    async fn inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Creates an inventory record. Fails with `Duplicate` if one exists.
    async fn insert_inventory(&self, record: InventoryRecord) -> Result<()>;

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Orders placed by a user, oldest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Status history of an order, oldest first.
    async fn status_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>>;

    async fn cart(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    async fn save_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> Result<()>;
}
