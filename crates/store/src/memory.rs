use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartLine, InventoryRecord, Order, OrderId, OrderStatus, OrderStatusHistory, ProductId, UserId,
};
use tokio::sync::RwLock;

use crate::{
    Result, StockChange, StockUpdate, StoreError,
    store::{Store, Transaction},
};

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

#[derive(Debug, Default)]
struct Tables {
    inventory: HashMap<ProductId, Versioned<InventoryRecord>>,
    orders: HashMap<OrderId, Versioned<Order>>,
    order_numbers: HashSet<String>,
    history: Vec<OrderStatusHistory>,
    carts: HashMap<UserId, Versioned<Vec<CartLine>>>,
}

impl Tables {
    fn version_of(&self, key: &RecordKey) -> u64 {
        match key {
            RecordKey::Inventory(id) => self.inventory.get(id).map_or(0, |v| v.version),
            RecordKey::Order(id) => self.orders.get(id).map_or(0, |v| v.version),
            RecordKey::Cart(id) => self.carts.get(id).map_or(0, |v| v.version),
        }
    }
}

fn bump<K, T>(table: &mut HashMap<K, Versioned<T>>, key: K, value: T)
where
    K: std::hash::Hash + Eq,
{
    match table.get_mut(&key) {
        Some(entry) => {
            entry.value = value;
            entry.version += 1;
        }
        None => {
            table.insert(key, Versioned { value, version: 1 });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RecordKey {
    Inventory(ProductId),
    Order(OrderId),
    Cart(UserId),
}

impl RecordKey {
    fn conflict(&self) -> StoreError {
        let (entity, id) = match self {
            RecordKey::Inventory(id) => ("inventory", id.to_string()),
            RecordKey::Order(id) => ("order", id.to_string()),
            RecordKey::Cart(id) => ("cart", id.to_string()),
        };
        StoreError::Conflict { entity, id }
    }
}

/// In-memory store with optimistic concurrency control.
///
/// Every record carries a version. A transaction remembers the version of
/// each record it reads and buffers its writes; commit re-checks all of
/// those versions under a single write lock and either applies every write
/// or fails with [`StoreError::Conflict`].
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a write conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn history_len(&self) -> usize {
        self.tables.read().await.history.len()
    }

    /// Returns every inventory record, in no particular order.
    pub async fn inventory_records(&self) -> Vec<InventoryRecord> {
        self.tables
            .read()
            .await
            .inventory
            .values()
            .map(|v| v.value.clone())
            .collect()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            read_versions: HashMap::new(),
            inventory: HashMap::new(),
            orders: HashMap::new(),
            dirty: HashSet::new(),
            new_orders: Vec::new(),
            history: Vec::new(),
        }))
    }

    async fn inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.inventory.get(product_id).map(|v| v.value.clone()))
    }

    async fn insert_inventory(&self, record: InventoryRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.inventory.contains_key(&record.product_id) {
            return Err(StoreError::Duplicate {
                entity: "inventory",
                key: record.product_id.to_string(),
            });
        }
        bump(&mut tables.inventory, record.product_id.clone(), record);
        Ok(())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&order_id).map(|v| v.value.clone()))
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|v| v.value.user_id == user_id)
            .map(|v| v.value.clone())
            .collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.order_number.cmp(&b.order_number))
        });
        Ok(orders)
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .carts
            .get(&user_id)
            .map(|v| v.value.clone())
            .unwrap_or_default())
    }

    async fn save_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> Result<()> {
        let mut tables = self.tables.write().await;
        bump(&mut tables.carts, user_id, lines);
        Ok(())
    }
}

/// Transaction handle for [`InMemoryStore`].
pub struct InMemoryTransaction {
    store: InMemoryStore,
    /// Version of every record observed, 0 for "did not exist".
    read_versions: HashMap<RecordKey, u64>,
    inventory: HashMap<ProductId, Option<InventoryRecord>>,
    orders: HashMap<OrderId, Option<Order>>,
    dirty: HashSet<RecordKey>,
    new_orders: Vec<OrderId>,
    history: Vec<OrderStatusHistory>,
}

impl InMemoryTransaction {
    async fn load_inventory(&mut self, product_id: &ProductId) -> Option<InventoryRecord> {
        if let Some(seen) = self.inventory.get(product_id) {
            return seen.clone();
        }

        let (value, version) = {
            let tables = self.store.tables.read().await;
            match tables.inventory.get(product_id) {
                Some(v) => (Some(v.value.clone()), v.version),
                None => (None, 0),
            }
        };

        self.read_versions
            .insert(RecordKey::Inventory(product_id.clone()), version);
        self.inventory.insert(product_id.clone(), value.clone());
        value
    }

    async fn load_order(&mut self, order_id: OrderId) -> Option<Order> {
        if let Some(seen) = self.orders.get(&order_id) {
            return seen.clone();
        }

        let (value, version) = {
            let tables = self.store.tables.read().await;
            match tables.orders.get(&order_id) {
                Some(v) => (Some(v.value.clone()), v.version),
                None => (None, 0),
            }
        };

        self.read_versions.insert(RecordKey::Order(order_id), version);
        self.orders.insert(order_id, value.clone());
        value
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn inventory(&mut self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        Ok(self.load_inventory(product_id).await)
    }

    async fn apply_stock_change(
        &mut self,
        product_id: &ProductId,
        change: StockChange,
    ) -> Result<StockUpdate> {
        let Some(record) = self.load_inventory(product_id).await else {
            return Ok(StockUpdate::Missing);
        };

        match change.apply_to(&record) {
            Some(updated) => {
                self.inventory
                    .insert(product_id.clone(), Some(updated.clone()));
                self.dirty.insert(RecordKey::Inventory(product_id.clone()));
                Ok(StockUpdate::Applied(updated))
            }
            None => Ok(StockUpdate::Rejected(record)),
        }
    }

    async fn order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.load_order(order_id).await)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.load_order(order.id).await.is_some() {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: order.id.to_string(),
            });
        }
        let number_taken = self.new_orders.iter().any(|id| {
            matches!(self.orders.get(id), Some(Some(o)) if o.order_number == order.order_number)
        });
        if number_taken {
            return Err(StoreError::Duplicate {
                entity: "order number",
                key: order.order_number.clone(),
            });
        }

        self.orders.insert(order.id, Some(order.clone()));
        self.dirty.insert(RecordKey::Order(order.id));
        self.new_orders.push(order.id);
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut order) = self.load_order(order_id).await else {
            return Ok(false);
        };
        if order.status != expected {
            return Ok(false);
        }

        order.status = next;
        order.updated_at = changed_at;
        self.orders.insert(order_id, Some(order));
        self.dirty.insert(RecordKey::Order(order_id));
        Ok(true)
    }

    async fn append_status_history(&mut self, entry: &OrderStatusHistory) -> Result<()> {
        self.history.push(entry.clone());
        Ok(())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        let key = RecordKey::Cart(user_id);
        if !self.read_versions.contains_key(&key) {
            let version = self.store.tables.read().await.version_of(&key);
            self.read_versions.insert(key.clone(), version);
        }
        self.dirty.insert(key);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = *self;

        if this.store.take_injected_conflict() {
            return Err(StoreError::Conflict {
                entity: "transaction",
                id: "injected".to_string(),
            });
        }

        let mut tables = this.store.tables.write().await;

        for (key, seen) in &this.read_versions {
            if tables.version_of(key) != *seen {
                return Err(key.conflict());
            }
        }

        for order_id in &this.new_orders {
            if let Some(Some(order)) = this.orders.get(order_id)
                && tables.order_numbers.contains(&order.order_number)
            {
                return Err(StoreError::Duplicate {
                    entity: "order number",
                    key: order.order_number.clone(),
                });
            }
        }

        for key in this.dirty.drain() {
            match key {
                RecordKey::Inventory(product_id) => {
                    if let Some(Some(record)) = this.inventory.remove(&product_id) {
                        bump(&mut tables.inventory, product_id, record);
                    }
                }
                RecordKey::Order(order_id) => {
                    if let Some(Some(order)) = this.orders.remove(&order_id) {
                        if this.new_orders.contains(&order_id) {
                            tables.order_numbers.insert(order.order_number.clone());
                        }
                        bump(&mut tables.orders, order_id, order);
                    }
                }
                RecordKey::Cart(user_id) => {
                    if tables.carts.contains_key(&user_id) {
                        bump(&mut tables.carts, user_id, Vec::new());
                    }
                }
            }
        }

        tables.history.append(&mut this.history);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Actor, Address, Money, OrderItem, Pricing, StoreId};

    fn sku(id: &str) -> ProductId {
        ProductId::new(id)
    }

    async fn seeded(available: u32) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_inventory(InventoryRecord::new("SKU-1", "store-a", available, 0))
            .await
            .unwrap();
        store
    }

    fn order(number: &str) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            order_number: number.to_string(),
            user_id: UserId::new(),
            store_id: StoreId::new("store-a"),
            items: vec![OrderItem {
                product_id: sku("SKU-1"),
                title: "Widget".to_string(),
                sku: "W-1".to_string(),
                unit_price: Money::from_cents(1000),
                quantity: 1,
            }],
            pricing: Pricing::default(),
            status: OrderStatus::Created,
            shipping_address: Address::default(),
            billing_address: Address::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = seeded(5).await;

        let mut tx = store.begin().await.unwrap();
        let update = tx
            .apply_stock_change(&sku("SKU-1"), StockChange::Reserve(2))
            .await
            .unwrap();
        assert!(matches!(update, StockUpdate::Applied(ref r) if r.reserved_stock == 2));

        // Not visible before commit
        let committed = store.inventory(&sku("SKU-1")).await.unwrap().unwrap();
        assert_eq!(committed.reserved_stock, 0);

        tx.commit().await.unwrap();
        let committed = store.inventory(&sku("SKU-1")).await.unwrap().unwrap();
        assert_eq!(committed.reserved_stock, 2);
    }

    #[tokio::test]
    async fn rollback_discards_every_write() {
        let store = seeded(5).await;
        let new_order = order("ORD-1");

        let mut tx = store.begin().await.unwrap();
        tx.apply_stock_change(&sku("SKU-1"), StockChange::Reserve(2))
            .await
            .unwrap();
        tx.insert_order(&new_order).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(
            store
                .inventory(&sku("SKU-1"))
                .await
                .unwrap()
                .unwrap()
                .reserved_stock,
            0
        );
        assert!(store.order(new_order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writer_causes_conflict_on_commit() {
        let store = seeded(5).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first
            .apply_stock_change(&sku("SKU-1"), StockChange::Reserve(3))
            .await
            .unwrap();
        let update = second
            .apply_stock_change(&sku("SKU-1"), StockChange::Reserve(3))
            .await
            .unwrap();
        // Both see reserved = 0 in their own view
        assert!(matches!(update, StockUpdate::Applied(_)));

        first.commit().await.unwrap();
        let result = second.commit().await;
        assert!(matches!(
            result,
            Err(StoreError::Conflict {
                entity: "inventory",
                ..
            })
        ));

        let record = store.inventory(&sku("SKU-1")).await.unwrap().unwrap();
        assert_eq!(record.reserved_stock, 3);
    }

    #[tokio::test]
    async fn rejected_guard_leaves_record_untouched() {
        let store = seeded(2).await;
        let mut tx = store.begin().await.unwrap();

        let update = tx
            .apply_stock_change(&sku("SKU-1"), StockChange::Reserve(3))
            .await
            .unwrap();
        assert!(matches!(update, StockUpdate::Rejected(ref r) if r.reserved_stock == 0));

        let missing = tx
            .apply_stock_change(&sku("NOPE"), StockChange::Reserve(1))
            .await
            .unwrap();
        assert_eq!(missing, StockUpdate::Missing);
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let store = seeded(5).await;
        let new_order = order("ORD-2");

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&new_order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let wrong = tx
            .update_order_status(
                new_order.id,
                OrderStatus::Paid,
                OrderStatus::Processing,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(!wrong);

        let moved = tx
            .update_order_status(
                new_order.id,
                OrderStatus::Created,
                OrderStatus::Paid,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(moved);

        let actor = Actor::system();
        tx.append_status_history(&OrderStatusHistory {
            order_id: new_order.id,
            status: OrderStatus::Paid,
            changed_by: actor.id,
            actor_role: actor.role,
            changed_at: Utc::now(),
            note: None,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stored = store.order(new_order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(store.status_history(new_order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_order_numbers_are_rejected() {
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order("ORD-DUP")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order("ORD-DUP")).await.unwrap();
        let result = tx.commit().await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn clear_cart_empties_saved_lines() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        store
            .save_cart(
                user,
                vec![CartLine {
                    product_id: sku("SKU-1"),
                    store_id: StoreId::new("store-a"),
                    title: "Widget".to_string(),
                    sku: "W-1".to_string(),
                    unit_price: Money::from_cents(500),
                    quantity: 2,
                }],
            )
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.clear_cart(user).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.cart(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_conflicts_fail_the_next_commits() {
        let store = seeded(5).await;
        store.inject_conflicts(1);

        let tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Conflict { .. })
        ));

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_inventory_records_are_rejected() {
        let store = seeded(5).await;
        let result = store
            .insert_inventory(InventoryRecord::new("SKU-1", "store-a", 1, 0))
            .await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.inventory_records().await.len(), 1);
    }
}
