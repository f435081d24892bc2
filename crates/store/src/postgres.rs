use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartLine, InventoryRecord, Money, Order, OrderId, OrderStatus, OrderStatusHistory, Pricing,
    ProductId, StoreId, UserId,
};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StockChange, StockUpdate, StoreError,
    store::{Store, Transaction},
};

const INVENTORY_COLUMNS: &str =
    "product_id, store_id, available_stock, reserved_stock, reorder_threshold, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, user_id, store_id, items, subtotal_cents, \
     tax_cents, shipping_fee_cents, total_cents, status, shipping_address, billing_address, \
     created_at, updated_at";

/// Guarded UPDATE for each stock change. `$1` is the product id, `$2` the
/// quantity. The WHERE clause is the guard, so the row lock taken by the
/// UPDATE makes check and write a single step.
fn stock_change_sql(change: StockChange) -> String {
    let (set, guard) = match change {
        StockChange::Reserve(_) => (
            "reserved_stock = reserved_stock + $2",
            "available_stock - reserved_stock >= $2",
        ),
        StockChange::Release(_) => ("reserved_stock = reserved_stock - $2", "reserved_stock >= $2"),
        StockChange::Confirm(_) => (
            "available_stock = available_stock - $2, reserved_stock = reserved_stock - $2",
            "reserved_stock >= $2 AND available_stock >= $2",
        ),
        StockChange::Increment(_) => (
            "available_stock = available_stock + $2",
            "available_stock + $2 <= 4294967295",
        ),
        StockChange::DecrementDirect(_) => (
            "available_stock = available_stock - $2",
            "available_stock >= $2 AND available_stock - $2 >= reserved_stock",
        ),
    };

    format!(
        "UPDATE inventory SET {set}, updated_at = now() \
         WHERE product_id = $1 AND {guard} RETURNING {INVENTORY_COLUMNS}"
    )
}

fn to_u32(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::InvalidRecord(format!("{column} = {value}")))
}

fn row_to_inventory(row: PgRow) -> Result<InventoryRecord> {
    Ok(InventoryRecord {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        store_id: StoreId::new(row.try_get::<String, _>("store_id")?),
        available_stock: to_u32(&row, "available_stock")?,
        reserved_stock: to_u32(&row, "reserved_stock")?,
        reorder_threshold: to_u32(&row, "reorder_threshold")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: row.try_get("order_number")?,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        store_id: StoreId::new(row.try_get::<String, _>("store_id")?),
        items: serde_json::from_value(row.try_get("items")?)?,
        pricing: Pricing {
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            shipping_fee: Money::from_cents(row.try_get("shipping_fee_cents")?),
            total_amount: Money::from_cents(row.try_get("total_cents")?),
        },
        status,
        shipping_address: serde_json::from_value(row.try_get("shipping_address")?)?,
        billing_address: serde_json::from_value(row.try_get("billing_address")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_history(row: PgRow) -> Result<OrderStatusHistory> {
    let status: String = row.try_get("status")?;
    let role: String = row.try_get("actor_role")?;

    Ok(OrderStatusHistory {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        status: status
            .parse()
            .map_err(|e: common::ParseStatusError| StoreError::InvalidRecord(e.to_string()))?,
        changed_by: row.try_get("changed_by")?,
        actor_role: role
            .parse()
            .map_err(|e: common::ParseStatusError| StoreError::InvalidRecord(e.to_string()))?,
        changed_at: row.try_get("changed_at")?,
        note: row.try_get("note")?,
    })
}

fn map_unique_violation(err: sqlx::Error, entity: &'static str, key: String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some("23505")
    {
        return StoreError::Duplicate { entity, key };
    }
    StoreError::Database(err)
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_inventory).transpose()
    }

    async fn insert_inventory(&self, record: InventoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, store_id, available_stock, reserved_stock, reorder_threshold, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.product_id.as_str())
        .bind(record.store_id.as_str())
        .bind(i64::from(record.available_stock))
        .bind(i64::from(record.reserved_stock))
        .bind(i64::from(record.reorder_threshold))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "inventory", record.product_id.to_string()))?;

        Ok(())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at ASC, order_number ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, status, changed_by, actor_role, changed_at, note
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_history).collect()
    }

    async fn cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let lines: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT lines FROM carts WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match lines {
            Some(lines) => Ok(serde_json::from_value(lines)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (user_id, lines, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id) DO UPDATE SET lines = EXCLUDED.lines, updated_at = now()
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(serde_json::to_value(&lines)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Transaction handle for [`PostgresStore`], wrapping a database transaction.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn inventory(&mut self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_inventory).transpose()
    }

    async fn apply_stock_change(
        &mut self,
        product_id: &ProductId,
        change: StockChange,
    ) -> Result<StockUpdate> {
        let updated = sqlx::query(&stock_change_sql(change))
            .bind(product_id.as_str())
            .bind(i64::from(change.quantity()))
            .fetch_optional(&mut *self.tx)
            .await?;

        if let Some(row) = updated {
            return Ok(StockUpdate::Applied(row_to_inventory(row)?));
        }

        match self.inventory(product_id).await? {
            Some(record) => Ok(StockUpdate::Rejected(record)),
            None => Ok(StockUpdate::Missing),
        }
    }

    async fn order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, store_id, items, subtotal_cents, tax_cents,
                                shipping_fee_cents, total_cents, status, shipping_address, billing_address,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_uuid())
        .bind(order.store_id.as_str())
        .bind(serde_json::to_value(&order.items)?)
        .bind(order.pricing.subtotal.cents())
        .bind(order.pricing.tax.cents())
        .bind(order.pricing.shipping_fee.cents())
        .bind(order.pricing.total_amount.cents())
        .bind(order.status.as_str())
        .bind(serde_json::to_value(&order.shipping_address)?)
        .bind(serde_json::to_value(&order.billing_address)?)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, "order", order.order_number.clone()))?;

        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(changed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_status_history(&mut self, entry: &OrderStatusHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, status, changed_by, actor_role, changed_at, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.order_id.as_uuid())
        .bind(entry.status.as_str())
        .bind(&entry.changed_by)
        .bind(entry.actor_role.as_str())
        .bind(entry.changed_at)
        .bind(&entry.note)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE carts SET lines = '[]'::jsonb, updated_at = now() WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_sql_carries_the_free_stock_guard() {
        let sql = stock_change_sql(StockChange::Reserve(1));
        assert!(sql.contains("reserved_stock = reserved_stock + $2"));
        assert!(sql.contains("available_stock - reserved_stock >= $2"));
        assert!(sql.contains("RETURNING"));
    }

    #[test]
    fn confirm_sql_decrements_both_counters() {
        let sql = stock_change_sql(StockChange::Confirm(1));
        assert!(sql.contains("available_stock = available_stock - $2"));
        assert!(sql.contains("reserved_stock = reserved_stock - $2"));
        assert!(sql.contains("reserved_stock >= $2 AND available_stock >= $2"));
    }

    #[test]
    fn increment_sql_only_guards_the_counter_range() {
        let sql = stock_change_sql(StockChange::Increment(1));
        assert!(sql.contains("WHERE product_id = $1 AND available_stock + $2 <= 4294967295"));
    }
}
