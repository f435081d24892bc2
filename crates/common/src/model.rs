//! Records persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorRole, Money, OrderId, OrderStatus, ProductId, StoreId, UserId};

/// Stock counters for one product.
///
/// `available_stock` counts every sellable unit, including the ones currently
/// held by unpaid orders in `reserved_stock`. The record is valid only while
/// `reserved_stock <= available_stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub available_stock: u32,
    pub reserved_stock: u32,
    pub reorder_threshold: u32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn new(
        product_id: impl Into<ProductId>,
        store_id: impl Into<StoreId>,
        initial_stock: u32,
        reorder_threshold: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            store_id: store_id.into(),
            available_stock: initial_stock,
            reserved_stock: 0,
            reorder_threshold,
            updated_at: Utc::now(),
        }
    }

    /// Units that can still be reserved by new orders.
    pub fn free_to_reserve(&self) -> u32 {
        self.available_stock.saturating_sub(self.reserved_stock)
    }

    pub fn is_low_stock(&self) -> bool {
        self.free_to_reserve() <= self.reorder_threshold
    }

    pub fn is_consistent(&self) -> bool {
        self.reserved_stock <= self.available_stock
    }
}

/// Postal address captured on the order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Snapshot of a purchased product, frozen when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub title: String,
    pub sku: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderItem {
    /// `None` when the line total does not fit in cents.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_times(self.quantity)
    }
}

/// Amounts computed once at order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_fee: Money,
    pub total_amount: Money,
}

/// One vendor's share of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub store_id: StoreId,
    pub items: Vec<OrderItem>,
    pub pricing: Pricing,
    pub status: OrderStatus,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

/// Append-only record of a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub changed_by: String,
    pub actor_role: ActorRole,
    pub changed_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Whoever is driving an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id.to_string(), ActorRole::Customer)
    }

    pub fn system() -> Self {
        Self::new("system", ActorRole::System)
    }
}

/// A line in a buyer's cart as priced by the cart collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub title: String,
    pub sku: String,
    pub unit_price: Money,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_to_reserve_excludes_reserved_units() {
        let mut record = InventoryRecord::new("SKU-1", "store-a", 10, 2);
        record.reserved_stock = 4;
        assert_eq!(record.free_to_reserve(), 6);
        assert!(!record.is_low_stock());

        record.reserved_stock = 8;
        assert!(record.is_low_stock());
        assert!(record.is_consistent());
    }

    #[test]
    fn line_total_multiplies_unit_price() {
        let item = OrderItem {
            product_id: ProductId::new("SKU-1"),
            title: "Widget".to_string(),
            sku: "W-1".to_string(),
            unit_price: Money::from_cents(1250),
            quantity: 4,
        };
        assert_eq!(item.line_total(), Some(Money::from_cents(5000)));
    }
}
