use chrono::{DateTime, Utc};
use common::{Actor, ActorRole, InventoryRecord, Order, OrderStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    OrderCreated,
    OrderStatusChanged,
    StockAdjusted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OrderCreated => "OrderCreated",
            AuditAction::OrderStatusChanged => "OrderStatusChanged",
            AuditAction::StockAdjusted => "StockAdjusted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state-change fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub occurred_at: DateTime<Utc>,
    pub details: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        actor: &Actor,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            occurred_at: Utc::now(),
            details,
        }
    }

    pub fn order_created(order: &Order, actor: &Actor) -> Self {
        Self::new(
            AuditAction::OrderCreated,
            "order",
            order.id.to_string(),
            actor,
            json!({
                "order_number": order.order_number,
                "store_id": order.store_id,
                "item_count": order.items.len(),
                "total_quantity": order.total_quantity(),
                "total_cents": order.pricing.total_amount.cents(),
            }),
        )
    }

    pub fn order_status_changed(
        order: &Order,
        from: OrderStatus,
        actor: &Actor,
        note: Option<&str>,
    ) -> Self {
        Self::new(
            AuditAction::OrderStatusChanged,
            "order",
            order.id.to_string(),
            actor,
            json!({
                "order_number": order.order_number,
                "from": from,
                "to": order.status,
                "note": note,
            }),
        )
    }

    /// A seller or admin adjustment of stock. `adjustment` names the change,
    /// e.g. `increment` or `decrement_direct`.
    pub fn stock_adjusted(
        record: &InventoryRecord,
        adjustment: &str,
        quantity: u32,
        actor: &Actor,
    ) -> Self {
        Self::new(
            AuditAction::StockAdjusted,
            "inventory",
            record.product_id.to_string(),
            actor,
            json!({
                "adjustment": adjustment,
                "quantity": quantity,
                "store_id": record.store_id,
                "available_stock": record.available_stock,
                "reserved_stock": record.reserved_stock,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_adjusted_carries_resulting_levels() {
        let mut record = InventoryRecord::new("SKU-1", "store-1", 12, 2);
        record.reserved_stock = 3;
        let actor = Actor::new("seller-7", ActorRole::Seller);

        let audit = AuditRecord::stock_adjusted(&record, "increment", 2, &actor);

        assert_eq!(audit.action, AuditAction::StockAdjusted);
        assert_eq!(audit.entity_type, "inventory");
        assert_eq!(audit.entity_id, "SKU-1");
        assert_eq!(audit.actor_id, "seller-7");
        assert_eq!(audit.actor_role, ActorRole::Seller);
        assert_eq!(audit.details["available_stock"], 12);
        assert_eq!(audit.details["reserved_stock"], 3);
        assert_eq!(audit.details["adjustment"], "increment");
    }

    #[test]
    fn action_serializes_by_name() {
        let value = serde_json::to_value(AuditAction::OrderStatusChanged).unwrap();
        assert_eq!(value, "OrderStatusChanged");
    }
}
