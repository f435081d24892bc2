use audit::{AuditDispatcher, AuditRecord};
use chrono::Utc;
use common::{Actor, Order, OrderId, OrderStatus, OrderStatusHistory, UserId};
use serde::{Deserialize, Serialize};
use store::{StockChange, Store, StoreError, Transaction, TransactionCoordinator};

use crate::error::{DomainError, OrderError, Result};
use crate::inventory::primitives;

/// What a refund does to stock that was already sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestockPolicy {
    /// Only unpaid reservations are released; refunded sales stay sold.
    #[default]
    ReleaseUnpaidOnly,
    /// Refunding a paid order also puts its items back on the shelf.
    RestockRefunds,
}

/// Ledger effect of moving an order from `from` to `to`, as a constructor
/// applied to each item's quantity.
fn ledger_effect(
    from: OrderStatus,
    to: OrderStatus,
    policy: RestockPolicy,
) -> Option<fn(u32) -> StockChange> {
    match (from, to) {
        (_, OrderStatus::Paid) => Some(StockChange::Confirm),
        (OrderStatus::Created, OrderStatus::Cancelled | OrderStatus::Refunded) => {
            Some(StockChange::Release)
        }
        (_, OrderStatus::Refunded) if policy == RestockPolicy::RestockRefunds => {
            Some(StockChange::Increment)
        }
        _ => None,
    }
}

/// Drives orders through their lifecycle.
///
/// Every transition updates the status, appends a history row and applies
/// its stock effect in one transaction. If any item's stock change fails the
/// whole transition is rolled back and the order keeps its status.
#[derive(Clone)]
pub struct OrderStateMachine<S> {
    coordinator: TransactionCoordinator<S>,
    audit: AuditDispatcher,
    restock: RestockPolicy,
}

impl<S: Store> OrderStateMachine<S> {
    pub fn new(coordinator: TransactionCoordinator<S>, audit: AuditDispatcher) -> Self {
        Self {
            coordinator,
            audit,
            restock: RestockPolicy::default(),
        }
    }

    pub fn with_restock_policy(mut self, restock: RestockPolicy) -> Self {
        self.restock = restock;
        self
    }

    pub fn restock_policy(&self) -> RestockPolicy {
        self.restock
    }

    #[tracing::instrument(skip(self, actor, note), fields(actor = %actor.id))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Order> {
        let restock = self.restock;
        let (order, from) = {
            let actor = actor.clone();
            let note = note.clone();
            self.coordinator
                .run::<_, DomainError, _>("order.transition", move |tx| {
                    let actor = actor.clone();
                    let note = note.clone();
                    Box::pin(async move {
                        apply_transition(tx, order_id, new_status, &actor, note, restock).await
                    })
                })
                .await?
        };

        tracing::info!(
            order_number = %order.order_number,
            from = %from,
            to = %order.status,
            "Order status changed"
        );
        self.audit.emit(AuditRecord::order_status_changed(
            &order,
            from,
            actor,
            note.as_deref(),
        ));

        Ok(order)
    }

    /// Cancels an order that has not shipped yet.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor.id))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !order.status.is_cancellable() {
            return Err(OrderError::NotCancellable {
                status: order.status,
            }
            .into());
        }

        self.transition(order_id, OrderStatus::Cancelled, actor, reason)
            .await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.coordinator
            .store()
            .order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id).into())
    }

    /// Status history of an order, oldest first.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let history = self.coordinator.store().status_history(order_id).await?;
        if history.is_empty() {
            // Every stored order has at least its creation row.
            return Err(OrderError::NotFound(order_id).into());
        }
        Ok(history)
    }

    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.coordinator.store().orders_for_user(user_id).await?)
    }
}

async fn apply_transition(
    tx: &mut dyn Transaction,
    order_id: OrderId,
    next: OrderStatus,
    actor: &Actor,
    note: Option<String>,
    restock: RestockPolicy,
) -> Result<(Order, OrderStatus)> {
    let mut order = tx
        .order(order_id)
        .await?
        .ok_or(OrderError::NotFound(order_id))?;
    let from = order.status;

    if !from.can_transition_to(next) {
        return Err(OrderError::InvalidTransition { from, to: next }.into());
    }

    let changed_at = Utc::now();
    if !tx
        .update_order_status(order_id, from, next, changed_at)
        .await?
    {
        return Err(StoreError::Conflict {
            entity: "order",
            id: order_id.to_string(),
        }
        .into());
    }

    if let Some(effect) = ledger_effect(from, next, restock) {
        for item in &order.items {
            primitives::apply(tx, &item.product_id, effect(item.quantity)).await?;
        }
    }

    tx.append_status_history(&OrderStatusHistory {
        order_id,
        status: next,
        changed_by: actor.id.clone(),
        actor_role: actor.role,
        changed_at,
        note,
    })
    .await?;

    order.status = next;
    order.updated_at = changed_at;
    Ok((order, from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paying_confirms_stock() {
        for policy in [RestockPolicy::ReleaseUnpaidOnly, RestockPolicy::RestockRefunds] {
            let effect = ledger_effect(OrderStatus::Created, OrderStatus::Paid, policy).unwrap();
            assert_eq!(effect(2), StockChange::Confirm(2));
        }
    }

    #[test]
    fn cancelling_unpaid_orders_releases_stock() {
        let effect = ledger_effect(
            OrderStatus::Created,
            OrderStatus::Cancelled,
            RestockPolicy::default(),
        )
        .unwrap();
        assert_eq!(effect(3), StockChange::Release(3));
    }

    #[test]
    fn cancelling_paid_orders_leaves_stock() {
        for from in [OrderStatus::Paid, OrderStatus::Processing] {
            assert!(ledger_effect(from, OrderStatus::Cancelled, RestockPolicy::default()).is_none());
        }
    }

    #[test]
    fn refunds_restock_only_when_enabled() {
        assert!(
            ledger_effect(
                OrderStatus::Delivered,
                OrderStatus::Refunded,
                RestockPolicy::ReleaseUnpaidOnly
            )
            .is_none()
        );

        let effect = ledger_effect(
            OrderStatus::Delivered,
            OrderStatus::Refunded,
            RestockPolicy::RestockRefunds,
        )
        .unwrap();
        assert_eq!(effect(1), StockChange::Increment(1));
    }

    #[test]
    fn shipping_steps_have_no_stock_effect() {
        for (from, to) in [
            (OrderStatus::Paid, OrderStatus::Processing),
            (OrderStatus::Processing, OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered),
        ] {
            assert!(ledger_effect(from, to, RestockPolicy::RestockRefunds).is_none());
        }
    }
}
