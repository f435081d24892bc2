//! Checkout orchestrator: cart validation, store partitioning and the single
//! reservation transaction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use audit::{AuditDispatcher, AuditRecord};
use chrono::Utc;
use common::{
    Actor, Address, CartLine, Order, OrderId, OrderItem, OrderStatus, OrderStatusHistory,
    ProductId, StoreId, UserId,
};
use domain::{AvailabilityRequest, InventoryLedger, PricingPolicy, generate_order_number, primitives};
use serde::{Deserialize, Serialize};
use store::{Store, TransactionCoordinator};

use crate::error::{CartIssue, CartIssueReason, CheckoutError};
use crate::services::catalog::{CatalogService, ProductSnapshot, ProductStatus, StoreStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub shipping_address: Address,
    pub billing_address: Address,
}

/// Turns a cart into orders, one per store.
///
/// Validation runs first and reports every problem with the cart at once.
/// Reservation, order creation and clearing the cart then happen in one
/// transaction: if any line cannot be reserved nothing is reserved and no
/// order exists.
pub struct CheckoutOrchestrator<S> {
    coordinator: TransactionCoordinator<S>,
    ledger: InventoryLedger<S>,
    catalog: Arc<dyn CatalogService>,
    pricing: PricingPolicy,
    audit: AuditDispatcher,
}

impl<S: Store + Clone> CheckoutOrchestrator<S> {
    pub fn new(
        coordinator: TransactionCoordinator<S>,
        catalog: Arc<dyn CatalogService>,
        pricing: PricingPolicy,
        audit: AuditDispatcher,
    ) -> Self {
        let ledger = InventoryLedger::new(coordinator.clone(), audit.clone());
        Self {
            coordinator,
            ledger,
            catalog,
            pricing,
            audit,
        }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.lines.len()))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Vec<Order>, CheckoutError> {
        let items = self.validate(&request.lines).await?;

        let orders = self.build_orders(&request, items)?;
        let user_id = request.user_id;
        let actor = Actor::customer(user_id);

        let placed = orders.clone();
        let history_actor = actor.clone();
        self.coordinator
            .run::<(), CheckoutError, _>("checkout", move |tx| {
                let orders = placed.clone();
                let actor = history_actor.clone();
                Box::pin(async move {
                    for order in &orders {
                        for item in &order.items {
                            primitives::reserve(tx, &item.product_id, item.quantity).await?;
                        }
                        tx.insert_order(order).await?;
                        tx.append_status_history(&OrderStatusHistory {
                            order_id: order.id,
                            status: OrderStatus::Created,
                            changed_by: actor.id.clone(),
                            actor_role: actor.role,
                            changed_at: order.created_at,
                            note: None,
                        })
                        .await?;
                    }
                    tx.clear_cart(user_id).await?;
                    Ok(())
                })
            })
            .await?;

        for order in &orders {
            tracing::info!(
                order_id = %order.id,
                order_number = %order.order_number,
                store_id = %order.store_id,
                total = %order.pricing.total_amount,
                "Order created"
            );
            self.audit.emit(AuditRecord::order_created(order, &actor));
        }
        metrics::counter!("checkouts_completed_total").increment(1);
        metrics::counter!("orders_created_total").increment(orders.len() as u64);

        Ok(orders)
    }

    /// Checks out whatever the user's saved cart holds.
    pub async fn checkout_saved_cart(
        &self,
        user_id: UserId,
        shipping_address: Address,
        billing_address: Address,
    ) -> Result<Vec<Order>, CheckoutError> {
        let lines = self.coordinator.store().cart(user_id).await?;
        self.checkout(CheckoutRequest {
            user_id,
            lines,
            shipping_address,
            billing_address,
        })
        .await
    }

    /// Reports every problem with the cart at once. On success returns the
    /// order items, titles and prices taken from the catalog, tagged with the
    /// store selling them.
    pub async fn validate(
        &self,
        lines: &[CartLine],
    ) -> Result<Vec<(StoreId, OrderItem)>, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut issues = Vec::new();
        let mut items = Vec::with_capacity(lines.len());
        let mut requested: BTreeMap<ProductId, u32> = BTreeMap::new();
        let mut oversized = BTreeSet::new();

        for line in lines {
            let product = match self.check_line(line).await? {
                LineCheck::Valid(product) => product,
                LineCheck::Invalid(reason) => {
                    issues.push(CartIssue {
                        product_id: line.product_id.clone(),
                        reason,
                    });
                    continue;
                }
            };

            // Stock is checked per product, so a product split over several
            // lines needs the sum of them.
            let total = requested.entry(line.product_id.clone()).or_default();
            match total.checked_add(line.quantity) {
                Some(sum) => *total = sum,
                None => {
                    if oversized.insert(line.product_id.clone()) {
                        issues.push(CartIssue {
                            product_id: line.product_id.clone(),
                            reason: CartIssueReason::QuantityTooLarge,
                        });
                    }
                }
            }

            items.push((
                product.store_id,
                OrderItem {
                    product_id: product.product_id,
                    title: product.title,
                    sku: product.sku,
                    unit_price: product.price,
                    quantity: line.quantity,
                },
            ));
        }

        let requests: Vec<_> = requested
            .into_iter()
            .filter(|(product_id, _)| !oversized.contains(product_id))
            .map(|(product_id, quantity)| AvailabilityRequest {
                product_id,
                quantity,
            })
            .collect();
        for line in self.ledger.check_availability(&requests).await? {
            if !line.sufficient {
                issues.push(CartIssue {
                    product_id: line.product_id,
                    reason: CartIssueReason::InsufficientStock {
                        requested: line.requested,
                        available: line.available,
                    },
                });
            }
        }

        if issues.is_empty() {
            Ok(items)
        } else {
            tracing::debug!(issues = issues.len(), "Cart rejected");
            Err(CheckoutError::CartInvalid { issues })
        }
    }

    async fn check_line(&self, line: &CartLine) -> Result<LineCheck, CheckoutError> {
        if line.quantity == 0 {
            return Ok(LineCheck::Invalid(CartIssueReason::InvalidQuantity));
        }

        let Some(product) = self.catalog.product(&line.product_id).await? else {
            return Ok(LineCheck::Invalid(CartIssueReason::ProductNotFound));
        };
        if product.status != ProductStatus::Active {
            return Ok(LineCheck::Invalid(CartIssueReason::ProductInactive));
        }
        if product.store_id != line.store_id {
            return Ok(LineCheck::Invalid(CartIssueReason::StoreMismatch {
                expected: product.store_id,
            }));
        }
        if product.price != line.unit_price {
            return Ok(LineCheck::Invalid(CartIssueReason::PriceChanged {
                current: product.price,
            }));
        }
        if product.price.checked_times(line.quantity).is_none() {
            return Ok(LineCheck::Invalid(CartIssueReason::QuantityTooLarge));
        }

        match self.catalog.store(&product.store_id).await? {
            None => Ok(LineCheck::Invalid(CartIssueReason::StoreNotFound)),
            Some(store) if store.status != StoreStatus::Active => {
                Ok(LineCheck::Invalid(CartIssueReason::StoreInactive))
            }
            Some(_) => Ok(LineCheck::Valid(product)),
        }
    }

    /// One order per store, in store id order. Ids and numbers are fixed here
    /// so a retried transaction writes the same orders.
    fn build_orders(
        &self,
        request: &CheckoutRequest,
        items: Vec<(StoreId, OrderItem)>,
    ) -> Result<Vec<Order>, CheckoutError> {
        let mut by_store: BTreeMap<StoreId, Vec<OrderItem>> = BTreeMap::new();
        for (store_id, item) in items {
            by_store.entry(store_id).or_default().push(item);
        }

        let now = Utc::now();
        let mut orders = Vec::with_capacity(by_store.len());
        for (store_id, items) in by_store {
            let Some(pricing) = self.pricing.price(&items) else {
                let issues = items
                    .into_iter()
                    .map(|item| CartIssue {
                        product_id: item.product_id,
                        reason: CartIssueReason::QuantityTooLarge,
                    })
                    .collect();
                return Err(CheckoutError::CartInvalid { issues });
            };

            orders.push(Order {
                id: OrderId::new(),
                order_number: generate_order_number(now),
                user_id: request.user_id,
                store_id,
                items,
                pricing,
                status: OrderStatus::Created,
                shipping_address: request.shipping_address.clone(),
                billing_address: request.billing_address.clone(),
                created_at: now,
                updated_at: now,
            });
        }
        Ok(orders)
    }
}

enum LineCheck {
    Valid(ProductSnapshot),
    Invalid(CartIssueReason),
}
