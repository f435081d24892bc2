//! Payment flow: start a payment, confirm it into PAID, refund into REFUNDED.

use common::{Actor, Order, OrderId, OrderStatus};
use domain::{OrderError, OrderStateMachine};
use store::Store;

use crate::error::PaymentError;
use crate::services::payment::{PaymentIntent, PaymentRegistry};

pub struct PaymentService<S> {
    registry: PaymentRegistry,
    orders: OrderStateMachine<S>,
}

impl<S: Store> PaymentService<S> {
    pub fn new(registry: PaymentRegistry, orders: OrderStateMachine<S>) -> Self {
        Self { registry, orders }
    }

    pub fn registry(&self) -> &PaymentRegistry {
        &self.registry
    }

    /// Starts a payment for an unpaid order.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        order_id: OrderId,
        provider: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let provider = self.registry.resolve(provider)?;
        let order = self.orders.get_order(order_id).await?;
        ensure_can_move(&order, OrderStatus::Paid)?;

        let intent = provider.initiate(&order).await?;
        tracing::info!(reference = %intent.reference, amount = %intent.amount, "Payment initiated");
        Ok(intent)
    }

    /// Verifies a payment with its provider and marks the order PAID, which
    /// confirms its reserved stock.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn confirm_payment(
        &self,
        order_id: OrderId,
        provider: &str,
        reference: &str,
        actor: &Actor,
    ) -> Result<Order, PaymentError> {
        let provider = self.registry.resolve(provider)?;
        let order = self.orders.get_order(order_id).await?;
        ensure_can_move(&order, OrderStatus::Paid)?;

        let verification = provider.verify(reference).await?;
        if !verification.paid
            || verification.order_id != order_id
            || verification.amount != order.pricing.total_amount
        {
            tracing::warn!(
                paid = verification.paid,
                amount = %verification.amount,
                expected = %order.pricing.total_amount,
                "Payment verification failed"
            );
            return Err(PaymentError::VerificationFailed {
                order_id,
                reference: reference.to_string(),
            });
        }

        let note = format!("{} payment {reference}", provider.name());
        let order = self
            .orders
            .transition(order_id, OrderStatus::Paid, actor, Some(note))
            .await?;
        metrics::counter!("payments_confirmed_total", "provider" => provider.name().to_string())
            .increment(1);
        Ok(order)
    }

    /// Refunds the full order amount and marks the order REFUNDED.
    ///
    /// The reference must be a paid charge for this very order. If the
    /// provider refunds but the order cannot be moved afterwards, the
    /// receipt comes back in [`PaymentError::RefundNotRecorded`].
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn refund_payment(
        &self,
        order_id: OrderId,
        provider: &str,
        reference: &str,
        actor: &Actor,
    ) -> Result<Order, PaymentError> {
        let provider = self.registry.resolve(provider)?;
        let order = self.orders.get_order(order_id).await?;
        ensure_can_move(&order, OrderStatus::Refunded)?;

        let verification = provider.verify(reference).await?;
        if !verification.paid || verification.order_id != order_id {
            tracing::warn!(
                paid = verification.paid,
                charge_order_id = %verification.order_id,
                "Refund reference is not a paid charge for this order"
            );
            return Err(PaymentError::VerificationFailed {
                order_id,
                reference: reference.to_string(),
            });
        }

        let receipt = provider
            .refund(reference, order.pricing.total_amount)
            .await?;
        tracing::info!(refund_id = %receipt.refund_id, amount = %receipt.amount, "Payment refunded");

        let note = format!("{} refund {}", provider.name(), receipt.refund_id);
        match self
            .orders
            .transition(order_id, OrderStatus::Refunded, actor, Some(note))
            .await
        {
            Ok(order) => {
                metrics::counter!("payments_refunded_total", "provider" => provider.name().to_string())
                    .increment(1);
                Ok(order)
            }
            Err(source) => {
                tracing::error!(
                    refund_id = %receipt.refund_id,
                    amount = %receipt.amount,
                    error = %source,
                    "Refund issued but order status not updated"
                );
                metrics::counter!("payment_refunds_unrecorded_total", "provider" => provider.name().to_string())
                    .increment(1);
                Err(PaymentError::RefundNotRecorded {
                    order_id,
                    receipt,
                    source,
                })
            }
        }
    }
}

/// Checked before talking to the provider so no money moves for an order
/// that could not take the transition anyway.
fn ensure_can_move(order: &Order, to: OrderStatus) -> Result<(), PaymentError> {
    if order.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(domain::DomainError::from(OrderError::InvalidTransition {
            from: order.status,
            to,
        })
        .into())
    }
}
