//! Domain error types.

use common::{OrderId, OrderStatus, ProductId};
use store::{Retryable, StoreError};
use thiserror::Error;

/// Outcomes of inventory operations that leave the record untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Only {available} items available for product {product_id}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error(
        "Cannot {operation} {quantity} units of product {product_id} \
         (available {available}, reserved {reserved})"
    )]
    InvalidState {
        product_id: ProductId,
        operation: &'static str,
        quantity: u32,
        available: u32,
        reserved: u32,
    },

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("No inventory record for product {0}")]
    NotFound(ProductId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order in status {status} cannot be cancelled")]
    NotCancellable { status: OrderStatus },

    #[error("Order not found: {0}")]
    NotFound(OrderId),
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub const GENERIC_RETRY_MESSAGE: &str = "Something went wrong, please retry";

impl DomainError {
    /// Whether this is an expected business outcome rather than a failure of
    /// the system.
    pub fn is_business(&self) -> bool {
        matches!(self, DomainError::Ledger(_) | DomainError::Order(_))
    }

    /// Message safe to show to a caller. Storage internals are never exposed.
    pub fn public_message(&self) -> String {
        if self.is_business() {
            self.to_string()
        } else {
            GENERIC_RETRY_MESSAGE.to_string()
        }
    }
}

impl Retryable for DomainError {
    fn is_transient(&self) -> bool {
        match self {
            DomainError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_is_actionable() {
        let err = DomainError::from(LedgerError::InsufficientStock {
            product_id: ProductId::new("SKU-1"),
            requested: 5,
            available: 3,
        });

        assert!(err.is_business());
        assert_eq!(err.public_message(), "Only 3 items available for product SKU-1");
    }

    #[test]
    fn storage_failures_are_hidden_and_retryable_only_when_transient() {
        let conflict = DomainError::from(StoreError::Conflict {
            entity: "inventory",
            id: "SKU-1".into(),
        });
        assert!(conflict.is_transient());
        assert!(!conflict.is_business());
        assert_eq!(conflict.public_message(), GENERIC_RETRY_MESSAGE);

        let invalid = DomainError::from(StoreError::InvalidRecord("bad row".into()));
        assert!(!invalid.is_transient());
        assert_eq!(invalid.public_message(), GENERIC_RETRY_MESSAGE);
    }

    #[test]
    fn invalid_transition_names_both_statuses() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Created,
            to: OrderStatus::Shipped,
        };
        assert_eq!(err.to_string(), "Cannot move order from CREATED to SHIPPED");
    }
}
