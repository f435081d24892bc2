//! Checkout and payment error types.

use common::{Money, OrderId, ProductId, StoreId};
use domain::{DomainError, GENERIC_RETRY_MESSAGE};
use serde::{Deserialize, Serialize};
use store::{Retryable, StoreError};
use thiserror::Error;

use crate::services::payment::RefundReceipt;

/// Why a cart line cannot be checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CartIssueReason {
    InvalidQuantity,
    QuantityTooLarge,
    ProductNotFound,
    ProductInactive,
    StoreNotFound,
    StoreInactive,
    StoreMismatch { expected: StoreId },
    PriceChanged { current: Money },
    InsufficientStock { requested: u32, available: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartIssue {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub reason: CartIssueReason,
}

impl std::fmt::Display for CartIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let product = &self.product_id;
        match &self.reason {
            CartIssueReason::InvalidQuantity => {
                write!(f, "Quantity for product {product} must be greater than zero")
            }
            CartIssueReason::QuantityTooLarge => {
                write!(f, "Quantity for product {product} is too large")
            }
            CartIssueReason::ProductNotFound => write!(f, "Product {product} does not exist"),
            CartIssueReason::ProductInactive => {
                write!(f, "Product {product} is no longer available")
            }
            CartIssueReason::StoreNotFound => {
                write!(f, "The store selling product {product} does not exist")
            }
            CartIssueReason::StoreInactive => {
                write!(f, "The store selling product {product} is not accepting orders")
            }
            CartIssueReason::StoreMismatch { expected } => {
                write!(f, "Product {product} is sold by store {expected}")
            }
            CartIssueReason::PriceChanged { current } => {
                write!(f, "Price of product {product} changed to {current}")
            }
            CartIssueReason::InsufficientStock { available, .. } => {
                write!(f, "Only {available} items available for product {product}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart has {} invalid item(s)", .issues.len())]
    CartInvalid { issues: Vec<CartIssue> },

    #[error("Catalog unavailable: {0}")]
    Catalog(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    pub fn is_business(&self) -> bool {
        match self {
            CheckoutError::EmptyCart | CheckoutError::CartInvalid { .. } => true,
            CheckoutError::Domain(e) => e.is_business(),
            CheckoutError::Catalog(_) | CheckoutError::Store(_) => false,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            CheckoutError::Domain(e) => e.public_message(),
            _ if self.is_business() => self.to_string(),
            _ => GENERIC_RETRY_MESSAGE.to_string(),
        }
    }
}

impl Retryable for CheckoutError {
    fn is_transient(&self) -> bool {
        match self {
            CheckoutError::Domain(e) => e.is_transient(),
            CheckoutError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    /// A configured provider name has no implementation.
    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("Payment provider not enabled: {0}")]
    ProviderNotConfigured(String),

    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment {reference} for order {order_id} could not be verified")]
    VerificationFailed { order_id: OrderId, reference: String },

    #[error("Payment provider unavailable: {0}")]
    Provider(String),

    /// Money went back to the buyer but the order kept its old status.
    #[error(
        "Refund {} was issued for order {order_id} but the order status was not updated",
        .receipt.refund_id
    )]
    RefundNotRecorded {
        order_id: OrderId,
        receipt: RefundReceipt,
        #[source]
        source: DomainError,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl PaymentError {
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Domain(e) => e.public_message(),
            PaymentError::Provider(_) => GENERIC_RETRY_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}
