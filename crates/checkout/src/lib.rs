//! Checkout and payment orchestration.
//!
//! [`CheckoutOrchestrator`] turns a validated cart into one order per store,
//! reserving stock for every line in a single transaction. [`PaymentService`]
//! moves orders to PAID or REFUNDED through a configured [`PaymentProvider`].

pub mod error;
pub mod orchestrator;
pub mod payments;
pub mod services;

pub use error::{CartIssue, CartIssueReason, CheckoutError, PaymentError};
pub use orchestrator::{CheckoutOrchestrator, CheckoutRequest};
pub use payments::PaymentService;
pub use services::{
    CatalogService, InMemoryCatalog, InMemoryPaymentProvider, PaymentIntent, PaymentProvider,
    PaymentRegistry, PaymentRegistryBuilder, PaymentVerification, ProductSnapshot, ProductStatus,
    RefundReceipt, StoreSnapshot, StoreStatus,
};
