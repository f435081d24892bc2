//! Collaborator traits and in-memory implementations.

pub mod catalog;
pub mod payment;

pub use catalog::{
    CatalogService, InMemoryCatalog, ProductSnapshot, ProductStatus, StoreSnapshot, StoreStatus,
};
pub use payment::{
    InMemoryPaymentProvider, PaymentIntent, PaymentProvider, PaymentRegistry,
    PaymentRegistryBuilder, PaymentVerification, RefundReceipt,
};
