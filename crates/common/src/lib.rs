//! Shared vocabulary for the commerce engine.
//!
//! Every crate in the workspace speaks in these types: identifiers, money,
//! order statuses and the persisted records the engine reads and writes.

pub mod ids;
pub mod model;
pub mod money;
pub mod status;

pub use ids::{OrderId, ProductId, StoreId, UserId};
pub use model::{
    Actor, Address, CartLine, InventoryRecord, Order, OrderItem, OrderStatusHistory, Pricing,
};
pub use money::Money;
pub use status::{ActorRole, OrderStatus, ParseStatusError};
