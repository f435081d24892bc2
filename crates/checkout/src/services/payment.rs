//! Payment provider trait, registry and in-memory provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, Order, OrderId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::PaymentError;

/// A payment started with a provider, to be completed by the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub provider: String,
    pub reference: String,
    pub order_id: OrderId,
    pub amount: Money,
}

/// The provider's view of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub reference: String,
    pub order_id: OrderId,
    pub amount: Money,
    pub paid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub reference: String,
    pub refund_id: String,
    pub amount: Money,
}

/// A payment gateway.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Name the provider is registered and configured under.
    fn name(&self) -> &str;

    async fn initiate(&self, order: &Order) -> Result<PaymentIntent, PaymentError>;

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError>;

    async fn refund(&self, reference: &str, amount: Money) -> Result<RefundReceipt, PaymentError>;
}

/// Collects provider implementations and the names enabled by configuration.
#[derive(Default)]
pub struct PaymentRegistryBuilder {
    available: HashMap<String, Arc<dyn PaymentProvider>>,
    enabled: Vec<String>,
}

impl PaymentRegistryBuilder {
    pub fn register(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.available.insert(provider.name().to_string(), provider);
        self
    }

    pub fn enable(mut self, name: impl Into<String>) -> Self {
        self.enabled.push(name.into());
        self
    }

    pub fn enable_all<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.enabled.extend(names.into_iter().map(Into::into));
        self
    }

    /// Fails on the first enabled name with no registered implementation.
    pub fn build(mut self) -> Result<PaymentRegistry, PaymentError> {
        let mut providers = HashMap::new();
        for name in self.enabled {
            let provider = self
                .available
                .remove(&name)
                .or_else(|| providers.get(&name).cloned())
                .ok_or_else(|| PaymentError::UnknownProvider(name.clone()))?;
            providers.insert(name, provider);
        }
        Ok(PaymentRegistry { providers })
    }
}

/// The payment providers enabled for this deployment.
#[derive(Clone, Default)]
pub struct PaymentRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
}

impl PaymentRegistry {
    pub fn builder() -> PaymentRegistryBuilder {
        PaymentRegistryBuilder::default()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| PaymentError::ProviderNotConfigured(name.to_string()))
    }

    /// Enabled provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChargeStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug)]
struct Charge {
    order_id: OrderId,
    amount: Money,
    status: ChargeStatus,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<String, Charge>,
    next_id: u32,
    decline: bool,
    manual_capture: bool,
}

/// In-memory payment provider for tests and local runs.
///
/// Charges are captured as soon as they are initiated unless manual capture
/// is switched on, in which case [`capture`](Self::capture) completes them.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentProvider {
    name: String,
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    pub async fn set_decline(&self, decline: bool) {
        self.state.write().await.decline = decline;
    }

    pub async fn set_manual_capture(&self, manual: bool) {
        self.state.write().await.manual_capture = manual;
    }

    /// Marks a pending charge as paid. Returns false for unknown references.
    pub async fn capture(&self, reference: &str) -> bool {
        match self.state.write().await.charges.get_mut(reference) {
            Some(charge) if charge.status == ChargeStatus::Pending => {
                charge.status = ChargeStatus::Paid;
                true
            }
            _ => false,
        }
    }

    pub async fn charge_count(&self) -> usize {
        self.state.read().await.charges.len()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initiate(&self, order: &Order) -> Result<PaymentIntent, PaymentError> {
        let mut state = self.state.write().await;
        if state.decline {
            return Err(PaymentError::Declined(format!(
                "{} declined order {}",
                self.name, order.order_number
            )));
        }

        state.next_id += 1;
        let reference = format!("{}-{:06}", self.name.to_uppercase(), state.next_id);
        let status = if state.manual_capture {
            ChargeStatus::Pending
        } else {
            ChargeStatus::Paid
        };
        state.charges.insert(
            reference.clone(),
            Charge {
                order_id: order.id,
                amount: order.pricing.total_amount,
                status,
            },
        );

        Ok(PaymentIntent {
            provider: self.name.clone(),
            reference,
            order_id: order.id,
            amount: order.pricing.total_amount,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, PaymentError> {
        let state = self.state.read().await;
        let charge = state
            .charges
            .get(reference)
            .ok_or_else(|| PaymentError::Provider(format!("unknown reference {reference}")))?;

        Ok(PaymentVerification {
            reference: reference.to_string(),
            order_id: charge.order_id,
            amount: charge.amount,
            paid: charge.status == ChargeStatus::Paid,
        })
    }

    async fn refund(&self, reference: &str, amount: Money) -> Result<RefundReceipt, PaymentError> {
        let mut state = self.state.write().await;
        let charge = state
            .charges
            .get_mut(reference)
            .ok_or_else(|| PaymentError::Provider(format!("unknown reference {reference}")))?;

        if charge.status != ChargeStatus::Paid || amount > charge.amount {
            return Err(PaymentError::Declined(format!(
                "cannot refund {amount} on {reference}"
            )));
        }
        charge.status = ChargeStatus::Refunded;

        Ok(RefundReceipt {
            reference: reference.to_string(),
            refund_id: format!("RF-{reference}"),
            amount,
        })
    }
}
