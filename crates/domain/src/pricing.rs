use common::{Money, OrderItem, Pricing};
use serde::{Deserialize, Serialize};

/// Tax and shipping rules applied to each store's share of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Tax rate in basis points; 1000 is 10%.
    pub tax_rate_bps: u32,
    /// Subtotals at or above this ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1_000,
            free_shipping_threshold: Money::from_cents(5_000),
            flat_shipping_fee: Money::from_cents(599),
        }
    }
}

impl PricingPolicy {
    /// Prices one store's items. `None` when an amount overflows cents.
    pub fn price(&self, items: &[OrderItem]) -> Option<Pricing> {
        let subtotal = items.iter().try_fold(Money::ZERO, |total, item| {
            total.checked_add(item.line_total()?)
        })?;
        let tax = subtotal.apply_rate_bps(self.tax_rate_bps);
        let shipping_fee = if subtotal >= self.free_shipping_threshold {
            Money::ZERO
        } else {
            self.flat_shipping_fee
        };

        Some(Pricing {
            subtotal,
            tax,
            shipping_fee,
            total_amount: subtotal.checked_add(tax)?.checked_add(shipping_fee)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;

    fn item(unit_cents: i64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id: ProductId::new("SKU-1"),
            title: "Widget".into(),
            sku: "W-1".into(),
            unit_price: Money::from_cents(unit_cents),
            quantity,
        }
    }

    #[test]
    fn sixty_dollars_ships_free() {
        let pricing = PricingPolicy::default().price(&[item(3_000, 2)]).unwrap();

        assert_eq!(pricing.subtotal, Money::from_cents(6_000));
        assert_eq!(pricing.tax, Money::from_cents(600));
        assert_eq!(pricing.shipping_fee, Money::ZERO);
        assert_eq!(pricing.total_amount, Money::from_cents(6_600));
    }

    #[test]
    fn forty_dollars_pays_flat_shipping() {
        let pricing = PricingPolicy::default()
            .price(&[item(1_000, 3), item(1_000, 1)])
            .unwrap();

        assert_eq!(pricing.subtotal, Money::from_cents(4_000));
        assert_eq!(pricing.tax, Money::from_cents(400));
        assert_eq!(pricing.shipping_fee, Money::from_cents(599));
        assert_eq!(pricing.total_amount, Money::from_cents(4_999));
    }

    #[test]
    fn threshold_is_inclusive_and_tax_rounds_half_up() {
        let policy = PricingPolicy::default();

        assert_eq!(policy.price(&[item(5_000, 1)]).unwrap().shipping_fee, Money::ZERO);
        // 10% of 12.35 is 1.235
        assert_eq!(policy.price(&[item(1_235, 1)]).unwrap().tax, Money::from_cents(124));
    }

    #[test]
    fn overflowing_subtotal_has_no_price() {
        let policy = PricingPolicy::default();

        assert_eq!(policy.price(&[item(i64::MAX / 2, 3)]), None);
        assert_eq!(
            policy.price(&[item(i64::MAX / 2, 1), item(i64::MAX / 2, 1)]),
            None
        );
    }
}
