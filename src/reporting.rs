//! Commission and order-book read-models
//!
//! Pure functions over snapshots of the persisted collections. No hidden
//! state: `f(orders) -> stats`, recomputed on every call.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use crate::domain::aggregates::{Lead, LeadStatus, Order, OrderStatus};

/// Per-principal commission percentages: an admin default with optional
/// vendor/seller overrides.
#[derive(Clone, Debug)]
pub struct CommissionPolicy {
    default_rate: Decimal,
    overrides: HashMap<String, Decimal>,
}

impl CommissionPolicy {
    pub fn new(default_rate: Decimal) -> Self {
        Self { default_rate, overrides: HashMap::new() }
    }

    pub fn with_override(mut self, seller_id: impl Into<String>, rate: Decimal) -> Self {
        self.overrides.insert(seller_id.into(), rate);
        self
    }

    pub fn rate_for(&self, seller_id: &str) -> Decimal {
        self.overrides.get(seller_id).copied().unwrap_or(self.default_rate)
    }
}

/// Orders whose charge succeeded: fully captured, or captured for a fee.
fn is_charged(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Paid | OrderStatus::FeeCharged)
}

/// Commission = `price × rate%`, counted only for charged orders with a
/// seller attached, rounded half-up to two places per order.
pub fn commission_by_seller(orders: &[Order], policy: &CommissionPolicy) -> HashMap<String, Decimal> {
    let mut totals: HashMap<String, Decimal> = HashMap::new();
    for order in orders {
        let Some(seller) = order.seller_id() else { continue };
        if !is_charged(order.payment_status()) {
            continue;
        }
        let commission = (order.price() * policy.rate_for(seller) / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        *totals.entry(seller.to_string()).or_insert(Decimal::ZERO) += commission;
    }
    totals
}

pub fn total_commission(orders: &[Order], policy: &CommissionPolicy) -> Decimal {
    commission_by_seller(orders, policy).values().sum()
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookStats {
    /// Leads still in play (anything not yet converted).
    pub active_leads: usize,
    /// Funds held but not captured: the customer-facing "Trust Wallet".
    pub total_secured_value: Decimal,
    /// Sum over captured orders, full or fee-retained.
    pub successful_charges: Decimal,
    /// Sum over refunded and voided orders.
    pub refunded_value: Decimal,
}

pub fn order_book_stats(orders: &[Order], leads: &[Lead]) -> OrderBookStats {
    let mut stats = OrderBookStats {
        active_leads: leads.iter().filter(|l| l.status() != LeadStatus::Converted).count(),
        total_secured_value: Decimal::ZERO,
        successful_charges: Decimal::ZERO,
        refunded_value: Decimal::ZERO,
    };
    for order in orders {
        match order.payment_status() {
            OrderStatus::Authorized => stats.total_secured_value += order.price(),
            OrderStatus::Paid | OrderStatus::FeeCharged => stats.successful_charges += order.price(),
            OrderStatus::Refunded | OrderStatus::Voided => stats.refunded_value += order.price(),
            OrderStatus::Pending => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderDraft;

    fn draft(price: &str, seller_id: Option<&str>) -> OrderDraft {
        OrderDraft {
            product_ordered: "Silk Saree".into(),
            quantity: 1,
            price: price.parse().unwrap(),
            customer_name: "Asha Rao".into(),
            customer_email: None,
            contact_no: "9876543210".into(),
            customer_address: "12 MG Road, Pune".into(),
            pincode: "411001".into(),
            seller_id: seller_id.map(str::to_string),
            source: "Seller".into(),
        }
    }

    fn paid(price: &str, seller_id: Option<&str>) -> Order {
        let mut order = Order::create(draft(price, seller_id));
        order.authorize("gw_1", "CNL-1".into()).unwrap();
        order.capture().unwrap();
        order
    }

    fn authorized(price: &str) -> Order {
        let mut order = Order::create(draft(price, None));
        order.authorize("gw_1", "CNL-1".into()).unwrap();
        order
    }

    #[test]
    fn test_commission_counts_only_charged_seller_orders() {
        // One paid order and one that never got past intake: only the paid
        // one earns commission.
        let orders = vec![paid("1000", Some("S1")), Order::create(draft("500", Some("S1")))];
        let policy = CommissionPolicy::new(Decimal::new(5, 0));
        let totals = commission_by_seller(&orders, &policy);
        assert_eq!(totals.get("S1"), Some(&Decimal::new(5000, 2))); // 50.00
        assert_eq!(total_commission(&orders, &policy), Decimal::new(5000, 2));
    }

    #[test]
    fn test_commission_respects_seller_override() {
        let orders = vec![paid("1000", Some("S1")), paid("1000", Some("S2"))];
        let policy = CommissionPolicy::new(Decimal::new(5, 0)).with_override("S2", Decimal::new(75, 1));
        let totals = commission_by_seller(&orders, &policy);
        assert_eq!(totals.get("S1"), Some(&Decimal::new(5000, 2))); // 5%
        assert_eq!(totals.get("S2"), Some(&Decimal::new(7500, 2))); // 7.5%
    }

    #[test]
    fn test_commission_skips_orders_without_seller() {
        let orders = vec![paid("1000", None)];
        let policy = CommissionPolicy::new(Decimal::new(5, 0));
        assert!(commission_by_seller(&orders, &policy).is_empty());
    }

    #[test]
    fn test_order_book_stats() {
        let mut voided = authorized("200");
        voided.verify_cancellation_token("CNL-1").unwrap();
        voided.void(Decimal::new(200, 0)).unwrap();

        let orders = vec![authorized("300"), paid("1000", Some("S1")), voided];

        let mut converted = Lead::create(draft("50", None));
        converted.convert("order-x").unwrap();
        let leads = vec![Lead::create(draft("50", None)), converted];

        let stats = order_book_stats(&orders, &leads);
        assert_eq!(stats.active_leads, 1);
        assert_eq!(stats.total_secured_value, Decimal::new(300, 0));
        assert_eq!(stats.successful_charges, Decimal::new(1000, 0));
        assert_eq!(stats.refunded_value, Decimal::new(200, 0));
    }
}
