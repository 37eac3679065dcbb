//! Domain events
use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub enum DomainEvent {
    Order(OrderEvent),
    Lead(LeadEvent),
    Card(CardEvent),
}

#[derive(Clone, Debug)]
pub enum OrderEvent {
    Created { order_id: String, source: String },
    Authorized { order_id: String, gateway_order_id: String, amount: Decimal },
    Captured { order_id: String, amount: Decimal },
    Dispatched { order_id: String, tracking: Option<String> },
    Voided { order_id: String, refunded: Decimal },
    FeeCharged { order_id: String, fee: Decimal },
    Refunded { order_id: String, amount: Decimal },
}

#[derive(Clone, Debug)]
pub enum LeadEvent {
    Created { lead_id: String, source: String },
    IntentVerified { lead_id: String },
    PushedToSeller { lead_id: String },
    Converted { lead_id: String, order_id: String },
    Cancelled { lead_id: String },
}

#[derive(Clone, Debug)]
pub enum CardEvent {
    Issued { card_number: String, customer_phone: String },
}
