//! Order Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::{Result, SnazzError};

/// A secure cash-on-delivery order. `price` is the order TOTAL in the base
/// currency unit; it is never multiplied by `quantity`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: String,
    order_id: String,
    product_ordered: String,
    quantity: u32,
    price: Decimal,
    customer_name: String,
    customer_email: Option<String>,
    contact_no: String,
    customer_address: String,
    pincode: String,
    payment_status: OrderStatus,
    delivery_status: DeliveryStatus,
    tracking_number: Option<String>,
    courier_company_name: Option<String>,
    est_delivery: Option<NaiveDate>,
    ready_for_dispatch_date: Option<NaiveDate>,
    seller_id: Option<String>,
    source: String,
    cancellation_id: Option<String>,
    refund_amount: Option<Decimal>,
    is_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Payment side of the lifecycle. Transitions are one-directional:
/// `Pending → Authorized → Paid → Fee Charged → Refunded`, with `Voided`
/// terminal out of `Authorized`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Authorized,
    Paid,
    #[serde(rename = "Fee Charged")]
    FeeCharged,
    Refunded,
    Voided,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Authorized => "Authorized",
            Self::Paid => "Paid",
            Self::FeeCharged => "Fee Charged",
            Self::Refunded => "Refunded",
            Self::Voided => "Voided",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Packed,
    Dispatched,
    OutForDelivery,
    Delivered,
    Failed,
    Rto,
}

/// Commercial and customer fields shared by lead intake, seller order
/// creation and checkout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub product_ordered: String,
    pub quantity: u32,
    pub price: Decimal,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub contact_no: String,
    pub customer_address: String,
    pub pincode: String,
    pub seller_id: Option<String>,
    pub source: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentUpdate {
    pub delivery_status: Option<DeliveryStatus>,
    pub tracking_number: Option<String>,
    pub courier_company_name: Option<String>,
    pub est_delivery: Option<NaiveDate>,
    pub ready_for_dispatch_date: Option<NaiveDate>,
}

impl Order {
    pub fn create(draft: OrderDraft) -> Self {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let mut order = Self {
            id: id.clone(),
            order_id: format!("ORD-{:08}", rand::random::<u32>() % 100_000_000),
            product_ordered: draft.product_ordered,
            quantity: draft.quantity,
            price: draft.price,
            customer_name: draft.customer_name,
            customer_email: draft.customer_email,
            contact_no: draft.contact_no,
            customer_address: draft.customer_address,
            pincode: draft.pincode,
            payment_status: OrderStatus::Pending,
            delivery_status: DeliveryStatus::Pending,
            tracking_number: None,
            courier_company_name: None,
            est_delivery: None,
            ready_for_dispatch_date: None,
            seller_id: draft.seller_id,
            source: draft.source.clone(),
            cancellation_id: None,
            refund_amount: None,
            is_read: false,
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: id, source: draft.source }));
        order
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn order_id(&self) -> &str { &self.order_id }
    pub fn product_ordered(&self) -> &str { &self.product_ordered }
    pub fn quantity(&self) -> u32 { self.quantity }
    pub fn price(&self) -> Decimal { self.price }
    pub fn customer_name(&self) -> &str { &self.customer_name }
    pub fn customer_email(&self) -> Option<&str> { self.customer_email.as_deref() }
    pub fn contact_no(&self) -> &str { &self.contact_no }
    pub fn payment_status(&self) -> OrderStatus { self.payment_status }
    pub fn delivery_status(&self) -> DeliveryStatus { self.delivery_status }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn courier_company_name(&self) -> Option<&str> { self.courier_company_name.as_deref() }
    pub fn est_delivery(&self) -> Option<NaiveDate> { self.est_delivery }
    pub fn seller_id(&self) -> Option<&str> { self.seller_id.as_deref() }
    pub fn cancellation_id(&self) -> Option<&str> { self.cancellation_id.as_deref() }
    pub fn refund_amount(&self) -> Option<Decimal> { self.refund_amount }
    pub fn is_read(&self) -> bool { self.is_read }

    /// `Pending → Authorized`. Records the cancellation token handed to the
    /// customer alongside the gateway order reference.
    pub fn authorize(&mut self, gateway_order_id: &str, cancellation_token: String) -> Result<()> {
        if self.payment_status != OrderStatus::Pending {
            return Err(self.bad_transition(OrderStatus::Authorized));
        }
        self.payment_status = OrderStatus::Authorized;
        self.cancellation_id = Some(cancellation_token);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Authorized {
            order_id: self.id.clone(),
            gateway_order_id: gateway_order_id.to_string(),
            amount: self.price,
        }));
        Ok(())
    }

    /// `Authorized → Paid`. A second capture attempt is an error, never a
    /// silent double-charge.
    pub fn capture(&mut self) -> Result<()> {
        match self.payment_status {
            OrderStatus::Paid => return Err(SnazzError::AlreadyCaptured(self.id.clone())),
            OrderStatus::Authorized => {}
            _ => return Err(self.bad_transition(OrderStatus::Paid)),
        }
        self.payment_status = OrderStatus::Paid;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Captured { order_id: self.id.clone(), amount: self.price }));
        Ok(())
    }

    /// Exact, case-sensitive match against the stored token.
    pub fn verify_cancellation_token(&self, supplied: &str) -> Result<()> {
        match self.cancellation_id.as_deref() {
            Some(stored) if stored == supplied => Ok(()),
            _ => Err(SnazzError::InvalidCancellationToken),
        }
    }

    /// `Authorized → Voided`. `refunded` is the released hold amount (zero
    /// when the authorization never completed and the void is local).
    pub fn void(&mut self, refunded: Decimal) -> Result<()> {
        if self.payment_status != OrderStatus::Authorized {
            return Err(self.bad_transition(OrderStatus::Voided));
        }
        self.payment_status = OrderStatus::Voided;
        self.refund_amount = Some(refunded);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Voided { order_id: self.id.clone(), refunded }));
        Ok(())
    }

    /// `Paid → Fee Charged`.
    pub fn charge_fee(&mut self, fee: Decimal) -> Result<()> {
        if self.payment_status != OrderStatus::Paid {
            return Err(self.bad_transition(OrderStatus::FeeCharged));
        }
        self.payment_status = OrderStatus::FeeCharged;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::FeeCharged { order_id: self.id.clone(), fee }));
        Ok(())
    }

    /// `Fee Charged → Refunded`.
    pub fn complete_refund(&mut self, amount: Decimal) -> Result<()> {
        if self.payment_status != OrderStatus::FeeCharged {
            return Err(self.bad_transition(OrderStatus::Refunded));
        }
        self.payment_status = OrderStatus::Refunded;
        self.refund_amount = Some(amount);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Refunded { order_id: self.id.clone(), amount }));
        Ok(())
    }

    pub fn update_fulfillment(&mut self, update: FulfillmentUpdate) {
        if let Some(status) = update.delivery_status {
            self.delivery_status = status;
            if status == DeliveryStatus::Dispatched {
                self.raise_event(DomainEvent::Order(OrderEvent::Dispatched {
                    order_id: self.id.clone(),
                    tracking: update.tracking_number.clone().or_else(|| self.tracking_number.clone()),
                }));
            }
        }
        if update.tracking_number.is_some() { self.tracking_number = update.tracking_number; }
        if update.courier_company_name.is_some() { self.courier_company_name = update.courier_company_name; }
        if update.est_delivery.is_some() { self.est_delivery = update.est_delivery; }
        if update.ready_for_dispatch_date.is_some() { self.ready_for_dispatch_date = update.ready_for_dispatch_date; }
        self.touch();
    }

    pub fn set_read(&mut self, read: bool) { self.is_read = read; self.touch(); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }

    fn bad_transition(&self, to: OrderStatus) -> SnazzError {
        SnazzError::InvalidTransition {
            kind: "order",
            from: self.payment_status.to_string(),
            to: to.to_string(),
        }
    }
}
