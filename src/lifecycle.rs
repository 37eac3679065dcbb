//! Order Lifecycle Manager
//!
//! Owns every payment-status transition and all capture/refund arithmetic.
//! Handlers never compute money; they call into this component. Gateway
//! calls are issued once per explicit operator action and the stored status
//! is updated only after the gateway call succeeds, so a network failure
//! leaves the order in its prior state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::aggregates::{
    DeliveryStatus, FulfillmentUpdate, Lead, LeadStatus, Order, OrderDraft, OrderStatus, ShaktiCard,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, PhoneNumber};
use crate::services::{DocumentStore, NotificationSender, PaymentGateway, Recipient, TemplateType};
use crate::{Result, SnazzError};

const ORDERS: &str = "orders";
const LEADS: &str = "leads";
const PAYMENTS: &str = "payments";
const SHAKTI_CARDS: &str = "shakti_cards";

/// Gateway-side ledger for one order: the authorization hold, the payment
/// attached by the checkout webhook, and running captured/refunded totals in
/// minor units.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub order_id: String,
    pub gateway_order_id: String,
    pub payment_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub captured_minor: i64,
    pub refunded_minor: i64,
    pub capture_immediately: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a fee-based cancellation: what was retained and what went back
/// to the customer.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSettlement {
    pub order_id: String,
    pub captured: Decimal,
    pub refunded: Decimal,
}

pub struct OrderLifecycleManager {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSender>,
    currency: String,
    ops_contact: Option<Recipient>,
}

impl OrderLifecycleManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSender>,
        currency: impl Into<String>,
    ) -> Self {
        Self { store, gateway, notifier, currency: currency.into(), ops_contact: None }
    }

    /// Recipient for `internal_alert` notifications (partial-failure
    /// reconciliation).
    pub fn with_ops_contact(mut self, contact: Recipient) -> Self {
        self.ops_contact = Some(contact);
        self
    }

    // =========================================================================
    // Lead intake
    // =========================================================================

    #[instrument(skip(self, draft))]
    pub async fn create_lead(&self, draft: OrderDraft) -> Result<Lead> {
        self.validate_draft(&draft)?;
        let mut lead = Lead::create(draft);
        self.save_lead(&mut lead).await?;
        Ok(lead)
    }

    #[instrument(skip(self))]
    pub async fn verify_intent(&self, lead_id: &str) -> Result<Lead> {
        let mut lead = self.load_lead(lead_id).await?;
        lead.verify_intent()?;
        self.save_lead(&mut lead).await?;
        Ok(lead)
    }

    #[instrument(skip(self))]
    pub async fn push_to_seller(&self, lead_id: &str) -> Result<Lead> {
        let mut lead = self.load_lead(lead_id).await?;
        lead.push_to_seller()?;
        self.save_lead(&mut lead).await?;
        Ok(lead)
    }

    #[instrument(skip(self))]
    pub async fn cancel_lead(&self, lead_id: &str) -> Result<Lead> {
        let mut lead = self.load_lead(lead_id).await?;
        lead.cancel()?;
        self.save_lead(&mut lead).await?;
        Ok(lead)
    }

    /// Copies the lead into a new `Pending` order exactly once.
    #[instrument(skip(self))]
    pub async fn convert_lead(&self, lead_id: &str) -> Result<Order> {
        let mut lead = self.load_lead(lead_id).await?;
        let mut order = Order::create(lead.draft());
        lead.convert(order.id())?;
        self.save_order(&mut order).await?;
        self.save_lead(&mut lead).await?;
        Ok(order)
    }

    // =========================================================================
    // Order entry points
    // =========================================================================

    /// Seller-created order awaiting admin pickup (`Pending`, bypasses the
    /// lead funnel).
    #[instrument(skip(self, draft))]
    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order> {
        self.validate_draft(&draft)?;
        let mut order = Order::create(draft);
        self.save_order(&mut order).await?;
        Ok(order)
    }

    /// Checkout: creates a fresh order and its gateway authorization in one
    /// step, optionally consuming a lead. The lead's conversion guard runs
    /// before any gateway call so a stale checkout cannot double-charge.
    #[instrument(skip(self, draft))]
    pub async fn checkout_authorize(
        &self,
        draft: OrderDraft,
        lead_id: Option<&str>,
        capture_immediately: bool,
    ) -> Result<Order> {
        self.validate_draft(&draft)?;
        let mut lead = match lead_id {
            Some(id) => {
                let lead = self.load_lead(id).await?;
                if lead.status() == LeadStatus::Converted {
                    return Err(SnazzError::AlreadyConverted(id.to_string()));
                }
                Some(lead)
            }
            None => None,
        };
        let mut order = Order::create(draft);
        self.authorize_with_gateway(&mut order, capture_immediately).await?;
        self.save_order(&mut order).await?;
        if let Some(lead) = lead.as_mut() {
            lead.convert(order.id())?;
            self.save_lead(lead).await?;
        }
        Ok(order)
    }

    /// `Pending → Authorized` for an existing order.
    #[instrument(skip(self))]
    pub async fn authorize_order(&self, order_id: &str, capture_immediately: bool) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        if order.payment_status() != OrderStatus::Pending {
            return Err(SnazzError::InvalidTransition {
                kind: "order",
                from: order.payment_status().to_string(),
                to: OrderStatus::Authorized.to_string(),
            });
        }
        self.authorize_with_gateway(&mut order, capture_immediately).await?;
        self.save_order(&mut order).await?;
        Ok(order)
    }

    /// Attaches the gateway payment id once the customer completes checkout.
    /// Idempotent for a repeated webhook delivery of the same payment.
    #[instrument(skip(self))]
    pub async fn record_payment(&self, gateway_order_id: &str, payment_id: &str) -> Result<()> {
        for doc in self.store.get_collection(PAYMENTS).await? {
            let mut record: PaymentRecord = match serde_json::from_value(doc) {
                Ok(record) => record,
                Err(_) => continue,
            };
            if record.gateway_order_id != gateway_order_id {
                continue;
            }
            if record.payment_id.as_deref() == Some(payment_id) {
                return Ok(());
            }
            record.payment_id = Some(payment_id.to_string());
            record.updated_at = Utc::now();
            self.save_payment(&record).await?;
            return Ok(());
        }
        Err(SnazzError::NotFound { kind: "payment", id: gateway_order_id.to_string() })
    }

    // =========================================================================
    // Fulfillment and capture
    // =========================================================================

    /// Applies courier/tracking updates; a move to `dispatched` triggers the
    /// capture of the held amount.
    #[instrument(skip(self, update))]
    pub async fn update_fulfillment(&self, order_id: &str, update: FulfillmentUpdate) -> Result<Order> {
        if update.delivery_status == Some(DeliveryStatus::Dispatched) {
            return self.capture_on_dispatch(order_id, update).await;
        }
        let mut order = self.load_order(order_id).await?;
        order.update_fulfillment(update);
        self.save_order(&mut order).await?;
        Ok(order)
    }

    /// `Authorized → Paid`: captures the full held amount. The status guard
    /// runs before any gateway interaction, so a second capture attempt
    /// fails without touching the stored order or the gateway.
    #[instrument(skip(self, update))]
    pub async fn capture_on_dispatch(&self, order_id: &str, mut update: FulfillmentUpdate) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        match order.payment_status() {
            OrderStatus::Paid => return Err(SnazzError::AlreadyCaptured(order.id().to_string())),
            OrderStatus::Authorized => {}
            s => {
                return Err(SnazzError::InvalidTransition {
                    kind: "order",
                    from: s.to_string(),
                    to: OrderStatus::Paid.to_string(),
                })
            }
        }
        let mut payment = self
            .load_payment(order.id())
            .await?
            .ok_or_else(|| SnazzError::PaymentNotFound(order.id().to_string()))?;
        let payment_ref = payment
            .payment_id
            .clone()
            .ok_or_else(|| SnazzError::PaymentNotFound(order.id().to_string()))?;

        self.gateway.capture(&payment_ref, payment.amount_minor, &payment.currency).await?;
        payment.captured_minor = payment.amount_minor;
        payment.updated_at = Utc::now();

        if update.delivery_status.is_none() {
            update.delivery_status = Some(DeliveryStatus::Dispatched);
        }
        order.update_fulfillment(update);
        order.capture()?;
        self.save_payment(&payment).await?;
        self.save_order(&mut order).await?;

        self.notify(
            TemplateType::Dispatch,
            recipient_for(&order),
            json!({
                "orderId": order.order_id(),
                "courierCompanyName": order.courier_company_name(),
                "trackingNumber": order.tracking_number(),
                "estDelivery": order.est_delivery(),
            }),
        )
        .await;
        self.issue_card_if_first(&order).await?;
        Ok(order)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// `Authorized → Voided`, gated on the customer's cancellation token.
    /// Voiding is modeled as a 100% refund of the uncaptured hold; an order
    /// whose payment never completed is voided locally with no gateway call.
    #[instrument(skip(self, supplied_token))]
    pub async fn cancel_before_dispatch(&self, order_id: &str, supplied_token: &str) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        // A token mismatch must never reach the gateway.
        order.verify_cancellation_token(supplied_token)?;
        if order.payment_status() != OrderStatus::Authorized {
            return Err(SnazzError::InvalidTransition {
                kind: "order",
                from: order.payment_status().to_string(),
                to: OrderStatus::Voided.to_string(),
            });
        }

        let mut refunded = Decimal::ZERO;
        if let Some(mut payment) = self.load_payment(order.id()).await? {
            if let Some(payment_ref) = payment.payment_id.clone() {
                self.gateway
                    .refund(&payment_ref, payment.amount_minor, "order cancelled before dispatch")
                    .await?;
                payment.refunded_minor = payment.amount_minor;
                payment.updated_at = Utc::now();
                self.save_payment(&payment).await?;
                refunded = Money::from_minor_units(payment.amount_minor, &payment.currency).amount();
            }
        }
        order.void(refunded)?;
        self.save_order(&mut order).await?;

        self.notify(
            TemplateType::Cancellation,
            recipient_for(&order),
            json!({ "orderId": order.order_id(), "refundAmount": refunded }),
        )
        .await;
        Ok(order)
    }

    /// `Paid → Fee Charged → Refunded`: retains a service fee and refunds
    /// the remainder. Re-invoking on a `Fee Charged` order (after a partial
    /// failure) retries only the refund leg, so the fee is never captured
    /// twice.
    #[instrument(skip(self))]
    pub async fn cancel_with_fee(&self, order_id: &str, fee: Decimal) -> Result<FeeSettlement> {
        let mut order = self.load_order(order_id).await?;
        let total = self.money(order.price());
        let fee_money = self.money(fee);
        if !fee_money.is_positive() {
            return Err(SnazzError::InvalidAmount(format!("fee must be positive, got {fee}")));
        }
        if fee >= total.amount() {
            return Err(SnazzError::FeeExceedsTotal { fee, total: total.amount() });
        }
        let resume_refund_only = match order.payment_status() {
            OrderStatus::Paid => false,
            OrderStatus::FeeCharged => true,
            s => {
                return Err(SnazzError::InvalidTransition {
                    kind: "order",
                    from: s.to_string(),
                    to: OrderStatus::FeeCharged.to_string(),
                })
            }
        };
        let fee_minor = self.minor(&fee_money)?;
        let total_minor = self.minor(&total)?;
        let refund_minor = total_minor - fee_minor;

        let mut payment = self
            .load_payment(order.id())
            .await?
            .ok_or_else(|| SnazzError::PaymentNotFound(order.id().to_string()))?;
        let payment_ref = payment
            .payment_id
            .clone()
            .ok_or_else(|| SnazzError::PaymentNotFound(order.id().to_string()))?;

        if !resume_refund_only {
            self.gateway.capture(&payment_ref, fee_minor, &payment.currency).await?;
            order.charge_fee(fee_money.amount())?;
            // Persisted before the refund leg so a crash between the two
            // gateway calls still leaves a reconcilable `Fee Charged` order.
            self.save_order(&mut order).await?;
        }

        let refunded = Money::from_minor_units(refund_minor, &self.currency);
        if let Err(refund_err) = self
            .gateway
            .refund(&payment_ref, refund_minor, "order cancelled after capture, service fee retained")
            .await
        {
            if let Some(ops) = self.ops_contact.clone() {
                self.notify(
                    TemplateType::InternalAlert,
                    ops,
                    json!({
                        "orderId": order.id(),
                        "captured": fee_money.amount(),
                        "refund": refunded.amount(),
                        "reason": refund_err.to_string(),
                    }),
                )
                .await;
            }
            return Err(SnazzError::PartialFailure {
                order_id: order.id().to_string(),
                captured: fee_money.amount(),
                refund: refunded.amount(),
                reason: refund_err.to_string(),
            });
        }

        payment.refunded_minor += refund_minor;
        payment.updated_at = Utc::now();
        order.complete_refund(refunded.amount())?;
        self.save_payment(&payment).await?;
        self.save_order(&mut order).await?;

        self.notify(
            TemplateType::Refund,
            recipient_for(&order),
            json!({
                "orderId": order.order_id(),
                "feeAmount": fee_money.amount(),
                "refundAmount": refunded.amount(),
            }),
        )
        .await;
        Ok(FeeSettlement {
            order_id: order.id().to_string(),
            captured: fee_money.amount(),
            refunded: refunded.amount(),
        })
    }

    // =========================================================================
    // Reads and flags
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.load_order(order_id).await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(deserialize_collection(self.store.get_collection(ORDERS).await?, "order"))
    }

    pub async fn list_leads(&self) -> Result<Vec<Lead>> {
        Ok(deserialize_collection(self.store.get_collection(LEADS).await?, "lead"))
    }

    pub async fn mark_read(&self, order_id: &str, read: bool) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;
        order.set_read(read);
        self.save_order(&mut order).await?;
        Ok(order)
    }

    pub async fn unread_count(&self) -> Result<usize> {
        Ok(self.list_orders().await?.iter().filter(|o| !o.is_read()).count())
    }

    pub async fn find_card(&self, phone_raw: &str) -> Result<Option<ShaktiCard>> {
        let phone = PhoneNumber::canonicalize(phone_raw)
            .map_err(|e| SnazzError::Validation(e.to_string()))?;
        match self.store.get_document(SHAKTI_CARDS, phone.as_str()).await? {
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| SnazzError::Storage(format!("card {phone} is malformed: {e}"))),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn authorize_with_gateway(&self, order: &mut Order, capture_immediately: bool) -> Result<()> {
        let amount = self.money(order.price());
        let amount_minor = self.minor(&amount)?;
        if amount_minor <= 0 {
            return Err(SnazzError::InvalidAmount(format!(
                "order total must be positive, got {}",
                order.price()
            )));
        }
        let gateway_order = self
            .gateway
            .create_order(
                amount_minor,
                &self.currency,
                capture_immediately,
                json!({ "receipt": order.id(), "customer": order.customer_name() }),
            )
            .await?;
        let token = format!("CNL-{:010}", rand::random::<u32>());
        order.authorize(&gateway_order.gateway_order_id, token)?;
        let now = Utc::now();
        self.save_payment(&PaymentRecord {
            order_id: order.id().to_string(),
            gateway_order_id: gateway_order.gateway_order_id,
            payment_id: None,
            amount_minor,
            currency: self.currency.clone(),
            captured_minor: 0,
            refunded_minor: 0,
            capture_immediately,
            created_at: now,
            updated_at: now,
        })
        .await
    }

    /// Lookup-before-create keyed by canonical phone: two differently
    /// formatted numbers resolve to the same card.
    async fn issue_card_if_first(&self, order: &Order) -> Result<()> {
        let phone = match PhoneNumber::canonicalize(order.contact_no()) {
            Ok(phone) => phone,
            Err(e) => {
                warn!(order_id = order.id(), error = %e, "skipping card issuance, phone not canonical");
                return Ok(());
            }
        };
        if self.store.get_document(SHAKTI_CARDS, phone.as_str()).await?.is_some() {
            return Ok(());
        }
        let mut card = ShaktiCard::issue(&phone);
        let doc = serde_json::to_value(&card).map_err(|e| SnazzError::Storage(e.to_string()))?;
        self.store.save_document(SHAKTI_CARDS, doc, Some(phone.as_str())).await?;
        log_events(card.take_events());
        Ok(())
    }

    fn validate_draft(&self, draft: &OrderDraft) -> Result<()> {
        if draft.product_ordered.trim().is_empty() {
            return Err(SnazzError::Validation("productOrdered is required".into()));
        }
        if draft.customer_name.trim().is_empty() {
            return Err(SnazzError::Validation("customerName is required".into()));
        }
        if draft.quantity == 0 {
            return Err(SnazzError::Validation("quantity must be at least 1".into()));
        }
        PhoneNumber::canonicalize(&draft.contact_no).map_err(|e| SnazzError::Validation(e.to_string()))?;
        if !self.money(draft.price).is_positive() {
            return Err(SnazzError::InvalidAmount(format!(
                "order total must be positive, got {}",
                draft.price
            )));
        }
        Ok(())
    }

    fn money(&self, amount: Decimal) -> Money {
        Money::new(amount, &self.currency)
    }

    fn minor(&self, money: &Money) -> Result<i64> {
        money.minor_units().map_err(|e| SnazzError::InvalidAmount(e.to_string()))
    }

    async fn notify(&self, template: TemplateType, recipient: Recipient, context: Value) {
        if let Err(e) = self.notifier.send(template, &recipient, context).await {
            warn!(template = template.as_str(), error = %e, "notification send failed");
        }
    }

    async fn load_order(&self, id: &str) -> Result<Order> {
        let doc = self
            .store
            .get_document(ORDERS, id)
            .await?
            .ok_or_else(|| SnazzError::NotFound { kind: "order", id: id.to_string() })?;
        serde_json::from_value(doc).map_err(|e| SnazzError::Storage(format!("order {id} is malformed: {e}")))
    }

    async fn save_order(&self, order: &mut Order) -> Result<()> {
        let doc = serde_json::to_value(&*order).map_err(|e| SnazzError::Storage(e.to_string()))?;
        self.store.save_document(ORDERS, doc, Some(order.id())).await?;
        log_events(order.take_events());
        Ok(())
    }

    async fn load_lead(&self, id: &str) -> Result<Lead> {
        let doc = self
            .store
            .get_document(LEADS, id)
            .await?
            .ok_or_else(|| SnazzError::NotFound { kind: "lead", id: id.to_string() })?;
        serde_json::from_value(doc).map_err(|e| SnazzError::Storage(format!("lead {id} is malformed: {e}")))
    }

    async fn save_lead(&self, lead: &mut Lead) -> Result<()> {
        let doc = serde_json::to_value(&*lead).map_err(|e| SnazzError::Storage(e.to_string()))?;
        self.store.save_document(LEADS, doc, Some(lead.id())).await?;
        log_events(lead.take_events());
        Ok(())
    }

    async fn load_payment(&self, order_id: &str) -> Result<Option<PaymentRecord>> {
        match self.store.get_document(PAYMENTS, order_id).await? {
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| SnazzError::Storage(format!("payment for order {order_id} is malformed: {e}"))),
            None => Ok(None),
        }
    }

    async fn save_payment(&self, record: &PaymentRecord) -> Result<()> {
        let doc = serde_json::to_value(record).map_err(|e| SnazzError::Storage(e.to_string()))?;
        self.store.save_document(PAYMENTS, doc, Some(&record.order_id)).await?;
        Ok(())
    }
}

fn recipient_for(order: &Order) -> Recipient {
    Recipient {
        name: order.customer_name().to_string(),
        email: order.customer_email().map(str::to_string),
        phone: Some(order.contact_no().to_string()),
    }
}

fn deserialize_collection<T: serde::de::DeserializeOwned>(docs: Vec<Value>, kind: &str) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                // The store enforces no schema; skip what no longer parses.
                warn!(kind, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

fn log_events(events: Vec<DomainEvent>) {
    for event in events {
        info!(?event, "domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CaptureReceipt, GatewayOrder, MemoryDocumentStore, RefundReceipt};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    enum GatewayCall {
        CreateOrder { amount_minor: i64, capture_immediately: bool },
        Capture { payment_id: String, amount_minor: i64 },
        Refund { payment_id: String, amount_minor: i64 },
    }

    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<GatewayCall>>,
        fail_refunds: AtomicBool,
    }

    impl RecordingGateway {
        fn calls(&self) -> Vec<GatewayCall> {
            self.calls.lock().clone()
        }
        fn set_fail_refunds(&self, fail: bool) {
            self.fail_refunds.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn create_order(
            &self,
            amount_minor: i64,
            _currency: &str,
            capture_immediately: bool,
            _metadata: Value,
        ) -> crate::Result<GatewayOrder> {
            let mut calls = self.calls.lock();
            calls.push(GatewayCall::CreateOrder { amount_minor, capture_immediately });
            Ok(GatewayOrder { gateway_order_id: format!("order_MOCK{}", calls.len()) })
        }

        async fn capture(&self, payment_id: &str, amount_minor: i64, _currency: &str) -> crate::Result<CaptureReceipt> {
            self.calls.lock().push(GatewayCall::Capture { payment_id: payment_id.into(), amount_minor });
            Ok(CaptureReceipt { capture_id: "cap_MOCK".into() })
        }

        async fn refund(&self, payment_id: &str, amount_minor: i64, _notes: &str) -> crate::Result<RefundReceipt> {
            if self.fail_refunds.load(Ordering::SeqCst) {
                return Err(SnazzError::GatewayRejected("refund temporarily blocked".into()));
            }
            self.calls.lock().push(GatewayCall::Refund { payment_id: payment_id.into(), amount_minor });
            Ok(RefundReceipt { refund_id: "rfnd_MOCK".into() })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(TemplateType, String)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(TemplateType, String)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingNotifier {
        async fn send(&self, template: TemplateType, recipient: &Recipient, _context: Value) -> crate::Result<()> {
            self.sent.lock().push((template, recipient.name.clone()));
            Ok(())
        }
    }

    struct Harness {
        lifecycle: OrderLifecycleManager,
        store: Arc<MemoryDocumentStore>,
        gateway: Arc<RecordingGateway>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryDocumentStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let lifecycle = OrderLifecycleManager::new(store.clone(), gateway.clone(), notifier.clone(), "INR")
            .with_ops_contact(Recipient {
                name: "SnazzPay Ops".into(),
                email: Some("ops@snazzify.example".into()),
                phone: None,
            });
        Harness { lifecycle, store, gateway, notifier }
    }

    fn draft(price: &str, phone: &str) -> OrderDraft {
        OrderDraft {
            product_ordered: "Silk Saree".into(),
            quantity: 1,
            price: price.parse().unwrap(),
            customer_name: "Asha Rao".into(),
            customer_email: Some("asha@example.com".into()),
            contact_no: phone.into(),
            customer_address: "12 MG Road, Pune".into(),
            pincode: "411001".into(),
            seller_id: Some("S1".into()),
            source: "Seller".into(),
        }
    }

    /// Authorizes an order and attaches its payment id, as the checkout
    /// webhook would.
    async fn authorized_order(h: &Harness, price: &str, phone: &str) -> Order {
        let order = h.lifecycle.checkout_authorize(draft(price, phone), None, false).await.unwrap();
        let payment = h.lifecycle.load_payment(order.id()).await.unwrap().unwrap();
        h.lifecycle.record_payment(&payment.gateway_order_id, "pay_MOCK1").await.unwrap();
        order
    }

    async fn paid_order(h: &Harness, price: &str, phone: &str) -> Order {
        let order = authorized_order(h, price, phone).await;
        h.lifecycle
            .update_fulfillment(
                order.id(),
                FulfillmentUpdate {
                    delivery_status: Some(DeliveryStatus::Dispatched),
                    tracking_number: Some("TRK-001".into()),
                    courier_company_name: Some("Delhivery".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cancel_with_fee_splits_the_total() {
        let h = harness();
        let order = paid_order(&h, "1000.00", "9876543210").await;

        let settlement = h.lifecycle.cancel_with_fee(order.id(), "300".parse().unwrap()).await.unwrap();
        assert_eq!(settlement.captured, Decimal::new(300, 0));
        assert_eq!(settlement.refunded, Decimal::new(700, 0));
        assert_eq!(settlement.captured + settlement.refunded, Decimal::new(1000, 0));

        let calls = h.gateway.calls();
        assert!(calls.contains(&GatewayCall::Capture { payment_id: "pay_MOCK1".into(), amount_minor: 30_000 }));
        assert!(calls.contains(&GatewayCall::Refund { payment_id: "pay_MOCK1".into(), amount_minor: 70_000 }));

        let stored = h.lifecycle.get_order(order.id()).await.unwrap();
        assert_eq!(stored.payment_status(), OrderStatus::Refunded);
        assert_eq!(stored.refund_amount(), Some(Decimal::new(70000, 2)));
    }

    #[tokio::test]
    async fn test_fee_equal_or_above_total_never_reaches_the_gateway() {
        let h = harness();
        let order = paid_order(&h, "1000.00", "9876543210").await;
        let calls_before = h.gateway.calls().len();

        for fee in ["1000", "1200"] {
            let err = h.lifecycle.cancel_with_fee(order.id(), fee.parse().unwrap()).await.unwrap_err();
            assert!(matches!(err, SnazzError::FeeExceedsTotal { .. }));
        }
        assert_eq!(h.gateway.calls().len(), calls_before);
        let stored = h.lifecycle.get_order(order.id()).await.unwrap();
        assert_eq!(stored.payment_status(), OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_second_capture_fails_and_leaves_order_untouched() {
        let h = harness();
        let order = paid_order(&h, "1000.00", "9876543210").await;

        let err = h
            .lifecycle
            .update_fulfillment(
                order.id(),
                FulfillmentUpdate { delivery_status: Some(DeliveryStatus::Dispatched), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SnazzError::AlreadyCaptured(_)));

        let stored = h.lifecycle.get_order(order.id()).await.unwrap();
        assert_eq!(stored.payment_status(), OrderStatus::Paid);
        let captures = h
            .gateway
            .calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Capture { .. }))
            .count();
        assert_eq!(captures, 1);
    }

    #[tokio::test]
    async fn test_wrong_cancellation_token_never_reaches_the_gateway() {
        let h = harness();
        let order = authorized_order(&h, "500.00", "9876543210").await;
        let calls_before = h.gateway.calls().len();

        let err = h.lifecycle.cancel_before_dispatch(order.id(), "CNL-WRONG").await.unwrap_err();
        assert!(matches!(err, SnazzError::InvalidCancellationToken));
        assert_eq!(h.gateway.calls().len(), calls_before);
        let stored = h.lifecycle.get_order(order.id()).await.unwrap();
        assert_eq!(stored.payment_status(), OrderStatus::Authorized);
    }

    #[tokio::test]
    async fn test_void_refunds_the_full_hold() {
        let h = harness();
        let order = authorized_order(&h, "500.00", "9876543210").await;
        let token = h.lifecycle.get_order(order.id()).await.unwrap().cancellation_id().unwrap().to_string();

        let voided = h.lifecycle.cancel_before_dispatch(order.id(), &token).await.unwrap();
        assert_eq!(voided.payment_status(), OrderStatus::Voided);
        assert_eq!(voided.refund_amount(), Some(Decimal::new(50000, 2)));

        let refunds: Vec<_> = h
            .gateway
            .calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Refund { .. }))
            .collect();
        assert_eq!(refunds, vec![GatewayCall::Refund { payment_id: "pay_MOCK1".into(), amount_minor: 50_000 }]);
        assert!(h.notifier.sent().contains(&(TemplateType::Cancellation, "Asha Rao".into())));
    }

    #[tokio::test]
    async fn test_void_without_completed_payment_is_local() {
        let h = harness();
        let order = h.lifecycle.checkout_authorize(draft("500.00", "9876543210"), None, false).await.unwrap();
        let token = h.lifecycle.get_order(order.id()).await.unwrap().cancellation_id().unwrap().to_string();
        let calls_before = h.gateway.calls().len();

        let voided = h.lifecycle.cancel_before_dispatch(order.id(), &token).await.unwrap();
        assert_eq!(voided.payment_status(), OrderStatus::Voided);
        assert_eq!(voided.refund_amount(), Some(Decimal::ZERO));
        assert_eq!(h.gateway.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_convert_lead_twice_yields_exactly_one_order() {
        let h = harness();
        let lead = h.lifecycle.create_lead(draft("750.00", "9123456780")).await.unwrap();

        let order = h.lifecycle.convert_lead(lead.id()).await.unwrap();
        assert_eq!(order.payment_status(), OrderStatus::Pending);

        let err = h.lifecycle.convert_lead(lead.id()).await.unwrap_err();
        assert!(matches!(err, SnazzError::AlreadyConverted(_)));
        assert_eq!(h.store.get_collection("orders").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_cannot_consume_a_converted_lead() {
        let h = harness();
        let lead = h.lifecycle.create_lead(draft("750.00", "9123456780")).await.unwrap();
        h.lifecycle.checkout_authorize(draft("750.00", "9123456780"), Some(lead.id()), false).await.unwrap();
        let calls_before = h.gateway.calls().len();

        let err = h
            .lifecycle
            .checkout_authorize(draft("750.00", "9123456780"), Some(lead.id()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SnazzError::AlreadyConverted(_)));
        assert_eq!(h.gateway.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_card_issued_once_per_canonical_phone() {
        let h = harness();
        paid_order(&h, "1000.00", "+91 98765-43210").await;
        paid_order(&h, "600.00", "98765 43210").await;

        assert_eq!(h.store.get_collection("shakti_cards").await.unwrap().len(), 1);
        let card = h.lifecycle.find_card("+91 98765 43210").await.unwrap().unwrap();
        assert_eq!(card.customer_phone(), "9876543210");
    }

    #[tokio::test]
    async fn test_refund_failure_surfaces_partial_failure() {
        let h = harness();
        let order = paid_order(&h, "1000.00", "9876543210").await;
        h.gateway.set_fail_refunds(true);

        let err = h.lifecycle.cancel_with_fee(order.id(), "300".parse().unwrap()).await.unwrap_err();
        match err {
            SnazzError::PartialFailure { captured, refund, .. } => {
                assert_eq!(captured, Decimal::new(300, 0));
                assert_eq!(refund, Decimal::new(70000, 2));
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
        let stored = h.lifecycle.get_order(order.id()).await.unwrap();
        assert_eq!(stored.payment_status(), OrderStatus::FeeCharged);
        assert!(h.notifier.sent().contains(&(TemplateType::InternalAlert, "SnazzPay Ops".into())));

        // Operator retry after the outage: only the refund leg runs again.
        h.gateway.set_fail_refunds(false);
        let settlement = h.lifecycle.cancel_with_fee(order.id(), "300".parse().unwrap()).await.unwrap();
        assert_eq!(settlement.refunded, Decimal::new(70000, 2));
        let captures = h
            .gateway
            .calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Capture { amount_minor: 30_000, .. }))
            .count();
        assert_eq!(captures, 1);
        let stored = h.lifecycle.get_order(order.id()).await.unwrap();
        assert_eq!(stored.payment_status(), OrderStatus::Refunded);
    }

    #[tokio::test]
    async fn test_capture_requires_a_completed_payment() {
        let h = harness();
        let order = h.lifecycle.checkout_authorize(draft("500.00", "9876543210"), None, false).await.unwrap();

        let err = h
            .lifecycle
            .update_fulfillment(
                order.id(),
                FulfillmentUpdate { delivery_status: Some(DeliveryStatus::Dispatched), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SnazzError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_unread_count_tracks_the_read_flag() {
        let h = harness();
        let first = h.lifecycle.create_order(draft("100.00", "9876543210")).await.unwrap();
        h.lifecycle.create_order(draft("200.00", "9123456780")).await.unwrap();
        assert_eq!(h.lifecycle.unread_count().await.unwrap(), 2);

        h.lifecycle.mark_read(first.id(), true).await.unwrap();
        assert_eq!(h.lifecycle.unread_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_notification_carries_courier_details() {
        let h = harness();
        paid_order(&h, "1000.00", "9876543210").await;
        assert!(h.notifier.sent().contains(&(TemplateType::Dispatch, "Asha Rao".into())));
    }
}
