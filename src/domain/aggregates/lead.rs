//! Lead Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::order::OrderDraft;
use crate::domain::events::{DomainEvent, LeadEvent};
use crate::{Result, SnazzError};

/// A pre-order customer intent record. Shares the commercial shape of an
/// order; conversion copies it into a `Pending` order exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    id: String,
    product_ordered: String,
    quantity: u32,
    price: Decimal,
    customer_name: String,
    customer_email: Option<String>,
    contact_no: String,
    customer_address: String,
    pincode: String,
    #[serde(rename = "paymentStatus")]
    status: LeadStatus,
    seller_id: Option<String>,
    source: String,
    converted_order_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    #[serde(rename = "Lead")]
    New,
    #[serde(rename = "Intent Verified")]
    IntentVerified,
    #[serde(rename = "Pushed to Seller")]
    PushedToSeller,
    Converted,
    Cancelled,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "Lead",
            Self::IntentVerified => "Intent Verified",
            Self::PushedToSeller => "Pushed to Seller",
            Self::Converted => "Converted",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.as_str()) }
}

impl Lead {
    pub fn create(draft: OrderDraft) -> Self {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let mut lead = Self {
            id: id.clone(),
            product_ordered: draft.product_ordered,
            quantity: draft.quantity,
            price: draft.price,
            customer_name: draft.customer_name,
            customer_email: draft.customer_email,
            contact_no: draft.contact_no,
            customer_address: draft.customer_address,
            pincode: draft.pincode,
            status: LeadStatus::New,
            seller_id: draft.seller_id,
            source: draft.source.clone(),
            converted_order_id: None,
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        lead.raise_event(DomainEvent::Lead(LeadEvent::Created { lead_id: id, source: draft.source }));
        lead
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn status(&self) -> LeadStatus { self.status }
    pub fn price(&self) -> Decimal { self.price }
    pub fn contact_no(&self) -> &str { &self.contact_no }
    pub fn converted_order_id(&self) -> Option<&str> { self.converted_order_id.as_deref() }

    /// The commercial fields, for copying into an order at conversion.
    pub fn draft(&self) -> OrderDraft {
        OrderDraft {
            product_ordered: self.product_ordered.clone(),
            quantity: self.quantity,
            price: self.price,
            customer_name: self.customer_name.clone(),
            customer_email: self.customer_email.clone(),
            contact_no: self.contact_no.clone(),
            customer_address: self.customer_address.clone(),
            pincode: self.pincode.clone(),
            seller_id: self.seller_id.clone(),
            source: self.source.clone(),
        }
    }

    /// `Lead → Intent Verified`.
    pub fn verify_intent(&mut self) -> Result<()> {
        if self.status != LeadStatus::New {
            return Err(self.bad_transition(LeadStatus::IntentVerified));
        }
        self.status = LeadStatus::IntentVerified;
        self.touch();
        self.raise_event(DomainEvent::Lead(LeadEvent::IntentVerified { lead_id: self.id.clone() }));
        Ok(())
    }

    /// `Lead → Pushed to Seller`. Pure status mutation, no payment side
    /// effects.
    pub fn push_to_seller(&mut self) -> Result<()> {
        match self.status {
            LeadStatus::New | LeadStatus::IntentVerified => {}
            _ => return Err(self.bad_transition(LeadStatus::PushedToSeller)),
        }
        self.status = LeadStatus::PushedToSeller;
        self.touch();
        self.raise_event(DomainEvent::Lead(LeadEvent::PushedToSeller { lead_id: self.id.clone() }));
        Ok(())
    }

    /// One-shot conversion marker. A second invocation fails; the stored
    /// order id guarantees at most one order ever exists for this lead.
    pub fn convert(&mut self, order_id: &str) -> Result<()> {
        match self.status {
            LeadStatus::Converted => return Err(SnazzError::AlreadyConverted(self.id.clone())),
            LeadStatus::Cancelled => return Err(self.bad_transition(LeadStatus::Converted)),
            _ => {}
        }
        self.status = LeadStatus::Converted;
        self.converted_order_id = Some(order_id.to_string());
        self.touch();
        self.raise_event(DomainEvent::Lead(LeadEvent::Converted {
            lead_id: self.id.clone(),
            order_id: order_id.to_string(),
        }));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        if self.status == LeadStatus::Converted {
            return Err(self.bad_transition(LeadStatus::Cancelled));
        }
        self.status = LeadStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Lead(LeadEvent::Cancelled { lead_id: self.id.clone() }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }

    fn bad_transition(&self, to: LeadStatus) -> SnazzError {
        SnazzError::InvalidTransition { kind: "lead", from: self.status.to_string(), to: to.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OrderDraft {
        OrderDraft {
            product_ordered: "Handloom Stole".into(),
            quantity: 2,
            price: Decimal::new(750, 0),
            customer_name: "Meera Iyer".into(),
            customer_email: None,
            contact_no: "9123456780".into(),
            customer_address: "4 Park Street, Kolkata".into(),
            pincode: "700016".into(),
            seller_id: None,
            source: "Collaborator".into(),
        }
    }

    #[test]
    fn test_convert_is_one_shot() {
        let mut lead = Lead::create(draft());
        lead.convert("order-1").unwrap();
        assert_eq!(lead.status(), LeadStatus::Converted);
        assert_eq!(lead.converted_order_id(), Some("order-1"));
        assert!(matches!(lead.convert("order-2"), Err(SnazzError::AlreadyConverted(_))));
        assert_eq!(lead.converted_order_id(), Some("order-1"));
    }

    #[test]
    fn test_push_to_seller_has_no_payment_side_effects() {
        let mut lead = Lead::create(draft());
        lead.push_to_seller().unwrap();
        assert_eq!(lead.status(), LeadStatus::PushedToSeller);
    }

    #[test]
    fn test_verify_intent_only_from_new() {
        let mut lead = Lead::create(draft());
        lead.verify_intent().unwrap();
        assert!(matches!(lead.verify_intent(), Err(SnazzError::InvalidTransition { .. })));
    }

    #[test]
    fn test_cancelled_lead_cannot_convert() {
        let mut lead = Lead::create(draft());
        lead.cancel().unwrap();
        assert!(lead.convert("order-1").is_err());
    }

    #[test]
    fn test_status_serializes_to_source_strings() {
        assert_eq!(serde_json::to_value(LeadStatus::New).unwrap(), serde_json::json!("Lead"));
        assert_eq!(
            serde_json::to_value(LeadStatus::PushedToSeller).unwrap(),
            serde_json::json!("Pushed to Seller")
        );
    }
}
