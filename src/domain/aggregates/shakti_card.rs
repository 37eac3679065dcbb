//! Shakti Card Aggregate

use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::events::{CardEvent, DomainEvent};
use crate::domain::value_objects::PhoneNumber;

/// Loyalty/cashback card keyed by the customer's canonical phone number.
/// Issued at most once per phone, on the first captured order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaktiCard {
    card_number: String,
    customer_phone: String,
    points: u64,
    cashback: Decimal,
    valid_from: NaiveDate,
    valid_thru: NaiveDate,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl ShaktiCard {
    pub fn issue(phone: &PhoneNumber) -> Self {
        let valid_from = Utc::now().date_naive();
        let card_number = format!("SHKT-{:08}", rand::random::<u32>() % 100_000_000);
        let mut card = Self {
            card_number: card_number.clone(),
            customer_phone: phone.as_str().to_string(),
            points: 0,
            cashback: Decimal::ZERO,
            valid_from,
            valid_thru: valid_from + Months::new(12),
            events: vec![],
        };
        card.raise_event(DomainEvent::Card(CardEvent::Issued {
            card_number,
            customer_phone: phone.as_str().to_string(),
        }));
        card
    }

    pub fn card_number(&self) -> &str { &self.card_number }
    pub fn customer_phone(&self) -> &str { &self.customer_phone }
    pub fn points(&self) -> u64 { self.points }
    pub fn cashback(&self) -> Decimal { self.cashback }
    pub fn valid_from(&self) -> NaiveDate { self.valid_from }
    pub fn valid_thru(&self) -> NaiveDate { self.valid_thru }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue() {
        let phone = PhoneNumber::canonicalize("+91 91234 56780").unwrap();
        let card = ShaktiCard::issue(&phone);
        assert!(card.card_number().starts_with("SHKT-"));
        assert_eq!(card.customer_phone(), "9123456780");
        assert_eq!(card.points(), 0);
        assert_eq!(card.valid_thru(), card.valid_from() + Months::new(12));
    }
}
