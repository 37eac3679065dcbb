//! Aggregates module
pub mod lead;
pub mod order;
pub mod shakti_card;

pub use lead::{Lead, LeadStatus};
pub use order::{DeliveryStatus, FulfillmentUpdate, Order, OrderDraft, OrderStatus};
pub use shakti_card::ShaktiCard;
