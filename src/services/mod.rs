//! External collaborators: document store, payment gateway, notifications
pub mod notifications;
pub mod payment;
pub mod store;

pub use notifications::{LogNotifier, NatsNotifier, NotificationSender, Recipient, TemplateType};
pub use payment::{CaptureReceipt, GatewayOrder, PaymentGateway, RazorpayGateway, RefundReceipt, UnconfiguredGateway};
pub use store::{DocumentStore, MemoryDocumentStore, PgDocumentStore};
