//! Application services. Each owns its transactions; repositories in [`crate::db`] never
//! begin or commit.

pub mod admin;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod refund;
pub mod settlement;
pub mod webhook;

pub use admin::{OrderAdminService, TransitionRequest, TransitionResult};
pub use notify::{EmailJob, LogNotifier, NatsNotifier, Notifier};
pub use orders::{CreateOrderRequest, CreateOrderResult, OrderService};
pub use payment::{PayOrderRequest, PayOrderResult, PaymentService};
pub use refund::{RefundOrderRequest, RefundOrderResult, RefundService};
pub use webhook::{WebhookOutcome, WebhookService};
