//! Fire-and-forget customer notifications.
//!
//! Enqueue failures are logged and never reach the financial operation that triggered them.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::aggregates::{Order, OrderItem};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailJob {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn enqueue(&self, job: EmailJob) -> anyhow::Result<()>;
}

/// Publishes email jobs as JSON for a mail worker.
pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
    from: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject: impl Into<String>, from: impl Into<String>) -> Self {
        Self { client, subject: subject.into(), from: from.into() }
    }
}

#[derive(Serialize)]
struct NatsEmail<'a> {
    from: &'a str,
    #[serde(flatten)]
    job: &'a EmailJob,
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn enqueue(&self, job: EmailJob) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&NatsEmail { from: &self.from, job: &job })?;
        self.client.publish(self.subject.clone(), payload.into()).await?;
        info!(to = %job.to, subject = %job.subject, "email job published");
        Ok(())
    }
}

/// Used when no message bus is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn enqueue(&self, job: EmailJob) -> anyhow::Result<()> {
        info!(to = %job.to, subject = %job.subject, "email not sent, no notifier configured");
        Ok(())
    }
}

/// Hands the job to a background task.
pub fn spawn_enqueue(notifier: Arc<dyn Notifier>, job: EmailJob) {
    tokio::spawn(async move {
        let to = job.to.clone();
        if let Err(e) = notifier.enqueue(job).await {
            warn!(to = %to, error = %e, "failed to enqueue email");
        }
    });
}

fn money(cents: i64, currency: &str) -> String {
    Money::new(cents, currency).to_string()
}

fn short_id(order: &Order) -> String {
    order.id.simple().to_string()[..8].to_uppercase()
}

pub fn order_confirmation(order: &Order, items: &[OrderItem], to: &str) -> EmailJob {
    let cur = order.currency.as_str();
    let mut text = format!("Thank you for your order {}.\n\n", short_id(order));
    let mut rows = String::new();
    for it in items {
        let _ = writeln!(text, "{} x {} ({})  {}", it.quantity, it.product_name, it.sku, money(it.line_total_cents, cur));
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(&it.product_name), html_escape(&it.sku), it.quantity, money(it.line_total_cents, cur)
        );
    }
    let summary = [
        ("Subtotal", order.subtotal_cents),
        ("Shipping", order.shipping_cents),
        ("Tax", order.tax_cents),
        ("Discount", -order.discount_cents),
        ("Total", order.total_cents),
    ];
    text.push('\n');
    for (label, cents) in summary {
        let _ = writeln!(text, "{label}: {}", money(cents, cur));
        let _ = write!(rows, "<tr><td colspan=\"3\">{label}</td><td>{}</td></tr>", money(cents, cur));
    }
    EmailJob {
        to: to.to_string(),
        subject: format!("Order confirmation {}", short_id(order)),
        html_body: format!("<h1>Thank you for your order</h1><p>Order {}</p><table>{rows}</table>", short_id(order)),
        text_body: text,
    }
}

pub fn payment_received(order: &Order, amount_cents: i64, to: &str) -> EmailJob {
    let amount = money(amount_cents, &order.currency);
    EmailJob {
        to: to.to_string(),
        subject: format!("Payment received for order {}", short_id(order)),
        text_body: format!("We received your payment of {amount} for order {}.\n", short_id(order)),
        html_body: format!("<p>We received your payment of <strong>{amount}</strong> for order {}.</p>", short_id(order)),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
