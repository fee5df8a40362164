//! Cart lines resolved for checkout

use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{Money, MoneyError};
use crate::error::{CommerceError, Result};

/// A cart line joined with its live variant/product data. Missing joins mean the
/// variant no longer resolves.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CartLine {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub product_name: Option<String>,
    pub product_status: Option<String>,
    pub sku: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
}

/// Price snapshot taken at checkout; never re-read from the catalog afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub variant_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub unit_price_cents: i64,
    pub currency: String,
    pub quantity: i32,
    pub line_total_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedCart {
    pub currency: String,
    pub subtotal_cents: i64,
    pub items: Vec<ItemSnapshot>,
}

impl PricedCart {
    /// Snapshots every line. Carts must be mono-currency.
    pub fn from_lines(lines: &[CartLine]) -> Result<Self> {
        if lines.is_empty() { return Err(CommerceError::CartEmpty); }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let (Some(name), Some(sku), Some(price), Some(currency)) =
                (&line.product_name, &line.sku, line.price_cents, &line.currency)
            else {
                return Err(CommerceError::ProductUnavailable);
            };
            if line.product_status.as_deref() != Some("active") {
                return Err(CommerceError::ProductUnavailable);
            }
            if line.quantity < 1 {
                return Err(CommerceError::Validation(format!("invalid quantity for variant {}", line.variant_id)));
            }
            let line_total = Money::new(price, currency).multiply(line.quantity).map_err(money_error)?;
            items.push(ItemSnapshot {
                variant_id: line.variant_id,
                product_name: name.clone(),
                sku: sku.clone(),
                unit_price_cents: price,
                currency: line_total.currency().to_string(),
                quantity: line.quantity,
                line_total_cents: line_total.amount_cents(),
            });
        }

        let currency = items[0].currency.clone();
        let subtotal = items.iter().try_fold(Money::zero(&currency), |acc, item| {
            acc.add(&Money::new(item.line_total_cents, &item.currency))
        }).map_err(money_error)?;

        Ok(Self { currency, subtotal_cents: subtotal.amount_cents(), items })
    }
}

fn money_error(e: MoneyError) -> CommerceError {
    match e {
        MoneyError::CurrencyMismatch => CommerceError::CurrencyMismatch,
        MoneyError::Overflow => CommerceError::Validation("cart amount overflow".into()),
    }
}
