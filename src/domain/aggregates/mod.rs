//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod payment;

pub use product::{StockLine, VariantStock};
pub use order::{Order, OrderAction, OrderItem, OrderStatus, OrderTotals};
pub use cart::{CartLine, ItemSnapshot, PricedCart};
pub use payment::{Payment, PaymentStatus, Refund};
