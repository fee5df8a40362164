//! Administrative order transitions and the back-office order view.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{ledger, orders, payments};
use crate::domain::aggregates::order::next_status;
use crate::domain::aggregates::{Order, OrderAction, OrderItem, OrderStatus, Payment, Refund};
use crate::domain::events::{net_settled, FinancialEntry, NewOrderEvent, OrderEvent};
use crate::error::{CommerceError, Result};

#[derive(Clone, Debug)]
pub struct TransitionRequest {
    pub order_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: OrderAction,
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionResult {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Clone, Debug, Serialize)]
pub struct AdminOrderView {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub events: Vec<OrderEvent>,
    pub ledger: Vec<FinancialEntry>,
    pub net_settled_cents: i64,
    pub payments: Vec<Payment>,
    pub refunds: Vec<Refund>,
}

#[derive(Clone)]
pub struct OrderAdminService {
    pool: PgPool,
}

impl OrderAdminService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies one row of the transition table under the order lock, guarded on the status
    /// read, and records who did it.
    #[instrument(skip(self, req), fields(order_id = %req.order_id, action = req.action.as_str()))]
    pub async fn transition(&self, req: TransitionRequest) -> Result<TransitionResult> {
        if req.actor_user_id.is_none() {
            return Err(CommerceError::NotActionable);
        }

        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(&mut tx, req.order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        let from = order.status;
        let to = next_status(from, req.action)?;

        if !orders::update_status_guarded(&mut tx, order.id, from, to).await? {
            return Err(CommerceError::InvalidTransition);
        }
        let note = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        orders::insert_event(&mut tx, &NewOrderEvent {
            order_id: order.id,
            actor_user_id: req.actor_user_id,
            action: req.action.as_str(),
            from_status: from.as_str(),
            to_status: to.as_str(),
            note,
        }).await?;
        tx.commit().await?;

        info!(%from, %to, "order transitioned");
        Ok(TransitionResult { order_id: order.id, from, to })
    }

    pub async fn detail(&self, order_id: Uuid) -> Result<AdminOrderView> {
        let order = orders::get_order(&self.pool, order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        let items = orders::list_items(&self.pool, order_id).await?;
        let events = orders::list_events(&self.pool, order_id).await?;
        let ledger = ledger::list_for_order(&self.pool, order_id).await?;
        let payments = payments::list_payments(&self.pool, order_id).await?;
        let refunds = payments::list_refunds(&self.pool, order_id).await?;
        Ok(AdminOrderView { net_settled_cents: net_settled(&ledger), order, items, events, ledger, payments, refunds })
    }
}
