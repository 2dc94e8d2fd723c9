use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order::{Column as OrderColumn, Entity as Order, OrderStatus},
        order_item::{Column as OrderItemColumn, Entity as OrderItem},
        user::{self, Column as UserColumn, Entity as User},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::GatewayClient,
};

/// A webhook event envelope. The recognized kinds are a closed set; anything
/// else lands in `Unknown` and is acknowledged without side effects, since an
/// unacknowledged event would be redelivered forever.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    #[serde(rename = "payment_intent.succeeded")]
    PaymentSucceeded { data: EventPayload },
    #[serde(rename = "payment_intent.failed")]
    PaymentFailed { data: EventPayload },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: String,
}

/// Outcome of a client-initiated payment verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    pub payment_status: String,
}

fn minor_to_major(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Service that converges local order state with the gateway's ground truth.
/// The webhook path and the verify path race freely; every write here is a
/// conditional update keyed on the current `is_paid` value, so whichever
/// fires first wins and the loser is a no-op.
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    gateway: Arc<GatewayClient>,
}

impl ReconciliationService {
    /// Creates a new reconciliation service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<GatewayClient>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
        }
    }

    /// Apply an authenticated webhook event. Events arrive at-least-once and
    /// unordered, so every arm must tolerate replays.
    #[instrument(skip(self, event))]
    pub async fn apply_event(&self, event: GatewayEvent) -> Result<(), ServiceError> {
        match event {
            GatewayEvent::PaymentSucceeded { data } => {
                self.payment_succeeded(&data.object.id).await
            }
            GatewayEvent::PaymentFailed { data } => self.payment_failed(&data.object.id).await,
            GatewayEvent::Unknown => {
                info!("Ignoring unrecognized gateway event");
                Ok(())
            }
        }
    }

    /// Mark the order behind a settled payment intent as paid and clear the
    /// buyer's cart. Replayed events find `is_paid` already true and change
    /// nothing.
    async fn payment_succeeded(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        let session = self
            .gateway
            .find_session_by_payment_intent(payment_intent_id)
            .await?
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(format!(
                    "No session found for payment intent {}",
                    payment_intent_id
                ))
            })?;

        let db = &*self.db_pool;

        let updated = Order::update_many()
            .col_expr(OrderColumn::IsPaid, Expr::value(true))
            .col_expr(OrderColumn::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(OrderColumn::PaymentId.eq(session.id.as_str()))
            .filter(OrderColumn::IsPaid.eq(false))
            .exec(db)
            .await?;

        if updated.rows_affected == 0 {
            info!(session_id = %session.id, "Order already reconciled; webhook is a no-op");
        } else if let Some(order) = Order::find()
            .filter(OrderColumn::PaymentId.eq(session.id.as_str()))
            .one(db)
            .await?
        {
            info!(order_id = %order.id, session_id = %session.id, "Order marked paid by webhook");
            self.event_sender.send_or_log(Event::OrderPaid(order.id)).await;
        }

        match session
            .metadata
            .user_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            Some(user_id) => {
                clear_cart_if_present(db, user_id).await?;
                self.event_sender
                    .send_or_log(Event::CartCleared(user_id))
                    .await;
            }
            None => {
                warn!(session_id = %session.id, "Session metadata has no usable user id; cart left as is");
            }
        }

        Ok(())
    }

    /// Delete the unpaid order behind a failed payment intent. An order that
    /// already reconciled to paid is never deleted.
    async fn payment_failed(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        let session = self
            .gateway
            .find_session_by_payment_intent(payment_intent_id)
            .await?
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(format!(
                    "No session found for payment intent {}",
                    payment_intent_id
                ))
            })?;

        let db = &*self.db_pool;
        let order = Order::find()
            .filter(OrderColumn::PaymentId.eq(session.id.as_str()))
            .filter(OrderColumn::IsPaid.eq(false))
            .one(db)
            .await?;

        let Some(order) = order else {
            info!(session_id = %session.id, "No unpaid order for failed payment; nothing to delete");
            return Ok(());
        };

        let txn = db.begin().await?;
        let deleted = Order::delete_many()
            .filter(OrderColumn::Id.eq(order.id))
            .filter(OrderColumn::IsPaid.eq(false))
            .exec(&txn)
            .await?;

        if deleted.rows_affected == 0 {
            // Lost the race to a concurrent verify; the order is paid now.
            txn.commit().await?;
            info!(order_id = %order.id, "Order reconciled to paid before deletion; kept");
            return Ok(());
        }

        OrderItem::delete_many()
            .filter(OrderItemColumn::OrderId.eq(order.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(order_id = %order.id, session_id = %session.id, "Unpaid order deleted after failed payment");
        self.event_sender
            .send_or_log(Event::OrderPaymentFailed(order.id))
            .await;
        self.event_sender
            .send_or_log(Event::OrderDeleted(order.id))
            .await;

        Ok(())
    }

    /// Client-initiated verification after the buyer returns from the hosted
    /// payment page. Queries the gateway for ground truth; only a session the
    /// gateway reports as paid can flip the order, and only when an unpaid
    /// order matches both the session and the claimed user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn verify_payment(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<VerificationOutcome, ServiceError> {
        let session = self.gateway.retrieve_session(session_id).await?;

        if !session.is_paid() {
            info!(session_id, "Session not paid; no state change");
            return Ok(VerificationOutcome {
                paid: false,
                order_id: None,
                amount: None,
                payment_status: session
                    .payment_status
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let db = &*self.db_pool;
        let amount_paid = session.amount_total.map(minor_to_major);
        let payment_method = session.payment_method().map(str::to_string);

        let updated = Order::update_many()
            .col_expr(OrderColumn::IsPaid, Expr::value(true))
            .col_expr(OrderColumn::Status, Expr::value(OrderStatus::Processing))
            .col_expr(OrderColumn::PaymentMethod, Expr::value(payment_method))
            .col_expr(OrderColumn::AmountPaid, Expr::value(amount_paid))
            .col_expr(OrderColumn::PaidCurrency, Expr::value(session.currency.clone()))
            .col_expr(OrderColumn::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(OrderColumn::PaymentId.eq(session_id))
            .filter(OrderColumn::UserId.eq(user_id))
            .filter(OrderColumn::IsPaid.eq(false))
            .exec(db)
            .await?;

        if updated.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Order not found or already paid".to_string(),
            ));
        }

        let order = Order::find()
            .filter(OrderColumn::PaymentId.eq(session_id))
            .filter(OrderColumn::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        info!(order_id = %order.id, session_id, "Payment verified; order reconciled");
        self.event_sender
            .send_or_log(Event::OrderPaid(order.id))
            .await;

        Ok(VerificationOutcome {
            paid: true,
            order_id: Some(order.id),
            amount: Some(order.amount),
            payment_status: "completed".to_string(),
        })
    }
}

/// Reset a user's cart to empty without requiring the user to exist. A
/// missing user or an already-empty cart is a successful no-op.
async fn clear_cart_if_present(db: &DbPool, user_id: Uuid) -> Result<(), ServiceError> {
    User::update_many()
        .col_expr(UserColumn::CartItems, Expr::value(user::empty_cart()))
        .col_expr(UserColumn::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(UserColumn::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}
