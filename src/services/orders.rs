use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        address::{Entity as Address, Model as AddressModel},
        order::{self, Column as OrderColumn, Entity as Order, Model as OrderModel, OrderStatus,
            PaymentType},
        order_item::{self, Column as OrderItemColumn, Entity as OrderItem},
        product::{Entity as Product, Model as ProductModel},
        user::{self, Entity as User},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{CreateSessionRequest, GatewayClient, SessionLineItem},
    services::pricing::{self, PricedLine},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub address_id: Uuid,
}

/// Result of an online placement: where to send the buyer, and the ledger
/// record awaiting reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOnlineOrder {
    pub order_id: Uuid,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct OrderLineDetails {
    pub product: Option<ProductModel>,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct OrderUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderLineDetails>,
    pub address: Option<AddressModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<OrderUser>,
}

#[derive(Debug)]
struct ValidatedItem {
    product_id: Uuid,
    quantity: i32,
}

struct PricedOrderLine {
    product: ProductModel,
    quantity: i32,
}

fn validate_items(items: &[OrderItemRequest]) -> Result<Vec<ValidatedItem>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }

    let mut validated = Vec::with_capacity(items.len());
    for item in items {
        let quantity = i32::try_from(item.quantity).ok().filter(|q| *q > 0).ok_or_else(|| {
            ServiceError::ValidationError(format!("Invalid quantity for product {}", item.product))
        })?;
        validated.push(ValidatedItem {
            product_id: item.product,
            quantity,
        });
    }
    Ok(validated)
}

fn success_url(origin: &str) -> String {
    format!(
        "{}/loading?session_id={{CHECKOUT_SESSION_ID}}&payment_success=true",
        origin.trim_end_matches('/')
    )
}

fn cancel_url(origin: &str) -> String {
    format!("{}/cart", origin.trim_end_matches('/'))
}

/// Orders where payment-type is COD, or any type once paid. Unpaid online
/// orders are invisible to listings until reconciliation confirms them.
fn visible_orders() -> Condition {
    Condition::any()
        .add(OrderColumn::PaymentType.eq(PaymentType::Cod))
        .add(OrderColumn::IsPaid.eq(true))
}

/// Service for order placement and order queries
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    gateway: Arc<GatewayClient>,
    currency: String,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<GatewayClient>,
        currency: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
            currency,
        }
    }

    /// Place a cash-on-delivery order. Pricing, the order insert, the item
    /// inserts and the cart clear all commit together or not at all.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn place_cod_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<Uuid, ServiceError> {
        let items = validate_items(&request.items)?;
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for COD order");
            ServiceError::DatabaseError(e)
        })?;

        check_address(&txn, request.address_id).await?;
        let lines = load_priced_lines(&txn, &items).await?;
        let amount = pricing::order_amount(&as_priced(&lines));

        let order_id = insert_order_with_items(
            &txn,
            user_id,
            request.address_id,
            amount,
            PaymentType::Cod,
            None,
            &lines,
        )
        .await?;
        clear_cart(&txn, user_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit COD order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, user_id = %user_id, %amount, "COD order placed");
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        self.event_sender
            .send_or_log(Event::CartCleared(user_id))
            .await;

        Ok(order_id)
    }

    /// Place an order paid through the hosted gateway. The session is opened
    /// against the same read snapshot the order is priced from; if the gateway
    /// call fails the transaction rolls back with nothing written. A session
    /// created just before a failed commit is left to expire on the gateway
    /// side.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn place_online_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
        origin: &str,
    ) -> Result<PlacedOnlineOrder, ServiceError> {
        let items = validate_items(&request.items)?;
        let origin = origin.trim();
        if origin.is_empty() {
            return Err(ServiceError::ValidationError(
                "Return origin is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for online order");
            ServiceError::DatabaseError(e)
        })?;

        check_address(&txn, request.address_id).await?;
        let lines = load_priced_lines(&txn, &items).await?;
        let amount = pricing::order_amount(&as_priced(&lines));

        let mut session_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            session_lines.push(SessionLineItem {
                name: line.product.name.clone(),
                unit_amount: pricing::gateway_unit_amount(line.product.offer_price)?,
                quantity: i64::from(line.quantity),
            });
        }

        let metadata_order_items = serde_json::to_string(&request.items)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        let session = self
            .gateway
            .create_checkout_session(&CreateSessionRequest {
                currency: self.currency.clone(),
                line_items: session_lines,
                success_url: success_url(origin),
                cancel_url: cancel_url(origin),
                metadata_user_id: user_id.to_string(),
                metadata_order_items,
            })
            .await?;

        let redirect = session.url.clone().ok_or_else(|| {
            ServiceError::ExternalServiceError(
                "Gateway session carries no redirect URL".to_string(),
            )
        })?;

        let order_id = insert_order_with_items(
            &txn,
            user_id,
            request.address_id,
            amount,
            PaymentType::Online,
            Some(session.id.clone()),
            &lines,
        )
        .await?;
        clear_cart(&txn, user_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit online order");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            user_id = %user_id,
            session_id = %session.id,
            %amount,
            "Online order placed, awaiting payment"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated {
                order_id,
                session_id: session.id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::CartCleared(user_id))
            .await;

        Ok(PlacedOnlineOrder {
            order_id,
            url: redirect,
        })
    }

    /// The calling user's orders, newest first. Unpaid online orders are
    /// filtered out.
    #[instrument(skip(self))]
    pub async fn list_my_orders(&self, user_id: Uuid) -> Result<Vec<OrderDetails>, ServiceError> {
        let db = &*self.db_pool;

        let orders = Order::find()
            .filter(OrderColumn::UserId.eq(user_id))
            .filter(visible_orders())
            .order_by_desc(OrderColumn::CreatedAt)
            .all(db)
            .await?;

        self.hydrate_orders(orders, false).await
    }

    /// Every visible order across all users, newest first, with the owning
    /// user's name and email for the admin console.
    #[instrument(skip(self))]
    pub async fn list_all_orders(&self) -> Result<Vec<OrderDetails>, ServiceError> {
        let db = &*self.db_pool;

        let orders = Order::find()
            .filter(visible_orders())
            .order_by_desc(OrderColumn::CreatedAt)
            .all(db)
            .await?;

        self.hydrate_orders(orders, true).await
    }

    async fn hydrate_orders(
        &self,
        orders: Vec<OrderModel>,
        include_user: bool,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        let db = &*self.db_pool;
        let mut details = Vec::with_capacity(orders.len());

        for order in orders {
            let items = OrderItem::find()
                .filter(OrderItemColumn::OrderId.eq(order.id))
                .order_by_asc(OrderItemColumn::Position)
                .find_also_related(Product)
                .all(db)
                .await?
                .into_iter()
                .map(|(item, product)| OrderLineDetails {
                    product,
                    quantity: item.quantity,
                })
                .collect();

            let address = Address::find_by_id(order.address_id).one(db).await?;

            let user = if include_user {
                User::find_by_id(order.user_id)
                    .one(db)
                    .await?
                    .map(|u| OrderUser {
                        name: u.name,
                        email: u.email,
                    })
            } else {
                None
            };

            details.push(OrderDetails {
                order,
                items,
                address,
                user,
            });
        }

        Ok(details)
    }
}

async fn check_address(txn: &DatabaseTransaction, address_id: Uuid) -> Result<(), ServiceError> {
    Address::find_by_id(address_id)
        .one(txn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))
}

/// Load and price each requested line against the transaction's read view.
/// A missing product aborts the whole placement.
async fn load_priced_lines(
    txn: &DatabaseTransaction,
    items: &[ValidatedItem],
) -> Result<Vec<PricedOrderLine>, ServiceError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = Product::find_by_id(item.product_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
        lines.push(PricedOrderLine {
            product,
            quantity: item.quantity,
        });
    }
    Ok(lines)
}

fn as_priced(lines: &[PricedOrderLine]) -> Vec<PricedLine> {
    lines
        .iter()
        .map(|line| PricedLine {
            unit_price: line.product.offer_price,
            quantity: line.quantity,
        })
        .collect()
}

async fn insert_order_with_items(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    address_id: Uuid,
    amount: rust_decimal::Decimal,
    payment_type: PaymentType,
    payment_id: Option<String>,
    lines: &[PricedOrderLine],
) -> Result<Uuid, ServiceError> {
    let order_id = Uuid::new_v4();
    let now = Utc::now();

    order::ActiveModel {
        id: Set(order_id),
        user_id: Set(user_id),
        address_id: Set(address_id),
        amount: Set(amount),
        payment_type: Set(payment_type),
        is_paid: Set(false),
        payment_id: Set(payment_id),
        status: Set(OrderStatus::OrderPlaced),
        payment_method: Set(None),
        amount_paid: Set(None),
        paid_currency: Set(None),
        created_at: Set(now),
        updated_at: Set(None),
    }
    .insert(txn)
    .await?;

    for (position, line) in lines.iter().enumerate() {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product.id),
            quantity: Set(line.quantity),
            position: Set(position as i32),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
    }

    Ok(order_id)
}

async fn clear_cart(txn: &DatabaseTransaction, user_id: Uuid) -> Result<(), ServiceError> {
    let existing = User::find_by_id(user_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

    let mut active: user::ActiveModel = existing.into();
    active.cart_items = Set(user::empty_cart());
    active.updated_at = Set(Some(Utc::now()));
    active.update(txn).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64) -> OrderItemRequest {
        OrderItemRequest {
            product: Uuid::new_v4(),
            quantity,
        }
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let err = validate_items(&[]).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn zero_and_negative_quantities_are_rejected() {
        assert!(validate_items(&[item(0)]).is_err());
        assert!(validate_items(&[item(-2)]).is_err());
        // One bad line poisons the whole request.
        assert!(validate_items(&[item(3), item(0)]).is_err());
    }

    #[test]
    fn oversized_quantity_is_rejected() {
        assert!(validate_items(&[item(i64::from(i32::MAX) + 1)]).is_err());
    }

    #[test]
    fn valid_items_pass_through() {
        let validated = validate_items(&[item(2), item(7)]).unwrap();
        assert_eq!(validated.len(), 2);
        assert_eq!(validated[0].quantity, 2);
        assert_eq!(validated[1].quantity, 7);
    }

    #[test]
    fn redirect_urls_keep_the_session_placeholder() {
        let success = success_url("https://shop.test");
        assert_eq!(
            success,
            "https://shop.test/loading?session_id={CHECKOUT_SESSION_ID}&payment_success=true"
        );
        assert_eq!(cancel_url("https://shop.test/"), "https://shop.test/cart");
    }
}
