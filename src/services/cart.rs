use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::user::{self, Entity as User},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Validates a raw cart payload into the canonical mapping. Every key must be
/// a product id and every value a strictly positive integer; a single bad
/// entry rejects the whole payload so a failed update never partially writes.
pub fn validate_cart_payload(
    raw: &serde_json::Map<String, serde_json::Value>,
) -> Result<BTreeMap<Uuid, i64>, ServiceError> {
    let mut cart = BTreeMap::new();
    for (key, value) in raw {
        let product_id = Uuid::parse_str(key).map_err(|_| {
            ServiceError::ValidationError(format!("Invalid product ID format: {}", key))
        })?;
        let quantity = value.as_i64().ok_or_else(|| {
            ServiceError::ValidationError(format!("Invalid quantity for product {}", key))
        })?;
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Invalid quantity for product {}",
                key
            )));
        }
        cart.insert(product_id, quantity);
    }
    Ok(cart)
}

/// Service for the buyer's cart, stored as a mapping on the user record
pub struct CartService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a new cart service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Replace the user's entire cart mapping. Full-replace, not a merge: the
    /// caller sends the complete desired mapping and removal is expressed by
    /// leaving a key out.
    #[instrument(skip(self, raw_items), fields(user_id = %user_id))]
    pub async fn update_cart(
        &self,
        user_id: Uuid,
        raw_items: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<BTreeMap<Uuid, i64>, ServiceError> {
        let cart = validate_cart_payload(raw_items)?;
        let db = &*self.db_pool;

        let txn = db.begin().await?;

        let existing = User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let mut active: user::ActiveModel = existing.into();
        active.cart_items = Set(user::cart_to_json(&cart));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        info!(user_id = %user_id, entries = cart.len(), "Cart replaced");
        self.event_sender
            .send_or_log(Event::CartUpdated(user_id))
            .await;

        Ok(cart)
    }

    /// Current cart mapping for a user
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<BTreeMap<Uuid, i64>, ServiceError> {
        let db = &*self.db_pool;

        let user = User::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        user.cart_map().map_err(|e| {
            ServiceError::SerializationError(format!("Stored cart is not a valid mapping: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(entries: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn valid_payload_parses() {
        let id = Uuid::new_v4();
        let raw = payload(&[(&id.to_string(), json!(3))]);

        let cart = validate_cart_payload(&raw).unwrap();
        assert_eq!(cart.get(&id), Some(&3));
    }

    #[test]
    fn empty_payload_is_an_empty_cart() {
        let cart = validate_cart_payload(&payload(&[])).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn malformed_product_id_rejects_everything() {
        let good = Uuid::new_v4();
        let raw = payload(&[
            (&good.to_string(), json!(1)),
            ("not-a-product-id", json!(2)),
        ]);

        let err = validate_cart_payload(&raw).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(msg) if msg.contains("product ID")));
    }

    #[test]
    fn zero_quantity_rejects_the_whole_payload() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = payload(&[(&a.to_string(), json!(2)), (&b.to_string(), json!(0))]);

        assert!(validate_cart_payload(&raw).is_err());
    }

    #[test]
    fn negative_quantity_rejects_the_whole_payload() {
        let id = Uuid::new_v4();
        let raw = payload(&[(&id.to_string(), json!(-1))]);

        assert!(validate_cart_payload(&raw).is_err());
    }

    #[test]
    fn fractional_quantity_is_not_an_integer() {
        let id = Uuid::new_v4();
        let raw = payload(&[(&id.to_string(), json!(1.5))]);

        assert!(validate_cart_payload(&raw).is_err());
    }

    #[test]
    fn stored_form_never_carries_non_positive_entries() {
        let id = Uuid::new_v4();
        let mut cart = BTreeMap::new();
        cart.insert(id, 2);
        cart.insert(Uuid::new_v4(), 0);
        cart.insert(Uuid::new_v4(), -5);

        let stored = user::cart_to_json(&cart);
        let object = stored.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object.get(&id.to_string()), Some(&json!(2)));
    }
}
