use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::address::{self, Column as AddressColumn, Entity as Address, Model as AddressModel},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Zipcode is required"))]
    pub zipcode: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
}

/// Service for shipping addresses. Addresses are append-only: once created
/// they are never updated or deleted, so orders can reference them by id.
pub struct AddressService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl AddressService {
    /// Creates a new address service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Store a new address for a user
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_address(
        &self,
        user_id: Uuid,
        request: CreateAddressRequest,
    ) -> Result<AddressModel, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            email: Set(request.email),
            street: Set(request.street),
            city: Set(request.city),
            state: Set(request.state),
            zipcode: Set(request.zipcode),
            country: Set(request.country),
            phone: Set(request.phone),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(db).await?;

        info!(address_id = %created.id, user_id = %user_id, "Address created");
        self.event_sender
            .send_or_log(Event::AddressCreated(created.id))
            .await;

        Ok(created)
    }

    /// The user's addresses, newest first
    #[instrument(skip(self))]
    pub async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<AddressModel>, ServiceError> {
        let db = &*self.db_pool;

        let addresses = Address::find()
            .filter(AddressColumn::UserId.eq(user_id))
            .order_by_desc(AddressColumn::CreatedAt)
            .all(db)
            .await?;

        Ok(addresses)
    }
}
