use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::product::{self, Column as ProductColumn, Entity as Product, Model as ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};

pub const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Vec<String>,
    pub price: Decimal,
    pub offer_price: Decimal,
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Write-boundary normalization of a new product: trimmed name, lowercased
/// category, prices rounded to cents.
#[derive(Debug, Clone, PartialEq)]
struct NormalizedProduct {
    name: String,
    price: Decimal,
    offer_price: Decimal,
    category: String,
}

fn normalize_new_product(request: &CreateProductRequest) -> Result<NormalizedProduct, ServiceError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(
            "Product name is required".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::ValidationError(format!(
            "Product name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if request.price < Decimal::ZERO || request.offer_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Prices must be non-negative".to_string(),
        ));
    }

    let price = request.price.round_dp(2);
    let offer_price = request.offer_price.round_dp(2);
    if offer_price > price {
        return Err(ServiceError::ValidationError(
            "Offer price cannot exceed price".to_string(),
        ));
    }

    let category = request.category.trim().to_lowercase();
    if category.is_empty() {
        return Err(ServiceError::ValidationError(
            "Category is required".to_string(),
        ));
    }

    Ok(NormalizedProduct {
        name,
        price,
        offer_price,
        category,
    })
}

/// Service for managing the product catalog
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    /// Creates a new catalog service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Create a new product
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductModel, ServiceError> {
        let normalized = normalize_new_product(&request)?;
        let db = &*self.db_pool;

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(normalized.name.clone()),
            description: Set(serde_json::json!(request.description)),
            price: Set(normalized.price),
            offer_price: Set(normalized.offer_price),
            images: Set(serde_json::json!(request.images)),
            category: Set(normalized.category),
            in_stock: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let created = model.insert(db).await?;

        info!(product_id = %created.id, name = %created.name, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        Ok(created)
    }

    /// Get a product by ID
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        let db = &*self.db_pool;

        Product::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// List products with pagination, newest first
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        limit: u64,
        category: Option<String>,
        in_stock: Option<bool>,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = Product::find();
        if let Some(category) = category {
            query = query.filter(ProductColumn::Category.eq(category.trim().to_lowercase()));
        }
        if let Some(in_stock) = in_stock {
            query = query.filter(ProductColumn::InStock.eq(in_stock));
        }

        let paginator = query
            .order_by_desc(ProductColumn::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((products, total))
    }

    /// List every product in a category, matched case-insensitively
    #[instrument(skip(self))]
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<ProductModel>, ServiceError> {
        let db = &*self.db_pool;

        let products = Product::find()
            .filter(ProductColumn::Category.eq(category.trim().to_lowercase()))
            .order_by_desc(ProductColumn::CreatedAt)
            .all(db)
            .await?;

        Ok(products)
    }

    /// Flip a product's stock flag
    #[instrument(skip(self))]
    pub async fn change_stock(
        &self,
        id: Uuid,
        in_stock: bool,
    ) -> Result<ProductModel, ServiceError> {
        let db = &*self.db_pool;

        let existing = Product::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let mut active: product::ActiveModel = existing.into();
        active.in_stock = Set(in_stock);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(db).await?;

        info!(product_id = %updated.id, in_stock = in_stock, "Product stock flag updated");
        self.event_sender
            .send_or_log(Event::ProductStockChanged {
                product_id: updated.id,
                in_stock,
            })
            .await;

        Ok(updated)
    }
}
