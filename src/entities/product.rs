use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};

/// Product entity for the catalog
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product name
    pub name: String,

    /// Description paragraphs, stored as a JSON array of strings
    #[sea_orm(column_type = "Json")]
    pub description: Json,

    /// List price
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,

    /// The actual sale price charged to buyers; never exceeds `price`
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub offer_price: Decimal,

    /// Image references, stored as a JSON array of strings
    #[sea_orm(column_type = "Json")]
    pub images: Json,

    /// Stored lowercased so category lookups are case-insensitive
    pub category: String,

    pub in_stock: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let active_model = self;

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        // Pricing invariants hold at every write, not just the service layer
        if model.price < Decimal::ZERO || model.offer_price < Decimal::ZERO {
            return Err(DbErr::Custom(
                "Validation error: product prices cannot be negative".to_string(),
            ));
        }
        if model.offer_price > model.price {
            return Err(DbErr::Custom(
                "Validation error: offer price cannot exceed list price".to_string(),
            ));
        }

        Ok(active_model)
    }
}
