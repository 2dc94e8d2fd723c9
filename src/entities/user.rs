use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Buyer account. The cart lives here: a sparse mapping from product id to a
/// strictly positive quantity. A quantity of zero is never stored; the entry
/// is removed instead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Cart mapping, stored as a JSON object of product id -> quantity
    #[sea_orm(column_type = "Json")]
    pub cart_items: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
    #[sea_orm(has_many = "super::address::Entity")]
    Addresses,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl Related<super::address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Addresses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decodes the stored cart JSON into a typed mapping.
    pub fn cart_map(&self) -> Result<BTreeMap<Uuid, i64>, serde_json::Error> {
        serde_json::from_value(self.cart_items.clone())
    }
}

/// Serializes a typed cart mapping into the stored JSON form. Entries with a
/// non-positive quantity are dropped here so nothing below this boundary can
/// store them.
pub fn cart_to_json(cart: &BTreeMap<Uuid, i64>) -> Json {
    let positive: BTreeMap<&Uuid, &i64> =
        cart.iter().filter(|(_, qty)| **qty > 0).collect();
    serde_json::to_value(&positive).unwrap_or_else(|_| serde_json::json!({}))
}

/// An empty cart in its stored JSON form.
pub fn empty_cart() -> Json {
    serde_json::json!({})
}
