use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A placed order. The item list, amount and address are immutable after
/// creation; corrections require a new order. Reconciliation only ever flips
/// `is_paid` from false to true, never back.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,
    pub address_id: Uuid,

    /// Total charged amount in major currency units, computed once at placement
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub amount: Decimal,

    pub payment_type: PaymentType,

    /// COD orders remain unpaid here; payment is collected at delivery
    pub is_paid: bool,

    /// External gateway session identifier; present whenever payment_type != COD
    pub payment_id: Option<String>,

    pub status: OrderStatus,

    /// Reconciled payment details, recorded by verification
    pub payment_method: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub amount_paid: Option<Decimal>,
    pub paid_currency: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::AddressId",
        to = "super::address::Column::Id"
    )]
    Address,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Address.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment type enumeration. Serde renames keep the JSON strings identical to
/// the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentType {
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD")]
    Cod,
    #[sea_orm(string_value = "ONLINE")]
    #[serde(rename = "ONLINE")]
    Online,
    /// Stored-balance payments recorded by an external flow; nothing in this
    /// service creates one, but visibility rules treat it like Online
    #[sea_orm(string_value = "WALLET")]
    #[serde(rename = "WALLET")]
    Wallet,
}

/// Order status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "ORDER PLACED")]
    #[serde(rename = "ORDER PLACED")]
    OrderPlaced,
    #[sea_orm(string_value = "PROCESSING")]
    #[serde(rename = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SHIPPED")]
    #[serde(rename = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    #[serde(rename = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELLED")]
    #[serde(rename = "CANCELLED")]
    Cancelled,
}
