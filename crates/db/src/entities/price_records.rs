//! `SeaORM` Entity for price_records table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "price_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub tier: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub amounts: Json,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))", nullable)]
    pub exchange_rate: Option<Decimal>,
    pub effective_from: DateTimeWithTimeZone,
    pub effective_to: Option<DateTimeWithTimeZone>,
    pub source: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub change_reason: Option<String>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::price_change_logs::Entity")]
    PriceChangeLogs,
}

impl Related<super::price_change_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceChangeLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
