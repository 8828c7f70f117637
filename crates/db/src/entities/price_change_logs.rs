//! `SeaORM` Entity for price_change_logs table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "price_change_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub price_record_id: Uuid,
    pub product_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub tier: String,
    pub currency: String,
    pub change_type: String,
    #[sea_orm(column_type = "Decimal(None)", nullable)]
    pub old_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(None)", nullable)]
    pub new_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(None)")]
    pub delta: Decimal,
    #[sea_orm(column_type = "Decimal(None)", nullable)]
    pub delta_percentage: Option<Decimal>,
    pub old_effective_from: Option<DateTimeWithTimeZone>,
    pub old_effective_to: Option<DateTimeWithTimeZone>,
    pub new_effective_from: Option<DateTimeWithTimeZone>,
    pub new_effective_to: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::price_records::Entity",
        from = "Column::PriceRecordId",
        to = "super::price_records::Column::Id"
    )]
    PriceRecords,
}

impl Related<super::price_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
