use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub request_id: Uuid,
    pub material_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub qty: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub qty_approved: Option<Decimal>,
}

impl Model {
    /// Quantity that moves through the ledger on ship and receive.
    pub fn effective_qty(&self) -> Decimal {
        self.qty_approved.unwrap_or(self.qty)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::request::Entity",
        from = "Column::RequestId",
        to = "super::request::Column::Id",
        on_delete = "Cascade"
    )]
    Request,
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Request.def()
    }
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(qty: Decimal, qty_approved: Option<Decimal>) -> Model {
        Model {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            qty,
            qty_approved,
        }
    }

    #[test]
    fn effective_qty_prefers_approved_quantity() {
        assert_eq!(item(dec!(10), Some(dec!(7))).effective_qty(), dec!(7));
        assert_eq!(item(dec!(10), Some(dec!(0))).effective_qty(), dec!(0));
        assert_eq!(item(dec!(10), None).effective_qty(), dec!(10));
    }
}
