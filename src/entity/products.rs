use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: String,
    pub price: i64,
    pub purchase_price: i64,
    pub stock: i32,
    /// JSON array of image URLs.
    pub images: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::wish_items::Entity")]
    WishItems,
    #[sea_orm(has_many = "super::cart_items::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::offer_products::Entity")]
    OfferProducts,
}

impl Related<super::wish_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WishItems.def()
    }
}

impl Related<super::cart_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::offers::Entity> for Entity {
    fn to() -> RelationDef {
        super::offer_products::Relation::Offers.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::offer_products::Relation::Products.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
