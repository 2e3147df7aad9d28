use sea_orm::entity::prelude::*;
use sea_orm::sea_query::ForeignKeyAction;

use super::{cat, target};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "missions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub completed: bool,
    pub cat_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// A mission is active until its last target is completed.
    pub fn is_active(&self) -> bool {
        !self.completed
    }
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Cat,
    Target,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            // Deleting a cat leaves its missions unassigned.
            Self::Cat => Entity::belongs_to(cat::Entity)
                .from(Column::CatId)
                .to(cat::Column::Id)
                .on_delete(ForeignKeyAction::SetNull)
                .into(),
            Self::Target => Entity::has_many(target::Entity).into(),
        }
    }
}

impl Related<cat::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cat.def()
    }
}

impl Related<target::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Target.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
