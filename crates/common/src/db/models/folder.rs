//! Folder entity
//!
//! Documents are grouped into named folders per tenant. The resolution
//! workflow writes answers into a dedicated "Responses" folder.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Folder that receives resolution answer documents
pub const RESPONSES_FOLDER: &str = "Responses";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "folders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Unique per tenant
    pub name: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document::Entity")]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
