//! Cluster entity
//!
//! A persistent topic cluster of unanswered questions. The centroid is the
//! running mean of the member embeddings, maintained incrementally. A
//! cluster with question_count 0 is deleted, never left empty.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clusters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// AI-generated best-effort label; may lag membership changes
    #[sea_orm(column_type = "Text", nullable)]
    pub label: Option<String>,

    /// pgvector centroid stored as text for SeaORM compatibility
    #[sea_orm(column_type = "Text", nullable)]
    pub centroid: Option<String>,

    pub question_count: i32,

    pub priority_score: f64,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::unanswered_question::Entity")]
    UnansweredQuestion,
}

impl Related<super::unanswered_question::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UnansweredQuestion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse centroid from stored text format to Vec<f32>
    pub fn parse_centroid(&self) -> Option<Vec<f32>> {
        self.centroid.as_deref().and_then(super::parse_vector_text)
    }
}
