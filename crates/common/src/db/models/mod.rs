//! SeaORM entity models
//!
//! Database entities for the Knowgap engine

mod cluster;
mod document;
mod folder;
mod passage;
mod tenant;
mod unanswered_question;

pub use cluster::{
    ActiveModel as ClusterActiveModel, Column as ClusterColumn, Entity as ClusterEntity,
    Model as Cluster,
};

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, DocumentStatus,
    Entity as DocumentEntity, Model as Document, SOURCE_RESOLUTION, SOURCE_UPLOAD,
};

pub use folder::{
    ActiveModel as FolderActiveModel, Column as FolderColumn, Entity as FolderEntity,
    Model as Folder, RESPONSES_FOLDER,
};

pub use passage::{
    ActiveModel as PassageActiveModel, Column as PassageColumn, Entity as PassageEntity,
    Model as Passage,
};

pub use tenant::{
    ActiveModel as TenantActiveModel, Column as TenantColumn, Entity as TenantEntity,
    Model as Tenant,
};

pub use unanswered_question::{
    ActiveModel as UnansweredQuestionActiveModel, Column as UnansweredQuestionColumn,
    Entity as UnansweredQuestionEntity, Model as UnansweredQuestion,
};

/// Parse a pgvector text column ("[1.0,2.0,...]") into a Vec<f32>
pub(crate) fn parse_vector_text(s: &str) -> Option<Vec<f32>> {
    let inner = s.trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}
