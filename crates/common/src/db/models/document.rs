//! Document entity
//!
//! A document is a processed school file (newsletter, handbook, form) or a
//! resolution answer written back by an administrator. Only passages of
//! documents in the `ready` status are searchable.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document originated from a file upload
pub const SOURCE_UPLOAD: &str = "upload";

/// Document originated from a cluster resolution
pub const SOURCE_RESOLUTION: &str = "resolution";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub folder_id: Option<Uuid>,

    pub title: String,

    /// Reference to the uploaded file, if any
    #[sea_orm(column_type = "Text", nullable)]
    pub file_ref: Option<String>,

    /// "upload" or "resolution"
    pub source: String,

    /// pending | processing | ready | failed
    pub status: String,

    /// Raw text body for documents created without a file (resolutions).
    /// The processing pipeline chunks and embeds it.
    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::passage::Entity")]
    Passage,

    #[sea_orm(
        belongs_to = "super::folder::Entity",
        from = "Column::FolderId",
        to = "super::folder::Column::Id",
        on_delete = "SetNull"
    )]
    Folder,
}

impl Related<super::passage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Passage.def()
    }
}

impl Related<super::folder::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Folder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Processing status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl From<DocumentStatus> for String {
    fn from(status: DocumentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl Model {
    /// Whether this document's passages are searchable
    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready.as_str()
    }
}
