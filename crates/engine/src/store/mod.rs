//! Cluster persistence abstraction
//!
//! The assignment engine talks to a `ClusterStore` so the clustering
//! invariants can be exercised against the in-memory implementation while
//! production runs on Postgres. An assignment commit is atomic: the
//! question row and the cluster mutation land together or not at all.

mod memory;
mod postgres;

pub use memory::MemoryClusterStore;
pub use postgres::PgClusterStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use knowgap_common::errors::Result;
use uuid::Uuid;

/// Snapshot of one persistent cluster row
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub id: Uuid,
    pub label: Option<String>,
    pub centroid: Vec<f32>,
    pub question_count: i32,
    pub priority_score: f64,
    pub updated_at: DateTime<Utc>,
}

/// A question about to be recorded as unanswered
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub tenant_id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A stored unanswered question
#[derive(Debug, Clone)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
    pub cluster_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Where a new question lands, decided by the assignment engine
#[derive(Debug, Clone)]
pub enum Placement {
    /// Join an existing cluster with the precomputed incremental update
    Join {
        cluster_id: Uuid,
        new_centroid: Vec<f32>,
        new_count: i32,
    },
    /// Create a fresh cluster seeded with the question's own embedding
    Fresh,
}

/// Result of a committed assignment
#[derive(Debug, Clone)]
pub struct AssignmentRecord {
    pub question_id: Uuid,
    pub cluster_id: Uuid,
    pub created_cluster: bool,
    pub previous_count: i32,
    pub new_count: i32,
}

/// Result of removing one question
#[derive(Debug, Clone)]
pub struct RemovalRecord {
    pub cluster_id: Option<Uuid>,
    pub remaining_count: i32,
    pub cluster_deleted: bool,
}

/// Result of retiring a batch of questions during resolution
#[derive(Debug, Clone, Default)]
pub struct RetireRecord {
    pub questions_deleted: u64,
    pub clusters_deleted: Vec<Uuid>,
}

/// Persistence operations needed by the knowledge-gap engine
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// All clusters for a tenant (small: distinct unresolved topics)
    async fn list_clusters(&self, tenant_id: Uuid) -> Result<Vec<ClusterSnapshot>>;

    /// Atomically persist a question and its cluster placement
    async fn commit_assignment(
        &self,
        question: &NewQuestion,
        placement: &Placement,
        priority_score: f64,
    ) -> Result<AssignmentRecord>;

    /// Atomically delete a question, decrement its cluster, and delete the
    /// cluster when its count reaches zero. None when the question does not
    /// exist for this tenant.
    async fn remove_question(
        &self,
        tenant_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<RemovalRecord>>;

    /// Overwrite a cluster's centroid (exact recomputation path)
    async fn set_centroid(&self, cluster_id: Uuid, centroid: &[f32]) -> Result<()>;

    /// Set a cluster's label (best-effort, may lag membership)
    async fn set_label(&self, cluster_id: Uuid, label: &str) -> Result<()>;

    /// Member questions of a cluster, oldest first
    async fn member_questions(&self, cluster_id: Uuid) -> Result<Vec<QuestionRecord>>;

    /// Legacy questions without a persisted cluster assignment
    async fn orphan_questions(&self, tenant_id: Uuid) -> Result<Vec<QuestionRecord>>;

    /// Fetch questions by id, scoped to one tenant
    async fn questions_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<QuestionRecord>>;

    /// Atomically delete a batch of questions and retire emptied clusters
    async fn retire_questions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<RetireRecord>;
}
