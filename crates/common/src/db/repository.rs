//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations with proper
//! error handling and transaction support. Cluster counter updates and
//! question writes always happen inside one transaction so an assignment
//! either fully completes or not at all.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Convert an embedding to the pgvector text format "[1.0,2.0,...]"
pub fn format_pgvector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// One passage returned from vector similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageHit {
    pub document_id: Uuid,
    pub document_title: String,
    pub content: String,
    pub chunk_index: i32,
    pub similarity: f32,
}

/// Outcome of removing a single question from its cluster
#[derive(Debug, Clone)]
pub struct QuestionRemoval {
    pub cluster_id: Option<Uuid>,
    pub remaining_count: i32,
    pub cluster_deleted: bool,
}

/// Outcome of retiring a batch of questions during resolution
#[derive(Debug, Clone, Default)]
pub struct RetireOutcome {
    pub questions_deleted: u64,
    pub clusters_deleted: Vec<Uuid>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Tenant Operations
    // ========================================================================

    /// Find tenant by ID
    pub async fn find_tenant_by_id(&self, id: Uuid) -> Result<Option<Tenant>> {
        TenantEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find tenant by API key hash
    pub async fn find_tenant_by_api_key_hash(&self, hash: &str) -> Result<Option<Tenant>> {
        TenantEntity::find()
            .filter(TenantColumn::ApiKeyHash.eq(hash))
            .filter(TenantColumn::IsActive.eq(true))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Passage Search
    // ========================================================================

    /// Vector similarity search over passages of ready documents,
    /// scoped to one tenant
    pub async fn passage_search(
        &self,
        tenant_id: Uuid,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<PassageHit>> {
        let embedding_str = format_pgvector(embedding);

        let sql = format!(
            r#"
            SELECT
                p.document_id,
                d.title as document_title,
                p.content,
                p.chunk_index,
                1 - (p.embedding <=> '{embedding}'::vector) as similarity
            FROM passages p
            INNER JOIN documents d ON p.document_id = d.id
            WHERE d.tenant_id = $1
              AND d.status = 'ready'
              AND p.embedding IS NOT NULL
              AND 1 - (p.embedding <=> '{embedding}'::vector) >= $2
            ORDER BY p.embedding <=> '{embedding}'::vector
            LIMIT $3
            "#,
            embedding = embedding_str
        );

        let rows = self
            .read_conn()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![
                    tenant_id.into(),
                    (min_similarity as f64).into(),
                    (limit as i64).into(),
                ],
            ))
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Passage search failed: {}", e),
            })?;

        let hits = rows
            .iter()
            .filter_map(|row| {
                Some(PassageHit {
                    document_id: row.try_get("", "document_id").ok()?,
                    document_title: row.try_get("", "document_title").ok()?,
                    content: row.try_get("", "content").ok()?,
                    chunk_index: row.try_get("", "chunk_index").ok()?,
                    similarity: row.try_get::<f64>("", "similarity").ok()? as f32,
                })
            })
            .collect();

        Ok(hits)
    }

    // ========================================================================
    // Folder & Document Operations
    // ========================================================================

    /// Find a folder by name, creating it when missing
    pub async fn ensure_folder(&self, tenant_id: Uuid, name: &str) -> Result<Folder> {
        let existing = FolderEntity::find()
            .filter(FolderColumn::TenantId.eq(tenant_id))
            .filter(FolderColumn::Name.eq(name))
            .one(self.write_conn())
            .await?;

        if let Some(folder) = existing {
            return Ok(folder);
        }

        let folder = FolderActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(name.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        folder.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Create a new document
    pub async fn create_document(
        &self,
        tenant_id: Uuid,
        folder_id: Option<Uuid>,
        title: String,
        source: &str,
        status: DocumentStatus,
        content: Option<String>,
    ) -> Result<Document> {
        let now = chrono::Utc::now();

        let document = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            folder_id: Set(folder_id),
            title: Set(title),
            file_ref: Set(None),
            source: Set(source.to_string()),
            status: Set(status.into()),
            content: Set(content),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find document by ID
    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Cluster Operations
    // ========================================================================

    /// List all clusters for a tenant (expected to be small - tens, not
    /// millions, since clusters represent distinct unresolved topics)
    pub async fn list_clusters(&self, tenant_id: Uuid) -> Result<Vec<Cluster>> {
        ClusterEntity::find()
            .filter(ClusterColumn::TenantId.eq(tenant_id))
            .order_by_desc(ClusterColumn::PriorityScore)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find cluster by ID
    pub async fn find_cluster_by_id(&self, id: Uuid) -> Result<Option<Cluster>> {
        ClusterEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Insert a question and create a fresh cluster for it, atomically.
    /// Returns (question_id, cluster_id).
    pub async fn insert_question_with_new_cluster(
        &self,
        tenant_id: Uuid,
        content: &str,
        embedding: &[f32],
        priority_score: f64,
    ) -> Result<(Uuid, Uuid)> {
        let question_id = Uuid::new_v4();
        let cluster_id = Uuid::new_v4();
        let embedding_str = format_pgvector(embedding);

        let txn = self.write_conn().begin().await?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO clusters (
                id, tenant_id, label, centroid, question_count,
                priority_score, created_at, updated_at
            )
            VALUES ($1, $2, NULL, $3::vector, 1, $4, NOW(), NOW())
            "#,
            vec![
                cluster_id.into(),
                tenant_id.into(),
                embedding_str.clone().into(),
                priority_score.into(),
            ],
        ))
        .await?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO unanswered_questions (
                id, tenant_id, content, embedding, cluster_id, created_at
            )
            VALUES ($1, $2, $3, $4::vector, $5, NOW())
            "#,
            vec![
                question_id.into(),
                tenant_id.into(),
                content.into(),
                embedding_str.into(),
                cluster_id.into(),
            ],
        ))
        .await?;

        txn.commit().await?;

        Ok((question_id, cluster_id))
    }

    /// Insert a question into an existing cluster and apply the incremental
    /// centroid/count/priority update, atomically. Returns the question id.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_question_into_cluster(
        &self,
        tenant_id: Uuid,
        content: &str,
        embedding: &[f32],
        cluster_id: Uuid,
        new_centroid: &[f32],
        new_count: i32,
        priority_score: f64,
    ) -> Result<Uuid> {
        let question_id = Uuid::new_v4();

        let txn = self.write_conn().begin().await?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE clusters
            SET centroid = $2::vector,
                question_count = $3,
                priority_score = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
            vec![
                cluster_id.into(),
                format_pgvector(new_centroid).into(),
                new_count.into(),
                priority_score.into(),
            ],
        ))
        .await?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO unanswered_questions (
                id, tenant_id, content, embedding, cluster_id, created_at
            )
            VALUES ($1, $2, $3, $4::vector, $5, NOW())
            "#,
            vec![
                question_id.into(),
                tenant_id.into(),
                content.into(),
                format_pgvector(embedding).into(),
                cluster_id.into(),
            ],
        ))
        .await?;

        txn.commit().await?;

        Ok(question_id)
    }

    /// Delete a question and decrement its cluster count, deleting the
    /// cluster when the count reaches zero. Returns None when the question
    /// does not exist for this tenant.
    pub async fn delete_question_and_decrement(
        &self,
        tenant_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<QuestionRemoval>> {
        let txn = self.write_conn().begin().await?;

        let question = UnansweredQuestionEntity::find_by_id(question_id)
            .filter(UnansweredQuestionColumn::TenantId.eq(tenant_id))
            .one(&txn)
            .await?;

        let Some(question) = question else {
            txn.rollback().await?;
            return Ok(None);
        };

        UnansweredQuestionEntity::delete_by_id(question_id)
            .exec(&txn)
            .await?;

        let removal = match question.cluster_id {
            Some(cluster_id) => {
                let row = txn
                    .query_one(Statement::from_sql_and_values(
                        DbBackend::Postgres,
                        r#"
                        UPDATE clusters
                        SET question_count = question_count - 1,
                            updated_at = NOW()
                        WHERE id = $1
                        RETURNING question_count
                        "#,
                        vec![cluster_id.into()],
                    ))
                    .await?;

                let remaining: i32 = row
                    .and_then(|r| r.try_get("", "question_count").ok())
                    .unwrap_or(0);

                let cluster_deleted = remaining <= 0;
                if cluster_deleted {
                    ClusterEntity::delete_by_id(cluster_id).exec(&txn).await?;
                }

                QuestionRemoval {
                    cluster_id: Some(cluster_id),
                    remaining_count: remaining.max(0),
                    cluster_deleted,
                }
            }
            None => QuestionRemoval {
                cluster_id: None,
                remaining_count: 0,
                cluster_deleted: false,
            },
        };

        txn.commit().await?;

        Ok(Some(removal))
    }

    /// Overwrite a cluster's centroid (exact recomputation path)
    pub async fn update_cluster_centroid(
        &self,
        cluster_id: Uuid,
        centroid: &[f32],
    ) -> Result<()> {
        self.write_conn()
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "UPDATE clusters SET centroid = $2::vector, updated_at = NOW() WHERE id = $1",
                vec![cluster_id.into(), format_pgvector(centroid).into()],
            ))
            .await?;
        Ok(())
    }

    /// Set a cluster's label
    pub async fn update_cluster_label(&self, cluster_id: Uuid, label: &str) -> Result<()> {
        self.write_conn()
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "UPDATE clusters SET label = $2 WHERE id = $1",
                vec![cluster_id.into(), label.into()],
            ))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Question Operations
    // ========================================================================

    /// Get the member questions of a cluster
    pub async fn member_questions(&self, cluster_id: Uuid) -> Result<Vec<UnansweredQuestion>> {
        UnansweredQuestionEntity::find()
            .filter(UnansweredQuestionColumn::ClusterId.eq(cluster_id))
            .order_by_asc(UnansweredQuestionColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Legacy questions without a persisted cluster assignment
    pub async fn orphan_questions(&self, tenant_id: Uuid) -> Result<Vec<UnansweredQuestion>> {
        UnansweredQuestionEntity::find()
            .filter(UnansweredQuestionColumn::TenantId.eq(tenant_id))
            .filter(UnansweredQuestionColumn::ClusterId.is_null())
            .order_by_asc(UnansweredQuestionColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Fetch a set of questions by id, scoped to one tenant
    pub async fn questions_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<UnansweredQuestion>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        UnansweredQuestionEntity::find()
            .filter(UnansweredQuestionColumn::TenantId.eq(tenant_id))
            .filter(UnansweredQuestionColumn::Id.is_in(ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a batch of questions and retire clusters whose count reaches
    /// zero, atomically. Used by the resolution workflow.
    pub async fn retire_questions(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<RetireOutcome> {
        if ids.is_empty() {
            return Ok(RetireOutcome::default());
        }

        let txn = self.write_conn().begin().await?;

        let questions = UnansweredQuestionEntity::find()
            .filter(UnansweredQuestionColumn::TenantId.eq(tenant_id))
            .filter(UnansweredQuestionColumn::Id.is_in(ids.to_vec()))
            .all(&txn)
            .await?;

        let delete_result = UnansweredQuestionEntity::delete_many()
            .filter(UnansweredQuestionColumn::TenantId.eq(tenant_id))
            .filter(UnansweredQuestionColumn::Id.is_in(ids.to_vec()))
            .exec(&txn)
            .await?;

        // Per-cluster removal counts
        let mut removed_per_cluster: std::collections::HashMap<Uuid, i32> =
            std::collections::HashMap::new();
        for question in &questions {
            if let Some(cluster_id) = question.cluster_id {
                *removed_per_cluster.entry(cluster_id).or_insert(0) += 1;
            }
        }

        let mut clusters_deleted = Vec::new();
        for (cluster_id, removed) in removed_per_cluster {
            let row = txn
                .query_one(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    r#"
                    UPDATE clusters
                    SET question_count = question_count - $2,
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING question_count
                    "#,
                    vec![cluster_id.into(), removed.into()],
                ))
                .await?;

            let remaining: i32 = row
                .and_then(|r| r.try_get("", "question_count").ok())
                .unwrap_or(0);

            if remaining <= 0 {
                ClusterEntity::delete_by_id(cluster_id).exec(&txn).await?;
                clusters_deleted.push(cluster_id);
            }
        }

        txn.commit().await?;

        Ok(RetireOutcome {
            questions_deleted: delete_result.rows_affected,
            clusters_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pgvector() {
        assert_eq!(format_pgvector(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(format_pgvector(&[]), "[]");
    }
}
