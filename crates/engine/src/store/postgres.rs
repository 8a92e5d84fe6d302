//! Postgres-backed cluster store
//!
//! Thin adapter over the shared repository. All multi-row mutations run
//! inside repository transactions.

use super::{
    AssignmentRecord, ClusterSnapshot, ClusterStore, NewQuestion, Placement, QuestionRecord,
    RemovalRecord, RetireRecord,
};
use async_trait::async_trait;
use knowgap_common::db::Repository;
use knowgap_common::errors::Result;
use uuid::Uuid;

/// Cluster store over the shared Postgres repository
#[derive(Clone)]
pub struct PgClusterStore {
    repo: Repository,
}

impl PgClusterStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

fn question_record(model: knowgap_common::db::models::UnansweredQuestion) -> QuestionRecord {
    let embedding = model.parse_embedding().unwrap_or_default();
    QuestionRecord {
        id: model.id,
        content: model.content,
        embedding,
        cluster_id: model.cluster_id,
        created_at: model.created_at.into(),
    }
}

#[async_trait]
impl ClusterStore for PgClusterStore {
    async fn list_clusters(&self, tenant_id: Uuid) -> Result<Vec<ClusterSnapshot>> {
        let clusters = self.repo.list_clusters(tenant_id).await?;

        let snapshots = clusters
            .into_iter()
            .filter_map(|cluster| {
                let Some(centroid) = cluster.parse_centroid() else {
                    tracing::warn!(
                        cluster_id = %cluster.id,
                        "Cluster has an unparseable centroid, skipping"
                    );
                    return None;
                };
                Some(ClusterSnapshot {
                    id: cluster.id,
                    label: cluster.label,
                    centroid,
                    question_count: cluster.question_count,
                    priority_score: cluster.priority_score,
                    updated_at: cluster.updated_at.into(),
                })
            })
            .collect();

        Ok(snapshots)
    }

    async fn commit_assignment(
        &self,
        question: &NewQuestion,
        placement: &Placement,
        priority_score: f64,
    ) -> Result<AssignmentRecord> {
        match placement {
            Placement::Fresh => {
                let (question_id, cluster_id) = self
                    .repo
                    .insert_question_with_new_cluster(
                        question.tenant_id,
                        &question.content,
                        &question.embedding,
                        priority_score,
                    )
                    .await?;

                Ok(AssignmentRecord {
                    question_id,
                    cluster_id,
                    created_cluster: true,
                    previous_count: 0,
                    new_count: 1,
                })
            }
            Placement::Join {
                cluster_id,
                new_centroid,
                new_count,
            } => {
                let question_id = self
                    .repo
                    .insert_question_into_cluster(
                        question.tenant_id,
                        &question.content,
                        &question.embedding,
                        *cluster_id,
                        new_centroid,
                        *new_count,
                        priority_score,
                    )
                    .await?;

                Ok(AssignmentRecord {
                    question_id,
                    cluster_id: *cluster_id,
                    created_cluster: false,
                    previous_count: new_count - 1,
                    new_count: *new_count,
                })
            }
        }
    }

    async fn remove_question(
        &self,
        tenant_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<RemovalRecord>> {
        let removal = self
            .repo
            .delete_question_and_decrement(tenant_id, question_id)
            .await?;

        Ok(removal.map(|r| RemovalRecord {
            cluster_id: r.cluster_id,
            remaining_count: r.remaining_count,
            cluster_deleted: r.cluster_deleted,
        }))
    }

    async fn set_centroid(&self, cluster_id: Uuid, centroid: &[f32]) -> Result<()> {
        self.repo.update_cluster_centroid(cluster_id, centroid).await
    }

    async fn set_label(&self, cluster_id: Uuid, label: &str) -> Result<()> {
        self.repo.update_cluster_label(cluster_id, label).await
    }

    async fn member_questions(&self, cluster_id: Uuid) -> Result<Vec<QuestionRecord>> {
        let questions = self.repo.member_questions(cluster_id).await?;
        Ok(questions.into_iter().map(question_record).collect())
    }

    async fn orphan_questions(&self, tenant_id: Uuid) -> Result<Vec<QuestionRecord>> {
        let questions = self.repo.orphan_questions(tenant_id).await?;
        Ok(questions.into_iter().map(question_record).collect())
    }

    async fn questions_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<QuestionRecord>> {
        let questions = self.repo.questions_by_ids(tenant_id, ids).await?;
        Ok(questions.into_iter().map(question_record).collect())
    }

    async fn retire_questions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<RetireRecord> {
        let outcome = self.repo.retire_questions(tenant_id, ids).await?;
        Ok(RetireRecord {
            questions_deleted: outcome.questions_deleted,
            clusters_deleted: outcome.clusters_deleted,
        })
    }
}
