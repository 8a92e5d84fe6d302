//! In-memory cluster store
//!
//! Backs the engine in tests and local development. Mutations take one
//! lock for the whole operation, mirroring the transactional behavior of
//! the Postgres store.

use super::{
    AssignmentRecord, ClusterSnapshot, ClusterStore, NewQuestion, Placement, QuestionRecord,
    RemovalRecord, RetireRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use knowgap_common::errors::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MemCluster {
    tenant_id: Uuid,
    label: Option<String>,
    centroid: Vec<f32>,
    question_count: i32,
    priority_score: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MemQuestion {
    tenant_id: Uuid,
    content: String,
    embedding: Vec<f32>,
    cluster_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    clusters: HashMap<Uuid, MemCluster>,
    questions: HashMap<Uuid, MemQuestion>,
}

/// In-memory implementation of the cluster store
#[derive(Default)]
pub struct MemoryClusterStore {
    state: Mutex<State>,
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a legacy question without a cluster assignment
    pub fn seed_orphan(&self, tenant_id: Uuid, content: &str, embedding: Vec<f32>) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().expect("memory store poisoned");
        state.questions.insert(
            id,
            MemQuestion {
                tenant_id,
                content: content.to_string(),
                embedding,
                cluster_id: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Number of clusters for a tenant
    pub fn cluster_count(&self, tenant_id: Uuid) -> usize {
        let state = self.state.lock().expect("memory store poisoned");
        state
            .clusters
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .count()
    }

    /// Sum of cluster question counts for a tenant
    pub fn question_count_sum(&self, tenant_id: Uuid) -> i64 {
        let state = self.state.lock().expect("memory store poisoned");
        state
            .clusters
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| c.question_count as i64)
            .sum()
    }

    /// Number of live questions with a cluster assignment for a tenant
    pub fn clustered_question_count(&self, tenant_id: Uuid) -> i64 {
        let state = self.state.lock().expect("memory store poisoned");
        state
            .questions
            .values()
            .filter(|q| q.tenant_id == tenant_id && q.cluster_id.is_some())
            .count() as i64
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn list_clusters(&self, tenant_id: Uuid) -> Result<Vec<ClusterSnapshot>> {
        let state = self.state.lock().expect("memory store poisoned");
        let mut snapshots: Vec<ClusterSnapshot> = state
            .clusters
            .iter()
            .filter(|(_, c)| c.tenant_id == tenant_id)
            .map(|(id, c)| ClusterSnapshot {
                id: *id,
                label: c.label.clone(),
                centroid: c.centroid.clone(),
                question_count: c.question_count,
                priority_score: c.priority_score,
                updated_at: c.updated_at,
            })
            .collect();

        snapshots.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(snapshots)
    }

    async fn commit_assignment(
        &self,
        question: &NewQuestion,
        placement: &Placement,
        priority_score: f64,
    ) -> Result<AssignmentRecord> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let now = Utc::now();
        let question_id = Uuid::new_v4();

        let record = match placement {
            Placement::Fresh => {
                let cluster_id = Uuid::new_v4();
                state.clusters.insert(
                    cluster_id,
                    MemCluster {
                        tenant_id: question.tenant_id,
                        label: None,
                        centroid: question.embedding.clone(),
                        question_count: 1,
                        priority_score,
                        updated_at: now,
                    },
                );
                AssignmentRecord {
                    question_id,
                    cluster_id,
                    created_cluster: true,
                    previous_count: 0,
                    new_count: 1,
                }
            }
            Placement::Join {
                cluster_id,
                new_centroid,
                new_count,
            } => {
                let cluster = state.clusters.get_mut(cluster_id).ok_or_else(|| {
                    knowgap_common::errors::AppError::ClusterNotFound {
                        id: cluster_id.to_string(),
                    }
                })?;
                cluster.centroid = new_centroid.clone();
                cluster.question_count = *new_count;
                cluster.priority_score = priority_score;
                cluster.updated_at = now;
                AssignmentRecord {
                    question_id,
                    cluster_id: *cluster_id,
                    created_cluster: false,
                    previous_count: new_count - 1,
                    new_count: *new_count,
                }
            }
        };

        state.questions.insert(
            question_id,
            MemQuestion {
                tenant_id: question.tenant_id,
                content: question.content.clone(),
                embedding: question.embedding.clone(),
                cluster_id: Some(record.cluster_id),
                created_at: now,
            },
        );

        Ok(record)
    }

    async fn remove_question(
        &self,
        tenant_id: Uuid,
        question_id: Uuid,
    ) -> Result<Option<RemovalRecord>> {
        let mut state = self.state.lock().expect("memory store poisoned");

        let Some(question) = state.questions.get(&question_id) else {
            return Ok(None);
        };
        if question.tenant_id != tenant_id {
            return Ok(None);
        }

        let cluster_id = question.cluster_id;
        state.questions.remove(&question_id);

        let record = match cluster_id {
            Some(cluster_id) => {
                let remaining = match state.clusters.get_mut(&cluster_id) {
                    Some(cluster) => {
                        cluster.question_count -= 1;
                        cluster.updated_at = Utc::now();
                        cluster.question_count
                    }
                    None => 0,
                };

                let cluster_deleted = remaining <= 0;
                if cluster_deleted {
                    state.clusters.remove(&cluster_id);
                }

                RemovalRecord {
                    cluster_id: Some(cluster_id),
                    remaining_count: remaining.max(0),
                    cluster_deleted,
                }
            }
            None => RemovalRecord {
                cluster_id: None,
                remaining_count: 0,
                cluster_deleted: false,
            },
        };

        Ok(Some(record))
    }

    async fn set_centroid(&self, cluster_id: Uuid, centroid: &[f32]) -> Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        if let Some(cluster) = state.clusters.get_mut(&cluster_id) {
            cluster.centroid = centroid.to_vec();
            cluster.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_label(&self, cluster_id: Uuid, label: &str) -> Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        if let Some(cluster) = state.clusters.get_mut(&cluster_id) {
            cluster.label = Some(label.to_string());
        }
        Ok(())
    }

    async fn member_questions(&self, cluster_id: Uuid) -> Result<Vec<QuestionRecord>> {
        let state = self.state.lock().expect("memory store poisoned");
        let mut members: Vec<QuestionRecord> = state
            .questions
            .iter()
            .filter(|(_, q)| q.cluster_id == Some(cluster_id))
            .map(|(id, q)| QuestionRecord {
                id: *id,
                content: q.content.clone(),
                embedding: q.embedding.clone(),
                cluster_id: q.cluster_id,
                created_at: q.created_at,
            })
            .collect();

        members.sort_by_key(|q| q.created_at);
        Ok(members)
    }

    async fn orphan_questions(&self, tenant_id: Uuid) -> Result<Vec<QuestionRecord>> {
        let state = self.state.lock().expect("memory store poisoned");
        let mut orphans: Vec<QuestionRecord> = state
            .questions
            .iter()
            .filter(|(_, q)| q.tenant_id == tenant_id && q.cluster_id.is_none())
            .map(|(id, q)| QuestionRecord {
                id: *id,
                content: q.content.clone(),
                embedding: q.embedding.clone(),
                cluster_id: None,
                created_at: q.created_at,
            })
            .collect();

        orphans.sort_by_key(|q| q.created_at);
        Ok(orphans)
    }

    async fn questions_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<QuestionRecord>> {
        let state = self.state.lock().expect("memory store poisoned");
        let records = ids
            .iter()
            .filter_map(|id| {
                let q = state.questions.get(id)?;
                if q.tenant_id != tenant_id {
                    return None;
                }
                Some(QuestionRecord {
                    id: *id,
                    content: q.content.clone(),
                    embedding: q.embedding.clone(),
                    cluster_id: q.cluster_id,
                    created_at: q.created_at,
                })
            })
            .collect();

        Ok(records)
    }

    async fn retire_questions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<RetireRecord> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let mut removed_per_cluster: HashMap<Uuid, i32> = HashMap::new();
        let mut questions_deleted = 0u64;

        for id in ids {
            let Some(question) = state.questions.get(id) else {
                continue;
            };
            if question.tenant_id != tenant_id {
                continue;
            }
            if let Some(cluster_id) = question.cluster_id {
                *removed_per_cluster.entry(cluster_id).or_insert(0) += 1;
            }
            state.questions.remove(id);
            questions_deleted += 1;
        }

        let mut clusters_deleted = Vec::new();
        for (cluster_id, removed) in removed_per_cluster {
            let remaining = match state.clusters.get_mut(&cluster_id) {
                Some(cluster) => {
                    cluster.question_count -= removed;
                    cluster.updated_at = Utc::now();
                    cluster.question_count
                }
                None => 0,
            };

            if remaining <= 0 {
                state.clusters.remove(&cluster_id);
                clusters_deleted.push(cluster_id);
            }
        }

        Ok(RetireRecord {
            questions_deleted,
            clusters_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(tenant_id: Uuid, embedding: Vec<f32>) -> NewQuestion {
        NewQuestion {
            tenant_id,
            content: "what time does aftercare close".into(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_fresh_then_remove_deletes_cluster() {
        let store = MemoryClusterStore::new();
        let tenant = Uuid::new_v4();

        let record = store
            .commit_assignment(&question(tenant, vec![1.0, 0.0]), &Placement::Fresh, 1.0)
            .await
            .unwrap();
        assert!(record.created_cluster);
        assert_eq!(store.cluster_count(tenant), 1);

        let removal = store
            .remove_question(tenant, record.question_id)
            .await
            .unwrap()
            .unwrap();
        assert!(removal.cluster_deleted);
        assert_eq!(removal.remaining_count, 0);
        assert_eq!(store.cluster_count(tenant), 0);
    }

    #[tokio::test]
    async fn test_remove_unknown_question() {
        let store = MemoryClusterStore::new();
        let removal = store
            .remove_question(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(removal.is_none());
    }

    #[tokio::test]
    async fn test_tenant_scoping_on_retire() {
        let store = MemoryClusterStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let record = store
            .commit_assignment(&question(tenant_a, vec![1.0, 0.0]), &Placement::Fresh, 1.0)
            .await
            .unwrap();

        // Wrong tenant deletes nothing
        let outcome = store
            .retire_questions(tenant_b, &[record.question_id])
            .await
            .unwrap();
        assert_eq!(outcome.questions_deleted, 0);
        assert_eq!(store.cluster_count(tenant_a), 1);
    }
}
