//! Centroid maintenance on question removal
//!
//! Removing a member invalidates a running-mean centroid. The cheap
//! policy accepts the drift; the exact policy re-averages the surviving
//! members' embeddings.

use crate::store::ClusterStore;
use crate::vecmath::mean;
use async_trait::async_trait;
use knowgap_common::errors::Result;
use std::sync::Arc;
use uuid::Uuid;

/// How a cluster's centroid is repaired after a member is removed
#[async_trait]
pub trait CentroidPolicy: Send + Sync {
    async fn repair(&self, store: &dyn ClusterStore, cluster_id: Uuid) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Leave the stale centroid in place. One removal barely moves the mean
/// and later assignments keep folding corrections in.
pub struct ApproximateCentroid;

#[async_trait]
impl CentroidPolicy for ApproximateCentroid {
    async fn repair(&self, _store: &dyn ClusterStore, _cluster_id: Uuid) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "approximate"
    }
}

/// Recompute the centroid as the exact mean of the surviving members
pub struct ExactCentroid;

#[async_trait]
impl CentroidPolicy for ExactCentroid {
    async fn repair(&self, store: &dyn ClusterStore, cluster_id: Uuid) -> Result<()> {
        let members = store.member_questions(cluster_id).await?;
        let embeddings: Vec<Vec<f32>> = members
            .into_iter()
            .map(|q| q.embedding)
            .filter(|e| !e.is_empty())
            .collect();

        if let Some(centroid) = mean(&embeddings) {
            store.set_centroid(cluster_id, &centroid).await?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Policy from its configured name. Unknown names fall back to
/// approximate with a warning.
pub fn create_centroid_policy(name: &str) -> Arc<dyn CentroidPolicy> {
    match name {
        "exact" => Arc::new(ExactCentroid),
        "approximate" => Arc::new(ApproximateCentroid),
        other => {
            tracing::warn!(policy = other, "Unknown centroid policy, using approximate");
            Arc::new(ApproximateCentroid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryClusterStore, NewQuestion, Placement};
    use crate::vecmath::running_mean;

    fn question(tenant: Uuid, content: &str, embedding: Vec<f32>) -> NewQuestion {
        NewQuestion {
            tenant_id: tenant,
            content: content.into(),
            embedding,
        }
    }

    async fn seed_cluster(store: &MemoryClusterStore, tenant: Uuid) -> (Uuid, Uuid) {
        let first = store
            .commit_assignment(&question(tenant, "a", vec![1.0, 0.0]), &Placement::Fresh, 1.0)
            .await
            .unwrap();

        let centroid = running_mean(&[1.0, 0.0], 1, &[0.0, 1.0]);
        let second = store
            .commit_assignment(
                &question(tenant, "b", vec![0.0, 1.0]),
                &Placement::Join {
                    cluster_id: first.cluster_id,
                    new_centroid: centroid,
                    new_count: 2,
                },
                2.0,
            )
            .await
            .unwrap();

        (first.cluster_id, second.question_id)
    }

    #[tokio::test]
    async fn test_exact_policy_reaverages_survivors() {
        let store = MemoryClusterStore::new();
        let tenant = Uuid::new_v4();
        let (cluster_id, second_question) = seed_cluster(&store, tenant).await;

        store.remove_question(tenant, second_question).await.unwrap();
        ExactCentroid.repair(&store, cluster_id).await.unwrap();

        let clusters = store.list_clusters(tenant).await.unwrap();
        assert_eq!(clusters[0].centroid, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_approximate_policy_leaves_centroid() {
        let store = MemoryClusterStore::new();
        let tenant = Uuid::new_v4();
        let (cluster_id, second_question) = seed_cluster(&store, tenant).await;

        store.remove_question(tenant, second_question).await.unwrap();
        ApproximateCentroid.repair(&store, cluster_id).await.unwrap();

        let clusters = store.list_clusters(tenant).await.unwrap();
        assert_eq!(clusters[0].centroid, vec![0.5, 0.5]);
    }

    #[test]
    fn test_policy_factory() {
        assert_eq!(create_centroid_policy("exact").name(), "exact");
        assert_eq!(create_centroid_policy("approximate").name(), "approximate");
        assert_eq!(create_centroid_policy("bogus").name(), "approximate");
    }
}
