//! Cluster selection
//!
//! Pure decision: compare a question embedding against every live
//! centroid and either join the best match or start a fresh cluster.

use crate::store::ClusterSnapshot;
use crate::vecmath::cosine_similarity;
use uuid::Uuid;

/// Outcome of comparing one embedding against the live centroids
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterChoice {
    Join { cluster_id: Uuid, similarity: f32 },
    Fresh,
}

/// Pick the cluster for a new question.
///
/// The best centroid wins when its similarity meets `assignment_threshold`.
/// Similarities within `tie_tolerance` of each other count as tied, and a
/// tie goes to the cluster with more members so near-duplicate topics
/// consolidate instead of splintering.
pub fn select_cluster(
    embedding: &[f32],
    clusters: &[ClusterSnapshot],
    assignment_threshold: f32,
    tie_tolerance: f32,
) -> ClusterChoice {
    let mut best: Option<(&ClusterSnapshot, f32)> = None;

    for cluster in clusters {
        let similarity = cosine_similarity(embedding, &cluster.centroid);
        if similarity < assignment_threshold {
            continue;
        }

        best = match best {
            None => Some((cluster, similarity)),
            Some((current, current_sim)) => {
                if similarity > current_sim + tie_tolerance {
                    Some((cluster, similarity))
                } else if (similarity - current_sim).abs() <= tie_tolerance
                    && cluster.question_count > current.question_count
                {
                    Some((cluster, similarity))
                } else {
                    Some((current, current_sim))
                }
            }
        };
    }

    match best {
        Some((cluster, similarity)) => ClusterChoice::Join {
            cluster_id: cluster.id,
            similarity,
        },
        None => ClusterChoice::Fresh,
    }
}
