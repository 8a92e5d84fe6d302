//! Online clustering of unanswered questions
//!
//! Single-pass assignment against live centroids, monotonic priority
//! scoring with edge-triggered alert boundaries, batch grouping for
//! legacy orphans, and best-effort AI labels.

mod assign;
mod centroid;
mod label;
mod orphan;
mod priority;

pub use assign::{select_cluster, ClusterChoice};
pub use centroid::{create_centroid_policy, ApproximateCentroid, CentroidPolicy, ExactCentroid};
pub use label::{create_labeler, fallback_label, ClusterLabeler, OpenAiLabeler};
pub use orphan::{group_orphans, OrphanGroup};
pub use priority::{priority_score, ThresholdMonitor};
