//! Knowledge-gap engine
//!
//! Orchestrates the unanswered-question path: embed, assign to a live
//! cluster or open a new one, persist atomically, then fire any alert
//! boundaries the count crossed. Also owns dismissal, orphan grouping,
//! labeling, and the read-side cluster listing.

use crate::cluster::{
    fallback_label, group_orphans, priority_score, select_cluster, CentroidPolicy, ClusterChoice,
    ClusterLabeler, OrphanGroup, ThresholdMonitor,
};
use crate::hooks::AlertChannel;
use crate::store::{ClusterStore, NewQuestion, Placement, RemovalRecord};
use crate::vecmath::running_mean;
use chrono::{DateTime, Utc};
use knowgap_common::config::ClusteringConfig;
use knowgap_common::embeddings::Embedder;
use knowgap_common::errors::{AppError, Result};
use knowgap_common::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Outcome of recording one unanswered question
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub question_id: Uuid,
    pub cluster_id: Uuid,
    pub created_cluster: bool,
    pub question_count: i32,
    /// Alert boundaries this assignment crossed upward
    pub crossed_boundaries: Vec<u32>,
}

/// Read-side view of a cluster with its effective priority
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub id: Uuid,
    pub label: Option<String>,
    pub question_count: i32,
    pub priority_score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Controls how concurrent assignments for one tenant interleave.
///
/// `Concurrent` accepts a bounded race: two near-identical questions
/// arriving together may open duplicate clusters, which later assignments
/// and the orphan view tolerate. `PerTenant` serializes assignments per
/// tenant and removes the race at the cost of throughput.
pub enum AssignmentGuard {
    Concurrent,
    PerTenant(Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>),
}

impl AssignmentGuard {
    pub fn from_config(serialize_assignments: bool) -> Self {
        if serialize_assignments {
            Self::PerTenant(Mutex::new(HashMap::new()))
        } else {
            Self::Concurrent
        }
    }

    async fn acquire(&self, tenant_id: Uuid) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        match self {
            Self::Concurrent => None,
            Self::PerTenant(locks) => {
                let lock = {
                    let mut map = locks.lock().expect("guard map poisoned");
                    map.entry(tenant_id)
                        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                        .clone()
                };
                Some(lock.lock_owned().await)
            }
        }
    }
}

/// The engine behind the unanswered-question lifecycle
pub struct GapEngine {
    store: Arc<dyn ClusterStore>,
    embedder: Arc<dyn Embedder>,
    labeler: Option<Arc<dyn ClusterLabeler>>,
    alerts: Arc<dyn AlertChannel>,
    centroid_policy: Arc<dyn CentroidPolicy>,
    guard: AssignmentGuard,
    config: ClusteringConfig,
    max_label_chars: usize,
}

impl GapEngine {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        embedder: Arc<dyn Embedder>,
        labeler: Option<Arc<dyn ClusterLabeler>>,
        alerts: Arc<dyn AlertChannel>,
        centroid_policy: Arc<dyn CentroidPolicy>,
        config: ClusteringConfig,
        max_label_chars: usize,
    ) -> Self {
        let guard = AssignmentGuard::from_config(config.serialize_assignments);
        Self {
            store,
            embedder,
            labeler,
            alerts,
            centroid_policy,
            guard,
            config,
            max_label_chars,
        }
    }

    /// Record an unanswered question: embed it, then assign.
    ///
    /// `boundary_override` replaces the configured alert boundaries when a
    /// tenant carries its own list.
    pub async fn record_unanswered(
        &self,
        tenant_id: Uuid,
        content: &str,
        boundary_override: Option<Vec<u32>>,
    ) -> Result<Assignment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation {
                message: "Question content cannot be empty".into(),
                field: Some("content".into()),
            });
        }

        let embedding = self.embedder.embed(content).await?;
        self.assign_embedded(tenant_id, content, embedding, boundary_override)
            .await
    }

    /// Assign a pre-embedded question to a cluster and fire alerts.
    pub async fn assign_embedded(
        &self,
        tenant_id: Uuid,
        content: &str,
        embedding: Vec<f32>,
        boundary_override: Option<Vec<u32>>,
    ) -> Result<Assignment> {
        let _guard = self.guard.acquire(tenant_id).await;

        let clusters = self.store.list_clusters(tenant_id).await?;
        let choice = select_cluster(
            &embedding,
            &clusters,
            self.config.assignment_threshold,
            self.config.tie_tolerance,
        );

        let now = Utc::now();
        let placement = match &choice {
            ClusterChoice::Fresh => Placement::Fresh,
            ClusterChoice::Join { cluster_id, .. } => {
                let cluster = clusters
                    .iter()
                    .find(|c| c.id == *cluster_id)
                    .ok_or_else(|| AppError::ClusterNotFound {
                        id: cluster_id.to_string(),
                    })?;
                Placement::Join {
                    cluster_id: *cluster_id,
                    new_centroid: running_mean(
                        &cluster.centroid,
                        cluster.question_count,
                        &embedding,
                    ),
                    new_count: cluster.question_count + 1,
                }
            }
        };

        let new_count = match &placement {
            Placement::Fresh => 1,
            Placement::Join { new_count, .. } => *new_count,
        };
        let score = priority_score(
            new_count,
            now,
            now,
            self.config.recency_boost_weight,
            self.config.recency_half_life_hours,
        );

        let question = NewQuestion {
            tenant_id,
            content: content.to_string(),
            embedding,
        };
        let record = self.store.commit_assignment(&question, &placement, score).await?;

        metrics::record_assignment(&tenant_id.to_string(), record.created_cluster);
        tracing::info!(
            tenant_id = %tenant_id,
            cluster_id = %record.cluster_id,
            created_cluster = record.created_cluster,
            question_count = record.new_count,
            "Recorded unanswered question"
        );

        let monitor = self.monitor(boundary_override);
        let crossed = monitor.crossings(record.previous_count, record.new_count);
        let mut crossed_boundaries = Vec::with_capacity(crossed.len());
        for boundary in crossed {
            let boundary = boundary as u32;
            crossed_boundaries.push(boundary);
            metrics::record_alert(&tenant_id.to_string(), boundary);
            if let Err(e) = self.alerts.notify(tenant_id, record.cluster_id, boundary).await {
                tracing::error!(
                    tenant_id = %tenant_id,
                    cluster_id = %record.cluster_id,
                    boundary = boundary,
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }

        Ok(Assignment {
            question_id: record.question_id,
            cluster_id: record.cluster_id,
            created_cluster: record.created_cluster,
            question_count: record.new_count,
            crossed_boundaries,
        })
    }

    /// Dismiss a question. Deletes emptied clusters and repairs the
    /// centroid of surviving ones per the configured policy.
    pub async fn dismiss_question(
        &self,
        tenant_id: Uuid,
        question_id: Uuid,
    ) -> Result<RemovalRecord> {
        let removal = self
            .store
            .remove_question(tenant_id, question_id)
            .await?
            .ok_or_else(|| AppError::QuestionNotFound {
                id: question_id.to_string(),
            })?;

        if let Some(cluster_id) = removal.cluster_id {
            if !removal.cluster_deleted {
                self.centroid_policy.repair(self.store.as_ref(), cluster_id).await?;
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            question_id = %question_id,
            cluster_deleted = removal.cluster_deleted,
            "Dismissed unanswered question"
        );

        Ok(removal)
    }

    /// Clusters for review, re-scored at read time so recency decays
    /// between writes, ordered by effective priority.
    pub async fn live_clusters(&self, tenant_id: Uuid) -> Result<Vec<ClusterView>> {
        let now = Utc::now();
        let mut views: Vec<ClusterView> = self
            .store
            .list_clusters(tenant_id)
            .await?
            .into_iter()
            .map(|c| ClusterView {
                id: c.id,
                label: c.label,
                question_count: c.question_count,
                priority_score: priority_score(
                    c.question_count,
                    c.updated_at,
                    now,
                    self.config.recency_boost_weight,
                    self.config.recency_half_life_hours,
                ),
                updated_at: c.updated_at,
            })
            .collect();

        views.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(views)
    }

    /// Display-only grouping of legacy questions without a cluster.
    /// Groups get best-effort AI labels; the representative text serves
    /// as the fallback.
    pub async fn orphan_groups(&self, tenant_id: Uuid) -> Result<Vec<OrphanGroup>> {
        let orphans = self.store.orphan_questions(tenant_id).await?;
        let mut groups = group_orphans(&orphans, self.config.orphan_threshold);

        if let Some(labeler) = &self.labeler {
            let texts_by_id: HashMap<Uuid, &str> =
                orphans.iter().map(|q| (q.id, q.content.as_str())).collect();

            for group in &mut groups {
                let texts: Vec<String> = group
                    .question_ids
                    .iter()
                    .filter_map(|id| texts_by_id.get(id).map(|s| s.to_string()))
                    .collect();

                match labeler.label(&texts).await {
                    Ok(label) => group.label = Some(label),
                    Err(e) => {
                        tracing::warn!(
                            tenant_id = %tenant_id,
                            error = %e,
                            "Orphan group labeling failed, representative text stands in"
                        );
                    }
                }
            }
        }

        Ok(groups)
    }

    /// Label every unlabeled cluster. AI labels when a labeler is
    /// configured and responsive, deterministic fallback otherwise.
    /// Returns the number of clusters labeled.
    pub async fn label_clusters(&self, tenant_id: Uuid) -> Result<usize> {
        let clusters = self.store.list_clusters(tenant_id).await?;
        let mut labeled = 0usize;

        for cluster in clusters.iter().filter(|c| c.label.is_none()) {
            let members = self.store.member_questions(cluster.id).await?;
            if members.is_empty() {
                continue;
            }

            let label = match &self.labeler {
                Some(labeler) => {
                    let texts: Vec<String> =
                        members.iter().map(|m| m.content.clone()).collect();
                    match labeler.label(&texts).await {
                        Ok(label) => Some(label),
                        Err(e) => {
                            tracing::warn!(
                                cluster_id = %cluster.id,
                                error = %e,
                                "AI labeling failed, using fallback"
                            );
                            fallback_label(&members, self.max_label_chars)
                        }
                    }
                }
                None => fallback_label(&members, self.max_label_chars),
            };

            if let Some(label) = label {
                self.store.set_label(cluster.id, &label).await?;
                labeled += 1;
            }
        }

        Ok(labeled)
    }

    fn monitor(&self, boundary_override: Option<Vec<u32>>) -> ThresholdMonitor {
        let boundaries = boundary_override
            .unwrap_or_else(|| self.config.alert_boundaries.clone())
            .into_iter()
            .map(|b| b as i32)
            .collect();
        ThresholdMonitor::new(boundaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ApproximateCentroid;
    use crate::hooks::AlertChannel;
    use crate::store::MemoryClusterStore;
    use async_trait::async_trait;
    use knowgap_common::embeddings::MockEmbedder;

    struct RecordingAlerts {
        fired: Mutex<Vec<(Uuid, u32)>>,
    }

    #[async_trait]
    impl AlertChannel for RecordingAlerts {
        async fn notify(&self, _tenant_id: Uuid, cluster_id: Uuid, boundary: u32) -> Result<()> {
            self.fired
                .lock()
                .expect("alerts poisoned")
                .push((cluster_id, boundary));
            Ok(())
        }
    }

    struct FailingAlerts;

    #[async_trait]
    impl AlertChannel for FailingAlerts {
        async fn notify(&self, _t: Uuid, _c: Uuid, _b: u32) -> Result<()> {
            Err(AppError::AlertError {
                message: "webhook down".into(),
            })
        }
    }

    fn engine_with(
        store: Arc<MemoryClusterStore>,
        alerts: Arc<dyn AlertChannel>,
        config: ClusteringConfig,
    ) -> GapEngine {
        GapEngine::new(
            store,
            Arc::new(MockEmbedder::new(32)),
            None,
            alerts,
            Arc::new(ApproximateCentroid),
            config,
            80,
        )
    }

    fn test_config() -> ClusteringConfig {
        ClusteringConfig {
            alert_boundaries: vec![2, 5],
            ..ClusteringConfig::default()
        }
    }

    #[tokio::test]
    async fn test_identical_questions_share_a_cluster() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        let first = engine
            .record_unanswered(tenant, "when does aftercare close", None)
            .await
            .unwrap();
        let second = engine
            .record_unanswered(tenant, "when does aftercare close", None)
            .await
            .unwrap();

        assert!(first.created_cluster);
        assert!(!second.created_cluster);
        assert_eq!(first.cluster_id, second.cluster_id);
        assert_eq!(second.question_count, 2);
        assert_eq!(store.cluster_count(tenant), 1);
    }

    #[tokio::test]
    async fn test_dissimilar_question_opens_new_cluster() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        engine
            .record_unanswered(tenant, "when does aftercare close", None)
            .await
            .unwrap();
        let second = engine
            .record_unanswered(tenant, "is there a vegetarian lunch option", None)
            .await
            .unwrap();

        assert!(second.created_cluster);
        assert_eq!(store.cluster_count(tenant), 2);
    }

    #[tokio::test]
    async fn test_boundary_fires_exactly_once() {
        let store = Arc::new(MemoryClusterStore::new());
        let alerts = Arc::new(RecordingAlerts {
            fired: Mutex::new(Vec::new()),
        });
        let engine = engine_with(store, alerts.clone(), test_config());
        let tenant = Uuid::new_v4();

        for _ in 0..4 {
            engine
                .record_unanswered(tenant, "when does aftercare close", None)
                .await
                .unwrap();
        }

        let fired = alerts.fired.lock().unwrap();
        let boundaries: Vec<u32> = fired.iter().map(|(_, b)| *b).collect();
        assert_eq!(boundaries, vec![2]);
    }

    #[tokio::test]
    async fn test_tenant_boundary_override() {
        let store = Arc::new(MemoryClusterStore::new());
        let alerts = Arc::new(RecordingAlerts {
            fired: Mutex::new(Vec::new()),
        });
        let engine = engine_with(store, alerts.clone(), test_config());
        let tenant = Uuid::new_v4();

        for _ in 0..3 {
            engine
                .record_unanswered(tenant, "bus route change", Some(vec![3]))
                .await
                .unwrap();
        }

        let fired = alerts.fired.lock().unwrap();
        let boundaries: Vec<u32> = fired.iter().map(|(_, b)| *b).collect();
        assert_eq!(boundaries, vec![3]);
    }

    #[tokio::test]
    async fn test_alert_failure_does_not_fail_assignment() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(store, Arc::new(FailingAlerts), test_config());
        let tenant = Uuid::new_v4();

        engine
            .record_unanswered(tenant, "field trip forms", None)
            .await
            .unwrap();
        let second = engine
            .record_unanswered(tenant, "field trip forms", None)
            .await
            .unwrap();

        assert_eq!(second.crossed_boundaries, vec![2]);
    }

    #[tokio::test]
    async fn test_count_sum_invariant_over_mixed_sequence() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        let mut question_ids = Vec::new();
        for content in [
            "when does aftercare close",
            "when does aftercare close",
            "is there a vegetarian lunch option",
            "bus route change",
            "bus route change",
        ] {
            let assignment = engine.record_unanswered(tenant, content, None).await.unwrap();
            question_ids.push(assignment.question_id);
        }

        engine.dismiss_question(tenant, question_ids[0]).await.unwrap();
        engine.dismiss_question(tenant, question_ids[2]).await.unwrap();

        assert_eq!(
            store.question_count_sum(tenant),
            store.clustered_question_count(tenant)
        );
    }

    #[tokio::test]
    async fn test_dismiss_unknown_question() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(store, Arc::new(TracingAlertsForTests), test_config());

        let err = engine
            .dismiss_question(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuestionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_dismissing_last_member_deletes_cluster() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        let assignment = engine
            .record_unanswered(tenant, "snow day policy", None)
            .await
            .unwrap();
        let removal = engine
            .dismiss_question(tenant, assignment.question_id)
            .await
            .unwrap();

        assert!(removal.cluster_deleted);
        assert_eq!(store.cluster_count(tenant), 0);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(store, Arc::new(TracingAlertsForTests), test_config());

        let err = engine
            .record_unanswered(Uuid::new_v4(), "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_orphans_grouped_for_display_only() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        store.seed_orphan(tenant, "old question a", vec![1.0, 0.0]);
        store.seed_orphan(tenant, "old question a again", vec![0.99, 0.05]);
        store.seed_orphan(tenant, "old question b", vec![0.0, 1.0]);

        let groups = engine.orphan_groups(tenant).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].size, 2);
        // Nothing was persisted
        assert_eq!(store.cluster_count(tenant), 0);
    }

    #[tokio::test]
    async fn test_pair_at_cosine_095_shares_cluster() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        // Unit vectors with mutual cosine similarity 0.95
        let a = vec![1.0, 0.0];
        let b = vec![0.95, (1.0f32 - 0.95 * 0.95).sqrt()];

        engine
            .assign_embedded(tenant, "first phrasing", a, None)
            .await
            .unwrap();
        let second = engine
            .assign_embedded(tenant, "second phrasing", b, None)
            .await
            .unwrap();

        assert!(!second.created_cluster);
        assert_eq!(second.question_count, 2);
        assert_eq!(store.cluster_count(tenant), 1);
    }

    #[tokio::test]
    async fn test_fallback_labeling_without_provider() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            test_config(),
        );
        let tenant = Uuid::new_v4();

        engine
            .record_unanswered(tenant, "when does aftercare close", None)
            .await
            .unwrap();

        let labeled = engine.label_clusters(tenant).await.unwrap();
        assert_eq!(labeled, 1);

        let clusters = store.list_clusters(tenant).await.unwrap();
        assert_eq!(clusters[0].label.as_deref(), Some("when does aftercare close"));
    }

    struct FailingLabeler;

    #[async_trait]
    impl ClusterLabeler for FailingLabeler {
        async fn label(&self, _questions: &[String]) -> Result<String> {
            Err(AppError::LabelingError {
                message: "provider unreachable".into(),
            })
        }

        fn provider(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_labeler_failure_falls_back_to_member_text() {
        let store = Arc::new(MemoryClusterStore::new());
        let engine = GapEngine::new(
            store.clone(),
            Arc::new(MockEmbedder::new(32)),
            Some(Arc::new(FailingLabeler)),
            Arc::new(TracingAlertsForTests),
            Arc::new(ApproximateCentroid),
            test_config(),
            80,
        );
        let tenant = Uuid::new_v4();

        engine
            .record_unanswered(tenant, "snow day policy", None)
            .await
            .unwrap();

        let labeled = engine.label_clusters(tenant).await.unwrap();
        assert_eq!(labeled, 1);

        let clusters = store.list_clusters(tenant).await.unwrap();
        assert_eq!(clusters[0].label.as_deref(), Some("snow day policy"));
    }

    #[tokio::test]
    async fn test_serialized_assignments_still_consolidate() {
        let store = Arc::new(MemoryClusterStore::new());
        let config = ClusteringConfig {
            serialize_assignments: true,
            ..test_config()
        };
        let engine = Arc::new(engine_with(
            store.clone(),
            Arc::new(TracingAlertsForTests),
            config,
        ));
        let tenant = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .record_unanswered(tenant, "when does aftercare close", None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Serialized per tenant: identical questions cannot fragment
        assert_eq!(store.cluster_count(tenant), 1);
        assert_eq!(store.question_count_sum(tenant), 4);
    }

    struct TracingAlertsForTests;

    #[async_trait]
    impl AlertChannel for TracingAlertsForTests {
        async fn notify(&self, _t: Uuid, _c: Uuid, _b: u32) -> Result<()> {
            Ok(())
        }
    }
}
