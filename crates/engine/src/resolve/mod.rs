//! Resolution workflow
//!
//! An admin answers a knowledge gap: the answer becomes a document in
//! the tenant's Responses container, gets submitted to the processing
//! pipeline, and the resolved questions are retired along with their
//! emptied clusters. The input is validated before any side effect, and
//! a failure after publication is surfaced with the duplicate-document
//! risk spelled out.

use crate::hooks::ProcessingPipeline;
use crate::store::{ClusterStore, QuestionRecord};
use async_trait::async_trait;
use knowgap_common::db::models::{DocumentStatus, RESPONSES_FOLDER, SOURCE_RESOLUTION};
use knowgap_common::db::Repository;
use knowgap_common::errors::{AppError, Result};
use knowgap_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Where published answer documents land
#[async_trait]
pub trait ResponseCorpus: Send + Sync {
    /// Create the answer document inside the tenant's Responses container
    /// and return its id.
    async fn publish(&self, tenant_id: Uuid, title: &str, body: &str) -> Result<Uuid>;
}

/// Postgres-backed corpus over the shared repository
#[derive(Clone)]
pub struct PgResponseCorpus {
    repo: Repository,
}

impl PgResponseCorpus {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ResponseCorpus for PgResponseCorpus {
    async fn publish(&self, tenant_id: Uuid, title: &str, body: &str) -> Result<Uuid> {
        let folder = self.repo.ensure_folder(tenant_id, RESPONSES_FOLDER).await?;
        let document = self
            .repo
            .create_document(
                tenant_id,
                Some(folder.id),
                title.to_string(),
                SOURCE_RESOLUTION,
                DocumentStatus::Pending,
                Some(body.to_string()),
            )
            .await?;

        Ok(document.id)
    }
}

/// Outcome of a completed resolution
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub document_id: Uuid,
    pub questions_folded: usize,
    pub clusters_retired: Vec<Uuid>,
}

/// Folds an admin's answer back into the document corpus
pub struct ResolutionWorkflow {
    store: Arc<dyn ClusterStore>,
    corpus: Arc<dyn ResponseCorpus>,
    pipeline: Arc<dyn ProcessingPipeline>,
}

impl ResolutionWorkflow {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        corpus: Arc<dyn ResponseCorpus>,
        pipeline: Arc<dyn ProcessingPipeline>,
    ) -> Self {
        Self {
            store,
            corpus,
            pipeline,
        }
    }

    /// Resolve a set of questions with an answer.
    ///
    /// Empty answers are rejected before any side effect. Pipeline
    /// submission is best-effort: the document is already durable and
    /// will be picked up by a later sweep. A failure after the document
    /// is published returns an error naming the published document so
    /// the caller does not blindly retry and publish a duplicate.
    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        title: &str,
        answer: &str,
        question_ids: &[Uuid],
    ) -> Result<ResolutionOutcome> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AppError::Validation {
                message: "Answer cannot be empty".into(),
                field: Some("answer".into()),
            });
        }
        if question_ids.is_empty() {
            return Err(AppError::Validation {
                message: "At least one question id is required".into(),
                field: Some("question_ids".into()),
            });
        }

        let questions = self.store.questions_by_ids(tenant_id, question_ids).await?;
        if questions.is_empty() {
            return Err(AppError::QuestionNotFound {
                id: format!("none of {} ids exist for tenant", question_ids.len()),
            });
        }

        let title = effective_title(title, &questions);
        let body = compose_body(&questions, answer);

        let document_id = self.corpus.publish(tenant_id, &title, &body).await?;

        if let Err(e) = self.pipeline.submit(tenant_id, document_id).await {
            tracing::warn!(
                tenant_id = %tenant_id,
                document_id = %document_id,
                error = %e,
                "Pipeline submission failed, document awaits a later sweep"
            );
        }

        let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
        let retired = match self.store.retire_questions(tenant_id, &ids).await {
            Ok(retired) => retired,
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    document_id = %document_id,
                    error = %e,
                    "Question retirement failed after document publication"
                );
                return Err(AppError::PipelineError {
                    message: format!(
                        "Answer document {document_id} was published but the resolved \
                         questions were not retired. Retrying this resolution as-is \
                         would publish a duplicate document. Retire the questions \
                         manually or resolve again without re-publishing."
                    ),
                });
            }
        };

        metrics::record_resolution(&tenant_id.to_string(), retired.questions_deleted as usize);
        tracing::info!(
            tenant_id = %tenant_id,
            document_id = %document_id,
            questions_folded = retired.questions_deleted,
            clusters_retired = retired.clusters_deleted.len(),
            "Resolution complete"
        );

        Ok(ResolutionOutcome {
            document_id,
            questions_folded: retired.questions_deleted as usize,
            clusters_retired: retired.clusters_deleted,
        })
    }
}

fn effective_title(title: &str, questions: &[QuestionRecord]) -> String {
    let title = title.trim();
    if !title.is_empty() {
        return title.to_string();
    }
    // Untitled resolutions inherit the first question
    questions
        .first()
        .map(|q| q.content.chars().take(120).collect())
        .unwrap_or_else(|| "Resolved questions".to_string())
}

/// Answer document body: the resolved questions first, so the chunker
/// embeds the phrasing parents actually used, then the answer.
fn compose_body(questions: &[QuestionRecord], answer: &str) -> String {
    let mut body = String::new();
    for question in questions {
        body.push_str("Q: ");
        body.push_str(question.content.trim());
        body.push('\n');
    }
    body.push('\n');
    body.push_str(answer);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::TracingPipeline;
    use crate::store::{MemoryClusterStore, NewQuestion, Placement};
    use std::sync::Mutex;

    struct MemoryCorpus {
        published: Mutex<Vec<(Uuid, String, String)>>,
    }

    impl MemoryCorpus {
        fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ResponseCorpus for MemoryCorpus {
        async fn publish(&self, tenant_id: Uuid, title: &str, body: &str) -> Result<Uuid> {
            self.published
                .lock()
                .unwrap()
                .push((tenant_id, title.to_string(), body.to_string()));
            Ok(Uuid::new_v4())
        }
    }

    struct FailingPipeline;

    #[async_trait]
    impl ProcessingPipeline for FailingPipeline {
        async fn submit(&self, _tenant_id: Uuid, _document_id: Uuid) -> Result<()> {
            Err(AppError::PipelineError {
                message: "queue unavailable".into(),
            })
        }
    }

    async fn seed_question(
        store: &MemoryClusterStore,
        tenant: Uuid,
        content: &str,
        embedding: Vec<f32>,
    ) -> Uuid {
        store
            .commit_assignment(
                &NewQuestion {
                    tenant_id: tenant,
                    content: content.into(),
                    embedding,
                },
                &Placement::Fresh,
                1.0,
            )
            .await
            .unwrap()
            .question_id
    }

    fn workflow(
        store: Arc<MemoryClusterStore>,
        corpus: Arc<MemoryCorpus>,
        pipeline: Arc<dyn ProcessingPipeline>,
    ) -> ResolutionWorkflow {
        ResolutionWorkflow::new(store, corpus, pipeline)
    }

    #[tokio::test]
    async fn test_resolution_publishes_and_retires() {
        let store = Arc::new(MemoryClusterStore::new());
        let corpus = Arc::new(MemoryCorpus::new());
        let tenant = Uuid::new_v4();

        let q1 = seed_question(&store, tenant, "when is pickup", vec![1.0, 0.0]).await;
        let q2 = seed_question(&store, tenant, "what time is pickup", vec![0.9, 0.1]).await;

        let wf = workflow(store.clone(), corpus.clone(), Arc::new(TracingPipeline));
        let outcome = wf
            .resolve(tenant, "Pickup times", "Pickup is at 3:15pm.", &[q1, q2])
            .await
            .unwrap();

        assert_eq!(outcome.questions_folded, 2);
        assert_eq!(outcome.clusters_retired.len(), 2);
        assert_eq!(corpus.count(), 1);
        assert_eq!(store.cluster_count(tenant), 0);

        let (_, title, body) = corpus.published.lock().unwrap()[0].clone();
        assert_eq!(title, "Pickup times");
        assert!(body.starts_with("Q: when is pickup\n"));
        assert!(body.ends_with("Pickup is at 3:15pm."));
    }

    #[tokio::test]
    async fn test_empty_answer_mutates_nothing() {
        let store = Arc::new(MemoryClusterStore::new());
        let corpus = Arc::new(MemoryCorpus::new());
        let tenant = Uuid::new_v4();
        let q = seed_question(&store, tenant, "when is pickup", vec![1.0, 0.0]).await;

        let wf = workflow(store.clone(), corpus.clone(), Arc::new(TracingPipeline));
        let err = wf.resolve(tenant, "Pickup", "   ", &[q]).await.unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(corpus.count(), 0);
        assert_eq!(store.cluster_count(tenant), 1);
    }

    #[tokio::test]
    async fn test_unknown_questions_rejected_before_publish() {
        let store = Arc::new(MemoryClusterStore::new());
        let corpus = Arc::new(MemoryCorpus::new());

        let wf = workflow(store, corpus.clone(), Arc::new(TracingPipeline));
        let err = wf
            .resolve(Uuid::new_v4(), "t", "an answer", &[Uuid::new_v4()])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::QuestionNotFound { .. }));
        assert_eq!(corpus.count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_failure_still_resolves() {
        let store = Arc::new(MemoryClusterStore::new());
        let corpus = Arc::new(MemoryCorpus::new());
        let tenant = Uuid::new_v4();
        let q = seed_question(&store, tenant, "when is pickup", vec![1.0, 0.0]).await;

        let wf = workflow(store.clone(), corpus.clone(), Arc::new(FailingPipeline));
        let outcome = wf
            .resolve(tenant, "Pickup", "Pickup is at 3:15pm.", &[q])
            .await
            .unwrap();

        assert_eq!(outcome.questions_folded, 1);
        assert_eq!(corpus.count(), 1);
        assert_eq!(store.cluster_count(tenant), 0);
    }

    #[tokio::test]
    async fn test_blank_title_falls_back_to_first_question() {
        let store = Arc::new(MemoryClusterStore::new());
        let corpus = Arc::new(MemoryCorpus::new());
        let tenant = Uuid::new_v4();
        let q = seed_question(&store, tenant, "when is pickup", vec![1.0, 0.0]).await;

        let wf = workflow(store, corpus.clone(), Arc::new(TracingPipeline));
        wf.resolve(tenant, "  ", "Pickup is at 3:15pm.", &[q])
            .await
            .unwrap();

        let (_, title, _) = corpus.published.lock().unwrap()[0].clone();
        assert_eq!(title, "when is pickup");
    }

    #[tokio::test]
    async fn test_tenant_scoping_ignores_foreign_questions() {
        let store = Arc::new(MemoryClusterStore::new());
        let corpus = Arc::new(MemoryCorpus::new());
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let foreign = seed_question(&store, tenant_a, "when is pickup", vec![1.0, 0.0]).await;

        let wf = workflow(store.clone(), corpus.clone(), Arc::new(TracingPipeline));
        let err = wf
            .resolve(tenant_b, "t", "answer", &[foreign])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::QuestionNotFound { .. }));
        assert_eq!(store.cluster_count(tenant_a), 1);
    }
}
