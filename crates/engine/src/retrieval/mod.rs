//! Retrieval over ready document passages
//!
//! The retrieval path is synchronous in the request: embed the question,
//! search tenant-scoped passages above the recall floor, then assemble the
//! displayable source set. Infrastructure failures degrade to an
//! unanswered verdict instead of failing the chat turn.

mod assemble;

pub use assemble::{assemble_sources, RetrievedSource, Verdict};

use async_trait::async_trait;
use knowgap_common::config::RetrievalConfig;
use knowgap_common::db::{PassageHit, Repository};
use knowgap_common::embeddings::Embedder;
use knowgap_common::errors::Result;
use knowgap_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Similarity search over a tenant's ready passages
#[async_trait]
pub trait PassageIndex: Send + Sync {
    async fn search(
        &self,
        tenant_id: Uuid,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<PassageHit>>;
}

#[async_trait]
impl PassageIndex for Repository {
    async fn search(
        &self,
        tenant_id: Uuid,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<PassageHit>> {
        self.passage_search(tenant_id, embedding, limit, min_similarity)
            .await
    }
}

/// Synchronous retrieval used by the chat turn
pub struct RetrievalService {
    index: Arc<dyn PassageIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalService {
    pub fn new(
        index: Arc<dyn PassageIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Retrieve sources for a question.
    ///
    /// Embedding or search failures are logged and reported as an
    /// unanswered verdict so the caller can still respond.
    pub async fn retrieve(&self, tenant_id: Uuid, question: &str) -> Verdict {
        let start = Instant::now();

        let verdict = match self.try_retrieve(tenant_id, question).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Retrieval failed, degrading to unanswered"
                );
                Verdict::unanswered()
            }
        };

        metrics::record_retrieval(
            start.elapsed().as_secs_f64(),
            verdict.sources.len(),
            verdict.answered,
        );
        verdict
    }

    async fn try_retrieve(&self, tenant_id: Uuid, question: &str) -> Result<Verdict> {
        let embedding = self.embedder.embed(question).await?;

        let hits = self
            .index
            .search(
                tenant_id,
                &embedding,
                self.config.search_top_k,
                self.config.recall_threshold,
            )
            .await?;

        Ok(assemble_sources(
            &hits,
            self.config.display_threshold,
            self.config.max_sources,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowgap_common::embeddings::MockEmbedder;
    use knowgap_common::errors::AppError;

    struct StaticIndex {
        hits: Vec<PassageHit>,
    }

    #[async_trait]
    impl PassageIndex for StaticIndex {
        async fn search(
            &self,
            _tenant_id: Uuid,
            _embedding: &[f32],
            limit: usize,
            min_similarity: f32,
        ) -> Result<Vec<PassageHit>> {
            Ok(self
                .hits
                .iter()
                .filter(|h| h.similarity >= min_similarity)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl PassageIndex for FailingIndex {
        async fn search(
            &self,
            _tenant_id: Uuid,
            _embedding: &[f32],
            _limit: usize,
            _min_similarity: f32,
        ) -> Result<Vec<PassageHit>> {
            Err(AppError::DatabaseConnection {
                message: "replica unavailable".into(),
            })
        }
    }

    fn hit(similarity: f32) -> PassageHit {
        PassageHit {
            document_id: Uuid::new_v4(),
            document_title: "Handbook".into(),
            content: "Aftercare runs until 6pm.".into(),
            chunk_index: 0,
            similarity,
        }
    }

    fn service(index: Arc<dyn PassageIndex>) -> RetrievalService {
        RetrievalService::new(
            index,
            Arc::new(MockEmbedder::new(32)),
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_answered_turn() {
        let svc = service(Arc::new(StaticIndex {
            hits: vec![hit(0.9), hit(0.7)],
        }));

        let verdict = svc.retrieve(Uuid::new_v4(), "when does aftercare close").await;
        assert!(verdict.answered);
        assert_eq!(verdict.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_recall_but_not_display_is_unanswered() {
        // Above the recall floor, below the display threshold
        let svc = service(Arc::new(StaticIndex {
            hits: vec![hit(0.55), hit(0.52)],
        }));

        let verdict = svc.retrieve(Uuid::new_v4(), "bus schedule").await;
        assert!(!verdict.answered);
        assert!(verdict.sources.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_degrades_to_unanswered() {
        let svc = service(Arc::new(FailingIndex));

        let verdict = svc.retrieve(Uuid::new_v4(), "lunch menu").await;
        assert!(!verdict.answered);
    }

    struct FailingEmbedder;

    #[async_trait]
    impl knowgap_common::embeddings::Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "provider timeout".into(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingError {
                message: "provider timeout".into(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            32
        }
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades_to_unanswered() {
        let svc = RetrievalService::new(
            Arc::new(StaticIndex {
                hits: vec![hit(0.9)],
            }),
            Arc::new(FailingEmbedder),
            RetrievalConfig::default(),
        );

        let verdict = svc.retrieve(Uuid::new_v4(), "field trip forms").await;
        assert!(!verdict.answered);
        assert!(verdict.sources.is_empty());
    }
}
