//! Source assembly
//!
//! Turns raw passage hits into the citation set shown to the user. Recall
//! and display thresholds are distinct: the recall floor only bounds the
//! search, while the verdict is answered iff at least one hit clears the
//! display threshold and survives assembly.

use knowgap_common::db::PassageHit;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// A displayable citation backing an answer
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSource {
    pub document_id: Uuid,
    pub document_title: String,
    pub excerpt: String,
    pub chunk_index: i32,
    pub similarity: f32,
    pub rank: usize,
}

/// Outcome of one retrieval pass
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub sources: Vec<RetrievedSource>,
    /// False exactly when no displayable source survived assembly
    pub answered: bool,
}

impl Verdict {
    pub fn unanswered() -> Self {
        Self {
            sources: Vec::new(),
            answered: false,
        }
    }
}

/// Assemble the display set from recall-threshold hits.
///
/// Hits arrive ordered by similarity descending. Each document contributes
/// at most its best passage, hits below `display_threshold` are dropped,
/// and the result is capped at `max_sources`.
pub fn assemble_sources(
    hits: &[PassageHit],
    display_threshold: f32,
    max_sources: usize,
) -> Verdict {
    let mut seen_documents: HashSet<Uuid> = HashSet::new();
    let mut sources = Vec::new();

    for hit in hits {
        if sources.len() >= max_sources {
            break;
        }
        if hit.similarity < display_threshold {
            // Ordered input: everything after this is below threshold too
            break;
        }
        if !seen_documents.insert(hit.document_id) {
            continue;
        }

        sources.push(RetrievedSource {
            document_id: hit.document_id,
            document_title: hit.document_title.clone(),
            excerpt: hit.content.clone(),
            chunk_index: hit.chunk_index,
            similarity: hit.similarity,
            rank: sources.len() + 1,
        });
    }

    let answered = !sources.is_empty();
    Verdict { sources, answered }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(doc: Uuid, similarity: f32) -> PassageHit {
        PassageHit {
            document_id: doc,
            document_title: format!("doc-{doc}"),
            content: "passage text".into(),
            chunk_index: 0,
            similarity,
        }
    }

    #[test]
    fn test_dedupe_cap_and_display_floor() {
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let doc_c = Uuid::new_v4();

        // Five hits over three documents, two below the display threshold
        let hits = vec![
            hit(doc_a, 0.9),
            hit(doc_a, 0.7),
            hit(doc_b, 0.6),
            hit(doc_c, 0.55),
            hit(doc_c, 0.51),
        ];

        let verdict = assemble_sources(&hits, 0.65, 3);

        assert!(verdict.answered);
        assert_eq!(verdict.sources.len(), 1);
        assert_eq!(verdict.sources[0].document_id, doc_a);
        assert!((verdict.sources[0].similarity - 0.9).abs() < 1e-6);
        assert_eq!(verdict.sources[0].rank, 1);
    }

    #[test]
    fn test_one_source_per_document() {
        let doc = Uuid::new_v4();
        let hits = vec![hit(doc, 0.9), hit(doc, 0.85), hit(doc, 0.8)];

        let verdict = assemble_sources(&hits, 0.65, 3);
        assert_eq!(verdict.sources.len(), 1);
    }

    #[test]
    fn test_cap_at_max_sources() {
        let hits: Vec<PassageHit> = (0..5).map(|i| hit(Uuid::new_v4(), 0.9 - i as f32 * 0.01)).collect();

        let verdict = assemble_sources(&hits, 0.65, 3);
        assert_eq!(verdict.sources.len(), 3);
        assert_eq!(
            verdict.sources.iter().map(|s| s.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_all_below_display_threshold_is_unanswered() {
        let hits = vec![hit(Uuid::new_v4(), 0.6), hit(Uuid::new_v4(), 0.55)];

        let verdict = assemble_sources(&hits, 0.65, 3);
        assert!(!verdict.answered);
        assert!(verdict.sources.is_empty());
    }

    #[test]
    fn test_no_hits_is_unanswered() {
        let verdict = assemble_sources(&[], 0.65, 3);
        assert!(!verdict.answered);
    }

    #[test]
    fn test_chunk_index_carried_into_source() {
        let mut winning = hit(Uuid::new_v4(), 0.9);
        winning.chunk_index = 4;

        let verdict = assemble_sources(&[winning], 0.65, 3);
        assert_eq!(verdict.sources[0].chunk_index, 4);
    }
}
