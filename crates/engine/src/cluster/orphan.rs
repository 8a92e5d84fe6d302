//! Batch grouping for legacy orphan questions
//!
//! Questions recorded before clustering existed have no cluster row.
//! For review screens we group them greedily: each question joins the
//! first group whose representative it matches, otherwise it starts a
//! new group. Display-only, nothing is persisted.

use crate::store::QuestionRecord;
use crate::vecmath::cosine_similarity;
use serde::Serialize;
use uuid::Uuid;

/// A display-only group of similar orphan questions
#[derive(Debug, Clone, Serialize)]
pub struct OrphanGroup {
    /// The first member, used as the group's representative text
    pub representative: String,
    /// Best-effort AI label; absent when no labeler is available
    pub label: Option<String>,
    pub question_ids: Vec<Uuid>,
    pub size: usize,
}

/// Greedy single-pass grouping against each group's first member.
pub fn group_orphans(questions: &[QuestionRecord], similarity_threshold: f32) -> Vec<OrphanGroup> {
    let mut groups: Vec<(Vec<f32>, OrphanGroup)> = Vec::new();

    for question in questions {
        if question.embedding.is_empty() {
            // No embedding to compare: its own singleton group
            groups.push((
                Vec::new(),
                OrphanGroup {
                    representative: question.content.clone(),
                    label: None,
                    question_ids: vec![question.id],
                    size: 1,
                },
            ));
            continue;
        }

        let matched = groups.iter_mut().find(|(rep_embedding, _)| {
            !rep_embedding.is_empty()
                && cosine_similarity(&question.embedding, rep_embedding) >= similarity_threshold
        });

        match matched {
            Some((_, group)) => {
                group.question_ids.push(question.id);
                group.size += 1;
            }
            None => {
                groups.push((
                    question.embedding.clone(),
                    OrphanGroup {
                        representative: question.content.clone(),
                        label: None,
                        question_ids: vec![question.id],
                        size: 1,
                    },
                ));
            }
        }
    }

    let mut result: Vec<OrphanGroup> = groups.into_iter().map(|(_, g)| g).collect();
    result.sort_by(|a, b| b.size.cmp(&a.size));
    result
}
