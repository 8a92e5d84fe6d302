//! Resolution handler

use crate::AppState;
use axum::{extract::State, Json};
use knowgap_common::{
    auth::AuthContext,
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Resolution request
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveRequest {
    /// Title for the answer document. Blank falls back to the first
    /// resolved question.
    #[serde(default)]
    pub title: String,

    #[validate(length(min = 1, max = 20000))]
    pub answer: String,

    #[validate(length(min = 1, max = 500))]
    pub question_ids: Vec<Uuid>,
}

/// Resolution response
#[derive(Serialize)]
pub struct ResolveResponse {
    pub document_id: Uuid,
    pub questions_folded: usize,
    pub clusters_retired: Vec<Uuid>,
}

/// Resolve a knowledge gap with an answer document
pub async fn resolve(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let outcome = state
        .resolver
        .resolve(
            auth.tenant_id,
            &request.title,
            &request.answer,
            &request.question_ids,
        )
        .await?;

    tracing::info!(
        tenant_id = %auth.tenant_id,
        document_id = %outcome.document_id,
        questions_folded = outcome.questions_folded,
        "Gap resolved"
    );

    Ok(Json(ResolveResponse {
        document_id: outcome.document_id,
        questions_folded: outcome.questions_folded,
        clusters_retired: outcome.clusters_retired,
    }))
}
