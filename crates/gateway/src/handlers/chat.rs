//! Chat retrieval handler
//!
//! Retrieval runs synchronously in the request. When the turn comes back
//! unanswered, recording the question into the gap engine is detached
//! work: spawned, logged on failure, never awaited by the caller.

use crate::AppState;
use axum::{extract::State, Json};
use knowgap_common::{
    auth::AuthContext,
    db::Repository,
    errors::{AppError, Result},
};
use knowgap_engine::RetrievedSource;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

/// Chat retrieval request
#[derive(Debug, Deserialize, Validate)]
pub struct RetrieveRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

/// Chat retrieval response
#[derive(Serialize)]
pub struct RetrieveResponse {
    pub answered: bool,
    pub sources: Vec<RetrievedSource>,
    pub processing_time_ms: u64,
}

/// Retrieve sources for a chat question
pub async fn retrieve(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let verdict = state.retrieval.retrieve(auth.tenant_id, &request.question).await;

    if !verdict.answered {
        spawn_recording(&state, auth.tenant_id, request.question.clone());
    }

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        tenant_id = %auth.tenant_id,
        answered = verdict.answered,
        sources = verdict.sources.len(),
        latency_ms = processing_time_ms,
        "Chat retrieval completed"
    );

    Ok(Json(RetrieveResponse {
        answered: verdict.answered,
        sources: verdict.sources,
        processing_time_ms,
    }))
}

/// Detached recording path. The chat response never waits on this and
/// never learns whether it succeeded.
fn spawn_recording(state: &AppState, tenant_id: uuid::Uuid, question: String) {
    let engine = state.engine.clone();
    let repo = Repository::new(state.db.clone());

    tokio::spawn(async move {
        let boundary_override = match repo.find_tenant_by_id(tenant_id).await {
            Ok(tenant) => tenant.and_then(|t| t.alert_boundary_override()),
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Tenant lookup failed, using default alert boundaries"
                );
                None
            }
        };

        if let Err(e) = engine
            .record_unanswered(tenant_id, &question, boundary_override)
            .await
        {
            tracing::error!(
                tenant_id = %tenant_id,
                error = %e,
                "Failed to record unanswered question"
            );
        }
    });
}
