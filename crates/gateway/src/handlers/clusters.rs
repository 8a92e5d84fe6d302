//! Gap review handlers

use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use knowgap_common::{auth::AuthContext, errors::Result};
use knowgap_engine::cluster::OrphanGroup;
use knowgap_engine::gap::ClusterView;
use serde::Serialize;
use uuid::Uuid;

/// Cluster review response: live clusters by priority plus display-only
/// groups of legacy questions that predate clustering
#[derive(Serialize)]
pub struct ClustersResponse {
    pub clusters: Vec<ClusterView>,
    pub orphan_groups: Vec<OrphanGroup>,
}

/// List live clusters and orphan groups for review
pub async fn list_clusters(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ClustersResponse>> {
    let clusters = state.engine.live_clusters(auth.tenant_id).await?;
    let orphan_groups = state.engine.orphan_groups(auth.tenant_id).await?;

    Ok(Json(ClustersResponse {
        clusters,
        orphan_groups,
    }))
}

#[derive(Serialize)]
pub struct LabelResponse {
    pub labeled: usize,
}

/// Label every unlabeled cluster for this tenant
pub async fn label_clusters(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<LabelResponse>> {
    let labeled = state.engine.label_clusters(auth.tenant_id).await?;
    Ok(Json(LabelResponse { labeled }))
}

#[derive(Serialize)]
pub struct DismissResponse {
    pub dismissed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<Uuid>,
    pub cluster_deleted: bool,
}

/// Dismiss an unanswered question
pub async fn dismiss_question(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DismissResponse>> {
    let removal = state.engine.dismiss_question(auth.tenant_id, id).await?;

    Ok(Json(DismissResponse {
        dismissed: true,
        cluster_id: removal.cluster_id,
        cluster_deleted: removal.cluster_deleted,
    }))
}
