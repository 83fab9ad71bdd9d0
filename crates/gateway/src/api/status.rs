use axum::extract::State;
use axum::response::Json;
use axum::Extension;

use hl_store::StatsSnapshot;

use crate::api::error::ApiResult;
use crate::credentials::AuthIdentity;
use crate::runtime::StatusSnapshot;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection status plus whichever credential artifact is pending.
pub async fn get_status(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
) -> Json<StatusSnapshot> {
    Json(state.runtime.status(&who.id))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
) -> ApiResult<Json<StatsSnapshot>> {
    Ok(Json(state.runtime.stats(&who.id).await?))
}
