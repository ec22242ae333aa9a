use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use relayer::{BlockNumber, ShardId, StoreExt};

use crate::state::SharedState;

/// Response body for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub role: String,
    pub account: String,
    pub shards: Vec<ShardId>,
    pub high_local_block: BlockNumber,
    pub high_local_execution_block: BlockNumber,
    pub latest_state_root: String,
}

/// `GET /status`
///
/// Reads both watermarks fresh from the store.
pub async fn status(
    State(state): State<SharedState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let store = state.ctx.store();
    let meta = store.local_metadata().map_err(unavailable)?;
    let execution = store.execution_summary().map_err(unavailable)?;

    Ok(Json(StatusResponse {
        role: state.role.to_string(),
        account: state.ctx.identity.account().to_string(),
        shards: meta.shard_id,
        high_local_block: meta.high_local_block,
        high_local_execution_block: execution.high_local_execution_block,
        latest_state_root: meta.latest_state_root.to_string(),
    }))
}

fn unavailable(e: relayer::StorageError) -> (StatusCode, String) {
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}
