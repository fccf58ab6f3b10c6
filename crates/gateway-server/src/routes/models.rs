use axum::Json;

use gateway_core::models;
use gateway_core::openai::ModelList;

/// GET /v1/models — the static allowlist.
pub async fn list_models() -> Json<ModelList> {
    Json(models::model_list())
}
