/// Map feed: `GET /v1/map/points`

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Extension, Json};
use leadbook_shared::{
    auth::authorization::AuthContext,
    map::{map_data, MapData},
    models::client::Client,
};

/// Located clients of the caller plus their bounding box
pub async fn map_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MapData>> {
    let clients = Client::list_located(&state.db, auth.user_id).await?;
    Ok(Json(map_data(&clients)))
}
