use axum::{extract::State, routing::get, Json};
use mixtape_rooms::RoomSnapshot;

use crate::{context::ServerContext, Router};

async fn list_rooms(State(context): State<ServerContext>) -> Json<Vec<RoomSnapshot>> {
    Json(context.coordinator.registry.list())
}

pub fn router() -> Router {
    Router::new().route("/", get(list_rooms))
}
