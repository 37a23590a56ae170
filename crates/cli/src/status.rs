//! `/status` route: shipper and store state for operators.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use logship_durability::{LogStore, StoreStats};
use logship_shipper::{Shipper, ShipperStatus};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
struct StatusState {
    shipper: Shipper,
    store: Arc<LogStore>,
}

#[derive(Serialize)]
struct StatusBody {
    shipper: ShipperStatus,
    store: StoreStats,
}

/// Router serving `GET /status`.
pub fn status_router(shipper: Shipper, store: Arc<LogStore>) -> Router {
    Router::new()
        .route("/status", get(status))
        .with_state(StatusState { shipper, store })
}

async fn status(State(state): State<StatusState>) -> Json<StatusBody> {
    // Listing state records touches the filesystem.
    let shipper = state.shipper.clone();
    let shipper_status = tokio::task::spawn_blocking(move || shipper.status())
        .await
        .unwrap_or_default();
    Json(StatusBody {
        shipper: shipper_status,
        store: state.store.stats(),
    })
}
