// src/routes/ndvi.rs
//! Polygon analysis endpoint.
//!
//! `POST /ndvi/` validates the submitted ring and date range, runs the NDVI,
//! climate and eco-region analyses, and returns the combined result. Only
//! invalid input is rejected (400); upstream trouble is reported inside the
//! payload's `status` object with a 200.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::analysis::{analyze, combine};
use crate::error::{ServiceError, ServiceResult};
use crate::geometry::Polygon;
use crate::models::{CombinedResult, DateRange, NdviRequest};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/ndvi/", post(handler))
        .route("/ndvi", post(handler))
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<NdviRequest>, JsonRejection>,
) -> ServiceResult<Json<CombinedResult>> {
    // ---
    let request_id = Uuid::new_v4();
    let span = info_span!("ndvi", %request_id);

    async move {
        info!("POST /ndvi/ - Starting analysis");

        let Json(request) =
            payload.map_err(|rejection| ServiceError::InvalidRequest(rejection.body_text()))?;

        // Step 1: Validate input
        debug!("POST /ndvi/ - Step 1");
        let ring = request
            .coordinates
            .first()
            .ok_or_else(|| ServiceError::InvalidGeometry("coordinates has no ring".to_string()))?;
        let polygon = Polygon::from_ring(ring)?;

        let today = Utc::now().date_naive();
        let range = DateRange::resolve(request.start_date, request.end_date, today)?
            .within_span(state.settings.max_range_days)?;
        info!(
            "Polygon with {} vertices, {} to {}",
            polygon.vertex_count(),
            range.start,
            range.end
        );

        // Step 2: Run analyses
        debug!("POST /ndvi/ - Step 2");
        let analysis = analyze(&state, &polygon, &range, today).await;

        // Step 3: Combine
        debug!("POST /ndvi/ - Step 3");
        let result = combine(analysis, request.annotations());

        debug!("POST /ndvi/ - Returning OK");
        Ok(Json(result))
    }
    .instrument(span)
    .await
}
