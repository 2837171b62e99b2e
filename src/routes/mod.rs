//! Routes gateway (EMBP).
//!
//! Each submodule exposes a `router()`; this module merges them and attaches
//! the shared [`AppState`]. `main.rs` only sees [`router`].
use axum::Router;

use crate::AppState;

mod health;
mod ndvi;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(ndvi::router())
        .merge(health::router())
        .with_state(state)
}
