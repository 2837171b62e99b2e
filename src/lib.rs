//! Forage monitoring service library.
//!
//! Given a field polygon and a date range, the service returns a daily NDVI
//! series from optical imagery, a daily climate series (mean temperature plus
//! a 95th-percentile historical radiation baseline), and the eco-region
//! composition of the polygon. The binary in `main.rs` wires real HTTP
//! collaborators into [`AppState`]; tests substitute their own.

pub mod analysis;
pub mod archive;
pub mod baseline;
pub mod climate;
pub mod config;
pub mod error;
pub mod geometry;
pub mod models;
pub mod ndvi;
pub mod power;
pub mod regions;
pub mod routes;

pub use analysis::{AnalysisSettings, AppState};
pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use routes::router;
