//! Smart Attendance: school attendance tracking for teachers, cross-school
//! dashboards for government officials, and dropout-risk scoring.

pub mod analytics;
pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod face;
pub mod logging;
pub mod models;
pub mod predictions;
pub mod routes;
pub mod scoring;
pub mod session;
pub mod views;

use std::sync::Arc;

use database::Database;
use predictions::PredictionRunner;

/// Shared by every request handler through `web::Data`.
pub struct AppState {
    pub db: Database,
    pub predictions: Arc<PredictionRunner>,
    /// Dropout risk strictly above this marks a student as high risk.
    pub high_risk_threshold: f64,
}
