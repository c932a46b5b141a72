use actix_web::{web, HttpResponse};

use crate::error::{AppError, JsonError, JsonResult};
use crate::models::Role;
use crate::session::{Api, RequestContext};
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/{school_id}", web::get().to(refresh));
}

/// Runs the scorer now and returns the school's refreshed prediction fields.
async fn refresh(
    state: web::Data<AppState>,
    Api(ctx): Api<RequestContext>,
    path: web::Path<i64>,
) -> JsonResult<HttpResponse> {
    let school_id = path.into_inner();
    if ctx.user.role == Role::Teacher && ctx.user.school_id != Some(school_id) {
        return Err(JsonError(AppError::Forbidden));
    }

    let report = state.predictions.run().await?;
    tracing::info!(school_id, duration = ?report.duration, "on-demand prediction refresh");

    let students = state.db.prediction_snapshot(school_id).await?;
    Ok(HttpResponse::Ok().json(students))
}
