pub mod auth;
pub mod government;
pub mod predictions;
pub mod teacher;

use actix_session::Session;
use actix_web::http::header::{self, ContentType};
use actix_web::{web, HttpResponse};
use chrono::{Local, NaiveDate};

use crate::error::{AppError, AppResult, JsonError};
use crate::session;
use crate::views;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .service(web::scope("/auth").configure(auth::configure))
        .service(
            web::scope("/teacher")
                .app_data(json_body_errors())
                .configure(teacher::configure),
        )
        .service(web::scope("/government").configure(government::configure))
        .service(web::scope("/predictions").configure(predictions::configure));
}

/// Malformed JSON bodies answer with the JSON error shape instead of plain text.
fn json_body_errors() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| JsonError(AppError::Validation(err.to_string())).into())
}

async fn index(session: Session) -> HttpResponse {
    html(views::index(session::current_user(&session).as_ref()))
}

pub(crate) fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type(ContentType::html()).body(body)
}

pub(crate) fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Calendar day attendance is recorded against.
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Trims a form value, treating blank input as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("{field} must be a date like 2025-01-31")))
}

pub(crate) fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
