use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{count, html, non_empty, redirect, today};
use crate::analytics::{
    self, DistrictAnalytics, DistrictInput, DistrictSchoolInput, GovernmentOverview,
    SchoolSnapshot, SchoolStats, PERIOD_DAYS, TREND_DAYS,
};
use crate::database::{is_unique_violation, Database};
use crate::error::{AppError, AppResult};
use crate::models::{NewSchool, School};
use crate::session::GovernmentContext;
use crate::views;
use crate::AppState;

const DETAIL_TREND_DAYS: u64 = 7;
const DETAIL_RISK_LIMIT: i64 = 50;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(dashboard))
        .route("/schools/add", web::get().to(add_school_page))
        .route("/schools/add", web::post().to(add_school))
        .route("/schools/{id}", web::get().to(school_detail))
        .route("/analytics", web::get().to(district_analytics));
}

async fn snapshot(
    db: &Database,
    school: School,
    day: NaiveDate,
    threshold: f64,
) -> Result<SchoolSnapshot, sqlx::Error> {
    Ok(SchoolSnapshot {
        total_students: count(db.count_students(school.id).await?),
        present_today: count(db.count_present(Some(school.id), day, day).await?),
        high_risk_students: count(db.count_high_risk(school.id, threshold).await?),
        school,
    })
}

async fn snapshots(state: &AppState, day: NaiveDate) -> Result<Vec<SchoolSnapshot>, sqlx::Error> {
    let mut snapshots = Vec::new();
    for school in state.db.list_schools().await? {
        snapshots.push(snapshot(&state.db, school, day, state.high_risk_threshold).await?);
    }
    Ok(snapshots)
}

async fn dashboard(state: web::Data<AppState>, ctx: GovernmentContext) -> AppResult<HttpResponse> {
    let overview = GovernmentOverview::build(snapshots(&state, today()).await?);
    Ok(html(views::government::dashboard(&ctx.user, &overview)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SchoolForm {
    pub name: Option<String>,
    pub code: Option<String>,
    pub address: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

fn coordinate(field: &str, value: &Option<String>, limit: f64) -> Result<Option<f64>, String> {
    let Some(raw) = non_empty(value.clone()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= limit => Ok(Some(v)),
        _ => Err(format!("{field} must be a number between -{limit} and {limit}")),
    }
}

impl SchoolForm {
    pub fn validate(&self) -> Result<NewSchool, String> {
        let required = |field: &str, value: &Option<String>| {
            non_empty(value.clone()).ok_or_else(|| format!("{field} is required"))
        };
        Ok(NewSchool {
            name: required("Name", &self.name)?,
            code: required("School code", &self.code)?,
            district: required("District", &self.district)?,
            address: non_empty(self.address.clone()),
            state: non_empty(self.state.clone()),
            latitude: coordinate("Latitude", &self.latitude, 90.0)?,
            longitude: coordinate("Longitude", &self.longitude, 180.0)?,
        })
    }
}

async fn add_school_page(ctx: GovernmentContext) -> HttpResponse {
    html(views::government::add_school(&ctx.user, &SchoolForm::default(), None))
}

async fn add_school(
    state: web::Data<AppState>,
    ctx: GovernmentContext,
    form: web::Form<SchoolForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let new_school = match form.validate() {
        Ok(school) => school,
        Err(message) => {
            return Ok(html(views::government::add_school(&ctx.user, &form, Some(&message))))
        }
    };

    match state.db.create_school(&new_school).await {
        Ok(school) => {
            tracing::info!(school_id = school.id, code = %school.code, "registered school");
            Ok(redirect("/government/dashboard"))
        }
        Err(err) if is_unique_violation(&err) => Ok(html(views::government::add_school(
            &ctx.user,
            &form,
            Some("A school with this code already exists"),
        ))),
        Err(err) => Err(err.into()),
    }
}

async fn school_detail(
    state: web::Data<AppState>,
    ctx: GovernmentContext,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let school = state
        .db
        .get_school(path.into_inner())
        .await?
        .ok_or(AppError::NotFound("school"))?;
    let school_id = school.id;
    let today = today();

    let mut daily = Vec::with_capacity(DETAIL_TREND_DAYS as usize);
    for offset in (0..DETAIL_TREND_DAYS).rev() {
        let day = analytics::days_before(today, offset);
        daily.push((day, count(state.db.count_present(Some(school_id), day, day).await?)));
    }

    let snapshot = snapshot(&state.db, school, today, state.high_risk_threshold).await?;
    let trend = analytics::day_attendance(&daily, snapshot.total_students);
    let students = state.db.students_by_name(school_id).await?;
    let risk_students = state
        .db
        .high_risk_students(school_id, state.high_risk_threshold, DETAIL_RISK_LIMIT)
        .await?;

    Ok(html(views::government::school_detail(
        &ctx.user,
        &SchoolStats::from(snapshot),
        &trend,
        &students,
        &risk_students,
    )))
}

async fn district_analytics(
    state: web::Data<AppState>,
    ctx: GovernmentContext,
) -> AppResult<HttpResponse> {
    let today = today();
    let current_start = analytics::days_before(today, PERIOD_DAYS);
    let current_end = analytics::days_before(today, 1);
    let previous_start = analytics::days_before(today, PERIOD_DAYS * 2);
    let previous_end = analytics::days_before(today, PERIOD_DAYS + 1);

    let mut schools = Vec::new();
    for snapshot in snapshots(&state, today).await? {
        let present = state
            .db
            .count_present(Some(snapshot.school.id), current_start, current_end)
            .await?;
        schools.push(DistrictSchoolInput {
            snapshot,
            present_in_period: count(present),
        });
    }

    let mut daily_present = Vec::with_capacity(TREND_DAYS as usize);
    for offset in (0..TREND_DAYS).rev() {
        let day = analytics::days_before(today, offset);
        daily_present.push((day, count(state.db.count_present(None, day, day).await?)));
    }

    let input = DistrictInput {
        schools,
        total_students: count(state.db.count_all_students().await?),
        current_period_present: count(state.db.count_present(None, current_start, current_end).await?),
        previous_period_present: count(
            state.db.count_present(None, previous_start, previous_end).await?,
        ),
        daily_present,
    };

    Ok(html(views::government::analytics(&ctx.user, &DistrictAnalytics::build(input))))
}
