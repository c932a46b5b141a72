use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{count, html, non_empty, parse_date, redirect, today};
use crate::analytics::{self, DailyStats, ProfileStats, ReportInput, TeacherReport, TREND_DAYS};
use crate::error::{AppError, AppResult, JsonError, JsonResult};
use crate::face::{self, KnownFace};
use crate::models::{
    AttendanceMark, AttendanceMethod, AttendanceStatus, FaceDescriptor, Student, StudentDetails,
    StudentFilter,
};
use crate::session::{Api, TeacherContext};
use crate::views;
use crate::AppState;

const ADD_FACE_ERROR: &str = "Face capture required. Please capture a clear face before submitting.";
const EDIT_FACE_ERROR: &str =
    "Face capture required. Please provide a valid 128-length face descriptor array.";
const DASHBOARD_RISK_LIMIT: i64 = 5;
const HISTORY_LIMIT: i64 = 30;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(dashboard))
        .route("/students", web::get().to(students))
        .route("/students/add", web::get().to(add_student_page))
        .route("/students/add", web::post().to(add_student))
        .route("/students/{id}", web::get().to(student_profile))
        .route("/students/{id}/edit", web::get().to(edit_student_page))
        .route("/students/{id}/edit", web::post().to(edit_student))
        .route("/attendance", web::get().to(attendance))
        .route("/attendance/{id}", web::put().to(update_attendance))
        .route("/mark-attendance", web::get().to(mark_attendance_page))
        .route("/mark-attendance", web::post().to(mark_attendance))
        .route("/reports", web::get().to(reports))
        .route("/facial-recognition", web::get().to(facial_recognition))
        .route("/api/students/face-descriptors", web::get().to(face_descriptors))
        .route("/api/attendance/recognize", web::post().to(recognize));
}

async fn dashboard(state: web::Data<AppState>, ctx: TeacherContext) -> AppResult<HttpResponse> {
    let today = today();
    let total = count(state.db.count_students(ctx.school_id).await?);
    let entries = state
        .db
        .attendance_entries(ctx.school_id, today, today, None)
        .await?;
    let present = entries.iter().filter(|e| e.record.is_present()).count();
    let stats = DailyStats::new(total, present);
    let risk_students = state
        .db
        .high_risk_students(ctx.school_id, state.high_risk_threshold, DASHBOARD_RISK_LIMIT)
        .await?;
    let school = state.db.get_school(ctx.school_id).await?;

    Ok(html(views::teacher::dashboard(
        &ctx.user,
        school.as_ref(),
        &stats,
        &entries,
        &risk_students,
    )))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StudentQuery {
    pub search: Option<String>,
    pub class: Option<String>,
}

async fn students(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    query: web::Query<StudentQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let filter = StudentFilter {
        search: non_empty(query.search),
        class: non_empty(query.class),
    };
    let students = state.db.list_students(ctx.school_id, &filter).await?;
    let classes = state.db.distinct_classes(ctx.school_id).await?;

    Ok(html(views::teacher::students(
        &ctx.user,
        &students,
        &classes,
        filter.search.as_deref().unwrap_or_default(),
        filter.class.as_deref().unwrap_or_default(),
    )))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StudentForm {
    pub name: String,
    pub roll_number: Option<String>,
    pub rfid_tag_id: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    pub parent_contact: Option<String>,
    pub parent_email: Option<String>,
    /// JSON array posted by the capture widget.
    pub face_descriptor: Option<String>,
}

impl StudentForm {
    pub fn from_student(student: &Student) -> Self {
        Self {
            name: student.name.clone(),
            roll_number: student.roll_number.clone(),
            rfid_tag_id: student.rfid_tag_id.clone(),
            class: student.class.clone(),
            section: student.section.clone(),
            parent_contact: student.parent_contact.clone(),
            parent_email: student.parent_email.clone(),
            face_descriptor: student
                .face_descriptor
                .as_ref()
                .and_then(|d| serde_json::to_string(&d.0).ok()),
        }
    }

    /// Validated details, or the message to show on the form.
    pub fn validate(&self, face_error: &str) -> Result<StudentDetails, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name is required".to_string());
        }
        let face_descriptor = FaceDescriptor::parse(self.face_descriptor.as_deref().unwrap_or_default())
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected face descriptor");
                face_error.to_string()
            })?;

        Ok(StudentDetails {
            name: name.to_string(),
            roll_number: non_empty(self.roll_number.clone()),
            rfid_tag_id: non_empty(self.rfid_tag_id.clone()),
            class: non_empty(self.class.clone()),
            section: non_empty(self.section.clone()),
            parent_contact: non_empty(self.parent_contact.clone()),
            parent_email: non_empty(self.parent_email.clone()),
            face_descriptor,
        })
    }
}

async fn add_student_page(ctx: TeacherContext) -> HttpResponse {
    html(views::teacher::student_form(
        &ctx.user,
        "Add student",
        "/teacher/students/add",
        &StudentForm::default(),
        None,
    ))
}

async fn add_student(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    form: web::Form<StudentForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let details = match form.validate(ADD_FACE_ERROR) {
        Ok(details) => details,
        Err(message) => {
            return Ok(html(views::teacher::student_form(
                &ctx.user,
                "Add student",
                "/teacher/students/add",
                &form,
                Some(&message),
            )))
        }
    };

    let student = state.db.create_student(ctx.school_id, &details).await?;
    tracing::info!(student_id = student.id, school_id = ctx.school_id, "added student");
    Ok(redirect("/teacher/students"))
}

/// A student of the teacher's own school.
async fn school_student(state: &AppState, ctx: &TeacherContext, id: i64) -> AppResult<Student> {
    state
        .db
        .get_student(id)
        .await?
        .filter(|s| s.school_id == ctx.school_id)
        .ok_or(AppError::NotFound("student"))
}

async fn student_profile(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let student = school_student(&state, &ctx, path.into_inner()).await?;
    let since = analytics::days_before(today(), TREND_DAYS - 1);
    let recent = state.db.student_attendance_since(student.id, since).await?;
    let history = state.db.student_history(student.id, HISTORY_LIMIT).await?;

    Ok(html(views::teacher::student_profile(
        &ctx.user,
        &student,
        &ProfileStats::from_records(&recent),
        &history,
    )))
}

async fn edit_student_page(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let student = school_student(&state, &ctx, path.into_inner()).await?;
    Ok(html(views::teacher::student_form(
        &ctx.user,
        "Edit student",
        &format!("/teacher/students/{}/edit", student.id),
        &StudentForm::from_student(&student),
        None,
    )))
}

async fn edit_student(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    path: web::Path<i64>,
    form: web::Form<StudentForm>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let details = match form.validate(EDIT_FACE_ERROR) {
        Ok(details) => details,
        Err(message) => {
            school_student(&state, &ctx, id).await?;
            return Ok(html(views::teacher::student_form(
                &ctx.user,
                "Edit student",
                &format!("/teacher/students/{id}/edit"),
                &form,
                Some(&message),
            )));
        }
    };

    state
        .db
        .update_student(id, ctx.school_id, &details)
        .await?
        .ok_or(AppError::NotFound("student"))?;
    tracing::info!(student_id = id, "updated student");
    Ok(redirect("/teacher/students"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceQuery {
    pub date: Option<String>,
    #[serde(rename = "dateFrom")]
    pub date_from: Option<String>,
    #[serde(rename = "dateTo")]
    pub date_to: Option<String>,
    pub student: Option<String>,
}

impl AttendanceQuery {
    /// A single `date` wins over a `dateFrom`/`dateTo` pair; neither means today.
    pub fn range(&self, today: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
        if let Some(date) = non_empty(self.date.clone()) {
            let day = parse_date("date", &date)?;
            return Ok((day, day));
        }
        match (non_empty(self.date_from.clone()), non_empty(self.date_to.clone())) {
            (Some(from), Some(to)) => {
                let from = parse_date("dateFrom", &from)?;
                let to = parse_date("dateTo", &to)?;
                if from > to {
                    return Err(AppError::validation("dateFrom must not be after dateTo"));
                }
                Ok((from, to))
            }
            _ => Ok((today, today)),
        }
    }

    pub fn student_id(&self) -> AppResult<Option<i64>> {
        non_empty(self.student.clone())
            .map(|s| {
                s.parse()
                    .map_err(|_| AppError::validation("student must be a student id"))
            })
            .transpose()
    }
}

async fn attendance(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    query: web::Query<AttendanceQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let (from, to) = query.range(today())?;
    let student = query.student_id()?;

    let entries = state
        .db
        .attendance_entries(ctx.school_id, from, to, student)
        .await?;
    let students = state.db.students_by_name(ctx.school_id).await?;

    Ok(html(views::teacher::attendance(&ctx.user, &entries, &students, &query)))
}

#[derive(Debug, Deserialize)]
pub struct AttendanceEdit {
    pub status: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
struct Success {
    success: bool,
}

async fn update_attendance(
    state: web::Data<AppState>,
    Api(ctx): Api<TeacherContext>,
    path: web::Path<i64>,
    body: web::Json<AttendanceEdit>,
) -> JsonResult<HttpResponse> {
    let edit = body.into_inner();
    let status: AttendanceStatus = edit
        .status
        .parse()
        .map_err(|e: String| JsonError(AppError::Validation(e)))?;
    let remarks = non_empty(edit.remarks);

    state
        .db
        .update_attendance(path.into_inner(), ctx.school_id, status, remarks.as_deref())
        .await?
        .ok_or(JsonError(AppError::NotFound("attendance record")))?;

    Ok(HttpResponse::Ok().json(Success { success: true }))
}

async fn mark_attendance_page(
    state: web::Data<AppState>,
    ctx: TeacherContext,
) -> AppResult<HttpResponse> {
    let today = today();
    let students = state.db.list_students(ctx.school_id, &StudentFilter::default()).await?;
    let marked: HashMap<i64, AttendanceStatus> = state
        .db
        .attendance_between(ctx.school_id, today, today)
        .await?
        .into_iter()
        .map(|a| (a.student_id, a.status))
        .collect();

    Ok(html(views::teacher::mark_attendance(&ctx.user, &students, today, &marked)))
}

/// Reads `attendance[<student id>]=<status>` form fields.
pub fn parse_marks(fields: &[(String, String)]) -> Result<Vec<(i64, AttendanceStatus)>, String> {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let id = key.strip_prefix("attendance[")?.strip_suffix(']')?;
            Some((id, value))
        })
        .map(|(id, value)| {
            let id = id
                .parse::<i64>()
                .map_err(|_| format!("invalid student id '{id}'"))?;
            Ok((id, value.parse::<AttendanceStatus>()?))
        })
        .collect()
}

async fn mark_attendance(
    state: web::Data<AppState>,
    ctx: TeacherContext,
    form: web::Form<Vec<(String, String)>>,
) -> AppResult<HttpResponse> {
    let marks = parse_marks(&form).map_err(AppError::Validation)?;
    let date = today();

    let roster: std::collections::HashSet<i64> = state
        .db
        .list_students(ctx.school_id, &StudentFilter::default())
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let marks: Vec<AttendanceMark> = marks
        .into_iter()
        .filter(|(student_id, _)| {
            let known = roster.contains(student_id);
            if !known {
                tracing::warn!(student_id, school_id = ctx.school_id, "skipping student outside this school");
            }
            known
        })
        .map(|(student_id, status)| AttendanceMark {
            student_id,
            school_id: ctx.school_id,
            date,
            status,
            method: AttendanceMethod::Manual,
            marked_by: Some(ctx.user.id),
        })
        .collect();

    let stored = state.db.mark_attendance_batch(&marks).await?;
    tracing::info!(school_id = ctx.school_id, marked = stored.len(), %date, "marked attendance");
    Ok(redirect("/teacher/attendance"))
}

async fn reports(state: web::Data<AppState>, ctx: TeacherContext) -> AppResult<HttpResponse> {
    let today = today();
    let students = state.db.students_by_name(ctx.school_id).await?;
    let (month_start, month_end) = analytics::month_bounds(today);
    let trend_start = analytics::days_before(today, TREND_DAYS - 1);

    let records = state
        .db
        .attendance_between(ctx.school_id, month_start.min(trend_start), month_end.max(today))
        .await?;
    let within = |from: NaiveDate, to: NaiveDate| {
        records
            .iter()
            .filter(|a| a.date >= from && a.date <= to)
            .cloned()
            .collect::<Vec<_>>()
    };
    let today_records = within(today, today);
    let month_records = within(month_start, month_end);
    let trend_records = within(trend_start, today);

    let report = TeacherReport::build(ReportInput {
        today,
        students: &students,
        today_records: &today_records,
        month_records: &month_records,
        trend_records: &trend_records,
    });
    Ok(html(views::teacher::reports(&ctx.user, &report)))
}

async fn facial_recognition(ctx: TeacherContext) -> HttpResponse {
    html(views::teacher::facial_recognition(&ctx.user))
}

async fn face_descriptors(
    state: web::Data<AppState>,
    Api(ctx): Api<TeacherContext>,
) -> JsonResult<HttpResponse> {
    let students = state.db.students_with_face_descriptors(ctx.school_id).await?;
    Ok(HttpResponse::Ok().json(KnownFace::from_students(students)))
}

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub descriptor: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    success: bool,
    student_id: i64,
    name: String,
    distance: f64,
    attendance_id: i64,
}

async fn recognize(
    state: web::Data<AppState>,
    Api(ctx): Api<TeacherContext>,
    body: web::Json<RecognizeRequest>,
) -> JsonResult<HttpResponse> {
    let probe = FaceDescriptor::try_from(body.into_inner().descriptor)
        .map_err(|e| JsonError(AppError::Validation(e.to_string())))?;
    let known = KnownFace::from_students(state.db.students_with_face_descriptors(ctx.school_id).await?);

    let found = face::best_match(&probe, &known).ok_or(JsonError(AppError::NotFound("matching student")))?;
    let record = state
        .db
        .mark_attendance(&AttendanceMark {
            student_id: found.student_id,
            school_id: ctx.school_id,
            date: today(),
            status: AttendanceStatus::Present,
            method: AttendanceMethod::Automatic,
            marked_by: Some(ctx.user.id),
        })
        .await?;
    tracing::info!(
        student_id = found.student_id,
        distance = found.distance,
        "recognised student"
    );

    Ok(HttpResponse::Ok().json(RecognizeResponse {
        success: true,
        student_id: found.student_id,
        name: found.name,
        distance: found.distance,
        attendance_id: record.id,
    }))
}
