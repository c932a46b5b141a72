use std::sync::Arc;

use actix_web::cookie::{Cookie, Key};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use chrono::Local;

use smart_attendance::credentials::hash_password;
use smart_attendance::database::Database;
use smart_attendance::models::{
    AttendanceMark, AttendanceMethod, AttendanceStatus, FaceDescriptor, NewSchool, NewUser, Role,
    ScoreUpdate, StudentDetails, FACE_DESCRIPTOR_LEN,
};
use smart_attendance::predictions::{PredictionRunner, ScorerCommand};
use smart_attendance::{routes, session, AppState};

const PASSWORD: &str = "chalkboard";

struct Fixture {
    db: Database,
    state: web::Data<AppState>,
    school_id: i64,
}

async fn fixture(scorer: ScorerCommand) -> Fixture {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let school = db
        .create_school(&NewSchool {
            name: "Riverside Primary".into(),
            code: "RSP-01".into(),
            address: None,
            district: "Nashik".into(),
            state: None,
            latitude: None,
            longitude: None,
        })
        .await
        .unwrap();

    for (email, role, school_id) in [
        ("teacher@example.org", Role::Teacher, Some(school.id)),
        ("official@example.org", Role::Government, None),
    ] {
        db.create_user(&NewUser {
            name: email.split('@').next().unwrap().to_string(),
            email: email.into(),
            password_hash: hash_password(PASSWORD).unwrap(),
            role,
            school_id,
        })
        .await
        .unwrap();
    }

    let state = web::Data::new(AppState {
        db: db.clone(),
        predictions: Arc::new(PredictionRunner::new(scorer)),
        high_risk_threshold: 0.7,
    });
    Fixture {
        db,
        state,
        school_id: school.id,
    }
}

fn passing_scorer() -> ScorerCommand {
    ScorerCommand::new("sh").with_args(["-c", "exit 0"])
}

fn details(name: &str) -> StudentDetails {
    StudentDetails {
        name: name.into(),
        roll_number: None,
        rfid_tag_id: None,
        class: Some("5A".into()),
        section: None,
        parent_contact: None,
        parent_email: None,
        face_descriptor: FaceDescriptor::try_from(vec![0.1; FACE_DESCRIPTOR_LEN]).unwrap(),
    }
}

async fn add_students(fx: &Fixture, n: usize) -> Vec<i64> {
    let mut ids = Vec::new();
    for i in 0..n {
        let student = fx
            .db
            .create_student(fx.school_id, &details(&format!("Student {i}")))
            .await
            .unwrap();
        ids.push(student.id);
    }
    ids
}

macro_rules! app {
    ($fx:expr) => {
        test::init_service(
            App::new()
                .wrap(session::session_middleware(Key::generate(), false))
                .app_data($fx.state.clone())
                .configure(routes::configure),
        )
        .await
    };
}

macro_rules! sign_in {
    ($app:expr, $email:expr) => {{
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_form([("email", $email), ("password", PASSWORD)])
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cookie: Cookie<'static> = resp
            .response()
            .cookies()
            .find(|c| c.name() == "attendance_session")
            .expect("session cookie")
            .into_owned();
        cookie
    }};
}

#[actix_web::test]
async fn dashboard_shows_todays_rate() {
    let fx = fixture(passing_scorer()).await;
    let ids = add_students(&fx, 10).await;
    let today = Local::now().date_naive();
    for (i, id) in ids.iter().enumerate() {
        let status = if i < 7 {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        };
        fx.db
            .mark_attendance(&AttendanceMark {
                student_id: *id,
                school_id: fx.school_id,
                date: today,
                status,
                method: AttendanceMethod::Manual,
                marked_by: None,
            })
            .await
            .unwrap();
    }

    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");
    let req = test::TestRequest::get()
        .uri("/teacher/dashboard")
        .cookie(cookie)
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains(r#"<div class="value">70.0%</div>"#), "{body}");
}

#[actix_web::test]
async fn dashboard_rate_is_zero_without_students() {
    let fx = fixture(passing_scorer()).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    let req = test::TestRequest::get()
        .uri("/teacher/dashboard")
        .cookie(cookie)
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains(r#"<div class="value">0%</div>"#), "{body}");
}

#[actix_web::test]
async fn short_face_descriptor_never_creates_a_student() {
    let fx = fixture(passing_scorer()).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    let req = test::TestRequest::post()
        .uri("/teacher/students/add")
        .cookie(cookie)
        .set_form([("name", "Asha"), ("face_descriptor", "[0.1, 0.2, 0.3]")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("Face capture required"));

    assert_eq!(fx.db.count_students(fx.school_id).await.unwrap(), 0);
}

#[actix_web::test]
async fn repeated_marking_keeps_one_record_per_day() {
    let fx = fixture(passing_scorer()).await;
    let ids = add_students(&fx, 2).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    for status in ["present", "late"] {
        let first = format!("attendance[{}]", ids[0]);
        let second = format!("attendance[{}]", ids[1]);
        let req = test::TestRequest::post()
            .uri("/teacher/mark-attendance")
            .cookie(cookie.clone())
            .set_form([(first.as_str(), status), (second.as_str(), "absent")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    let today = Local::now().date_naive();
    for id in &ids {
        let n = fx
            .db
            .count_attendance_records(*id, fx.school_id, today)
            .await
            .unwrap();
        assert_eq!(n, 1);
    }
    let records = fx.db.attendance_between(fx.school_id, today, today).await.unwrap();
    let first = records.iter().find(|r| r.student_id == ids[0]).unwrap();
    assert_eq!(first.status, AttendanceStatus::Late);
}

#[actix_web::test]
async fn failing_scorer_answers_json_error_and_keeps_scores() {
    let fx = fixture(ScorerCommand::new("sh").with_args(["-c", "echo 'model missing' >&2; exit 1"])).await;
    let ids = add_students(&fx, 1).await;
    fx.db
        .apply_scores(&[ScoreUpdate {
            student_id: ids[0],
            school_id: fx.school_id,
            attendance_percentage: 80.0,
            max_consec_absences: 2,
            num_long_streaks: 0,
            dropout_risk: 0.25,
            dropout_pred: 0,
        }])
        .await
        .unwrap();

    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");
    let req = test::TestRequest::get()
        .uri(&format!("/predictions/{}", fx.school_id))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["error"], "ML script failed");
    assert_eq!(json["details"], "model missing");

    let student = fx.db.get_student(ids[0]).await.unwrap().unwrap();
    assert_eq!(student.dropout_risk, Some(0.25));
    assert_eq!(student.attendance_percentage, Some(80.0));
}

#[actix_web::test]
async fn successful_refresh_returns_school_snapshot() {
    let fx = fixture(passing_scorer()).await;
    add_students(&fx, 2).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "official@example.org");

    let req = test::TestRequest::get()
        .uri(&format!("/predictions/{}", fx.school_id))
        .cookie(cookie)
        .to_request();
    let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let students = json.as_array().unwrap();
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["schoolId"], fx.school_id);
    for key in ["attendancePercentage", "dropoutRisk", "max_consec_absences", "num_long_streaks", "dropout_pred"] {
        assert!(students[0].get(key).is_some(), "missing {key}");
    }
}

#[actix_web::test]
async fn teachers_cannot_refresh_other_schools() {
    let fx = fixture(passing_scorer()).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    let req = test::TestRequest::get()
        .uri(&format!("/predictions/{}", fx.school_id + 1))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn anonymous_requests_are_turned_away() {
    let fx = fixture(passing_scorer()).await;
    let app = app!(fx);

    let req = test::TestRequest::get().uri("/teacher/dashboard").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/auth/login");

    let req = test::TestRequest::get()
        .uri("/teacher/api/students/face-descriptors")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], false);
}

#[actix_web::test]
async fn roles_are_kept_apart() {
    let fx = fixture(passing_scorer()).await;
    let app = app!(fx);

    let teacher = sign_in!(app, "teacher@example.org");
    let req = test::TestRequest::get()
        .uri("/government/dashboard")
        .cookie(teacher)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let official = sign_in!(app, "official@example.org");
    let req = test::TestRequest::get()
        .uri("/government/dashboard")
        .cookie(official)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("Riverside Primary"));
}

#[actix_web::test]
async fn face_recognition_marks_the_nearest_student_present() {
    let fx = fixture(passing_scorer()).await;
    let ids = add_students(&fx, 1).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    let req = test::TestRequest::post()
        .uri("/teacher/api/attendance/recognize")
        .cookie(cookie.clone())
        .set_json(serde_json::json!({ "descriptor": vec![0.11; FACE_DESCRIPTOR_LEN] }))
        .to_request();
    let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json["studentId"], ids[0]);

    let today = Local::now().date_naive();
    let records = fx.db.attendance_between(fx.school_id, today, today).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].method, AttendanceMethod::Automatic);

    let req = test::TestRequest::post()
        .uri("/teacher/api/attendance/recognize")
        .cookie(cookie)
        .set_json(serde_json::json!({ "descriptor": vec![0.9; FACE_DESCRIPTOR_LEN] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn bad_face_descriptor_leaves_an_edited_student_untouched() {
    let fx = fixture(passing_scorer()).await;
    let ids = add_students(&fx, 1).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    for descriptor in ["[0.1, 0.2, 0.3]", r#"["a", "b", "c"]"#] {
        let req = test::TestRequest::post()
            .uri(&format!("/teacher/students/{}/edit", ids[0]))
            .cookie(cookie.clone())
            .set_form([("name", "Renamed"), ("face_descriptor", descriptor)])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("128-length face descriptor"));
    }

    let student = fx.db.get_student(ids[0]).await.unwrap().unwrap();
    assert_eq!(student.name, "Student 0");
    assert_eq!(
        student.face_descriptor.map(|d| d.0),
        Some(FaceDescriptor::try_from(vec![0.1; FACE_DESCRIPTOR_LEN]).unwrap())
    );
}

#[actix_web::test]
async fn malformed_recognition_payloads_get_json_errors() {
    let fx = fixture(passing_scorer()).await;
    add_students(&fx, 1).await;
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    let payloads = [
        serde_json::json!({ "descriptor": vec![0.1; 5] }),
        serde_json::json!({ "descriptor": vec!["a"; FACE_DESCRIPTOR_LEN] }),
        serde_json::json!({ "descriptor": "not an array" }),
    ];
    for payload in payloads {
        let req = test::TestRequest::post()
            .uri("/teacher/api/attendance/recognize")
            .cookie(cookie.clone())
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].is_string());
    }

    let today = Local::now().date_naive();
    let records = fx.db.attendance_between(fx.school_id, today, today).await.unwrap();
    assert!(records.is_empty());
}

#[actix_web::test]
async fn attendance_edit_with_bad_status_type_gets_json_error() {
    let fx = fixture(passing_scorer()).await;
    let ids = add_students(&fx, 1).await;
    let record = fx
        .db
        .mark_attendance(&AttendanceMark {
            student_id: ids[0],
            school_id: fx.school_id,
            date: Local::now().date_naive(),
            status: AttendanceStatus::Absent,
            method: AttendanceMethod::Manual,
            marked_by: None,
        })
        .await
        .unwrap();
    let app = app!(fx);
    let cookie = sign_in!(app, "teacher@example.org");

    let req = test::TestRequest::put()
        .uri(&format!("/teacher/attendance/{}", record.id))
        .cookie(cookie)
        .set_json(serde_json::json!({ "status": 5 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], false);

    let today = Local::now().date_naive();
    let records = fx.db.attendance_between(fx.school_id, today, today).await.unwrap();
    assert_eq!(records[0].status, AttendanceStatus::Absent);
}
