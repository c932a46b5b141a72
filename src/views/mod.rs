//! Server-rendered pages. Every value that originates from a user goes
//! through [`html_escape`].

pub mod auth;
pub mod government;
pub mod teacher;

use actix_web::http::StatusCode;

use crate::models::{AttendanceStatus, Role};
use crate::session::SessionUser;

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; max-width: 1100px; margin: 0 auto; padding: 20px; color: #222; }
        nav { background: #343a40; padding: 12px 20px; border-radius: 8px; margin-bottom: 20px; }
        nav a { color: #fff; text-decoration: none; margin-right: 18px; }
        nav .who { float: right; color: #ced4da; }
        .container { background: #f5f5f5; padding: 25px; border-radius: 10px; }
        .form-group { margin: 15px 0; }
        label { display: block; margin-bottom: 5px; font-weight: bold; }
        input, select, textarea { width: 100%; padding: 10px; border: 1px solid #ddd; border-radius: 4px; box-sizing: border-box; }
        button, .button { background: #007bff; color: white; padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; margin: 5px 0; text-decoration: none; display: inline-block; }
        button:hover, .button:hover { background: #0056b3; }
        .cards { display: flex; flex-wrap: wrap; gap: 15px; margin: 20px 0; }
        .card { background: #fff; padding: 18px; border-radius: 8px; flex: 1; min-width: 160px; box-shadow: 0 1px 3px rgba(0,0,0,.1); }
        .card .value { font-size: 28px; font-weight: bold; }
        .pass { background: #d4edda; color: #155724; border: 1px solid #c3e6cb; }
        .fail { background: #f8d7da; color: #721c24; border: 1px solid #f5c6cb; }
        .warning { background: #fff3cd; color: #856404; border: 1px solid #ffeaa7; }
        .info { background: #d1ecf1; color: #0c5460; border: 1px solid #bee5eb; }
        .alert { padding: 12px 16px; border-radius: 5px; margin: 10px 0; }
        .filters { display: flex; gap: 10px; align-items: flex-end; flex-wrap: wrap; }
        .filters .form-group { flex: 1; min-width: 140px; }
        .table { width: 100%; border-collapse: collapse; margin: 15px 0; background: #fff; }
        .table th, .table td { padding: 10px; text-align: left; border-bottom: 1px solid #ddd; }
        .table th { background: #f8f9fa; }
        .badge { padding: 3px 8px; border-radius: 10px; font-size: 12px; }
        .badge.present { background: #d4edda; color: #155724; }
        .badge.absent { background: #f8d7da; color: #721c24; }
        .badge.late { background: #fff3cd; color: #856404; }
        .badge.excused { background: #d1ecf1; color: #0c5460; }
        .bar { background: #e9ecef; border-radius: 4px; height: 14px; }
        .bar span { display: block; background: #28a745; height: 14px; border-radius: 4px; }
"#;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Escaped optional text, or a dash when absent.
pub fn or_dash(value: Option<&str>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => html_escape(v),
        None => "-".to_string(),
    }
}

fn nav(user: Option<&SessionUser>) -> String {
    let links = match user.map(|u| u.role) {
        Some(Role::Teacher) => concat!(
            r#"<a href="/teacher/dashboard">Dashboard</a>"#,
            r#"<a href="/teacher/students">Students</a>"#,
            r#"<a href="/teacher/mark-attendance">Mark Attendance</a>"#,
            r#"<a href="/teacher/attendance">Attendance</a>"#,
            r#"<a href="/teacher/facial-recognition">Face Recognition</a>"#,
            r#"<a href="/teacher/reports">Reports</a>"#,
        ),
        Some(Role::Government) => concat!(
            r#"<a href="/government/dashboard">Dashboard</a>"#,
            r#"<a href="/government/schools/add">Add School</a>"#,
            r#"<a href="/government/analytics">Analytics</a>"#,
        ),
        None => r#"<a href="/">Home</a><a href="/auth/login">Login</a><a href="/auth/register">Register</a>"#,
    };
    let who = match user {
        Some(user) => format!(
            r#"<span class="who">{} ({}) | <a href="/auth/logout">Logout</a></span>"#,
            html_escape(&user.name),
            user.role.as_str()
        ),
        None => String::new(),
    };
    format!("<nav>{links}{who}</nav>")
}

pub fn layout(title: &str, user: Option<&SessionUser>, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - Smart Attendance</title>
    <style>{STYLE}</style>
</head>
<body>
    {nav}
    <div class="container">
{body}
    </div>
</body>
</html>"#,
        title = html_escape(title),
        nav = nav(user),
    )
}

pub fn alert(kind: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!(r#"<div class="alert {kind}">{}</div>"#, html_escape(message)),
        None => String::new(),
    }
}

pub fn status_badge(status: AttendanceStatus) -> String {
    format!(r#"<span class="badge {0}">{0}</span>"#, status.as_str())
}

pub fn card(label: &str, value: &str) -> String {
    format!(
        r#"<div class="card"><div>{}</div><div class="value">{}</div></div>"#,
        html_escape(label),
        html_escape(value)
    )
}

pub fn risk(value: Option<f64>) -> String {
    match value {
        Some(risk) => format!("{:.0}%", risk * 100.0),
        None => "-".to_string(),
    }
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"<h1>{} {}</h1>
        <div class="alert fail">{}</div>
        <p><a class="button" href="/">Back to home</a></p>"#,
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error"),
        html_escape(message)
    );
    layout("Error", None, &body)
}

pub fn index(user: Option<&SessionUser>) -> String {
    let action = match user {
        Some(user) => format!(r#"<a class="button" href="{}">Go to dashboard</a>"#, user.role.home()),
        None => r#"<a class="button" href="/auth/login">Login</a> <a class="button" href="/auth/register">Register</a>"#
            .to_string(),
    };
    let body = format!(
        r#"<h1>Smart Attendance</h1>
        <p>Track daily attendance, recognise students by face and spot those at risk of dropping out.</p>
        <div class="cards">
            <div class="card"><strong>Teachers</strong><p>Manage students, mark attendance and read class reports.</p></div>
            <div class="card"><strong>Government</strong><p>Register schools and compare attendance across districts.</p></div>
        </div>
        {action}"#
    );
    layout("Home", user, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#x27;y&#x27;"
        );
    }

    #[test]
    fn error_page_shows_status_and_escaped_message() {
        let page = error_page(StatusCode::NOT_FOUND, "student <b> not found");
        assert!(page.contains("404 Not Found"));
        assert!(page.contains("student &lt;b&gt; not found"));
    }

    #[test]
    fn navigation_follows_role() {
        let teacher = SessionUser {
            id: 1,
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            role: Role::Teacher,
            school_id: Some(1),
        };
        let page = layout("Dashboard", Some(&teacher), "");
        assert!(page.contains("/teacher/mark-attendance"));
        assert!(!page.contains("/government/analytics"));
    }
}
