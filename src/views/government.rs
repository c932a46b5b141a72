use serde::Serialize;

use super::{alert, card, html_escape, layout, or_dash, risk};
use crate::analytics::{DayAttendance, DistrictAnalytics, GovernmentOverview, SchoolStats};
use crate::models::Student;
use crate::routes::government::SchoolForm;
use crate::session::SessionUser;

const CHART_SCRIPT: &str = r#"<script src="https://cdn.jsdelivr.net/npm/chart.js@4"></script>"#;

fn rate_class(rate: &str) -> &'static str {
    match rate.parse::<f64>().unwrap_or(0.0) {
        r if r >= 90.0 => "pass",
        r if r >= 75.0 => "warning",
        _ => "fail",
    }
}

/// JSON for an inline script block; `</` is broken up so names cannot close the tag.
fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

fn coordinates(school: &SchoolStats) -> String {
    match (school.school.latitude, school.school.longitude) {
        (Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
        _ => "-".to_string(),
    }
}

pub fn dashboard(user: &SessionUser, overview: &GovernmentOverview) -> String {
    let rows: String = overview
        .schools
        .iter()
        .map(|s| {
            format!(
                r#"<tr class="{class}"><td><a href="/government/schools/{id}">{name}</a></td><td>{code}</td><td>{district}</td><td>{coords}</td><td>{students}</td><td>{rate}%</td><td>{high}</td><td>{risk}%</td></tr>"#,
                class = rate_class(&s.attendance_rate),
                id = s.school.id,
                name = html_escape(&s.school.name),
                code = html_escape(&s.school.code),
                district = html_escape(&s.school.district),
                coords = coordinates(s),
                students = s.total_students,
                rate = s.attendance_rate,
                high = s.high_risk_students,
                risk = s.dropout_risk,
            )
        })
        .collect();

    let overall = &overview.overall;
    let body = format!(
        r#"<h1>Government dashboard</h1>
        <div class="cards">{schools}{students}{attendance}{dropout}</div>
        <h2>Schools</h2>
        <p>Rows are coloured by today's attendance: green 90% and above, amber 75% and above, red below.</p>
        <table class="table">
            <tr><th>School</th><th>Code</th><th>District</th><th>Location</th><th>Students</th><th>Attendance today</th><th>High risk</th><th>Dropout risk</th></tr>
            {rows}
        </table>
        <p><a class="button" href="/government/schools/add">Add school</a> <a class="button" href="/government/analytics">District analytics</a></p>"#,
        schools = card("Schools", &overall.total_schools.to_string()),
        students = card("Students", &overall.total_students.to_string()),
        attendance = card("Average attendance", &format!("{}%", overall.avg_attendance)),
        dropout = card("Average dropout risk", &format!("{}%", overall.avg_dropout_risk)),
    );
    layout("Government Dashboard", Some(user), &body)
}

pub fn add_school(user: &SessionUser, form: &SchoolForm, error: Option<&str>) -> String {
    let field = |id: &str, label: &str, value: &Option<String>, required: bool| {
        format!(
            r#"<div class="form-group"><label for="{id}">{label}</label><input id="{id}" name="{id}" value="{}"{}></div>"#,
            html_escape(value.as_deref().unwrap_or_default()),
            if required { " required" } else { "" }
        )
    };
    let body = format!(
        r#"<h1>Add school</h1>
        {error}
        <form method="post" action="/government/schools/add">
            {name}{code}{address}{district}{state}{latitude}{longitude}
            <button type="submit">Add school</button>
        </form>"#,
        error = alert("fail", error),
        name = field("name", "Name", &form.name, true),
        code = field("code", "School code", &form.code, true),
        address = field("address", "Address", &form.address, false),
        district = field("district", "District", &form.district, true),
        state = field("state", "State", &form.state, false),
        latitude = field("latitude", "Latitude", &form.latitude, false),
        longitude = field("longitude", "Longitude", &form.longitude, false),
    );
    layout("Add School", Some(user), &body)
}

pub fn school_detail(
    user: &SessionUser,
    stats: &SchoolStats,
    trend: &[DayAttendance],
    students: &[Student],
    risk_students: &[Student],
) -> String {
    let school = &stats.school;
    let trend_rows: String = trend
        .iter()
        .map(|d| format!("<tr><td>{}</td><td>{}</td><td>{}%</td></tr>", d.date, d.present, d.percentage))
        .collect();
    let risk_rows: String = risk_students
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&s.name),
                or_dash(s.class.as_deref()),
                s.attendance_percentage.map_or("-".to_string(), |p| format!("{p:.1}%")),
                risk(s.dropout_risk),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>{name}</h1>
        <p>{code} | {address} | {district}, {state}</p>
        <div class="cards">{students}{rate}{high}{dropout}</div>
        <h2>Last 7 days</h2>
        <table class="table"><tr><th>Date</th><th>Present</th><th>Rate</th></tr>{trend_rows}</table>
        <h2>High-risk students</h2>
        <table class="table"><tr><th>Name</th><th>Class</th><th>Attendance</th><th>Dropout risk</th></tr>{risk_rows}</table>"#,
        name = html_escape(&school.name),
        code = html_escape(&school.code),
        address = or_dash(school.address.as_deref()),
        district = html_escape(&school.district),
        state = or_dash(school.state.as_deref()),
        students = card("Students", &students.len().to_string()),
        rate = card("Attendance today", &format!("{}%", stats.attendance_rate)),
        high = card("High-risk students", &risk_students.len().to_string()),
        dropout = card("Dropout risk", &format!("{}%", stats.dropout_risk)),
    );
    layout(&school.name, Some(user), &body)
}

pub fn analytics(user: &SessionUser, analytics: &DistrictAnalytics) -> String {
    let district_rows: String = analytics
        .districts
        .iter()
        .map(|d| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}%</td><td>{}%</td></tr>",
                html_escape(&d.district),
                d.schools,
                d.total_students,
                d.avg_attendance,
                d.avg_dropout_risk
            )
        })
        .collect();
    let best = match &analytics.best_performing {
        Some(best) => format!("{} ({}%)", best.name, best.rate),
        None => "-".to_string(),
    };

    let body = format!(
        r#"<h1>District analytics</h1>
        <div class="cards">{average}{trend}{best}{attention}{students}</div>
        <h2>Districts</h2>
        <table class="table">
            <tr><th>District</th><th>Schools</th><th>Students</th><th>Average attendance</th><th>Average dropout risk</th></tr>
            {district_rows}
        </table>
        <h2>Attendance, last 30 days</h2>
        <canvas id="trend-chart" height="100"></canvas>
        <h2>Schools, last 7 days</h2>
        <canvas id="school-chart" height="100"></canvas>
        {CHART_SCRIPT}
        <script>
            new Chart(document.getElementById('trend-chart'), {{
                type: 'line',
                data: {{ labels: {trend_labels}, datasets: [{{ label: 'Attendance %', data: {trend_data}, borderColor: '#007bff' }}] }},
                options: {{ scales: {{ y: {{ min: 0, max: 100 }} }} }}
            }});
            new Chart(document.getElementById('school-chart'), {{
                type: 'bar',
                data: {{ labels: {school_labels}, datasets: [{{ label: '7-day attendance %', data: {school_data}, backgroundColor: '#28a745' }}] }},
                options: {{ scales: {{ y: {{ min: 0, max: 100 }} }} }}
            }});
        </script>"#,
        average = card("District average", &format!("{}%", analytics.district_average)),
        trend = card("Trend vs. previous week", &format!("{}%", analytics.district_trend)),
        best = card("Best performing", &best),
        attention = card("Schools under 80%", &analytics.needs_attention.to_string()),
        students = card("Students", &analytics.total_students.to_string()),
        trend_labels = script_json(&analytics.trend_labels),
        trend_data = script_json(&analytics.trend_data),
        school_labels = script_json(&analytics.school_labels),
        school_data = script_json(&analytics.school_data),
    );
    layout("District Analytics", Some(user), &body)
}
