use std::collections::HashMap;

use chrono::NaiveDate;

use super::{alert, card, html_escape, layout, or_dash, risk, status_badge};
use crate::analytics::{DailyStats, ProfileStats, StudentRate, TeacherReport};
use crate::models::{Attendance, AttendanceEntry, AttendanceStatus, School, Student};
use crate::routes::teacher::{AttendanceQuery, StudentForm};
use crate::session::SessionUser;

const FACE_API_SCRIPT: &str =
    r#"<script src="https://cdn.jsdelivr.net/npm/face-api.js@0.22.2/dist/face-api.min.js"></script>"#;
const FACE_MODELS: &str = "https://cdn.jsdelivr.net/npm/@vladmandic/face-api/model/";

fn risk_table(students: &[Student]) -> String {
    if students.is_empty() {
        return r#"<p class="alert pass">No students above the risk threshold.</p>"#.to_string();
    }
    let rows: String = students
        .iter()
        .map(|s| {
            format!(
                r#"<tr><td><a href="/teacher/students/{}">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                s.id,
                html_escape(&s.name),
                or_dash(s.class.as_deref()),
                s.attendance_percentage.map_or("-".to_string(), |p| format!("{p:.1}%")),
                risk(s.dropout_risk),
            )
        })
        .collect();
    format!(
        r#"<table class="table"><tr><th>Name</th><th>Class</th><th>Attendance</th><th>Dropout risk</th></tr>{rows}</table>"#
    )
}

pub fn dashboard(
    user: &SessionUser,
    school: Option<&School>,
    stats: &DailyStats,
    today: &[AttendanceEntry],
    risk_students: &[Student],
) -> String {
    let school_name = school.map_or("Your school".to_string(), |s| html_escape(&s.name));
    let recent: String = today
        .iter()
        .map(|entry| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&entry.student_name),
                or_dash(entry.student_class.as_deref()),
                status_badge(entry.record.status),
                entry.record.method.as_str(),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>{school_name}</h1>
        <p>Welcome, {name}.</p>
        <div class="cards">
            {total}{present}{absent}{rate}
        </div>
        <h2>High-risk students</h2>
        {risk}
        <h2>Today's attendance</h2>
        <table class="table"><tr><th>Student</th><th>Class</th><th>Status</th><th>Method</th></tr>{recent}</table>
        <p><a class="button" href="/teacher/mark-attendance">Mark attendance</a></p>"#,
        name = html_escape(&user.name),
        total = card("Total students", &stats.total_students.to_string()),
        present = card("Present today", &stats.present_count.to_string()),
        absent = card("Absent today", &stats.absent_count.to_string()),
        rate = card("Attendance rate", &format!("{}%", stats.attendance_percentage)),
        risk = risk_table(risk_students),
    );
    layout("Teacher Dashboard", Some(user), &body)
}

pub fn students(
    user: &SessionUser,
    students: &[Student],
    classes: &[String],
    search: &str,
    selected_class: &str,
) -> String {
    let class_options: String = classes
        .iter()
        .map(|c| {
            format!(
                r#"<option value="{0}"{1}>{0}</option>"#,
                html_escape(c),
                if c == selected_class { " selected" } else { "" }
            )
        })
        .collect();
    let rows: String = students
        .iter()
        .map(|s| {
            format!(
                r#"<tr><td>{roll}</td><td><a href="/teacher/students/{id}">{name}</a></td><td>{class}</td><td>{section}</td><td>{rfid}</td><td>{face}</td><td>{risk}</td><td><a href="/teacher/students/{id}/edit">Edit</a></td></tr>"#,
                id = s.id,
                roll = or_dash(s.roll_number.as_deref()),
                name = html_escape(&s.name),
                class = or_dash(s.class.as_deref()),
                section = or_dash(s.section.as_deref()),
                rfid = or_dash(s.rfid_tag_id.as_deref()),
                face = if s.face_descriptor.is_some() { "yes" } else { "no" },
                risk = risk(s.dropout_risk),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Students</h1>
        <form method="get" action="/teacher/students" class="filters">
            <div class="form-group">
                <label for="search">Search</label>
                <input id="search" name="search" value="{search}" placeholder="Name, roll number or RFID">
            </div>
            <div class="form-group">
                <label for="class">Class</label>
                <select id="class" name="class"><option value="">All classes</option>{class_options}</select>
            </div>
            <button type="submit">Filter</button>
        </form>
        <p><a class="button" href="/teacher/students/add">Add student</a></p>
        <p>{count} student(s)</p>
        <table class="table">
            <tr><th>Roll no.</th><th>Name</th><th>Class</th><th>Section</th><th>RFID</th><th>Face</th><th>Risk</th><th></th></tr>
            {rows}
        </table>"#,
        search = html_escape(search),
        count = students.len(),
    );
    layout("Students", Some(user), &body)
}

/// Add and edit share one form; the face descriptor is captured in the browser.
pub fn student_form(
    user: &SessionUser,
    title: &str,
    action: &str,
    form: &StudentForm,
    error: Option<&str>,
) -> String {
    let field = |id: &str, label: &str, value: &Option<String>| {
        format!(
            r#"<div class="form-group"><label for="{id}">{label}</label><input id="{id}" name="{id}" value="{}"></div>"#,
            html_escape(value.as_deref().unwrap_or_default())
        )
    };

    let body = format!(
        r#"<h1>{title}</h1>
        {error}
        <form method="post" action="{action}" id="student-form">
            <div class="form-group">
                <label for="name">Name</label>
                <input id="name" name="name" value="{name}" required>
            </div>
            {roll}{rfid}{class}{section}{contact}{email}
            <div class="form-group">
                <label>Face capture</label>
                <video id="video" width="320" height="240" autoplay muted></video>
                <p><button type="button" id="capture">Capture face</button> <span id="face-status">{face_status}</span></p>
                <input type="hidden" id="face_descriptor" name="face_descriptor" value="{descriptor}">
            </div>
            <button type="submit">Save</button>
        </form>
        {FACE_API_SCRIPT}
        <script>
            const video = document.getElementById('video');
            const status = document.getElementById('face-status');
            Promise.all([
                faceapi.nets.ssdMobilenetv1.loadFromUri('{FACE_MODELS}'),
                faceapi.nets.faceLandmark68Net.loadFromUri('{FACE_MODELS}'),
                faceapi.nets.faceRecognitionNet.loadFromUri('{FACE_MODELS}')
            ]).then(() => navigator.mediaDevices.getUserMedia({{ video: true }}))
              .then(stream => {{ video.srcObject = stream; }})
              .catch(err => {{ status.textContent = 'Camera unavailable: ' + err.message; }});

            document.getElementById('capture').addEventListener('click', async () => {{
                const detection = await faceapi.detectSingleFace(video).withFaceLandmarks().withFaceDescriptor();
                if (!detection) {{
                    status.textContent = 'No face detected, try again.';
                    return;
                }}
                document.getElementById('face_descriptor').value = JSON.stringify(Array.from(detection.descriptor));
                status.textContent = 'Face captured.';
            }});
        </script>"#,
        title = html_escape(title),
        error = alert("fail", error),
        name = html_escape(&form.name),
        roll = field("roll_number", "Roll number", &form.roll_number),
        rfid = field("rfid_tag_id", "RFID tag", &form.rfid_tag_id),
        class = field("class", "Class", &form.class),
        section = field("section", "Section", &form.section),
        contact = field("parent_contact", "Parent contact", &form.parent_contact),
        email = field("parent_email", "Parent email", &form.parent_email),
        descriptor = html_escape(form.face_descriptor.as_deref().unwrap_or_default()),
        face_status = if form.face_descriptor.as_deref().is_some_and(|d| !d.is_empty()) {
            "Face on file."
        } else {
            "No face captured yet."
        },
    );
    layout(title, Some(user), &body)
}

fn history_rows(history: &[Attendance]) -> String {
    history
        .iter()
        .map(|a| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                a.date,
                status_badge(a.status),
                a.method.as_str(),
                a.time_in.map_or("-".to_string(), |t| t.format("%H:%M").to_string()),
                or_dash(a.remarks.as_deref()),
            )
        })
        .collect()
}

pub fn student_profile(
    user: &SessionUser,
    student: &Student,
    stats: &ProfileStats,
    history: &[Attendance],
) -> String {
    let body = format!(
        r#"<h1>{name}</h1>
        <table class="table">
            <tr><th>Roll number</th><td>{roll}</td><th>Class</th><td>{class} {section}</td></tr>
            <tr><th>RFID</th><td>{rfid}</td><th>Parent contact</th><td>{contact} {email}</td></tr>
        </table>
        <div class="cards">
            {attended}{recorded}{rate}{risk}
        </div>
        <h2>Prediction details</h2>
        <table class="table">
            <tr><th>Attendance (valid days)</th><td>{pct}</td></tr>
            <tr><th>Longest absence streak</th><td>{streak}</td></tr>
            <tr><th>Long-streak days</th><td>{long}</td></tr>
            <tr><th>Predicted dropout</th><td>{pred}</td></tr>
        </table>
        <h2>Recent attendance</h2>
        <table class="table"><tr><th>Date</th><th>Status</th><th>Method</th><th>Time in</th><th>Remarks</th></tr>{history}</table>
        <p><a class="button" href="/teacher/students/{id}/edit">Edit student</a></p>"#,
        id = student.id,
        name = html_escape(&student.name),
        roll = or_dash(student.roll_number.as_deref()),
        class = or_dash(student.class.as_deref()),
        section = html_escape(student.section.as_deref().unwrap_or_default()),
        rfid = or_dash(student.rfid_tag_id.as_deref()),
        contact = or_dash(student.parent_contact.as_deref()),
        email = html_escape(student.parent_email.as_deref().unwrap_or_default()),
        attended = card("Days present (30 days)", &stats.attended.to_string()),
        recorded = card("Days recorded", &stats.total.to_string()),
        rate = card("Attendance", &format!("{}%", stats.percentage)),
        risk = card("Dropout risk", &risk(student.dropout_risk)),
        pct = student.attendance_percentage.map_or("-".to_string(), |p| format!("{p:.1}%")),
        streak = student.max_consec_absences.map_or("-".to_string(), |v| v.to_string()),
        long = student.num_long_streaks.map_or("-".to_string(), |v| v.to_string()),
        pred = match student.dropout_pred {
            Some(1) => "yes",
            Some(_) => "no",
            None => "-",
        },
        history = history_rows(history),
    );
    layout(&student.name, Some(user), &body)
}

fn status_select(name: &str, current: Option<AttendanceStatus>) -> String {
    let current = current.unwrap_or(AttendanceStatus::Present);
    let options: String = AttendanceStatus::ALL
        .iter()
        .map(|s| {
            format!(
                r#"<option value="{0}"{1}>{0}</option>"#,
                s.as_str(),
                if *s == current { " selected" } else { "" }
            )
        })
        .collect();
    format!(r#"<select name="{name}">{options}</select>"#)
}

pub fn attendance(
    user: &SessionUser,
    entries: &[AttendanceEntry],
    students: &[Student],
    filters: &AttendanceQuery,
) -> String {
    let selected_student = filters.student.as_deref().unwrap_or_default();
    let student_options: String = students
        .iter()
        .map(|s| {
            let id = s.id.to_string();
            format!(
                r#"<option value="{id}"{}>{}</option>"#,
                if id == selected_student { " selected" } else { "" },
                html_escape(&s.name)
            )
        })
        .collect();
    let rows: String = entries
        .iter()
        .map(|e| {
            let a = &e.record;
            format!(
                r#"<tr data-id="{id}"><td>{date}</td><td>{name}</td><td>{roll}</td><td>{class}</td><td>{badge}</td><td>{method}</td><td>{time}</td>
                <td><select class="edit-status">{options}</select></td>
                <td><input class="edit-remarks" value="{remarks}"></td>
                <td><button type="button" onclick="saveRecord({id}, this)">Save</button></td></tr>"#,
                id = a.id,
                date = a.date,
                name = html_escape(&e.student_name),
                roll = or_dash(e.roll_number.as_deref()),
                class = or_dash(e.student_class.as_deref()),
                badge = status_badge(a.status),
                method = a.method.as_str(),
                time = a.time_in.map_or("-".to_string(), |t| t.format("%H:%M").to_string()),
                options = AttendanceStatus::ALL
                    .iter()
                    .map(|s| format!(
                        r#"<option value="{0}"{1}>{0}</option>"#,
                        s.as_str(),
                        if *s == a.status { " selected" } else { "" }
                    ))
                    .collect::<String>(),
                remarks = html_escape(a.remarks.as_deref().unwrap_or_default()),
            )
        })
        .collect();

    let value = |v: &Option<String>| html_escape(v.as_deref().unwrap_or_default());
    let body = format!(
        r#"<h1>Attendance records</h1>
        <form method="get" action="/teacher/attendance" class="filters">
            <div class="form-group"><label for="date">Date</label><input type="date" id="date" name="date" value="{date}"></div>
            <div class="form-group"><label for="dateFrom">From</label><input type="date" id="dateFrom" name="dateFrom" value="{from}"></div>
            <div class="form-group"><label for="dateTo">To</label><input type="date" id="dateTo" name="dateTo" value="{to}"></div>
            <div class="form-group"><label for="student">Student</label>
                <select id="student" name="student"><option value="">All students</option>{student_options}</select></div>
            <button type="submit">Filter</button>
        </form>
        <p>{count} record(s)</p>
        <table class="table">
            <tr><th>Date</th><th>Student</th><th>Roll no.</th><th>Class</th><th>Status</th><th>Method</th><th>Time in</th><th>Change</th><th>Remarks</th><th></th></tr>
            {rows}
        </table>
        <script>
            async function saveRecord(id, button) {{
                const row = button.closest('tr');
                const response = await fetch('/teacher/attendance/' + id, {{
                    method: 'PUT',
                    headers: {{ 'Content-Type': 'application/json' }},
                    body: JSON.stringify({{
                        status: row.querySelector('.edit-status').value,
                        remarks: row.querySelector('.edit-remarks').value
                    }})
                }});
                const data = await response.json();
                if (data.success) {{ location.reload(); }} else {{ alert(data.error || 'Update failed'); }}
            }}
        </script>"#,
        date = value(&filters.date),
        from = value(&filters.date_from),
        to = value(&filters.date_to),
        count = entries.len(),
    );
    layout("Attendance", Some(user), &body)
}

pub fn mark_attendance(
    user: &SessionUser,
    students: &[Student],
    date: NaiveDate,
    marked: &HashMap<i64, AttendanceStatus>,
) -> String {
    let rows: String = students
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                or_dash(s.roll_number.as_deref()),
                html_escape(&s.name),
                or_dash(s.class.as_deref()),
                status_select(&format!("attendance[{}]", s.id), marked.get(&s.id).copied()),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Mark attendance</h1>
        <p>Date: <strong>{date}</strong> ({marked} of {total} already marked)</p>
        <form method="post" action="/teacher/mark-attendance">
            <table class="table"><tr><th>Roll no.</th><th>Name</th><th>Class</th><th>Status</th></tr>{rows}</table>
            <button type="submit">Save attendance</button>
        </form>"#,
        marked = marked.len(),
        total = students.len(),
    );
    layout("Mark Attendance", Some(user), &body)
}

fn student_rate_rows(students: &[StudentRate]) -> String {
    if students.is_empty() {
        return r#"<tr><td colspan="3">None</td></tr>"#.to_string();
    }
    students
        .iter()
        .map(|s| {
            format!(
                r#"<tr><td><a href="/teacher/students/{}">{}</a></td><td>{}</td><td>{}%</td></tr>"#,
                s.student_id,
                html_escape(&s.name),
                or_dash(s.class.as_deref()),
                s.percentage
            )
        })
        .collect()
}

pub fn reports(user: &SessionUser, report: &TeacherReport) -> String {
    let name = |v: &Option<String>| or_dash(v.as_deref());
    let trend_rows: String = report
        .trends
        .iter()
        .map(|t| {
            format!(
                r#"<tr><td>{}</td><td><div class="bar"><span style="width: {}%"></span></div></td><td>{:.1}%</td></tr>"#,
                t.date, t.rate, t.rate
            )
        })
        .collect();
    let class_rows: String = report
        .class_performance
        .iter()
        .map(|c| format!("<tr><td>{}</td><td>{:.1}%</td></tr>", html_escape(&c.class), c.avg_rate))
        .collect();

    let body = format!(
        r#"<h1>Reports</h1>
        <h2>Today</h2>
        <div class="cards">{total}{present}{absent}{rate}</div>
        <h2>This month</h2>
        <div class="cards">{days}{avg}{perfect}{low}</div>
        <h2>Class comparison</h2>
        <table class="table">
            <tr><th>Best attendance</th><td>{best}</td></tr>
            <tr><th>Needs attention</th><td>{attention}</td></tr>
            <tr><th>Most improved</th><td>{improved}</td></tr>
            <tr><th>Best vs. worst spread</th><td>{spread}%</td></tr>
        </table>
        <h2>Last 30 days</h2>
        <div class="cards">{students}{avg30}{at_risk}{perfect30}</div>
        <table class="table"><tr><th>Date</th><th></th><th>Rate</th></tr>{trend_rows}</table>
        <h2>Class performance (30 days)</h2>
        <table class="table"><tr><th>Class</th><th>Average rate</th></tr>{class_rows}</table>
        <h2>Top performers (&gt; 95%)</h2>
        <table class="table"><tr><th>Name</th><th>Class</th><th>Attendance</th></tr>{top}</table>
        <h2>At risk (&lt; 75%)</h2>
        <table class="table"><tr><th>Name</th><th>Class</th><th>Attendance</th></tr>{risky}</table>"#,
        total = card("Total students", &report.daily.total_students.to_string()),
        present = card("Present", &report.daily.present_count.to_string()),
        absent = card("Absent", &report.daily.absent_count.to_string()),
        rate = card("Rate", &format!("{}%", report.daily.attendance_percentage)),
        days = card("School days", &report.monthly.school_days.to_string()),
        avg = card("Average rate", &format!("{}%", report.monthly.average_rate)),
        perfect = card("Perfect days", &report.monthly.perfect_days.to_string()),
        low = card("Low days (< 75%)", &report.monthly.low_days.to_string()),
        best = name(&report.classes.best),
        attention = name(&report.classes.needs_attention),
        improved = name(&report.classes.most_improved),
        spread = report.classes.avg_difference,
        students = card("Students", &report.analytics.total_students.to_string()),
        avg30 = card("Average attendance", &format!("{}%", report.analytics.avg_attendance)),
        at_risk = card("At-risk students", &report.analytics.risk_students.to_string()),
        perfect30 = card("Perfect attendance", &report.analytics.perfect_attendance.to_string()),
        top = student_rate_rows(&report.top_performers),
        risky = student_rate_rows(&report.at_risk),
    );
    layout("Reports", Some(user), &body)
}

pub fn facial_recognition(user: &SessionUser) -> String {
    let body = format!(
        r#"<h1>Face recognition attendance</h1>
        <p>Students recognised by the camera are marked present for today.</p>
        <video id="video" width="480" height="360" autoplay muted></video>
        <p><button type="button" id="start">Start scanning</button> <button type="button" id="stop">Stop</button></p>
        <div id="status" class="alert info">Loading face models...</div>
        <ul id="recognised"></ul>
        {FACE_API_SCRIPT}
        <script>
            const video = document.getElementById('video');
            const status = document.getElementById('status');
            const recognised = new Set();
            let timer = null;

            Promise.all([
                faceapi.nets.ssdMobilenetv1.loadFromUri('{FACE_MODELS}'),
                faceapi.nets.faceLandmark68Net.loadFromUri('{FACE_MODELS}'),
                faceapi.nets.faceRecognitionNet.loadFromUri('{FACE_MODELS}')
            ]).then(() => navigator.mediaDevices.getUserMedia({{ video: true }}))
              .then(stream => {{ video.srcObject = stream; status.textContent = 'Ready.'; }})
              .catch(err => {{ status.textContent = 'Camera unavailable: ' + err.message; }});

            async function scan() {{
                const detections = await faceapi.detectAllFaces(video).withFaceLandmarks().withFaceDescriptors();
                for (const detection of detections) {{
                    const response = await fetch('/teacher/api/attendance/recognize', {{
                        method: 'POST',
                        headers: {{ 'Content-Type': 'application/json' }},
                        body: JSON.stringify({{ descriptor: Array.from(detection.descriptor) }})
                    }});
                    if (!response.ok) continue;
                    const data = await response.json();
                    if (!recognised.has(data.studentId)) {{
                        recognised.add(data.studentId);
                        const item = document.createElement('li');
                        item.textContent = data.name + ' marked present';
                        document.getElementById('recognised').appendChild(item);
                    }}
                }}
            }}

            document.getElementById('start').addEventListener('click', () => {{
                if (!timer) {{ timer = setInterval(scan, 2000); status.textContent = 'Scanning...'; }}
            }});
            document.getElementById('stop').addEventListener('click', () => {{
                clearInterval(timer); timer = null; status.textContent = 'Stopped.';
            }});
        </script>"#
    );
    layout("Face Recognition", Some(user), &body)
}
