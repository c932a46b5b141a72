use super::{alert, html_escape, layout};
use crate::models::School;
use crate::routes::auth::RegisterForm;

pub fn login(error: Option<&str>, email: &str) -> String {
    let body = format!(
        r#"<h1>Login</h1>
        {error}
        <form method="post" action="/auth/login">
            <div class="form-group">
                <label for="email">Email</label>
                <input type="email" id="email" name="email" value="{email}" required>
            </div>
            <div class="form-group">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required>
            </div>
            <button type="submit">Login</button>
        </form>
        <p>No account yet? <a href="/auth/register">Register</a></p>"#,
        error = alert("fail", error),
        email = html_escape(email),
    );
    layout("Login", None, &body)
}

pub fn register(error: Option<&str>, form: &RegisterForm, schools: &[School]) -> String {
    let role = form.role.as_deref().unwrap_or("teacher");
    let selected = |value: &str| if role == value { " selected" } else { "" };
    let school_list: String = schools
        .iter()
        .map(|s| {
            format!(
                r#"<option value="{}">{}</option>"#,
                html_escape(&s.code),
                html_escape(&s.name)
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Register</h1>
        {error}
        <form method="post" action="/auth/register">
            <div class="form-group">
                <label for="name">Name</label>
                <input id="name" name="name" value="{name}" required>
            </div>
            <div class="form-group">
                <label for="email">Email</label>
                <input type="email" id="email" name="email" value="{email}" required>
            </div>
            <div class="form-group">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required>
            </div>
            <div class="form-group">
                <label for="role">Role</label>
                <select id="role" name="role">
                    <option value="teacher"{teacher}>Teacher</option>
                    <option value="government"{government}>Government official</option>
                </select>
            </div>
            <div class="form-group">
                <label for="school_code">School code (teachers)</label>
                <input id="school_code" name="school_code" list="school-codes" value="{code}">
                <datalist id="school-codes">{school_list}</datalist>
            </div>
            <button type="submit">Create account</button>
        </form>
        <p>Already registered? <a href="/auth/login">Login</a></p>"#,
        error = alert("fail", error),
        name = html_escape(form.name.as_deref().unwrap_or_default()),
        email = html_escape(form.email.as_deref().unwrap_or_default()),
        code = html_escape(form.school_code.as_deref().unwrap_or_default()),
        teacher = selected("teacher"),
        government = selected("government"),
    );
    layout("Register", None, &body)
}
