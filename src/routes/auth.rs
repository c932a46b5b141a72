use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::{html, non_empty, redirect};
use crate::credentials::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::database::is_unique_violation;
use crate::error::AppResult;
use crate::models::{NewUser, Role};
use crate::session;
use crate::views;
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(login_page))
        .route("/login", web::post().to(login))
        .route("/register", web::get().to(register_page))
        .route("/register", web::post().to(register))
        .route("/logout", web::get().to(logout));
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub school_code: Option<String>,
}

async fn login_page(session: Session) -> HttpResponse {
    match session::current_user(&session) {
        Some(user) => redirect(user.role.home()),
        None => html(views::auth::login(None, "")),
    }
}

async fn login(
    state: web::Data<AppState>,
    session: Session,
    form: web::Form<LoginForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let user = state.db.find_user_by_email(&form.email).await?;

    match user {
        Some(user) if verify_password(&form.password, &user.password_hash) => {
            session::login(&session, &user)?;
            tracing::info!(user_id = user.id, role = user.role.as_str(), "user signed in");
            Ok(redirect(user.role.home()))
        }
        _ => {
            tracing::debug!(email = %form.email, "rejected sign-in");
            Ok(html(views::auth::login(
                Some("Invalid email or password"),
                &form.email,
            )))
        }
    }
}

async fn register_page(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let schools = state.db.list_schools().await?;
    Ok(html(views::auth::register(None, &RegisterForm::default(), &schools)))
}

async fn register(
    state: web::Data<AppState>,
    session: Session,
    form: web::Form<RegisterForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();

    let new_user = match validate_registration(&state, &form).await? {
        Ok(user) => user,
        Err(message) => {
            let schools = state.db.list_schools().await?;
            return Ok(html(views::auth::register(Some(&message), &form, &schools)));
        }
    };

    let user = match state.db.create_user(&new_user).await {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            let schools = state.db.list_schools().await?;
            return Ok(html(views::auth::register(
                Some("An account with this email already exists"),
                &form,
                &schools,
            )));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(user_id = user.id, role = user.role.as_str(), "registered user");
    session::login(&session, &user)?;
    Ok(redirect(user.role.home()))
}

/// Outer error for store failures, inner error for messages shown on the form.
async fn validate_registration(
    state: &AppState,
    form: &RegisterForm,
) -> AppResult<Result<NewUser, String>> {
    let Some(name) = non_empty(form.name.clone()) else {
        return Ok(Err("Name is required".to_string()));
    };
    let email = match non_empty(form.email.clone()) {
        Some(email) if email.contains('@') => email,
        _ => return Ok(Err("A valid email is required".to_string())),
    };
    let password = form.password.clone().unwrap_or_default();
    if password.len() < MIN_PASSWORD_LEN {
        return Ok(Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role: Role = match form.role.as_deref().unwrap_or("teacher").parse() {
        Ok(role) => role,
        Err(message) => return Ok(Err(message)),
    };

    let school_id = match role {
        Role::Government => None,
        Role::Teacher => {
            let Some(code) = non_empty(form.school_code.clone()) else {
                return Ok(Err("Teachers must give their school code".to_string()));
            };
            match state.db.find_school_by_code(&code).await? {
                Some(school) => Some(school.id),
                None => return Ok(Err(format!("No school with code '{code}'"))),
            }
        }
    };

    Ok(Ok(NewUser {
        name,
        email,
        password_hash: hash_password(&password)?,
        role,
        school_id,
    }))
}

async fn logout(session: Session) -> HttpResponse {
    session::logout(&session);
    redirect("/auth/login")
}
