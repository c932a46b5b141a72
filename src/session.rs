//! Request identity carried in the cookie session.
//!
//! Handlers take one of the extractors below instead of reading the session
//! themselves; a missing or mismatched identity fails extraction.

use std::future::{ready, Ready};

use actix_session::config::CookieContentSecurity;
use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionExt, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, JsonError};
use crate::models::{Role, User};

const USER_KEY: &str = "user";
const MIN_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub school_id: Option<i64>,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            school_id: user.school_id,
        }
    }
}

fn session_user(req: &HttpRequest) -> Result<SessionUser, AppError> {
    req.get_session()
        .get::<SessionUser>(USER_KEY)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or(AppError::Unauthenticated)
}

/// Any signed-in user.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: SessionUser,
}

impl FromRequest for RequestContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(session_user(req).map(|user| RequestContext { user }))
    }
}

/// A signed-in teacher and the school they belong to.
#[derive(Debug, Clone)]
pub struct TeacherContext {
    pub user: SessionUser,
    pub school_id: i64,
}

impl FromRequest for TeacherContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(session_user(req).and_then(|user| match (user.role, user.school_id) {
            (Role::Teacher, Some(school_id)) => Ok(TeacherContext { user, school_id }),
            _ => Err(AppError::Forbidden),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct GovernmentContext {
    pub user: SessionUser,
}

impl FromRequest for GovernmentContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(session_user(req).and_then(|user| match user.role {
            Role::Government => Ok(GovernmentContext { user }),
            Role::Teacher => Err(AppError::Forbidden),
        }))
    }
}

/// Wraps an identity extractor for JSON endpoints so that a missing or
/// mismatched identity answers with a JSON error body.
#[derive(Debug, Clone)]
pub struct Api<T>(pub T);

impl<T> FromRequest for Api<T>
where
    T: FromRequest<Error = AppError, Future = Ready<Result<T, AppError>>>,
{
    type Error = JsonError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        ready(
            T::from_request(req, payload)
                .into_inner()
                .map(Api)
                .map_err(JsonError),
        )
    }
}

/// The signed-in user, if any. Unreadable session data counts as signed out.
pub fn current_user(session: &Session) -> Option<SessionUser> {
    session.get::<SessionUser>(USER_KEY).ok().flatten()
}

pub fn login(session: &Session, user: &User) -> Result<(), AppError> {
    session.renew();
    session
        .insert(USER_KEY, SessionUser::from(user))
        .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn logout(session: &Session) {
    session.purge();
}

/// Signing key for session cookies. A configured secret shorter than 64
/// bytes is rejected in favour of a random per-process key.
pub fn session_key(secret: Option<&str>) -> Key {
    match secret {
        Some(secret) if secret.len() >= MIN_KEY_LEN => Key::from(secret.as_bytes()),
        Some(_) => {
            tracing::warn!("session secret is shorter than {MIN_KEY_LEN} bytes; using a random key");
            Key::generate()
        }
        None => {
            tracing::warn!("no session secret configured; sessions will not survive a restart");
            Key::generate()
        }
    }
}

pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("attendance_session".to_string())
        .cookie_secure(secure)
        .cookie_content_security(CookieContentSecurity::Private)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secrets_fall_back_to_a_random_key() {
        let short = session_key(Some("too short"));
        let long_secret = "k".repeat(64);
        let a = session_key(Some(&long_secret));
        let b = session_key(Some(&long_secret));
        assert_eq!(a.master(), b.master());
        assert_ne!(short.master(), a.master());
    }
}
