use crate::libbenkyou::auth::{AuthContext, AuthSession};
use crate::libbenkyou::db::Student;
use crate::libbenkyou::users::Role;
use log::{debug, warn};
use rusqlite::Connection;
use thiserror::Error;

pub const LOGIN_PATH: &str = "/login";
pub const PROFILE_SETUP_PATH: &str = "/profile-setup";

/// State of the remote student-profile query.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLookup {
    Loading,
    Found(Student),
    Missing,
    Failed(String),
}

impl ProfileLookup {
    pub fn fetch(connection: &Connection, user_id: i64) -> ProfileLookup {
        match Student::get_by_user(connection, user_id) {
            Ok(Some(student)) => ProfileLookup::Found(student),
            Ok(None) => ProfileLookup::Missing,
            Err(err) => {
                warn!("[Auth] Profile lookup for user {} failed: {}", user_id, err);
                ProfileLookup::Failed(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Loading,
    RedirectLogin,
    RedirectProfileSetup,
    Allow,
}

impl RouteDecision {
    pub fn redirect_path(self) -> Option<&'static str> {
        match self {
            RouteDecision::RedirectLogin => Some(LOGIN_PATH),
            RouteDecision::RedirectProfileSetup => Some(PROFILE_SETUP_PATH),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GuardError {
    #[error("please log in first")]
    NotAuthenticated,
    #[error("complete your student profile first")]
    ProfileIncomplete,
    #[error("still loading")]
    Loading,
    #[error("this requires the {required} role, you are {actual}")]
    Forbidden { required: Role, actual: Role },
}

/// Decides whether a protected page may render.
///
/// A profile found remotely but missing from the session is copied in first.
pub fn protect(auth: &mut AuthContext, lookup: &ProfileLookup) -> RouteDecision {
    let has_student = |auth: &AuthContext| auth.profile().is_some_and(|p| p.student.is_some());

    if let ProfileLookup::Found(student) = lookup {
        if !has_student(auth) {
            if let Some(mut profile) = auth.profile().cloned() {
                debug!("[Auth] Profile found remotely but missing from session, syncing");
                profile.student = Some(student.clone());
                auth.set_profile(profile);
            }
        }
    }

    if auth.is_loading()
        || (auth.is_authenticated() && !has_student(auth) && *lookup == ProfileLookup::Loading)
    {
        return RouteDecision::Loading;
    }
    if !auth.is_authenticated() {
        return RouteDecision::RedirectLogin;
    }
    if !has_student(auth) && matches!(lookup, ProfileLookup::Missing | ProfileLookup::Failed(_)) {
        return RouteDecision::RedirectProfileSetup;
    }
    RouteDecision::Allow
}

/// [`protect`], then a role check for admin-only pages.
pub fn require_role<'a>(
    auth: &'a mut AuthContext,
    lookup: &ProfileLookup,
    required: Role,
) -> Result<&'a AuthSession, GuardError> {
    match protect(auth, lookup) {
        RouteDecision::Loading => return Err(GuardError::Loading),
        RouteDecision::RedirectLogin => return Err(GuardError::NotAuthenticated),
        // Staff accounts have no student profile.
        RouteDecision::RedirectProfileSetup if required == Role::Student => {
            return Err(GuardError::ProfileIncomplete)
        }
        _ => {}
    }
    let session = auth.session().ok_or(GuardError::NotAuthenticated)?;
    if session.role() != required {
        warn!(
            "[Auth] {} ({}) denied, {} required",
            session.profile().user.username,
            session.role(),
            required
        );
        return Err(GuardError::Forbidden {
            required,
            actual: session.role(),
        });
    }
    Ok(session)
}
