//! Who is signed in.
//!
//! An [`AuthSession`] exists from login to logout and is owned by whoever holds
//! the [`AuthContext`]. Nothing here is global.

use crate::libbenkyou::db::Student;
use crate::libbenkyou::users::{Role, User};
use log::{debug, info, warn};
use rand::distr::Alphanumeric;
use rand::{rng, Rng};
use rusqlite::Connection;
use thiserror::Error;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user: User,
    /// `None` until the student finished profile setup.
    pub student: Option<Student>,
}

/// Partial profile edit. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub student: Option<Student>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no user named {0:?}")]
    UnknownUser(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    profile: Profile,
    token: String,
}

impl AuthSession {
    pub fn new(profile: Profile, token: String) -> Self {
        Self { profile, token }
    }

    /// Resolves `username` in the local directory and opens a session for it.
    pub fn login(connection: &Connection, username: &str) -> Result<AuthSession, AuthError> {
        let Some(user) = User::get_by_username(connection, username)? else {
            warn!("[Auth] Login failed for {:?}", username);
            return Err(AuthError::UnknownUser(username.to_string()));
        };
        let student = Student::get_by_user(connection, user.id)?;
        let token: String = rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        info!("[Auth] {} logged in as {}", user.username, user.role);
        Ok(AuthSession::new(Profile { user, student }, token))
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> Role {
        self.profile.user.role
    }

    pub fn logout(self) {
        info!("[Auth] {} logged out", self.profile.user.username);
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    session: Option<AuthSession>,
    loading: bool,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(session: AuthSession) -> Self {
        Self {
            session: Some(session),
            loading: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.session.as_ref().map(AuthSession::profile)
    }

    /// Replaces any current session. Clears the loading flag.
    pub fn set_auth(&mut self, session: AuthSession) {
        if let Some(previous) = self.session.replace(session) {
            previous.logout();
        }
        self.loading = false;
    }

    pub fn set_profile(&mut self, profile: Profile) {
        match self.session.as_mut() {
            Some(session) => session.profile = profile,
            None => debug!("[Auth] Ignoring profile without a session"),
        }
    }

    pub fn update_profile(&mut self, update: ProfileUpdate) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let user = &mut session.profile.user;
        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(student) = update.student {
            session.profile.student = Some(student);
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Ends the session, if any.
    pub fn clear(&mut self) {
        if let Some(session) = self.session.take() {
            session.logout();
        }
        self.loading = false;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::libbenkyou::db;
    use crate::libbenkyou::users::tests::form;
    use pretty_assertions::assert_eq;

    pub(crate) fn session_for(role: Role, student: Option<Student>) -> AuthSession {
        AuthSession::new(
            Profile {
                user: User {
                    id: 1,
                    username: String::from("hana"),
                    first_name: String::from("Hana"),
                    last_name: String::from("Sato"),
                    email: String::from("hana@example.com"),
                    role,
                    created_at: chrono::Utc::now(),
                },
                student,
            },
            String::from("token"),
        )
    }

    #[test]
    fn login_loads_profile_and_issues_token() {
        let conn = db::open_in_memory().unwrap();
        let user = User::create(&conn, form("hana", "hana@example.com", Role::Student)).unwrap();
        Student::add(
            &conn,
            &Student {
                user_id: user.id,
                language: String::from("ja"),
                current_grade: 7,
            },
        )
        .unwrap();

        let session = AuthSession::login(&conn, "hana").unwrap();
        assert_eq!(session.profile().user.id, user.id);
        assert_eq!(session.profile().student.as_ref().unwrap().current_grade, 7);
        assert_eq!(session.token().len(), TOKEN_LEN);
        assert!(session.token().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn login_with_unknown_user_fails() {
        let conn = db::open_in_memory().unwrap();
        assert!(matches!(
            AuthSession::login(&conn, "ghost"),
            Err(AuthError::UnknownUser(name)) if name == "ghost"
        ));
    }

    #[test]
    fn context_lifecycle() {
        let mut auth = AuthContext::anonymous();
        assert!(!auth.is_authenticated());
        auth.set_loading(true);
        auth.set_auth(session_for(Role::Student, None));
        assert!(auth.is_authenticated());
        assert!(!auth.is_loading());

        auth.clear();
        assert!(!auth.is_authenticated());
        assert_eq!(auth.profile(), None);
    }

    #[test]
    fn update_profile_needs_a_session() {
        let mut auth = AuthContext::anonymous();
        auth.update_profile(ProfileUpdate {
            first_name: Some(String::from("Ken")),
            ..Default::default()
        });
        assert_eq!(auth.profile(), None);

        auth.set_auth(session_for(Role::Student, None));
        auth.update_profile(ProfileUpdate {
            first_name: Some(String::from("Ken")),
            ..Default::default()
        });
        let user = &auth.profile().unwrap().user;
        assert_eq!(user.first_name, "Ken");
        assert_eq!(user.last_name, "Sato");
    }
}
