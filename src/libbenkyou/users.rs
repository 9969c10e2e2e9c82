use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The create/edit form of the admin console.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UserForm {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Handed to the auth service only. Never stored here.
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[serde(default)]
    pub password: Option<String>,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid user: {}", error_messages(.0).join("; "))]
    Invalid(#[from] ValidationErrors),
    #[error("Email already registered")]
    EmailTaken,
    #[error("Username already taken")]
    UsernameTaken,
    #[error("User not found")]
    NotFound(i64),
    #[error("deletion of user {0} was not confirmed")]
    NotConfirmed(i64),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Validation messages, ordered by field name.
pub fn error_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect()
}

impl UserForm {
    /// Prefills the edit form. The password is left blank.
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            password: None,
            role: user.role,
        }
    }

    /// A blank password field means "leave unchanged", not "too short".
    fn normalised(mut self) -> Self {
        if self.password.as_deref().is_some_and(|p| p.is_empty()) {
            self.password = None;
        }
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }

    pub fn checked(self) -> Result<Self, UserError> {
        let form = self.normalised();
        form.validate()?;
        Ok(form)
    }
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Case-insensitive match on username, email or full name.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.username.to_lowercase().contains(&term)
            || self.email.to_lowercase().contains(&term)
            || self.full_name().to_lowercase().contains(&term)
    }

    fn from_row(row: &Row) -> rusqlite::Result<User> {
        let role: String = row.get(5)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            email: row.get(4)?,
            role: Role::from_str(&role).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    err.into(),
                )
            })?,
            created_at: row.get(6)?,
        })
    }

    pub fn get_all(connection: &Connection) -> rusqlite::Result<Vec<User>> {
        let mut statement = connection.prepare(
            "SELECT id, username, firstName, lastName, email, role, createdAt FROM User ORDER BY id",
        )?;
        let rows = statement.query_map([], |row| Self::from_row(row))?;

        rows.collect()
    }

    pub fn get_by_id(connection: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
        let mut statement = connection.prepare(
            "SELECT id, username, firstName, lastName, email, role, createdAt \
            FROM User WHERE id = :id LIMIT 1",
        )?;
        statement
            .query_row(&[(":id", &id)], |row| Self::from_row(row))
            .optional()
    }

    pub fn get_by_username(connection: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
        let mut statement = connection.prepare(
            "SELECT id, username, firstName, lastName, email, role, createdAt \
            FROM User WHERE username = :username LIMIT 1",
        )?;
        statement
            .query_row(&[(":username", &username)], |row| Self::from_row(row))
            .optional()
    }

    pub fn get_by_email(connection: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
        let mut statement = connection.prepare(
            "SELECT id, username, firstName, lastName, email, role, createdAt \
            FROM User WHERE email = :email LIMIT 1",
        )?;
        statement
            .query_row(&[(":email", &email)], |row| Self::from_row(row))
            .optional()
    }

    /// Rejects a form whose email or username belongs to another user.
    fn check_unique(connection: &Connection, form: &UserForm, own_id: Option<i64>) -> Result<(), UserError> {
        let other = |user: &Option<User>| user.as_ref().is_some_and(|u| Some(u.id) != own_id);
        if other(&Self::get_by_email(connection, &form.email)?) {
            warn!("[Admin] Email {} already registered", form.email);
            return Err(UserError::EmailTaken);
        }
        if other(&Self::get_by_username(connection, &form.username)?) {
            warn!("[Admin] Username {} already taken", form.username);
            return Err(UserError::UsernameTaken);
        }
        Ok(())
    }

    pub fn create(connection: &Connection, form: UserForm) -> Result<User, UserError> {
        let form = form.checked()?;
        Self::check_unique(connection, &form, None)?;
        match connection.execute(
            "INSERT INTO User(username, firstName, lastName, email, role, createdAt) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                form.username,
                form.first_name,
                form.last_name,
                form.email,
                form.role.as_str(),
                Utc::now()
            ],
        ) {
            Ok(_) => {
                let id = connection.last_insert_rowid();
                info!("[Admin] Created {} '{}' ({})", form.role, form.username, id);
                Self::get_by_id(connection, id)?.ok_or(UserError::NotFound(id))
            }
            Err(err) => {
                error!("[DB] Error while creating new User: {:?}", err);
                Err(err.into())
            }
        }
    }

    pub fn update(connection: &Connection, id: i64, form: UserForm) -> Result<User, UserError> {
        let form = form.checked()?;
        if Self::get_by_id(connection, id)?.is_none() {
            return Err(UserError::NotFound(id));
        }
        Self::check_unique(connection, &form, Some(id))?;
        if form.password.is_some() {
            debug!("[Admin] Password change for user {} goes to the auth service", id);
        }
        connection.execute(
            "UPDATE User SET username = ?2, firstName = ?3, lastName = ?4, email = ?5, role = ?6 \
            WHERE id = ?1",
            params![
                id,
                form.username,
                form.first_name,
                form.last_name,
                form.email,
                form.role.as_str()
            ],
        )?;
        info!("[Admin] Updated user {}", id);
        Self::get_by_id(connection, id)?.ok_or(UserError::NotFound(id))
    }

    pub fn delete(connection: &Connection, id: i64, confirmed: bool) -> Result<User, UserError> {
        let user = Self::get_by_id(connection, id)?.ok_or(UserError::NotFound(id))?;
        if !confirmed {
            return Err(UserError::NotConfirmed(id));
        }
        match connection.execute("DELETE FROM User WHERE id = ?1", params![id]) {
            Ok(_) => {
                info!("[Admin] Deleted user {} '{}'", id, user.username);
                Ok(user)
            }
            Err(err) => {
                error!("[DB] Error while deleting User {}: {:?}", id, err);
                Err(err.into())
            }
        }
    }
}

pub fn search<'a>(users: &'a [User], term: &str) -> Vec<&'a User> {
    users.iter().filter(|user| user.matches(term)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::libbenkyou::db;
    use pretty_assertions::assert_eq;

    pub(crate) fn form(username: &str, email: &str, role: Role) -> UserForm {
        UserForm {
            username: username.to_string(),
            first_name: String::from("Hana"),
            last_name: String::from("Sato"),
            email: email.to_string(),
            password: Some(String::from("correct horse")),
            role,
        }
    }

    #[test]
    fn form_rules_report_every_field() {
        let bad = UserForm {
            username: String::from("ab"),
            first_name: String::new(),
            last_name: String::new(),
            email: String::from("not-an-email"),
            password: Some(String::from("short")),
            role: Role::Student,
        };
        let Err(UserError::Invalid(errors)) = bad.checked() else {
            panic!("expected validation errors");
        };
        assert_eq!(
            error_messages(&errors),
            vec![
                "Invalid email address",
                "First name is required",
                "Last name is required",
                "Password must be at least 8 characters",
                "Username must be at least 3 characters",
            ]
        );
    }

    #[test]
    fn blank_password_is_dropped_not_rejected() {
        let mut edit = form("hana", "hana@example.com", Role::Student);
        edit.password = Some(String::new());
        assert_eq!(edit.checked().unwrap().password, None);
    }

    #[test]
    fn create_rejects_duplicates() {
        let conn = db::open_in_memory().unwrap();
        User::create(&conn, form("hana", "hana@example.com", Role::Student)).unwrap();

        assert!(matches!(
            User::create(&conn, form("other", "hana@example.com", Role::Student)),
            Err(UserError::EmailTaken)
        ));
        let err = User::create(&conn, form("hana", "other@example.com", Role::Student)).unwrap_err();
        assert_eq!(err.to_string(), "Username already taken");
    }

    #[test]
    fn update_keeps_own_email_and_changes_role() {
        let conn = db::open_in_memory().unwrap();
        let user = User::create(&conn, form("hana", "hana@example.com", Role::Student)).unwrap();
        let mut edit = UserForm::from_user(&user);
        edit.role = Role::Instructor;

        let updated = User::update(&conn, user.id, edit).unwrap();
        assert_eq!(updated.role, Role::Instructor);
        assert_eq!(updated.email, "hana@example.com");
        assert!(matches!(
            User::update(&conn, 999, UserForm::from_user(&user)),
            Err(UserError::NotFound(999))
        ));
    }

    #[test]
    fn delete_requires_confirmation() {
        let conn = db::open_in_memory().unwrap();
        let user = User::create(&conn, form("hana", "hana@example.com", Role::Student)).unwrap();

        assert!(matches!(
            User::delete(&conn, user.id, false),
            Err(UserError::NotConfirmed(_))
        ));
        assert_eq!(User::get_all(&conn).unwrap().len(), 1);
        User::delete(&conn, user.id, true).unwrap();
        assert!(User::get_all(&conn).unwrap().is_empty());
        assert!(matches!(User::delete(&conn, user.id, true), Err(UserError::NotFound(_))));
    }

    #[test]
    fn search_matches_username_email_and_full_name() {
        let conn = db::open_in_memory().unwrap();
        User::create(&conn, form("hana", "hana@example.com", Role::Student)).unwrap();
        let mut ken = form("ken", "k.tanaka@school.jp", Role::Admin);
        ken.first_name = String::from("Ken");
        ken.last_name = String::from("Tanaka");
        User::create(&conn, ken).unwrap();
        let users = User::get_all(&conn).unwrap();

        let names = |term: &str| -> Vec<String> {
            search(&users, term)
                .into_iter()
                .map(|u| u.username.clone())
                .collect()
        };
        assert_eq!(names("HANA"), vec!["hana"]);
        assert_eq!(names("school.jp"), vec!["ken"]);
        assert_eq!(names("ken tanaka"), vec!["ken"]);
        assert_eq!(names(""), vec!["hana", "ken"]);
    }
}
