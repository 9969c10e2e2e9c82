use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result, Row};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub grade_level: i64,
    pub language: String,
}
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: Option<i64>,
    pub subject_id: i64,
    pub instructor_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub user_id: i64,
    pub language: String,
    pub current_grade: i64,
}

impl Subject {
    pub fn add(connection: &Connection, src: &Subject) -> Result<i64> {
        match connection.execute(
            "INSERT INTO Subject(name, description, gradeLevel, language) VALUES (?1, ?2, ?3, ?4)",
            params![src.name, src.description, src.grade_level, src.language],
        ) {
            Ok(_) => {
                let id = connection.last_insert_rowid();
                debug!("[DB] Created new Subject {} '{}'", id, src.name);
                Ok(id)
            }
            Err(err) => {
                error!("[DB] Error while creating new Subject: {:?}", err);
                Err(err)
            }
        }
    }

    pub fn get_all(connection: &Connection) -> Result<Vec<Subject>> {
        let mut statement =
            connection.prepare("SELECT id, name, description, gradeLevel, language FROM Subject")?;
        let rows = statement.query_map([], |row| {
            Ok(Subject {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                grade_level: row.get(3)?,
                language: row.get(4)?,
            })
        })?;

        rows.collect()
    }

    pub fn count(connection: &Connection) -> Result<u64> {
        connection.query_row("SELECT COUNT(*) FROM Subject", [], |row| row.get(0))
    }
}
impl Lesson {
    pub fn add(connection: &Connection, src: &Lesson) -> Result<i64> {
        match connection.execute(
            "INSERT INTO Lesson(subjectId, instructorId, title, content, status, createdAt) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                src.subject_id,
                src.instructor_id,
                src.title,
                src.content,
                src.status,
                src.created_at
            ],
        ) {
            Ok(_) => {
                let id = connection.last_insert_rowid();
                debug!("[DB] Created new Lesson {} in Subject {}", id, src.subject_id);
                Ok(id)
            }
            Err(err) => {
                error!("[DB] Error while creating new Lesson: {:?}", err);
                Err(err)
            }
        }
    }

    fn from_row(row: &Row) -> Result<Lesson> {
        Ok(Lesson {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            instructor_id: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn get_by_id(connection: &Connection, id: i64) -> Result<Option<Lesson>> {
        let mut statement = connection.prepare(
            "SELECT id, subjectId, instructorId, title, content, status, createdAt \
            FROM Lesson WHERE id = :id LIMIT 1",
        )?;
        statement
            .query_row(&[(":id", &id)], |row| Self::from_row(row))
            .optional()
    }

    pub fn get_recent(connection: &Connection, limit: u32) -> Result<Vec<Lesson>> {
        let mut statement = connection.prepare(
            "SELECT id, subjectId, instructorId, title, content, status, createdAt \
            FROM Lesson ORDER BY createdAt DESC, id DESC LIMIT :limit",
        )?;
        let rows = statement.query_map(&[(":limit", &limit)], |row| Self::from_row(row))?;

        rows.collect()
    }

    pub fn count(connection: &Connection) -> Result<u64> {
        connection.query_row("SELECT COUNT(*) FROM Lesson", [], |row| row.get(0))
    }
}
impl Student {
    pub fn add(connection: &Connection, src: &Student) -> Result<()> {
        match connection.execute(
            "INSERT INTO Student(userId, language, currentGrade) VALUES (?1, ?2, ?3)",
            params![src.user_id, src.language, src.current_grade],
        ) {
            Ok(_) => {
                debug!("[DB] Created Student profile for User {}", src.user_id);
                Ok(())
            }
            Err(err) => {
                error!(
                    "[DB] Error while creating Student profile for User {}: {:?}",
                    src.user_id, err
                );
                Err(err)
            }
        }
    }

    pub fn get_by_user(connection: &Connection, user_id: i64) -> Result<Option<Student>> {
        let mut statement = connection.prepare(
            "SELECT userId, language, currentGrade FROM Student WHERE userId = :userId LIMIT 1",
        )?;
        statement
            .query_row(&[(":userId", &user_id)], |row| {
                Ok(Student {
                    user_id: row.get(0)?,
                    language: row.get(1)?,
                    current_grade: row.get(2)?,
                })
            })
            .optional()
    }

    pub fn count(connection: &Connection) -> Result<u64> {
        connection.query_row("SELECT COUNT(*) FROM Student", [], |row| row.get(0))
    }
}

pub fn create_or_open(src: &Path) -> Result<Connection> {
    if src.exists() {
        info!("[DB] Opening existing Database");
        open_db(src)
    } else {
        info!("[DB] Creating new Database");
        create_db(src)
    }
}

pub fn create_db(dest: &Path) -> Result<Connection> {
    let now = Instant::now();
    let db = init_db(Connection::open_in_memory()?)?;
    match db.backup(DatabaseName::Main, dest, None) {
        Ok(_) => {
            debug!(
                "[DB] Creating and Saving took {} ms.",
                now.elapsed().as_millis()
            );
            close_db(db)?;
            open_db(dest)
        }
        Err(err) => {
            warn!("[DB] Failed to create database file: {}", err);
            close_db(db)?;
            Err(err)
        }
    }
}

pub fn open_db(src: &Path) -> Result<Connection> {
    let now = Instant::now();
    let db = Connection::open(src)?;
    db.pragma_update(None, "foreign_keys", true)?;
    debug!("[DB] Opening took {} ms.", now.elapsed().as_millis());
    Ok(db)
}

/// Fresh schema in memory. Nothing is written to disk.
pub fn open_in_memory() -> Result<Connection> {
    let db = init_db(Connection::open_in_memory()?)?;
    db.pragma_update(None, "foreign_keys", true)?;
    Ok(db)
}

pub fn close_db(connection: Connection) -> Result<()> {
    info!("[DB] Closing Database");
    match connection.close() {
        Ok(_) => Ok(()),
        Err((conn, _)) => {
            error!("[DB] Cannot close connection. Retrying 1/2...");
            match conn.close() {
                Ok(_) => Ok(()),
                Err((conn2, _)) => {
                    error!("[DB] Cannot close connection. Retrying 2/2...");
                    conn2.close().map_err(|(_, err)| {
                        error!("[DB] Cannot close connection! Giving up.");
                        err
                    })
                }
            }
        }
    }
}

fn init_db(conn: Connection) -> Result<Connection> {
    info!("[DB INIT] Creating tables");
    conn.execute(
        "CREATE TABLE User (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              firstName TEXT NOT NULL,
              lastName TEXT NOT NULL,
              email TEXT NOT NULL UNIQUE,
              role TEXT NOT NULL,
              createdAt TEXT NOT NULL
            )",
        (),
    )?;
    info!("[DB INIT] Created table User");
    conn.execute(
        "CREATE TABLE Student (
              userId INTEGER NOT NULL PRIMARY KEY,
              language TEXT NOT NULL,
              currentGrade INTEGER NOT NULL,
              FOREIGN KEY (userId) REFERENCES User(id) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table Student");
    conn.execute(
        "CREATE TABLE Subject (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              description TEXT,
              gradeLevel INTEGER NOT NULL,
              language TEXT NOT NULL
            )",
        (),
    )?;
    info!("[DB INIT] Created table Subject");
    conn.execute(
        "CREATE TABLE Lesson (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              subjectId INTEGER NOT NULL,
              instructorId INTEGER,
              title TEXT NOT NULL,
              content TEXT NOT NULL,
              status TEXT NOT NULL,
              createdAt TEXT NOT NULL,
              FOREIGN KEY (subjectId) REFERENCES Subject(id) ON DELETE CASCADE,
              FOREIGN KEY (instructorId) REFERENCES User(id) ON DELETE SET NULL
            )",
        (),
    )?;
    info!("[DB INIT] Created table Lesson");
    conn.execute(
        "CREATE TABLE Quiz (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              lessonId INTEGER NOT NULL,
              versionNumber INTEGER NOT NULL,
              createdAt TEXT NOT NULL,
              FOREIGN KEY (lessonId) REFERENCES Lesson(id) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table Quiz");
    conn.execute(
        "CREATE TABLE QuizQuestion (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              quizId INTEGER NOT NULL,
              position INTEGER NOT NULL,
              questionText TEXT NOT NULL,
              correctAnswer TEXT NOT NULL,
              options TEXT,
              FOREIGN KEY (quizId) REFERENCES Quiz(id) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table QuizQuestion");
    conn.execute(
        "CREATE TABLE QuizAttempt (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              studentId INTEGER,
              quizId INTEGER NOT NULL,
              startTime TEXT NOT NULL,
              endTime TEXT,
              score REAL,
              passed INTEGER NOT NULL,
              FOREIGN KEY (studentId) REFERENCES User(id) ON DELETE SET NULL,
              FOREIGN KEY (quizId) REFERENCES Quiz(id) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table QuizAttempt");
    conn.execute(
        "CREATE TABLE StudentResponse (
              id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
              attemptId INTEGER NOT NULL,
              questionId INTEGER NOT NULL,
              studentAnswer TEXT NOT NULL,
              isCorrect INTEGER NOT NULL,
              FOREIGN KEY (attemptId) REFERENCES QuizAttempt(id) ON DELETE CASCADE
            )",
        (),
    )?;
    info!("[DB INIT] Created table StudentResponse");
    conn.execute("CREATE INDEX Quiz_lessonId_idx ON Quiz(lessonId)", ())?;
    info!("[DB INIT] Created index Quiz_lessonId_idx");
    conn.execute(
        "CREATE INDEX QuizQuestion_quizId_idx ON QuizQuestion(quizId)",
        (),
    )?;
    info!("[DB INIT] Created index QuizQuestion_quizId_idx");
    conn.execute(
        "CREATE INDEX QuizAttempt_studentId_idx ON QuizAttempt(studentId)",
        (),
    )?;
    info!("[DB INIT] Created index QuizAttempt_studentId_idx");
    info!("[DB INIT] Database Creation Successful!");

    Ok(conn)
}
