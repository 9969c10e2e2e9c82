use benkyoushiyou::libbenkyou::db::{self, Lesson, Student, Subject};
use benkyoushiyou::libbenkyou::quiz::{ApiError, Quiz, QuestionDraft};
use benkyoushiyou::libbenkyou::users::{error_messages, User, UserError, UserForm};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use log::{error, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "入出力者 (Nyūshutsuryokusha)")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "info")]
    log_level: String,
    #[arg(short, long, value_name = "FILE", default_value = "benkyou.db", env = "BENKYOU_DB")]
    db: PathBuf,

    json: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the JSON file into the database.
    Import,
    /// Write every stored quiz to the JSON file.
    Export,
}

#[derive(Debug, Error)]
enum Error {
    #[error("unable to access {0:?}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct BenkyouJson {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    users: Vec<UserJson>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    subjects: Vec<SubjectJson>,
    /// Quizzes for lessons that already exist.
    #[serde(default)]
    quizzes: Vec<QuizJson>,
}
#[derive(Serialize, Deserialize, Debug)]
struct UserJson {
    #[serde(flatten)]
    form: UserForm,
    student: Option<StudentJson>,
}
#[derive(Serialize, Deserialize, Debug)]
struct StudentJson {
    language: String,
    current_grade: i64,
}
#[derive(Serialize, Deserialize, Debug)]
struct SubjectJson {
    name: String,
    description: Option<String>,
    grade_level: i64,
    language: String,
    #[serde(default)]
    lessons: Vec<LessonJson>,
}
#[derive(Serialize, Deserialize, Debug)]
struct LessonJson {
    title: String,
    content: String,
    #[serde(default = "published")]
    status: String,
    #[serde(default)]
    quizzes: Vec<QuizJson>,
}
#[derive(Serialize, Deserialize, Debug)]
struct QuizJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lesson_id: Option<i64>,
    #[serde(default = "first_version")]
    version: i64,
    questions: Vec<QuestionDraft>,
}

fn published() -> String {
    String::from("published")
}

fn first_version() -> i64 {
    1
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    info!(
        "{}",
        format!("File at {:?} and Database at {:?}", args.json, args.db).cyan()
    );
    let db = match db::create_or_open(&args.db) {
        Ok(d) => d,
        Err(e) => {
            error!("{}{}", "Unable to open Database: ".red(), e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Import => import(&db, &args.json),
        Commands::Export => export(&db, &args.json),
    };
    if let Err(e) = db::close_db(db) {
        error!("{}", format!("Unable to close Database: {}", e).red());
    }
    if let Err(e) = result {
        error!("{}", e.to_string().red());
        std::process::exit(1);
    }
}

fn import(db: &Connection, path: &Path) -> Result<(), Error> {
    let json = std::fs::read_to_string(path).map_err(|e| Error::Io(path.to_path_buf(), e))?;
    let content: BenkyouJson = serde_json::from_str(&json)?;
    info!(
        "{}",
        format!(
            "Importing data... ({} Users, {} Subjects, {} Quizzes)",
            content.users.len(),
            content.subjects.len(),
            content.quizzes.len()
        )
        .blue()
    );

    for user in content.users {
        import_user(db, user)?;
    }

    for subject in &content.subjects {
        info!(
            "{}",
            format!("├ Subject: {} ({} Lessons)", subject.name, subject.lessons.len()).blue()
        );
        let subject_id = match Subject::get_all(db)?
            .into_iter()
            .find(|s| s.name == subject.name && s.language == subject.language)
        {
            Some(existing) => existing.id.unwrap_or_default(),
            None => Subject::add(
                db,
                &Subject {
                    id: None,
                    name: subject.name.clone(),
                    description: subject.description.clone(),
                    grade_level: subject.grade_level,
                    language: subject.language.clone(),
                },
            )?,
        };

        for lesson in &subject.lessons {
            let lesson_id = Lesson::add(
                db,
                &Lesson {
                    id: None,
                    subject_id,
                    instructor_id: None,
                    title: lesson.title.clone(),
                    content: lesson.content.clone(),
                    status: lesson.status.clone(),
                    created_at: Utc::now(),
                },
            )?;
            info!(
                "{}",
                format!("│ ├ Lesson {}: {} ({} Quizzes)", lesson_id, lesson.title, lesson.quizzes.len())
                    .blue()
            );
            for quiz in &lesson.quizzes {
                import_quiz(db, lesson_id, quiz, "│ │")?;
            }
        }
    }

    for quiz in &content.quizzes {
        match quiz.lesson_id {
            Some(lesson_id) if Lesson::get_by_id(db, lesson_id)?.is_some() => {
                import_quiz(db, lesson_id, quiz, "│")?
            }
            lesson_id => error!(
                "{} {}",
                "│".blue(),
                format!("├ ✘ Quiz v{} (no Lesson {:?})", quiz.version, lesson_id)
                    .red()
                    .strikethrough()
            ),
        }
    }
    Ok(())
}

fn import_user(db: &Connection, user: UserJson) -> Result<(), Error> {
    let username = user.form.username.clone();
    let created = match User::create(db, user.form) {
        Ok(created) => created,
        Err(UserError::Database(e)) => return Err(e.into()),
        Err(e) => {
            let reason = match &e {
                UserError::Invalid(errors) => error_messages(errors).join(", "),
                other => other.to_string(),
            };
            error!(
                "{}",
                format!("├ ✘ User: {} ({})", username, reason).red().strikethrough()
            );
            return Ok(());
        }
    };
    info!("{}", format!("├ User: {} ({})", created.username, created.role).green());

    if let Some(student) = user.student {
        Student::add(
            db,
            &Student {
                user_id: created.id,
                language: student.language,
                current_grade: student.current_grade,
            },
        )?;
        info!("{} {}", "│".blue(), format!("└ Student profile, grade {}", student.current_grade).green());
    }
    Ok(())
}

fn import_quiz(db: &Connection, lesson_id: i64, quiz: &QuizJson, indent: &str) -> Result<(), Error> {
    let invalid = quiz.questions.iter().filter(|q| !validate_question(q)).count();
    if invalid > 0 {
        error!(
            "{} {}",
            indent.blue(),
            format!(
                "├ ✘ Quiz v{}: {} questions have a correct answer outside their options",
                quiz.version, invalid
            )
            .red()
            .strikethrough()
        );
        return Ok(());
    }
    let quiz_id = Quiz::add(db, lesson_id, quiz.version, &quiz.questions)?;
    info!(
        "{} {}",
        indent.blue(),
        format!("├ Quiz {}: v{} ({} Questions)", quiz_id, quiz.version, quiz.questions.len()).green()
    );
    Ok(())
}

fn export(db: &Connection, path: &Path) -> Result<(), Error> {
    let mut content = BenkyouJson::default();
    for (quiz_id, lesson_id, version) in Quiz::get_all_ids(db)? {
        let questions = Quiz::get_drafts(db, quiz_id)?;
        info!(
            "{}",
            format!("├ Quiz {}: Lesson {} v{} ({} Questions)", quiz_id, lesson_id, version, questions.len())
                .blue()
        );
        content.quizzes.push(QuizJson {
            lesson_id: Some(lesson_id),
            version,
            questions,
        });
    }
    let json = serde_json::to_string_pretty(&content)?;
    std::fs::write(path, json).map_err(|e| Error::Io(path.to_path_buf(), e))?;
    info!(
        "{}",
        format!("Exported {} Quizzes to {:?}", content.quizzes.len(), path).cyan()
    );
    Ok(())
}

/// Multiple-choice questions must list their own correct answer.
fn validate_question(question: &QuestionDraft) -> bool {
    match &question.options {
        Some(options) => !options.is_empty() && options.contains(&question.correct_answer),
        None => true,
    }
}
