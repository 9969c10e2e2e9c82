use crate::libbenkyou::grading;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use rand::rng;
use rand::seq::SliceRandom;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    /// `None` for free-response questions.
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub lesson_id: i64,
    pub version: i64,
    pub questions: Vec<Question>,
}

/// A question as authored, correct answer included. Never handed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    pub correct_answer: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResponse {
    pub question_id: i64,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub quiz_id: i64,
    pub responses: Vec<QuizResponse>,
    /// Time spent in the quiz before it was sent.
    #[serde(default)]
    pub elapsed_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub attempt_id: i64,
    pub score: f64,
    pub passed: bool,
    pub correct: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub id: i64,
    pub student_id: Option<i64>,
    pub quiz_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Quiz not found")]
    QuizNotFound(i64),
    #[error("malformed question options: {0}")]
    MalformedOptions(#[from] serde_json::Error),
    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// The remote operations the quiz flow depends on.
pub trait QuizApi {
    /// Latest quiz for a lesson. `Ok(None)` when the lesson has no quiz.
    fn fetch_quiz(&mut self, lesson_id: i64) -> Result<Option<Quiz>, ApiError>;
    fn submit(&mut self, submission: &QuizSubmission) -> Result<SubmissionResult, ApiError>;
}

impl Question {
    pub fn is_multiple_choice(&self) -> bool {
        self.options.is_some()
    }

    pub fn has_option(&self, answer: &str) -> bool {
        self.options
            .as_ref()
            .is_some_and(|opts| opts.iter().any(|o| o == answer))
    }

    pub fn options_randomized(&self) -> Vec<String> {
        let mut opts = self.options.clone().unwrap_or_default();
        opts.shuffle(&mut rng());
        opts
    }
}

impl Quiz {
    pub fn question(&self, question_id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn add(
        connection: &Connection,
        lesson_id: i64,
        version: i64,
        questions: &[QuestionDraft],
    ) -> Result<i64, ApiError> {
        connection.execute(
            "INSERT INTO Quiz(lessonId, versionNumber, createdAt) VALUES (?1, ?2, ?3)",
            params![lesson_id, version, Utc::now()],
        )?;
        let quiz_id = connection.last_insert_rowid();
        for (position, question) in questions.iter().enumerate() {
            let options = match &question.options {
                Some(opts) => Some(serde_json::to_string(opts)?),
                None => None,
            };
            connection.execute(
                "INSERT INTO QuizQuestion(quizId, position, questionText, correctAnswer, options) \
                VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    quiz_id,
                    position as i64,
                    question.text,
                    question.correct_answer,
                    options
                ],
            )?;
        }
        debug!(
            "[DB] Created Quiz {} (v{}) for Lesson {} with {} questions",
            quiz_id,
            version,
            lesson_id,
            questions.len()
        );
        Ok(quiz_id)
    }

    fn latest_for_lesson(connection: &Connection, lesson_id: i64) -> rusqlite::Result<Option<(i64, i64)>> {
        let mut statement = connection.prepare(
            "SELECT id, versionNumber FROM Quiz WHERE lessonId = :lessonId \
            ORDER BY versionNumber DESC, id DESC LIMIT 1",
        )?;
        statement
            .query_row(&[(":lessonId", &lesson_id)], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
    }

    fn get_questions(connection: &Connection, quiz_id: i64) -> Result<Vec<Question>, ApiError> {
        let mut statement = connection.prepare(
            "SELECT id, questionText, options FROM QuizQuestion \
            WHERE quizId = :quizId ORDER BY position",
        )?;
        let rows = statement.query_map(&[(":quizId", &quiz_id)], |row| {
            Ok((
                row.get::<usize, i64>(0)?,
                row.get::<usize, String>(1)?,
                row.get::<usize, Option<String>>(2)?,
            ))
        })?;

        let mut questions = Vec::new();
        for row in rows {
            let (id, text, options) = row?;
            let options = match options {
                Some(json) => Some(serde_json::from_str::<Vec<String>>(&json)?),
                None => None,
            };
            questions.push(Question { id, text, options });
        }
        Ok(questions)
    }

    /// Authored questions, correct answers included, in quiz order.
    pub fn get_drafts(connection: &Connection, quiz_id: i64) -> Result<Vec<QuestionDraft>, ApiError> {
        let mut statement = connection.prepare(
            "SELECT questionText, correctAnswer, options FROM QuizQuestion \
            WHERE quizId = :quizId ORDER BY position",
        )?;
        let rows = statement.query_map(&[(":quizId", &quiz_id)], |row| {
            Ok((
                row.get::<usize, String>(0)?,
                row.get::<usize, String>(1)?,
                row.get::<usize, Option<String>>(2)?,
            ))
        })?;

        let mut drafts = Vec::new();
        for row in rows {
            let (text, correct_answer, options) = row?;
            let options = match options {
                Some(json) => Some(serde_json::from_str::<Vec<String>>(&json)?),
                None => None,
            };
            drafts.push(QuestionDraft {
                text,
                correct_answer,
                options,
            });
        }
        Ok(drafts)
    }

    /// `(id, lesson id, version)` of every stored quiz.
    pub fn get_all_ids(connection: &Connection) -> rusqlite::Result<Vec<(i64, i64, i64)>> {
        let mut statement =
            connection.prepare("SELECT id, lessonId, versionNumber FROM Quiz ORDER BY id")?;
        let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

        rows.collect()
    }

    pub fn count(connection: &Connection) -> rusqlite::Result<u64> {
        connection.query_row("SELECT COUNT(*) FROM Quiz", [], |row| row.get(0))
    }

    fn answer_key(connection: &Connection, quiz_id: i64) -> rusqlite::Result<HashMap<i64, String>> {
        let mut statement =
            connection.prepare("SELECT id, correctAnswer FROM QuizQuestion WHERE quizId = :quizId")?;
        let rows = statement.query_map(&[(":quizId", &quiz_id)], |row| Ok((row.get(0)?, row.get(1)?)))?;

        rows.collect()
    }

    fn exists(connection: &Connection, quiz_id: i64) -> rusqlite::Result<bool> {
        connection.query_row(
            "SELECT EXISTS(SELECT 1 FROM Quiz WHERE id = ?1)",
            params![quiz_id],
            |row| row.get(0),
        )
    }
}

impl Attempt {
    fn from_row(row: &Row) -> rusqlite::Result<Attempt> {
        Ok(Attempt {
            id: row.get(0)?,
            student_id: row.get(1)?,
            quiz_id: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            score: row.get(5)?,
            passed: row.get(6)?,
        })
    }

    pub fn get_recent(connection: &Connection, limit: u32) -> rusqlite::Result<Vec<Attempt>> {
        let mut statement = connection.prepare(
            "SELECT id, studentId, quizId, startTime, endTime, score, passed FROM QuizAttempt \
            ORDER BY startTime DESC, id DESC LIMIT :limit",
        )?;
        let rows = statement.query_map(&[(":limit", &limit)], |row| Self::from_row(row))?;

        rows.collect()
    }

    pub fn get_for_student(connection: &Connection, student_id: i64) -> rusqlite::Result<Vec<Attempt>> {
        let mut statement = connection.prepare(
            "SELECT id, studentId, quizId, startTime, endTime, score, passed FROM QuizAttempt \
            WHERE studentId = :studentId ORDER BY id",
        )?;
        let rows = statement.query_map(&[(":studentId", &student_id)], |row| Self::from_row(row))?;

        rows.collect()
    }
}

/// [`QuizApi`] served straight from the local store.
pub struct SqliteQuizApi<'a> {
    conn: &'a Connection,
    student_id: Option<i64>,
}

impl<'a> SqliteQuizApi<'a> {
    pub fn new(conn: &'a Connection, student_id: Option<i64>) -> Self {
        Self { conn, student_id }
    }
}

impl QuizApi for SqliteQuizApi<'_> {
    fn fetch_quiz(&mut self, lesson_id: i64) -> Result<Option<Quiz>, ApiError> {
        let Some((id, version)) = Quiz::latest_for_lesson(self.conn, lesson_id)? else {
            info!("[Quiz] No quiz for lesson {}", lesson_id);
            return Ok(None);
        };
        let questions = Quiz::get_questions(self.conn, id)?;
        debug!("[Quiz] Fetched quiz {} with {} questions", id, questions.len());
        Ok(Some(Quiz {
            id,
            lesson_id,
            version,
            questions,
        }))
    }

    fn submit(&mut self, submission: &QuizSubmission) -> Result<SubmissionResult, ApiError> {
        if !Quiz::exists(self.conn, submission.quiz_id)? {
            warn!("[Quiz] Submission for unknown quiz {}", submission.quiz_id);
            return Err(ApiError::QuizNotFound(submission.quiz_id));
        }
        let end_time = Utc::now();
        let start_time = end_time - Duration::seconds(submission.elapsed_secs as i64);
        let key = Quiz::answer_key(self.conn, submission.quiz_id)?;
        let grade = grading::grade(&key, &submission.responses);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO QuizAttempt(studentId, quizId, startTime, endTime, score, passed) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.student_id,
                submission.quiz_id,
                start_time,
                end_time,
                grade.score,
                grade.passed
            ],
        )?;
        let attempt_id = tx.last_insert_rowid();
        for response in &grade.responses {
            tx.execute(
                "INSERT INTO StudentResponse(attemptId, questionId, studentAnswer, isCorrect) \
                VALUES (?1, ?2, ?3, ?4)",
                params![
                    attempt_id,
                    response.question_id,
                    response.student_answer,
                    response.is_correct
                ],
            )?;
        }
        if let Err(err) = tx.commit() {
            error!("[DB] Failed to record attempt for quiz {}", submission.quiz_id);
            return Err(err.into());
        }

        info!(
            "[Quiz] Attempt {} on quiz {}: {:.1}% ({})",
            attempt_id,
            submission.quiz_id,
            grade.score,
            if grade.passed { "passed" } else { "failed" }
        );
        Ok(SubmissionResult {
            attempt_id,
            score: grade.score,
            passed: grade.passed,
            correct: grade.correct,
            total: grade.total,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::libbenkyou::db::{self, Lesson, Subject};
    use pretty_assertions::assert_eq;

    pub(crate) fn seed_lesson(conn: &Connection) -> i64 {
        let subject_id = Subject::add(
            conn,
            &Subject {
                id: None,
                name: String::from("Geography"),
                description: None,
                grade_level: 7,
                language: String::from("en"),
            },
        )
        .unwrap();
        Lesson::add(
            conn,
            &Lesson {
                id: None,
                subject_id,
                instructor_id: None,
                title: String::from("Capitals"),
                content: String::from("..."),
                status: String::from("verified"),
                created_at: Utc::now(),
            },
        )
        .unwrap()
    }

    pub(crate) fn drafts() -> Vec<QuestionDraft> {
        vec![
            QuestionDraft {
                text: String::from("Capital of France?"),
                correct_answer: String::from("Paris"),
                options: Some(vec![String::from("Paris"), String::from("Lyon")]),
            },
            QuestionDraft {
                text: String::from("Capital of Japan?"),
                correct_answer: String::from("Tokyo"),
                options: Some(vec![String::from("Osaka"), String::from("Tokyo")]),
            },
            QuestionDraft {
                text: String::from("Explain why."),
                correct_answer: String::from("because"),
                options: None,
            },
        ]
    }

    #[test]
    fn fetch_returns_latest_version_in_order() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = seed_lesson(&conn);
        Quiz::add(&conn, lesson_id, 1, &drafts()[..1]).unwrap();
        let v2 = Quiz::add(&conn, lesson_id, 2, &drafts()).unwrap();

        let quiz = SqliteQuizApi::new(&conn, None)
            .fetch_quiz(lesson_id)
            .unwrap()
            .unwrap();
        assert_eq!(quiz.id, v2);
        assert_eq!(quiz.version, 2);
        let texts: Vec<&str> = quiz.questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["Capital of France?", "Capital of Japan?", "Explain why."]);
        assert!(!quiz.questions[2].is_multiple_choice());
    }

    #[test]
    fn fetch_without_quiz_is_none() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = seed_lesson(&conn);
        assert_eq!(SqliteQuizApi::new(&conn, None).fetch_quiz(lesson_id).unwrap(), None);
    }

    #[test]
    fn submit_grades_and_records_attempt() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = seed_lesson(&conn);
        Quiz::add(&conn, lesson_id, 1, &drafts()).unwrap();
        let mut api = SqliteQuizApi::new(&conn, None);
        let quiz = api.fetch_quiz(lesson_id).unwrap().unwrap();

        let result = api
            .submit(&QuizSubmission {
                quiz_id: quiz.id,
                responses: vec![
                    QuizResponse {
                        question_id: quiz.questions[0].id,
                        answer: String::from("Paris"),
                    },
                    QuizResponse {
                        question_id: quiz.questions[1].id,
                        answer: String::from("tokyo "),
                    },
                ],
                elapsed_secs: 90,
            })
            .unwrap();
        assert_eq!(result.correct, 2);
        assert_eq!(result.score, 100.0);
        assert!(result.passed);

        let attempts = Attempt::get_recent(&conn, 5).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].id, result.attempt_id);
        let took = attempts[0].end_time.unwrap() - attempts[0].start_time;
        assert_eq!(took.num_seconds(), 90);
        let responses: u64 = conn
            .query_row("SELECT COUNT(*) FROM StudentResponse", [], |row| row.get(0))
            .unwrap();
        assert_eq!(responses, 2);
    }

    #[test]
    fn submit_to_unknown_quiz_fails() {
        let conn = db::open_in_memory().unwrap();
        let err = SqliteQuizApi::new(&conn, None)
            .submit(&QuizSubmission {
                quiz_id: 404,
                responses: vec![],
                elapsed_secs: 0,
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::QuizNotFound(404)));
        assert_eq!(err.to_string(), "Quiz not found");
    }

    #[test]
    fn randomized_options_keep_every_option() {
        let question = Question {
            id: 1,
            text: String::from("?"),
            options: Some(vec![String::from("a"), String::from("b"), String::from("c")]),
        };
        let mut shuffled = question.options_randomized();
        shuffled.sort();
        assert_eq!(shuffled, vec!["a", "b", "c"]);
    }
}
