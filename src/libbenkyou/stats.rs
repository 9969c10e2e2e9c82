use crate::libbenkyou::db::{Lesson, Student, Subject};
use crate::libbenkyou::quiz::{Attempt, Quiz};
use log::debug;
use rusqlite::{Connection, Result};
use std::time::Instant;

pub const RECENT_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AdminDashboard {
    pub total_students: u64,
    pub total_lessons: u64,
    pub total_subjects: u64,
    pub total_quizzes: u64,
    pub recent_lessons: Vec<Lesson>,
    pub recent_attempts: Vec<Attempt>,
}

impl AdminDashboard {
    pub fn load(connection: &Connection) -> Result<AdminDashboard> {
        let now = Instant::now();
        let dashboard = AdminDashboard {
            total_students: Student::count(connection)?,
            total_lessons: Lesson::count(connection)?,
            total_subjects: Subject::count(connection)?,
            total_quizzes: Quiz::count(connection)?,
            recent_lessons: Lesson::get_recent(connection, RECENT_LIMIT)?,
            recent_attempts: Attempt::get_recent(connection, RECENT_LIMIT)?,
        };
        debug!("[Admin] Dashboard loaded in {} ms.", now.elapsed().as_millis());
        Ok(dashboard)
    }

    /// Share of the recent attempts that passed, as a percentage.
    pub fn recent_pass_rate(&self) -> Option<f64> {
        if self.recent_attempts.is_empty() {
            return None;
        }
        let passed = self.recent_attempts.iter().filter(|a| a.passed).count();
        Some(passed as f64 / self.recent_attempts.len() as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libbenkyou::db;
    use crate::libbenkyou::quiz::tests::{drafts, seed_lesson};
    use crate::libbenkyou::quiz::{QuizApi, QuizResponse, QuizSubmission, SqliteQuizApi};
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_store_has_zero_totals() {
        let conn = db::open_in_memory().unwrap();
        let dashboard = AdminDashboard::load(&conn).unwrap();
        assert_eq!(dashboard.total_students, 0);
        assert_eq!(dashboard.total_quizzes, 0);
        assert!(dashboard.recent_attempts.is_empty());
        assert_eq!(dashboard.recent_pass_rate(), None);
    }

    #[test]
    fn totals_and_recent_attempts() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = seed_lesson(&conn);
        Quiz::add(&conn, lesson_id, 1, &drafts()).unwrap();
        let mut api = SqliteQuizApi::new(&conn, None);
        let quiz = api.fetch_quiz(lesson_id).unwrap().unwrap();
        for answer in ["Paris", "Lyon"] {
            api.submit(&QuizSubmission {
                quiz_id: quiz.id,
                responses: vec![QuizResponse {
                    question_id: quiz.questions[0].id,
                    answer: answer.to_string(),
                }],
                elapsed_secs: 30,
            })
            .unwrap();
        }

        let dashboard = AdminDashboard::load(&conn).unwrap();
        assert_eq!(dashboard.total_subjects, 1);
        assert_eq!(dashboard.total_lessons, 1);
        assert_eq!(dashboard.total_quizzes, 1);
        assert_eq!(dashboard.recent_lessons.len(), 1);
        assert_eq!(dashboard.recent_attempts.len(), 2);
        assert_eq!(dashboard.recent_pass_rate(), Some(50.0));
    }
}
