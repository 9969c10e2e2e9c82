use crate::libbenkyou::quiz::QuizResponse;
use std::collections::HashMap;

/// Percentage needed to pass a quiz.
pub const PASSING_SCORE: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GradedResponse {
    pub question_id: i64,
    pub student_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub correct: u32,
    pub total: u32,
    pub score: f64,
    pub passed: bool,
    pub responses: Vec<GradedResponse>,
}

fn normalise(answer: &str) -> String {
    answer.trim().to_lowercase()
}

pub fn is_correct(answer: &str, correct_answer: &str) -> bool {
    normalise(answer) == normalise(correct_answer)
}

/// Grades `responses` against a map of question id to correct answer.
///
/// Responses for questions missing from `answer_key` are not graded, but they
/// still count towards the total, so the score is relative to what was sent.
pub fn grade(answer_key: &HashMap<i64, String>, responses: &[QuizResponse]) -> Grade {
    let mut correct = 0;
    let mut graded = Vec::with_capacity(responses.len());
    for response in responses {
        let Some(correct_answer) = answer_key.get(&response.question_id) else {
            continue;
        };
        let ok = is_correct(&response.answer, correct_answer);
        if ok {
            correct += 1;
        }
        graded.push(GradedResponse {
            question_id: response.question_id,
            student_answer: response.answer.clone(),
            is_correct: ok,
        });
    }

    let total = responses.len() as u32;
    let score = if total > 0 {
        f64::from(correct) / f64::from(total) * 100.0
    } else {
        0.0
    };

    Grade {
        correct,
        total,
        score,
        passed: score >= PASSING_SCORE,
        responses: graded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key() -> HashMap<i64, String> {
        HashMap::from([
            (1, String::from("Paris")),
            (2, String::from("4")),
            (3, String::from("Blue Whale")),
        ])
    }

    fn response(question_id: i64, answer: &str) -> QuizResponse {
        QuizResponse {
            question_id,
            answer: answer.to_string(),
        }
    }

    #[test]
    fn comparison_ignores_case_and_padding() {
        assert!(is_correct("  paris ", "Paris"));
        assert!(!is_correct("Lyon", "Paris"));
    }

    #[test]
    fn all_correct_passes() {
        let grade = grade(
            &key(),
            &[response(1, "paris"), response(2, "4"), response(3, "blue whale")],
        );
        assert_eq!(grade.correct, 3);
        assert_eq!(grade.score, 100.0);
        assert!(grade.passed);
    }

    #[test]
    fn two_of_three_fails_the_threshold() {
        let grade = grade(
            &key(),
            &[response(1, "Paris"), response(2, "5"), response(3, "Blue Whale")],
        );
        assert_eq!(grade.correct, 2);
        assert!(grade.score < PASSING_SCORE);
        assert!(!grade.passed);
        assert_eq!(grade.responses[1].is_correct, false);
    }

    #[test]
    fn unknown_questions_are_skipped_but_counted() {
        let grade = grade(&key(), &[response(1, "Paris"), response(99, "?")]);
        assert_eq!(grade.total, 2);
        assert_eq!(grade.responses.len(), 1);
        assert_eq!(grade.score, 50.0);
    }

    #[test]
    fn no_responses_scores_zero() {
        let grade = grade(&key(), &[]);
        assert_eq!(grade.score, 0.0);
        assert!(!grade.passed);
    }
}
