use crate::libbenkyou::quiz::{Question, QuizResponse};
use std::collections::HashMap;

/// Answers picked so far in one session, keyed by question id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerLedger {
    entries: HashMap<i64, String>,
}

impl AnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous answer, if the question had one.
    pub fn record(&mut self, question_id: i64, answer: String) -> Option<String> {
        self.entries.insert(question_id, answer)
    }

    pub fn answer(&self, question_id: i64) -> Option<&str> {
        self.entries.get(&question_id).map(String::as_str)
    }

    pub fn is_answered(&self, question_id: i64) -> bool {
        self.entries.contains_key(&question_id)
    }

    pub fn answered_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in question order. Unanswered questions are left out.
    pub fn responses(&self, questions: &[Question]) -> Vec<QuizResponse> {
        questions
            .iter()
            .filter_map(|q| {
                self.entries.get(&q.id).map(|answer| QuizResponse {
                    question_id: q.id,
                    answer: answer.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn question(id: i64) -> Question {
        Question {
            id,
            text: format!("Q{id}"),
            options: Some(vec![String::from("a"), String::from("b")]),
        }
    }

    #[test]
    fn record_overwrites_previous_choice() {
        let mut ledger = AnswerLedger::new();
        assert_eq!(ledger.record(7, String::from("a")), None);
        assert_eq!(ledger.record(7, String::from("b")), Some(String::from("a")));
        assert_eq!(ledger.answer(7), Some("b"));
        assert_eq!(ledger.answered_count(), 1);
    }

    #[test]
    fn responses_follow_question_order() {
        let mut ledger = AnswerLedger::new();
        ledger.record(3, String::from("b"));
        ledger.record(1, String::from("a"));
        let responses = ledger.responses(&[question(1), question(2), question(3)]);
        let ids: Vec<i64> = responses.iter().map(|r| r.question_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(!ledger.is_answered(2));
    }
}
