//! One attempt at a quiz: `NotStarted -> InProgress -> Submitting -> {Completed, Failed}`.
//!
//! The session does no I/O. Transitions that need the grading service hand back
//! a [`QuizSubmission`], and the caller reports the outcome through
//! [`QuizSession::complete_submission`]. The `*_with` helpers drive a
//! synchronous [`QuizApi`] in one call.

use crate::libbenkyou::ledger::AnswerLedger;
use crate::libbenkyou::navigation::Navigator;
use crate::libbenkyou::quiz::{ApiError, Question, Quiz, QuizApi, QuizSubmission, SubmissionResult};
use crate::libbenkyou::timer::Timer;
use log::{debug, info, warn};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Submitting,
    Completed(SubmissionResult),
    /// Holds the reason the grading service gave.
    Failed(String),
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not started",
            SessionState::InProgress => "in progress",
            SessionState::Submitting => "submitting",
            SessionState::Completed(_) => "completed",
            SessionState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("cannot {action} while the quiz is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("this quiz has no questions")]
    NoQuestions,
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(i64),
    #[error("question {0} is free-response")]
    FreeResponse(i64),
    #[error("{answer:?} is not an option for question {question_id}")]
    InvalidAnswer { question_id: i64, answer: String },
    #[error("answer the current question first")]
    Unanswered,
    #[error("already at the first question")]
    AtFirstQuestion,
}

/// What `advance` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Moved(usize),
    /// The last question was answered. The payload must be sent to the grader.
    Submit(QuizSubmission),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    /// In-app back navigation. Only leaves a running quiz once confirmed.
    Back { confirmed: bool },
    /// The host is going away. No chance to ask.
    Unload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    Leave,
    Stay,
    /// Leave after sending these answers.
    Submit(QuizSubmission),
    /// A submission is already in flight.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    quiz: Quiz,
    state: SessionState,
    ledger: AnswerLedger,
    nav: Navigator,
    timer: Timer,
}

macro_rules! require_state {
    ($self:expr, $action:expr, $($pattern:pat_param)|+) => {
        if !matches!($self.state, $($pattern)|+) {
            return Err(SessionError::InvalidState {
                action: $action,
                state: $self.state.name(),
            });
        }
    };
}

impl QuizSession {
    pub fn new(quiz: Quiz) -> Self {
        let nav = Navigator::new(quiz.questions.len());
        Self {
            quiz,
            state: SessionState::NotStarted,
            ledger: AnswerLedger::new(),
            nav,
            timer: Timer::default(),
        }
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn ledger(&self) -> &AnswerLedger {
        &self.ledger
    }

    pub fn navigator(&self) -> &Navigator {
        &self.nav
    }

    pub fn index(&self) -> usize {
        self.nav.index()
    }

    pub fn is_empty(&self) -> bool {
        self.nav.is_empty()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.quiz.questions.get(self.nav.index())
    }

    pub fn current_answer(&self) -> Option<&str> {
        self.current_question()
            .and_then(|q| self.ledger.answer(q.id))
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.timer.elapsed_secs()
    }

    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        require_state!(self, "start", SessionState::NotStarted);
        if self.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        self.timer.start(now);
        self.state = SessionState::InProgress;
        info!(
            "[Quiz] Started quiz {} ({} questions)",
            self.quiz.id,
            self.quiz.questions.len()
        );
        Ok(())
    }

    /// Timer tick. Only an in-progress session counts time.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        if self.state == SessionState::InProgress {
            self.timer.tick(now)
        } else {
            None
        }
    }

    pub fn select_answer(
        &mut self,
        question_id: i64,
        answer: impl Into<String>,
    ) -> Result<(), SessionError> {
        require_state!(self, "answer", SessionState::InProgress);
        let answer = answer.into();
        let question = self
            .quiz
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if !question.is_multiple_choice() {
            return Err(SessionError::FreeResponse(question_id));
        }
        if !question.has_option(&answer) {
            return Err(SessionError::InvalidAnswer {
                question_id,
                answer,
            });
        }
        debug!("[Quiz] Q{} -> {:?}", question_id, answer);
        self.ledger.record(question_id, answer);
        Ok(())
    }

    /// Answers whatever question is on screen.
    pub fn select_current(&mut self, answer: impl Into<String>) -> Result<(), SessionError> {
        require_state!(self, "answer", SessionState::InProgress);
        let question_id = self.current_question().ok_or(SessionError::NoQuestions)?.id;
        self.select_answer(question_id, answer)
    }

    pub fn can_advance(&self) -> bool {
        self.state == SessionState::InProgress && self.current_answer().is_some()
    }

    pub fn can_retreat(&self) -> bool {
        self.state == SessionState::InProgress && self.nav.can_retreat()
    }

    pub fn advance(&mut self) -> Result<Step, SessionError> {
        if self.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        require_state!(self, "advance", SessionState::InProgress);
        if self.current_answer().is_none() {
            return Err(SessionError::Unanswered);
        }
        if self.nav.advance() {
            Ok(Step::Moved(self.nav.index()))
        } else {
            Ok(Step::Submit(self.begin_submission()))
        }
    }

    pub fn retreat(&mut self) -> Result<usize, SessionError> {
        if self.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        require_state!(self, "go back", SessionState::InProgress);
        if self.nav.retreat() {
            Ok(self.nav.index())
        } else {
            Err(SessionError::AtFirstQuestion)
        }
    }

    /// Leaving the quiz. A running session is submitted as-is rather than dropped.
    pub fn exit(&mut self, trigger: ExitTrigger) -> ExitOutcome {
        match (&self.state, trigger) {
            (SessionState::Submitting, _) => {
                debug!("[Quiz] Exit ({:?}) ignored, submission in flight", trigger);
                ExitOutcome::Ignored
            }
            (SessionState::InProgress, ExitTrigger::Back { confirmed: false }) => ExitOutcome::Stay,
            (SessionState::InProgress, _) => {
                info!(
                    "[Quiz] Exit ({:?}) with {}/{} answered, submitting",
                    trigger,
                    self.ledger.answered_count(),
                    self.nav.count()
                );
                ExitOutcome::Submit(self.begin_submission())
            }
            _ => ExitOutcome::Leave,
        }
    }

    /// Manual retry after a failed submission. The ledger is sent unchanged.
    pub fn retry(&mut self) -> Result<QuizSubmission, SessionError> {
        require_state!(self, "retry", SessionState::Failed(_));
        info!("[Quiz] Retrying submission of quiz {}", self.quiz.id);
        self.state = SessionState::Submitting;
        Ok(self.payload())
    }

    pub fn complete_submission(
        &mut self,
        outcome: Result<SubmissionResult, ApiError>,
    ) -> Result<&SessionState, SessionError> {
        require_state!(self, "finish submitting", SessionState::Submitting);
        self.state = match outcome {
            Ok(result) => {
                info!(
                    "[Quiz] Quiz {} graded: {:.1}% ({})",
                    self.quiz.id,
                    result.score,
                    if result.passed { "passed" } else { "failed" }
                );
                SessionState::Completed(result)
            }
            Err(err) => {
                warn!("[Quiz] Submitting quiz {} failed: {}", self.quiz.id, err);
                SessionState::Failed(err.to_string())
            }
        };
        Ok(&self.state)
    }

    pub fn advance_with(&mut self, api: &mut impl QuizApi) -> Result<Step, SessionError> {
        let step = self.advance()?;
        if let Step::Submit(payload) = &step {
            self.complete_submission(api.submit(payload))?;
        }
        Ok(step)
    }

    pub fn exit_with(&mut self, api: &mut impl QuizApi, trigger: ExitTrigger) -> ExitOutcome {
        let outcome = self.exit(trigger);
        if let ExitOutcome::Submit(payload) = &outcome {
            // Submitting is guaranteed by `exit`.
            let _ = self.complete_submission(api.submit(payload));
        }
        outcome
    }

    pub fn retry_with(&mut self, api: &mut impl QuizApi) -> Result<&SessionState, SessionError> {
        let payload = self.retry()?;
        self.complete_submission(api.submit(&payload))
    }

    fn begin_submission(&mut self) -> QuizSubmission {
        self.timer.cancel();
        self.state = SessionState::Submitting;
        self.payload()
    }

    fn payload(&self) -> QuizSubmission {
        QuizSubmission {
            quiz_id: self.quiz.id,
            responses: self.ledger.responses(&self.quiz.questions),
            elapsed_secs: self.timer.elapsed_secs(),
        }
    }
}
