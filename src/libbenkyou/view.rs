use crate::libbenkyou::grading::PASSING_SCORE;
use crate::libbenkyou::quiz::{QuizApi, SubmissionResult};
use crate::libbenkyou::session::{QuizSession, SessionState};
use crate::libbenkyou::timer::format_time;
use log::{debug, warn};

pub const LEAVE_WARNING: &str = "Warning: Leaving this page will automatically submit your quiz.";
pub const LEAVE_CONFIRM: &str =
    "Are you sure you want to leave? Your quiz will be submitted automatically.";

/// Outcome of fetching the quiz for a lesson.
#[derive(Debug)]
pub enum QuizLoad {
    Failed(String),
    NoQuiz,
    Loaded(QuizSession),
}

impl QuizLoad {
    pub fn fetch(api: &mut impl QuizApi, lesson_id: i64) -> QuizLoad {
        match api.fetch_quiz(lesson_id) {
            Ok(Some(quiz)) => {
                debug!("[Quiz] Loaded quiz {} for lesson {}", quiz.id, lesson_id);
                QuizLoad::Loaded(QuizSession::new(quiz))
            }
            Ok(None) => QuizLoad::NoQuiz,
            Err(err) => {
                warn!("[Quiz] Could not fetch quiz for lesson {}: {}", lesson_id, err);
                QuizLoad::Failed(err.to_string())
            }
        }
    }

    pub fn session(&self) -> Option<&QuizSession> {
        match self {
            QuizLoad::Loaded(session) => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut QuizSession> {
        match self {
            QuizLoad::Loaded(session) => Some(session),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    FetchError,
    NoQuiz,
    NoQuestions,
}

impl NoticeKind {
    pub fn title(self) -> &'static str {
        match self {
            NoticeKind::FetchError => "Error Loading Quiz",
            NoticeKind::NoQuiz => "No Quiz Available",
            NoticeKind::NoQuestions => "No Questions Available",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            NoticeKind::FetchError => {
                "There was a problem fetching the quiz. Please check your connection and try again."
            }
            NoticeKind::NoQuiz => "There is no quiz available for this lesson at the moment.",
            NoticeKind::NoQuestions => {
                "This quiz doesn't have any questions yet. Please check back later."
            }
        }
    }

    pub fn back_label(self) -> &'static str {
        match self {
            NoticeKind::FetchError => "Go Back to Lesson",
            _ => "Return to Lesson",
        }
    }

    pub fn is_error(self) -> bool {
        self == NoticeKind::FetchError
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionRow {
    pub text: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionCard {
    pub number: usize,
    pub total: usize,
    pub progress_percent: f64,
    pub text: String,
    /// Empty for free-response questions.
    pub options: Vec<OptionRow>,
    pub answered_count: usize,
    pub previous_enabled: bool,
    pub next_enabled: bool,
    pub next_label: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Notice(NoticeKind),
    Intro { passing_score: f64 },
    Question(QuestionCard),
    Result(SubmissionResult),
    /// Submission failed. Answers are kept and a retry is offered.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderStatus {
    pub answered: usize,
    pub total: usize,
    pub elapsed: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizHeader {
    pub back_enabled: bool,
    /// Only while the quiz is running.
    pub status: Option<HeaderStatus>,
    pub show_leave_warning: bool,
}

fn next_label(session: &QuizSession) -> &'static str {
    if session.state() == &SessionState::Submitting {
        "Submitting..."
    } else if session.navigator().is_last() {
        "Finish Quiz"
    } else {
        "Next Question"
    }
}

fn question_card(session: &QuizSession) -> Option<QuestionCard> {
    let question = session.current_question()?;
    let selected = session.current_answer();
    let nav = session.navigator();
    Some(QuestionCard {
        number: nav.index() + 1,
        total: nav.count(),
        progress_percent: nav.progress_percent(),
        text: question.text.clone(),
        options: question
            .options
            .iter()
            .flatten()
            .map(|opt| OptionRow {
                text: opt.clone(),
                selected: selected == Some(opt.as_str()),
            })
            .collect(),
        answered_count: session.ledger().answered_count(),
        previous_enabled: session.can_retreat(),
        next_enabled: session.can_advance(),
        next_label: next_label(session),
    })
}

pub fn screen(load: &QuizLoad) -> Screen {
    let session = match load {
        QuizLoad::Failed(_) => return Screen::Notice(NoticeKind::FetchError),
        QuizLoad::NoQuiz => return Screen::Notice(NoticeKind::NoQuiz),
        QuizLoad::Loaded(session) => session,
    };
    if session.is_empty() {
        return Screen::Notice(NoticeKind::NoQuestions);
    }
    match session.state() {
        SessionState::NotStarted => Screen::Intro {
            passing_score: PASSING_SCORE,
        },
        SessionState::InProgress | SessionState::Submitting => match question_card(session) {
            Some(card) => Screen::Question(card),
            None => Screen::Notice(NoticeKind::NoQuestions),
        },
        SessionState::Completed(result) => Screen::Result(result.clone()),
        SessionState::Failed(reason) => Screen::Failed {
            reason: reason.clone(),
        },
    }
}

pub fn header(load: &QuizLoad) -> QuizHeader {
    let Some(session) = load.session() else {
        return QuizHeader {
            back_enabled: true,
            status: None,
            show_leave_warning: false,
        };
    };
    let running = matches!(
        session.state(),
        SessionState::InProgress | SessionState::Submitting
    );
    QuizHeader {
        back_enabled: session.state() != &SessionState::Submitting,
        status: running.then(|| HeaderStatus {
            answered: session.ledger().answered_count(),
            total: session.navigator().count(),
            elapsed: format_time(session.elapsed_secs()),
        }),
        show_leave_warning: running,
    }
}
