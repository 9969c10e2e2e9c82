use crate::Error;
use benkyoushiyou::libbenkyou::quiz::{ApiError, Quiz, QuizApi, QuizSubmission, SubmissionResult};
use benkyoushiyou::libbenkyou::session::{ExitOutcome, ExitTrigger, QuizSession, SessionState};
use benkyoushiyou::libbenkyou::view::{
    self, NoticeKind, QuestionCard, QuizHeader, QuizLoad, Screen, LEAVE_CONFIRM, LEAVE_WARNING,
};
use colored::Colorize;
use log::debug;
use std::io::{self, BufRead, Write};
use std::time::Instant;

#[derive(Debug, PartialEq)]
enum Choice {
    Option(usize),
    Next,
    Previous,
    Quit,
    Unknown,
}

impl Choice {
    fn from_str(choices_count: usize, input: &str) -> Choice {
        match input {
            "q" => Choice::Quit,
            "n" | "" => Choice::Next,
            "p" => Choice::Previous,
            input => match input.parse::<usize>() {
                Ok(num) if (1..=choices_count).contains(&num) => Choice::Option(num - 1),
                Ok(_) => {
                    println!(
                        "{}",
                        format!("There are only {} options available!", choices_count)
                            .bright_red()
                    );
                    Choice::Unknown
                }
                Err(_) => Choice::Unknown,
            },
        }
    }
}

/// One line of input. `None` once the input is gone, so an empty line and
/// end of input stay distinct.
fn prompt(input: &mut impl BufRead, message: &str) -> Option<String> {
    print!("{} ", message.cyan());
    let _ = io::stdout().flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => {
            debug!("end of input");
            None
        }
        Ok(_) => Some(line.trim().to_string()),
        Err(err) => {
            debug!("reading input failed: {}", err);
            None
        }
    }
}

pub(crate) fn confirm(input: &mut impl BufRead, message: &str) -> bool {
    matches!(
        prompt(input, &format!("{message} [y/N]")).as_deref(),
        Some("y" | "Y")
    )
}

/// Shuffles option order once, as the quiz arrives.
pub(crate) struct ShuffleOptions<A> {
    pub inner: A,
    pub enabled: bool,
}

impl<A: QuizApi> QuizApi for ShuffleOptions<A> {
    fn fetch_quiz(&mut self, lesson_id: i64) -> Result<Option<Quiz>, ApiError> {
        let quiz = self.inner.fetch_quiz(lesson_id)?;
        if !self.enabled {
            return Ok(quiz);
        }
        Ok(quiz.map(|mut quiz| {
            for question in quiz.questions.iter_mut().filter(|q| q.is_multiple_choice()) {
                question.options = Some(question.options_randomized());
            }
            quiz
        }))
    }

    fn submit(&mut self, submission: &QuizSubmission) -> Result<SubmissionResult, ApiError> {
        self.inner.submit(submission)
    }
}

fn print_header(header: &QuizHeader) {
    let back = if header.back_enabled {
        "← Back to Lesson (q)".normal()
    } else {
        "← Back to Lesson".dimmed()
    };
    match &header.status {
        Some(status) => println!(
            "{}    ✔ {}/{}    ⏱ {}",
            back, status.answered, status.total, status.elapsed
        ),
        None => println!("{}", back),
    }
    if header.show_leave_warning {
        println!("{}", LEAVE_WARNING.on_red().white());
    }
}

fn print_notice(kind: NoticeKind) {
    let title = if kind.is_error() {
        kind.title().bright_red().bold()
    } else {
        kind.title().yellow().bold()
    };
    println!("{}", title);
    println!("{}", kind.message());
    println!("{}", format!("→ {}", kind.back_label()).cyan());
}

fn print_card(card: &QuestionCard) {
    let leading = format!("Question {} of {}", card.number, card.total);
    println!(
        "{}  {}",
        leading.cyan(),
        format!("{:.0}%", card.progress_percent).dimmed()
    );
    println!("{}", card.text.black().bold().on_white());
    let indent = " ".repeat(2);
    if card.options.is_empty() {
        println!("{}{}", indent, "(free-response, not answerable here)".dimmed());
    }
    for (i, option) in card.options.iter().enumerate() {
        let marker = if option.selected { "●" } else { "○" };
        let line = format!("{}{} {}. {}", indent, marker, i + 1, option.text);
        if option.selected {
            println!("{}", line.bright_blue().bold());
        } else {
            println!("{}", line);
        }
    }
    println!(
        "{}",
        format!("{} of {} answered", card.answered_count, card.total).dimmed()
    );
}

fn answer_hint(card: &QuestionCard) -> String {
    if card.options.is_empty() {
        String::from("p: previous, q: leave:")
    } else {
        format!(
            "Answer (1-{}), n: {}, p: previous, q: leave:",
            card.options.len(),
            card.next_label
        )
    }
}

fn print_result(result: &SubmissionResult) {
    let verdict = if result.passed {
        format!("Passed! {:.1}%", result.score).bright_green().bold()
    } else {
        format!("Not passed: {:.1}%", result.score).bright_red().bold()
    };
    println!("{}", verdict);
    println!(
        "{}",
        format!("{} of {} correct (attempt #{})", result.correct, result.total, result.attempt_id)
            .cyan()
    );
}

fn handle_exit(session: &mut QuizSession, api: &mut impl QuizApi, trigger: ExitTrigger) -> bool {
    match session.exit_with(api, trigger) {
        ExitOutcome::Stay | ExitOutcome::Ignored => false,
        ExitOutcome::Leave => true,
        ExitOutcome::Submit(payload) => {
            debug!("exit submitted {} answers", payload.responses.len());
            // Leave only once the answers are safe. On failure the retry screen shows.
            !matches!(session.state(), SessionState::Failed(_))
        }
    }
}

pub fn quiz_loop(
    api: &mut impl QuizApi,
    input: &mut impl BufRead,
    lesson_id: i64,
) -> Result<(), Error> {
    let mut load = QuizLoad::fetch(api, lesson_id);

    loop {
        if let Some(session) = load.session_mut() {
            session.tick(Instant::now());
        }
        println!();
        print_header(&view::header(&load));

        match view::screen(&load) {
            Screen::Notice(kind) => {
                print_notice(kind);
                return Ok(());
            }
            Screen::Intro { passing_score } => {
                println!("{}", "Ready to Test Your Knowledge?".bold());
                println!("You'll need to score {passing_score:.0}% or higher to pass.");
                println!(
                    "{}",
                    "Once you start, leaving will automatically submit your answers.".yellow()
                );
                let Some(session) = load.session_mut() else {
                    return Ok(());
                };
                match prompt(input, "Start the quiz? (enter to start, q to go back):").as_deref() {
                    None | Some("q") => return Ok(()),
                    Some(_) => session.start(Instant::now())?,
                }
            }
            Screen::Question(card) => {
                print_card(&card);
                let Some(session) = load.session_mut() else {
                    return Ok(());
                };
                let Some(line) = prompt(input, &answer_hint(&card)) else {
                    if handle_exit(session, api, ExitTrigger::Unload) {
                        return Ok(());
                    }
                    continue;
                };
                let choice = Choice::from_str(card.options.len(), &line);
                debug!("choice: {:?}", choice);
                match choice {
                    Choice::Option(idx) => {
                        let answer = card.options[idx].text.clone();
                        session.select_current(answer)?;
                    }
                    Choice::Next => {
                        if let Err(err) = session.advance_with(api) {
                            println!("{}", err.to_string().yellow());
                        }
                    }
                    Choice::Previous => {
                        if let Err(err) = session.retreat() {
                            println!("{}", err.to_string().yellow());
                        }
                    }
                    Choice::Quit => {
                        let confirmed = confirm(input, LEAVE_CONFIRM);
                        if handle_exit(session, api, ExitTrigger::Back { confirmed }) {
                            return Ok(());
                        }
                    }
                    Choice::Unknown => {}
                }
            }
            Screen::Result(result) => {
                print_result(&result);
                return Ok(());
            }
            Screen::Failed { reason } => {
                println!("{}", "Submitting your quiz failed.".bright_red().bold());
                println!("{}", reason.red());
                println!("{}", "Your answers are kept.".cyan());
                let Some(session) = load.session_mut() else {
                    return Ok(());
                };
                match prompt(input, "r to retry, q to leave:").as_deref() {
                    Some("r") => {
                        session.retry_with(api)?;
                    }
                    None | Some("q") => return Ok(()),
                    Some(_) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benkyoushiyou::libbenkyou::db::{self, Lesson, Subject};
    use benkyoushiyou::libbenkyou::quiz::{Attempt, QuestionDraft, SqliteQuizApi};
    use benkyoushiyou::libbenkyou::view::OptionRow;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rusqlite::Connection;

    #[test]
    fn parses_choices() {
        assert_eq!(Choice::from_str(4, "2"), Choice::Option(1));
        assert_eq!(Choice::from_str(4, "5"), Choice::Unknown);
        assert_eq!(Choice::from_str(4, "0"), Choice::Unknown);
        assert_eq!(Choice::from_str(4, ""), Choice::Next);
        assert_eq!(Choice::from_str(4, "p"), Choice::Previous);
        assert_eq!(Choice::from_str(4, "q"), Choice::Quit);
        assert_eq!(Choice::from_str(4, "maybe"), Choice::Unknown);
    }

    fn kana_lesson(conn: &Connection, questions: &[QuestionDraft]) -> i64 {
        let subject_id = Subject::add(
            conn,
            &Subject {
                id: None,
                name: String::from("Kana"),
                description: None,
                grade_level: 1,
                language: String::from("ja"),
            },
        )
        .unwrap();
        let lesson_id = Lesson::add(
            conn,
            &Lesson {
                id: None,
                subject_id,
                instructor_id: None,
                title: String::from("Hiragana"),
                content: String::new(),
                status: String::from("published"),
                created_at: Utc::now(),
            },
        )
        .unwrap();
        Quiz::add(conn, lesson_id, 1, questions).unwrap();
        lesson_id
    }

    fn choice(text: &str) -> QuestionDraft {
        QuestionDraft {
            text: text.to_string(),
            correct_answer: String::from("a"),
            options: Some(["a", "i", "u"].map(String::from).to_vec()),
        }
    }

    fn free(text: &str) -> QuestionDraft {
        QuestionDraft {
            text: text.to_string(),
            correct_answer: String::from("i"),
            options: None,
        }
    }

    fn stored_responses(conn: &Connection) -> u64 {
        conn.query_row("SELECT COUNT(*) FROM StudentResponse", [], |row| row.get(0))
            .unwrap()
    }

    /// Run the loop over a scripted stdin.
    fn run(conn: &Connection, lesson_id: i64, script: &str) -> Vec<Attempt> {
        let mut api = SqliteQuizApi::new(conn, None);
        quiz_loop(&mut api, &mut script.as_bytes(), lesson_id).unwrap();
        Attempt::get_recent(conn, 10).unwrap()
    }

    /// Rejects the first `failures` submissions.
    struct FlakyApi<'a> {
        inner: SqliteQuizApi<'a>,
        failures: usize,
    }

    impl QuizApi for FlakyApi<'_> {
        fn fetch_quiz(&mut self, lesson_id: i64) -> Result<Option<Quiz>, ApiError> {
            self.inner.fetch_quiz(lesson_id)
        }

        fn submit(&mut self, submission: &QuizSubmission) -> Result<SubmissionResult, ApiError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ApiError::Rejected(String::from("network unreachable")));
            }
            self.inner.submit(submission)
        }
    }

    #[test]
    fn end_of_input_mid_quiz_submits_partial_answers() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ"), choice("ア")]);

        let attempts = run(&conn, lesson_id, "\n1\n");
        assert_eq!(attempts.len(), 1);
        assert_eq!(stored_responses(&conn), 1);
    }

    #[test]
    fn end_of_input_on_intro_leaves_without_submitting() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ")]);

        assert!(run(&conn, lesson_id, "").is_empty());
    }

    #[test]
    fn end_of_input_on_free_response_still_submits() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[free("Write い")]);

        let attempts = run(&conn, lesson_id, "\n\n");
        assert_eq!(attempts.len(), 1);
        assert_eq!(stored_responses(&conn), 0);
        assert_eq!(attempts[0].score, Some(0.0));
    }

    #[test]
    fn unconfirmed_back_stays_in_the_quiz() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ"), choice("ア")]);

        let attempts = run(&conn, lesson_id, "\n1\nq\nn\nn\n1\nn\n");
        assert_eq!(attempts.len(), 1);
        assert_eq!(stored_responses(&conn), 2);
        assert_eq!(attempts[0].score, Some(100.0));
    }

    #[test]
    fn confirmed_back_submits_and_leaves() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ"), choice("ア")]);

        // Lines after the confirmation are never read.
        let attempts = run(&conn, lesson_id, "\n2\nq\ny\n1\nn\n");
        assert_eq!(attempts.len(), 1);
        assert_eq!(stored_responses(&conn), 1);
        assert_eq!(attempts[0].score, Some(0.0));
    }

    #[test]
    fn failed_submission_retries_on_request() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ"), choice("ア")]);
        let mut api = FlakyApi {
            inner: SqliteQuizApi::new(&conn, None),
            failures: 1,
        };

        let mut script = "\n1\nn\n1\nn\nr\n".as_bytes();
        quiz_loop(&mut api, &mut script, lesson_id).unwrap();
        assert_eq!(api.failures, 0);
        assert_eq!(Attempt::get_recent(&conn, 10).unwrap().len(), 1);
        assert_eq!(stored_responses(&conn), 2);
    }

    #[test]
    fn failed_submission_then_end_of_input_leaves() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ"), choice("ア")]);
        let mut api = FlakyApi {
            inner: SqliteQuizApi::new(&conn, None),
            failures: 5,
        };

        let mut script = "\n1\nq\ny\n".as_bytes();
        quiz_loop(&mut api, &mut script, lesson_id).unwrap();
        assert_eq!(api.failures, 4);
        assert!(Attempt::get_recent(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn free_response_hint_has_no_range() {
        let mut card = QuestionCard {
            number: 1,
            total: 1,
            progress_percent: 100.0,
            text: String::from("Write い"),
            options: Vec::new(),
            answered_count: 0,
            previous_enabled: false,
            next_enabled: false,
            next_label: "Finish Quiz",
        };
        assert_eq!(answer_hint(&card), "p: previous, q: leave:");

        card.options = vec![OptionRow {
            text: String::from("a"),
            selected: false,
        }];
        assert_eq!(answer_hint(&card), "Answer (1-1), n: Finish Quiz, p: previous, q: leave:");
    }

    #[test]
    fn shuffle_keeps_options_and_free_response() {
        let conn = db::open_in_memory().unwrap();
        let lesson_id = kana_lesson(&conn, &[choice("あ"), free("Write い")]);

        let mut api = ShuffleOptions {
            inner: SqliteQuizApi::new(&conn, None),
            enabled: true,
        };
        let quiz = api.fetch_quiz(lesson_id).unwrap().unwrap();
        let mut shuffled = quiz.questions[0].options.clone().unwrap();
        shuffled.sort();
        assert_eq!(shuffled, vec!["a", "i", "u"]);
        assert_eq!(quiz.questions[1].options, None);
    }
}
