use benkyoushiyou::libbenkyou::auth::{AuthContext, AuthError, AuthSession};
use benkyoushiyou::libbenkyou::db;
use benkyoushiyou::libbenkyou::guard::{self, GuardError, ProfileLookup, RouteDecision};
use benkyoushiyou::libbenkyou::header::{Header, BRAND};
use benkyoushiyou::libbenkyou::quiz::{Attempt, SqliteQuizApi};
use benkyoushiyou::libbenkyou::session::SessionError;
use benkyoushiyou::libbenkyou::stats::{AdminDashboard, RECENT_LIMIT};
use benkyoushiyou::libbenkyou::timer::format_time;
use benkyoushiyou::libbenkyou::users::{self, error_messages, Role, User, UserError, UserForm};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use log::{debug, warn};
use rusqlite::Connection;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "勉強しよう！ (Benkyōshiyō!)")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, value_name = "FILE", default_value = "benkyou.db", env = "BENKYOU_DB")]
    db: PathBuf,
    /// Log in as this user for the duration of the command.
    #[arg(short, long, env = "BENKYOU_USER")]
    user: Option<String>,
    #[arg(short, long, default_value = "error")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Landing page navigation.
    Home,
    /// Take the quiz of a lesson.
    Quiz {
        #[arg(long)]
        lesson: i64,
        /// Shuffle the options of every question.
        #[arg(long)]
        shuffle: bool,
    },
    /// Manage users (admin only).
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Dashboard totals (admin only).
    Stats,
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    List,
    Search { term: String },
    Add(UserFields),
    Edit {
        id: i64,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, value_enum)]
        role: Option<Role>,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct UserFields {
    #[arg(long)]
    username: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: Option<String>,
    #[arg(long, value_enum, default_value_t = Role::Student)]
    role: Role,
}

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    let conn = match db::create_or_open(&args.db) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("{}{}", "Unable to open Database: ".red(), err);
            std::process::exit(1);
        }
    };
    debug!("[DB] Database Connection Successful!");

    let result = run(&conn, &args);
    if let Err(err) = db::close_db(conn) {
        warn!("[DB] {}", err);
    }
    if let Err(err) = result {
        match &err {
            Error::User(UserError::Invalid(errors)) => {
                for message in error_messages(errors) {
                    eprintln!("{}", format!("✘ {message}").red());
                }
            }
            _ => eprintln!("{}", err.to_string().red()),
        }
        std::process::exit(1);
    }
}

fn run(conn: &Connection, args: &Args) -> Result<(), Error> {
    let mut auth = match &args.user {
        Some(username) => AuthContext::signed_in(AuthSession::login(conn, username)?),
        None => AuthContext::anonymous(),
    };
    let lookup = match auth.profile() {
        Some(profile) => ProfileLookup::fetch(conn, profile.user.id),
        None => ProfileLookup::Missing,
    };

    let result = match &args.command {
        Commands::Home => {
            home(conn, &auth)
        }
        Commands::Quiz { lesson, shuffle } => match guard::protect(&mut auth, &lookup) {
            RouteDecision::Allow => {
                let user_id = auth.profile().map(|p| p.user.id);
                let mut api = cli::ShuffleOptions {
                    inner: SqliteQuizApi::new(conn, user_id),
                    enabled: *shuffle,
                };
                cli::quiz_loop(&mut api, &mut io::stdin().lock(), *lesson)
            }
            RouteDecision::RedirectProfileSetup => Err(GuardError::ProfileIncomplete.into()),
            RouteDecision::RedirectLogin | RouteDecision::Loading => {
                Err(GuardError::NotAuthenticated.into())
            }
        },
        Commands::Users { command } => match guard::require_role(&mut auth, &lookup, Role::Admin) {
            Ok(_) => manage_users(conn, command),
            Err(err) => Err(err.into()),
        },
        Commands::Stats => match guard::require_role(&mut auth, &lookup, Role::Admin) {
            Ok(_) => stats(conn),
            Err(err) => Err(err.into()),
        },
    };

    auth.clear();
    result
}

fn home(conn: &Connection, auth: &AuthContext) -> Result<(), Error> {
    let header = Header::default();
    println!("{}", BRAND.bold());
    let items: Vec<String> = header
        .items(auth)
        .into_iter()
        .map(|item| match item.target() {
            Some(target) => format!("{} ({})", item.label(), target.dimmed()),
            None => item.label().cyan().to_string(),
        })
        .collect();
    println!("{}", items.join("  ·  "));

    if let Some(profile) = auth.profile() {
        let attempts = Attempt::get_for_student(conn, profile.user.id)?;
        if !attempts.is_empty() {
            println!("{}", format!("Welcome back, {}!", profile.user.first_name).cyan());
        }
        for attempt in attempts.iter().rev().take(RECENT_LIMIT as usize) {
            print_attempt(attempt);
        }
    }
    Ok(())
}

fn print_user(user: &User) {
    println!(
        "{:>4}  {:<16} {:<24} {:<32} {}",
        user.id,
        user.username,
        user.full_name(),
        user.email,
        user.role.to_string().cyan()
    );
}

fn manage_users(conn: &Connection, command: &UserCommands) -> Result<(), Error> {
    match command {
        UserCommands::List => {
            let users = User::get_all(conn)?;
            if users.is_empty() {
                println!("{}", "No users found.".yellow());
            }
            users.iter().for_each(print_user);
        }
        UserCommands::Search { term } => {
            let all = User::get_all(conn)?;
            let found = users::search(&all, term);
            println!("{}", format!("{} of {} users match", found.len(), all.len()).dimmed());
            found.into_iter().for_each(print_user);
        }
        UserCommands::Add(fields) => {
            let user = User::create(
                conn,
                UserForm {
                    username: fields.username.clone(),
                    first_name: fields.first_name.clone(),
                    last_name: fields.last_name.clone(),
                    email: fields.email.clone(),
                    password: fields.password.clone(),
                    role: fields.role,
                },
            )?;
            println!("{}", "Created user:".bright_green());
            print_user(&user);
        }
        UserCommands::Edit {
            id,
            username,
            first_name,
            last_name,
            email,
            password,
            role,
        } => {
            let current = User::get_by_id(conn, *id)?.ok_or(UserError::NotFound(*id))?;
            let mut form = UserForm::from_user(&current);
            macro_rules! override_field {
                ($($field:ident),+) => {
                    $(if let Some(value) = $field {
                        form.$field = value.clone();
                    })+
                };
            }
            override_field!(username, first_name, last_name, email);
            form.password = password.clone();
            if let Some(role) = role {
                form.role = *role;
            }
            let user = User::update(conn, *id, form)?;
            println!("{}", "Updated user:".bright_green());
            print_user(&user);
        }
        UserCommands::Delete { id, yes } => {
            let confirmed = *yes
                || cli::confirm(
                    &mut io::stdin().lock(),
                    "Are you sure you want to delete this user?",
                );
            let user = User::delete(conn, *id, confirmed)?;
            println!("{}", format!("Deleted {}", user.username).bright_green());
        }
    }
    Ok(())
}

fn print_attempt(attempt: &Attempt) {
    let took = attempt
        .end_time
        .map(|end| (end - attempt.start_time).num_seconds().max(0) as u64)
        .map(format_time)
        .unwrap_or_else(|| String::from("-"));
    let verdict = if attempt.passed {
        "passed".bright_green()
    } else {
        "failed".bright_red()
    };
    println!(
        "  #{} quiz {}  {:.1}%  {}  {}",
        attempt.id,
        attempt.quiz_id,
        attempt.score.unwrap_or(0.0),
        verdict,
        took.dimmed()
    );
}

fn stats(conn: &Connection) -> Result<(), Error> {
    let dashboard = AdminDashboard::load(conn)?;
    println!("{}", "==========> Platform Overview <==========".cyan());
    println!("Students  {}", dashboard.total_students.to_string().bold());
    println!("Subjects  {}", dashboard.total_subjects.to_string().bold());
    println!("Lessons   {}", dashboard.total_lessons.to_string().bold());
    println!("Quizzes   {}", dashboard.total_quizzes.to_string().bold());

    println!("{}", "Recent lessons".cyan());
    for lesson in &dashboard.recent_lessons {
        println!(
            "  {} [{}] {}",
            lesson.title,
            lesson.status,
            lesson.created_at.format("%Y-%m-%d").to_string().dimmed()
        );
    }
    println!("{}", "Recent attempts".cyan());
    for attempt in &dashboard.recent_attempts {
        print_attempt(attempt);
    }
    if let Some(rate) = dashboard.recent_pass_rate() {
        println!("{}", format!("Recent pass rate: {rate:.0}%").dimmed());
    }
    Ok(())
}
