use std::fmt;
use std::sync::Arc;

use exam_core::model::{ExamSession, PendingSkill, SkillId};
use services::exam::{
    EventDisposition, ExamCommand, ExamHandle, NextStep, QuestionSource, RunOutcome,
    StaticQuestionSource,
};
use services::{AppServices, Clock};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod console;

use console::{Input, TerminalHost, TerminalScreen};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidSkillId { raw: String },
    InvalidSkill { raw: String },
    InvalidLimit { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSkillId { raw } => write!(f, "invalid --skill value: {raw}"),
            ArgsError::InvalidSkill { raw } => {
                write!(f, "invalid skill `{raw}`, expected <id>:<name>")
            }
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- run     [--db <sqlite_url>] [--questions <file>] [--skill <id>] [--deny-fullscreen]");
    eprintln!("  cargo run -p app -- enqueue [--db <sqlite_url>] <id>:<name>...");
    eprintln!("  cargo run -p app -- queue   [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--skill <id>] [--limit <n>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --limit 20");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_LOG");
    eprintln!("  EXAM_API_BASE_URL, EXAM_API_TOKEN, EXAM_GRADING_TIMEOUT_SECS");
    eprintln!("  EXAM_VIOLATION_CEILING, EXAM_WARNING_SECS, EXAM_GRACE_SECS");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Enqueue,
    Queue,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "enqueue" => Some(Self::Enqueue),
            "queue" => Some(Self::Queue),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    questions: Option<String>,
    skill: Option<SkillId>,
    limit: u32,
    deny_fullscreen: bool,
    skills: Vec<PendingSkill>,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("EXAM_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("sqlite:exam.sqlite3".into()), normalize_sqlite_url),
            questions: None,
            skill: None,
            limit: 20,
            deny_fullscreen: false,
            skills: Vec::new(),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--questions" if cmd == Command::Run => {
                    parsed.questions = Some(require_value(args, "--questions")?);
                }
                "--deny-fullscreen" if cmd == Command::Run => parsed.deny_fullscreen = true,
                "--skill" if matches!(cmd, Command::Run | Command::History) => {
                    let value = require_value(args, "--skill")?;
                    let id = value
                        .parse::<SkillId>()
                        .map_err(|_| ArgsError::InvalidSkillId { raw: value.clone() })?;
                    parsed.skill = Some(id);
                }
                "--limit" if cmd == Command::History => {
                    let value = require_value(args, "--limit")?;
                    parsed.limit = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if cmd == Command::Enqueue && !arg.starts_with("--") => {
                    parsed.skills.push(parse_skill(&arg)?);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn parse_skill(raw: &str) -> Result<PendingSkill, ArgsError> {
    let invalid = || ArgsError::InvalidSkill { raw: raw.to_owned() };
    let (id, name) = raw.split_once(':').ok_or_else(invalid)?;
    let id = id.trim().parse::<SkillId>().map_err(|_| invalid())?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid());
    }
    Ok(PendingSkill::new(id, name))
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_logging() {
    let filter = std::env::var("EXAM_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn load_questions(path: &str) -> Result<Arc<dyn QuestionSource>, Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let source = StaticQuestionSource::from_json(&raw)?;
    info!(path, "loaded question sets from file");
    Ok(Arc::new(source))
}

// ─── Commands ──────────────────────────────────────────────────────────────────

async fn show_queue(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let batch = services.batch();
    let queue = batch.pending().await?;
    if queue.is_empty() {
        println!("No pending skills.");
    }
    for (position, skill) in queue.iter().enumerate() {
        println!("{:>2}. {} (id {})", position + 1, skill.skill_name, skill.skill_id);
    }
    if let Some(marker) = batch.interrupted().await? {
        println!(
            "Interrupted: {} (started {}), it will restart on the next `run`.",
            marker.skill_name,
            marker.started_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}

async fn show_history(
    services: &AppServices,
    skill: Option<SkillId>,
    limit: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = services.batch().history(skill, limit).await?;
    if rows.is_empty() {
        println!("No results yet.");
    }
    for row in rows {
        println!(
            "#{:<4} {}  {}",
            row.id,
            row.result.completed_at().format("%Y-%m-%d %H:%M"),
            console::render_result(&row.result)
        );
    }
    Ok(())
}

async fn first_session(
    services: &AppServices,
    skill: Option<SkillId>,
) -> Result<Option<ExamSession>, Box<dyn std::error::Error>> {
    let batch = services.batch();
    if let Some(marker) = batch.interrupted().await? {
        warn!(session_id = %marker.session_id, skill = %marker.skill_name, "discarding interrupted exam");
        println!("The {} exam was interrupted and will start over.", marker.skill_name);
        batch.discard_interrupted(marker.session_id).await?;
    }

    match skill {
        Some(_) => {
            let pending = batch.resolve_skill(skill).await?;
            Ok(Some(batch.start_exam(pending).await?))
        }
        None => Ok(batch.start_next().await?),
    }
}

fn handle_line(handle: &ExamHandle, line: &str) {
    match console::parse_input(line, &handle.snapshot()) {
        Ok(Input::Command(command)) => {
            handle.send(command);
        }
        Ok(Input::Event(event)) => {
            if handle.dispatch(event) == EventDisposition::Prevent {
                println!("(blocked)");
            }
        }
        Ok(Input::Help) => println!("{}", console::HELP),
        Ok(Input::Status) => print!("{}", console::render(&handle.snapshot())),
        Ok(Input::Empty) => {}
        Err(err) => println!("{err}"),
    }
}

/// Drive one exam from stdin until it ends.
async fn run_one(
    services: &AppServices,
    session: ExamSession,
    deny_fullscreen: bool,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let host = Arc::new(TerminalHost::default());
    let screen = Arc::new(TerminalScreen::new(deny_fullscreen));
    let (runner, handle) = services.runner(session, host, screen);
    let mut task = tokio::spawn(runner.run());
    let mut snapshots = handle.subscribe();
    let mut last_view = None;
    let mut stdin_open = true;
    let mut watching = true;

    println!("{}", console::HELP);
    loop {
        tokio::select! {
            joined = &mut task => return Ok(joined??),
            changed = snapshots.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let view = console::view_key(&snapshot);
                if last_view.as_ref() != Some(&view) {
                    print!("{}", console::render(&snapshot));
                    last_view = Some(view);
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => handle_line(&handle, &line),
                None => {
                    stdin_open = false;
                    handle.send(ExamCommand::Leave);
                }
            },
        }
    }
}

async fn ask_yes(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> std::io::Result<bool> {
    println!("{prompt} [Y/n]");
    Ok(match lines.next_line().await? {
        Some(answer) => !answer.trim().eq_ignore_ascii_case("n"),
        None => false,
    })
}

async fn run_exams(
    services: &AppServices,
    skill: Option<SkillId>,
    deny_fullscreen: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mut session) = first_session(services, skill).await? else {
        println!("No pending skills. Add some with `enqueue <id>:<name>`.");
        return Ok(());
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match run_one(services, session, deny_fullscreen, &mut lines).await? {
            RunOutcome::Abandoned { session_id } => {
                info!(%session_id, "left exam");
                println!("Exam left without grading.");
                return Ok(());
            }
            RunOutcome::Completed(completion) => {
                println!("{}", console::render_result(&completion.result));
                let NextStep::NextExam(next) = completion.next else {
                    println!("All pending skills are assessed.");
                    return Ok(());
                };
                if !ask_yes(&mut lines, &format!("Start the {} exam now?", next.skill_name)).await? {
                    return Ok(());
                }
                session = services.batch().start_exam(next).await?;
            }
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_logging();
    prepare_sqlite_file(&parsed.db_url)?;

    let questions = match &parsed.questions {
        Some(path) => Some(load_questions(path).await?),
        None => None,
    };
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), questions).await?;

    match cmd {
        Command::Run => run_exams(&services, parsed.skill, parsed.deny_fullscreen).await,
        Command::Enqueue => {
            let added = services.batch().enqueue(parsed.skills).await?;
            println!("Queued {added} new skill(s).");
            show_queue(&services).await
        }
        Command::Queue => show_queue(&services).await,
        Command::History => show_history(&services, parsed.skill, parsed.limit).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(cmd: Command, args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_owned());
        Args::parse(cmd, &mut iter)
    }

    #[test]
    fn enqueue_collects_skills() {
        let args = parse(Command::Enqueue, &["7:SQL", "8: Rust "]).unwrap();
        assert_eq!(
            args.skills,
            vec![
                PendingSkill::new(SkillId::new(7), "SQL"),
                PendingSkill::new(SkillId::new(8), "Rust"),
            ]
        );
    }

    #[test]
    fn malformed_skill_is_rejected() {
        assert!(matches!(
            parse(Command::Enqueue, &["SQL"]),
            Err(ArgsError::InvalidSkill { .. })
        ));
        assert!(matches!(
            parse(Command::Enqueue, &["7:"]),
            Err(ArgsError::InvalidSkill { .. })
        ));
    }

    #[test]
    fn run_flags_are_scoped_to_run() {
        let args = parse(
            Command::Run,
            &["--skill", "7", "--questions", "sets.json", "--deny-fullscreen"],
        )
        .unwrap();
        assert_eq!(args.skill, Some(SkillId::new(7)));
        assert_eq!(args.questions.as_deref(), Some("sets.json"));
        assert!(args.deny_fullscreen);

        assert!(matches!(
            parse(Command::Queue, &["--questions", "sets.json"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(Command::Run, &["--skill"]),
            Err(ArgsError::MissingValue { flag: "--skill" })
        ));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:exam.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("exam.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
