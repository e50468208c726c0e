//! Line-oriented terminal front end for a running exam.
//!
//! Typed commands drive the exam; lines starting with `!` inject the host
//! signals a browser would raise, so proctoring can be exercised from a shell.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use exam_core::model::{ClipboardAction, ExamResult};
use services::exam::{
    EventHost, ExamCommand, ExamSnapshot, FieldTarget, HostEvent, Key, KeyPress, ListenerId,
    ListenerKind, Modifiers, PresentationHost, SecureMode,
};
use services::{FullscreenError, HostError};
use tracing::debug;

// ─── Hosts ─────────────────────────────────────────────────────────────────────

/// Listener bookkeeping for the terminal. Signals arrive as typed `!` lines.
#[derive(Debug, Default)]
pub struct TerminalHost {
    next: AtomicU64,
    live: Mutex<HashSet<ListenerId>>,
}

impl TerminalHost {
    #[must_use]
    pub fn live_listeners(&self) -> usize {
        self.live.lock().map_or(0, |live| live.len())
    }
}

impl EventHost for TerminalHost {
    fn add_listener(&self, kind: ListenerKind) -> Result<ListenerId, HostError> {
        let id = ListenerId(self.next.fetch_add(1, Ordering::SeqCst));
        self.live
            .lock()
            .map_err(|_| HostError::Registration("listener table poisoned".into()))?
            .insert(id);
        debug!(?kind, id = id.0, "terminal listener added");
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&id);
        }
        debug!(id = id.0, "terminal listener removed");
    }
}

/// A terminal has no real full-screen mode; `deny` simulates a refusal.
#[derive(Debug, Default)]
pub struct TerminalScreen {
    deny: bool,
}

impl TerminalScreen {
    #[must_use]
    pub fn new(deny: bool) -> Self {
        Self { deny }
    }
}

#[async_trait]
impl PresentationHost for TerminalScreen {
    async fn request_fullscreen(&self) -> Result<(), FullscreenError> {
        if self.deny {
            return Err(FullscreenError::Denied("terminal refused full screen".into()));
        }
        Ok(())
    }

    async fn exit_fullscreen(&self) -> Result<(), FullscreenError> {
        Ok(())
    }
}

// ─── Input ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(ExamCommand),
    Event(HostEvent),
    Help,
    Status,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Unknown(String),
    NoQuestion,
    BadOption { raw: String, available: usize },
    BadKey(String),
    MissingArgument(&'static str),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Unknown(raw) => write!(f, "unknown input `{raw}` (type `help`)"),
            InputError::NoQuestion => write!(f, "no question is showing"),
            InputError::BadOption { raw, available } => {
                write!(f, "`{raw}` is not an option; pick 1-{available}")
            }
            InputError::BadKey(raw) => write!(f, "cannot read key chord `{raw}`"),
            InputError::MissingArgument(what) => write!(f, "missing {what}"),
        }
    }
}

impl std::error::Error for InputError {}

/// Parse one typed line against what is currently on screen.
///
/// # Errors
///
/// Returns `InputError` for anything that is not a recognized command or signal.
pub fn parse_input(line: &str, snapshot: &ExamSnapshot) -> Result<Input, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    if let Some(signal) = line.strip_prefix('!') {
        return parse_signal(signal).map(Input::Event);
    }

    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));
    let command = match word.to_ascii_lowercase().as_str() {
        "a" | "answer" => select_option(rest, snapshot)?,
        "n" | "next" => ExamCommand::Next,
        "p" | "prev" | "previous" => ExamCommand::Previous,
        "r" | "reflect" => ExamCommand::Reflection(rest.to_owned()),
        "submit" => ExamCommand::Submit,
        "fs" | "fullscreen" => ExamCommand::RetryFullscreen,
        "q" | "quit" | "leave" => ExamCommand::Leave,
        "h" | "help" | "?" => return Ok(Input::Help),
        "s" | "status" => return Ok(Input::Status),
        _ => return Err(InputError::Unknown(line.to_owned())),
    };
    Ok(Input::Command(command))
}

fn select_option(raw: &str, snapshot: &ExamSnapshot) -> Result<ExamCommand, InputError> {
    if raw.is_empty() {
        return Err(InputError::MissingArgument("option number"));
    }
    let question = snapshot
        .current_question
        .as_ref()
        .ok_or(InputError::NoQuestion)?;
    let options = question.options();
    let option = raw
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| options.get(index))
        .ok_or_else(|| InputError::BadOption {
            raw: raw.to_owned(),
            available: options.len(),
        })?;
    Ok(ExamCommand::SelectAnswer {
        question: question.id(),
        option: option.clone(),
    })
}

fn parse_signal(raw: &str) -> Result<HostEvent, InputError> {
    let (word, rest) = raw
        .trim()
        .split_once(char::is_whitespace)
        .map_or((raw.trim(), ""), |(word, rest)| (word, rest.trim()));
    let clipboard = |action| HostEvent::Clipboard {
        action,
        target: FieldTarget::Question,
    };
    Ok(match word.to_ascii_lowercase().as_str() {
        "blur" => HostEvent::WindowBlur,
        "focus" => HostEvent::WindowFocus,
        "hidden" => HostEvent::VisibilityChanged { hidden: true },
        "visible" => HostEvent::VisibilityChanged { hidden: false },
        "copy" => clipboard(ClipboardAction::Copy),
        "cut" => clipboard(ClipboardAction::Cut),
        "paste" => clipboard(ClipboardAction::Paste),
        "menu" => HostEvent::ContextMenu,
        "drag" => HostEvent::DragStart,
        "drop" => HostEvent::Drop,
        "exitfs" => HostEvent::FullscreenChanged { active: false },
        "enterfs" => HostEvent::FullscreenChanged { active: true },
        "key" if !rest.is_empty() => HostEvent::KeyDown(parse_chord(rest)?),
        "key" => return Err(InputError::MissingArgument("key chord")),
        _ => return Err(InputError::Unknown(format!("!{raw}"))),
    })
}

/// Parse chords like `ctrl+c`, `alt+tab`, `f12` or `esc`.
///
/// # Errors
///
/// Returns `InputError::BadKey` for an empty key or an unknown modifier.
pub fn parse_chord(raw: &str) -> Result<KeyPress, InputError> {
    let bad = || InputError::BadKey(raw.to_owned());
    let mut parts: Vec<&str> = raw.split('+').map(str::trim).collect();
    let key = parts.pop().filter(|k| !k.is_empty()).ok_or_else(bad)?;

    let mut modifiers = Modifiers::default();
    for part in parts {
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers.ctrl = true,
            "cmd" | "meta" | "super" => modifiers.meta = true,
            "alt" | "option" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            _ => return Err(bad()),
        }
    }

    let lower = key.to_ascii_lowercase();
    let key = match lower.as_str() {
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        _ => {
            let function = lower
                .strip_prefix('f')
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=24).contains(n));
            let mut chars = lower.chars();
            match (function, chars.next(), chars.next()) {
                (Some(n), _, _) => Key::Function(n),
                (None, Some(c), None) => Key::Char(c),
                _ => Key::Named(key.to_owned()),
            }
        }
    };
    Ok(KeyPress::new(key, modifiers))
}

// ─── Rendering ─────────────────────────────────────────────────────────────────

pub const HELP: &str = "\
commands:
  a <n>        choose option n for the current question
  n / p        next / previous question
  r <text>     write the reflection
  submit       submit (every question must be answered)
  fs           retry full screen
  status       show the current question again
  quit         leave the exam without grading
signals:
  !blur !focus !hidden !visible !copy !cut !paste !menu
  !drag !drop !exitfs !enterfs !key <chord>   e.g. !key ctrl+c";

/// The parts of a snapshot worth redrawing for. The countdown only counts
/// every 30 seconds until the last 10.
#[must_use]
pub fn view_key(snapshot: &ExamSnapshot) -> ExamSnapshot {
    let remaining = snapshot.time_remaining_secs;
    let bucket = if remaining <= 10 { remaining } else { remaining / 30 * 30 };
    ExamSnapshot {
        time_remaining_secs: bucket,
        ..snapshot.clone()
    }
}

#[must_use]
pub fn render(snapshot: &ExamSnapshot) -> String {
    let mut out = String::new();
    let minutes = snapshot.time_remaining_secs / 60;
    let seconds = snapshot.time_remaining_secs % 60;
    out.push_str(&format!(
        "── {} · {} · {minutes:02}:{seconds:02} left · {}/{} answered · violations {}",
        snapshot.skill_name,
        snapshot.phase,
        snapshot.answered,
        snapshot.total_questions,
        snapshot.violation_count,
    ));
    if snapshot.secure_mode != SecureMode::Secured {
        out.push_str(&format!(" · screen {}", snapshot.secure_mode.as_str()));
    }
    out.push('\n');

    if let Some(warning) = &snapshot.warning {
        out.push_str(&format!("!! {warning}\n"));
    }
    if snapshot.secure_mode == SecureMode::ManualRequired {
        out.push_str("!! full screen is off; type `fs` to restore it\n");
    }

    if let Some(question) = &snapshot.current_question {
        out.push_str(&format!(
            "Q{}/{} [{}] {}\n",
            snapshot.cursor + 1,
            snapshot.total_questions,
            question.difficulty().as_str(),
            question.text()
        ));
        for (index, option) in question.options().iter().enumerate() {
            let marker = if snapshot.selected.as_deref() == Some(option.as_str()) {
                '*'
            } else {
                ' '
            };
            out.push_str(&format!("  {marker}{}. {option}\n", index + 1));
        }
    }
    if let Some(notice) = &snapshot.notice {
        out.push_str(&format!("-- {notice}\n"));
    }
    out
}

#[must_use]
pub fn render_result(result: &ExamResult) -> String {
    format!(
        "{} finished: {:.1}% ({}/{} correct) · level {} · {}s · {} violation(s) · {} · graded {}",
        result.skill_name(),
        result.score(),
        result.correct_answers(),
        result.total_questions(),
        result.level(),
        result.time_taken_secs(),
        result.violation_count(),
        result.trigger(),
        result.source().as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{Difficulty, ExamPhase, Question, QuestionId, SessionId};

    fn snapshot() -> ExamSnapshot {
        let question = Question::new(
            QuestionId::new(4),
            "Which clause filters rows?",
            vec!["WHERE".into(), "ORDER BY".into(), "LIMIT".into()],
            "WHERE",
            Difficulty::Easy,
        )
        .unwrap();
        ExamSnapshot {
            session_id: SessionId::generate(),
            skill_name: "SQL".into(),
            phase: ExamPhase::Active,
            cursor: 0,
            total_questions: 3,
            answered: 0,
            current_question: Some(question),
            selected: None,
            reflection_len: 0,
            time_remaining_secs: 125,
            violation_count: 0,
            warning: None,
            secure_mode: SecureMode::Secured,
            notice: None,
        }
    }

    #[test]
    fn answer_index_maps_to_option_text() {
        let input = parse_input("a 2", &snapshot()).unwrap();
        assert_eq!(
            input,
            Input::Command(ExamCommand::SelectAnswer {
                question: QuestionId::new(4),
                option: "ORDER BY".into(),
            })
        );
    }

    #[test]
    fn out_of_range_option_is_rejected() {
        let err = parse_input("a 9", &snapshot()).unwrap_err();
        assert_eq!(
            err,
            InputError::BadOption {
                raw: "9".into(),
                available: 3
            }
        );
        assert!(matches!(
            parse_input("a 0", &snapshot()),
            Err(InputError::BadOption { .. })
        ));
    }

    #[test]
    fn reflection_keeps_the_rest_of_the_line() {
        let input = parse_input("r  joins are   hard ", &snapshot()).unwrap();
        assert_eq!(
            input,
            Input::Command(ExamCommand::Reflection("joins are   hard".into()))
        );
    }

    #[test]
    fn signals_become_host_events() {
        let s = snapshot();
        assert_eq!(parse_input("!blur", &s).unwrap(), Input::Event(HostEvent::WindowBlur));
        assert_eq!(
            parse_input("!hidden", &s).unwrap(),
            Input::Event(HostEvent::VisibilityChanged { hidden: true })
        );
        assert_eq!(
            parse_input("!paste", &s).unwrap(),
            Input::Event(HostEvent::Clipboard {
                action: ClipboardAction::Paste,
                target: FieldTarget::Question,
            })
        );
        assert!(matches!(parse_input("!nope", &s), Err(InputError::Unknown(_))));
    }

    #[test]
    fn chords_parse_modifiers_and_keys() {
        assert_eq!(
            parse_chord("ctrl+c").unwrap(),
            KeyPress::new(Key::Char('c'), Modifiers::ctrl())
        );
        assert_eq!(
            parse_chord("Alt+Tab").unwrap(),
            KeyPress::new(Key::Tab, Modifiers::alt())
        );
        assert_eq!(parse_chord("f12").unwrap(), KeyPress::plain(Key::Function(12)));
        assert_eq!(parse_chord("esc").unwrap(), KeyPress::plain(Key::Escape));
        assert_eq!(
            parse_chord("home").unwrap(),
            KeyPress::plain(Key::Named("home".into()))
        );
        assert!(parse_chord("hyper+x").is_err());
        assert!(parse_chord("ctrl+").is_err());
    }

    #[test]
    fn countdown_only_redraws_in_coarse_steps() {
        let mut a = snapshot();
        let mut b = snapshot();
        a.time_remaining_secs = 125;
        b.time_remaining_secs = 121;
        assert_eq!(view_key(&a), view_key(&b));
        a.time_remaining_secs = 9;
        b.time_remaining_secs = 8;
        assert_ne!(view_key(&a), view_key(&b));
    }

    #[test]
    fn render_marks_the_selected_option() {
        let mut s = snapshot();
        s.selected = Some("WHERE".into());
        s.warning = Some("Switching tabs is not allowed (violation 1 of 3)".into());
        let text = render(&s);
        assert!(text.contains("  *1. WHERE"));
        assert!(text.contains("   2. ORDER BY"));
        assert!(text.contains("!! Switching tabs"));
        assert!(text.contains("02:05 left"));
    }

    #[test]
    fn terminal_host_tracks_listeners() {
        let host = TerminalHost::default();
        let id = host.add_listener(ListenerKind::KeyDown).unwrap();
        host.add_listener(ListenerKind::Clipboard).unwrap();
        assert_eq!(host.live_listeners(), 2);
        host.remove_listener(id);
        assert_eq!(host.live_listeners(), 1);
    }
}
