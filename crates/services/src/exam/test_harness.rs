//! Fakes shared by the exam unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use exam_core::model::{
    Difficulty, ExamSession, PendingSkill, Question, QuestionId, QuestionSet, SkillId,
};
use exam_core::time::fixed_now;

use super::grading::{GradingClient, GradingRequest, RemoteGrade};
use super::host::{EventHost, ListenerId, ListenerKind, PresentationHost};
use crate::error::{FullscreenError, GradingError, HostError};

/// `EventHost` that tracks which listeners are live.
#[derive(Default)]
pub struct RecordingHost {
    next_id: AtomicU64,
    active: Mutex<HashSet<ListenerId>>,
    fail_on: Option<ListenerKind>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(kind: ListenerKind) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(kind),
            ..Self::default()
        })
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

impl EventHost for RecordingHost {
    fn add_listener(&self, kind: ListenerKind) -> Result<ListenerId, HostError> {
        if self.fail_on == Some(kind) {
            return Err(HostError::Registration(format!("{kind:?}")));
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.active.lock().unwrap().insert(id);
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.active.lock().unwrap().remove(&id);
    }
}

/// `PresentationHost` that grants or denies full screen as told.
#[derive(Default)]
pub struct ScriptedPresentation {
    deny: AtomicBool,
    requests: AtomicUsize,
    exits: AtomicUsize,
}

impl ScriptedPresentation {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        let host = Self::default();
        host.deny.store(true, Ordering::SeqCst);
        Arc::new(host)
    }

    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresentationHost for ScriptedPresentation {
    async fn request_fullscreen(&self) -> Result<(), FullscreenError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            Err(FullscreenError::Denied("user gesture required".into()))
        } else {
            Ok(())
        }
    }

    async fn exit_fullscreen(&self) -> Result<(), FullscreenError> {
        self.exits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// `GradingClient` returning a fixed answer and counting calls.
pub struct ScriptedGrader {
    response: Mutex<Option<RemoteGrade>>,
    calls: AtomicUsize,
}

impl ScriptedGrader {
    pub fn returning(grade: RemoteGrade) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Some(grade)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GradingClient for ScriptedGrader {
    async fn submit_grading(&self, _request: &GradingRequest) -> Result<RemoteGrade, GradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GradingError::Malformed("service unavailable".into()))
    }
}

/// Questions `1..=n`, each with options `A`/`B` where `A` is correct.
pub fn question_set(n: u64, time_limit_secs: u32) -> QuestionSet {
    let questions = (1..=n)
        .map(|id| {
            Question::new(
                QuestionId::new(id),
                format!("Question {id}"),
                vec!["A".into(), "B".into()],
                "A",
                Difficulty::Medium,
            )
            .unwrap()
        })
        .collect();
    QuestionSet::new(questions, time_limit_secs).unwrap()
}

pub fn sql_skill() -> PendingSkill {
    PendingSkill::new(SkillId::new(7), "SQL")
}

pub fn loading_session(n: u64) -> ExamSession {
    ExamSession::new(sql_skill(), question_set(n, 60), fixed_now())
}

pub fn active_session(n: u64) -> ExamSession {
    let mut session = loading_session(n);
    session.begin().unwrap();
    session
}
