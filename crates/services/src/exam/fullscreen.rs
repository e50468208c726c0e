use std::sync::Arc;
use std::time::Duration;

use exam_core::model::ExamSession;
use exam_core::policy::ProctoringPolicy;
use tracing::{debug, warn};

use super::host::PresentationHost;

/// Secure-mode indicator shown next to the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureMode {
    Inactive,
    Secured,
    /// A silent re-acquisition is scheduled.
    Reacquiring,
    /// The host refused; the user has to return to full screen by hand.
    ManualRequired,
}

impl SecureMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SecureMode::Inactive => "inactive",
            SecureMode::Secured => "secured",
            SecureMode::Reacquiring => "reacquiring",
            SecureMode::ManualRequired => "manual",
        }
    }
}

/// Requests exclusive presentation and tries to win it back after an exit.
///
/// Failures never end the exam; they only change the secure-mode indicator.
pub struct FullscreenController {
    host: Arc<dyn PresentationHost>,
    retry_delay: Duration,
    max_retries: u32,
    retries_used: u32,
    mode: SecureMode,
}

impl FullscreenController {
    #[must_use]
    pub fn new(host: Arc<dyn PresentationHost>, policy: &ProctoringPolicy) -> Self {
        Self {
            host,
            retry_delay: policy.fullscreen_retry_delay(),
            max_retries: policy.max_fullscreen_retries(),
            retries_used: 0,
            mode: SecureMode::Inactive,
        }
    }

    #[must_use]
    pub fn mode(&self) -> SecureMode {
        self.mode
    }

    /// Request full screen for a running session.
    pub async fn enter(&mut self, session: &mut ExamSession) -> SecureMode {
        if !session.phase().is_running() {
            return self.mode;
        }
        match self.host.request_fullscreen().await {
            Ok(()) => self.on_restored(session),
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "full-screen request failed");
                session.set_fullscreen(false);
                self.mode = SecureMode::ManualRequired;
            }
        }
        self.mode
    }

    /// The host left full screen without being asked.
    ///
    /// Returns the delay before a silent re-acquisition, or `None` when the
    /// silent attempts for this exit are used up.
    pub fn on_involuntary_exit(&mut self, session: &mut ExamSession) -> Option<Duration> {
        session.set_fullscreen(false);
        if !session.phase().is_running() {
            return None;
        }
        if self.retries_used < self.max_retries {
            self.retries_used += 1;
            self.mode = SecureMode::Reacquiring;
            Some(self.retry_delay)
        } else {
            self.mode = SecureMode::ManualRequired;
            None
        }
    }

    /// Scheduled silent re-acquisition. A failure falls back to the manual affordance.
    pub async fn reacquire(&mut self, session: &mut ExamSession) -> SecureMode {
        if self.mode != SecureMode::Reacquiring || !session.phase().is_running() {
            return self.mode;
        }
        match self.host.request_fullscreen().await {
            // Each exit gets its own silent attempt.
            Ok(()) => self.on_restored(session),
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "full-screen re-acquisition failed");
                self.mode = SecureMode::ManualRequired;
            }
        }
        self.mode
    }

    /// The user pressed "return to exam".
    pub async fn manual_retry(&mut self, session: &mut ExamSession) -> SecureMode {
        self.enter(session).await
    }

    /// The host reports full screen is active again.
    pub fn on_restored(&mut self, session: &mut ExamSession) {
        session.set_fullscreen(true);
        self.retries_used = 0;
        self.mode = SecureMode::Secured;
    }

    /// Leave full screen at the end of an exam. Errors are only logged.
    pub async fn release(&mut self) {
        if self.mode == SecureMode::Inactive {
            return;
        }
        if let Err(err) = self.host.exit_fullscreen().await {
            debug!(error = %err, "exit full screen failed");
        }
        self.mode = SecureMode::Inactive;
        self.retries_used = 0;
    }
}

impl std::fmt::Debug for FullscreenController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullscreenController")
            .field("mode", &self.mode)
            .field("retries_used", &self.retries_used)
            .finish_non_exhaustive()
    }
}
