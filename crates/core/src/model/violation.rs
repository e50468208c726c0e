use serde::{Deserialize, Serialize};
use std::fmt;

/// Clipboard operation intercepted during an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

impl ClipboardAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ClipboardAction::Copy => "copy",
            ClipboardAction::Cut => "cut",
            ClipboardAction::Paste => "paste",
        }
    }
}

/// Category of a detected integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabSwitch,
    Shortcut,
    FunctionKey,
    EscapeKey,
    ContextMenu,
    Clipboard,
    TabHidden,
    FocusLost,
    FullscreenExit,
}

impl ViolationKind {
    /// Default user-facing reason for this kind of violation.
    #[must_use]
    pub fn default_reason(self) -> &'static str {
        match self {
            ViolationKind::TabSwitch => "Switching tabs is not allowed during the exam",
            ViolationKind::Shortcut => "Keyboard shortcuts are disabled during the exam",
            ViolationKind::FunctionKey => "Function keys are disabled during the exam",
            ViolationKind::EscapeKey => "The Escape key is disabled during the exam",
            ViolationKind::ContextMenu => "Right-click is disabled during the exam",
            ViolationKind::Clipboard => "Copy and paste are disabled during the exam",
            ViolationKind::TabHidden => "You left the exam tab",
            ViolationKind::FocusLost => "The exam window lost focus",
            ViolationKind::FullscreenExit => "You exited full-screen mode",
        }
    }
}

/// A normalized violation signal: what happened plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    kind: ViolationKind,
    reason: String,
}

impl Violation {
    #[must_use]
    pub fn new(kind: ViolationKind) -> Self {
        Self {
            kind,
            reason: kind.default_reason().to_owned(),
        }
    }

    #[must_use]
    pub fn with_reason(kind: ViolationKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn clipboard(action: ClipboardAction) -> Self {
        let verb = match action {
            ClipboardAction::Copy => "Copying",
            ClipboardAction::Cut => "Cutting",
            ClipboardAction::Paste => "Pasting",
        };
        Self::with_reason(
            ViolationKind::Clipboard,
            format!("{verb} is disabled during the exam"),
        )
    }

    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}
