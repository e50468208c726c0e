//! Normalized view of the browser/window signals the proctoring engine listens to.

use async_trait::async_trait;
use exam_core::model::ClipboardAction;

use crate::error::{FullscreenError, HostError};

/// Modifier keys held during a key press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    #[must_use]
    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn meta() -> Self {
        Self {
            meta: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Self::default()
        }
    }

    /// Ctrl on most platforms, Cmd on macOS.
    #[must_use]
    pub fn platform(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Tab,
    Escape,
    Function(u8),
    Char(char),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyPress {
    #[must_use]
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    #[must_use]
    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::default())
    }

    /// Human-readable chord such as `Ctrl+C`.
    #[must_use]
    pub fn chord(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.modifiers.ctrl {
            parts.push("Ctrl".into());
        }
        if self.modifiers.meta {
            parts.push("Cmd".into());
        }
        if self.modifiers.alt {
            parts.push("Alt".into());
        }
        if self.modifiers.shift {
            parts.push("Shift".into());
        }
        parts.push(match &self.key {
            Key::Tab => "Tab".into(),
            Key::Escape => "Esc".into(),
            Key::Function(n) => format!("F{n}"),
            Key::Char(c) => c.to_ascii_uppercase().to_string(),
            Key::Named(name) => name.clone(),
        });
        parts.join("+")
    }
}

/// Field an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Question,
    Reflection,
    Page,
}

/// A single host signal, already stripped of platform detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    KeyDown(KeyPress),
    ContextMenu,
    Clipboard {
        action: ClipboardAction,
        target: FieldTarget,
    },
    VisibilityChanged {
        hidden: bool,
    },
    WindowBlur,
    WindowFocus,
    FullscreenChanged {
        active: bool,
    },
    DragStart,
    Drop,
}

impl HostEvent {
    #[must_use]
    pub fn listener(&self) -> ListenerKind {
        match self {
            HostEvent::KeyDown(_) => ListenerKind::KeyDown,
            HostEvent::ContextMenu => ListenerKind::ContextMenu,
            HostEvent::Clipboard { .. } => ListenerKind::Clipboard,
            HostEvent::VisibilityChanged { .. } => ListenerKind::Visibility,
            HostEvent::WindowBlur | HostEvent::WindowFocus => ListenerKind::WindowFocus,
            HostEvent::FullscreenChanged { .. } => ListenerKind::Fullscreen,
            HostEvent::DragStart | HostEvent::Drop => ListenerKind::DragDrop,
        }
    }
}

/// One subscription the security monitor holds on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    KeyDown,
    ContextMenu,
    Clipboard,
    Visibility,
    WindowFocus,
    Fullscreen,
    DragDrop,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 7] = [
        ListenerKind::KeyDown,
        ListenerKind::ContextMenu,
        ListenerKind::Clipboard,
        ListenerKind::Visibility,
        ListenerKind::WindowFocus,
        ListenerKind::Fullscreen,
        ListenerKind::DragDrop,
    ];
}

/// Handle returned by `EventHost::add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Whether the host should suppress the default action of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Allow,
    Prevent,
}

/// Where listeners live: the document/window of a browser tab, or any stand-in.
pub trait EventHost: Send + Sync {
    /// # Errors
    ///
    /// Returns `HostError` if the host refuses the subscription.
    fn add_listener(&self, kind: ListenerKind) -> Result<ListenerId, HostError>;

    fn remove_listener(&self, id: ListenerId);
}

/// Exclusive presentation mode of the host.
#[async_trait]
pub trait PresentationHost: Send + Sync {
    /// # Errors
    ///
    /// Returns `FullscreenError` if the host denies the request.
    async fn request_fullscreen(&self) -> Result<(), FullscreenError>;

    /// # Errors
    ///
    /// Returns `FullscreenError` if the host cannot leave full screen.
    async fn exit_fullscreen(&self) -> Result<(), FullscreenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_lists_modifiers_in_order() {
        let press = KeyPress::new(
            Key::Char('c'),
            Modifiers {
                ctrl: true,
                shift: true,
                ..Modifiers::default()
            },
        );
        assert_eq!(press.chord(), "Ctrl+Shift+C");
        assert_eq!(KeyPress::plain(Key::Function(12)).chord(), "F12");
    }

    #[test]
    fn blur_and_focus_share_a_listener() {
        assert_eq!(HostEvent::WindowBlur.listener(), ListenerKind::WindowFocus);
        assert_eq!(HostEvent::WindowFocus.listener(), ListenerKind::WindowFocus);
        assert_eq!(HostEvent::Drop.listener(), ListenerKind::DragDrop);
    }
}
