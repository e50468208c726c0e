use std::fmt;
use std::sync::Arc;

use exam_core::model::{ExamSession, Violation, ViolationKind};
use tracing::debug;

use super::host::{EventDisposition, EventHost, HostEvent, Key, KeyPress, ListenerId, ListenerKind};
use crate::error::HostError;

/// Letters blocked when pressed with the platform modifier:
/// copy, paste, cut, print, select-all, find, save, new tab, close tab, reload.
const BLOCKED_SHORTCUT_KEYS: [char; 10] = ['c', 'v', 'x', 'p', 'a', 'f', 's', 't', 'w', 'r'];

/// What the monitor makes of one host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub disposition: EventDisposition,
    pub violation: Option<Violation>,
}

impl Verdict {
    fn allow() -> Self {
        Self {
            disposition: EventDisposition::Allow,
            violation: None,
        }
    }

    fn prevent(violation: Option<Violation>) -> Self {
        Self {
            disposition: EventDisposition::Prevent,
            violation,
        }
    }

    fn report(violation: Violation) -> Self {
        Self {
            disposition: EventDisposition::Allow,
            violation: Some(violation),
        }
    }
}

/// Listeners registered on a host. Dropping the set removes every listener.
struct AttachedListeners {
    host: Arc<dyn EventHost>,
    ids: Vec<ListenerId>,
}

impl Drop for AttachedListeners {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.host.remove_listener(id);
        }
        debug!("security listeners detached");
    }
}

/// Turns host signals into violations while an exam is running.
///
/// Holds no counters; escalation belongs to `ViolationPolicy`.
#[derive(Default)]
pub struct SecurityMonitor {
    attached: Option<AttachedListeners>,
}

impl SecurityMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every monitored signal on `host`.
    ///
    /// Attaching twice is a no-op. If any subscription fails, the ones already
    /// made are removed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the host refuses a subscription.
    pub fn attach(&mut self, host: Arc<dyn EventHost>) -> Result<(), HostError> {
        if self.attached.is_some() {
            return Ok(());
        }

        let mut listeners = AttachedListeners {
            host: Arc::clone(&host),
            ids: Vec::with_capacity(ListenerKind::ALL.len()),
        };
        for kind in ListenerKind::ALL {
            listeners.ids.push(host.add_listener(kind)?);
        }

        debug!(count = listeners.ids.len(), "security listeners attached");
        self.attached = Some(listeners);
        Ok(())
    }

    /// Remove every listener. Safe to call repeatedly.
    pub fn detach(&mut self) {
        self.attached.take();
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Classify `event` against `session`.
    ///
    /// Once detached, or when the session is not running, every event is inert.
    #[must_use]
    pub fn inspect(&self, session: &ExamSession, event: &HostEvent) -> Verdict {
        if self.attached.is_none() || !session.phase().is_running() {
            return Verdict::allow();
        }
        Self::classify(event)
    }

    /// Pure classification, usable by a host that must decide on
    /// prevent-default synchronously before forwarding the event.
    #[must_use]
    pub fn classify(event: &HostEvent) -> Verdict {
        match event {
            HostEvent::KeyDown(press) => classify_key(press),
            HostEvent::ContextMenu => {
                Verdict::prevent(Some(Violation::new(ViolationKind::ContextMenu)))
            }
            HostEvent::Clipboard { action, .. } => {
                Verdict::prevent(Some(Violation::clipboard(*action)))
            }
            HostEvent::VisibilityChanged { hidden: true } => {
                Verdict::report(Violation::new(ViolationKind::TabHidden))
            }
            HostEvent::WindowBlur => Verdict::report(Violation::new(ViolationKind::FocusLost)),
            HostEvent::FullscreenChanged { active: false } => {
                Verdict::report(Violation::new(ViolationKind::FullscreenExit))
            }
            HostEvent::DragStart | HostEvent::Drop => Verdict::prevent(None),
            HostEvent::VisibilityChanged { hidden: false }
            | HostEvent::WindowFocus
            | HostEvent::FullscreenChanged { active: true } => Verdict::allow(),
        }
    }
}

impl fmt::Debug for SecurityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityMonitor")
            .field("attached", &self.is_attached())
            .finish()
    }
}

fn classify_key(press: &KeyPress) -> Verdict {
    let mods = press.modifiers;
    let violation = match &press.key {
        Key::Tab if mods.alt || mods.platform() => Some(Violation::new(ViolationKind::TabSwitch)),
        Key::Escape => Some(Violation::new(ViolationKind::EscapeKey)),
        Key::Function(_) => Some(Violation::with_reason(
            ViolationKind::FunctionKey,
            format!("{} is disabled during the exam", press.chord()),
        )),
        Key::Char(c)
            if mods.platform() && BLOCKED_SHORTCUT_KEYS.contains(&c.to_ascii_lowercase()) =>
        {
            Some(Violation::with_reason(
                ViolationKind::Shortcut,
                format!("{} is disabled during the exam", press.chord()),
            ))
        }
        _ => None,
    };

    match violation {
        Some(v) => Verdict::prevent(Some(v)),
        None => Verdict::allow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::host::{FieldTarget, Modifiers};
    use crate::exam::test_harness::{RecordingHost, active_session};
    use exam_core::model::ClipboardAction;

    fn kind_of(event: &HostEvent) -> Option<ViolationKind> {
        SecurityMonitor::classify(event).violation.map(|v| v.kind())
    }

    #[test]
    fn shortcuts_are_blocked_and_reported() {
        let verdict = SecurityMonitor::classify(&HostEvent::KeyDown(KeyPress::new(
            Key::Char('c'),
            Modifiers::ctrl(),
        )));
        assert_eq!(verdict.disposition, EventDisposition::Prevent);
        let violation = verdict.violation.unwrap();
        assert_eq!(violation.kind(), ViolationKind::Shortcut);
        assert_eq!(violation.reason(), "Ctrl+C is disabled during the exam");

        assert_eq!(
            kind_of(&HostEvent::KeyDown(KeyPress::new(Key::Char('R'), Modifiers::meta()))),
            Some(ViolationKind::Shortcut)
        );
    }

    #[test]
    fn typing_is_allowed() {
        let verdict = SecurityMonitor::classify(&HostEvent::KeyDown(KeyPress::plain(Key::Char('c'))));
        assert_eq!(verdict, Verdict::allow());
        assert_eq!(
            kind_of(&HostEvent::KeyDown(KeyPress::new(Key::Char('z'), Modifiers::ctrl()))),
            None
        );
        assert_eq!(kind_of(&HostEvent::KeyDown(KeyPress::plain(Key::Tab))), None);
    }

    #[test]
    fn tab_switch_function_and_escape_keys_report() {
        assert_eq!(
            kind_of(&HostEvent::KeyDown(KeyPress::new(Key::Tab, Modifiers::alt()))),
            Some(ViolationKind::TabSwitch)
        );
        assert_eq!(
            kind_of(&HostEvent::KeyDown(KeyPress::plain(Key::Function(5)))),
            Some(ViolationKind::FunctionKey)
        );
        assert_eq!(
            kind_of(&HostEvent::KeyDown(KeyPress::plain(Key::Escape))),
            Some(ViolationKind::EscapeKey)
        );
    }

    #[test]
    fn clipboard_on_reflection_field_is_blocked() {
        let verdict = SecurityMonitor::classify(&HostEvent::Clipboard {
            action: ClipboardAction::Paste,
            target: FieldTarget::Reflection,
        });
        assert_eq!(verdict.disposition, EventDisposition::Prevent);
        assert_eq!(verdict.violation.unwrap().kind(), ViolationKind::Clipboard);
    }

    #[test]
    fn leaving_the_tab_reports_without_prevent() {
        let hidden = SecurityMonitor::classify(&HostEvent::VisibilityChanged { hidden: true });
        assert_eq!(hidden.disposition, EventDisposition::Allow);
        assert_eq!(hidden.violation.unwrap().kind(), ViolationKind::TabHidden);
        assert_eq!(kind_of(&HostEvent::WindowBlur), Some(ViolationKind::FocusLost));
        assert_eq!(kind_of(&HostEvent::VisibilityChanged { hidden: false }), None);
        assert_eq!(kind_of(&HostEvent::WindowFocus), None);
    }

    #[test]
    fn drag_is_prevented_silently() {
        let verdict = SecurityMonitor::classify(&HostEvent::DragStart);
        assert_eq!(verdict.disposition, EventDisposition::Prevent);
        assert!(verdict.violation.is_none());
    }

    #[test]
    fn attach_registers_every_listener_once() {
        let host = RecordingHost::new();
        let mut monitor = SecurityMonitor::new();
        monitor.attach(host.clone()).unwrap();
        monitor.attach(host.clone()).unwrap();
        assert_eq!(host.active_count(), ListenerKind::ALL.len());

        monitor.detach();
        assert_eq!(host.active_count(), 0);
        assert!(!monitor.is_attached());
    }

    #[test]
    fn failed_attach_leaves_nothing_behind() {
        let host = RecordingHost::failing_on(ListenerKind::Fullscreen);
        let mut monitor = SecurityMonitor::new();
        assert!(monitor.attach(host.clone()).is_err());
        assert_eq!(host.active_count(), 0);
        assert!(!monitor.is_attached());
    }

    #[test]
    fn dropping_the_monitor_detaches() {
        let host = RecordingHost::new();
        {
            let mut monitor = SecurityMonitor::new();
            monitor.attach(host.clone()).unwrap();
            assert_eq!(host.active_count(), ListenerKind::ALL.len());
        }
        assert_eq!(host.active_count(), 0);
    }

    #[test]
    fn detached_monitor_is_inert() {
        let session = active_session(3);
        let monitor = SecurityMonitor::new();
        let verdict = monitor.inspect(&session, &HostEvent::ContextMenu);
        assert_eq!(verdict, Verdict::allow());
    }
}
