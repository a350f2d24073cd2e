use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{info, warn};
use thiserror::Error;

use crate::models::GrantState;

/// Classified notification failures, surfaced as a single current-error
/// field for the CLI to render. None of these propagate as panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("this platform has no notification service")]
    UnsupportedPlatform,
    #[error("headless session: register the daemon for autostart first")]
    NotInstalled,
    #[error("notification permission was denied")]
    PermissionDenied,
    #[error("notification delivery failed: {0}")]
    DispatchFailure(String),
}

/// Runtime environment checks, split behind a trait so the gate can be
/// exercised in tests without a desktop session.
pub trait PlatformProbe: Send + Sync {
    /// A notification service is reachable at all.
    fn has_notification_service(&self) -> bool;
    /// A constrained session (no graphical display) that additionally
    /// requires installed mode before notifications work.
    fn is_constrained_session(&self) -> bool;
    /// The daemon is registered for autostart (the installed analog).
    fn is_installed(&self) -> bool;
}

/// Probe backed by the real desktop environment.
pub struct DesktopProbe;

impl DesktopProbe {
    fn autostart_entry() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autostart").join("taskping.desktop"))
    }
}

impl PlatformProbe for DesktopProbe {
    fn has_notification_service(&self) -> bool {
        if cfg!(target_os = "linux") {
            std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some()
        } else {
            true
        }
    }

    fn is_constrained_session(&self) -> bool {
        if cfg!(target_os = "linux") {
            std::env::var_os("DISPLAY").is_none() && std::env::var_os("WAYLAND_DISPLAY").is_none()
        } else {
            false
        }
    }

    fn is_installed(&self) -> bool {
        Self::autostart_entry().map_or(false, |path| path.exists())
    }
}

/// Decides once, at initialization, whether this runtime can deliver
/// notifications, and tracks the user's grant state.
pub struct CapabilityGate {
    can_use: bool,
    constrained: bool,
    granted: AtomicBool,
    denied: AtomicBool,
    error: Mutex<Option<NotifyError>>,
}

impl CapabilityGate {
    pub fn new(probe: &dyn PlatformProbe, persisted: GrantState) -> Self {
        let mut error = None;
        let constrained = probe.is_constrained_session();

        let can_use = if !probe.has_notification_service() {
            error = Some(NotifyError::UnsupportedPlatform);
            false
        } else if constrained && !probe.is_installed() {
            // Never auto-request on a constrained session; report why instead.
            error = Some(NotifyError::NotInstalled);
            false
        } else {
            true
        };

        if let Some(err) = &error {
            warn!("notifications unavailable: {err}");
        }
        if persisted == GrantState::Denied && error.is_none() {
            error = Some(NotifyError::PermissionDenied);
        }

        Self {
            can_use,
            constrained,
            granted: AtomicBool::new(can_use && persisted == GrantState::Granted),
            denied: AtomicBool::new(persisted == GrantState::Denied),
            error: Mutex::new(error),
        }
    }

    pub fn can_use_notifications(&self) -> bool {
        self.can_use
    }

    pub fn permission_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    /// The delivery path selector: a constrained session that made it past
    /// the install check keeps rendering in-process.
    pub fn is_constrained_session(&self) -> bool {
        self.constrained
    }

    pub fn last_error(&self) -> Option<NotifyError> {
        self.error.lock().ok().and_then(|guard| guard.clone())
    }

    pub(crate) fn record_error(&self, err: NotifyError) {
        if let Ok(mut guard) = self.error.lock() {
            *guard = Some(err);
        }
    }

    /// Explicit, user-triggered permission request. Idempotent: repeated
    /// calls when already granted are no-ops returning true. Never panics;
    /// every failure path resolves to false with a populated error.
    pub fn request_permission(&self) -> bool {
        if !self.can_use {
            return false;
        }
        if self.granted.load(Ordering::SeqCst) {
            return true;
        }
        if self.denied.load(Ordering::SeqCst) {
            // Only out-of-band settings can lift an explicit denial.
            self.record_error(NotifyError::PermissionDenied);
            return false;
        }
        self.granted.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.error.lock() {
            *guard = None;
        }
        info!("notification permission granted");
        true
    }

    /// Grant state to persist back into the config file.
    pub fn grant_state(&self) -> GrantState {
        if self.denied.load(Ordering::SeqCst) {
            GrantState::Denied
        } else if self.granted.load(Ordering::SeqCst) {
            GrantState::Granted
        } else {
            GrantState::Unset
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::PlatformProbe;

    pub struct TestProbe {
        pub service: bool,
        pub constrained: bool,
        pub installed: bool,
    }

    impl Default for TestProbe {
        fn default() -> Self {
            Self {
                service: true,
                constrained: false,
                installed: false,
            }
        }
    }

    impl PlatformProbe for TestProbe {
        fn has_notification_service(&self) -> bool {
            self.service
        }

        fn is_constrained_session(&self) -> bool {
            self.constrained
        }

        fn is_installed(&self) -> bool {
            self.installed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestProbe;
    use super::*;

    #[test]
    fn missing_service_is_unsupported() {
        let probe = TestProbe {
            service: false,
            ..TestProbe::default()
        };
        let gate = CapabilityGate::new(&probe, GrantState::Unset);
        assert!(!gate.can_use_notifications());
        assert!(!gate.request_permission());
        assert_eq!(gate.last_error(), Some(NotifyError::UnsupportedPlatform));
    }

    #[test]
    fn constrained_session_requires_install() {
        let probe = TestProbe {
            constrained: true,
            installed: false,
            ..TestProbe::default()
        };
        let gate = CapabilityGate::new(&probe, GrantState::Unset);
        assert!(!gate.can_use_notifications());
        assert_eq!(gate.last_error(), Some(NotifyError::NotInstalled));

        let installed = TestProbe {
            constrained: true,
            installed: true,
            ..TestProbe::default()
        };
        let gate = CapabilityGate::new(&installed, GrantState::Unset);
        assert!(gate.can_use_notifications());
        assert!(gate.is_constrained_session());
    }

    #[test]
    fn request_permission_is_idempotent() {
        let probe = TestProbe::default();
        let gate = CapabilityGate::new(&probe, GrantState::Unset);
        assert!(!gate.permission_granted());
        assert!(gate.request_permission());
        assert!(gate.request_permission());
        assert!(gate.permission_granted());
        assert_eq!(gate.grant_state(), GrantState::Granted);
    }

    #[test]
    fn denied_state_stays_denied() {
        let probe = TestProbe::default();
        let gate = CapabilityGate::new(&probe, GrantState::Denied);
        assert!(gate.can_use_notifications());
        assert!(!gate.request_permission());
        assert!(!gate.permission_granted());
        assert_eq!(gate.last_error(), Some(NotifyError::PermissionDenied));
    }
}
