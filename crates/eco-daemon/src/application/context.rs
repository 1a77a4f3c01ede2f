//! SessionContext: the single "which device is live" slot.
//!
//! Built once in `main.rs` and handed (as `Arc<SessionContext>`) to both the
//! server and the [`EventRouter`](crate::application::router::EventRouter).
//! The server attaches and detaches sessions; the router reads the slot and
//! stops the current session on `device.disconnect`.
//!
//! The slot is a plain `std::sync::RwLock`: every critical section is a
//! pointer swap or clone and never spans an `.await`.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::ports::DeviceLink;

/// Error returned by [`SessionContext::try_attach`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Another session is still connected; the new one was not attached.
    #[error("device already connected")]
    AlreadyConnected,
}

/// Holds the currently attached device link, if any.
#[derive(Default)]
pub struct SessionContext {
    slot: RwLock<Option<Arc<dyn DeviceLink>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attached link while it is still connected.
    ///
    /// A link that has closed but not yet been detached is reported as absent.
    pub fn current(&self) -> Option<Arc<dyn DeviceLink>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|link| link.is_connected())
            .map(Arc::clone)
    }

    /// Returns `true` when a connected link is attached.
    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    /// Attaches `link` only if no connected link is present.
    ///
    /// A stale (closed) link left in the slot is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::AlreadyConnected`] if a connected link is
    /// attached; the existing link is left untouched.
    pub fn try_attach(&self, link: Arc<dyn DeviceLink>) -> Result<(), ContextError> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|existing| existing.is_connected()) {
            return Err(ContextError::AlreadyConnected);
        }
        info!(session = %link.session_id(), device = %link.device_id(), "session attached");
        *slot = Some(link);
        Ok(())
    }

    /// Attaches `link`, silently replacing whatever was there.
    pub fn attach(&self, link: Arc<dyn DeviceLink>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.as_ref() {
            debug!(session = %previous.session_id(), "replacing attached session");
        }
        *slot = Some(link);
    }

    /// Clears the slot if it still holds the session `session_id`.
    ///
    /// Returns `true` when something was removed.  A late detach from an old
    /// session never evicts its replacement.
    pub fn detach(&self, session_id: Uuid) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(link) if link.session_id() == session_id => {
                *slot = None;
                info!(session = %session_id, "session detached");
                true
            }
            _ => false,
        }
    }

    /// Empties the slot unconditionally.
    pub fn clear(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    /// Stops the attached link (if any) and empties the slot.
    pub fn stop_current(&self) {
        let link = {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(link) = link {
            info!(session = %link.session_id(), "stopping session");
            link.stop();
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SessionContext")
            .field("session", &slot.as_ref().map(|l| l.session_id()))
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockDeviceLink;

    fn mock_link(id: Uuid, connected: bool) -> MockDeviceLink {
        let mut link = MockDeviceLink::new();
        link.expect_session_id().return_const(id);
        link.expect_device_id()
            .returning(|| "mobile-ab12cd34".to_string());
        link.expect_is_connected().return_const(connected);
        link
    }

    #[test]
    fn test_current_is_none_for_new_context() {
        assert!(SessionContext::new().current().is_none());
    }

    #[test]
    fn test_try_attach_succeeds_on_empty_slot() {
        // Arrange
        let ctx = SessionContext::new();
        let id = Uuid::new_v4();

        // Act
        let result = ctx.try_attach(Arc::new(mock_link(id, true)));

        // Assert
        assert!(result.is_ok());
        assert_eq!(ctx.current().map(|l| l.session_id()), Some(id));
    }

    #[test]
    fn test_try_attach_rejects_while_connected_and_keeps_first() {
        // Arrange
        let ctx = SessionContext::new();
        let first = Uuid::new_v4();
        ctx.try_attach(Arc::new(mock_link(first, true))).unwrap();

        // Act
        let result = ctx.try_attach(Arc::new(mock_link(Uuid::new_v4(), true)));

        // Assert
        assert_eq!(result, Err(ContextError::AlreadyConnected));
        assert_eq!(ctx.current().map(|l| l.session_id()), Some(first));
    }

    #[test]
    fn test_try_attach_replaces_stale_closed_link() {
        let ctx = SessionContext::new();
        ctx.attach(Arc::new(mock_link(Uuid::new_v4(), false)));

        let fresh = Uuid::new_v4();
        assert!(ctx.try_attach(Arc::new(mock_link(fresh, true))).is_ok());
        assert_eq!(ctx.current().map(|l| l.session_id()), Some(fresh));
    }

    #[test]
    fn test_current_hides_closed_link() {
        let ctx = SessionContext::new();
        ctx.attach(Arc::new(mock_link(Uuid::new_v4(), false)));
        assert!(ctx.current().is_none());
        assert!(!ctx.is_connected());
    }

    #[test]
    fn test_attach_silently_replaces_connected_link() {
        let ctx = SessionContext::new();
        ctx.attach(Arc::new(mock_link(Uuid::new_v4(), true)));

        let second = Uuid::new_v4();
        ctx.attach(Arc::new(mock_link(second, true)));

        assert_eq!(ctx.current().map(|l| l.session_id()), Some(second));
    }

    #[test]
    fn test_detach_ignores_other_session_id() {
        // Arrange
        let ctx = SessionContext::new();
        let live = Uuid::new_v4();
        ctx.attach(Arc::new(mock_link(live, true)));

        // Act
        let removed = ctx.detach(Uuid::new_v4());

        // Assert
        assert!(!removed);
        assert!(ctx.current().is_some());
    }

    #[test]
    fn test_detach_removes_matching_session() {
        let ctx = SessionContext::new();
        let id = Uuid::new_v4();
        ctx.attach(Arc::new(mock_link(id, true)));

        assert!(ctx.detach(id));
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_stop_current_stops_link_and_empties_slot() {
        // Arrange
        let ctx = SessionContext::new();
        let mut link = mock_link(Uuid::new_v4(), true);
        link.expect_stop().times(1).return_const(());
        ctx.attach(Arc::new(link));

        // Act
        ctx.stop_current();
        ctx.stop_current();

        // Assert: the mock verifies exactly one stop() on drop
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_clear_empties_slot() {
        let ctx = SessionContext::new();
        ctx.attach(Arc::new(mock_link(Uuid::new_v4(), true)));
        ctx.clear();
        assert!(ctx.current().is_none());
    }
}
