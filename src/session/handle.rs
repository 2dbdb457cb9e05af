use super::{Session, StatusCode};
use tracing::{debug, warn};

/// Sole owner of one session.
///
/// The session is released through [`SessionHandle::release`] or, failing
/// that, when the handle is dropped. Either way `destroy` runs exactly once;
/// later releases see the empty slot and make no session call.
pub struct SessionHandle<S: Session> {
    session: Option<S>,
}

impl<S: Session> SessionHandle<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_released(&self) -> bool {
        self.session.is_none()
    }

    pub fn get(&self) -> Option<&S> {
        self.session.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    /// Destroys the session. Returns `None` if it was already released.
    pub fn release(&mut self) -> Option<StatusCode> {
        let mut session = self.session.take()?;
        let status = session.destroy();
        if status.is_ok() {
            debug!("Session released");
        } else {
            warn!(status = %status, "Session destroy returned non-zero status");
        }
        Some(status)
    }
}

impl<S: Session> Drop for SessionHandle<S> {
    fn drop(&mut self) {
        if !self.is_released() {
            debug!("Releasing session on drop");
            self.release();
        }
    }
}
