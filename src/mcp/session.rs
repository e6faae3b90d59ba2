//! Handshake progress for the single client on the pipe

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initialized,
}

#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// Records the initialization-complete notification. Returns `true` only on the
    /// first transition; repeated notifications are no-ops.
    pub fn mark_initialized(&mut self) -> bool {
        let transitioned = self.state == SessionState::Uninitialized;
        self.state = SessionState::Initialized;
        transitioned
    }
}
