use std::sync::{Arc, RwLock};

/// The id of the one session allowed to write right now.
///
/// Every timer captures the id of the session that spawned it and checks it
/// here when it fires; a mismatch means the session was torn down and the
/// fire is dropped.
#[derive(Debug, Clone, Default)]
pub struct LiveSession {
    current: Arc<RwLock<Option<String>>>,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, session_id: &str) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Some(session_id.to_string());
    }

    pub fn end(&self) {
        self.current.write().unwrap_or_else(|p| p.into_inner()).take();
    }

    pub fn current(&self) -> Option<String> {
        self.current.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_live(&self, session_id: &str) -> bool {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .as_deref()
            == Some(session_id)
    }
}
