use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant},
};

use crate::{
    config::VisibilityPolicy, error::PlaybackError, lifecycle::LiveSession,
    session::SessionPhase,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    Pointer,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityState {
    pub visible: bool,
    pub hide_deadline: Option<Instant>,
}

/// Shows the control overlay on user activity and hides it again after a
/// quiet period while playing.
pub struct VisibilityController {
    enabled: bool,
    policy: VisibilityPolicy,
    session_id: String,
    live: LiveSession,
    phase: watch::Receiver<SessionPhase>,
    state: Arc<Mutex<VisibilityState>>,
    hide_timer: Option<JoinHandle<()>>,
}

impl VisibilityController {
    pub fn new(
        enabled: bool,
        policy: VisibilityPolicy,
        session_id: String,
        live: LiveSession,
        phase: watch::Receiver<SessionPhase>,
    ) -> Self {
        Self {
            enabled,
            policy,
            session_id,
            live,
            phase,
            state: Arc::new(Mutex::new(VisibilityState {
                visible: true,
                hide_deadline: None,
            })),
            hide_timer: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        lock(&self.state).visible
    }

    pub fn state(&self) -> VisibilityState {
        *lock(&self.state)
    }

    /// Shows the controls and re-arms the hide deadline for `kind`.
    pub fn on_activity(&mut self, kind: InputKind) {
        lock(&self.state).visible = true;
        if !self.enabled {
            return;
        }

        self.cancel_timer();

        let delay = match kind {
            InputKind::Pointer => self.policy.pointer_hide_delay,
            InputKind::Touch => self.policy.touch_hide_delay,
        };
        let deadline = Instant::now() + delay;
        lock(&self.state).hide_deadline = Some(deadline);

        let state = self.state.clone();
        let live = self.live.clone();
        let phase = self.phase.clone();
        let session_id = self.session_id.clone();

        self.hide_timer = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;

            if !live.is_live(&session_id) {
                debug!("{}", PlaybackError::StaleSessionWrite { session_id });
                return;
            }

            let mut guard = lock(&state);
            if guard.hide_deadline != Some(deadline) {
                return;
            }
            guard.hide_deadline = None;
            if *phase.borrow() == SessionPhase::Playing {
                guard.visible = false;
            }
        }));
    }

    /// Forces the controls visible, e.g. when playback pauses.
    pub fn reveal(&mut self) {
        self.cancel_timer();
        lock(&self.state).visible = true;
    }

    pub fn cancel(&mut self) {
        self.cancel_timer();
    }

    pub fn is_armed(&self) -> bool {
        self.hide_timer.is_some()
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.hide_timer.take() {
            handle.abort();
        }
        lock(&self.state).hide_deadline = None;
    }
}

impl Drop for VisibilityController {
    fn drop(&mut self) {
        if let Some(handle) = self.hide_timer.take() {
            handle.abort();
        }
    }
}

fn lock(state: &Mutex<VisibilityState>) -> MutexGuard<'_, VisibilityState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}
