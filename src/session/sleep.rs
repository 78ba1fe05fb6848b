use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};

use crate::{
    error::PlaybackError, lifecycle::LiveSession, settings::SettingsStore, widget::WidgetAdapter,
};

/// Pauses playback once the configured number of minutes has passed. The
/// timer is one-shot: when it fires it zeroes `sleep_timer_minutes` so later
/// sessions do not re-arm it.
pub struct SleepTimer {
    armed: Option<(JoinHandle<()>, Instant)>,
}

impl SleepTimer {
    pub fn new() -> Self {
        Self { armed: None }
    }

    /// (Re)arms the timer; any earlier deadline is dropped.
    pub fn start(
        &mut self,
        minutes: u32,
        session_id: String,
        live: LiveSession,
        widget: WidgetAdapter,
        settings: Arc<SettingsStore>,
    ) {
        self.cancel();
        if minutes == 0 {
            return;
        }

        let deadline = Instant::now() + Duration::from_secs(u64::from(minutes) * 60);
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if !live.is_live(&session_id) {
                debug!("{}", PlaybackError::StaleSessionWrite { session_id });
                return;
            }
            info!("sleep timer elapsed after {minutes} min; pausing {session_id}");
            widget.pause();
            if let Err(err) = settings.update(|s| s.sleep_timer_minutes = 0) {
                warn!("Failed to reset sleep timer setting: {err:#}");
            }
        });

        self.armed = Some((handle, deadline));
    }

    pub fn cancel(&mut self) {
        if let Some((handle, _)) = self.armed.take() {
            handle.abort();
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.armed.as_ref().and_then(|(handle, deadline)| {
            (!handle.is_finished()).then(|| deadline.saturating_duration_since(Instant::now()))
        })
    }
}

impl Drop for SleepTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
