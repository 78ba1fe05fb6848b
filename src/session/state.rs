use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    progress::is_valid_duration, settings::PlayerSettings, usage::UsageStats, widget::WidgetSample,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Unstarted,
    Ready,
    Playing,
    Paused,
    Ended,
    TornDown,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Unstarted
    }
}

impl SessionPhase {
    /// Whether `next` is a legal move from `self`. Self-transitions are
    /// rejected so duplicate notifications become no-ops.
    pub fn accepts(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (TornDown, _) => false,
            (_, TornDown) => true,
            (Unstarted, Ready) => true,
            (Ready | Paused | Ended, Playing) => true,
            (Playing, Paused) => true,
            (Playing | Paused, Ended) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub session_id: String,
    pub content_id: String,
    pub phase: SessionPhase,
    pub current_time: f64,
    pub duration: f64,
    /// Seconds of media buffered ahead of the start.
    pub buffered: f64,
    pub playing: bool,
    pub buffering: bool,
    pub volume: u8,
    pub muted: bool,
    pub rate: f64,
    pub fullscreen: bool,
    pub started_at: DateTime<Utc>,
}

impl PlaybackSession {
    pub fn new(content_id: &str, settings: &PlayerSettings) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            content_id: content_id.to_string(),
            phase: SessionPhase::Unstarted,
            current_time: 0.0,
            duration: 0.0,
            buffered: 0.0,
            playing: false,
            buffering: false,
            volume: settings.default_volume.min(100),
            muted: settings.default_volume == 0,
            rate: settings.default_playback_rate,
            fullscreen: false,
            started_at: Utc::now(),
        }
    }

    pub fn apply_sample(&mut self, sample: WidgetSample) {
        if sample.current_time.is_finite() && sample.current_time >= 0.0 {
            self.current_time = sample.current_time;
        }
        self.duration = sample.duration;
        self.buffered = if self.has_valid_duration() {
            sample.loaded_fraction.clamp(0.0, 1.0) * self.duration
        } else {
            0.0
        };
    }

    pub fn has_valid_duration(&self) -> bool {
        is_valid_duration(self.duration)
    }

    /// `current_time / duration`, or `None` until a usable duration is known.
    pub fn watched_ratio(&self) -> Option<f64> {
        self.has_valid_duration()
            .then(|| self.current_time / self.duration)
    }

    pub fn percentage(&self) -> Option<f64> {
        self.watched_ratio().map(|ratio| ratio * 100.0)
    }
}

/// What the UI renders: the session plus overlay and sleep-timer state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub session: PlaybackSession,
    pub controls_visible: bool,
    pub sleep_timer_remaining_secs: Option<u64>,
    /// Present only while `show_usage_stats` is on.
    pub usage: Option<UsageStats>,
}
