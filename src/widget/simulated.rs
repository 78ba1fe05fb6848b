use std::sync::Mutex;

use tokio::{sync::mpsc, time::Instant};

use super::{PlaybackWidget, WidgetState};

/// Seconds of media the simulated network stays ahead of the playhead.
const READ_AHEAD_SECS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetCall {
    Play,
    Pause,
    Seek(f64),
    SetVolume(u8),
    Mute,
    Unmute,
    SetRate(f64),
}

#[derive(Debug)]
struct SimState {
    duration: f64,
    /// Position accumulated from earlier playing windows; combines with
    /// `playing_anchor` to compute the live position.
    position_baseline: f64,
    playing_anchor: Option<Instant>,
    rate: f64,
    volume: u8,
    muted: bool,
    calls: Vec<WidgetCall>,
    events: Option<mpsc::UnboundedSender<WidgetState>>,
}

impl SimState {
    fn position(&self) -> f64 {
        let live = match self.playing_anchor {
            Some(anchor) => {
                self.position_baseline + anchor.elapsed().as_secs_f64() * self.rate
            }
            None => self.position_baseline,
        };
        if self.duration.is_finite() && self.duration > 0.0 {
            live.min(self.duration)
        } else {
            live
        }
    }

    fn fold_anchor(&mut self) {
        self.position_baseline = self.position();
        if self.playing_anchor.is_some() {
            self.playing_anchor = Some(Instant::now());
        }
    }

    fn notify(&self, state: WidgetState) {
        if let Some(tx) = &self.events {
            let _ = tx.send(state);
        }
    }
}

/// An in-process stand-in for the embedded player. Its playhead advances with
/// tokio time while playing, so paused-clock tests drive it deterministically.
#[derive(Debug)]
pub struct SimulatedWidget {
    state: Mutex<SimState>,
}

impl SimulatedWidget {
    pub fn new(duration: f64) -> Self {
        Self {
            state: Mutex::new(SimState {
                duration,
                position_baseline: 0.0,
                playing_anchor: None,
                rate: 1.0,
                volume: 100,
                muted: false,
                calls: Vec::new(),
                events: None,
            }),
        }
    }

    /// Emits a state notification on every play/pause, and `Ended` once a
    /// seek or pause lands on the end of the media.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WidgetState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().events = Some(tx);
        rx
    }

    pub fn calls(&self) -> Vec<WidgetCall> {
        self.lock().calls.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing_anchor.is_some()
    }

    pub fn volume(&self) -> u8 {
        self.lock().volume
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    /// Changes what the player reports as duration, e.g. once metadata loads.
    pub fn set_duration(&self, duration: f64) {
        self.lock().duration = duration;
    }

    /// Moves the playhead without recording a call, as a user scrubbing
    /// inside the embedded player would.
    pub fn set_position(&self, seconds: f64) {
        let mut state = self.lock();
        state.fold_anchor();
        state.position_baseline = seconds.max(0.0);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl PlaybackWidget for SimulatedWidget {
    fn current_time(&self) -> f64 {
        self.lock().position()
    }

    fn duration(&self) -> f64 {
        self.lock().duration
    }

    fn loaded_fraction(&self) -> f64 {
        let state = self.lock();
        if !(state.duration.is_finite() && state.duration > 0.0) {
            return 0.0;
        }
        ((state.position() + READ_AHEAD_SECS) / state.duration).min(1.0)
    }

    fn play(&self) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::Play);
        if state.playing_anchor.is_none() {
            state.playing_anchor = Some(Instant::now());
            state.notify(WidgetState::Playing);
        }
    }

    fn pause(&self) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::Pause);
        if state.playing_anchor.is_some() {
            state.position_baseline = state.position();
            state.playing_anchor = None;
            if state.duration > 0.0 && state.position_baseline >= state.duration {
                state.notify(WidgetState::Ended);
            } else {
                state.notify(WidgetState::Paused);
            }
        }
    }

    fn seek(&self, seconds: f64) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::Seek(seconds));
        state.fold_anchor();
        let upper = if state.duration.is_finite() && state.duration > 0.0 {
            state.duration
        } else {
            f64::MAX
        };
        state.position_baseline = seconds.clamp(0.0, upper);
    }

    fn set_volume(&self, volume: u8) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::SetVolume(volume));
        state.volume = volume.min(100);
    }

    fn mute(&self) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::Mute);
        state.muted = true;
    }

    fn unmute(&self) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::Unmute);
        state.muted = false;
    }

    fn set_rate(&self, rate: f64) {
        let mut state = self.lock();
        state.calls.push(WidgetCall::SetRate(rate));
        state.fold_anchor();
        state.rate = rate;
    }
}
