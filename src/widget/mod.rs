//! Capability boundary around the embedded third-party player.
//!
//! The core only ever talks to a [`PlaybackWidget`] through a
//! [`WidgetAdapter`], which turns calls made before the player signalled
//! readiness into logged no-ops.

mod simulated;

pub use simulated::{SimulatedWidget, WidgetCall};

use std::sync::{Arc, RwLock};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::PlaybackError;

/// Operations the embedded player exposes. Implementations use interior
/// mutability; every call is made from the session's tasks.
pub trait PlaybackWidget: Send + Sync {
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    /// Fraction of the media buffered so far, `0.0..=1.0`.
    fn loaded_fraction(&self) -> f64;
    fn play(&self);
    fn pause(&self);
    fn seek(&self, seconds: f64);
    fn set_volume(&self, volume: u8);
    fn mute(&self);
    fn unmute(&self);
    fn set_rate(&self, rate: f64);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WidgetState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

impl WidgetState {
    /// Maps the embed API's numeric player states. "Cued" (5) is reported as
    /// unstarted since nothing has played yet.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 | 5 => Some(WidgetState::Unstarted),
            0 => Some(WidgetState::Ended),
            1 => Some(WidgetState::Playing),
            2 => Some(WidgetState::Paused),
            3 => Some(WidgetState::Buffering),
            _ => None,
        }
    }
}

/// A shareable slot holding the player once it is ready.
#[derive(Clone, Default)]
pub struct WidgetAdapter {
    handle: Arc<RwLock<Option<Arc<dyn PlaybackWidget>>>>,
}

impl WidgetAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(&self, handle: Arc<dyn PlaybackWidget>) {
        *self.handle.write().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    pub fn detach(&self) {
        self.handle.write().unwrap_or_else(|p| p.into_inner()).take();
    }

    pub fn is_ready(&self) -> bool {
        self.handle
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    fn with<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn PlaybackWidget) -> T,
    ) -> Result<T, PlaybackError> {
        // Clone the handle out so the lock is not held across the widget call.
        let handle = self
            .handle
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        match handle {
            Some(widget) => Ok(f(widget.as_ref())),
            None => {
                let err = PlaybackError::WidgetNotReady { operation };
                warn!("{err}");
                Err(err)
            }
        }
    }

    pub fn current_time(&self) -> Option<f64> {
        self.with("current_time", |w| w.current_time()).ok()
    }

    pub fn duration(&self) -> Option<f64> {
        self.with("duration", |w| w.duration()).ok()
    }

    pub fn loaded_fraction(&self) -> Option<f64> {
        self.with("loaded_fraction", |w| w.loaded_fraction()).ok()
    }

    /// Reads position, duration and buffered fraction in one go.
    pub fn poll(&self) -> Option<WidgetSample> {
        self.with("poll", |w| WidgetSample {
            current_time: w.current_time(),
            duration: w.duration(),
            loaded_fraction: w.loaded_fraction(),
        })
        .ok()
    }

    pub fn play(&self) -> bool {
        self.with("play", |w| w.play()).is_ok()
    }

    pub fn pause(&self) -> bool {
        self.with("pause", |w| w.pause()).is_ok()
    }

    pub fn seek(&self, seconds: f64) -> bool {
        self.with("seek", |w| w.seek(seconds)).is_ok()
    }

    pub fn set_volume(&self, volume: u8) -> bool {
        self.with("set_volume", |w| w.set_volume(volume)).is_ok()
    }

    pub fn mute(&self) -> bool {
        self.with("mute", |w| w.mute()).is_ok()
    }

    pub fn unmute(&self) -> bool {
        self.with("unmute", |w| w.unmute()).is_ok()
    }

    pub fn set_rate(&self, rate: f64) -> bool {
        self.with("set_rate", |w| w.set_rate(rate)).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetSample {
    pub current_time: f64,
    pub duration: f64,
    pub loaded_fraction: f64,
}
