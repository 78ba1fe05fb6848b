use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};

use crate::{
    config::PlayerConfig,
    error::PlaybackError,
    lifecycle::LiveSession,
    progress::{ProgressRecord, SharedProgress},
    settings::SettingsStore,
    usage::{LedgerStore, UsageAccountant},
    visibility::{InputKind, VisibilityController},
    widget::{PlaybackWidget, WidgetAdapter, WidgetState},
};

use super::{
    sampler::{persist_progress, Sampler, SamplerContext},
    sleep::SleepTimer,
    state::{PlaybackSession, PlaybackSnapshot, SessionPhase},
};

/// Volume restored by unmute when the slider had been dragged to zero.
const UNMUTE_FALLBACK_VOLUME: u8 = 50;

/// Every timer a session owns. Dropped only through `shutdown`.
struct SessionTimers {
    session_id: String,
    sampler: Sampler,
    accountant: UsageAccountant,
    visibility: VisibilityController,
    sleep: SleepTimer,
}

impl SessionTimers {
    async fn shutdown(&mut self) {
        if let Err(err) = self.sampler.stop().await {
            error!("Failed to stop sampler for {}: {err:#}", self.session_id);
        }
        self.accountant.stop();
        self.visibility.cancel();
        self.sleep.cancel();
    }
}

/// Drives one playback session at a time: reacts to widget notifications,
/// runs the session's timers and forwards UI intents to the widget.
#[derive(Clone)]
pub struct SessionController {
    session: Arc<Mutex<Option<PlaybackSession>>>,
    timers: Arc<Mutex<Option<SessionTimers>>>,
    widget: WidgetAdapter,
    live: LiveSession,
    progress: SharedProgress,
    ledger: Arc<LedgerStore>,
    settings: Arc<SettingsStore>,
    config: PlayerConfig,
    phase_tx: Arc<watch::Sender<SessionPhase>>,
}

impl SessionController {
    pub fn new(
        progress: SharedProgress,
        ledger: Arc<LedgerStore>,
        settings: Arc<SettingsStore>,
        config: PlayerConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::TornDown);
        Self {
            session: Arc::new(Mutex::new(None)),
            timers: Arc::new(Mutex::new(None)),
            widget: WidgetAdapter::new(),
            live: LiveSession::new(),
            progress,
            ledger,
            settings,
            config,
            phase_tx: Arc::new(phase_tx),
        }
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase_tx.borrow()
    }

    pub fn widget(&self) -> &WidgetAdapter {
        &self.widget
    }

    /// Starts a session for `content_id`, tearing down the live one first.
    /// Returns the new session id.
    pub async fn open(&self, content_id: &str) -> String {
        self.teardown().await;

        let settings = self.settings.get();
        let session = PlaybackSession::new(content_id, &settings);
        let session_id = session.session_id.clone();

        self.live.begin(&session_id);
        *self.timers.lock().await = Some(SessionTimers {
            session_id: session_id.clone(),
            sampler: Sampler::new(),
            accountant: UsageAccountant::new(
                session_id.clone(),
                self.live.clone(),
                self.config.usage.clone(),
                self.ledger.clone(),
            ),
            visibility: VisibilityController::new(
                settings.auto_hide_controls,
                self.config.visibility.clone(),
                session_id.clone(),
                self.live.clone(),
                self.phase_tx.subscribe(),
            ),
            sleep: SleepTimer::new(),
        });
        *self.session.lock().await = Some(session);
        self.phase_tx.send_replace(SessionPhase::Unstarted);

        info!("Opened session {session_id} for {content_id}");
        session_id
    }

    /// The widget signalled readiness: restore the saved position before
    /// playback may begin, then autoplay if enabled.
    pub async fn on_ready(&self, handle: Arc<dyn PlaybackWidget>) -> Result<(), PlaybackError> {
        let settings = self.settings.get();
        let session_id = {
            let mut guard = self.session.lock().await;
            let session = guard.as_mut().ok_or(PlaybackError::NoActiveSession)?;
            if !session.phase.accepts(SessionPhase::Ready) {
                warn!(
                    "Ignoring ready for session {} in phase {:?}",
                    session.session_id, session.phase
                );
                return Ok(());
            }

            self.widget.ready(handle);
            self.widget.set_rate(session.rate);
            self.widget.set_volume(session.volume);
            if session.muted {
                self.widget.mute();
            }

            if let Some(record) = self.resume_point(&session.content_id) {
                self.widget.seek(record.current_time);
                session.current_time = record.current_time;
                info!(
                    "Resuming {} at {:.0}s ({:.1}%)",
                    session.content_id, record.current_time, record.percentage
                );
            }

            session.phase = SessionPhase::Ready;
            session.session_id.clone()
        };
        self.phase_tx.send_replace(SessionPhase::Ready);

        if settings.sleep_timer_minutes > 0 {
            if let Some(timers) = self.timers.lock().await.as_mut() {
                timers.sleep.start(
                    settings.sleep_timer_minutes,
                    session_id,
                    self.live.clone(),
                    self.widget.clone(),
                    self.settings.clone(),
                );
            }
        }

        if settings.autoplay {
            self.widget.play();
        }
        Ok(())
    }

    fn resume_point(&self, content_id: &str) -> Option<ProgressRecord> {
        let store = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        let min_resume = store.policy().min_resume_secs;
        store
            .get(content_id)
            .filter(|record| record.current_time > min_resume)
            .cloned()
    }

    /// Applies a state notification from the widget.
    pub async fn on_state_change(&self, state: WidgetState) {
        match state {
            WidgetState::Playing => self.enter_playing().await,
            WidgetState::Paused => self.enter_paused().await,
            WidgetState::Ended => self.enter_ended().await,
            WidgetState::Buffering => {
                if let Some(session) = self.session.lock().await.as_mut() {
                    session.buffering = true;
                }
            }
            WidgetState::Unstarted => debug!("Widget reported unstarted"),
        }
    }

    /// Moves the live session to `next` if the lifecycle allows it.
    async fn transition(&self, next: SessionPhase) -> Option<String> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut()?;
        if !session.phase.accepts(next) {
            // Playing again after a stall.
            if session.phase == next {
                session.buffering = false;
            }
            debug!(
                "Ignoring {:?} -> {:?} for session {}",
                session.phase, next, session.session_id
            );
            return None;
        }

        session.phase = next;
        session.playing = next == SessionPhase::Playing;
        session.buffering = false;
        self.phase_tx.send_replace(next);
        Some(session.session_id.clone())
    }

    async fn enter_playing(&self) {
        let Some(session_id) = self.transition(SessionPhase::Playing).await else {
            return;
        };

        let mut timers = self.timers.lock().await;
        let Some(timers) = timers.as_mut().filter(|t| t.session_id == session_id) else {
            return;
        };
        timers.sampler.start(SamplerContext {
            session_id,
            live: self.live.clone(),
            widget: self.widget.clone(),
            session: self.session.clone(),
            progress: self.progress.clone(),
            interval: self.config.sample_interval,
        });
        timers.accountant.start();
    }

    async fn enter_paused(&self) {
        let Some(session_id) = self.transition(SessionPhase::Paused).await else {
            return;
        };
        self.wind_down(&session_id, false).await;
    }

    async fn enter_ended(&self) {
        let completed = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return;
            };
            if let Some(sample) = self.widget.poll() {
                session.apply_sample(sample);
            }
            match session.watched_ratio() {
                Some(ratio) => ratio > self.config.progress.completion_ratio,
                None => {
                    debug!("{}", PlaybackError::InvalidDuration(session.duration));
                    false
                }
            }
        };

        let Some(session_id) = self.transition(SessionPhase::Ended).await else {
            return;
        };
        self.wind_down(&session_id, completed).await;
    }

    /// Shared tail of pause and end: flush or clear progress, stop the
    /// sampler and settle usage.
    async fn wind_down(&self, session_id: &str, completed: bool) {
        let mut timers = self.timers.lock().await;
        let Some(timers) = timers.as_mut().filter(|t| t.session_id == session_id) else {
            return;
        };

        let stopped = if completed {
            timers.sampler.stop().await
        } else {
            timers.sampler.drain().await
        };
        if let Err(err) = stopped {
            error!("Sampler for {session_id} did not stop cleanly: {err:#}");
        }

        if completed {
            let content_id = self
                .session
                .lock()
                .await
                .as_ref()
                .map(|session| session.content_id.clone());
            if let Some(content_id) = content_id {
                self.progress
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .complete(&content_id);
            }
        }

        timers.accountant.stop();
        timers.visibility.reveal();
    }

    /// Ends the live session: one last synchronous progress flush, then every
    /// timer is cancelled. Safe to call with no session.
    pub async fn teardown(&self) {
        let taken = self.session.lock().await.take();
        self.live.end();

        if let Some(mut session) = taken {
            if let Some(sample) = self.widget.poll() {
                session.apply_sample(sample);
            }
            if session.current_time > self.config.progress.min_resume_secs
                && session.duration > 0.0
            {
                persist_progress(&self.progress, &session);
            }
            info!(
                "Tore down session {} for {} at {:.1}s",
                session.session_id, session.content_id, session.current_time
            );
        }

        if let Some(mut timers) = self.timers.lock().await.take() {
            timers.shutdown().await;
        }

        self.widget.detach();
        self.phase_tx.send_replace(SessionPhase::TornDown);
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot, PlaybackError> {
        let session = self
            .session
            .lock()
            .await
            .clone()
            .ok_or(PlaybackError::NoActiveSession)?;

        let timers = self.timers.lock().await;
        let (controls_visible, sleep_remaining) = timers
            .as_ref()
            .map(|t| (t.visibility.is_visible(), t.sleep.remaining()))
            .unwrap_or((true, None));
        let usage = self
            .settings
            .get()
            .show_usage_stats
            .then(|| self.ledger.stats());

        Ok(PlaybackSnapshot {
            session,
            controls_visible,
            sleep_timer_remaining_secs: sleep_remaining.map(|d| d.as_secs()),
            usage,
        })
    }

    async fn with_session<T>(
        &self,
        f: impl FnOnce(&mut PlaybackSession, &WidgetAdapter) -> Result<T, PlaybackError>,
    ) -> Result<T, PlaybackError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(PlaybackError::NoActiveSession)?;
        f(session, &self.widget)
    }

    pub async fn play(&self) -> Result<(), PlaybackError> {
        self.with_session(|_, widget| {
            widget.play();
            Ok(())
        })
        .await
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.with_session(|_, widget| {
            widget.pause();
            Ok(())
        })
        .await
    }

    pub async fn toggle_play(&self) -> Result<(), PlaybackError> {
        self.with_session(|session, widget| {
            if session.playing {
                widget.pause();
            } else {
                widget.play();
            }
            Ok(())
        })
        .await
    }

    pub async fn seek(&self, seconds: f64) -> Result<(), PlaybackError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(PlaybackError::InvalidCommand(format!(
                "seek target {seconds} is not a position"
            )));
        }
        self.with_session(|session, widget| {
            let target = if session.has_valid_duration() {
                seconds.min(session.duration)
            } else {
                seconds
            };
            widget.seek(target);
            session.current_time = target;
            Ok(())
        })
        .await
    }

    /// Skips forward or back by `delta` seconds, clamped to the media.
    pub async fn seek_relative(&self, delta: f64) -> Result<(), PlaybackError> {
        if !delta.is_finite() {
            return Err(PlaybackError::InvalidCommand(format!("skip of {delta}s")));
        }
        self.with_session(|session, widget| {
            let upper = if session.has_valid_duration() {
                session.duration
            } else {
                f64::MAX
            };
            let target = (session.current_time + delta).clamp(0.0, upper);
            widget.seek(target);
            session.current_time = target;
            Ok(())
        })
        .await
    }

    pub async fn skip_forward(&self) -> Result<(), PlaybackError> {
        self.seek_relative(self.config.skip_secs).await
    }

    pub async fn skip_back(&self) -> Result<(), PlaybackError> {
        self.seek_relative(-self.config.skip_secs).await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), PlaybackError> {
        let volume = volume.min(100);
        self.with_session(|session, widget| {
            widget.set_volume(volume);
            session.volume = volume;
            session.muted = volume == 0;
            Ok(())
        })
        .await
    }

    /// Returns whether the session is muted afterwards.
    pub async fn toggle_mute(&self) -> Result<bool, PlaybackError> {
        self.with_session(|session, widget| {
            if session.muted {
                let restore = if session.volume == 0 {
                    UNMUTE_FALLBACK_VOLUME
                } else {
                    session.volume
                };
                widget.unmute();
                widget.set_volume(restore);
                session.volume = restore;
                session.muted = false;
            } else {
                widget.mute();
                session.muted = true;
            }
            Ok(session.muted)
        })
        .await
    }

    pub async fn set_rate(&self, rate: f64) -> Result<(), PlaybackError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidCommand(format!(
                "playback rate {rate} must be positive"
            )));
        }
        self.with_session(|session, widget| {
            widget.set_rate(rate);
            session.rate = rate;
            Ok(())
        })
        .await
    }

    /// Returns the new fullscreen flag.
    pub async fn toggle_fullscreen(&self) -> Result<bool, PlaybackError> {
        self.with_session(|session, _| {
            session.fullscreen = !session.fullscreen;
            Ok(session.fullscreen)
        })
        .await
    }

    /// Arms the sleep timer and remembers `minutes` in settings until it
    /// fires or is cancelled.
    pub async fn start_sleep_timer(&self, minutes: u32) -> Result<(), PlaybackError> {
        let mut timers = self.timers.lock().await;
        let timers = timers.as_mut().ok_or(PlaybackError::NoActiveSession)?;
        self.store_sleep_minutes(minutes);
        timers.sleep.start(
            minutes,
            timers.session_id.clone(),
            self.live.clone(),
            self.widget.clone(),
            self.settings.clone(),
        );
        Ok(())
    }

    pub async fn cancel_sleep_timer(&self) -> Result<(), PlaybackError> {
        let mut timers = self.timers.lock().await;
        let timers = timers.as_mut().ok_or(PlaybackError::NoActiveSession)?;
        timers.sleep.cancel();
        self.store_sleep_minutes(0);
        Ok(())
    }

    fn store_sleep_minutes(&self, minutes: u32) {
        if let Err(err) = self.settings.update(|s| s.sleep_timer_minutes = minutes) {
            warn!("Failed to save sleep timer setting: {err:#}");
        }
    }

    /// Pointer or touch activity over the player surface.
    pub async fn on_user_activity(&self, kind: InputKind) -> Result<(), PlaybackError> {
        let mut timers = self.timers.lock().await;
        let timers = timers.as_mut().ok_or(PlaybackError::NoActiveSession)?;
        timers.visibility.on_activity(kind);
        Ok(())
    }
}
