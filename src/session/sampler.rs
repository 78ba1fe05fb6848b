use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::PlaybackError, lifecycle::LiveSession, progress::SharedProgress, widget::WidgetAdapter,
};

use super::state::{PlaybackSession, SessionPhase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything one sampling loop needs, captured at spawn time.
#[derive(Clone)]
pub struct SamplerContext {
    pub session_id: String,
    pub live: LiveSession,
    pub widget: WidgetAdapter,
    pub session: Arc<Mutex<Option<PlaybackSession>>>,
    pub progress: SharedProgress,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleMode {
    /// Regular tick: persists only while playing.
    Periodic,
    /// Last sample before the loop exits: persists regardless of phase.
    Final,
}

pub struct Sampler {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    drain_tx: Option<watch::Sender<bool>>,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            drain_tx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts the 1 Hz poll. A second start while running is ignored.
    pub fn start(&mut self, ctx: SamplerContext) {
        if self.is_running() {
            log_debug!("sampler already running for session {}", ctx.session_id);
            return;
        }

        let cancel_token = CancellationToken::new();
        // false = normal operation, true = take one final sample then exit
        let (drain_tx, drain_rx) = watch::channel(false);

        let handle = tokio::spawn(sampling_loop(ctx, cancel_token.clone(), drain_rx));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.drain_tx = Some(drain_tx);
    }

    /// Lets the loop take one final sample and flush it, then waits for it
    /// to exit.
    pub async fn drain(&mut self) -> Result<()> {
        if let Some(tx) = &self.drain_tx {
            let _ = tx.send(true);
        }
        let joined = self.join().await;
        self.cancel_token.take();
        self.drain_tx.take();
        joined
    }

    /// Stops the loop without a final sample.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.drain_tx.take();
        self.join().await
    }

    async fn join(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn sampling_loop(
    ctx: SamplerContext,
    cancel_token: CancellationToken,
    mut drain_rx: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + ctx.interval, ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("sampling loop started for session {}", ctx.session_id);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !ctx.live.is_live(&ctx.session_id) {
                    log_debug!("{}", PlaybackError::StaleSessionWrite { session_id: ctx.session_id.clone() });
                    break;
                }
                sample_once(&ctx, SampleMode::Periodic).await;
            }
            changed = drain_rx.changed() => {
                if changed.is_ok() && *drain_rx.borrow() {
                    sample_once(&ctx, SampleMode::Final).await;
                }
                break;
            }
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("sampling loop shutting down for session {}", ctx.session_id);
}

async fn sample_once(ctx: &SamplerContext, mode: SampleMode) {
    if !ctx.live.is_live(&ctx.session_id) {
        return;
    }
    let Some(sample) = ctx.widget.poll() else {
        return;
    };

    let mut guard = ctx.session.lock().await;
    let Some(session) = guard
        .as_mut()
        .filter(|session| session.session_id == ctx.session_id)
    else {
        log_debug!("{}", PlaybackError::StaleSessionWrite { session_id: ctx.session_id.clone() });
        return;
    };

    session.apply_sample(sample);

    let persist = match mode {
        SampleMode::Periodic => session.phase == SessionPhase::Playing,
        SampleMode::Final => true,
    };
    if persist {
        persist_progress(&ctx.progress, session);
    }
}

/// Hands the session's position to the progress store; the store decides
/// whether it is inside the resume window.
pub fn persist_progress(progress: &SharedProgress, session: &PlaybackSession) -> bool {
    if !session.has_valid_duration() {
        log_debug!("{}", PlaybackError::InvalidDuration(session.duration));
        return false;
    }

    let mut store = match progress.lock() {
        Ok(store) => store,
        Err(poisoned) => {
            log_warn!("progress store lock poisoned; recovering");
            poisoned.into_inner()
        }
    };
    store.record(&session.content_id, session.current_time, session.duration)
}
