use std::sync::{Arc, Mutex, MutexGuard};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{config::UsagePolicy, error::PlaybackError, lifecycle::LiveSession};

use super::{batch::WriteBehind, ledger::LedgerStore};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug)]
struct AccrualState {
    running: bool,
    init_charged: bool,
    /// Start of the not-yet-converted playing window.
    base: Option<Instant>,
    batch: WriteBehind,
}

/// Estimates bandwidth for one session from the time spent playing.
pub struct UsageAccountant {
    session_id: String,
    live: LiveSession,
    policy: UsagePolicy,
    ledger: Arc<LedgerStore>,
    state: Arc<Mutex<AccrualState>>,
    ticker: Option<(JoinHandle<()>, CancellationToken)>,
}

impl UsageAccountant {
    pub fn new(
        session_id: String,
        live: LiveSession,
        policy: UsagePolicy,
        ledger: Arc<LedgerStore>,
    ) -> Self {
        let batch = WriteBehind::new(policy.batch_threshold_units);
        Self {
            session_id,
            live,
            policy,
            ledger,
            state: Arc::new(Mutex::new(AccrualState {
                running: false,
                init_charged: false,
                base: None,
                batch,
            })),
            ticker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Units accrued but not yet committed to the ledger.
    pub fn pending(&self) -> f64 {
        lock(&self.state).batch.pending()
    }

    /// Begins accruing. A second call while running changes nothing.
    pub fn start(&mut self) {
        {
            let mut state = lock(&self.state);
            if state.running {
                log_debug!("usage accountant already running for session {}", self.session_id);
                return;
            }
            state.running = true;
            state.base = Some(Instant::now());

            if !state.init_charged {
                state.init_charged = true;
                self.ledger.commit(self.policy.init_cost_units);
                log_info!(
                    "charged {:.2} units session bootstrap for {}",
                    self.policy.init_cost_units,
                    self.session_id
                );
            }
        }

        self.spawn_ticker();
    }

    /// Stops accruing and commits whatever remainder is outstanding.
    /// Returns the amount flushed.
    pub fn stop(&mut self) -> Option<f64> {
        self.cancel_ticker();

        let mut state = lock(&self.state);
        if state.running {
            settle(&mut state, &self.ledger, &self.policy);
            state.running = false;
            state.base = None;
        }
        let remainder = state.batch.flush();
        if let Some(units) = remainder {
            self.ledger.commit(units);
            log_info!("flushed {:.3} remaining units for {}", units, self.session_id);
        }
        remainder
    }

    /// Adds an explicit amount through the same batching path as timed accrual.
    pub fn accrue(&self, units: f64) {
        let mut state = lock(&self.state);
        if let Some(batch) = state.batch.accrue(units) {
            self.ledger.commit(batch);
        }
    }

    /// Commits the pending amount now, regardless of threshold.
    pub fn flush(&self) -> Option<f64> {
        let mut state = lock(&self.state);
        let remainder = state.batch.flush();
        if let Some(units) = remainder {
            self.ledger.commit(units);
        }
        remainder
    }

    fn spawn_ticker(&mut self) {
        self.cancel_ticker();

        let token = CancellationToken::new();
        let cancel = token.clone();
        let state = self.state.clone();
        let ledger = self.ledger.clone();
        let policy = self.policy.clone();
        let live = self.live.clone();
        let session_id = self.session_id.clone();

        let handle = tokio::spawn(async move {
            let period = policy.tick_interval;
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !live.is_live(&session_id) {
                            log_debug!("{}", PlaybackError::StaleSessionWrite { session_id: session_id.clone() });
                            break;
                        }
                        let mut guard = lock(&state);
                        if !guard.running {
                            break;
                        }
                        settle(&mut guard, &ledger, &policy);
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });

        self.ticker = Some((handle, token));
    }

    fn cancel_ticker(&mut self) {
        if let Some((handle, token)) = self.ticker.take() {
            token.cancel();
            handle.abort();
        }
    }
}

impl Drop for UsageAccountant {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

/// Converts playing time since `base` into units and feeds the batch.
fn settle(state: &mut AccrualState, ledger: &LedgerStore, policy: &UsagePolicy) {
    let now = Instant::now();
    let Some(base) = state.base.replace(now) else {
        return;
    };
    let minutes = now.duration_since(base).as_secs_f64() / 60.0;
    if let Some(batch) = state.batch.accrue(minutes * policy.units_per_minute) {
        ledger.commit(batch);
    }
}

fn lock(state: &Mutex<AccrualState>) -> MutexGuard<'_, AccrualState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}
