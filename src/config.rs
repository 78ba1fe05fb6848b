use std::time::Duration;

/// Thresholds governing when a resume point is worth keeping.
#[derive(Debug, Clone)]
pub struct ProgressPolicy {
    /// Positions at or below this many seconds are neither stored nor resumed.
    pub min_resume_secs: f64,

    /// Watched fraction at which content counts as finished.
    pub completion_ratio: f64,

    /// Age after which `cleanup` drops a record.
    pub retention_days: i64,
}

impl Default for ProgressPolicy {
    fn default() -> Self {
        Self {
            min_resume_secs: 5.0,
            completion_ratio: 0.95,
            retention_days: 30,
        }
    }
}

/// Bandwidth estimate knobs. Units are megabytes.
#[derive(Debug, Clone)]
pub struct UsagePolicy {
    /// Charged once per session for page/player bootstrap.
    pub init_cost_units: f64,
    pub units_per_minute: f64,
    /// Accrued units are committed to the ledger once they reach this amount.
    pub batch_threshold_units: f64,
    pub tick_interval: Duration,
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            init_cost_units: 2.0,
            units_per_minute: 10.0,
            batch_threshold_units: 5.0,
            tick_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityPolicy {
    pub pointer_hide_delay: Duration,
    pub touch_hide_delay: Duration,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            pointer_hide_delay: Duration::from_secs(3),
            touch_hide_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub sample_interval: Duration,
    /// Distance covered by the double-tap skip gestures.
    pub skip_secs: f64,
    pub progress: ProgressPolicy,
    pub usage: UsagePolicy,
    pub visibility: VisibilityPolicy,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            skip_secs: 10.0,
            progress: ProgressPolicy::default(),
            usage: UsagePolicy::default(),
            visibility: VisibilityPolicy::default(),
        }
    }
}

impl PlayerConfig {
    /// Defaults, with `TUBEPLAY_DEBUG=1` shortening the usage tick so ledger
    /// movement is visible while developing.
    pub fn from_env() -> Self {
        let debug_mode = std::env::var("TUBEPLAY_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let mut config = Self::default();
        if debug_mode {
            config.usage.tick_interval = Duration::from_secs(1);
        }
        config
    }
}
