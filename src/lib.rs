pub mod config;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod session;
pub mod settings;
pub mod storage;
pub mod usage;
mod utils;
pub mod visibility;
pub mod widget;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info, warn};

use config::PlayerConfig;
use progress::{ProgressRecord, ProgressStore, SharedProgress};
use session::SessionController;
use settings::{PlayerSettings, SettingsStore};
use storage::{MemoryGateway, PersistenceGateway, SqliteGateway};
use usage::{format_units, LedgerStore, UsageStats};
use widget::{PlaybackWidget, SimulatedWidget};

/// Root object: owns storage, the stores built on it and the one session
/// controller. Subsystems receive `Arc` handles from here instead of reaching
/// for globals.
pub struct PlayerApp {
    progress: SharedProgress,
    ledger: Arc<LedgerStore>,
    settings: Arc<SettingsStore>,
    controller: SessionController,
    config: PlayerConfig,
}

impl PlayerApp {
    /// Opens durable state under `data_dir`. If the SQLite store cannot be
    /// opened the app keeps running on an in-memory gateway.
    pub fn open(data_dir: &Path, config: PlayerConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let gateway: Arc<dyn PersistenceGateway> =
            match SqliteGateway::open(data_dir.join("tubeplay.sqlite3")) {
                Ok(gateway) => Arc::new(gateway),
                Err(err) => {
                    error!("Durable storage unavailable, continuing in memory: {err:#}");
                    Arc::new(MemoryGateway::new())
                }
            };

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        Ok(Self::with_gateway(gateway, settings, config))
    }

    pub fn in_memory(settings: PlayerSettings, config: PlayerConfig) -> Self {
        Self::with_gateway(
            Arc::new(MemoryGateway::new()),
            SettingsStore::in_memory(settings),
            config,
        )
    }

    pub fn with_gateway(
        gateway: Arc<dyn PersistenceGateway>,
        settings: SettingsStore,
        config: PlayerConfig,
    ) -> Self {
        let progress = ProgressStore::load(gateway.clone(), config.progress.clone()).into_shared();
        let ledger = Arc::new(LedgerStore::load(gateway));
        let settings = Arc::new(settings);
        let controller = SessionController::new(
            progress.clone(),
            ledger.clone(),
            settings.clone(),
            config.clone(),
        );

        Self {
            progress,
            ledger,
            settings,
            controller,
            config,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn progress_for(&self, content_id: &str) -> Option<ProgressRecord> {
        self.lock_progress().get(content_id).cloned()
    }

    pub fn resume_points(&self) -> Vec<ProgressRecord> {
        self.lock_progress().all()
    }

    /// Drops resume points older than the retention window.
    pub fn cleanup_progress(&self) -> usize {
        let days = self.config.progress.retention_days;
        self.lock_progress().cleanup(days)
    }

    pub fn clear_progress_for(&self, content_id: &str) {
        self.lock_progress().complete(content_id);
    }

    pub fn clear_all_progress(&self) {
        self.lock_progress().clear_all();
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.ledger.stats()
    }

    pub fn clear_usage(&self) {
        self.ledger.clear();
    }

    fn lock_progress(&self) -> std::sync::MutexGuard<'_, ProgressStore> {
        self.progress.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Plays a short simulated session against durable storage so the whole
/// pipeline can be watched in the logs.
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("tubeplay starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            return;
        }
    };

    if let Err(err) = runtime.block_on(demo_session()) {
        error!("Demo session failed: {err:#}");
    }
}

async fn demo_session() -> Result<()> {
    let data_dir = std::env::var_os("TUBEPLAY_DATA_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("tubeplay"));
    let content_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "dQw4w9WgXcQ".to_string());
    let play_secs = std::env::var("TUBEPLAY_DEMO_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(8);

    let app = PlayerApp::open(&data_dir, PlayerConfig::from_env())?;
    let removed = app.cleanup_progress();
    if removed > 0 {
        info!("Removed {removed} stale resume points");
    }

    let controller = app.controller().clone();
    controller.open(&content_id).await;

    let widget = Arc::new(SimulatedWidget::new(212.0));
    let mut events = widget.subscribe();
    let pump = tokio::spawn({
        let controller = controller.clone();
        async move {
            while let Some(state) = events.recv().await {
                controller.on_state_change(state).await;
            }
        }
    });

    let handle: Arc<dyn PlaybackWidget> = widget.clone();
    if let Err(err) = controller.on_ready(handle).await {
        warn!("Widget ready rejected: {err}");
    }
    if !app.settings().get().autoplay {
        controller.play().await?;
    }
    controller.set_rate(2.0).await?;

    tokio::time::sleep(Duration::from_secs(play_secs)).await;

    controller.teardown().await;
    pump.abort();

    match app.progress_for(&content_id) {
        Some(record) => info!(
            "Resume point for {}: {:.1}s ({:.1}%)",
            content_id, record.current_time, record.percentage
        ),
        None => info!("No resume point kept for {content_id}"),
    }

    let stats = app.usage_stats();
    info!(
        "Estimated usage: today {}, total {}",
        format_units(stats.today_units),
        format_units(stats.total_units)
    );
    Ok(())
}
