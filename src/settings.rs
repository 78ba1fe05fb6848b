use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSettings {
    pub default_playback_rate: f64,
    pub default_volume: u8,
    pub autoplay: bool,
    /// When off, controls stay visible and no hide timer is ever armed.
    pub auto_hide_controls: bool,
    /// 0 disables the sleep timer.
    pub sleep_timer_minutes: u32,
    pub show_usage_stats: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_playback_rate: 1.0,
            default_volume: 80,
            autoplay: true,
            auto_hide_controls: false,
            sleep_timer_minutes: 0,
            show_usage_stats: true,
        }
    }
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<PlayerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            PlayerSettings::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Settings that live only for this process.
    pub fn in_memory(settings: PlayerSettings) -> Self {
        Self {
            path: None,
            data: RwLock::new(settings),
        }
    }

    pub fn get(&self) -> PlayerSettings {
        self.read().clone()
    }

    pub fn update<F>(&self, apply: F) -> Result<PlayerSettings>
    where
        F: FnOnce(&mut PlayerSettings),
    {
        let mut guard = self.write();
        apply(&mut guard);
        guard.default_volume = guard.default_volume.min(100);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &PlayerSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, PlayerSettings> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PlayerSettings> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }
}
