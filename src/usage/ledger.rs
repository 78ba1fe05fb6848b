use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Local, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{error::PlaybackError, storage::PersistenceGateway};

pub const LEDGER_KEY: &str = "usage-ledger";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageLedger {
    pub total_units: f64,
    /// Local calendar day (`YYYY-MM-DD`) to units committed that day.
    pub daily_units: BTreeMap<String, f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl UsageLedger {
    fn apply(&mut self, units: f64, now: DateTime<Utc>) {
        self.total_units += units;
        *self.daily_units.entry(day_key(now)).or_insert(0.0) += units;
        self.last_updated = Some(now);
    }

    pub fn units_on(&self, now: DateTime<Utc>) -> f64 {
        self.daily_units.get(&day_key(now)).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_units: f64,
    pub today_units: f64,
    pub daily_units: BTreeMap<String, f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

pub fn day_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// Renders a megabyte amount the way the stats panel shows it.
pub fn format_units(megabytes: f64) -> String {
    if megabytes <= 0.0 {
        return "0 GB".to_string();
    }
    let gigabytes = megabytes / 1024.0;
    if gigabytes < 1.0 {
        format!("{megabytes:.2} MB")
    } else {
        format!("{gigabytes:.2} GB")
    }
}

/// The process-wide ledger plus its persisted copy.
pub struct LedgerStore {
    gateway: Arc<dyn PersistenceGateway>,
    ledger: Mutex<UsageLedger>,
}

impl LedgerStore {
    pub fn load(gateway: Arc<dyn PersistenceGateway>) -> Self {
        let ledger = match gateway.get_item(LEDGER_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                error!("Discarding unreadable usage ledger: {err}");
                UsageLedger::default()
            }),
            Ok(None) => UsageLedger::default(),
            Err(err) => {
                error!("Failed to load usage ledger: {err:#}");
                UsageLedger::default()
            }
        };

        Self {
            gateway,
            ledger: Mutex::new(ledger),
        }
    }

    pub fn commit(&self, units: f64) {
        self.commit_at(units, Utc::now());
    }

    /// Adds a flushed batch. The in-memory ledger advances even if the write
    /// fails.
    pub fn commit_at(&self, units: f64, now: DateTime<Utc>) {
        if !units.is_finite() || units <= 0.0 {
            return;
        }
        let mut ledger = self.lock();
        ledger.apply(units, now);
        self.persist(&ledger);
    }

    pub fn ledger(&self) -> UsageLedger {
        self.lock().clone()
    }

    pub fn stats(&self) -> UsageStats {
        let now = Utc::now();
        let ledger = self.lock();
        UsageStats {
            total_units: ledger.total_units,
            today_units: ledger.units_on(now),
            daily_units: ledger.daily_units.clone(),
            last_updated: ledger.last_updated,
        }
    }

    pub fn today_units(&self) -> f64 {
        self.lock().units_on(Utc::now())
    }

    /// The only operation allowed to lower the totals.
    pub fn clear(&self) {
        let mut ledger = self.lock();
        *ledger = UsageLedger::default();
        if let Err(err) = self.gateway.remove_item(LEDGER_KEY) {
            warn!("{}", PlaybackError::storage(LEDGER_KEY, &err));
        }
        info!("Usage ledger cleared");
    }

    fn persist(&self, ledger: &UsageLedger) {
        let result = serde_json::to_string(ledger)
            .map_err(anyhow::Error::from)
            .and_then(|serialized| self.gateway.set_item(LEDGER_KEY, &serialized));

        if let Err(err) = result {
            warn!("{}", PlaybackError::storage(LEDGER_KEY, &err));
        }
    }

    fn lock(&self) -> MutexGuard<'_, UsageLedger> {
        self.ledger.lock().unwrap_or_else(|p| p.into_inner())
    }
}
