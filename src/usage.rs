//! Usage counters.
//!
//! The persisted record is `{ "total": n, "dailyCounts": { "YYYY-MM-DD": n } }`.
//! State changes go through [`UsageState::apply`]; only [`UsageStore`] touches
//! the filesystem. Aggregates are recomputed from the daily map on demand.

use crate::error::Result;
use chrono::{Datelike, Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const USAGE_FILE: &str = "usage.json";

/// Persisted usage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageState {
    /// All-time count.
    pub total: u64,
    /// Count per local date.
    pub daily_counts: BTreeMap<NaiveDate, u64>,
}

/// Something that changes the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    /// An enhancement succeeded on the given local date.
    Enhanced {
        /// Local calendar date of the enhancement.
        on: NaiveDate,
    },
}

/// Derived views over [`UsageState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Count for `today`.
    pub today: u64,
    /// Count for the day before `today`.
    pub yesterday: u64,
    /// Today and the six days before it.
    pub last_7_days: u64,
    /// Calendar month of `today`, up to `today`.
    pub this_month: u64,
    /// All-time count.
    pub total: u64,
}

/// Pre-map record that only tracked one day.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LegacyUsage {
    #[serde(default)]
    total: u64,
    today: u64,
    date: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredUsage {
    Current(UsageState),
    Legacy(LegacyUsage),
}

impl UsageState {
    /// Returns the state after `event`.
    pub fn apply(mut self, event: UsageEvent) -> Self {
        match event {
            UsageEvent::Enhanced { on } => {
                *self.daily_counts.entry(on).or_insert(0) += 1;
                self.total += 1;
            }
        }
        self
    }

    /// Count recorded for one date.
    pub fn count_on(&self, date: NaiveDate) -> u64 {
        self.daily_counts.get(&date).copied().unwrap_or(0)
    }

    /// Recomputes the aggregates as seen on `today`.
    pub fn summary(&self, today: NaiveDate) -> UsageSummary {
        let yesterday = today.checked_sub_days(Days::new(1));
        let week_start = today.checked_sub_days(Days::new(6)).unwrap_or(NaiveDate::MIN);

        let last_7_days = self
            .daily_counts
            .range(week_start..=today)
            .map(|(_, n)| n)
            .sum();
        let this_month = self
            .daily_counts
            .iter()
            .filter(|(d, _)| d.year() == today.year() && d.month() == today.month() && **d <= today)
            .map(|(_, n)| n)
            .sum();

        UsageSummary {
            today: self.count_on(today),
            yesterday: yesterday.map(|d| self.count_on(d)).unwrap_or(0),
            last_7_days,
            this_month,
            total: self.total,
        }
    }

    /// Parses a persisted record, upgrading the legacy shape.
    ///
    /// Anything unreadable yields an empty state.
    pub fn restore(text: &str, today: NaiveDate) -> Self {
        let stored = serde_json::from_str::<serde_json::Value>(text).and_then(|value| {
            if value.is_object() {
                serde_json::from_value::<StoredUsage>(value)
            } else {
                Err(serde::de::Error::custom("usage record is not a JSON object"))
            }
        });
        match stored {
            Ok(StoredUsage::Current(state)) => state,
            Ok(StoredUsage::Legacy(legacy)) => {
                tracing::info!(date = %legacy.date, "migrating legacy usage record");
                migrate(legacy, today)
            }
            Err(e) => {
                tracing::warn!("usage record is corrupt, resetting: {e}");
                Self::default()
            }
        }
    }
}

/// Keeps the legacy day count, zero included, only if it was recorded today.
fn migrate(legacy: LegacyUsage, today: NaiveDate) -> UsageState {
    let mut daily_counts = BTreeMap::new();
    let stored = NaiveDate::parse_from_str(legacy.date.trim(), "%Y-%m-%d").ok();
    if stored == Some(today) {
        daily_counts.insert(today, legacy.today);
    }
    UsageState {
        total: legacy.total,
        daily_counts,
    }
}

/// Today's date in the local timezone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// JSON file holding the usage record.
#[derive(Debug, Clone)]
pub struct UsageStore {
    path: PathBuf,
}

impl UsageStore {
    /// Store backed by the file at `path`; nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/backdrop/usage.json`, if the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("backdrop").join(USAGE_FILE))
    }

    /// Location of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record; a missing or unreadable file is an empty state.
    pub fn load(&self, today: NaiveDate) -> UsageState {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => UsageState::restore(&text, today),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UsageState::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "cannot read usage record, resetting: {e}");
                UsageState::default()
            }
        }
    }

    /// Writes the record via a temp file and rename.
    pub fn save(&self, state: &UsageState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Counts one successful enhancement on `today` and returns the new views.
    pub fn record(&self, today: NaiveDate) -> Result<UsageSummary> {
        let state = self.load(today).apply(UsageEvent::Enhanced { on: today });
        self.save(&state)?;
        let summary = state.summary(today);
        tracing::debug!(today = summary.today, total = summary.total, "recorded usage");
        Ok(summary)
    }

    /// Current views without changing anything.
    pub fn summary(&self, today: NaiveDate) -> UsageSummary {
        self.load(today).summary(today)
    }
}
