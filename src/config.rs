use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::categorize::CategoryRule;
use crate::matching::{FxBand, FxBands};

const CONFIG_FILE: &str = "ledgerlink.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) local_currency: String,
    pub(crate) default_household: i64,
    pub(crate) database_path: Option<PathBuf>,
    pub(crate) stale_sms_days: i64,
    pub(crate) sms_duplicate_window_minutes: i64,
    pub(crate) rate_timeout_ms: u64,
    pub(crate) classifier_chunk_size: usize,
    pub(crate) classifier_timeout_ms: u64,
    pub(crate) fx_bands: BTreeMap<String, FxBand>,
    pub(crate) fx_rates: BTreeMap<String, Decimal>,
    pub(crate) category_rules: Vec<CategoryRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_currency: "ILS".into(),
            default_household: 1,
            database_path: None,
            stale_sms_days: 30,
            sms_duplicate_window_minutes: 60,
            rate_timeout_ms: 2000,
            classifier_chunk_size: 20,
            classifier_timeout_ms: 30_000,
            fx_bands: default_fx_bands(),
            fx_rates: default_fx_rates(),
            category_rules: Vec::new(),
        }
    }
}

fn default_fx_bands() -> BTreeMap<String, FxBand> {
    BTreeMap::from([
        ("USD".to_string(), FxBand::new(Decimal::new(34, 1), Decimal::new(40, 1))),
        ("EUR".to_string(), FxBand::new(Decimal::new(37, 1), Decimal::new(44, 1))),
        ("GBP".to_string(), FxBand::new(Decimal::new(43, 1), Decimal::new(51, 1))),
    ])
}

fn default_fx_rates() -> BTreeMap<String, Decimal> {
    BTreeMap::from([
        ("USD".to_string(), Decimal::new(37, 1)),
        ("EUR".to_string(), Decimal::new(40, 1)),
        ("GBP".to_string(), Decimal::new(47, 1)),
    ])
}

impl Settings {
    pub(crate) fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub(crate) fn from_toml(contents: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(contents)?;
        settings.local_currency = settings.local_currency.to_uppercase();
        settings.fx_bands = settings
            .fx_bands
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        settings.fx_rates = settings
            .fx_rates
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        for (currency, band) in &settings.fx_bands {
            if band.min > band.max {
                anyhow::bail!("fx band for {currency} has min > max");
            }
        }
        Ok(settings)
    }

    /// Look in the working directory, then the platform config directory.
    /// Falls back to defaults when neither holds a config file.
    pub(crate) fn find_and_load() -> Result<Self> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = project_dirs() {
            locations.push(dirs.config_dir().join(CONFIG_FILE));
        }

        for location in &locations {
            if location.exists() {
                tracing::debug!(path = %location.display(), "loading settings");
                return Self::load_from_file(location);
            }
        }
        Ok(Self::default())
    }

    pub(crate) fn fx_bands(&self) -> FxBands {
        FxBands::new(self.local_currency.clone(), self.fx_bands.clone())
    }

    pub(crate) fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let proj_dirs =
            project_dirs().ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        Ok(data_dir.join("ledgerlink.db"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "ledgerlink", "LedgerLink")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
