use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::DOCUMENT_ID_DELIMITER;
use crate::reconcile::{ReconcileOptions, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};

/// `kind → name → raw table`, as written under `[sources]` or `[targets]`.
pub type ConnectorTables = BTreeMap<String, BTreeMap<String, toml::Table>>;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub sources: ConnectorTables,
    #[serde(default)]
    pub targets: ConnectorTables,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            operation_timeout_secs: None,
            staging_dir: None,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_batch_delay_ms() -> u64 {
    DEFAULT_BATCH_DELAY.as_millis() as u64
}

impl SyncConfig {
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            dry_run: self.dry_run,
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            operation_timeout: self.operation_timeout_secs.map(Duration::from_secs),
            staging_dir: self.staging_dir.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.sync.batch_size == 0 {
        bail!("sync.batch_size must be > 0");
    }
    if config.sync.operation_timeout_secs == Some(0) {
        bail!("sync.operation_timeout_secs must be > 0 when set");
    }

    validate_connectors(&config.sources, "sources")?;
    validate_connectors(&config.targets, "targets")?;

    if config.sources.values().all(|instances| instances.is_empty()) {
        bail!("At least one source must be configured under [sources.<kind>.<name>]");
    }
    if config.targets.values().all(|instances| instances.is_empty()) {
        bail!("At least one target must be configured under [targets.<kind>.<name>]");
    }

    Ok(config)
}

fn validate_connectors(tables: &ConnectorTables, section: &str) -> Result<()> {
    for (kind, instances) in tables {
        if kind.contains(DOCUMENT_ID_DELIMITER) {
            bail!(
                "{} kind '{}' must not contain '{}'",
                section,
                kind,
                DOCUMENT_ID_DELIMITER
            );
        }
        for name in instances.keys() {
            if name.is_empty() || name.contains(DOCUMENT_ID_DELIMITER) {
                bail!(
                    "{}.{} name '{}' must be non-empty and must not contain '{}'",
                    section,
                    kind,
                    name,
                    DOCUMENT_ID_DELIMITER
                );
            }
        }
    }
    Ok(())
}
