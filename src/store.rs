use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::categorizer::lookup;
use crate::db::Storage;
use crate::error::Result;
use crate::models::{CategoryId, PortfolioPosition, DEFAULT_ASSET_CLASS, DEFAULT_CURRENCY, UNKNOWN_SUB_LABEL};
use crate::parsers::{parse_date, DateValue};
use crate::reports::{aggregate_positions, AggregateSnapshot};

pub const POSITIONS_KEY: &str = "wealthdeck.positions.v2";
pub const LEGACY_POSITIONS_KEY: &str = "wealthdeck.positions.v1";
pub const LAST_IMPORT_KEY: &str = "wealthdeck.last_import.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    pub file_name: String,
    pub checksum: String,
    pub rows: usize,
    pub imported_at: String,
}

impl ImportInfo {
    pub fn new(file_name: impl Into<String>, bytes: &[u8], rows: usize) -> Self {
        Self {
            file_name: file_name.into(),
            checksum: checksum(bytes),
            rows,
            imported_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Immutable view handed to readers. Positions and aggregate always match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub positions: Vec<PortfolioPosition>,
    pub aggregate: AggregateSnapshot,
}

impl StoreSnapshot {
    fn build(positions: Vec<PortfolioPosition>) -> Self {
        let aggregate = aggregate_positions(&positions);
        Self { positions, aggregate }
    }
}

// ---------------------------------------------------------------------------
// Legacy format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyPosition {
    date: String,
    #[serde(default)]
    account: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    asset_class: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    value: f64,
}

fn upgrade(legacy: Vec<LegacyPosition>) -> Vec<PortfolioPosition> {
    let mut dropped = 0usize;
    let positions: Vec<PortfolioPosition> = legacy
        .into_iter()
        .filter_map(|p| {
            let DateValue::Parsed(date) = parse_date(&crate::models::RawCell::text(p.date)) else {
                dropped += 1;
                return None;
            };
            let account = p.account.trim();
            Some(PortfolioPosition {
                date,
                account: if account.is_empty() { UNKNOWN_SUB_LABEL.to_string() } else { account.to_string() },
                category: lookup(&p.category).unwrap_or(CategoryId::FALLBACK),
                asset_class: p.asset_class.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| DEFAULT_ASSET_CLASS.to_string()),
                currency: p.currency.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                value: p.value,
            })
        })
        .collect();
    if dropped > 0 {
        tracing::warn!(dropped, "legacy positions with unreadable dates were dropped");
    }
    positions
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Owns the normalized dataset. Every write goes through `replace_all` or
/// `clear`; readers get `Arc<StoreSnapshot>` values.
pub struct DataStore {
    storage: Box<dyn Storage + Send>,
    tx: watch::Sender<Arc<StoreSnapshot>>,
    last_import: Option<ImportInfo>,
}

impl DataStore {
    /// Restores the persisted dataset, migrating the legacy key once.
    /// Unreadable data is logged and treated as empty.
    pub fn open(mut storage: Box<dyn Storage + Send>) -> Self {
        let positions = match load_positions(storage.as_mut()) {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!(error = %e, "could not restore saved positions");
                Vec::new()
            }
        };
        let last_import = match storage.get_item(LAST_IMPORT_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read last import");
                None
            }
        };
        tracing::debug!(positions = positions.len(), "store opened");
        let (tx, _rx) = watch::channel(Arc::new(StoreSnapshot::build(positions)));
        Self {
            storage,
            tx,
            last_import,
        }
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.tx.subscribe()
    }

    pub fn last_import(&self) -> Option<&ImportInfo> {
        self.last_import.as_ref()
    }

    /// Swaps in a new dataset and its aggregate in one step, then persists.
    pub fn replace_all(&mut self, positions: Vec<PortfolioPosition>, import: Option<ImportInfo>) -> Arc<StoreSnapshot> {
        let snapshot = Arc::new(StoreSnapshot::build(positions));
        self.tx.send_replace(snapshot.clone());
        tracing::info!(positions = snapshot.positions.len(), "dataset replaced");

        if let Err(e) = self.persist_positions(&snapshot.positions) {
            tracing::warn!(error = %e, "failed to persist positions");
        }
        if let Some(info) = import {
            if let Err(e) = self.persist_import(&info) {
                tracing::warn!(error = %e, "failed to persist import metadata");
            }
            self.last_import = Some(info);
        }
        snapshot
    }

    pub fn clear(&mut self) {
        self.tx.send_replace(Arc::new(StoreSnapshot::default()));
        self.last_import = None;
        for key in [POSITIONS_KEY, LAST_IMPORT_KEY] {
            if let Err(e) = self.storage.remove_item(key) {
                tracing::warn!(error = %e, key, "failed to clear persisted data");
            }
        }
        tracing::info!("dataset cleared");
    }

    fn persist_positions(&mut self, positions: &[PortfolioPosition]) -> Result<()> {
        let json = serde_json::to_string(positions)?;
        self.storage.set_item(POSITIONS_KEY, &json)
    }

    fn persist_import(&mut self, info: &ImportInfo) -> Result<()> {
        let json = serde_json::to_string(info)?;
        self.storage.set_item(LAST_IMPORT_KEY, &json)
    }
}

fn load_positions(storage: &mut (dyn Storage + Send)) -> Result<Vec<PortfolioPosition>> {
    if let Some(json) = storage.get_item(POSITIONS_KEY)? {
        return Ok(serde_json::from_str(&json)?);
    }
    let Some(json) = storage.get_item(LEGACY_POSITIONS_KEY)? else {
        return Ok(Vec::new());
    };
    let legacy: Vec<LegacyPosition> = serde_json::from_str(&json)?;
    let positions = upgrade(legacy);
    storage.set_item(POSITIONS_KEY, &serde_json::to_string(&positions)?)?;
    storage.remove_item(LEGACY_POSITIONS_KEY)?;
    tracing::info!(positions = positions.len(), "migrated legacy positions");
    Ok(positions)
}
