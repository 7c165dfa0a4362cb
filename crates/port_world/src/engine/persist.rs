//! Persistence: versioned snapshot + ledger files. The engine runs purely
//! in memory; saving and loading are opt-in calls, so a missing store never
//! stalls the tick loop.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;

use super::kernel::{EngineError, WorldEngine};
use super::ledger::{Ledger, LedgerEntry};
use super::market::OracleState;
use super::types::{ActionEnvelope, ActionId, WorldTime, LEDGER_VERSION, SNAPSHOT_VERSION};
use super::world_model::{WorldConfig, WorldModel};

const SNAPSHOT_FILE: &str = "snapshot.json";
const LEDGER_FILE: &str = "ledger.json";

// ============================================================================
// Snapshot
// ============================================================================

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

fn default_ledger_version() -> u32 {
    LEDGER_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u32,
    pub tick: WorldTime,
    pub seed: u64,
    pub config: WorldConfig,
    pub model: WorldModel,
    pub oracle: OracleState,
    pub next_action_id: ActionId,
    pub pending_actions: Vec<ActionEnvelope>,
    pub finished: bool,
    pub ledger_len: usize,
}

impl WorldSnapshot {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let snapshot: Self = read_json_from_path(path.as_ref())?;
        snapshot.validate_version()?;
        Ok(snapshot)
    }

    pub(crate) fn validate_version(&self) -> Result<(), PersistError> {
        if self.version == SNAPSHOT_VERSION {
            Ok(())
        } else {
            Err(PersistError::UnsupportedVersion {
                kind: "snapshot".to_string(),
                version: self.version,
                expected: SNAPSHOT_VERSION,
            })
        }
    }
}

// ============================================================================
// Ledger file
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default = "default_ledger_version")]
    pub version: u32,
    pub entries: Vec<LedgerEntry>,
}

impl LedgerFile {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let ledger: Self = read_json_from_path(path.as_ref())?;
        ledger.validate_version()?;
        Ok(ledger)
    }

    pub(crate) fn validate_version(&self) -> Result<(), PersistError> {
        if self.version == LEDGER_VERSION {
            Ok(())
        } else {
            Err(PersistError::UnsupportedVersion {
                kind: "ledger".to_string(),
                version: self.version,
                expected: LEDGER_VERSION,
            })
        }
    }
}

// ============================================================================
// Engine wiring
// ============================================================================

impl WorldEngine {
    pub fn snapshot(&self) -> WorldSnapshot {
        let (tick, config, seed, model, oracle, pending, next_action_id, ledger, finished) =
            self.parts();
        WorldSnapshot {
            version: SNAPSHOT_VERSION,
            tick,
            seed,
            config: config.clone(),
            model: model.clone(),
            oracle: oracle.clone(),
            next_action_id,
            pending_actions: pending,
            finished,
            ledger_len: ledger.len(),
        }
    }

    pub fn ledger_file(&self) -> LedgerFile {
        LedgerFile {
            version: LEDGER_VERSION,
            entries: self.ledger().entries().to_vec(),
        }
    }

    pub fn from_snapshot(
        snapshot: WorldSnapshot,
        ledger: LedgerFile,
    ) -> Result<Self, PersistError> {
        snapshot.validate_version()?;
        ledger.validate_version()?;
        if snapshot.ledger_len != ledger.entries.len() {
            return Err(PersistError::SnapshotMismatch {
                expected: snapshot.ledger_len,
                actual: ledger.entries.len(),
            });
        }
        WorldEngine::from_parts(
            snapshot.tick,
            snapshot.config.sanitized(),
            snapshot.seed,
            snapshot.model,
            snapshot.oracle,
            VecDeque::from(snapshot.pending_actions),
            snapshot.next_action_id,
            Ledger::restore(ledger.entries),
            snapshot.finished,
        )
        .map_err(PersistError::from)
    }

    pub fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<(), PersistError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.snapshot().save_json(dir.join(SNAPSHOT_FILE))?;
        self.ledger_file().save_json(dir.join(LEDGER_FILE))?;
        Ok(())
    }

    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let dir = dir.as_ref();
        let snapshot = WorldSnapshot::load_json(dir.join(SNAPSHOT_FILE))?;
        let ledger = LedgerFile::load_json(dir.join(LEDGER_FILE))?;
        Self::from_snapshot(snapshot, ledger)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    Io(String),
    Serde(String),
    SnapshotMismatch { expected: usize, actual: usize },
    UnsupportedVersion {
        kind: String,
        version: u32,
        expected: u32,
    },
}

impl From<io::Error> for PersistError {
    fn from(err: io::Error) -> Self {
        PersistError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serde(err.to_string())
    }
}

impl From<EngineError> for PersistError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Serde(message) => PersistError::Serde(message),
            other => PersistError::Serde(format!("{other:?}")),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn write_json_to_path<T: Serialize>(value: &T, path: &Path) -> Result<(), PersistError> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

pub(crate) fn read_json_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
