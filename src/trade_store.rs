use crate::models::PaperTrade;
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Flat JSON history of paper trades, newest first.
///
/// Writes land in `<file>.tmp` and are renamed over the committed file.
/// Snapshots carry a version; a write never replaces a newer snapshot.
#[derive(Clone)]
pub struct TradeStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    next_version: AtomicU64,
    // Last version committed to disk; the lock also serialises writers.
    written: Mutex<u64>,
}

/// Trade history copied out of the session together with its write version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    trades: Vec<PaperTrade>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl TradeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                next_version: AtomicU64::new(0),
                written: Mutex::new(0),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Missing file is an empty history; an unreadable one is logged and
    /// treated the same.
    pub fn load(&self) -> Vec<PaperTrade> {
        let path = self.path();
        if !path.exists() {
            info!("No trade history at {}, starting fresh", path.display());
            return Vec::new();
        }

        match read_trades(path) {
            Ok(trades) => {
                info!("Loaded {} paper trades from {}", trades.len(), path.display());
                trades
            }
            Err(err) => {
                warn!("Ignoring unreadable trade history: {:#}", err);
                Vec::new()
            }
        }
    }

    /// Reserve the next version for `trades`. Take the snapshot while the
    /// state it was copied from is still locked, so versions follow the
    /// order in which the state changed rather than the order of `save` calls.
    pub fn snapshot(&self, trades: Vec<PaperTrade>) -> Snapshot {
        Snapshot {
            version: self.inner.next_version.fetch_add(1, Ordering::SeqCst) + 1,
            trades,
        }
    }

    /// Queue a snapshot for writing on the blocking pool. Failures are logged.
    pub fn save(&self, snapshot: Snapshot) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = inner.commit(snapshot.version, &snapshot.trades) {
                error!("Failed to persist paper trades: {:#}", err);
            }
        })
    }

    /// Write a snapshot on the calling thread.
    pub fn save_now(&self, trades: &[PaperTrade]) -> Result<()> {
        let version = self.inner.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.commit(version, trades)
    }
}

impl StoreInner {
    fn commit(&self, version: u64, trades: &[PaperTrade]) -> Result<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| anyhow::anyhow!("trade store lock poisoned"))?;
        if version <= *written {
            return Ok(());
        }

        write_atomically(&self.path, trades)?;
        *written = version;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomically(path: &Path, trades: &[PaperTrade]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let body = serde_json::to_string_pretty(trades).context("Failed to serialise trades")?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

fn read_trades(path: &Path) -> Result<Vec<PaperTrade>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
