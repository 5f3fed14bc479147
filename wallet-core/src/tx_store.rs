use crate::model::WireTransaction;
use kaspa_addresses::Address;
use kaspa_hashes::Hash as TransactionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use wallet_common::errors::{ResultExt, WalletResult};
use wallet_common::events::{EventEmitter, WalletEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// `spec.md` §4.5: one record per transaction this wallet either
/// originated or observed. `tx` keeps the wire form so a record can be
/// re-broadcast or inspected without re-deriving it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxRecord {
    pub direction: Direction,
    pub timestamp: u64,
    pub txid: String,
    pub amount: u64,
    pub counterparty_address: Option<Address>,
    pub note: Option<String>,
    pub blue_score: u64,
    pub tx: WireTransaction,
    pub self_transfer: bool,
}

/// Append-only log of transactions relevant to this wallet, keyed by
/// txid (`spec.md` §4.5). In-memory state is a simple ordered map;
/// durability comes from appending each new record as one line of JSON
/// to `path`, replayed in full by `restore()`.
pub struct TxStore {
    path: PathBuf,
    entries: Mutex<HashMap<TransactionId, TxRecord>>,
    emitter: Arc<EventEmitter>,
}

impl TxStore {
    pub fn new(path: impl Into<PathBuf>, emitter: Arc<EventEmitter>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashMap::new()),
            emitter,
        }
    }

    /// Loads every persisted record into memory and re-emits each one as
    /// `state-update`, matching `spec.md` §4.5's "entries are loaded and
    /// re-emitted via emitTxs" on `restore()`. A missing file means a
    /// fresh wallet and is not an error.
    pub fn restore(&self) -> WalletResult<()> {
        if !Path::new(&self.path).exists() {
            return Ok(());
        }
        let file = File::open(&self.path).to_internal_server_error()?;
        let reader = BufReader::new(file);
        let mut entries = self.entries.lock().unwrap();
        for line in reader.lines() {
            let line = line.to_internal_server_error()?;
            if line.trim().is_empty() {
                continue;
            }
            let record: TxRecord = serde_json::from_str(&line).to_internal_server_error()?;
            let txid: TransactionId = record.txid.parse().to_internal_server_error()?;
            entries.insert(txid, record.clone());
            self.emitter.emit(WalletEvent::StateUpdate {
                message: format!("restored transaction {}", record.txid),
            });
        }
        Ok(())
    }

    /// Appends a new record both to the in-memory map and to the
    /// on-disk log. `timestamp`/`blue_score` are supplied by the caller
    /// (`Wallet`) since this module has no clock or chain-tip access of
    /// its own.
    pub fn append(&self, record: TxRecord) -> WalletResult<()> {
        let txid: TransactionId = record.txid.parse().to_internal_server_error()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).to_internal_server_error()?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .to_internal_server_error()?;
        let line = serde_json::to_string(&record).to_internal_server_error()?;
        writeln!(file, "{line}").to_internal_server_error()?;

        self.entries.lock().unwrap().insert(txid, record);
        Ok(())
    }

    pub fn get(&self, txid: &TransactionId) -> Option<TxRecord> {
        self.entries.lock().unwrap().get(txid).cloned()
    }

    pub fn all(&self) -> Vec<TxRecord> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    /// Explicit user-triggered pruning (`spec.md` §3: "pruned only by
    /// explicit user action"). Rewrites the on-disk log with the
    /// surviving entries.
    pub fn prune(&self, txid: &TransactionId) -> WalletResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(txid);
        let file = File::create(&self.path).to_internal_server_error()?;
        let mut writer = std::io::BufWriter::new(file);
        for record in entries.values() {
            let line = serde_json::to_string(record).to_internal_server_error()?;
            writeln!(writer, "{line}").to_internal_server_error()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{native_subnetwork_id, zero_payload_hash};
    use kaspa_hashes::Hash;
    use tempfile::tempdir;

    fn sample_record(txid: Hash) -> TxRecord {
        TxRecord {
            direction: Direction::Out,
            timestamp: 1,
            txid: txid.to_string(),
            amount: 1_000,
            counterparty_address: None,
            note: None,
            blue_score: 42,
            tx: WireTransaction {
                version: 0,
                inputs: vec![],
                outputs: vec![],
                lock_time: 0,
                subnetwork_id: native_subnetwork_id(),
                payload_hash: zero_payload_hash(),
                fee: 0,
            },
            self_transfer: false,
        }
    }

    #[test]
    fn append_then_restore_recovers_all_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txs.jsonl");
        let emitter = EventEmitter::new();

        {
            let store = TxStore::new(&path, emitter.clone());
            store.append(sample_record(Hash::from_bytes([1; 32]))).unwrap();
            store.append(sample_record(Hash::from_bytes([2; 32]))).unwrap();
        }

        let restored = TxStore::new(&path, emitter);
        restored.restore().unwrap();
        assert_eq!(restored.all().len(), 2);
    }

    #[test]
    fn prune_removes_entry_from_disk_and_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txs.jsonl");
        let store = TxStore::new(&path, EventEmitter::new());
        let txid = Hash::from_bytes([3; 32]);
        store.append(sample_record(txid)).unwrap();
        store.prune(&txid).unwrap();

        assert!(store.get(&txid).is_none());

        let reloaded = TxStore::new(&path, EventEmitter::new());
        reloaded.restore().unwrap();
        assert!(reloaded.all().is_empty());
    }
}
