use crate::model::{Outpoint, Utxo};
use crate::rpc::{RpcApi, SubscriptionId, UtxosChanged};
use kaspa_addresses::Address;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use wallet_common::errors::WalletResult;
use wallet_common::events::{EventEmitter, WalletEvent};

/// `spec.md` §3/§4.2: the UTXO bookkeeping the wallet keeps in memory,
/// split into three collections plus a cross-index and a reservation
/// list. `confirmed` and `pending` are mutually exclusive and both
/// contribute to balance; `used` holds outputs the wallet has already
/// spent in a broadcast transaction but the node hasn't yet stopped
/// reporting, and contributes nothing to balance. `in_use` reserves
/// outpoints mid-build so a second concurrent build can't also select
/// them; per the invariant in `spec.md` §3, every outpoint in `in_use`
/// is also present in `confirmed` or `pending` until `update_used` moves
/// it into `used`.
pub struct UtxoSet {
    confirmed: RwLock<HashMap<Outpoint, Utxo>>,
    pending: RwLock<HashMap<Outpoint, Utxo>>,
    used: RwLock<HashMap<Outpoint, Utxo>>,
    by_address: RwLock<HashMap<Address, HashSet<Outpoint>>>,
    in_use: RwLock<Vec<Outpoint>>,
    current_blue_score: AtomicU64,
    coinbase_maturity: u64,
    suppress_notifications: AtomicBool,
    last_balance_notification: Mutex<Option<(u64, u64)>>,
    emitter: Arc<EventEmitter>,
}

impl UtxoSet {
    pub fn new(coinbase_maturity: u64, emitter: Arc<EventEmitter>) -> Arc<Self> {
        Arc::new(Self {
            confirmed: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
            used: RwLock::new(HashMap::new()),
            by_address: RwLock::new(HashMap::new()),
            in_use: RwLock::new(Vec::new()),
            current_blue_score: AtomicU64::new(0),
            coinbase_maturity,
            suppress_notifications: AtomicBool::new(false),
            last_balance_notification: Mutex::new(None),
            emitter,
        })
    }

    /// `spec.md` §4.4: the wallet suppresses balance notifications while
    /// it is bulk-loading UTXOs during the initial sync, then emits one
    /// summary `ready` event instead.
    pub fn set_suppress_balance_notifications(&self, suppress: bool) {
        self.suppress_notifications.store(suppress, Ordering::SeqCst);
    }

    pub fn current_blue_score(&self) -> u64 {
        self.current_blue_score.load(Ordering::SeqCst)
    }

    /// Records a new tip blue score and reclassifies `pending` coinbase
    /// outputs that have since matured, emitting `blue-score-changed` and
    /// (if the aggregate moved) `balance-update`.
    pub fn set_current_blue_score(&self, blue_score: u64) {
        self.current_blue_score.store(blue_score, Ordering::SeqCst);
        self.emitter
            .emit(WalletEvent::BlueScoreChanged { blue_score });
        self.update_utxo_balance();
    }

    fn is_mature_at(&self, block_blue_score: u64, is_coinbase: bool) -> bool {
        if !is_coinbase {
            return true;
        }
        self.current_blue_score() >= block_blue_score + self.coinbase_maturity
    }

    fn index_address(&self, utxo: &Utxo) {
        let mut by_address = self.by_address.write().unwrap();
        by_address
            .entry(utxo.address.clone())
            .or_default()
            .insert(utxo.outpoint.clone());
    }

    fn unindex_address(&self, address: &Address, outpoint: &Outpoint) {
        let mut by_address = self.by_address.write().unwrap();
        if let Some(set) = by_address.get_mut(address) {
            set.remove(outpoint);
            if set.is_empty() {
                by_address.remove(address);
            }
        }
    }

    /// `add(utxos)`: classifies each output as confirmed or pending based
    /// on maturity at the currently tracked blue score. An output already
    /// parked in `used` is left alone — the wallet already knows it's
    /// spent and a late re-listing from the node shouldn't resurrect it.
    /// Re-adding an outpoint already reserved in `in_use` updates its
    /// fields but never removes the reservation.
    pub fn add(&self, utxos: Vec<Utxo>) {
        for utxo in utxos {
            if self.used.read().unwrap().contains_key(&utxo.outpoint) {
                continue;
            }
            self.index_address(&utxo);
            if self.is_mature_at(utxo.block_blue_score, utxo.is_coinbase) {
                self.pending.write().unwrap().remove(&utxo.outpoint);
                self.confirmed.write().unwrap().insert(utxo.outpoint.clone(), utxo);
            } else {
                self.confirmed.write().unwrap().remove(&utxo.outpoint);
                self.pending.write().unwrap().insert(utxo.outpoint.clone(), utxo);
            }
        }
        self.maybe_emit_balance_update();
    }

    /// `remove(outpoints)`: drops the outpoints from every collection and
    /// the address index, and releases any reservation on them.
    pub fn remove(&self, outpoints: &[Outpoint]) {
        for outpoint in outpoints {
            let removed = self
                .confirmed
                .write()
                .unwrap()
                .remove(outpoint)
                .or_else(|| self.pending.write().unwrap().remove(outpoint))
                .or_else(|| self.used.write().unwrap().remove(outpoint));
            if let Some(utxo) = removed {
                self.unindex_address(&utxo.address, outpoint);
            }
            self.in_use.write().unwrap().retain(|o| o != outpoint);
        }
        self.maybe_emit_balance_update();
    }

    /// `updateUtxoBalance()`: re-evaluates maturity for every tracked
    /// output against the current blue score, migrating between
    /// `confirmed` and `pending` as needed.
    pub fn update_utxo_balance(&self) {
        let entries: Vec<Utxo> = {
            let confirmed = self.confirmed.read().unwrap();
            let pending = self.pending.read().unwrap();
            confirmed.values().chain(pending.values()).cloned().collect()
        };
        for utxo in entries {
            if self.is_mature_at(utxo.block_blue_score, utxo.is_coinbase) {
                self.pending.write().unwrap().remove(&utxo.outpoint);
                self.confirmed.write().unwrap().insert(utxo.outpoint.clone(), utxo);
            } else {
                self.confirmed.write().unwrap().remove(&utxo.outpoint);
                self.pending.write().unwrap().insert(utxo.outpoint.clone(), utxo);
            }
        }
        self.maybe_emit_balance_update();
    }

    fn sorted_candidates(&self) -> Vec<Utxo> {
        let confirmed = self.confirmed.read().unwrap();
        let in_use = self.in_use.read().unwrap();
        let mut candidates: Vec<Utxo> = confirmed
            .values()
            .filter(|utxo| !in_use.contains(&utxo.outpoint))
            .cloned()
            .collect();
        candidates.sort_by_key(|utxo| (Reverse(utxo.satoshis), utxo.outpoint.to_string()));
        candidates
    }

    /// `selectUtxos(target)`: greedy largest-first selection of confirmed,
    /// unreserved outputs until their sum covers `target`. Ties between
    /// equal amounts break on the outpoint string so selection is
    /// deterministic.
    pub fn select_utxos(&self, target: u64) -> WalletResult<(Vec<Utxo>, u64)> {
        let mut total = 0u64;
        let mut selected = Vec::new();
        for utxo in self.sorted_candidates() {
            if total >= target {
                break;
            }
            total += utxo.satoshis;
            selected.push(utxo);
        }
        if total < target {
            return Err(wallet_common::errors::WalletError::user_input(format!(
                "insufficient funds: need {target} sompi, have {total} sompi available"
            )));
        }
        Ok((selected, total))
    }

    /// `collectUtxos(maxCount)`: same ordering as `select_utxos` but bounded
    /// by a count instead of a target amount, used by maintenance sweeps
    /// that consolidate dust.
    pub fn collect_utxos(&self, max_count: usize) -> (Vec<Utxo>, u64) {
        let selected: Vec<Utxo> = self.sorted_candidates().into_iter().take(max_count).collect();
        let total = selected.iter().map(|u| u.satoshis).sum();
        (selected, total)
    }

    /// `updateUsed(utxos)`: called by `TxBuilder::submit_transaction` after
    /// a successful broadcast. Moves the spent inputs out of
    /// `confirmed`/`pending` into `used` and reserves their outpoints in
    /// `in_use` until the node's subscription reports them removed.
    pub fn update_used(&self, utxos: &[Utxo]) {
        for utxo in utxos {
            self.confirmed.write().unwrap().remove(&utxo.outpoint);
            self.pending.write().unwrap().remove(&utxo.outpoint);
            self.used.write().unwrap().insert(utxo.outpoint.clone(), utxo.clone());
            let mut in_use = self.in_use.write().unwrap();
            if !in_use.contains(&utxo.outpoint) {
                in_use.push(utxo.outpoint.clone());
            }
        }
        self.maybe_emit_balance_update();
    }

    /// `clearUsed()`: empties the `used` collection and the `in_use` list.
    pub fn clear_used(&self) {
        self.used.write().unwrap().clear();
        self.in_use.write().unwrap().clear();
    }

    /// `clearMissing(valid)`: drops any `confirmed`/`pending` entry whose
    /// outpoint is absent from a freshly authoritative listing, e.g. after
    /// a reconnect. Never touches `used`/`in_use` — those reflect
    /// wallet-local knowledge the node hasn't caught up to yet.
    pub fn clear_missing(&self, valid: &HashSet<Outpoint>) {
        let stale: Vec<Outpoint> = {
            let confirmed = self.confirmed.read().unwrap();
            let pending = self.pending.read().unwrap();
            confirmed
                .keys()
                .chain(pending.keys())
                .filter(|outpoint| !valid.contains(*outpoint))
                .cloned()
                .collect()
        };
        for outpoint in &stale {
            let removed = self
                .confirmed
                .write()
                .unwrap()
                .remove(outpoint)
                .or_else(|| self.pending.write().unwrap().remove(outpoint));
            if let Some(utxo) = removed {
                self.unindex_address(&utxo.address, outpoint);
            }
        }
        self.maybe_emit_balance_update();
    }

    /// `utxoSubscribe()`: asks the RPC layer to stream added/removed sets
    /// for every address this wallet tracks, applying additions before
    /// removals per notification so a same-message add+remove nets out to
    /// a removal.
    pub async fn utxo_subscribe(
        self: &Arc<Self>,
        rpc: &dyn RpcApi,
        addresses: &[Address],
    ) -> WalletResult<SubscriptionId> {
        let this = Arc::clone(self);
        rpc.subscribe_utxos_changed(
            addresses,
            Box::new(move |change: UtxosChanged| {
                this.apply_utxo_notification(change);
            }),
        )
        .await
    }

    /// `spec.md` §4.2/§5: additions then removals are applied atomically —
    /// no balance-update is observable in between — and the pair emits at
    /// most one `balance-update` for its net effect (§8 scenario 6: a
    /// same-message add+remove of the same outpoint must emit none at
    /// all). Suppresses the per-call emissions `add`/`remove` would
    /// otherwise each fire and emits once, after both, against the
    /// pre-notification baseline. If notifications were already
    /// suppressed by an enclosing batch (e.g. initial sync), that batch
    /// owns the eventual emission and this call leaves suppression in
    /// place.
    fn apply_utxo_notification(&self, change: UtxosChanged) {
        let already_suppressed = self.suppress_notifications.swap(true, Ordering::SeqCst);
        self.add(change.added);
        self.remove(&change.removed);
        if !already_suppressed {
            self.suppress_notifications.store(false, Ordering::SeqCst);
            self.maybe_emit_balance_update();
        }
    }

    /// `(confirmedBalance, pendingBalance)` — the two numbers `Wallet`
    /// reports on `ready`/`balance-update` (`spec.md` §4.4).
    pub fn balances(&self) -> (u64, u64) {
        let confirmed: u64 = self.confirmed.read().unwrap().values().map(|u| u.satoshis).sum();
        let pending: u64 = self.pending.read().unwrap().values().map(|u| u.satoshis).sum();
        (confirmed, pending)
    }

    pub fn confirmed_utxos_count(&self) -> usize {
        self.confirmed.read().unwrap().len()
    }

    fn maybe_emit_balance_update(&self) {
        if self.suppress_notifications.load(Ordering::SeqCst) {
            return;
        }
        let (confirmed, pending) = self.balances();
        let mut last = self.last_balance_notification.lock().unwrap();
        if *last != Some((confirmed, pending)) {
            *last = Some((confirmed, pending));
            self.emitter.emit(WalletEvent::BalanceUpdate {
                confirmed,
                pending,
                total: confirmed + pending,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_addresses::{Address, Prefix, Version};
    use kaspa_consensus_core::tx::ScriptPublicKey;
    use kaspa_hashes::Hash;

    fn test_address(byte: u8) -> Address {
        Address::new(Prefix::Mainnet, Version::PubKey, &[byte; 32])
    }

    fn test_utxo(byte: u8, index: u32, satoshis: u64, blue_score: u64, is_coinbase: bool) -> Utxo {
        Utxo {
            outpoint: Outpoint::new(Hash::from_bytes([byte; 32]), index),
            address: test_address(byte),
            satoshis,
            script_pub_key: ScriptPublicKey::from_vec(0, vec![]),
            block_blue_score: blue_score,
            is_coinbase,
        }
    }

    #[test]
    fn add_classifies_by_maturity() {
        let set = UtxoSet::new(100, EventEmitter::new());
        set.set_current_blue_score(50);
        set.add(vec![
            test_utxo(1, 0, 1_000, 0, false),
            test_utxo(2, 0, 2_000, 0, true),
        ]);
        assert_eq!(set.confirmed.read().unwrap().len(), 1);
        assert_eq!(set.pending.read().unwrap().len(), 1);
    }

    #[test]
    fn update_utxo_balance_promotes_matured_coinbase() {
        let set = UtxoSet::new(100, EventEmitter::new());
        set.set_current_blue_score(50);
        set.add(vec![test_utxo(3, 0, 5_000, 0, true)]);
        assert_eq!(set.pending.read().unwrap().len(), 1);
        set.set_current_blue_score(150);
        assert_eq!(set.confirmed.read().unwrap().len(), 1);
        assert!(set.pending.read().unwrap().is_empty());
    }

    #[test]
    fn select_utxos_picks_largest_first_and_rejects_insufficient() {
        let set = UtxoSet::new(100, EventEmitter::new());
        set.set_current_blue_score(1_000);
        set.add(vec![
            test_utxo(1, 0, 1_000, 0, false),
            test_utxo(2, 0, 5_000, 0, false),
            test_utxo(3, 0, 2_000, 0, false),
        ]);
        let (selected, total) = set.select_utxos(6_000).unwrap();
        assert_eq!(total, 7_000);
        assert_eq!(selected[0].satoshis, 5_000);

        assert!(set.select_utxos(100_000).is_err());
    }

    #[test]
    fn update_used_moves_to_used_and_reserves_in_use() {
        let set = UtxoSet::new(100, EventEmitter::new());
        set.set_current_blue_score(1_000);
        let utxo = test_utxo(1, 0, 1_000, 0, false);
        set.add(vec![utxo.clone()]);
        set.update_used(&[utxo.clone()]);

        assert!(set.confirmed.read().unwrap().is_empty());
        assert_eq!(set.used.read().unwrap().len(), 1);
        assert!(set.in_use.read().unwrap().contains(&utxo.outpoint));
        assert_eq!(set.balances(), (0, 0));

        set.clear_used();
        assert!(set.used.read().unwrap().is_empty());
        assert!(set.in_use.read().unwrap().is_empty());
    }

    #[test]
    fn clear_missing_drops_stale_outpoints_only() {
        let set = UtxoSet::new(100, EventEmitter::new());
        set.set_current_blue_score(1_000);
        let stays = test_utxo(1, 0, 1_000, 0, false);
        let goes = test_utxo(2, 0, 2_000, 0, false);
        set.add(vec![stays.clone(), goes.clone()]);

        let valid: HashSet<Outpoint> = [stays.outpoint.clone()].into_iter().collect();
        set.clear_missing(&valid);

        assert_eq!(set.confirmed.read().unwrap().len(), 1);
        assert!(set.confirmed.read().unwrap().contains_key(&stays.outpoint));
    }

    #[test]
    fn same_message_add_and_remove_of_one_outpoint_emits_no_balance_update() {
        let set = UtxoSet::new(100, EventEmitter::new());
        set.set_current_blue_score(1_000);

        let emitted = Arc::new(AtomicU64::new(0));
        let emitted_clone = Arc::clone(&emitted);
        set.emitter.subscribe(Box::new(move |event| {
            if matches!(event, WalletEvent::BalanceUpdate { .. }) {
                emitted_clone.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let utxo = test_utxo(1, 0, 1_000, 0, false);
        set.apply_utxo_notification(UtxosChanged {
            added: vec![utxo.clone()],
            removed: vec![utxo.outpoint.clone()],
        });

        assert_eq!(emitted.load(Ordering::SeqCst), 0);
        assert_eq!(set.balances(), (0, 0));
        assert!(set.confirmed.read().unwrap().is_empty());
    }
}
