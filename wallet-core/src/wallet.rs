use crate::address_manager::AddressManager;
use crate::derivation::{derive_address, DerivationRoot};
use crate::model::AddressKind;
use crate::rpc::RpcApi;
use crate::tx_builder::{CompoundParams, SendParams, TxBuilder};
use crate::tx_store::TxStore;
use crate::utxo_set::UtxoSet;
use kaspa_addresses::Address;
use kaspa_bip32::{Language, Mnemonic};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use wallet_common::encrypted_mnemonic::{decrypt_string, encrypt_string, Ciphertext};
use wallet_common::errors::{ResultExt, WalletError, WalletResult};
use wallet_common::events::{EventEmitter, WalletEvent};
use wallet_common::network::NetworkId;

/// `spec.md` §4.4: "Disconnected → Connected → Syncing → Steady." `Connected`
/// is transient in practice — `sync()` is invoked immediately after a
/// connect — but is kept as its own state since a caller can observe it
/// between the connect callback firing and `sync()` starting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletState {
    Disconnected,
    Connected,
    Syncing,
    Steady,
}

/// The default address-discovery gap limit (`spec.md` §4.4): how many
/// consecutive unused indices are scanned before a chain is considered
/// exhausted.
pub const DEFAULT_GAP_LIMIT: u32 = 64;

/// `spec.md` §6: "Persisted state (seed export): JSON `{ privKey,
/// seedPhrase }`."
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedExportPayload {
    priv_key: String,
    seed_phrase: String,
}

/// The component named in `spec.md` §4.4: "Owns all above; drives sync
/// phases; bridges RPC events to UTXO/balance updates; exposes the public
/// API." Everything it coordinates — `AddressManager`, `UtxoSet`,
/// `TxBuilder`, `TxStore` — already enforces its own invariants, so this
/// type is mostly sequencing and event emission.
pub struct Wallet {
    network: NetworkId,
    address_manager: Arc<AddressManager>,
    utxo_set: Arc<UtxoSet>,
    tx_store: Arc<TxStore>,
    tx_builder: TxBuilder,
    rpc: Arc<dyn RpcApi>,
    emitter: Arc<EventEmitter>,
    derivation_root: Mutex<Option<DerivationRoot>>,
    state: Mutex<WalletState>,
    gap_limit: u32,
    is_connected: AtomicBool,
    connected_notify: Notify,
    sync_in_progress: AtomicBool,
    continuous_sync_active: AtomicBool,
}

impl Wallet {
    /// Constructs the wallet and wires the RPC lifecycle callbacks
    /// (`spec.md` §4.4: `rpc.onConnect` / `rpc.onDisconnect`). Also
    /// schedules the deferred `TxStore.restore()` the spec calls for "on
    /// construction" — run on the ambient Tokio runtime rather than
    /// inline, so a slow or large log doesn't block wallet construction.
    pub fn new(
        network: NetworkId,
        address_manager: Arc<AddressManager>,
        utxo_set: Arc<UtxoSet>,
        tx_store: Arc<TxStore>,
        rpc: Arc<dyn RpcApi>,
        emitter: Arc<EventEmitter>,
        gap_limit: u32,
        default_fee_per_byte: u64,
    ) -> Arc<Self> {
        let tx_builder = TxBuilder::new(
            network,
            Arc::clone(&address_manager),
            Arc::clone(&utxo_set),
            Arc::clone(&tx_store),
            Arc::clone(&rpc),
            Arc::clone(&emitter),
            default_fee_per_byte,
        );

        let wallet = Arc::new_cyclic(|weak: &Weak<Wallet>| {
            let on_connect_weak = weak.clone();
            let on_disconnect_weak = weak.clone();
            rpc.on_connect(Box::new(move || {
                if let Some(wallet) = on_connect_weak.upgrade() {
                    wallet.handle_connect();
                }
            }));
            rpc.on_disconnect(Box::new(move || {
                if let Some(wallet) = on_disconnect_weak.upgrade() {
                    wallet.handle_disconnect();
                }
            }));

            Wallet {
                network,
                address_manager,
                utxo_set,
                tx_store,
                tx_builder,
                rpc,
                emitter,
                derivation_root: Mutex::new(None),
                state: Mutex::new(WalletState::Disconnected),
                gap_limit,
                is_connected: AtomicBool::new(false),
                connected_notify: Notify::new(),
                sync_in_progress: AtomicBool::new(false),
                continuous_sync_active: AtomicBool::new(false),
            }
        });

        let deferred = Arc::clone(&wallet);
        tokio::spawn(async move {
            if let Err(err) = deferred.tx_store.restore() {
                log::error!("failed to restore transaction store: {err}");
            }
        });

        wallet
    }

    pub fn state(&self) -> WalletState {
        *self.state.lock().unwrap()
    }

    /// Unlocks signing for this session by decrypting the mnemonic
    /// elsewhere and handing the resulting root in. The root is held only
    /// in memory (`spec.md` §5: "never leaves it in plaintext").
    pub fn unlock(&self, mnemonic: &Mnemonic) -> WalletResult<()> {
        let root = DerivationRoot::from_mnemonic(mnemonic)?;
        *self.derivation_root.lock().unwrap() = Some(root);
        Ok(())
    }

    pub fn lock(&self) {
        *self.derivation_root.lock().unwrap() = None;
    }

    fn with_root<T>(&self, f: impl FnOnce(&DerivationRoot) -> WalletResult<T>) -> WalletResult<T> {
        let guard = self.derivation_root.lock().unwrap();
        let root = guard
            .as_ref()
            .ok_or_else(|| WalletError::user_input("wallet is locked"))?;
        f(root)
    }

    /// `spec.md` §6's seed export: `{privKey, seedPhrase}` encrypted with a
    /// caller-supplied password, same construction `common::encrypted_mnemonic`
    /// already uses for the at-rest mnemonic.
    pub fn export(&self, password: &str) -> WalletResult<String> {
        let payload = self.with_root(|root| {
            Ok(SeedExportPayload {
                priv_key: root.master_private_key.to_string(None),
                seed_phrase: root.seed_phrase.clone(),
            })
        })?;
        let json = serde_json::to_string(&payload).to_internal_server_error()?;
        let ciphertext = encrypt_string(&json, password)?;
        serde_json::to_string(&ciphertext).to_internal_server_error()
    }

    /// The other half of scenario 5's round trip: decrypts an export blob
    /// and unlocks the wallet against the recovered mnemonic.
    pub fn import(&self, export_blob: &str, password: &str) -> WalletResult<()> {
        let ciphertext: Ciphertext = serde_json::from_str(export_blob).to_user_input_error()?;
        let json = decrypt_string(&ciphertext, password)?;
        let payload: SeedExportPayload = serde_json::from_str(&json).to_internal_server_error()?;
        let mnemonic = Mnemonic::new(payload.seed_phrase, Language::English).to_user_input_error()?;
        self.unlock(&mnemonic)
    }

    fn handle_connect(self: Arc<Self>) {
        self.is_connected.store(true, Ordering::SeqCst);
        self.connected_notify.notify_waiters();
        *self.state.lock().unwrap() = WalletState::Connected;
        self.emitter.emit(WalletEvent::ApiConnect);

        if self.continuous_sync_active.swap(false, Ordering::SeqCst) {
            let wallet = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = wallet.sync(false).await {
                    log::error!("automatic resync after reconnect failed: {err}");
                }
            });
        }
    }

    fn handle_disconnect(self: Arc<Self>) {
        self.is_connected.store(false, Ordering::SeqCst);
        *self.state.lock().unwrap() = WalletState::Disconnected;
        self.emitter.emit(WalletEvent::ApiDisconnect);
    }

    async fn await_connect(&self) {
        loop {
            if self.is_connected.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.connected_notify.notified();
            if self.is_connected.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// `sync(syncOnce)` (`spec.md` §4.4). `syncOnce=true` performs a single
    /// pass (discovery plus a one-shot blue-score read) without leaving any
    /// subscriptions active; `syncOnce=false` additionally subscribes to
    /// blue-score changes and UTXO changes, putting the wallet into
    /// continuous `Steady` operation.
    pub async fn sync(self: &Arc<Self>, sync_once: bool) -> WalletResult<()> {
        self.await_connect().await;

        if self.continuous_sync_active.load(Ordering::SeqCst) && sync_once {
            return Err(WalletError::user_input(
                "a continuous sync is already active; cannot start a one-shot sync",
            ));
        }
        if self.sync_in_progress.swap(true, Ordering::SeqCst) {
            return Err(WalletError::user_input("a sync is already in progress"));
        }

        let result = self.run_sync(sync_once).await;
        self.sync_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_sync(self: &Arc<Self>, sync_once: bool) -> WalletResult<()> {
        *self.state.lock().unwrap() = WalletState::Syncing;
        self.emitter.emit(WalletEvent::SyncStart);
        self.utxo_set.set_suppress_balance_notifications(true);

        let sync_result = self.run_sync_body(sync_once).await;

        self.utxo_set.set_suppress_balance_notifications(false);

        match sync_result {
            Ok(()) => {
                *self.state.lock().unwrap() = WalletState::Steady;
                self.emitter.emit(WalletEvent::SyncFinish);

                let (confirmed, pending) = self.utxo_set.balances();
                self.emitter.emit(WalletEvent::Ready {
                    available: confirmed,
                    pending,
                    total: confirmed + pending,
                    confirmed_utxos_count: self.utxo_set.confirmed_utxos_count(),
                });
                self.emitter.emit(WalletEvent::BalanceUpdate {
                    confirmed,
                    pending,
                    total: confirmed + pending,
                });

                for record in self.tx_store.all() {
                    self.emitter.emit(WalletEvent::StateUpdate {
                        message: format!("known transaction {}", record.txid),
                    });
                }

                Ok(())
            }
            Err(err) => {
                // `spec.md` §5 "Failure mode during sync": errors are
                // logged and state is left partially populated, not
                // escalated into an unrecoverable state transition.
                log::error!("sync failed: {err}");
                Err(err)
            }
        }
    }

    async fn run_sync_body(self: &Arc<Self>, sync_once: bool) -> WalletResult<()> {
        let blue_score = self.rpc.get_virtual_selected_parent_blue_score().await?;
        self.utxo_set.set_current_blue_score(blue_score);

        if !sync_once {
            let utxo_set = Arc::clone(&self.utxo_set);
            self.rpc
                .subscribe_virtual_selected_parent_blue_score_changed(Box::new(move |new_score| {
                    utxo_set.set_current_blue_score(new_score);
                }))
                .await?;
        }

        self.discover_addresses().await?;

        if !sync_once {
            let addresses = self.address_manager.all_addresses();
            self.utxo_set.utxo_subscribe(self.rpc.as_ref(), &addresses).await?;
            self.continuous_sync_active.store(true, Ordering::SeqCst);
        }

        Ok(())
    }

    /// `spec.md` §4.4 "Address discovery": scans windows of `gap_limit`
    /// fresh indices per chain, advancing past any window containing
    /// activity, until a window with none is found.
    async fn discover_addresses(&self) -> WalletResult<()> {
        self.discover_chain(AddressKind::Receive).await?;
        self.discover_chain(AddressKind::Change).await?;
        Ok(())
    }

    async fn discover_chain(&self, kind: AddressKind) -> WalletResult<()> {
        let chain_public_key = self.address_manager.chain_public_key(kind).clone();
        let mut offset = 0u32;
        let mut highest_active: Option<u32> = None;

        loop {
            let mut window = Vec::with_capacity(self.gap_limit as usize);
            for index in offset..offset + self.gap_limit {
                let (address, _) = derive_address(&chain_public_key, kind, index, self.network)?;
                window.push((index, address));
            }

            let addresses: Vec<Address> = window.iter().map(|(_, a)| a.clone()).collect();
            let found = self.rpc.get_utxos_by_addresses(&addresses).await?;

            let mut window_highest = None;
            for (index, address) in &window {
                if let Some(utxos) = found.get(address) {
                    if !utxos.is_empty() {
                        window_highest = Some(*index);
                        self.utxo_set.add(utxos.clone());
                    }
                }
            }

            match window_highest {
                Some(index) => {
                    highest_active = Some(index);
                    offset = index + 1;
                }
                None => break,
            }
        }

        if let Some(index) = highest_active {
            self.address_manager.advance(kind, index + 1)?;
        }
        Ok(())
    }

    /// `spec.md` §4.3's `submitTransaction`, invoked with the wallet's own
    /// unlocked signing root and a fresh blue-score snapshot for the
    /// `TxStore` record.
    pub async fn send(&self, params: SendParams, timestamp: u64) -> WalletResult<Option<String>> {
        let blue_score = self.utxo_set.current_blue_score();
        let root = self.locked_root()?;
        self.tx_builder.submit_transaction(&root, &params, blue_score, timestamp).await
    }

    /// The compounding counterpart to `send` (`spec.md` §8 scenario 7).
    pub async fn compound(&self, params: CompoundParams, timestamp: u64) -> WalletResult<Option<String>> {
        let blue_score = self.utxo_set.current_blue_score();
        let root = self.locked_root()?;
        self.tx_builder.submit_compound(&root, &params, blue_score, timestamp).await
    }

    fn locked_root(&self) -> WalletResult<DerivationRoot> {
        self.derivation_root
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| WalletError::user_input("wallet is locked"))
    }

    pub fn is_our(&self, address: &Address) -> bool {
        self.address_manager.is_our(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Utxo;
    use crate::rpc::UtxosChanged;
    use async_trait::async_trait;
    use kaspa_addresses::Address as KaspaAddress;
    use kaspa_bip32::WordCount;
    use kaspa_consensus_core::tx::ScriptPublicKey;
    use kaspa_hashes::Hash as BlockHash;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex as StdMutex;

    struct FakeRpc {
        blue_score: AtomicU64,
        utxos_by_address: StdMutex<HashMap<KaspaAddress, Vec<Utxo>>>,
        on_connect: StdMutex<Vec<Box<dyn Fn() + Send + Sync>>>,
    }

    impl FakeRpc {
        fn new() -> Self {
            Self {
                blue_score: AtomicU64::new(500),
                utxos_by_address: StdMutex::new(HashMap::new()),
                on_connect: StdMutex::new(Vec::new()),
            }
        }

        fn fire_connect(&self) {
            for cb in self.on_connect.lock().unwrap().iter() {
                cb();
            }
        }
    }

    #[async_trait]
    impl RpcApi for FakeRpc {
        async fn connect(&self) -> WalletResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> WalletResult<()> {
            Ok(())
        }
        fn on_connect(&self, callback: Box<dyn Fn() + Send + Sync>) {
            self.on_connect.lock().unwrap().push(callback);
        }
        fn on_disconnect(&self, _callback: Box<dyn Fn() + Send + Sync>) {}
        async fn get_block(&self, _hash: BlockHash) -> WalletResult<Vec<u8>> {
            Ok(vec![])
        }
        async fn get_utxos_by_addresses(
            &self,
            addresses: &[Address],
        ) -> WalletResult<HashMap<Address, Vec<Utxo>>> {
            let map = self.utxos_by_address.lock().unwrap();
            Ok(addresses
                .iter()
                .filter_map(|a| map.get(a).map(|u| (a.clone(), u.clone())))
                .collect())
        }
        async fn submit_transaction(
            &self,
            _transaction: crate::model::WireTransaction,
        ) -> WalletResult<Option<String>> {
            Ok(None)
        }
        async fn get_virtual_selected_parent_blue_score(&self) -> WalletResult<u64> {
            Ok(self.blue_score.load(Ordering::SeqCst))
        }
        async fn subscribe_block_added(
            &self,
            _callback: Box<dyn Fn(BlockHash) + Send + Sync>,
        ) -> WalletResult<crate::rpc::SubscriptionId> {
            Ok(crate::rpc::SubscriptionId::next())
        }
        async fn subscribe_virtual_selected_parent_blue_score_changed(
            &self,
            _callback: Box<dyn Fn(u64) + Send + Sync>,
        ) -> WalletResult<crate::rpc::SubscriptionId> {
            Ok(crate::rpc::SubscriptionId::next())
        }
        async fn subscribe_utxos_changed(
            &self,
            _addresses: &[Address],
            _callback: Box<dyn Fn(UtxosChanged) + Send + Sync>,
        ) -> WalletResult<crate::rpc::SubscriptionId> {
            Ok(crate::rpc::SubscriptionId::next())
        }
        async fn subscribe_chain_changed(
            &self,
            _callback: Box<dyn Fn() + Send + Sync>,
        ) -> WalletResult<crate::rpc::SubscriptionId> {
            Ok(crate::rpc::SubscriptionId::next())
        }
        async fn unsubscribe(&self, _subscription: crate::rpc::SubscriptionId) -> WalletResult<()> {
            Ok(())
        }
    }

    fn test_wallet(rpc: Arc<FakeRpc>) -> (Arc<Wallet>, DerivationRoot) {
        let mnemonic = Mnemonic::random(WordCount::Words24, Language::English).unwrap();
        let root = DerivationRoot::from_mnemonic(&mnemonic).unwrap();
        let emitter = EventEmitter::new();
        let receive = root.chain_public_key(AddressKind::Receive).unwrap();
        let change = root.chain_public_key(AddressKind::Change).unwrap();
        let address_manager = Arc::new(AddressManager::new(NetworkId::Mainnet, receive, change, emitter.clone()));
        let utxo_set = UtxoSet::new(100, emitter.clone());
        let tx_store = Arc::new(TxStore::new(
            std::env::temp_dir().join(format!("wallet-test-{}.jsonl", std::process::id())),
            emitter.clone(),
        ));
        let wallet = Wallet::new(
            NetworkId::Mainnet,
            address_manager,
            utxo_set,
            tx_store,
            rpc,
            emitter,
            5,
            1,
        );
        (wallet, root)
    }

    #[tokio::test]
    async fn sync_once_discovers_active_addresses_within_the_gap_window() {
        let rpc = Arc::new(FakeRpc::new());
        let (wallet, root) = test_wallet(rpc.clone());
        wallet.unlock(&Mnemonic::new(root.seed_phrase.clone(), Language::English).unwrap()).unwrap();

        let receive_pub = root.chain_public_key(AddressKind::Receive).unwrap();
        let (active_address, _) = derive_address(&receive_pub, AddressKind::Receive, 3, NetworkId::Mainnet).unwrap();
        rpc.utxos_by_address.lock().unwrap().insert(
            active_address.clone(),
            vec![Utxo {
                outpoint: crate::model::Outpoint::new(BlockHash::from_bytes([7u8; 32]), 0),
                address: active_address,
                satoshis: 1_000,
                script_pub_key: ScriptPublicKey::from_vec(0, vec![]),
                block_blue_score: 0,
                is_coinbase: false,
            }],
        );

        rpc.fire_connect();
        wallet.sync(true).await.unwrap();

        assert_eq!(wallet.address_manager.counter(AddressKind::Receive), 4);
        assert_eq!(wallet.address_manager.counter(AddressKind::Change), 0);
    }

    #[tokio::test]
    async fn export_then_import_round_trips_the_same_seed() {
        let rpc = Arc::new(FakeRpc::new());
        let (wallet, root) = test_wallet(rpc);
        wallet.unlock(&Mnemonic::new(root.seed_phrase.clone(), Language::English).unwrap()).unwrap();

        let exported = wallet.export("hunter2").unwrap();
        wallet.lock();
        wallet.import(&exported, "hunter2").unwrap();
        let reexported = wallet.export("hunter2").unwrap();

        // `export` re-randomizes its Argon2 salt and XChaCha20 nonce on
        // every call (`common::encrypted_mnemonic::encrypt_string`), so
        // the ciphertext itself is never byte-identical across calls.
        // Scenario 5 asks for the same seed phrase, private key, and uid
        // after the round trip — decrypt both blobs and compare those.
        let decrypt = |blob: &str| -> SeedExportPayload {
            let ciphertext: Ciphertext = serde_json::from_str(blob).unwrap();
            let json = decrypt_string(&ciphertext, "hunter2").unwrap();
            serde_json::from_str(&json).unwrap()
        };
        let original = decrypt(&exported);
        let recovered = decrypt(&reexported);

        assert_eq!(original.seed_phrase, recovered.seed_phrase);
        assert_eq!(original.priv_key, recovered.priv_key);
        assert_eq!(original.seed_phrase, root.seed_phrase);

        let recovered_mnemonic = Mnemonic::new(recovered.seed_phrase, Language::English).unwrap();
        let recovered_root = DerivationRoot::from_mnemonic(&recovered_mnemonic).unwrap();
        assert_eq!(recovered_root.uid, root.uid);
    }

    #[tokio::test]
    async fn second_one_shot_sync_while_continuous_is_active_is_rejected() {
        let rpc = Arc::new(FakeRpc::new());
        let (wallet, root) = test_wallet(rpc.clone());
        wallet.unlock(&Mnemonic::new(root.seed_phrase.clone(), Language::English).unwrap()).unwrap();

        rpc.fire_connect();
        wallet.sync(false).await.unwrap();

        let err = wallet.sync(true).await.unwrap_err();
        assert!(matches!(err, WalletError::UserInputError(_)));
    }
}
