//! Wires the `wallet-core` orchestrator (`Wallet`) to a live node through
//! `kaspad_client::KaspadRpcClient`, the way the reference daemon's own
//! `Daemon::start` wires `AddressManager`/`UtxoManager`/`SyncManager` to its
//! `kaspad_client::connect`. Everything those components did by hand — gap
//! limit discovery, UTXO tracking, sync phases — now lives inside
//! `wallet-core`; this type's job shrinks to loading keys, constructing the
//! wallet, and driving the connect/sync lifecycle.

use crate::args::Args;
use crate::kaspad_client::KaspadRpcClient;
use kaspa_bip32::secp256k1::PublicKey;
use kaspa_bip32::ExtendedPublicKey;
use log::{error, info};
use std::sync::Arc;
use thiserror::Error;
use wallet_common::errors::WalletError;
use wallet_common::events::WalletEvent;
use wallet_common::keys::Keys;
use wallet_core::rpc::RpcApi;
use wallet_core::wallet::Wallet;

pub struct Daemon {
    args: Arc<Args>,
}

#[derive(Error, Debug)]
pub enum DaemonStartError {
    #[error("failed to load keys from {0}: {1}\nrun kaswallet-create or provide a --keys-file flag")]
    FailedToLoadKeys(String, WalletError),
    #[error("failed to connect to kaspad: {0}")]
    FailedToConnectToKaspad(WalletError),
    #[error("failed to unlock wallet: {0}")]
    FailedToUnlock(WalletError),
    #[error("invalid network selection: {0}")]
    InvalidNetworkSelection(WalletError),
}

pub type DaemonStartResult<T> = Result<T, DaemonStartError>;

impl Daemon {
    pub fn new(args: Arc<Args>) -> Self {
        Self { args }
    }

    /// Loads keys, constructs the wallet, connects to the node and runs
    /// continuous sync (`sync_once = false`) until the process is stopped.
    /// Returns once `sync` completes, which for continuous sync only
    /// happens on an unrecoverable error.
    pub async fn start(&self) -> DaemonStartResult<()> {
        let network = self.args.network().map_err(DaemonStartError::InvalidNetworkSelection)?;
        let keys_file_path = self.args.keys_file_path();

        let keys = Keys::load(&keys_file_path)
            .map_err(|e| DaemonStartError::FailedToLoadKeys(keys_file_path.clone(), e))?;
        info!("loaded keys from {keys_file_path}");

        let mnemonic = keys
            .decrypt_mnemonic(&self.args.password)
            .map_err(DaemonStartError::FailedToUnlock)?;

        let receive_chain_public_key: ExtendedPublicKey<PublicKey> = keys.receive_chain_public_key.clone();
        let change_chain_public_key: ExtendedPublicKey<PublicKey> = keys.change_chain_public_key.clone();

        let kaspa_network_id = kaspa_consensus_core::network::NetworkId::new(network.kaspa_network_type());
        let rpc = KaspadRpcClient::connect(&self.args.rpc_server, &kaspa_network_id)
            .map_err(DaemonStartError::FailedToConnectToKaspad)?;
        let rpc: Arc<dyn RpcApi> = Arc::new(rpc);

        // Opened before `Wallet` exists so the coinbase-maturity lookup
        // below has a live connection to read from; `Wallet::new`'s
        // `on_connect` registration still observes this connection (see
        // `KaspadRpcClient::on_connect`'s replay-current-state behavior).
        rpc.connect().await.map_err(DaemonStartError::FailedToConnectToKaspad)?;

        let emitter = wallet_common::events::EventEmitter::new();
        log_events(&emitter);

        let address_manager = Arc::new(wallet_core::address_manager::AddressManager::new(
            network,
            receive_chain_public_key,
            change_chain_public_key,
            Arc::clone(&emitter),
        ));

        let coinbase_maturity = fetch_coinbase_maturity(&rpc, network)
            .await
            .map_err(DaemonStartError::FailedToConnectToKaspad)?;
        let utxo_set = wallet_core::utxo_set::UtxoSet::new(coinbase_maturity, Arc::clone(&emitter));

        let tx_store_path = sibling_path(&keys_file_path, "transactions.jsonl");
        let tx_store = Arc::new(wallet_core::tx_store::TxStore::new(tx_store_path, Arc::clone(&emitter)));

        let wallet = Wallet::new(
            network,
            address_manager,
            utxo_set,
            tx_store,
            Arc::clone(&rpc),
            emitter,
            self.args.gap_limit,
            DEFAULT_FEE_PER_BYTE,
        );

        wallet.unlock(&mnemonic).map_err(DaemonStartError::FailedToUnlock)?;

        if let Err(err) = wallet.sync(false).await {
            error!("wallet sync ended: {err}");
        }

        Ok(())
    }
}

/// Fallback fee-rate (sompi per byte) when `kaspa-wallet-core`'s own fee
/// estimator isn't wired up to a live mempool feed. `TxBuilder` uses this
/// only as the starting point for its iterative mass/fee convergence.
const DEFAULT_FEE_PER_BYTE: u64 = 1;

async fn fetch_coinbase_maturity(
    rpc: &Arc<dyn RpcApi>,
    network: wallet_common::network::NetworkId,
) -> Result<u64, WalletError> {
    let virtual_daa_score = rpc.get_virtual_selected_parent_blue_score().await?;
    let consensus_params = kaspa_consensus_core::config::params::Params::from(network.kaspa_network_type());
    Ok(consensus_params.coinbase_maturity().get(virtual_daa_score))
}

fn sibling_path(keys_file_path: &str, filename: &str) -> std::path::PathBuf {
    let parent = std::path::Path::new(keys_file_path)
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    parent.join(filename)
}

/// Logs every `WalletEvent` at the level the reference daemon's own
/// `SyncManager`/`UtxoManager` logging used for the equivalent state
/// transitions, since this crate has no RPC surface of its own to expose
/// them through (`spec.md` §9's bus is in-process only at this layer).
fn log_events(emitter: &Arc<wallet_common::events::EventEmitter>) {
    emitter.subscribe(Box::new(|event| match event {
        WalletEvent::ApiConnect => info!("connected to kaspad"),
        WalletEvent::ApiDisconnect => info!("disconnected from kaspad"),
        WalletEvent::SyncStart => info!("sync started"),
        WalletEvent::SyncFinish => info!("sync finished"),
        WalletEvent::Ready { available, pending, total, confirmed_utxos_count } => {
            info!("wallet ready: available={available} pending={pending} total={total} utxos={confirmed_utxos_count}")
        }
        WalletEvent::BalanceUpdate { confirmed, pending, total } => {
            info!("balance update: confirmed={confirmed} pending={pending} total={total}")
        }
        WalletEvent::BlueScoreChanged { blue_score } => info!("blue score changed: {blue_score}"),
        WalletEvent::NewAddress { address, kind } => info!("new {kind:?} address: {address}"),
        WalletEvent::StateUpdate { message } => info!("{message}"),
        WalletEvent::DebugInfo { message } => log::debug!("{message}"),
    }));
}
