use crate::model::{Utxo, WireTransaction};
use async_trait::async_trait;
use kaspa_addresses::Address;
use kaspa_hashes::Hash as BlockHash;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wallet_common::errors::WalletResult;

/// A handle returned by every `subscribe_*` method (`spec.md` §6's
/// `SubPromise`): it resolves once the server has acknowledged the
/// subscription, and carries a `uid` usable to unsubscribe later. Dropping
/// it does **not** unsubscribe — callers must pass it to
/// `RpcApi::unsubscribe` explicitly, since a held clone may still be in
/// use elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn uid(self) -> u64 {
        self.0
    }
}

pub struct UtxosChanged {
    pub added: Vec<Utxo>,
    pub removed: Vec<crate::model::Outpoint>,
}

/// The interface the wallet consumes to talk to a Kaspa full node
/// (`spec.md` §6). Implementations fan out over whatever transport they
/// like internally but must deliver every callback on the caller's
/// executor, matching the single-threaded cooperative model in §5.
#[async_trait]
pub trait RpcApi: Send + Sync {
    async fn connect(&self) -> WalletResult<()>;
    async fn disconnect(&self) -> WalletResult<()>;

    /// Registers a callback fired on every successful connection. Returns
    /// no handle — unlike the subscribe_* methods, spec.md treats
    /// onConnect/onDisconnect as wallet-lifetime registrations, not
    /// per-call subscriptions.
    fn on_connect(&self, callback: Box<dyn Fn() + Send + Sync>);
    fn on_disconnect(&self, callback: Box<dyn Fn() + Send + Sync>);

    async fn get_block(&self, hash: BlockHash) -> WalletResult<Vec<u8>>;

    async fn get_utxos_by_addresses(
        &self,
        addresses: &[Address],
    ) -> WalletResult<HashMap<Address, Vec<Utxo>>>;

    async fn submit_transaction(&self, transaction: WireTransaction) -> WalletResult<Option<String>>;

    async fn get_virtual_selected_parent_blue_score(&self) -> WalletResult<u64>;

    async fn subscribe_block_added(
        &self,
        callback: Box<dyn Fn(BlockHash) + Send + Sync>,
    ) -> WalletResult<SubscriptionId>;

    async fn subscribe_virtual_selected_parent_blue_score_changed(
        &self,
        callback: Box<dyn Fn(u64) + Send + Sync>,
    ) -> WalletResult<SubscriptionId>;

    async fn subscribe_utxos_changed(
        &self,
        addresses: &[Address],
        callback: Box<dyn Fn(UtxosChanged) + Send + Sync>,
    ) -> WalletResult<SubscriptionId>;

    async fn subscribe_chain_changed(
        &self,
        callback: Box<dyn Fn() + Send + Sync>,
    ) -> WalletResult<SubscriptionId>;

    async fn unsubscribe(&self, subscription: SubscriptionId) -> WalletResult<()>;
}

pub type SharedRpcApi = Arc<dyn RpcApi>;

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A stub `RpcApi` for unit tests that exercise collaborators needing
    /// an `Arc<dyn RpcApi>` but never actually call it.
    pub struct NullRpc;

    #[async_trait]
    impl RpcApi for NullRpc {
        async fn connect(&self) -> WalletResult<()> {
            Ok(())
        }

        async fn disconnect(&self) -> WalletResult<()> {
            Ok(())
        }

        fn on_connect(&self, _callback: Box<dyn Fn() + Send + Sync>) {}
        fn on_disconnect(&self, _callback: Box<dyn Fn() + Send + Sync>) {}

        async fn get_block(&self, _hash: BlockHash) -> WalletResult<Vec<u8>> {
            unimplemented!("NullRpc is a placeholder for tests that never call it")
        }

        async fn get_utxos_by_addresses(
            &self,
            _addresses: &[Address],
        ) -> WalletResult<HashMap<Address, Vec<Utxo>>> {
            Ok(HashMap::new())
        }

        async fn submit_transaction(&self, _transaction: WireTransaction) -> WalletResult<Option<String>> {
            Ok(None)
        }

        async fn get_virtual_selected_parent_blue_score(&self) -> WalletResult<u64> {
            Ok(0)
        }

        async fn subscribe_block_added(
            &self,
            _callback: Box<dyn Fn(BlockHash) + Send + Sync>,
        ) -> WalletResult<SubscriptionId> {
            Ok(SubscriptionId::next())
        }

        async fn subscribe_virtual_selected_parent_blue_score_changed(
            &self,
            _callback: Box<dyn Fn(u64) + Send + Sync>,
        ) -> WalletResult<SubscriptionId> {
            Ok(SubscriptionId::next())
        }

        async fn subscribe_utxos_changed(
            &self,
            _addresses: &[Address],
            _callback: Box<dyn Fn(UtxosChanged) + Send + Sync>,
        ) -> WalletResult<SubscriptionId> {
            Ok(SubscriptionId::next())
        }

        async fn subscribe_chain_changed(
            &self,
            _callback: Box<dyn Fn() + Send + Sync>,
        ) -> WalletResult<SubscriptionId> {
            Ok(SubscriptionId::next())
        }

        async fn unsubscribe(&self, _subscription: SubscriptionId) -> WalletResult<()> {
            Ok(())
        }
    }
}
