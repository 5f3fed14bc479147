use crate::derivation::derive_address;
use crate::model::{AddressKind, WalletAddress};
use kaspa_addresses::Address;
use kaspa_bip32::secp256k1::PublicKey;
use kaspa_bip32::ExtendedPublicKey;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use wallet_common::errors::WalletResult;
use wallet_common::events::{AddressKindTag, EventEmitter, WalletEvent};
use wallet_common::network::NetworkId;

/// `spec.md` §3: `{ counter, cursor, derived }`. `counter` is the highest
/// index ever reserved; `cursor` is the index the UI treats as active.
/// Invariant: `0 <= cursor <= counter`, and `derived` is a contiguous
/// prefix `[0..counter]`.
#[derive(Default)]
pub struct AddressChain {
    counter: u32,
    cursor: u32,
    derived: Vec<WalletAddress>,
}

impl AddressChain {
    fn assert_invariant(&self) {
        debug_assert!(self.cursor <= self.counter);
        debug_assert!(self.derived.len() as u32 == self.counter + 1 || self.derived.is_empty());
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn derived(&self) -> &[WalletAddress] {
        &self.derived
    }
}

/// `spec.md` §4.1: deterministic derivation of the receive/change chains
/// with gap-limit discovery. Addresses are cached once derived and never
/// destroyed (`spec.md` §3 Lifecycles).
pub struct AddressManager {
    network: NetworkId,
    receive_chain_public_key: ExtendedPublicKey<PublicKey>,
    change_chain_public_key: ExtendedPublicKey<PublicKey>,
    receive: Mutex<AddressChain>,
    change: Mutex<AddressChain>,
    emitter: Arc<EventEmitter>,
}

impl AddressManager {
    pub fn new(
        network: NetworkId,
        receive_chain_public_key: ExtendedPublicKey<PublicKey>,
        change_chain_public_key: ExtendedPublicKey<PublicKey>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self {
            network,
            receive_chain_public_key,
            change_chain_public_key,
            receive: Mutex::new(AddressChain::default()),
            change: Mutex::new(AddressChain::default()),
            emitter,
        }
    }

    /// Exposes a chain's public key so callers (e.g. `Wallet`'s address
    /// discovery) can derive scan-only candidate addresses without caching
    /// them into this manager's `derived` prefix.
    pub fn chain_public_key(&self, kind: AddressKind) -> &ExtendedPublicKey<PublicKey> {
        match kind {
            AddressKind::Receive => &self.receive_chain_public_key,
            AddressKind::Change => &self.change_chain_public_key,
        }
    }

    /// The highest index ever reserved on a chain, for callers that only
    /// need the counter (e.g. discovery-result assertions) without
    /// reaching into `AddressChain` itself.
    pub fn counter(&self, kind: AddressKind) -> u32 {
        self.chain(kind).lock().unwrap().counter()
    }

    fn chain(&self, kind: AddressKind) -> &Mutex<AddressChain> {
        match kind {
            AddressKind::Receive => &self.receive,
            AddressKind::Change => &self.change,
        }
    }

    fn derive_and_cache(&self, kind: AddressKind, index: u32) -> WalletResult<WalletAddress> {
        let (address, path) =
            derive_address(self.chain_public_key(kind), kind, index, self.network)?;
        Ok(WalletAddress {
            index,
            kind,
            address,
            priv_key_ref: path,
        })
    }

    /// `getAddresses(n, kind, offset)`: returns `n` addresses at indices
    /// `[offset..offset+n)`, deriving any not yet cached (including any
    /// gap between the current cached prefix and `offset`, so `derived`
    /// stays a contiguous `[0..counter]` prefix).
    pub fn get_addresses(
        &self,
        n: u32,
        kind: AddressKind,
        offset: u32,
    ) -> WalletResult<Vec<WalletAddress>> {
        let end = offset + n;
        let start = {
            let chain = self.chain(kind).lock().unwrap();
            chain.derived.len() as u32
        };
        for index in start..end {
            let address = self.derive_and_cache(kind, index)?;
            let mut chain = self.chain(kind).lock().unwrap();
            if index as usize == chain.derived.len() {
                chain.derived.push(address);
                chain.counter = index;
            }
        }
        let chain = self.chain(kind).lock().unwrap();
        chain.assert_invariant();
        Ok(chain.derived[offset as usize..end as usize].to_vec())
    }

    /// `next(kind)`: returns the next unused address and advances
    /// `counter`; emits `new-address`.
    pub fn next(&self, kind: AddressKind) -> WalletResult<WalletAddress> {
        let next_index = {
            let chain = self.chain(kind).lock().unwrap();
            if chain.derived.is_empty() {
                0
            } else {
                chain.counter + 1
            }
        };
        let address = self.derive_and_cache(kind, next_index)?;
        {
            let mut chain = self.chain(kind).lock().unwrap();
            chain.derived.push(address.clone());
            chain.counter = next_index;
            chain.cursor = next_index;
            chain.assert_invariant();
        }
        self.emit_new_address(&address);
        Ok(address)
    }

    /// `advance(kind, n)`: sets `counter` forward unconditionally,
    /// deriving any addresses between the old counter and `n`.
    pub fn advance(&self, kind: AddressKind, n: u32) -> WalletResult<()> {
        let start = {
            let chain = self.chain(kind).lock().unwrap();
            chain.derived.len() as u32
        };
        let mut last = None;
        for index in start..=n {
            let address = self.derive_and_cache(kind, index)?;
            last = Some(address.clone());
            let mut chain = self.chain(kind).lock().unwrap();
            chain.derived.push(address);
        }
        {
            let mut chain = self.chain(kind).lock().unwrap();
            chain.counter = n;
            chain.cursor = n;
            chain.assert_invariant();
        }
        if let Some(address) = last {
            self.emit_new_address(&address);
        }
        Ok(())
    }

    /// `reverse(kind)`: decrements the cursor by one, used to roll back a
    /// change address reserved by a build that then failed.
    pub fn reverse(&self, kind: AddressKind) {
        let mut chain = self.chain(kind).lock().unwrap();
        if chain.cursor > 0 {
            chain.cursor -= 1;
        }
    }

    /// `isOur(address)`: membership check over all derived addresses on
    /// either chain.
    pub fn is_our(&self, address: &Address) -> bool {
        let known: HashSet<&Address> = self
            .receive
            .lock()
            .unwrap()
            .derived
            .iter()
            .map(|a| &a.address)
            .chain(self.change.lock().unwrap().derived.iter().map(|a| &a.address))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();
        known.contains(address)
    }

    /// Looks up the full `WalletAddress` (including its derivation path,
    /// needed at signing time) behind a derived address, checking both
    /// chains. Returns `None` for an address this manager never derived.
    pub fn find(&self, address: &Address) -> Option<WalletAddress> {
        self.receive
            .lock()
            .unwrap()
            .derived
            .iter()
            .chain(self.change.lock().unwrap().derived.iter())
            .find(|a| &a.address == address)
            .cloned()
    }

    pub fn all_addresses(&self) -> Vec<Address> {
        self.receive
            .lock()
            .unwrap()
            .derived
            .iter()
            .chain(self.change.lock().unwrap().derived.iter())
            .map(|a| a.address.clone())
            .collect()
    }

    fn emit_new_address(&self, address: &WalletAddress) {
        let kind = match address.kind {
            AddressKind::Receive => AddressKindTag::Receive,
            AddressKind::Change => AddressKindTag::Change,
        };
        self.emitter.emit(WalletEvent::NewAddress {
            address: address.address.to_string(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_bip32::{Language, Mnemonic, WordCount};

    fn test_manager() -> AddressManager {
        let mnemonic = Mnemonic::random(WordCount::Words24, Language::English).unwrap();
        let root = crate::derivation::DerivationRoot::from_mnemonic(&mnemonic).unwrap();
        let receive = root
            .chain_public_key(AddressKind::Receive)
            .unwrap();
        let change = root.chain_public_key(AddressKind::Change).unwrap();
        AddressManager::new(NetworkId::Mainnet, receive, change, EventEmitter::new())
    }

    #[test]
    fn next_advances_counter_and_cursor_together() {
        let manager = test_manager();
        let a0 = manager.next(AddressKind::Receive).unwrap();
        assert_eq!(a0.index, 0);
        let a1 = manager.next(AddressKind::Receive).unwrap();
        assert_eq!(a1.index, 1);
        let chain = manager.receive.lock().unwrap();
        assert_eq!(chain.counter(), 1);
        assert_eq!(chain.cursor(), 1);
    }

    #[test]
    fn reverse_rolls_back_cursor_without_touching_counter() {
        let manager = test_manager();
        manager.next(AddressKind::Change).unwrap();
        manager.reverse(AddressKind::Change);
        let chain = manager.change.lock().unwrap();
        assert_eq!(chain.cursor(), 0);
        assert_eq!(chain.counter(), 0);
    }

    #[test]
    fn derived_prefix_is_contiguous_by_index() {
        let manager = test_manager();
        manager.advance(AddressKind::Receive, 4).unwrap();
        let chain = manager.receive.lock().unwrap();
        for (i, addr) in chain.derived().iter().enumerate() {
            assert_eq!(addr.index, i as u32);
        }
    }

    #[test]
    fn is_our_recognizes_derived_addresses_only() {
        let manager = test_manager();
        let a0 = manager.next(AddressKind::Receive).unwrap();
        assert!(manager.is_our(&a0.address));

        let other_mnemonic = Mnemonic::random(WordCount::Words24, Language::English).unwrap();
        let other_root = crate::derivation::DerivationRoot::from_mnemonic(&other_mnemonic).unwrap();
        let other_pub = other_root.chain_public_key(AddressKind::Receive).unwrap();
        let (foreign_address, _) =
            derive_address(&other_pub, AddressKind::Receive, 0, NetworkId::Mainnet).unwrap();
        assert!(!manager.is_our(&foreign_address));
    }
}
